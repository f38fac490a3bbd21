//! Server-Sent Events rendering of a job's progress stream.
//!
//! Each [`JobEvent`] becomes one SSE event named after its `type` tag, with
//! the JSON-serialized event as data. Keep-alive comments go out every
//! 15 seconds so idle proxies do not drop the connection.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use taleforge_events::JobEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub fn job_event_stream(
    receiver: mpsc::Receiver<JobEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(receiver).map(|event| {
        let name = event.name();
        let rendered = Event::default().event(name).json_data(&event).unwrap_or_else(|e| {
            tracing::warn!(event = name, error = %e, "Failed to serialize progress event");
            Event::default().event(name).comment("serialization failed")
        });
        Ok::<_, Infallible>(rendered)
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("heartbeat"),
    )
}
