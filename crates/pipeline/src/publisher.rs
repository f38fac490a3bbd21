//! Durable copies of generated visuals.
//!
//! Uploads run concurrently and fail independently. A visual whose upload
//! fails keeps its ephemeral URL; nothing here ever fails a job.

use futures::future::join_all;
use taleforge_core::package::Visual;
use taleforge_core::types::PackageId;
use taleforge_providers::storage::{ContentStore, StorageError, StoredObject};

/// One file to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishItem {
    pub url: String,
    pub name: String,
}

/// Publish every item concurrently. Results are in input order.
pub async fn publish_all(
    store: &dyn ContentStore,
    items: Vec<PublishItem>,
) -> Vec<Result<StoredObject, StorageError>> {
    let uploads = items
        .iter()
        .map(|item| store.publish_from_url(&item.url, &item.name));
    join_all(uploads).await
}

/// Publish every visual and attach durable locations to the ones that
/// succeed. Returns how many were published.
pub async fn publish_visuals(
    store: &dyn ContentStore,
    package_id: PackageId,
    visuals: &mut [Visual],
) -> usize {
    let items = visuals
        .iter()
        .map(|v| PublishItem {
            url: v.ephemeral_url.clone(),
            name: format!("{package_id}-{}.png", v.kind.name()),
        })
        .collect();

    let mut published = 0;
    for (visual, result) in visuals.iter_mut().zip(publish_all(store, items).await) {
        match result {
            Ok(object) => {
                visual.attach_durable(object.cid, object.url);
                published += 1;
            }
            Err(e) => {
                tracing::warn!(
                    package_id = %package_id,
                    kind = visual.kind.name(),
                    error = %e,
                    "Failed to publish visual, keeping ephemeral URL"
                );
            }
        }
    }
    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use taleforge_core::package::VisualKind;
    use taleforge_providers::fake::FakeContentStore;

    fn visual(kind: VisualKind) -> Visual {
        Visual {
            id: uuid::Uuid::new_v4(),
            kind,
            prompt: "p".into(),
            ephemeral_url: format!("https://images.test/{}.png", kind.name()),
            durable_url: None,
            durable_id: None,
            title: String::new(),
            title_translated: String::new(),
            description: String::new(),
            description_translated: String::new(),
        }
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let store = FakeContentStore::new();
        let items = vec![
            PublishItem { url: "https://a".into(), name: "a.png".into() },
            PublishItem { url: "https://b".into(), name: "b.png".into() },
        ];
        let results = publish_all(&store, items).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_ok));
        let names: Vec<String> = store.files().into_iter().map(|(_, n)| n).collect();
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn successful_uploads_attach_durable_urls() {
        let store = FakeContentStore::new();
        let mut visuals = vec![visual(VisualKind::KeyVisual), visual(VisualKind::World)];
        let id = uuid::Uuid::new_v4();

        assert_eq!(publish_visuals(&store, id, &mut visuals).await, 2);
        for v in &visuals {
            assert!(v.durable_url.as_deref().unwrap().starts_with("https://gateway.test/ipfs/"));
            assert!(v.ephemeral_url.starts_with("https://images.test/"));
        }
    }

    #[tokio::test]
    async fn failed_uploads_keep_ephemeral_urls() {
        let store = FakeContentStore::failing();
        let mut visuals = vec![visual(VisualKind::Character)];

        assert_eq!(publish_visuals(&store, uuid::Uuid::new_v4(), &mut visuals).await, 0);
        assert!(visuals[0].durable_url.is_none());
        assert_eq!(visuals[0].best_url(), "https://images.test/character.png");
    }
}
