//! Outbound collaborators of the Taleforge pipeline.
//!
//! Each external service sits behind an async trait so the pipeline can be
//! wired with HTTP clients in production and with the fakes in [`fake`]
//! under test.
//!
//! | Trait | HTTP implementation |
//! |-------|---------------------|
//! | [`text::TextCompletion`] | [`text::OpenAiTextClient`] |
//! | [`image::ImageBackend`] | [`image::OpenAiImageBackend`] |
//! | [`storage::ContentStore`] | [`storage::PinataClient`] |
//! | [`ledger::LedgerClient`] | [`ledger::JsonRpcLedgerClient`] |

pub mod http;
pub mod image;
pub mod ledger;
pub mod storage;
pub mod text;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
