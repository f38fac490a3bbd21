//! Domain types and pure logic for the Taleforge narrative-to-asset service.
//!
//! Nothing in this crate talks to the network. Provider clients live in
//! `taleforge-providers`, orchestration in `taleforge-pipeline`.

pub mod address;
pub mod analysis;
pub mod error;
pub mod hashing;
pub mod license;
pub mod package;
pub mod prompt;
pub mod registration;
pub mod store;
pub mod story;
pub mod types;
