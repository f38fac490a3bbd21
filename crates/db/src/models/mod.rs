//! Row structs matching the database tables.

pub mod event;
pub mod package;
pub mod status;
