/// Packages (and therefore jobs) are keyed by UUID.
pub type PackageId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
