/// Task ids are opaque strings (UUID v4 at submission time).
pub type TaskId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
