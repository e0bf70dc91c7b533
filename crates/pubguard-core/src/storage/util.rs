//! Small helpers shared by the storage submodules.

use chrono::Utc;

/// Current time as an RFC 3339 UTC timestamp, the format all tables use.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// A fresh random identity, string-typed per the specification's semantic
/// "identity" fields.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
