//! Id and timestamp generation shared by the builder and the validator.

use chrono::Utc;
use uuid::Uuid;

/// A fresh envelope id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// The current time, RFC 3339, as envelope `ts` fields are stamped.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
