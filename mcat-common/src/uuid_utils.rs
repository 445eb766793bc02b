//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Short random token for file names (first 12 hex digits of a UUIDv4)
pub fn short_token() -> String {
    generate().simple().to_string()[..12].to_string()
}
