//! Generates the correlation ids threaded into each started execution.

use uuid::Uuid;

/// Build a fresh correlation id, optionally prefixed. The id is also
/// used as the execution name, so it must not repeat.
pub fn correlation_id(prefix: &str) -> String {
    let token = Uuid::new_v4();
    if prefix.is_empty() {
        token.to_string()
    } else {
        format!("{}-{}", prefix, token)
    }
}
