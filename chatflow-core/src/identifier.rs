//! ID generation utilities.
//!
//! This module provides functions for generating unique identifiers
//! for messages, tool calls, conversations and approvals.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a unique message ID.
///
/// Returns a UUID v4 string prefixed with "msg_".
///
/// # Example
///
/// ```rust
/// use chatflow_core::identifier::generate_message_id;
///
/// let id = generate_message_id();
/// assert!(id.starts_with("msg_"));
/// assert_eq!(id.len(), 36); // "msg_" + 32 hex chars
/// ```
#[must_use]
pub fn generate_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

/// Generate a unique tool call ID.
///
/// Returns a UUID v4 string in the format used by most LLM providers.
#[must_use]
pub fn generate_tool_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Generate a unique conversation ID.
///
/// Returns a UUID v4 string prefixed with "conv_".
#[must_use]
pub fn generate_conversation_id() -> String {
    format!("conv_{}", Uuid::new_v4().simple())
}

/// Generate a unique approval ID.
///
/// Returns a UUID v4 string prefixed with "appr_".
#[must_use]
pub fn generate_approval_id() -> String {
    format!("appr_{}", Uuid::new_v4().simple())
}

/// Get the current UTC timestamp.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_message_id() {
        let id = generate_message_id();
        assert!(id.starts_with("msg_"));
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_tool_call_id();
        let id2 = generate_tool_call_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("call_"));
    }

    #[test]
    fn test_prefixes() {
        assert!(generate_conversation_id().starts_with("conv_"));
        assert!(generate_approval_id().starts_with("appr_"));
    }

    #[test]
    fn test_now_millis_is_recent() {
        let ms = now_millis();
        // Sometime after 2020-01-01.
        assert!(ms > 1_577_836_800_000);
    }
}
