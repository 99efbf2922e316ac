//! Sender and content filters for one (rule, event) pair.
//!
//! Pure: no I/O, no state. The same inputs always give the same verdict.

use tracing::debug;

use super::event::InboundEvent;
use crate::config::ForwardingRule;

/// Outcome of [`check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<'a> {
    /// The event must not be relayed.
    Rejected,
    /// Sender checks passed and content was not inspected. The caller relays
    /// the original body and attachments.
    Accepted,
    /// Content checks passed. Holds the text to relay.
    Text(&'a str),
}

impl Verdict<'_> {
    /// Rejections and empty text both mean there is nothing to relay.
    pub fn is_empty(&self) -> bool {
        matches!(self, Verdict::Rejected | Verdict::Text(""))
    }
}

/// Case-insensitive string equality.
pub fn eq_fold(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

fn any_eq_fold(value: &str, list: &[String]) -> bool {
    list.iter().any(|entry| eq_fold(value, entry))
}

/// Evaluate `event` against the filters of `rule`.
///
/// With `filter_content` unset only the sender allow-lists apply. With it
/// set, the `starts_with` and `contains` masks are checked against the text.
pub fn check<'a>(rule: &ForwardingRule, event: &'a InboundEvent, filter_content: bool) -> Verdict<'a> {
    if !rule.sender_names.is_empty() && !any_eq_fold(&event.sender_name, &rule.sender_names) {
        debug!(sender = %event.sender_name, "Sender name not in allow-list, ignoring message");
        return Verdict::Rejected;
    }

    if !rule.sender_uuids.is_empty() && !any_eq_fold(&event.sender_uuid, &rule.sender_uuids) {
        debug!(sender_uuid = %event.sender_uuid, "Sender uuid not in allow-list, ignoring message");
        return Verdict::Rejected;
    }

    if !filter_content {
        return Verdict::Accepted;
    }

    let text = event.text.as_str();

    if !rule.starts_with.is_empty() {
        if rule.starts_with.iter().any(|mask| text.starts_with(mask.as_str())) {
            return Verdict::Text(text);
        }
        debug!(text = %text, "Message does not start with any configured mask");
        // A starts-with miss is only final when no contains masks exist.
        if rule.contains.is_empty() {
            return Verdict::Rejected;
        }
    }

    if !rule.contains.is_empty() && !rule.contains.iter().any(|mask| text.contains(mask.as_str())) {
        debug!(text = %text, "Message does not contain any configured mask");
        return Verdict::Rejected;
    }

    Verdict::Text(text)
}
