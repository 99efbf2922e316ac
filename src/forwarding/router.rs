//! Rule lookup and per-mode dispatch.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::composer::Composer;
use super::event::InboundEvent;
use super::filter::{self, Verdict, eq_fold};
use crate::config::{Config, ForwardingMode, ForwardingRule};
use crate::daemon::{Attachment, DaemonApi};

/// Why an event was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No enabled rule for the event's group.
    NoRule,
    /// `is_sending_enabled` is off.
    SendingDisabled,
    /// Attachments mode, but the event has none.
    NoAttachments,
    /// Messages mode, but the event is not plain text.
    NotPlainText,
    /// Sender or content filters rejected the event.
    Filtered,
}

/// What [`Router::dispatch`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The relay was attempted; `delivered` is false when the send failed.
    Forwarded { delivered: bool },
    Dropped(DropReason),
}

/// First enabled rule whose group id matches `group_id` case-insensitively.
pub fn find_rule<'a>(rules: &'a [ForwardingRule], group_id: &str) -> Option<&'a ForwardingRule> {
    rules.iter().find(|rule| {
        if !rule.is_enabled {
            debug!(group_id = %rule.group_id, "Rule is disabled, skipping");
            return false;
        }
        eq_fold(&rule.group_id, group_id)
    })
}

/// Picks the rule for an event and runs the mode-specific relay sequence.
pub struct Router {
    config: Arc<Config>,
    composer: Composer,
}

impl Router {
    pub fn new(config: Arc<Config>, daemon: Arc<dyn DaemonApi>) -> Self {
        Self {
            config,
            composer: Composer::new(daemon),
        }
    }

    pub async fn dispatch(&self, event: &InboundEvent) -> Dispatch {
        let group_id = event.group_id.as_deref().unwrap_or_default();
        let Some(rule) = find_rule(&self.config.forwarding, group_id) else {
            debug!(group_id = %group_id, "Group is not in the forwarding list, ignoring");
            return Dispatch::Dropped(DropReason::NoRule);
        };

        match rule.mode {
            ForwardingMode::Attachments => {
                if event.attachments.is_empty() {
                    debug!("Message has no attachments");
                    return Dispatch::Dropped(DropReason::NoAttachments);
                }
                if let Some(dropped) = self.sending_disabled() {
                    return dropped;
                }
                if filter::check(rule, event, false).is_empty() {
                    debug!("Filtered message, ignoring");
                    return Dispatch::Dropped(DropReason::Filtered);
                }
                self.forward(rule, event, &event.attachments, &rule.addon_message)
                    .await
            }
            ForwardingMode::Messages => {
                if event.text.is_empty() || !event.attachments.is_empty() {
                    debug!("Message is not plain text");
                    return Dispatch::Dropped(DropReason::NotPlainText);
                }
                if let Some(dropped) = self.sending_disabled() {
                    return dropped;
                }
                match filter::check(rule, event, true) {
                    Verdict::Text(text) if !text.is_empty() => {
                        self.forward(rule, event, &[], text).await
                    }
                    _ => {
                        debug!("Filtered message, ignoring");
                        Dispatch::Dropped(DropReason::Filtered)
                    }
                }
            }
            ForwardingMode::All => {
                if let Some(dropped) = self.sending_disabled() {
                    return dropped;
                }
                // Content masks apply only when there is text.
                let verdict = filter::check(rule, event, !event.text.is_empty());
                if verdict.is_empty() {
                    debug!("Filtered message, ignoring");
                    return Dispatch::Dropped(DropReason::Filtered);
                }
                self.forward(rule, event, &event.attachments, &event.text)
                    .await
            }
        }
    }

    fn sending_disabled(&self) -> Option<Dispatch> {
        if self.config.is_sending_enabled {
            return None;
        }
        info!("Sending messages disabled");
        Some(Dispatch::Dropped(DropReason::SendingDisabled))
    }

    /// Relay, then receipt, then reaction. Each step runs regardless of the
    /// previous one's outcome.
    async fn forward(
        &self,
        rule: &ForwardingRule,
        event: &InboundEvent,
        attachments: &[Attachment],
        body: &str,
    ) -> Dispatch {
        let delivered = match self.composer.relay(&rule.receivers, attachments, body).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!("Nothing to relay");
                true
            }
            Err(e) => {
                error!(error = %e, group_id = %rule.group_id, "Send message error");
                false
            }
        };

        if let Err(e) = self.composer.mark_read(&event.source, event.timestamp).await {
            error!(error = %e, "Mark message as read error");
        }

        if let Err(e) = self
            .composer
            .react(&rule.reaction, &event.source, &event.source, event.timestamp)
            .await
        {
            error!(error = %e, "Send message reaction error");
        }

        Dispatch::Forwarded { delivered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarding::composer::recipient_id;
    use crate::forwarding::testing::{Call, RecordingDaemon};

    fn rule(group_id: &str, mode: ForwardingMode, receivers: &[&str]) -> ForwardingRule {
        ForwardingRule {
            group_id: group_id.into(),
            is_enabled: true,
            mode,
            receivers: receivers.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    fn config(rules: Vec<ForwardingRule>, sending: bool) -> Arc<Config> {
        Arc::new(Config {
            cli_address: "localhost:8080".into(),
            self_number: "+100".into(),
            ignore_older_messages: None,
            is_sending_enabled: sending,
            is_print_messages: false,
            enable_debug_messages: false,
            control_address: "127.0.0.1:0".into(),
            send_retries: 0,
            retry_backoff: std::time::Duration::ZERO,
            forwarding: rules,
        })
    }

    fn event(group: &str, text: &str, attachments: &[&str]) -> InboundEvent {
        InboundEvent {
            source: "+200".into(),
            sender_name: "Alice".into(),
            sender_uuid: "uuid-200".into(),
            timestamp: 1_000,
            text: text.into(),
            attachments: attachments
                .iter()
                .map(|id| Attachment {
                    content_type: "image/jpeg".into(),
                    filename: format!("{id}.jpg"),
                    id: id.to_string(),
                    ..Default::default()
                })
                .collect(),
            group_id: Some(group.into()),
        }
    }

    fn router(config: Arc<Config>) -> (Router, Arc<RecordingDaemon>) {
        let daemon = Arc::new(RecordingDaemon::default());
        (Router::new(config, daemon.clone()), daemon)
    }

    // ── Lookup ──────────────────────────────────────────────────────

    #[test]
    fn lookup_is_case_insensitive() {
        let rules = vec![rule("Family", ForwardingMode::All, &["G2"])];
        assert!(find_rule(&rules, "family").is_some());
        assert!(find_rule(&rules, "FAMILY").is_some());
        assert!(find_rule(&rules, "Friends").is_none());
    }

    #[test]
    fn disabled_rules_are_never_selected() {
        let mut disabled = rule("G1", ForwardingMode::All, &["G2"]);
        disabled.is_enabled = false;
        assert!(find_rule(&[disabled.clone()], "G1").is_none());

        let enabled = rule("g1", ForwardingMode::Messages, &["G3"]);
        let rules = vec![disabled, enabled];
        let found = find_rule(&rules, "G1").unwrap();
        assert_eq!(found.receivers, vec!["G3".to_string()]);
    }

    #[test]
    fn first_enabled_match_wins() {
        let rules = vec![
            rule("G1", ForwardingMode::Attachments, &["first"]),
            rule("g1", ForwardingMode::Messages, &["second"]),
        ];
        let found = find_rule(&rules, "G1").unwrap();
        assert_eq!(found.receivers, vec!["first".to_string()]);
        assert_eq!(found.mode, ForwardingMode::Attachments);
    }

    #[tokio::test]
    async fn unknown_group_is_dropped() {
        let (router, daemon) = router(config(vec![rule("G1", ForwardingMode::All, &["G2"])], true));
        let dispatch = router.dispatch(&event("other", "hello", &[])).await;
        assert_eq!(dispatch, Dispatch::Dropped(DropReason::NoRule));
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn event_without_group_is_dropped() {
        let (router, daemon) = router(config(vec![rule("G1", ForwardingMode::All, &["G2"])], true));
        let mut ev = event("G1", "hello", &[]);
        ev.group_id = None;
        assert_eq!(router.dispatch(&ev).await, Dispatch::Dropped(DropReason::NoRule));
        assert!(daemon.calls().is_empty());
    }

    // ── All mode ────────────────────────────────────────────────────

    #[tokio::test]
    async fn all_mode_relays_text_then_receipt() {
        let (router, daemon) = router(config(vec![rule("G1", ForwardingMode::All, &["G2"])], true));

        let dispatch = router.dispatch(&event("G1", "hello", &[])).await;
        assert_eq!(dispatch, Dispatch::Forwarded { delivered: true });

        let calls = daemon.calls();
        assert_eq!(calls.len(), 2);
        let Call::Send(request) = &calls[0] else {
            panic!("expected send first, got {:?}", calls[0]);
        };
        assert_eq!(request.message, "hello");
        assert_eq!(request.recipients, vec![recipient_id("G2")]);
        assert!(request.base64_attachments.is_empty());
        assert!(matches!(&calls[1], Call::Receipt(r) if r.recipient == "+200" && r.timestamp == 1_000));
    }

    #[tokio::test]
    async fn all_mode_relays_text_with_attachments() {
        let (router, daemon) = router(config(vec![rule("G1", ForwardingMode::All, &["G2"])], true));

        router.dispatch(&event("G1", "look", &["a1", "a2"])).await;

        let sends = daemon.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].message, "look");
        assert_eq!(sends[0].base64_attachments.len(), 2);
        assert!(sends[0].base64_attachments[0].starts_with("data:image/jpeg;filename=a1.jpg;base64,"));
    }

    #[tokio::test]
    async fn all_mode_applies_contains_mask_to_text() {
        let mut r = rule("G1", ForwardingMode::All, &["G2"]);
        r.contains = vec!["urgent".into()];
        let (router, daemon) = router(config(vec![r], true));

        let dispatch = router.dispatch(&event("G1", "hello", &[])).await;
        assert_eq!(dispatch, Dispatch::Dropped(DropReason::Filtered));
        assert!(daemon.calls().is_empty());

        router.dispatch(&event("G1", "urgent: call me", &[])).await;
        assert_eq!(daemon.sends().len(), 1);
    }

    #[tokio::test]
    async fn all_mode_attachment_only_skips_content_masks() {
        let mut r = rule("G1", ForwardingMode::All, &["G2"]);
        r.contains = vec!["urgent".into()];
        let (router, daemon) = router(config(vec![r], true));

        router.dispatch(&event("G1", "", &["a1"])).await;
        assert_eq!(daemon.sends().len(), 1);
    }

    #[tokio::test]
    async fn all_mode_applies_starts_with_mask_to_text() {
        let mut r = rule("G1", ForwardingMode::All, &["G2"]);
        r.starts_with = vec!["!fwd".into()];
        let (router, daemon) = router(config(vec![r], true));

        // Text with attachments is still masked when the text misses.
        let dispatch = router.dispatch(&event("G1", "holiday pics", &["a1"])).await;
        assert_eq!(dispatch, Dispatch::Dropped(DropReason::Filtered));
        assert!(daemon.calls().is_empty());

        let dispatch = router.dispatch(&event("G1", "!fwd holiday pics", &["a1"])).await;
        assert_eq!(dispatch, Dispatch::Forwarded { delivered: true });
        let sends = daemon.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].message, "!fwd holiday pics");
        assert_eq!(sends[0].base64_attachments.len(), 1);

        // Attachment-only events skip the mask.
        router.dispatch(&event("G1", "", &["a2"])).await;
        assert_eq!(daemon.sends().len(), 2);
    }

    #[tokio::test]
    async fn all_mode_sender_rejection_makes_no_calls() {
        let mut r = rule("G1", ForwardingMode::All, &["G2"]);
        r.sender_names = vec!["Bob".into()];
        let (router, daemon) = router(config(vec![r], true));

        let dispatch = router.dispatch(&event("G1", "hello", &[])).await;
        assert_eq!(dispatch, Dispatch::Dropped(DropReason::Filtered));
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn reaction_follows_receipt_when_configured() {
        let mut r = rule("G1", ForwardingMode::All, &["G2"]);
        r.reaction = "✅".into();
        let (router, daemon) = router(config(vec![r], true));

        router.dispatch(&event("G1", "hello", &[])).await;

        let calls = daemon.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], Call::Send(_)));
        assert!(matches!(calls[1], Call::Receipt(_)));
        assert!(matches!(
            &calls[2],
            Call::Reaction(r) if r.reaction == "✅" && r.target_author == "+200" && r.timestamp == 1_000
        ));
    }

    // ── Attachments mode ────────────────────────────────────────────

    #[tokio::test]
    async fn attachments_mode_without_attachments_makes_no_calls() {
        let (router, daemon) =
            router(config(vec![rule("G1", ForwardingMode::Attachments, &["G2"])], true));

        let dispatch = router.dispatch(&event("G1", "just text", &[])).await;
        assert_eq!(dispatch, Dispatch::Dropped(DropReason::NoAttachments));
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn attachments_mode_uses_addon_text_as_body() {
        let mut r = rule("G1", ForwardingMode::Attachments, &["G2"]);
        r.addon_message = "from the family chat".into();
        let (router, daemon) = router(config(vec![r], true));

        router.dispatch(&event("G1", "original caption", &["a1"])).await;

        let sends = daemon.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].message, "from the family chat");
        assert_eq!(sends[0].base64_attachments.len(), 1);
    }

    #[tokio::test]
    async fn attachments_mode_ignores_content_masks() {
        let mut r = rule("G1", ForwardingMode::Attachments, &["G2"]);
        r.starts_with = vec!["!".into()];
        let (router, daemon) = router(config(vec![r], true));

        router.dispatch(&event("G1", "no bang", &["a1"])).await;
        assert_eq!(daemon.sends().len(), 1);
    }

    // ── Messages mode ───────────────────────────────────────────────

    #[tokio::test]
    async fn messages_mode_skips_events_with_attachments() {
        let (router, daemon) =
            router(config(vec![rule("G1", ForwardingMode::Messages, &["G2"])], true));

        let dispatch = router.dispatch(&event("G1", "hello", &["a1"])).await;
        assert_eq!(dispatch, Dispatch::Dropped(DropReason::NotPlainText));
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn messages_mode_skips_empty_text() {
        let (router, daemon) =
            router(config(vec![rule("G1", ForwardingMode::Messages, &["G2"])], true));

        let dispatch = router.dispatch(&event("G1", "", &[])).await;
        assert_eq!(dispatch, Dispatch::Dropped(DropReason::NotPlainText));
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn messages_mode_relays_masked_text() {
        let mut r = rule("G1", ForwardingMode::Messages, &["G2"]);
        r.starts_with = vec!["#".into()];
        let (router, daemon) = router(config(vec![r], true));

        assert_eq!(
            router.dispatch(&event("G1", "no hash", &[])).await,
            Dispatch::Dropped(DropReason::Filtered)
        );
        assert!(daemon.calls().is_empty());

        router.dispatch(&event("G1", "#announce", &[])).await;
        let sends = daemon.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].message, "#announce");
        assert!(sends[0].base64_attachments.is_empty());
    }

    // ── Global switch and failures ──────────────────────────────────

    #[tokio::test]
    async fn sending_disabled_blocks_every_mode() {
        let rules = vec![
            rule("A", ForwardingMode::Attachments, &["X"]),
            rule("M", ForwardingMode::Messages, &["X"]),
            rule("L", ForwardingMode::All, &["X"]),
        ];
        let (router, daemon) = router(config(rules, false));

        for ev in [
            event("A", "", &["a1"]),
            event("M", "hello", &[]),
            event("L", "hello", &["a1"]),
        ] {
            assert_eq!(
                router.dispatch(&ev).await,
                Dispatch::Dropped(DropReason::SendingDisabled)
            );
        }
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_send_still_marks_read_and_reacts() {
        let mut r = rule("G1", ForwardingMode::All, &["G2"]);
        r.reaction = "👀".into();
        let daemon = Arc::new(RecordingDaemon {
            fail_send: true,
            ..Default::default()
        });
        let router = Router::new(config(vec![r], true), daemon.clone());

        let dispatch = router.dispatch(&event("G1", "hello", &[])).await;
        assert_eq!(dispatch, Dispatch::Forwarded { delivered: false });

        let calls = daemon.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[1], Call::Receipt(_)));
        assert!(matches!(calls[2], Call::Reaction(_)));
    }

    #[tokio::test]
    async fn failed_receipt_does_not_block_reaction() {
        let mut r = rule("G1", ForwardingMode::All, &["G2"]);
        r.reaction = "👀".into();
        let daemon = Arc::new(RecordingDaemon {
            fail_receipt: true,
            ..Default::default()
        });
        let router = Router::new(config(vec![r], true), daemon.clone());

        let dispatch = router.dispatch(&event("G1", "hello", &[])).await;
        assert_eq!(dispatch, Dispatch::Forwarded { delivered: true });
        assert!(matches!(daemon.calls().last(), Some(Call::Reaction(_))));
    }
}
