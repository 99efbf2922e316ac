//! Configuration types and the JSON config file loader.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Address the control-plane HTTP API listens on unless configured.
pub const DEFAULT_CONTROL_ADDRESS: &str = "0.0.0.0:8181";

/// Delay between retried daemon calls unless configured.
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Which event shapes a rule relays, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardingMode {
    /// Only events carrying attachments; the rule's addon text becomes the body.
    Attachments,
    /// Only text events without attachments, subject to content masks.
    Messages,
    /// Text and attachments together.
    #[default]
    All,
}

impl ForwardingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attachments => "attachments",
            Self::Messages => "messages",
            Self::All => "all",
        }
    }
}

impl FromStr for ForwardingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attachments" => Ok(Self::Attachments),
            "messages" => Ok(Self::Messages),
            "all" => Ok(Self::All),
            other => Err(ConfigError::InvalidValue {
                key: "forwarding_mode".into(),
                message: format!("invalid forwarding mode: {other}"),
            }),
        }
    }
}

impl fmt::Display for ForwardingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A forwarding rule for one source group.
#[derive(Debug, Clone, Default)]
pub struct ForwardingRule {
    /// Source group id, matched case-insensitively.
    pub group_id: String,
    /// Disabled rules are never selected.
    pub is_enabled: bool,
    pub mode: ForwardingMode,
    /// Destination group ids, raw or already in `group.` form.
    pub receivers: Vec<String>,
    /// Body sent along with relayed attachments in attachments mode.
    pub addon_message: String,
    /// Reaction glyph put on the source message after a relay. Empty disables it.
    pub reaction: String,
    /// Allow-list of sender display names (empty = anyone).
    pub sender_names: Vec<String>,
    /// Allow-list of sender unique ids (empty = anyone).
    pub sender_uuids: Vec<String>,
    /// Text must start with one of these (messages mode).
    pub starts_with: Vec<String>,
    /// Text must contain one of these (messages mode).
    pub contains: Vec<String>,
}

/// Process configuration, immutable after load.
#[derive(Debug, Clone)]
pub struct Config {
    /// `host:port` of the messaging daemon.
    pub cli_address: String,
    /// The bot account's own number.
    pub self_number: String,
    /// Events older than this many milliseconds are dropped as sync echoes.
    /// `None` disables the check.
    pub ignore_older_messages: Option<u64>,
    /// Master switch for every outbound call.
    pub is_sending_enabled: bool,
    /// Log every inbound message at info level.
    pub is_print_messages: bool,
    /// Raise the default log level to debug.
    pub enable_debug_messages: bool,
    /// Listen address of the control-plane HTTP API.
    pub control_address: String,
    /// Extra attempts for daemon POST calls on transport errors or 5xx.
    pub send_retries: u32,
    /// Pause between those attempts.
    pub retry_backoff: Duration,
    /// Ordered rule list; first enabled match wins.
    pub forwarding: Vec<ForwardingRule>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    cli_address: String,
    #[serde(default)]
    self_number: String,
    #[serde(default)]
    ignore_older_messages: Option<u64>,
    #[serde(default)]
    is_sending_enabled: bool,
    #[serde(default)]
    is_print_messages: bool,
    #[serde(default)]
    enable_debug_messages: bool,
    #[serde(default)]
    control_address: Option<String>,
    #[serde(default)]
    send_retries: u32,
    #[serde(default)]
    retry_backoff_ms: Option<u64>,
    #[serde(default)]
    forwarding: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    #[serde(default)]
    group_id: String,
    #[serde(default)]
    is_enabled: bool,
    #[serde(default)]
    forwarding_mode: Option<String>,
    #[serde(default)]
    receivers_group_ids: Vec<String>,
    #[serde(default)]
    bot_special_addon_msg: String,
    #[serde(default)]
    reaction_mark: String,
    #[serde(default)]
    sender_names: Vec<String>,
    #[serde(default)]
    sender_uuids: Vec<String>,
    #[serde(default)]
    starts_with: Vec<String>,
    #[serde(default)]
    contains: Vec<String>,
}

impl Config {
    /// Read and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(raw)?;

        let cli_address = file.cli_address.trim().to_string();
        if cli_address.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "cli_address".into(),
            });
        }

        let self_number = file.self_number.trim().to_string();
        if self_number.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "self_number".into(),
            });
        }

        let forwarding = file
            .forwarding
            .into_iter()
            .enumerate()
            .map(|(index, entry)| entry.into_rule(index))
            .collect::<Result<Vec<_>, _>>()?;

        let control_address = file
            .control_address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTROL_ADDRESS.to_string());

        Ok(Self {
            cli_address,
            self_number,
            ignore_older_messages: file.ignore_older_messages,
            is_sending_enabled: file.is_sending_enabled,
            is_print_messages: file.is_print_messages,
            enable_debug_messages: file.enable_debug_messages,
            control_address,
            send_retries: file.send_retries,
            retry_backoff: Duration::from_millis(
                file.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
            ),
            forwarding,
        })
    }
}

impl RuleEntry {
    fn into_rule(self, index: usize) -> Result<ForwardingRule, ConfigError> {
        let group_id = self.group_id.trim().to_string();
        let receivers: Vec<String> = self
            .receivers_group_ids
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        let mode = if self.is_enabled {
            if group_id.is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: format!("forwarding[{index}].group_id"),
                });
            }
            if receivers.is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: format!("forwarding[{index}].receivers_group_ids"),
                });
            }
            match self.forwarding_mode.as_deref().map(str::trim) {
                None | Some("") => ForwardingMode::All,
                Some(mode) => mode.parse()?,
            }
        } else {
            // Never selected, so an unusable mode is harmless here.
            self.forwarding_mode
                .as_deref()
                .and_then(|m| m.trim().parse().ok())
                .unwrap_or_default()
        };

        Ok(ForwardingRule {
            group_id,
            is_enabled: self.is_enabled,
            mode,
            receivers,
            addon_message: self.bot_special_addon_msg,
            reaction: self.reaction_mark,
            sender_names: self.sender_names,
            sender_uuids: self.sender_uuids,
            starts_with: self.starts_with,
            contains: self.contains,
        })
    }
}
