// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod command;
mod link;
mod webhook;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tally_app::Action;

pub use command::CommandHandler;
pub use link::LinkHandler;
pub use webhook::{WebhookClient, WebhookPayload};

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// One `[[actions]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Dashboard URL; `{id}` is replaced with the record id.
    Link { url: String },
    Webhook {
        url: String,
        #[serde(default)]
        channel: String,
        #[serde(default)]
        batch: bool,
        #[serde(default)]
        timeout: Option<String>,
    },
    Command { command: String },
}

impl ActionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Link { .. } => "link",
            Self::Webhook { .. } => "webhook",
            Self::Command { .. } => "command",
        }
    }
}

impl ActionSpec {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("action id must not be empty");
        }
        if self.label.trim().is_empty() {
            bail!("action {:?}: label must not be empty", self.id);
        }
        match &self.kind {
            ActionKind::Link { url } => {
                link::check_template(url).with_context(|| format!("action {:?}", self.id))?;
            }
            ActionKind::Webhook { url, timeout, .. } => {
                webhook::parse_endpoint(url).with_context(|| format!("action {:?}", self.id))?;
                if let Some(raw) = timeout {
                    parse_timeout(raw).with_context(|| format!("action {:?}", self.id))?;
                }
            }
            ActionKind::Command { command } => {
                if command.trim().is_empty() {
                    bail!("action {:?}: command must not be empty", self.id);
                }
            }
        }
        Ok(())
    }
}

/// Turns one `[[actions]]` entry into a menu action.
pub fn build_action(spec: &ActionSpec) -> Result<Action> {
    spec.validate()?;
    let action = match &spec.kind {
        ActionKind::Link { url } => Action::new(
            &spec.id,
            &spec.label,
            Arc::new(LinkHandler::new(&spec.label, url)?),
        ),
        ActionKind::Webhook {
            url,
            channel,
            batch,
            timeout,
        } => {
            let timeout = match timeout {
                Some(raw) => parse_timeout(raw)?,
                None => DEFAULT_WEBHOOK_TIMEOUT,
            };
            let client = Arc::new(WebhookClient::new(url, channel, timeout)?);
            let action = Action::new(&spec.id, &spec.label, client.clone());
            if *batch {
                action.with_batch(client)
            } else {
                action
            }
        }
        ActionKind::Command { command } => Action::new(
            &spec.id,
            &spec.label,
            Arc::new(CommandHandler::new(command)),
        ),
    };
    tracing::debug!(id = %spec.id, kind = spec.kind.as_str(), "action built");
    Ok(action)
}

/// Builds every configured action, rejecting duplicate ids.
pub fn build_actions(specs: &[ActionSpec]) -> Result<Vec<Action>> {
    let mut seen = BTreeSet::new();
    let mut actions = Vec::with_capacity(specs.len());
    for spec in specs {
        if !seen.insert(spec.id.as_str()) {
            bail!("duplicate action id {:?}", spec.id);
        }
        actions.push(build_action(spec)?);
    }
    Ok(actions)
}

/// Accepts `500ms`, `10s`, `2m`, or a bare number of seconds.
pub fn parse_timeout(raw: &str) -> Result<Duration> {
    let value = raw.trim();
    if value.is_empty() {
        bail!("timeout must not be empty");
    }
    let (number, unit) = match value.find(|ch: char| !ch.is_ascii_digit()) {
        Some(split) => value.split_at(split),
        None => (value, "s"),
    };
    let amount = number
        .parse::<u64>()
        .with_context(|| format!("invalid timeout {raw:?} -- expected e.g. 500ms, 10s, 2m"))?;
    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        _ => bail!("invalid timeout unit in {raw:?} -- use ms, s or m"),
    };
    if duration.is_zero() {
        bail!("timeout must be positive, got {raw:?}");
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::{ActionKind, ActionSpec, build_action, build_actions, parse_timeout};
    use anyhow::Result;
    use std::time::Duration;

    fn spec(id: &str, kind: ActionKind) -> ActionSpec {
        ActionSpec {
            id: id.to_owned(),
            label: format!("Run {id}"),
            kind,
        }
    }

    #[test]
    fn parse_timeout_units() -> Result<()> {
        assert_eq!(parse_timeout("250ms")?, Duration::from_millis(250));
        assert_eq!(parse_timeout("15")?, Duration::from_secs(15));
        assert_eq!(parse_timeout("2m")?, Duration::from_secs(120));
        assert!(parse_timeout("0s").is_err());
        assert!(parse_timeout("3h").is_err());
        assert!(parse_timeout("soon").is_err());
        Ok(())
    }

    #[test]
    fn validate_rejects_blank_fields() {
        let mut blank = spec("notify", ActionKind::Command {
            command: "  ".to_owned(),
        });
        let error = blank.validate().expect_err("blank command should fail");
        assert!(error.to_string().contains("command must not be empty"));

        blank.id = String::new();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn link_template_must_carry_placeholder() {
        let missing = spec("dash", ActionKind::Link {
            url: "https://billing.example/customers".to_owned(),
        });
        let error = missing.validate().expect_err("template without {id}");
        assert!(format!("{error:#}").contains("{id}"));
    }

    #[test]
    fn webhook_batch_flag_adds_batch_handler() -> Result<()> {
        let single = build_action(&spec("ping", ActionKind::Webhook {
            url: "http://127.0.0.1:9/hook".to_owned(),
            channel: "#billing".to_owned(),
            batch: false,
            timeout: None,
        }))?;
        assert!(single.batch_handler().is_none());

        let batched = build_action(&spec("ping-all", ActionKind::Webhook {
            url: "http://127.0.0.1:9/hook".to_owned(),
            channel: "#billing".to_owned(),
            batch: true,
            timeout: Some("500ms".to_owned()),
        }))?;
        assert!(batched.batch_handler().is_some());
        assert_eq!(batched.label, "Run ping-all");
        Ok(())
    }

    #[test]
    fn webhook_rejects_non_http_scheme() {
        let bad = spec("ping", ActionKind::Webhook {
            url: "ftp://example.com/hook".to_owned(),
            channel: String::new(),
            batch: false,
            timeout: None,
        });
        assert!(build_action(&bad).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let command = ActionKind::Command {
            command: "true".to_owned(),
        };
        let specs = vec![spec("same", command.clone()), spec("same", command)];
        let error = build_actions(&specs).expect_err("duplicate ids");
        assert!(error.to_string().contains("duplicate action id"));
    }
}
