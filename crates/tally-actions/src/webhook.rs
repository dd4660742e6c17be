// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tally_app::{ActionHandler, ActionOutcome, BatchHandler, Record, RecordId, StatusSink};
use tracing::{debug, info};
use url::Url;

pub const SENT_MESSAGE: &str = "Notification completed successfully";
const SENDING_MESSAGE: &str = "sending notification";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload<'a> {
    pub channel: &'a str,
    pub id: &'a str,
    pub name: &'a str,
    pub value_cents: i64,
}

impl<'a> WebhookPayload<'a> {
    pub fn new(channel: &'a str, record: &'a Record) -> Self {
        Self {
            channel,
            id: record.id.as_str(),
            name: &record.name,
            value_cents: record.computed_value(),
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchPayload<'a> {
    channel: &'a str,
    items: Vec<WebhookPayload<'a>>,
}

/// Optional per-item verdicts a receiver may send back for a batch post.
#[derive(Debug, Deserialize)]
struct BatchReply {
    #[serde(default)]
    results: Vec<ItemReply>,
}

#[derive(Debug, Deserialize)]
struct ItemReply {
    id: String,
    ok: bool,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Text(String),
    Detailed { message: String },
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    endpoint: Url,
    channel: String,
    timeout: Duration,
    http: HttpClient,
}

pub(crate) fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid webhook url {raw:?}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("webhook url {raw:?} must use http or https");
    }
    Ok(url)
}

impl WebhookClient {
    pub fn new(url: &str, channel: &str, timeout: Duration) -> Result<Self> {
        let endpoint = parse_endpoint(url)?;
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            endpoint,
            channel: channel.to_owned(),
            timeout,
            http,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .map_err(|error| connection_error(&self.endpoint, error))?;

        let status = response.status();
        let text = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(clean_error_response(status, &text));
        }
        Ok(text)
    }
}

impl ActionHandler for WebhookClient {
    fn run(
        &self,
        id: &RecordId,
        record: &Record,
        status: &dyn StatusSink,
    ) -> Result<ActionOutcome> {
        status.report(id, SENDING_MESSAGE);
        self.post(&WebhookPayload::new(&self.channel, record))?;
        debug!(endpoint = %self.endpoint, %id, "webhook delivered");
        status.report(id, SENT_MESSAGE);
        Ok(ActionOutcome::Done)
    }
}

impl BatchHandler for WebhookClient {
    fn run_batch(
        &self,
        ids: &[RecordId],
        records: &[Record],
        status: &dyn StatusSink,
    ) -> Result<()> {
        for id in ids {
            status.report(id, SENDING_MESSAGE);
        }
        let payload = BatchPayload {
            channel: &self.channel,
            items: records
                .iter()
                .map(|record| WebhookPayload::new(&self.channel, record))
                .collect(),
        };
        let body = self.post(&payload)?;
        info!(endpoint = %self.endpoint, items = ids.len(), "batch webhook delivered");

        let reply = serde_json::from_str::<BatchReply>(&body)
            .map(|reply| reply.results)
            .unwrap_or_default();
        if reply.is_empty() {
            for id in ids {
                status.report(id, SENT_MESSAGE);
            }
            return Ok(());
        }
        for item in reply {
            let id = RecordId::new(item.id);
            if item.ok {
                status.report(&id, SENT_MESSAGE);
            } else {
                let reason = if item.message.is_empty() {
                    "rejected by receiver"
                } else {
                    item.message.as_str()
                };
                status.report(&id, &format!("ERROR: {reason}"));
            }
        }
        Ok(())
    }
}

fn connection_error(endpoint: &Url, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("webhook {endpoint} timed out -- raise the action's timeout ({error})");
    }
    anyhow!("cannot reach webhook {endpoint} -- check the action url ({error})")
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(error) = parsed.error
    {
        let message = match error {
            ErrorBody::Text(text) => text,
            ErrorBody::Detailed { message } => message,
        };
        if !message.is_empty() {
            return anyhow!("webhook failed ({}): {}", status.as_u16(), message);
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() < 100 && !trimmed.contains('{') {
        return anyhow!("webhook failed ({}): {}", status.as_u16(), trimmed);
    }

    anyhow!("webhook failed ({})", status.as_u16())
}
