// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::ids::{DismissToken, RecordId, RequestId};
use crate::model::{Record, RenderedResult};

/// Progress channel handed to handlers. Messages are free text; see
/// [`crate::classify`] for how they map onto item states.
pub trait StatusSink: Send + Sync {
    fn report(&self, id: &RecordId, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    Value(String),
    Rendered(RenderedResult),
}

pub trait ActionHandler: Send + Sync {
    fn run(&self, id: &RecordId, record: &Record, status: &dyn StatusSink)
    -> Result<ActionOutcome>;
}

pub trait BatchHandler: Send + Sync {
    fn run_batch(&self, ids: &[RecordId], records: &[Record], status: &dyn StatusSink)
    -> Result<()>;
}

struct FnHandler<F>(F);

impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&RecordId, &Record, &dyn StatusSink) -> Result<ActionOutcome> + Send + Sync,
{
    fn run(
        &self,
        id: &RecordId,
        record: &Record,
        status: &dyn StatusSink,
    ) -> Result<ActionOutcome> {
        (self.0)(id, record, status)
    }
}

struct FnBatchHandler<F>(F);

impl<F> BatchHandler for FnBatchHandler<F>
where
    F: Fn(&[RecordId], &[Record], &dyn StatusSink) -> Result<()> + Send + Sync,
{
    fn run_batch(
        &self,
        ids: &[RecordId],
        records: &[Record],
        status: &dyn StatusSink,
    ) -> Result<()> {
        (self.0)(ids, records, status)
    }
}

pub fn handler_fn<F>(handler: F) -> Arc<dyn ActionHandler>
where
    F: Fn(&RecordId, &Record, &dyn StatusSink) -> Result<ActionOutcome> + Send + Sync + 'static,
{
    Arc::new(FnHandler(handler))
}

pub fn batch_handler_fn<F>(handler: F) -> Arc<dyn BatchHandler>
where
    F: Fn(&[RecordId], &[Record], &dyn StatusSink) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(FnBatchHandler(handler))
}

#[derive(Clone)]
pub struct Action {
    pub id: String,
    pub label: String,
    single: Arc<dyn ActionHandler>,
    batch: Option<Arc<dyn BatchHandler>>,
}

impl Action {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        single: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            single,
            batch: None,
        }
    }

    pub fn with_batch(mut self, batch: Arc<dyn BatchHandler>) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn single_handler(&self) -> &dyn ActionHandler {
        self.single.as_ref()
    }

    pub fn batch_handler(&self) -> Option<&dyn BatchHandler> {
        self.batch.as_deref()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("batch", &self.batch.is_some())
            .finish()
    }
}

/// Runs handler code, turning a panic into an ordinary error so a worker
/// thread always reports back.
pub fn guard_panics<T>(run: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|text| (*text).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            Err(anyhow!("handler panicked: {detail}"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuPhase {
    Open,
    Executing {
        request: RequestId,
        label: String,
    },
    /// Error on screen until the dismiss timer carrying `token` fires.
    Failed {
        message: String,
        token: DismissToken,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMenu {
    cursor: usize,
    phase: MenuPhase,
    status: Option<String>,
}

impl Default for ActionMenu {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionMenu {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            phase: MenuPhase::Open,
            status: None,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phase(&self) -> &MenuPhase {
        &self.phase
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == MenuPhase::Open
    }

    pub fn move_cursor(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let next = if delta.is_negative() {
            self.cursor.saturating_sub(delta.unsigned_abs())
        } else {
            self.cursor.saturating_add(delta as usize)
        };
        self.cursor = next.min(len - 1);
    }

    pub fn begin(&mut self, request: RequestId, label: impl Into<String>) {
        self.status = None;
        self.phase = MenuPhase::Executing {
            request,
            label: label.into(),
        };
    }

    pub fn executing_request(&self) -> Option<RequestId> {
        match self.phase {
            MenuPhase::Executing { request, .. } => Some(request),
            _ => None,
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    pub fn fail(&mut self, message: impl Into<String>, token: DismissToken) {
        let message = message.into();
        self.status = Some(message.clone());
        self.phase = MenuPhase::Failed { message, token };
    }

    pub fn dismiss_token(&self) -> Option<DismissToken> {
        match self.phase {
            MenuPhase::Failed { token, .. } => Some(token),
            _ => None,
        }
    }
}
