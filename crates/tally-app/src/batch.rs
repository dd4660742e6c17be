// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionOutcome, StatusSink};
use crate::ids::{RecordId, SessionToken};
use crate::model::{ItemExecutionStatus, ItemState, Record};

/// Maps a free-text progress message onto an item state. Substring rules are
/// kept as-is for existing handlers.
pub fn classify(message: &str) -> ItemState {
    if message.starts_with("ERROR:") || message.contains("failed") {
        ItemState::Failed
    } else if message.contains("completed successfully") || message.contains("No migration required")
    {
        ItemState::Completed
    } else {
        ItemState::InProgress
    }
}

/// An id paired with the record it resolved to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: RecordId,
    pub record: Option<Record>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPhase {
    Running,
    Finished,
    Aborted(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Status board for one batch run. Its key set is fixed at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSession {
    token: SessionToken,
    label: String,
    order: Vec<RecordId>,
    statuses: BTreeMap<RecordId, ItemExecutionStatus>,
    phase: BatchPhase,
}

impl BatchSession {
    pub fn start(token: SessionToken, label: impl Into<String>, ids: &[RecordId]) -> Self {
        let mut statuses = BTreeMap::new();
        let mut order = Vec::with_capacity(ids.len());
        for id in ids {
            if statuses
                .insert(id.clone(), ItemExecutionStatus::pending())
                .is_none()
            {
                order.push(id.clone());
            }
        }
        Self {
            token,
            label: label.into(),
            order,
            statuses,
            phase: BatchPhase::Running,
        }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn phase(&self) -> &BatchPhase {
        &self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == BatchPhase::Running
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn status(&self, id: &RecordId) -> Option<&ItemExecutionStatus> {
        self.statuses.get(id)
    }

    /// Entries in the order the ids were handed to the run.
    pub fn entries(&self) -> impl Iterator<Item = (&RecordId, &ItemExecutionStatus)> {
        self.order
            .iter()
            .filter_map(|id| self.statuses.get(id).map(|status| (id, status)))
    }

    pub fn counts(&self) -> BatchCounts {
        self.statuses
            .values()
            .fold(BatchCounts::default(), |mut counts, status| {
                match status.state {
                    ItemState::Pending => counts.pending += 1,
                    ItemState::InProgress => counts.in_progress += 1,
                    ItemState::Completed => counts.completed += 1,
                    ItemState::Failed => counts.failed += 1,
                }
                counts
            })
    }

    /// Applies one classified message. Unknown ids and items already in a
    /// terminal state are left alone; returns whether anything changed.
    pub fn apply_status(&mut self, id: &RecordId, message: &str) -> bool {
        let Some(status) = self.statuses.get_mut(id) else {
            debug!(session = self.token.get(), %id, "status for id outside batch ignored");
            return false;
        };
        if status.state.is_terminal() {
            debug!(session = self.token.get(), %id, state = status.state.as_str(), "late status after terminal state ignored");
            return false;
        }
        status.state = classify(message);
        status.message = Some(message.to_owned());
        true
    }

    /// Forces every pending or in-progress item to failed. Returns how many
    /// items were forced.
    pub fn abort(&mut self, message: &str) -> usize {
        let mut forced = 0;
        for status in self.statuses.values_mut() {
            if !status.state.is_terminal() {
                status.state = ItemState::Failed;
                status.message = Some(message.to_owned());
                forced += 1;
            }
        }
        forced
    }

    /// Settles the run. On success, pending items stay pending.
    pub fn finish(&mut self, result: Result<(), String>) {
        match result {
            Ok(()) => {
                let counts = self.counts();
                info!(
                    session = self.token.get(),
                    completed = counts.completed,
                    failed = counts.failed,
                    pending = counts.pending,
                    "batch finished"
                );
                self.phase = BatchPhase::Finished;
            }
            Err(message) => {
                let forced = self.abort(&message);
                warn!(session = self.token.get(), forced, error = %message, "batch aborted");
                self.phase = BatchPhase::Aborted(message);
            }
        }
    }
}

/// Worker half of a batch run. Uses the action's batch handler when it has
/// one, otherwise calls the single handler item by item, never two at once.
/// The first handler error stops the loop and is returned.
pub fn execute_batch(action: &Action, items: &[BatchItem], sink: &dyn StatusSink) -> Result<()> {
    if let Some(batch) = action.batch_handler() {
        let mut ids = Vec::with_capacity(items.len());
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match well_formed(item) {
                Some(record) => {
                    ids.push(item.id.clone());
                    records.push(record.clone());
                }
                None => skip(action, item),
            }
        }
        info!(action = %action.id, items = ids.len(), "running batch handler");
        return batch.run_batch(&ids, &records, sink);
    }

    info!(action = %action.id, items = items.len(), "running sequential batch");
    for item in items {
        let Some(record) = well_formed(item) else {
            skip(action, item);
            continue;
        };
        let outcome = action.single_handler().run(&item.id, record, sink)?;
        if let ActionOutcome::Rendered(result) = outcome {
            debug!(action = %action.id, id = %item.id, title = %result.title, "batch item result not shown");
        }
    }
    Ok(())
}

fn well_formed(item: &BatchItem) -> Option<&Record> {
    if item.id.is_blank() {
        return None;
    }
    item.record.as_ref()
}

fn skip(action: &Action, item: &BatchItem) {
    warn!(
        action = %action.id,
        id = %item.id,
        has_record = item.record.is_some(),
        "skipping malformed batch item"
    );
}
