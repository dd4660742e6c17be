// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tally_app::{Action, Record};
use tracing::{info, warn};

pub const DEMO_SEED: u64 = 7;
pub const DEMO_COUNT: usize = 42;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    File(PathBuf),
    Demo { seed: u64, count: usize },
}

impl RecordSource {
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Demo { seed, count } => format!("demo data (seed {seed}, {count} records)"),
        }
    }
}

/// Files may hold a bare array or `{ "records": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordsFile {
    Bare(Vec<Record>),
    Wrapped { records: Vec<Record> },
}

pub fn read_records_file(path: &std::path::Path) -> Result<Vec<Record>> {
    let raw = fs::read_to_string(path).with_context(|| {
        format!(
            "read records file {}; pass --records <path> or set [source].records",
            path.display()
        )
    })?;
    let parsed: RecordsFile = serde_json::from_str(&raw)
        .with_context(|| format!("parse records file {} as JSON", path.display()))?;
    let records = match parsed {
        RecordsFile::Bare(records) | RecordsFile::Wrapped { records } => records,
    };

    let mut seen = BTreeSet::new();
    for (index, record) in records.iter().enumerate() {
        if record.id.as_str().trim().is_empty() {
            bail!("record {index} in {} has an empty id", path.display());
        }
        if !seen.insert(record.id.as_str()) {
            warn!(id = %record.id, file = %path.display(), "duplicate record id");
        }
    }
    Ok(records)
}

pub struct CliRuntime {
    source: RecordSource,
    actions: Vec<Action>,
}

impl CliRuntime {
    pub fn new(source: RecordSource, actions: Vec<Action>) -> Self {
        Self { source, actions }
    }

    pub fn source(&self) -> &RecordSource {
        &self.source
    }
}

impl tally_tui::AppRuntime for CliRuntime {
    fn load_records(&mut self) -> Result<Vec<Record>> {
        let records = match &self.source {
            RecordSource::File(path) => read_records_file(path)?,
            RecordSource::Demo { seed, count } => tally_testkit::demo_records(*seed, *count),
        };
        info!(source = %self.source.describe(), count = records.len(), "records loaded");
        Ok(records)
    }

    fn actions(&self) -> Vec<Action> {
        self.actions.clone()
    }
}
