// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub const LOG_FILTER_ENV: &str = "TALLY_LOG";

/// `TALLY_LOG` wins over the configured filter.
pub fn resolve_filter(from_env: Option<&str>, configured: &str) -> Result<EnvFilter> {
    match from_env.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => EnvFilter::try_new(raw)
            .map_err(|error| anyhow!("{LOG_FILTER_ENV}={raw:?} is not a valid filter ({error})")),
        None => EnvFilter::try_new(configured)
            .map_err(|error| anyhow!("log filter {configured:?} is not valid ({error})")),
    }
}

/// Sends tracing output to `path`. The terminal belongs to the UI, so
/// nothing is written to stdout or stderr.
pub fn start_logging(path: &Path, configured_filter: &str) -> Result<()> {
    let from_env = std::env::var(LOG_FILTER_ENV).ok();
    let filter = resolve_filter(from_env.as_deref(), configured_filter)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| {
            format!(
                "open log file {}; set [logging].path to a writable location",
                path.display()
            )
        })?;

    let subscriber = Registry::default().with(
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(Mutex::new(file))
            .with_filter(filter),
    );
    tracing::subscriber::set_global_default(subscriber).context("install log subscriber")?;
    Ok(())
}
