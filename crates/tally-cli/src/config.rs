// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tally_actions::ActionSpec;
use tally_app::DEFAULT_ITEMS_PER_PAGE;

pub const APP_NAME: &str = "tally";
pub const CONFIG_PATH_ENV: &str = "TALLY_CONFIG_PATH";
const CONFIG_VERSION: i64 = 1;
const MAX_ITEMS_PER_PAGE: i64 = 500;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            source: Source::default(),
            ui: Ui::default(),
            logging: Logging::default(),
            actions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Source {
    /// JSON file holding an array of records.
    pub records: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    pub items_per_page: Option<i64>,
    pub hide_zero: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Logging {
    pub path: Option<String>,
    pub filter: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version; add `version = {CONFIG_VERSION}` at the top",
                    path.display()
                )
            })?;
        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = {CONFIG_VERSION}",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(records) = &self.source.records
            && records.trim().is_empty()
        {
            bail!(
                "source.records in {} must not be blank; remove it or point it at a JSON file",
                path.display()
            );
        }

        if let Some(per_page) = self.ui.items_per_page
            && !(1..=MAX_ITEMS_PER_PAGE).contains(&per_page)
        {
            bail!(
                "ui.items_per_page in {} must be between 1 and {MAX_ITEMS_PER_PAGE}, got {}",
                path.display(),
                per_page
            );
        }

        if let Some(filter) = &self.logging.filter {
            tracing_subscriber::EnvFilter::try_new(filter).map_err(|error| {
                anyhow!(
                    "logging.filter in {} is not a valid filter ({error}), got {:?}",
                    path.display(),
                    filter
                )
            })?;
        }

        let mut seen = BTreeSet::new();
        for (index, spec) in self.actions.iter().enumerate() {
            spec.validate()
                .with_context(|| format!("actions[{index}] in {}", path.display()))?;
            if !seen.insert(spec.id.as_str()) {
                bail!(
                    "actions[{index}] in {} reuses action id {:?}",
                    path.display(),
                    spec.id
                );
            }
        }

        Ok(())
    }

    pub fn records_path(&self) -> Option<PathBuf> {
        self.source.records.as_deref().map(PathBuf::from)
    }

    pub fn items_per_page(&self) -> usize {
        self.ui
            .items_per_page
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(DEFAULT_ITEMS_PER_PAGE)
    }

    pub fn hide_zero(&self) -> bool {
        self.ui.hide_zero.unwrap_or(false)
    }

    pub fn log_filter(&self) -> &str {
        self.logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.logging.path {
            return Ok(PathBuf::from(path));
        }
        let data_root = dirs::data_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [logging].path in the config")
        })?;
        Ok(data_root.join(APP_NAME).join("tally.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            r##"# tally config
# Place this file at: {}

version = {CONFIG_VERSION}

[source]
# JSON array of records; --records overrides it and --demo ignores it.
# records = "/absolute/path/to/records.json"

[ui]
items_per_page = {DEFAULT_ITEMS_PER_PAGE}
hide_zero = false

[logging]
# Default is the platform data dir (for example ~/.local/share/tally/tally.log)
# path = "/absolute/path/to/tally.log"
# TALLY_LOG overrides this when set.
filter = "{DEFAULT_LOG_FILTER}"

[[actions]]
id = "dashboard"
label = "Open in dashboard"
kind = "link"
url = "https://billing.example.com/customers/{{id}}"

[[actions]]
id = "notify"
label = "Notify account owner"
kind = "webhook"
url = "https://hooks.example.com/tally"
channel = "#billing"
batch = true
timeout = "10s"

[[actions]]
id = "export"
label = "Export to CRM"
kind = "command"
command = "crm-export --id \"$TALLY_RECORD_ID\""
"##,
            path.display(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{CONFIG_PATH_ENV, Config};
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use tally_actions::ActionKind;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.items_per_page(), 10);
        assert!(!config.hide_zero());
        assert_eq!(config.log_filter(), "info");
        assert!(config.records_path().is_none());
        assert!(config.actions.is_empty());
        Ok(())
    }

    #[test]
    fn full_config_parses_every_section() -> Result<()> {
        let (_temp, path) = write_config(
            r##"version = 1
[source]
records = "/data/accounts.json"
[ui]
items_per_page = 25
hide_zero = true
[logging]
path = "/tmp/tally-test.log"
filter = "tally_app=debug,info"

[[actions]]
id = "open"
label = "Open"
kind = "link"
url = "https://billing.example/c/{id}"

[[actions]]
id = "notify"
label = "Notify"
kind = "webhook"
url = "http://localhost:9000/hook"
channel = "#ops"
batch = true
"##,
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.records_path(), Some(PathBuf::from("/data/accounts.json")));
        assert_eq!(config.items_per_page(), 25);
        assert!(config.hide_zero());
        assert_eq!(config.log_path()?, PathBuf::from("/tmp/tally-test.log"));
        assert_eq!(config.log_filter(), "tally_app=debug,info");
        assert_eq!(config.actions.len(), 2);
        assert_eq!(config.actions[0].kind.as_str(), "link");
        assert!(matches!(
            config.actions[1].kind,
            ActionKind::Webhook { batch: true, .. }
        ));
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[ui]\nhide_zero = true\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        assert!(error.to_string().contains("add `version = 1`"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 3\n")?;
        let error = Config::load(&path).expect_err("v3 config should fail");
        assert!(error.to_string().contains("unsupported config version 3"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn items_per_page_must_be_positive() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[ui]\nitems_per_page = 0\n")?;
        let error = Config::load(&path).expect_err("zero page size should fail");
        let message = error.to_string();
        assert!(message.contains("ui.items_per_page"), "unexpected: {message}");
        assert!(message.contains(&path.display().to_string()));
        Ok(())
    }

    #[test]
    fn invalid_log_filter_names_the_key() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[logging]\nfilter = \"tally=loud\"\n")?;
        let error = Config::load(&path).expect_err("bad filter should fail");
        assert!(error.to_string().contains("logging.filter"));
        Ok(())
    }

    #[test]
    fn invalid_action_names_its_index_and_id() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[[actions]]\nid = \"open\"\nlabel = \"Open\"\nkind = \"link\"\nurl = \"https://billing.example/c\"\n",
        )?;
        let error = Config::load(&path).expect_err("template without {id} should fail");
        let message = format!("{error:#}");
        assert!(message.contains("actions[0]"), "unexpected: {message}");
        assert!(message.contains("\"open\""), "unexpected: {message}");
        Ok(())
    }

    #[test]
    fn duplicate_action_ids_are_rejected() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[[actions]]\nid = \"run\"\nlabel = \"One\"\nkind = \"command\"\ncommand = \"true\"\n[[actions]]\nid = \"run\"\nlabel = \"Two\"\nkind = \"command\"\ncommand = \"false\"\n",
        )?;
        let error = Config::load(&path).expect_err("duplicate ids should fail");
        assert!(error.to_string().contains("actions[1]"));
        Ok(())
    }

    #[test]
    fn unknown_action_kind_fails_to_decode() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[[actions]]\nid = \"x\"\nlabel = \"X\"\nkind = \"carrier_pigeon\"\n",
        )?;
        let error = Config::load(&path).expect_err("unknown kind should fail");
        assert!(error.to_string().contains("decode config"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn default_path_lives_under_tally_dir() -> Result<()> {
        let _guard = env_lock();
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
        let path = Config::default_path()?;
        assert!(path.ends_with("tally/config.toml"), "got {}", path.display());
        Ok(())
    }

    #[test]
    fn example_config_round_trips_through_load() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path))?;
        let config = Config::load(&path)?;
        let kinds = config
            .actions
            .iter()
            .map(|spec| spec.kind.as_str())
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec!["link", "webhook", "command"]);
        assert_eq!(config.items_per_page(), 10);
        Ok(())
    }
}
