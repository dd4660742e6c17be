// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::thread;
use tally_app::{ActionHandler, ActionOutcome, Record, RecordId, StatusSink};
use tracing::debug;

/// Runs a shell command per record. Each stdout line is a status message;
/// the last one becomes the action's value.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    command: String,
}

impl CommandHandler {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_owned(),
        }
    }
}

impl ActionHandler for CommandHandler {
    fn run(
        &self,
        id: &RecordId,
        record: &Record,
        status: &dyn StatusSink,
    ) -> Result<ActionOutcome> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("TALLY_RECORD_ID", id.as_str())
            .env("TALLY_RECORD_NAME", &record.name)
            .env("TALLY_RECORD_VALUE", record.computed_value().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn `{}`", self.command))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr of `{}` not captured", self.command))?;
        let stderr_reader = thread::spawn(move || {
            BufReader::new(stderr)
                .lines()
                .map_while(Result::ok)
                .filter(|line| !line.trim().is_empty())
                .last()
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout of `{}` not captured", self.command))?;
        let mut last_line = None;
        for line in BufReader::new(stdout).lines() {
            let line = line.with_context(|| format!("read output of `{}`", self.command))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            status.report(id, line);
            last_line = Some(line.to_owned());
        }

        let exit = child
            .wait()
            .with_context(|| format!("wait for `{}`", self.command))?;
        let last_error = stderr_reader.join().ok().flatten();
        debug!(command = %self.command, %id, code = ?exit.code(), "command finished");

        if !exit.success() {
            let code = exit
                .code()
                .map_or_else(|| "a signal".to_owned(), |code| format!("code {code}"));
            match last_error {
                Some(detail) => bail!("command exited with {code}: {detail}"),
                None => bail!("command exited with {code}"),
            }
        }
        Ok(last_line.map_or(ActionOutcome::Done, ActionOutcome::Value))
    }
}

#[cfg(test)]
mod tests {
    use super::CommandHandler;
    use anyhow::Result;
    use std::sync::Mutex;
    use tally_app::{
        ActionHandler, ActionOutcome, ItemState, LineItem, Record, RecordId, StatusSink, classify,
    };

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl Lines {
        fn snapshot(&self) -> Vec<String> {
            self.0.lock().map(|lines| lines.clone()).unwrap_or_default()
        }
    }

    impl StatusSink for Lines {
        fn report(&self, _id: &RecordId, message: &str) {
            if let Ok(mut lines) = self.0.lock() {
                lines.push(message.to_owned());
            }
        }
    }

    fn record() -> Record {
        let mut record = Record::new("cus_7", "Cedar Analytics");
        record.line_items = vec![LineItem {
            description: "business plan".to_owned(),
            amount_cents: 29_900,
        }];
        record
    }

    #[test]
    fn stdout_lines_become_status_messages() -> Result<()> {
        let handler =
            CommandHandler::new("echo migrating; echo; echo 'Migration completed successfully'");
        let sink = Lines::default();
        let record = record();
        let outcome = handler.run(&record.id, &record, &sink)?;
        assert_eq!(
            sink.snapshot(),
            vec![
                "migrating".to_owned(),
                "Migration completed successfully".to_owned()
            ]
        );
        assert_eq!(
            outcome,
            ActionOutcome::Value("Migration completed successfully".to_owned())
        );
        assert_eq!(
            sink.snapshot().last().map(|line| classify(line)),
            Some(ItemState::Completed)
        );
        Ok(())
    }

    #[test]
    fn record_is_exposed_through_environment() -> Result<()> {
        let handler = CommandHandler::new(
            "echo \"$TALLY_RECORD_ID|$TALLY_RECORD_NAME|$TALLY_RECORD_VALUE\"",
        );
        let record = record();
        let outcome = handler.run(&record.id, &record, &Lines::default())?;
        assert_eq!(
            outcome,
            ActionOutcome::Value("cus_7|Cedar Analytics|29900".to_owned())
        );
        Ok(())
    }

    #[test]
    fn silent_success_is_done() -> Result<()> {
        let record = record();
        let outcome = CommandHandler::new("true").run(&record.id, &record, &Lines::default())?;
        assert_eq!(outcome, ActionOutcome::Done);
        Ok(())
    }

    #[test]
    fn non_zero_exit_carries_last_stderr_line() {
        let handler = CommandHandler::new("echo working; echo first >&2; echo 'quota exceeded' >&2; exit 3");
        let record = record();
        let error = handler
            .run(&record.id, &record, &Lines::default())
            .expect_err("exit 3 should fail");
        assert_eq!(error.to_string(), "command exited with code 3: quota exceeded");
    }

    #[test]
    fn script_files_run_from_a_temp_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let script = dir.path().join("notify.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"notified $1\"\n")?;
        let handler = CommandHandler::new(&format!(
            "sh {} \"$TALLY_RECORD_ID\"",
            script.display()
        ));
        let record = record();
        let outcome = handler.run(&record.id, &record, &Lines::default())?;
        assert_eq!(outcome, ActionOutcome::Value("notified cus_7".to_owned()));
        Ok(())
    }
}
