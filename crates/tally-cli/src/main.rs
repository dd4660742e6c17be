// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use runtime::{CliRuntime, DEMO_COUNT, DEMO_SEED, RecordSource};
use std::env;
use std::path::PathBuf;
use tally_app::BrowserState;
use tally_tui::AppRuntime;
use tracing::info;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `tally --print-example-config` for a template",
            options.config_path.display()
        )
    })?;

    if !options.check_only {
        logging::start_logging(&config.log_path()?, config.log_filter())?;
    }

    let source = resolve_source(&options, &config)?;
    let actions = tally_actions::build_actions(&config.actions)
        .with_context(|| format!("invalid [[actions]] in {}", options.config_path.display()))?;
    let mut runtime = CliRuntime::new(source, actions);
    let records = runtime
        .load_records()
        .with_context(|| format!("load records from {}", runtime.source().describe()))?;

    if options.check_only {
        println!(
            "ok: {} records from {}, {} actions",
            records.len(),
            runtime.source().describe(),
            config.actions.len()
        );
        return Ok(());
    }

    info!(
        config = %options.config_path.display(),
        records = records.len(),
        actions = config.actions.len(),
        "tally starting"
    );

    let mut state = BrowserState::new(records, runtime.actions(), config.items_per_page())
        .with_hide_zero(config.hide_zero());
    tally_tui::run_app(&mut state, &mut runtime)
}

/// `--demo` beats `--records`, which beats `[source].records`.
fn resolve_source(options: &CliOptions, config: &Config) -> Result<RecordSource> {
    if options.demo {
        return Ok(RecordSource::Demo {
            seed: DEMO_SEED,
            count: DEMO_COUNT,
        });
    }
    options
        .records_path
        .clone()
        .or_else(|| config.records_path())
        .map(RecordSource::File)
        .ok_or_else(|| {
            anyhow!(
                "no records to browse; pass --records <path>, set [source].records in {}, or try --demo",
                options.config_path.display()
            )
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    records_path: Option<PathBuf>,
    print_config_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        records_path: None,
        print_config_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--records" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--records requires a JSON file path"))?;
                options.records_path = Some(PathBuf::from(value.as_ref()));
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("tally: browse records and run actions on them");
    println!("  --config <path>          Use a specific config path");
    println!("  --records <path>         Browse records from a JSON file");
    println!("  --demo                   Browse generated demo records");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config, actions, and records, then exit");
    println!("  --help                   Show this help");
    println!();
    println!("Logs go to [logging].path; set TALLY_LOG to change the filter.");
}
