//! # Avalon - Streaming Test-Data Generator
//!
//! Synthesizes records that imitate real system outputs (IDS alerts,
//! firewall logs, network flows) at a user-controlled rate, pushes them
//! through mapping chains, serializes them in batches, and delivers them to
//! stdout, files, HTTP endpoints, or Kafka topics.
//!
//! ## Usage
//!
//! ```bash
//! # three snort alerts as JSON lines into a file
//! avalon snort --number=3 --file-name=/tmp/a.jsonl
//!
//! # weighted mix: three snort records for every asa record
//! avalon "snort3 asa1" --number=400 --batch-size=10
//!
//! # 5000 records capped at 1000 records/s to a Kafka topic
//! avalon snort --rate=1000 --number=5000 --kafka-topic=synthetic-logs
//!
//! # drop half the records through an inline mapping; 100 still arrive
//! avalon snort --map=file:///tmp/drop_half.map --number=100
//! ```
//!
//! The first interrupt drains queued writes (30 s by default); a second one
//! aborts immediately.

use std::time::Duration;

use clap::FromArgMatches;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avalon_core::args::{HookContext, ParserSpec};
use avalon_core::scheduler::{run_pipeline, PipelineConfig};
use avalon_core::{parse_producer_specs, AvalonError, Generic, Registry, EXIT_FAILURE};

mod cli;
mod generics;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("avalon: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run() -> Result<(), AvalonError> {
    let mut registry = Registry::default();
    avalon_models::register(&mut registry)?;
    avalon_tx::register(&mut registry)?;
    avalon_io::register(&mut registry)?;
    generics::register(&mut registry)?;

    // Generic hooks observe parser assembly and the parse results, in stable
    // title order.
    let mut hooks: Vec<(String, Box<dyn Generic>)> = registry
        .generics()
        .map(|entry| (entry.meta.title.to_string(), (entry.build)()))
        .collect();

    let mut parser = ParserSpec::default();
    for (title, hook) in &mut hooks {
        hook.pre_add_args(&mut parser).map_err(|err| hook_failure(title, err))?;
    }
    registry.contribute_args(&mut parser);
    for (title, hook) in &mut hooks {
        hook.post_add_args(&mut parser).map_err(|err| hook_failure(title, err))?;
    }

    let matches = match cli::build_command(&parser).try_get_matches() {
        Ok(matches) => matches,
        Err(err) => err.exit(),
    };
    let core = match cli::CoreArgs::from_arg_matches(&matches) {
        Ok(core) => core,
        Err(err) => err.exit(),
    };

    if let Some(shell) = core.completion_script {
        let mut cmd = cli::build_command(&parser);
        clap_complete::generate(shell, &mut cmd, "avalon", &mut std::io::stdout());
        return Ok(());
    }
    if cli::handle_lists(&registry, &core) {
        return Ok(());
    }

    let parsed = cli::collect_parsed(&parser, &matches);
    let (log_filter, seed) = {
        let mut ctx = HookContext::new(&parsed);
        for (title, hook) in &mut hooks {
            hook.post_parse_args(&mut ctx).map_err(|err| hook_failure(title, err))?;
        }
        (ctx.log_filter.take(), ctx.seed)
    };

    init_tracing(log_filter.as_deref().unwrap_or("info"));
    registry.check_arg_bindings();

    if let Some(rate) = core.rate {
        if rate <= 0.0 {
            return Err(AvalonError::config("--rate must be a positive number of records/s"));
        }
    }
    if core.batch_size == 0 {
        return Err(AvalonError::config("--batch-size must be at least 1"));
    }
    if core.output_writers == 0 {
        return Err(AvalonError::config("--output-writers must be at least 1"));
    }

    let specs = parse_producer_specs(&core.models)?;

    let format_supplied = matches.value_source("output_format")
        == Some(clap::parser::ValueSource::CommandLine);
    let format_title = if core.textlog {
        if format_supplied {
            return Err(AvalonError::config("--textlog conflicts with --output-format"));
        }
        "text-log".to_string()
    } else {
        core.output_format.clone()
    };
    let format_entry = registry
        .format(&format_title)
        .ok_or_else(|| AvalonError::config(format!("unknown format: {format_title}")))?;

    let medium_entry = cli::choose_medium(&registry, &parsed, core.output_media.as_deref())?;
    let seed = seed.unwrap_or_else(|| rand::rng().random());
    tracing::debug!(
        format = %format_title,
        medium = medium_entry.meta.title,
        seed,
        "pipeline configuration resolved"
    );
    let producers =
        cli::build_producers(&registry, &specs, &parsed, seed, format_entry, &core.map)?;
    let mediums = cli::build_mediums(medium_entry, &parsed, seed, core.output_writers)?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, draining queued writes");
            signal_cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::error!("second interrupt, aborting");
                std::process::exit(EXIT_FAILURE);
            }
        }
    });

    let report = run_pipeline(
        PipelineConfig {
            number: core.number,
            rate: core.rate,
            batch_size: core.batch_size,
            writers: core.output_writers,
            drain_timeout: Duration::from_secs(core.drain_timeout),
        },
        producers,
        mediums,
        cancel,
    )
    .await?;
    tracing::info!(emitted = report.emitted, "avalon finished");
    Ok(())
}

fn init_tracing(directive: &str) {
    // data goes to stdout; diagnostics stay on stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn hook_failure(title: &str, source: anyhow::Error) -> AvalonError {
    AvalonError::GenericHookFailed { title: title.to_string(), source }
}
