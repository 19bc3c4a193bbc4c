//! admissionctl - inspect and exercise admission configurations
//!
//! ```bash
//! # Check a configuration file
//! admissionctl validate config/admission.yaml
//!
//! # Replay a burst of 20 requests, one every 0.5 s, against an in-memory store
//! admissionctl simulate config/admission.yaml --identifier alice --count 20 --interval 0.5
//! ```

#![allow(missing_docs)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use llm_admission::config::LoggingConfig;
use llm_admission::utils::init_logging;
use llm_admission::{
    AdmissionController, AdmissionRequest, Clock, Config, ManualClock, MemoryStore, QuotaType,
    Scope, SystemClock,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "admissionctl")]
#[command(about = "Validate and simulate LLM admission control configurations")]
#[command(version)]
struct Cli {
    /// Log filter, e.g. `info` or `llm_admission=debug`
    #[arg(long, global = true, env = "LLM_ADMISSION_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and validate a configuration file
    Validate {
        /// Path to the YAML configuration
        config: PathBuf,
    },
    /// Replay a burst of requests against an in-memory store
    Simulate {
        /// Path to the YAML configuration
        config: PathBuf,
        /// Scope the requests are charged under
        #[arg(long, default_value = "user")]
        scope: Scope,
        /// Scope member issuing the requests
        #[arg(long, default_value = "demo")]
        identifier: String,
        /// Upstream provider
        #[arg(long, default_value = "openai")]
        provider: String,
        /// Quota metric
        #[arg(long, default_value = "requests")]
        quota_type: QuotaType,
        /// Estimated and settled cost of each request
        #[arg(long, default_value_t = 1.0)]
        cost: f64,
        /// Number of requests
        #[arg(long, default_value_t = 10)]
        count: u32,
        /// Simulated seconds between requests
        #[arg(long, default_value_t = 0.0)]
        interval: f64,
        /// Print the final statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: cli.log_level.clone(),
        json: false,
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("Warning: {}", e);
    }

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Validate { config } => validate(config).await,
        Command::Simulate {
            config,
            scope,
            identifier,
            provider,
            quota_type,
            cost,
            count,
            interval,
            json,
        } => {
            if !interval.is_finite() || interval < 0.0 {
                bail!("--interval must be a non-negative number of seconds");
            }
            let config = load(&config).await?;
            let request = AdmissionRequest::new(scope, identifier, provider, quota_type, cost);
            simulate(&config, request, count, interval, json).await
        }
    }
}

async fn load(path: &Path) -> Result<Config> {
    Config::from_file(path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))
}

async fn validate(path: PathBuf) -> Result<()> {
    let config = load(&path).await?;

    println!("{}: ok", path.display());
    println!("  storage backend:  {:?}", config.storage().backend);
    println!("  failure policy:   {:?}", config.failure_policy());
    println!(
        "  rate limit rules: {}{}",
        config.rate_limit().rules.len(),
        if config.rate_limit().enabled { "" } else { " (disabled)" }
    );
    for rule in &config.rate_limit().rules {
        println!(
            "    - {} [{}] {} per {}s ({})",
            rule.name, rule.scope, rule.limit, rule.window_secs, rule.strategy
        );
    }
    println!(
        "  quota scopes:     {}{}",
        config.quota().scopes.len(),
        if config.quota().enabled { "" } else { " (disabled)" }
    );
    Ok(())
}

async fn simulate(
    config: &Config,
    request: AdmissionRequest,
    count: u32,
    interval: f64,
    json: bool,
) -> Result<()> {
    let clock = Arc::new(ManualClock::new(SystemClock::new().now()));
    let controller =
        AdmissionController::with_store(config, Arc::new(MemoryStore::new()), clock.clone());

    for i in 0..count {
        if i > 0 {
            clock.advance(interval);
        }
        let at = i as f64 * interval;

        match controller.admit(request.clone()).await {
            Ok(ticket) => {
                let remaining = ticket.remaining_quota();
                controller.settle(ticket, request.estimated_cost).await?;
                match remaining {
                    Some(remaining) => {
                        println!("#{:<4} t={:>8.2}s  admitted  quota left {}", i + 1, at, remaining)
                    }
                    None => println!("#{:<4} t={:>8.2}s  admitted", i + 1, at),
                }
            }
            Err(e) if e.is_denial() => {
                let detail = e.denial_detail();
                let hint = match (detail.retry_after_secs, detail.reset_at) {
                    (Some(secs), _) => format!("retry after {}s", secs),
                    (None, Some(reset_at)) => format!("resets at {}", reset_at),
                    (None, None) => String::new(),
                };
                println!("#{:<4} t={:>8.2}s  {:<9} {}", i + 1, at, detail.code, hint);
            }
            Err(e) => return Err(e).context("admission failed"),
        }
    }

    let stats = controller.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "admitted {}, rate limited {}, quota denied {} (denial rate {:.1}%)",
            stats.admitted,
            stats.rate_limited,
            stats.quota_denied,
            stats.denial_rate() * 100.0
        );
    }
    Ok(())
}
