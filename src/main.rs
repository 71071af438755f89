// Command-line front end: resolve one link, print the outcome as JSON

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tube_resolver::resolver::{ConfigError, ResolutionOutcome, Resolver, ResolverConfig};

/// Resolve a YouTube link to a directly playable media URL
#[derive(Parser, Debug)]
#[command(name = "tube-resolver")]
#[command(version)]
struct Args {
    /// Watch, short, embed or youtu.be link
    url: String,

    /// Config file (default: <config dir>/tube-resolver/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Outbound proxy, e.g. socks5h://127.0.0.1:1080
    #[arg(long)]
    proxy: Option<String>,

    /// Netscape cookies.txt
    #[arg(long)]
    cookies: Option<PathBuf>,

    #[arg(long)]
    tier1_deadline_ms: Option<u64>,

    #[arg(long)]
    engine_timeout_ms: Option<u64>,

    /// Print the attempt log along with the outcome
    #[arg(long)]
    report: bool,

    /// Debug logging (RUST_LOG wins when set)
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "tube_resolver=debug" } else { "tube_resolver=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(args: &Args) -> Result<ResolverConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => ResolverConfig::load(path)?,
        None => ResolverConfig::load_or_default()?,
    }
    .apply_env()?;

    if args.proxy.is_some() {
        config = config.with_proxy(args.proxy.clone());
    }
    if args.cookies.is_some() {
        config = config.with_cookies_path(args.cookies.clone());
    }
    if let Some(ms) = args.tier1_deadline_ms {
        config = config.with_tier1_deadline(ms);
    }
    if let Some(ms) = args.engine_timeout_ms {
        config = config.with_engine_timeout(ms);
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return ExitCode::from(1);
        }
    };
    let resolver = match Resolver::from_config(&config).await {
        Ok(resolver) => resolver,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return ExitCode::from(1);
        }
    };
    info!(engines = ?resolver.table(), "Resolver ready");

    let report = match resolver.resolve_with_report(&args.url).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Cannot resolve");
            return ExitCode::from(1);
        }
    };

    if args.report {
        for attempt in &report.attempts {
            eprintln!(
                "  tier {} {:<10} {:?} ({} ms)",
                attempt.tier,
                attempt.engine,
                attempt.status,
                attempt.elapsed.as_millis()
            );
        }
    }

    match serde_json::to_string_pretty(&report.outcome) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!(error = %e, "Failed to serialize outcome");
            return ExitCode::from(1);
        }
    }

    match report.outcome {
        ResolutionOutcome::Resolved(_) => ExitCode::SUCCESS,
        ResolutionOutcome::Absent => ExitCode::from(2),
    }
}
