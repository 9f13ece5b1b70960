//! `jobworker` CLI entry-point.
//!
//! Available sub-commands:
//! - `policy`  — print the retry policy and external error-code tables.
//! - `decide`  — show what a failed job with a given error kind would turn into.
//! - `backoff` — print the delay schedule of the outbound retry wrapper.
//! - `probe`   — check that the engine gateway accepts connections, with backoff.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use engine::{execute_with_retry, BackoffConfig, CallContext, Interrupt};
use taxonomy::{policy, protocol, ClassifiedError, ErrorKind, TransportError};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "jobworker",
    about = "Failure classification and recovery for workflow job workers",
    version
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every known error kind with its code, category and retry count.
    Policy {
        #[arg(long)]
        json: bool,
    },
    /// Compute the decision for a failed job.
    Decide {
        /// Internal error kind, e.g. DATABASE_CONNECTION_FAILED.
        #[arg(long)]
        kind: String,
        /// Retries the engine still allows for the job.
        #[arg(long, default_value_t = 3)]
        remaining: u32,
        /// Diagnostic detail attached to the error.
        #[arg(long, default_value = "")]
        detail: String,
        /// Business variable as key=value; may be repeated.
        #[arg(long = "var", value_parser = parse_variable)]
        variables: Vec<(String, String)>,
    },
    /// Print the outbound backoff schedule.
    Backoff {
        #[command(flatten)]
        backoff: BackoffArgs,
    },
    /// Connect to the engine gateway, retrying transient failures.
    Probe {
        #[arg(long, env = "JOBWORKER_GATEWAY", default_value = "127.0.0.1:26500")]
        gateway: String,
        /// Give up after this many seconds overall.
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
        #[command(flatten)]
        backoff: BackoffArgs,
    },
}

#[derive(Args)]
struct BackoffArgs {
    #[arg(long, env = "JOBWORKER_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,
    #[arg(long, env = "JOBWORKER_BASE_DELAY_MS", default_value_t = 1_000)]
    base_delay_ms: u64,
    #[arg(long, env = "JOBWORKER_MAX_DELAY_MS", default_value_t = 10_000)]
    max_delay_ms: u64,
}

impl From<&BackoffArgs> for BackoffConfig {
    fn from(args: &BackoffArgs) -> Self {
        Self {
            max_retries: args.max_retries,
            base_delay: Duration::from_millis(args.base_delay_ms),
            max_delay: Duration::from_millis(args.max_delay_ms),
        }
    }
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Policy { json } => print_policy(json)?,
        Command::Decide { kind, remaining, detail, variables } => {
            let err = ClassifiedError::new(ErrorKind::custom(&kind), detail);
            let decision = engine::decide_with(err, remaining, variables);
            println!("{}", serde_json::to_string_pretty(&decision.action)?);
        }
        Command::Backoff { backoff } => {
            let config = BackoffConfig::from(&backoff);
            for (attempt, delay) in config.schedule().enumerate() {
                println!("after attempt {}: sleep {:?}", attempt + 1, delay);
            }
        }
        Command::Probe { gateway, timeout_secs, backoff } => {
            probe(&gateway, Duration::from_secs(timeout_secs), &BackoffConfig::from(&backoff))
                .await?;
        }
    }

    Ok(())
}

fn print_policy(json: bool) -> anyhow::Result<()> {
    let rows: Vec<_> = ErrorKind::known()
        .iter()
        .map(|kind| {
            serde_json::json!({
                "kind": kind.as_str(),
                "code": protocol::external_code_for(kind).unwrap_or(kind.as_str()),
                "category": kind.category(),
                "tier": policy::tier_for(kind),
                "retries": policy::retry_count_for(kind),
            })
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<32} {:<26} {:<15} {}", "KIND", "CODE", "CATEGORY", "RETRIES");
    for kind in ErrorKind::known() {
        println!(
            "{:<32} {:<26} {:<15} {}",
            kind.as_str(),
            protocol::external_code_for(kind).unwrap_or(kind.as_str()),
            kind.category(),
            policy::retry_count_for(kind)
        );
    }
    Ok(())
}

async fn probe(gateway: &str, timeout: Duration, config: &BackoffConfig) -> anyhow::Result<()> {
    let ctx = CallContext::with_timeout(timeout);

    let on_ctrl_c = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    info!("Probing engine gateway at {gateway}");
    let result = execute_with_retry(
        "gateway probe",
        || async {
            tokio::net::TcpStream::connect(gateway)
                .await
                .map(drop)
                .map_err(TransportError::from)
        },
        config,
        &ctx,
    )
    .await;

    match result {
        Ok(()) => {
            println!("gateway {gateway} is reachable");
            Ok(())
        }
        Err(err) => {
            let attempts = err.attempts();
            let interrupted = ctx.interrupted();
            let classified = ClassifiedError::from(err);
            let message = match interrupted {
                Some(Interrupt::Cancelled) => "probe cancelled".to_owned(),
                _ => format!("gateway {gateway} unreachable after {attempts} attempt(s)"),
            };
            Err(anyhow::Error::new(classified).context(message))
        }
    }
}
