use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use game_gateway::resilience::{retry_with_backoff, ErrorClass, RetryPolicy};
use reqwest::StatusCode;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the game API gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Liveness and in-flight counters
    Health,
    /// Readiness and per-route breaker state
    Ready {
        /// Keep polling until the gateway reports ready
        #[arg(long)]
        wait: bool,
        /// Polling attempts when waiting
        #[arg(long, default_value_t = 10)]
        attempts: u32,
    },
    /// Prometheus metrics, optionally filtered by family prefix
    Metrics {
        #[arg(long)]
        filter: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum ProbeError {
    #[error("gateway unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("gateway not ready ({0})")]
    NotReady(StatusCode),

    #[error("unexpected status {0}")]
    Unexpected(StatusCode),
}

fn classify(e: &ProbeError) -> ErrorClass {
    match e {
        ProbeError::Unreachable(_) | ProbeError::NotReady(_) => ErrorClass::Transient,
        ProbeError::Unexpected(_) => ErrorClass::Permanent,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(cli.timeout_ms))
        .build()?;
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{base}/health")).send().await?;
            print_response(res).await
        }
        Commands::Ready { wait, attempts } => {
            let policy = RetryPolicy {
                max_attempts: if wait { attempts } else { 1 },
                base_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(5),
            };
            let url = format!("{base}/ready");
            let result = retry_with_backoff(&policy, || probe_ready(&client, &url), classify).await;

            match result {
                Ok(json) => {
                    println!("{}", serde_json::to_string_pretty(&json)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Metrics { filter } => {
            let res = client.get(format!("{base}/metrics")).send().await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }
            let text = res.text().await?;
            for line in text.lines() {
                let family = line
                    .strip_prefix("# HELP ")
                    .or_else(|| line.strip_prefix("# TYPE "))
                    .unwrap_or(line);
                if filter.as_deref().map_or(true, |f| family.starts_with(f)) {
                    println!("{line}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn probe_ready(client: &reqwest::Client, url: &str) -> Result<Value, ProbeError> {
    let res = client.get(url).send().await?;
    match res.status() {
        StatusCode::OK => Ok(res.json::<Value>().await?),
        StatusCode::SERVICE_UNAVAILABLE => Err(ProbeError::NotReady(res.status())),
        other => Err(ProbeError::Unexpected(other)),
    }
}

async fn print_response(res: reqwest::Response) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or(text);

    if status.is_success() {
        println!("{pretty}");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Error: gateway returned status {status}");
        eprintln!("{pretty}");
        Ok(ExitCode::FAILURE)
    }
}
