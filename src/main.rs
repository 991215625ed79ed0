use albship_forwarder::{DEFAULT_BATCH_SIZE, DEFAULT_ENDPOINT, Forwarder, ingest_url};
use albship_protocol::{LineParser, LogEvent, RedactionSecrets};
use albship_source::LineSource;
use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use flate2::{Compression, write::GzEncoder};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "albship")]
#[command(about = "Ships load-balancer access-log archives to a log-analytics dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parses a log archive and forwards the records in batches
    Ship {
        /// Log archive (.gz or plain text); "-" reads stdin
        #[arg(long)]
        input: PathBuf,
        /// Target dataset; falls back to $DATASET_NAME
        #[arg(long)]
        dataset: Option<String>,
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Parses a log archive and prints one JSON record per line
    Parse {
        /// Log archive (.gz or plain text); "-" reads stdin
        #[arg(long)]
        input: PathBuf,
    },
    /// Generates well-formed sample access-log lines
    Generate {
        #[arg(long, default_value = "20")]
        count: usize,
        /// Write here instead of stdout; a .gz path is compressed
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info,albship=debug") };
    }
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ship {
            input,
            dataset,
            endpoint,
            batch_size,
        } => ship(&input, dataset, &endpoint, batch_size).await,
        Commands::Parse { input } => parse_to_stdout(&input),
        Commands::Generate { count, output } => generate(count, output),
    }
}

async fn ship(
    input: &Path,
    dataset: Option<String>,
    endpoint: &str,
    batch_size: usize,
) -> anyhow::Result<()> {
    let dataset = match dataset {
        Some(dataset) => dataset,
        None => std::env::var("DATASET_NAME")
            .context("either --dataset or DATASET_NAME must be set")?,
    };
    let api_token = std::env::var("AXIOM_API_TOKEN").context("AXIOM_API_TOKEN must be set")?;

    let parser = LineParser::new(secrets_from_env());
    let events = collect_events(input, &parser)?;
    let failures = events.iter().filter(|e| e.is_failure()).count();
    if failures > 0 {
        warn!("{failures} lines did not match the grammar; forwarding failure records");
    }

    let forwarder = Forwarder::new(ingest_url(endpoint, &dataset), api_token);
    let summary = forwarder.forward(&events, batch_size).await;
    for outcome in &summary.outcomes {
        if !outcome.success {
            warn!("Batch {} failed: {}", outcome.index + 1, outcome.detail);
        }
    }
    if !summary.outcomes.is_empty() && summary.failed_batches() == summary.outcomes.len() {
        bail!(
            "all {} batches were rejected by the ingest endpoint",
            summary.outcomes.len()
        );
    }
    info!("Processed {} logs", summary.total);
    Ok(())
}

fn parse_to_stdout(input: &Path) -> anyhow::Result<()> {
    let parser = LineParser::new(secrets_from_env());
    let mut stdout = io::stdout().lock();
    for line in open_source(input)? {
        let line = line.context("failed to read log archive")?;
        let event = parser.parse(&line);
        if let Err(e) = writeln!(stdout, "{}", serde_json::to_string(&event)?) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                return Ok(());
            }
            return Err(e.into());
        }
    }
    Ok(())
}

fn generate(count: usize, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut body = Vec::new();
    for i in 0..count {
        writeln!(body, "{}", sample_line(i))?;
    }

    match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            if path.extension().is_some_and(|ext| ext == "gz") {
                let mut encoder = GzEncoder::new(file, Compression::default());
                encoder.write_all(&body)?;
                encoder.finish()?;
            } else {
                let mut file = file;
                file.write_all(&body)?;
            }
            info!("Wrote {count} lines to {}", path.display());
        }
        None => io::stdout().lock().write_all(&body)?,
    }
    Ok(())
}

fn secrets_from_env() -> RedactionSecrets {
    RedactionSecrets {
        cert_arn: std::env::var("CERT_ARN").unwrap_or_default(),
        account_id: std::env::var("ACCOUNT_ID").unwrap_or_default(),
    }
}

fn open_source(input: &Path) -> anyhow::Result<LineSource> {
    if input.as_os_str() == "-" {
        Ok(LineSource::stdin())
    } else {
        LineSource::open(input)
    }
}

fn collect_events(input: &Path, parser: &LineParser) -> anyhow::Result<Vec<LogEvent>> {
    let mut events = Vec::new();
    for line in open_source(input)? {
        let line = line.context("failed to read log archive")?;
        events.push(parser.parse(&line));
    }
    Ok(events)
}

fn sample_line(i: usize) -> String {
    let time = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string();
    format!(
        "https {time} app/k8s-default-ingressn-0a1b2c3d/4e5f6071 192.168.131.{client}:2817 10.0.2.{target}:8080 0.000 0.001 0.000 200 200 {received} {sent} \"GET https://app.example.com:443/items/{i} HTTP/2.0\" \"curl/8.5.0\" ECDHE-RSA-AES128-GCM-SHA256 TLSv1.2 arn:aws:elasticloadbalancing:us-east-1:123456789012:targetgroup/web-backend/73e2d6bc24d8a067 \"Root=1-58337364-23a8c76965a2ef7629b185e3\" \"app.example.com\" \"arn:aws:acm:us-east-1:123456789012:certificate/12345678-1234-1234-1234-123456789012\" 1 {time} \"forward\" \"-\" \"-\" \"10.0.2.{target}:8080\" \"200\" \"-\" \"-\" TID_{i:016x}",
        client = i % 200 + 1,
        target = i % 50 + 1,
        received = 300 + i % 700,
        sent = 1000 + (i * 37) % 9000,
    )
}
