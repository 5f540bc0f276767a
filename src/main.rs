use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kubeinv_collect::{CollectionStatus, Collector};
use kubeinv_k8s::KubeClient;

mod config;
mod render;

use config::{FileConfig, OutputFormat, Overrides, Settings};

/// Success or partial failure
const EXIT_OK: u8 = 0;
/// Nothing usable was collected
const EXIT_FAILURE: u8 = 1;
/// Bad arguments or config file
const EXIT_USAGE: u8 = 2;

/// kubeinv - a point-in-time Kubernetes inventory, grouped by namespace
#[derive(Parser, Debug)]
#[command(name = "kubeinv")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (TOML); defaults to ~/.kubeinv/config.toml when present
    #[arg(long, env = "KUBEINV_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// List the contexts in your kubeconfig and exit
    #[arg(long)]
    list_contexts: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> ExitCode {
    // clap exits with status 2 on invalid arguments
    let args = Args::parse();

    // Logs go to stderr so reports on stdout stay machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run_app(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run_app(args: Args) -> Result<u8> {
    if args.list_contexts {
        print_contexts()?;
        return Ok(EXIT_OK);
    }

    let settings = match FileConfig::load(args.config.as_deref())
        .and_then(|file| Settings::resolve(file, &args.overrides))
    {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_USAGE);
        }
    };

    let source = settings.data_source();
    info!(
        source = source.label(),
        resource = %settings.resource,
        max_retries = settings.collector.max_retries,
        "starting collection"
    );
    let collector = Collector::new(source, settings.collector.clone());

    // Ctrl-C cancels the run instead of killing the process mid-backoff
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling collection");
                cancel.cancel();
            }
        })
    };

    let report = collector.collect(&cancel).await;
    interrupt.abort();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match settings.output {
        OutputFormat::Human => {
            let stderr = io::stderr();
            let mut diag = stderr.lock();
            render::write_human(&mut out, &mut diag, &report, settings.noun())?;
        }
        OutputFormat::Json => render::write_json(&mut out, &report)?,
    }
    out.flush()?;

    Ok(exit_code(report.status))
}

/// Process exit status for a finished collection
fn exit_code(status: CollectionStatus) -> u8 {
    if status.is_usable() {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

fn print_contexts() -> Result<()> {
    let client = KubeClient::new()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for ctx in client.get_contexts() {
        let marker = if ctx.is_current { "*" } else { " " };
        writeln!(
            out,
            "{} {}  (cluster: {}, namespace: {})",
            marker,
            ctx.name,
            ctx.cluster,
            ctx.namespace.as_deref().unwrap_or("default")
        )?;
    }
    Ok(())
}
