use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use adhoc_gateway::stanza::Element;
use adhoc_gateway::{ChannelSink, Config, Daemon, Jid};

/// Inbound and outbound queue depth
const QUEUE_DEPTH: usize = 64;

/// Adhoc - serve XEP-0050 ad-hoc commands over a line-oriented stanza stream
///
/// Reads one stanza per line on stdin and writes replies one per line on
/// stdout.
#[derive(Parser)]
#[command(name = "adhoc", version, about)]
struct Cli {
    /// Path to the config file (defaults to ~/.config/adhoc/config.toml)
    #[arg(short, long, env = "ADHOC_CONFIG")]
    config: Option<PathBuf>,

    /// JID the commands are registered under
    #[arg(short, long)]
    owner: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; stdout carries stanzas
    let filter = match cli.verbose {
        0 => "info,adhoc_gateway=info",
        1 => "info,adhoc_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(owner) = cli.owner.as_deref() {
        config = config.with_owner(Jid::parse(owner)?);
    }

    let (sink, outbound) = ChannelSink::new(QUEUE_DEPTH);
    let daemon = Daemon::new(config, Arc::new(sink))?;

    tracing::info!(owner = %daemon.owner(), "starting ad-hoc command gateway");

    let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_DEPTH);
    let reader = tokio::spawn(read_stanzas(inbound_tx));
    let writer = tokio::spawn(write_stanzas(outbound));

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    daemon.run(inbound_rx, shutdown).await?;

    // the daemon held the last sink, so the writer drains and stops
    reader.abort();
    writer.await??;
    Ok(())
}

/// Parse stdin lines into stanzas until EOF
async fn read_stanzas(tx: mpsc::Sender<Element>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Element::parse(line) {
            Ok(stanza) => {
                if tx.send(stanza).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "skipping unparsable line"),
        }
    }
    Ok(())
}

/// Write outbound stanzas to stdout, one per line
async fn write_stanzas(mut rx: mpsc::Receiver<Element>) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(stanza) = rx.recv().await {
        let mut line = stanza.to_xml()?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
