// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::select;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use rotel_tail::init::BoxError;
use rotel_tail::init::args::TailArgs;
use rotel_tail::init::config::load_config;
use rotel_tail::{Tail, TailConfig};

#[derive(Debug, Parser)]
#[command(name = "rotel-tail")]
#[command(bin_name = "rotel-tail")]
#[command(version, about, long_about = None)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        env = "ROTEL_TAIL_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(flatten)]
    tail: TailArgs,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let config = match load_config(&opt.tail) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::from(1);
        }
    };

    let _guard = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run_tail(opt.tail.path, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Tail ended with an error.");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run_tail(path: PathBuf, config: TailConfig) -> Result<(), BoxError> {
    let tail = Tail::start(&path, config)?;
    let mut out = BufWriter::new(tokio::io::stdout());

    let shutdown = signal_wait();
    tokio::pin!(shutdown);

    loop {
        select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    warn!("Unable to listen for shutdown signals: {}", e);
                }
                info!("Shutdown signal received.");
                tail.stop();
                break;
            },
            line = tail.next_line() => {
                let Some(line) = line else {
                    break;
                };
                if line.is_notice() {
                    warn!("{}", line.text);
                    continue;
                }
                out.write_all(line.text.as_bytes()).await?;
                out.write_all(b"\n").await?;
                out.flush().await?;
            },
        }
    }

    tail.wait().await.map_err(|e| -> BoxError { e.to_string().into() })
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

// Lines go to stdout, so diagnostics are written to stderr
fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(io::stderr());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("notify=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stderr().is_terminal();

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

#[cfg(unix)]
async fn signal_wait() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_wait() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
