use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vqe::binding::ChannelSource;
use vqe::{Counter, SourceSession, SourceSettings, Stats, VqeError, WorkerCoordinator};

#[derive(Parser)]
#[command(
    name = "vqe-launch",
    about = "Tune to a live RTP channel and write its transport stream"
)]
struct Args {
    /// SDP file, or an rtp:// / udp:// stream URI
    source: String,

    /// Runtime configuration file (TOML, YAML or INI)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Write the stream to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Seconds between statistics rows on stderr (0 disables)
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,

    /// Receive timeout per packet, in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Stop after this many packets
    #[arg(long)]
    packets: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code(), category = %e.category(), "{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> vqe::Result<()> {
    let sdp_or_uri = match ChannelSource::detect(&args.source) {
        ChannelSource::Uri(uri) => uri.to_string(),
        ChannelSource::Sdp(path) => std::fs::read_to_string(path)?,
    };

    let mut settings = SourceSettings::new(sdp_or_uri, "vqe-launch");
    settings.config_path = args.config.clone();
    settings.receive_timeout = Duration::from_millis(args.timeout_ms);

    let session = SourceSession::start(&WorkerCoordinator::global(), &settings)?;
    tracing::info!(stream = %session.identity(), "receiving");

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };

    let mut table = StatsTable::new(session.identity().as_str());
    let interval = Duration::from_secs(args.stats_interval);
    let mut last_report = Instant::now();
    let mut received = 0u64;

    while args.packets.is_none_or(|limit| received < limit) {
        match session.read_packet() {
            Ok(packet) => {
                out.write_all(&packet)?;
                received += 1;
            }
            Err(e @ VqeError::Timeout(_)) => tracing::warn!("{e}, retrying"),
            Err(e) => return Err(e),
        }

        if !interval.is_zero() && last_report.elapsed() >= interval {
            last_report = Instant::now();
            match session.stats() {
                Ok(stats) => table.print_row(&stats),
                Err(e) => tracing::warn!("{e}"),
            }
        }
    }

    out.flush()?;
    tracing::info!(packets = received, "done");
    Ok(())
}

/// Tab-separated statistics table written to stderr.
struct StatsTable {
    transport: String,
    header_printed: bool,
}

impl StatsTable {
    fn new(identity: &str) -> Self {
        let scheme = identity.split("://").next().unwrap_or("rtp");
        Self {
            transport: scheme.to_uppercase(),
            header_printed: false,
        }
    }

    fn print_row(&mut self, stats: &Stats) {
        let mut stderr = io::stderr().lock();
        if !self.header_printed {
            let names: Vec<String> = Counter::ALL
                .iter()
                .map(|c| c.name().to_uppercase().replace('-', "_"))
                .collect();
            let _ = writeln!(stderr, "CONFIGURATION\tTYPE\t{}", names.join("\t"));
            self.header_printed = true;
        }

        let values: Vec<String> = Counter::ALL
            .iter()
            .map(|c| c.read(stats).to_string())
            .collect();
        let _ = writeln!(stderr, "LINEAR\t{}\t{}", self.transport, values.join("\t"));
    }
}
