use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use semtag::config::{load_config, AppConfig};
use semtag::observability::{init_tracing, log_decode_summary};
use semtag::pipeline::MessageDecoder;
use semtag::stream::ReplaySession;
use semtag::DecodeError;
use serde::Serialize;

/// Decode semantic tags in LLM chat output.
#[derive(Parser)]
#[command(name = "semtag")]
#[command(version)]
struct Cli {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Treat the input as an AG-UI SSE transcript and replay it
    #[arg(long)]
    sse: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Input file; reads stdin when omitted or "-"
    input: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => load_config(&path.to_string_lossy()).unwrap_or_else(|e| {
            eprintln!("Failed to load configuration: {e}");
            eprintln!("See 'config.example.yaml' for the expected layout.");
            std::process::exit(1);
        }),
        None => AppConfig::default(),
    };

    init_tracing(&config.features.log_level, config.features.log_format);

    if let Err(e) = run(&cli, &config) {
        eprintln!("semtag: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli, config: &AppConfig) -> Result<(), DecodeError> {
    let input = read_input(cli.input.as_ref())?;
    let decoder = MessageDecoder::new(&config.metadata);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.sse {
        let mut session = ReplaySession::new(decoder);
        session.feed(&input)?;
        session.finish()?;
        let snapshots = session.final_snapshots();
        tracing::info!(messages = snapshots.len(), "Replayed transcript");
        for snapshot in &snapshots {
            write_json(&mut out, snapshot, cli.pretty)?;
        }
    } else {
        let decoded = decoder.decode(&input);
        log_decode_summary("-", input.len(), &decoded);
        tracing::info!(segments = decoded.segments.len(), "Decoded message");
        write_json(&mut out, &decoded, cli.pretty)?;
    }
    out.flush()?;
    Ok(())
}

fn read_input(path: Option<&PathBuf>) -> Result<String, DecodeError> {
    match path {
        Some(path) if path.as_os_str() != "-" => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            Ok(input)
        }
    }
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T, pretty: bool) -> Result<(), DecodeError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(io::Error::other)?;
    writeln!(out, "{rendered}")?;
    Ok(())
}
