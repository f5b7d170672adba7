use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use rotalog::codec::{format_timestamp_micros, open_stream_file, RecordReader};
use rotalog::{LogRecord, LoggerConfig, RecordKind};

#[derive(Parser)]
#[command(name = "rotalog-dump", version, about = "Inspect rotalog stream files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the records of a stream file (.gz and .zst are decompressed).
    Records {
        path: PathBuf,
        /// Record format; inferred from the extension when omitted.
        #[arg(long = "kind", value_enum)]
        kind: Option<KindArg>,
        #[arg(long = "limit")]
        limit: Option<usize>,
        /// Hex-dump payloads.
        #[arg(long = "hex")]
        hex: bool,
    },
    /// Print the default configuration as JSON.
    DefaultConfig {
        #[arg(long = "base-dir", default_value = "./logs")]
        base_dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Text,
    Binary,
    Message,
}

impl From<KindArg> for RecordKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Text => RecordKind::Text,
            KindArg::Binary => RecordKind::Binary,
            KindArg::Message => RecordKind::Message,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    match cli.command {
        Commands::Records {
            path,
            kind,
            limit,
            hex,
        } => {
            let kind = match kind {
                Some(kind) => kind.into(),
                None => infer_kind(&path)?,
            };
            dump_records(&path, kind, limit.unwrap_or(usize::MAX), hex, &mut out)?;
        }
        Commands::DefaultConfig { base_dir } => {
            let config = LoggerConfig::with_base_dir(base_dir);
            writeln!(out, "{}", config.to_json_string()?)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn infer_kind(path: &Path) -> Result<RecordKind> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name
        .strip_suffix(".gz")
        .or_else(|| name.strip_suffix(".zst"))
        .unwrap_or(&name);
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("txt") | Some("log") => Ok(RecordKind::Text),
        Some("bin") => Ok(RecordKind::Binary),
        Some("bag") => Ok(RecordKind::Message),
        _ => bail!("cannot infer record kind of {}; pass --kind", path.display()),
    }
}

fn dump_records(
    path: &Path,
    kind: RecordKind,
    limit: usize,
    hex: bool,
    out: &mut impl Write,
) -> Result<()> {
    let input =
        open_stream_file(path).with_context(|| format!("failed to open {}", path.display()))?;

    if kind == RecordKind::Text {
        for line in BufReader::new(input).lines().take(limit) {
            writeln!(out, "{}", line?)?;
        }
        return Ok(());
    }

    let reader = RecordReader::new(input, kind)?;
    for (index, record) in reader.take(limit).enumerate() {
        let record = record.with_context(|| format!("record {index} of {}", path.display()))?;
        match &record {
            LogRecord::Binary(r) => writeln!(
                out,
                "{} tag={} len={}",
                format_timestamp_micros(r.timestamp),
                r.tag,
                r.payload.len()
            )?,
            LogRecord::Message(r) => writeln!(
                out,
                "{} topic={} type={} len={}",
                format_timestamp_micros(r.timestamp),
                r.topic,
                r.msg_type,
                r.payload.len()
            )?,
            LogRecord::Text(r) => writeln!(out, "{}", r.message)?,
        }
        if hex {
            let payload = match &record {
                LogRecord::Binary(r) => &r.payload,
                LogRecord::Message(r) => &r.payload,
                LogRecord::Text(_) => continue,
            };
            hexdump(payload, out)?;
        }
    }
    Ok(())
}

fn hexdump(bytes: &[u8], out: &mut impl Write) -> io::Result<()> {
    for (row, chunk) in bytes.chunks(16).enumerate() {
        write!(out, "  {:08x} ", row * 16)?;
        for byte in chunk {
            write!(out, " {byte:02x}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}
