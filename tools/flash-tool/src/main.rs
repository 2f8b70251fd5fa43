use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use flash_storage::{
    BackendConfig, FileFlash, FlashConfig, FlashDevice, FlashError, SparseFlash, FILL_BYTE,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// Bytes scanned per read when counting erased bytes in `info`.
const SCAN_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(
    name = "flash-tool",
    about = "Inspect and modify flash images, or replay operation scripts against any backend."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the image capacity and how many bytes are still erased
    Info(ImageArgs),

    /// Print `len` bytes starting at `offset` as hex
    Read {
        #[command(flatten)]
        image: ImageArgs,
        #[arg(long)]
        offset: u64,
        #[arg(long)]
        len: usize,
    },

    /// Write hex-encoded bytes at `offset`
    Write {
        #[command(flatten)]
        image: ImageArgs,
        #[arg(long)]
        offset: u64,
        /// Bytes to write, hex encoded (e.g. "deadbeef")
        data: String,
    },

    /// Reset `len` bytes starting at `offset` to 0xFF
    Erase {
        #[command(flatten)]
        image: ImageArgs,
        #[arg(long)]
        offset: u64,
        #[arg(long)]
        len: u64,
    },

    /// Run a JSON operation script against a device described by a JSON config
    Replay {
        /// Device config (`FlashConfig` JSON)
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        /// Script: JSON array of `{"op": "write" | "read" | "erase", ...}` entries
        script: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ImageArgs {
    /// Flash image path (created and padded with 0xFF if needed)
    #[arg(long, value_name = "PATH")]
    image: PathBuf,

    /// Device capacity in bytes
    #[arg(long, value_name = "BYTES")]
    size: u64,

    /// Pad or truncate an existing image whose length differs from `--size`
    #[arg(long, action = clap::ArgAction::SetTrue)]
    resize: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ScriptOp {
    Write { offset: u64, data: Vec<u8> },
    Read { offset: u64, len: usize },
    Erase { offset: u64, len: u64 },
}

#[derive(Debug, Serialize)]
struct OpReport {
    op: &'static str,
    offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChunkReport {
    start: u64,
    len: usize,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    capacity: u64,
    ops: Vec<OpReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<Vec<ChunkReport>>,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Info(image) => {
            let mut flash = open_image(&image)?;
            let erased = count_erased(&mut flash)?;
            println!("capacity: {} bytes", flash.size());
            println!("erased:   {erased} bytes");
            close_image(flash)
        }
        Command::Read { image, offset, len } => {
            let mut flash = open_image(&image)?;
            let data = flash
                .read(offset, len)
                .with_context(|| format!("read offset={offset} len={len}"))?;
            println!("{}", hex::encode(data));
            close_image(flash)
        }
        Command::Write {
            image,
            offset,
            data,
        } => {
            let bytes = hex::decode(data.trim()).context("decode hex data")?;
            let mut flash = open_image(&image)?;
            flash
                .write(&bytes, offset)
                .with_context(|| format!("write offset={offset} len={}", bytes.len()))?;
            close_image(flash)
        }
        Command::Erase { image, offset, len } => {
            let mut flash = open_image(&image)?;
            flash
                .erase(offset, len)
                .with_context(|| format!("erase offset={offset} len={len}"))?;
            close_image(flash)
        }
        Command::Replay { config, script } => {
            let report = replay(&config, &script)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("serialize report")?
            );
            Ok(())
        }
    }
}

fn open_image(args: &ImageArgs) -> anyhow::Result<FileFlash> {
    if args.size == 0 {
        bail!("image size must be non-zero");
    }
    if !args.resize {
        if let Ok(meta) = fs::metadata(&args.image) {
            if meta.len() != args.size {
                bail!(
                    "{} is {} bytes but --size is {} bytes (use --resize to pad or truncate it)",
                    args.image.display(),
                    meta.len(),
                    args.size
                );
            }
        }
    }
    let mut flash = FileFlash::new(&args.image, args.size);
    flash
        .open(None)
        .with_context(|| format!("open {}", args.image.display()))?;
    Ok(flash)
}

fn close_image(mut flash: FileFlash) -> anyhow::Result<()> {
    flash
        .close()
        .with_context(|| format!("close {}", flash.path().display()))
}

fn count_erased(flash: &mut dyn FlashDevice) -> anyhow::Result<u64> {
    let capacity = flash.size();
    let mut buf = vec![0u8; SCAN_CHUNK_BYTES];
    let mut erased = 0u64;
    let mut offset = 0u64;
    while offset < capacity {
        let len = (capacity - offset).min(SCAN_CHUNK_BYTES as u64) as usize;
        flash
            .read_into(offset, &mut buf[..len])
            .with_context(|| format!("read at offset={offset}"))?;
        erased += buf[..len].iter().filter(|b| **b == FILL_BYTE).count() as u64;
        offset += len as u64;
    }
    Ok(erased)
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> anyhow::Result<T> {
    let raw = fs::read(path).with_context(|| format!("read {what} {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parse {what} {}", path.display()))
}

fn replay(config_path: &Path, script_path: &Path) -> anyhow::Result<ReplayReport> {
    let config: FlashConfig = load_json(config_path, "config")?;
    let script: Vec<ScriptOp> = load_json(script_path, "script")?;
    config.validate().context("validate config")?;

    // Sparse devices are driven directly so the final chunk layout can be reported.
    if let BackendConfig::Sparse(sparse) = config.backend {
        let mut flash = SparseFlash::with_config(config.capacity, sparse);
        let ops = run_script(&mut flash, &script)?;
        let chunks = flash
            .chunks()
            .map(|(start, data)| ChunkReport {
                start,
                len: data.len(),
            })
            .collect();
        return Ok(ReplayReport {
            capacity: flash.size(),
            ops,
            chunks: Some(chunks),
        });
    }

    let mut device = config.build().context("build device")?;
    let ops = run_script(&mut device, &script)?;
    let capacity = device.size();
    if let Err(e) = device.close() {
        tracing::warn!(error = %e, "closing device after replay failed");
    }
    Ok(ReplayReport {
        capacity,
        ops,
        chunks: None,
    })
}

fn run_script(device: &mut dyn FlashDevice, script: &[ScriptOp]) -> anyhow::Result<Vec<OpReport>> {
    device.open(None).context("open device")?;

    let mut reports = Vec::with_capacity(script.len());
    for (idx, op) in script.iter().enumerate() {
        tracing::debug!(idx, ?op, "replaying operation");
        let entry = match op {
            ScriptOp::Write { offset, data } => {
                op_report("write", *offset, device.write(data, *offset).map(|()| None))
            }
            ScriptOp::Read { offset, len } => op_report(
                "read",
                *offset,
                device.read(*offset, *len).map(|data| Some(hex::encode(data))),
            ),
            ScriptOp::Erase { offset, len } => {
                op_report("erase", *offset, device.erase(*offset, *len).map(|()| None))
            }
        };
        reports.push(entry);
    }
    Ok(reports)
}

fn op_report(
    op: &'static str,
    offset: u64,
    result: Result<Option<String>, FlashError>,
) -> OpReport {
    match result {
        Ok(data) => OpReport {
            op,
            offset,
            data,
            error: None,
        },
        Err(e) => OpReport {
            op,
            offset,
            data: None,
            error: Some(e.kind().to_string()),
        },
    }
}
