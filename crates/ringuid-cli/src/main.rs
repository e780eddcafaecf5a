#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use core::time::Duration;
use std::io::{self, BufWriter, Write};

use clap::Parser;
use config::{AppConfig, CliArgs, Command};
use ringuid::{SynchronousIdGenerator, SystemClock, UidGenerator, WaitingTake};
use serde_json::json;
use telemetry::init_telemetry;

/// How long a `generate` call waits for the padding worker before giving up.
const TAKE_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    init_telemetry()?;

    let instance_id = config.instance_id;

    match config.command {
        Command::Generate { count, synchronous } => {
            generate(&config, instance_id, count, synchronous)
        }
        Command::Parse { uid } => parse(&config, instance_id, uid),
        Command::Layout => layout(&config, instance_id),
    }
}

fn generate(
    config: &AppConfig,
    instance_id: u64,
    count: usize,
    synchronous: bool,
) -> anyhow::Result<()> {
    if synchronous {
        let generator = config.generator.build_synchronous(instance_id, SystemClock)?;
        write_ids(&generator, count)
    } else {
        let generator = config
            .generator
            .cached_builder(instance_id, SystemClock)?
            .rejected_take_handler(WaitingTake::new(TAKE_TIMEOUT))
            .build()?;
        let result = write_ids(&generator, count);
        generator.shutdown();
        result
    }
}

fn write_ids(generator: &impl UidGenerator, count: usize) -> anyhow::Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    for _ in 0..count {
        writeln!(out, "{}", generator.get_uid()?)?;
    }
    out.flush()?;

    tracing::info!(count, "ids generated");
    Ok(())
}

fn parse(config: &AppConfig, instance_id: u64, uid: u64) -> anyhow::Result<()> {
    let generator = config.generator.build_synchronous(instance_id, SystemClock)?;
    let parsed = generator.parse_uid(uid);

    if parsed.instance_id != instance_id {
        tracing::debug!(
            uid_instance_id = parsed.instance_id,
            instance_id,
            "id was minted by another instance"
        );
    }

    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

fn layout(config: &AppConfig, instance_id: u64) -> anyhow::Result<()> {
    let generator: SynchronousIdGenerator<SystemClock> =
        config.generator.build_synchronous(instance_id, SystemClock)?;
    let bits = generator.bits();

    // The last second the layout can encode.
    let exhausted_at = generator
        .parse_uid(bits.allocate(bits.max_delta_seconds(), 0, 0))
        .timestamp;

    let layout = json!({
        "epoch": generator.parse_uid(0).timestamp,
        "timestampBits": bits.timestamp_bits(),
        "workerIdBits": bits.worker_id_bits(),
        "sequenceBits": bits.sequence_bits(),
        "maxDeltaSeconds": bits.max_delta_seconds(),
        "maxWorkerId": bits.max_worker_id(),
        "idsPerSecond": bits.ids_per_second(),
        "bufferSize": config.generator.buffer_size()?,
        "exhaustedAt": exhausted_at,
    });
    println!("{}", serde_json::to_string_pretty(&layout)?);
    Ok(())
}
