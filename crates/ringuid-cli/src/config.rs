use core::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use ringuid::{GeneratorConfig, RingBuffer, parse_epoch};

/// Runtime configuration for the `ringuid` binary.
///
/// Generator options are shared by every subcommand so that `parse` decodes
/// ids with the same layout and epoch that `generate` produced them with. All
/// values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ringuid",
    version,
    about = "Generate, decode and inspect cached 63-bit unique IDs"
)]
pub struct CliArgs {
    /// Reference date ids count seconds from, as `YYYY-MM-DD` (UTC).
    ///
    /// Environment variable: `RINGUID_EPOCH`
    #[arg(long, env = "RINGUID_EPOCH", default_value_t = String::from("2016-05-20"))]
    pub epoch: String,

    /// Width of the delta seconds field.
    ///
    /// Environment variable: `RINGUID_TIMESTAMP_BITS`
    #[arg(long, env = "RINGUID_TIMESTAMP_BITS", default_value_t = 30)]
    pub timestamp_bits: u32,

    /// Width of the worker id field.
    ///
    /// Environment variable: `RINGUID_WORKER_ID_BITS`
    #[arg(long, env = "RINGUID_WORKER_ID_BITS", default_value_t = 20)]
    pub worker_id_bits: u32,

    /// Width of the per-second sequence field.
    ///
    /// Environment variable: `RINGUID_SEQUENCE_BITS`
    #[arg(long, env = "RINGUID_SEQUENCE_BITS", default_value_t = 13)]
    pub sequence_bits: u32,

    /// Ring buffer holds `2^boost_power` seconds worth of ids.
    ///
    /// Environment variable: `RINGUID_BOOST_POWER`
    #[arg(long, env = "RINGUID_BOOST_POWER", default_value_t = 3)]
    pub boost_power: u32,

    /// Percent of the ring buffer under which padding is triggered.
    ///
    /// Environment variable: `RINGUID_PADDING_FACTOR`
    #[arg(long, env = "RINGUID_PADDING_FACTOR", default_value_t = RingBuffer::DEFAULT_PADDING_FACTOR)]
    pub padding_factor: u32,

    /// Also pad the ring buffer every N seconds.
    ///
    /// Environment variable: `RINGUID_SCHEDULE_INTERVAL`
    #[arg(long, env = "RINGUID_SCHEDULE_INTERVAL")]
    pub schedule_interval: Option<u64>,

    /// Worker id of this process. Configured by hand for the command line.
    ///
    /// Environment variable: `RINGUID_INSTANCE_ID`
    #[arg(long, env = "RINGUID_INSTANCE_ID", default_value_t = 0)]
    pub instance_id: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print freshly generated ids, one per line.
    Generate {
        /// Number of ids to print.
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Use the lock-based generator instead of the ring buffer.
        #[arg(long, default_value_t = false)]
        synchronous: bool,
    },
    /// Decode an id into its timestamp, instance id and sequence.
    Parse {
        /// The id to decode.
        uid: u64,
    },
    /// Print the bit layout and its capacity.
    Layout,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub generator: GeneratorConfig,
    pub instance_id: u64,
    pub command: Command,
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.schedule_interval == Some(0) {
            bail!("RINGUID_SCHEDULE_INTERVAL must be greater than 0");
        }
        if let Command::Generate { count: 0, .. } = args.command {
            bail!("--count must be greater than 0");
        }

        let generator = GeneratorConfig {
            epoch: parse_epoch(&args.epoch)?,
            timestamp_bits: args.timestamp_bits,
            worker_id_bits: args.worker_id_bits,
            sequence_bits: args.sequence_bits,
            boost_power: args.boost_power,
            padding_factor: args.padding_factor,
            schedule_interval: args.schedule_interval.map(Duration::from_secs),
        };
        generator.validate()?;

        let max_worker_id = generator.bits_allocator()?.max_worker_id();
        if args.instance_id > max_worker_id {
            bail!(
                "RINGUID_INSTANCE_ID ({}) exceeds the worker id space (max = {})",
                args.instance_id,
                max_worker_id
            );
        }

        Ok(Self {
            generator,
            instance_id: args.instance_id,
            command: args.command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<AppConfig> {
        let args = CliArgs::try_parse_from(core::iter::once("ringuid").chain(args.iter().copied()))?;
        AppConfig::try_from(args)
    }

    #[test]
    fn defaults_match_library_defaults() {
        let config = parse(&["layout"]).unwrap();
        assert_eq!(config.generator, GeneratorConfig::default());
        assert_eq!(config.instance_id, 0);
    }

    #[test]
    fn generator_options_are_applied() {
        let config = parse(&[
            "--epoch",
            "2021-01-01",
            "--timestamp-bits",
            "32",
            "--worker-id-bits",
            "13",
            "--sequence-bits",
            "18",
            "--schedule-interval",
            "60",
            "--instance-id",
            "5",
            "generate",
            "-n",
            "3",
        ])
        .unwrap();

        assert_eq!(config.generator.epoch, ringuid::EPOCH_2021);
        assert_eq!(config.generator.sequence_bits, 18);
        assert_eq!(
            config.generator.schedule_interval,
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.instance_id, 5);
        assert!(matches!(
            config.command,
            Command::Generate {
                count: 3,
                synchronous: false
            }
        ));
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(parse(&["--timestamp-bits", "40", "layout"]).is_err());
        assert!(parse(&["--epoch", "20210101", "layout"]).is_err());
        assert!(parse(&["--schedule-interval", "0", "layout"]).is_err());
        assert!(parse(&["generate", "--count", "0"]).is_err());
        assert!(parse(&["--container", "layout"]).is_err());
        assert!(
            parse(&[
                "--worker-id-bits",
                "20",
                "--instance-id",
                "1048576",
                "layout"
            ])
            .is_err()
        );
    }
}
