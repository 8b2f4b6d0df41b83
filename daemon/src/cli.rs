use anyhow::Context;
use ballot_aggregator::AggregatorConfig;
use ballot_validator::ValidatorConfig;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "ballotd", about = "Ballot validation and aggregation pipeline", version)]
pub struct Cli {
    /// Path to a TOML configuration file for the chosen command. File
    /// settings are the base; CLI flags and env vars override them.
    #[arg(long, global = true, env = "BALLOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Default)]
pub struct LoggingArgs {
    /// Log format: "human" or "json".
    #[arg(long, global = true, env = "BALLOT_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Log filter, e.g. "info" or "debug,ballot_validator=trace".
    #[arg(long, global = true, env = "BALLOT_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a validation worker.
    Validate(ValidateArgs),
    /// Run the aggregation service.
    Aggregate(AggregateArgs),
    /// Recompute tallies from validated audit rows and exit.
    RebuildTallies(RebuildArgs),
}

#[derive(Args, Debug, Default)]
pub struct ValidateArgs {
    #[arg(long, env = "BALLOT_WORKER_ID")]
    pub worker_id: Option<String>,

    #[arg(long, env = "BALLOT_AMQP_URL")]
    pub amqp_url: Option<String>,

    #[arg(long, env = "BALLOT_REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "BALLOT_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "BALLOT_PREFETCH")]
    pub prefetch: Option<u16>,

    #[arg(long, env = "BALLOT_MAX_PAYLOAD_BYTES")]
    pub max_payload_bytes: Option<usize>,

    #[arg(long, env = "BALLOT_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub struct AggregateArgs {
    #[arg(long, env = "BALLOT_AMQP_URL")]
    pub amqp_url: Option<String>,

    #[arg(long, env = "BALLOT_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "BALLOT_PREFETCH")]
    pub prefetch: Option<u16>,

    #[arg(long, env = "BALLOT_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    #[arg(long, env = "BALLOT_BATCH_TIMEOUT_MS")]
    pub batch_timeout_ms: Option<u64>,

    /// Votes held in memory before intake pauses.
    #[arg(long, env = "BALLOT_MAX_PENDING")]
    pub max_pending: Option<usize>,

    #[arg(long, env = "BALLOT_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub struct RebuildArgs {
    #[arg(long, env = "BALLOT_DATABASE_URL")]
    pub database_url: Option<String>,
}

fn override_with<T>(target: &mut T, value: &Option<T>)
where
    T: Clone,
{
    if let Some(v) = value {
        *target = v.clone();
    }
}

pub fn validator_config(
    path: Option<&Path>,
    logging: &LoggingArgs,
    args: &ValidateArgs,
) -> anyhow::Result<ValidatorConfig> {
    let mut config = match path {
        Some(path) => ValidatorConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ValidatorConfig::default(),
    };
    override_with(&mut config.worker_id, &args.worker_id);
    override_with(&mut config.amqp_url, &args.amqp_url);
    override_with(&mut config.redis_url, &args.redis_url);
    override_with(&mut config.database_url, &args.database_url);
    override_with(&mut config.prefetch, &args.prefetch);
    override_with(&mut config.max_payload_bytes, &args.max_payload_bytes);
    override_with(&mut config.metrics_port, &args.metrics_port);
    override_with(&mut config.log_format, &logging.log_format);
    override_with(&mut config.log_level, &logging.log_level);
    config.validate()?;
    Ok(config)
}

pub fn aggregator_config(
    path: Option<&Path>,
    logging: &LoggingArgs,
    args: &AggregateArgs,
) -> anyhow::Result<AggregatorConfig> {
    let mut config = match path {
        Some(path) => AggregatorConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AggregatorConfig::default(),
    };
    override_with(&mut config.amqp_url, &args.amqp_url);
    override_with(&mut config.database_url, &args.database_url);
    override_with(&mut config.prefetch, &args.prefetch);
    override_with(&mut config.batch_size, &args.batch_size);
    override_with(&mut config.batch_timeout_ms, &args.batch_timeout_ms);
    override_with(&mut config.max_pending, &args.max_pending);
    override_with(&mut config.metrics_port, &args.metrics_port);
    override_with(&mut config.log_format, &logging.log_format);
    override_with(&mut config.log_level, &logging.log_level);
    config.validate()?;
    Ok(config)
}

/// Tally rebuilds reuse the aggregator's database settings.
pub fn rebuild_config(
    path: Option<&Path>,
    logging: &LoggingArgs,
    args: &RebuildArgs,
) -> anyhow::Result<AggregatorConfig> {
    let mut config = match path {
        Some(path) => AggregatorConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AggregatorConfig::default(),
    };
    override_with(&mut config.database_url, &args.database_url);
    override_with(&mut config.log_format, &logging.log_format);
    override_with(&mut config.log_level, &logging.log_level);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_subcommands_and_global_flags() {
        let cli = Cli::try_parse_from([
            "ballotd",
            "validate",
            "--redis-url",
            "redis://cache:6379",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.logging.log_format.as_deref(), Some("json"));
        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.redis_url.as_deref(), Some("redis://cache:6379"))
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["ballotd", "rebuild-tallies"]).unwrap();
        assert!(matches!(cli.command, Command::RebuildTallies(_)));
    }

    #[test]
    fn flags_override_file_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size = 250\nmetrics_port = 9100\n").unwrap();

        let args = AggregateArgs {
            metrics_port: Some(9200),
            ..Default::default()
        };
        let config = aggregator_config(Some(file.path()), &LoggingArgs::default(), &args).unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.metrics_port, 9200);
        assert_eq!(config.batch_timeout_ms, 1000);
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let logging = LoggingArgs {
            log_level: Some("debug".into()),
            ..Default::default()
        };
        let config = validator_config(None, &logging, &ValidateArgs::default()).unwrap();
        assert_eq!(config.max_payload_bytes, 1024);
        assert_eq!(config.metrics_port, 8001);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = ValidateArgs {
            max_payload_bytes: Some(0),
            ..Default::default()
        };
        assert!(validator_config(None, &LoggingArgs::default(), &args).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = Path::new("/nonexistent/ballotd.toml");
        assert!(aggregator_config(Some(path), &LoggingArgs::default(), &AggregateArgs::default()).is_err());
    }
}
