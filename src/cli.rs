//! Command-line interface for factsweep.
//!
//! Flag values are taken as raw strings and validated here rather than by
//! clap, so a bad duration produces the same `--flag invalid value "..."`
//! message whether it came from a shell or a job template.

use std::path::PathBuf;

use clap::Parser;

use crate::{
    db::DbError,
    retention::{CleanupRunner, RelativeDuration, parse_duration},
};

/// CLI arguments for factsweep
#[derive(Parser, Debug)]
#[command(
    name = "factsweep",
    version,
    about = "Down-sample historical host fact scans",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (defaults to $FACTSWEEP_CONFIG, then ./factsweep.toml
    /// if it exists, otherwise built-in defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Delete old facts, keeping one per host and module per granularity bucket
    CleanupFacts(CleanupFactsArgs),
    /// Run the sweep from [cleanup.schedule] periodically
    Worker,
    /// Run database migrations and exit
    Migrate,
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct CleanupFactsArgs {
    /// Only facts older than this are candidates, e.g. "30d", "2w", "6m", "1y"
    #[arg(long = "older_than", value_name = "DURATION")]
    pub older_than: Option<String>,

    /// Keep one fact per host and module per bucket this wide; "0d" keeps none
    #[arg(long = "granularity", value_name = "DURATION")]
    pub granularity: Option<String>,

    /// Only sweep facts recorded by this module
    #[arg(long)]
    pub module: Option<String>,

    /// Report how many facts would be removed without deleting any
    #[arg(long)]
    pub dry_run: bool,
}

/// A validated `cleanup-facts` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRequest {
    pub older_than: RelativeDuration,
    pub granularity: RelativeDuration,
    pub module: Option<String>,
}

/// Errors surfaced by CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("--{flag} invalid value \"{value}\"")]
    InvalidValue { flag: &'static str, value: String },

    #[error("Database is not configured. Add a [database] section to the config file.")]
    DatabaseNotConfigured,

    #[error(transparent)]
    Db(#[from] DbError),
}

impl CleanupFactsArgs {
    /// Validate both durations. `older_than` is checked first.
    pub fn parse_request(&self) -> Result<CleanupRequest, CommandError> {
        let older_than = parse_flag("older_than", self.older_than.as_deref())?;
        let granularity = parse_flag("granularity", self.granularity.as_deref())?;

        Ok(CleanupRequest {
            older_than,
            granularity,
            module: self.module.clone(),
        })
    }
}

fn parse_flag(flag: &'static str, value: Option<&str>) -> Result<RelativeDuration, CommandError> {
    parse_duration(value).ok_or_else(|| CommandError::InvalidValue {
        flag,
        value: value.unwrap_or_default().to_string(),
    })
}

/// Run `cleanup-facts` against `runner` and return the line to print.
///
/// Flags are validated before the runner is touched.
pub async fn handle_cleanup_facts(
    args: &CleanupFactsArgs,
    runner: &dyn CleanupRunner,
) -> Result<String, CommandError> {
    let request = args.parse_request()?;

    let count = runner
        .run(
            &request.older_than,
            &request.granularity,
            request.module.as_deref(),
        )
        .await?;

    Ok(summary(count, runner.is_dry_run()))
}

fn summary(count: u64, dry_run: bool) -> String {
    if dry_run {
        format!("Would remove {} facts", count)
    } else {
        format!("Removed {} facts", count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::db::DbResult;

    type Call = (RelativeDuration, RelativeDuration, Option<String>);

    /// Records every sweep it is asked to run.
    struct RecordingRunner {
        calls: Mutex<Vec<Call>>,
        result: u64,
        dry_run: bool,
    }

    impl RecordingRunner {
        fn new(result: u64) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                result,
                dry_run: false,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CleanupRunner for RecordingRunner {
        async fn run(
            &self,
            older_than: &RelativeDuration,
            granularity: &RelativeDuration,
            module: Option<&str>,
        ) -> DbResult<u64> {
            self.calls
                .lock()
                .unwrap()
                .push((*older_than, *granularity, module.map(String::from)));
            Ok(self.result)
        }

        fn is_dry_run(&self) -> bool {
            self.dry_run
        }
    }

    fn args(older_than: Option<&str>, granularity: Option<&str>) -> CleanupFactsArgs {
        CleanupFactsArgs {
            older_than: older_than.map(String::from),
            granularity: granularity.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_invalid_older_than_rejected() {
        let runner = RecordingRunner::new(0);

        let err = handle_cleanup_facts(&args(Some("1week"), Some("1d")), &runner)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "--older_than invalid value \"1week\"");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_granularity_rejected() {
        let runner = RecordingRunner::new(0);

        let err = handle_cleanup_facts(&args(Some("1d"), Some("1year")), &runner)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "--granularity invalid value \"1year\"");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_flag_rejected() {
        let runner = RecordingRunner::new(0);

        let err = handle_cleanup_facts(&args(None, Some("1d")), &runner)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommandError::InvalidValue { flag: "older_than", .. }
        ));
        assert_eq!(err.to_string(), "--older_than invalid value \"\"");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_older_than_checked_first() {
        let runner = RecordingRunner::new(0);

        let err = handle_cleanup_facts(&args(Some("zigzag"), Some("zigzag")), &runner)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommandError::InvalidValue { flag: "older_than", .. }
        ));
    }

    #[tokio::test]
    async fn test_parameters_ok() {
        let runner = RecordingRunner::new(12);
        let mut cleanup_args = args(Some("1d"), Some("1d"));
        cleanup_args.module = Some("ansible".to_string());

        let output = handle_cleanup_facts(&cleanup_args, &runner).await.unwrap();

        assert_eq!(output, "Removed 12 facts");
        assert_eq!(
            runner.calls(),
            vec![(
                RelativeDuration::days(1),
                RelativeDuration::days(1),
                Some("ansible".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn test_dry_run_summary() {
        let runner = RecordingRunner {
            dry_run: true,
            ..RecordingRunner::new(4)
        };

        let output = handle_cleanup_facts(&args(Some("30d"), Some("0d")), &runner)
            .await
            .unwrap();

        assert_eq!(output, "Would remove 4 facts");
    }

    #[test]
    fn test_parse_command_line() {
        let args = Args::try_parse_from([
            "factsweep",
            "--config",
            "/etc/factsweep.toml",
            "cleanup-facts",
            "--older_than",
            "120d",
            "--granularity",
            "1w",
            "--module",
            "packages",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("/etc/factsweep.toml")));
        let Command::CleanupFacts(cleanup) = args.command else {
            panic!("expected cleanup-facts");
        };
        assert!(cleanup.dry_run);
        assert_eq!(
            cleanup.parse_request().unwrap(),
            CleanupRequest {
                older_than: RelativeDuration::days(120),
                granularity: RelativeDuration::weeks(1),
                module: Some("packages".to_string()),
            }
        );
    }

    #[test]
    fn test_bad_durations_reach_validation() {
        // clap accepts any string so the error text is ours
        let args =
            Args::try_parse_from(["factsweep", "cleanup-facts", "--older_than", "2weeks"])
                .unwrap();
        let Command::CleanupFacts(cleanup) = args.command else {
            panic!("expected cleanup-facts");
        };
        assert_eq!(
            cleanup.parse_request().unwrap_err().to_string(),
            "--older_than invalid value \"2weeks\""
        );
    }

    #[test]
    fn test_config_is_global() {
        let args = Args::try_parse_from(["factsweep", "migrate", "-c", "local.toml"]).unwrap();
        assert!(matches!(args.command, Command::Migrate));
        assert_eq!(args.config, Some(PathBuf::from("local.toml")));
    }
}
