use std::path::PathBuf;

use clap::{Parser, Subcommand};
use marrvel_domain::{Mode, RunId};

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = "Evaluates LLMs on MARRVEL genetics questions"
)]
pub struct Cli {
    /// Configuration file. Defaults to `marrvel-eval.{toml,json,yaml}` in the
    /// working directory when present.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a batch of test cases against one or more models
    Run(RunArgs),

    /// List the tools the MCP server exposes
    Tools,

    /// Manage the result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Test cases as YAML, or JSON when the file ends in `.json`
    #[arg(long, short = 't')]
    pub tests: PathBuf,

    /// 1-based selection of test cases, e.g. `1-3,5,7-9`
    #[arg(long, short = 's')]
    pub subset: Option<String>,

    /// Models under test; overrides the configured list
    #[arg(long, short = 'm', value_delimiter = ',')]
    pub models: Vec<String>,

    /// tool, vanilla or web
    #[arg(long, default_value = "tool")]
    pub mode: Mode,

    /// Resume an earlier run by reusing its cache
    #[arg(long)]
    pub run_id: Option<RunId>,

    /// Re-run tests whose cached verdict is `no`
    #[arg(long, default_value_t = false)]
    pub retry_failed: bool,

    /// Re-run tests whose cached result is an error
    #[arg(long, default_value_t = false)]
    pub retry_errors: bool,

    /// Test runners allowed in flight at once; overrides the configuration
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Where to write the JSON report. Defaults to `report.json` in the run's
    /// cache directory.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Remove cached results of one run, or of every run
    Clear {
        #[arg(long)]
        run_id: Option<RunId>,
    },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_run() {
        let fixture = [
            "marrvel-eval",
            "run",
            "--tests",
            "cases.yaml",
            "--subset",
            "1-3,5",
            "--models",
            "gpt-4o,o3-mini",
            "--mode",
            "web",
            "--run-id",
            "baseline",
            "--retry-failed",
        ];

        let actual = Cli::try_parse_from(fixture).unwrap();

        let Command::Run(args) = actual.command else {
            panic!("expected run command");
        };
        assert_eq!(args.tests, PathBuf::from("cases.yaml"));
        assert_eq!(args.subset.as_deref(), Some("1-3,5"));
        assert_eq!(args.models, vec!["gpt-4o".to_string(), "o3-mini".to_string()]);
        assert_eq!(args.mode, Mode::Web);
        assert_eq!(args.run_id, Some(RunId::new("baseline").unwrap()));
        assert!(args.retry_failed);
        assert!(!args.retry_errors);
    }

    #[test]
    fn test_parse_cache_clear_with_global_config() {
        let fixture = ["marrvel-eval", "cache", "clear", "--run-id", "r1", "-c", "eval.toml"];

        let actual = Cli::try_parse_from(fixture).unwrap();

        assert_eq!(actual.config, Some(PathBuf::from("eval.toml")));
        assert!(matches!(
            actual.command,
            Command::Cache { command: CacheCommand::Clear { run_id: Some(_) } }
        ));
    }

    #[test]
    fn test_rejects_path_like_run_id() {
        let fixture = ["marrvel-eval", "cache", "clear", "--run-id", "../etc"];
        assert!(Cli::try_parse_from(fixture).is_err());
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let fixture = ["marrvel-eval", "run", "--tests", "t.yaml", "--mode", "agent"];
        assert!(Cli::try_parse_from(fixture).is_err());
    }
}
