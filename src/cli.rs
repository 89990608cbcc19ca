use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docpull::config::{Config, ExistingArtifactPolicy};
use docpull::logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "docpull")]
#[command(about = "Fetch the documents listed in a manifest and report what happened", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline over a manifest
    Run(RunArgs),
    /// Print the resolved configuration as TOML
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Configuration file (defaults to $DOCPULL_CONFIG or config/docpull.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Manifest to read (CSV, or JSON when the name ends in .json)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Report file, appended to
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory receiving the downloaded documents
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Maximum number of downloads in flight
    #[arg(short = 'n', long)]
    pub tasks: Option<usize>,

    /// Log every manifest row and phase change
    #[arg(short, long)]
    pub verbose: bool,

    /// Download again even when the document is already on disk
    #[arg(long)]
    pub refetch_existing: bool,

    /// Also append log entries to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl RunArgs {
    /// Command-line flags win over file and environment settings
    pub fn apply(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.manifest.path = input.clone();
        }
        if let Some(output) = &self.output {
            config.output.report_path = output.clone();
        }
        if let Some(dir) = &self.dir {
            config.output.artifact_dir = dir.clone();
        }
        if let Some(tasks) = self.tasks {
            config.pipeline.concurrency = tasks;
        }
        if self.verbose {
            config.logging.level = LogLevel::Trace;
        }
        if self.refetch_existing {
            config.output.existing_artifacts = ExistingArtifactPolicy::Refetch;
        }
        if let Some(log_file) = &self.log_file {
            config.logging.file = Some(log_file.clone());
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (defaults to $DOCPULL_CONFIG or config/docpull.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_override_config() {
        let cli = Cli::parse_from([
            "docpull",
            "run",
            "-i",
            "GRI.csv",
            "-n",
            "4",
            "-v",
            "--refetch-existing",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.manifest.path, PathBuf::from("GRI.csv"));
        assert_eq!(config.pipeline.concurrency, 4);
        assert_eq!(config.logging.level, LogLevel::Trace);
        assert_eq!(config.output.existing_artifacts, ExistingArtifactPolicy::Refetch);
        assert_eq!(config.output.report_path, PathBuf::from("report.csv"));
    }
}
