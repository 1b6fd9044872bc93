use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Validate and refine OCSF documents", long_about = None)]
pub struct Cli {
    /// Set the logging level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// YAML configuration file (defaults to $OCSF_REFINERY_CONFIG, then config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate every document, refine the invalid ones and write the report
    Refine(RefineArgs),
    /// Map raw Windows Security events to candidate OCSF documents
    Map(MapArgs),
}

#[derive(Args, Debug)]
pub struct RefineArgs {
    /// Directory of candidate documents (overrides workflow.input_dir)
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Directory for accepted documents and the report (overrides workflow.output_dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Documents processed at once (overrides workflow.max_concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MapArgs {
    /// Directory of raw event files
    #[arg(short, long)]
    pub input: PathBuf,
    /// Directory for the mapped documents
    #[arg(short, long)]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_refine_with_overrides() {
        let cli = Cli::parse_from([
            "ocsf-refinery",
            "--log-level",
            "debug",
            "refine",
            "--input",
            "in",
            "--concurrency",
            "4",
        ]);
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Refine(args) => {
                assert_eq!(args.input, Some(PathBuf::from("in")));
                assert_eq!(args.output, None);
                assert_eq!(args.concurrency, Some(4));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_map_requires_directories() {
        assert!(Cli::try_parse_from(["ocsf-refinery", "map", "--input", "raw"]).is_err());

        let cli = Cli::try_parse_from([
            "ocsf-refinery",
            "map",
            "-i",
            "raw",
            "-o",
            "transformed",
            "--config",
            "custom.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        assert!(matches!(cli.command, Commands::Map(_)));
    }
}
