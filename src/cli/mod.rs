use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;
pub mod runner;

#[derive(Parser, Debug)]
#[command(name = "advisor")]
#[command(
    version,
    about = "Portfolio rebalancing advice with compliance-checked client letters"
)]
#[command(
    long_about = "Reads a client's portfolio statement, risk profile, macro report and a monthly price table, applies the house rebalancing rules and drafts a client letter that passes the compliance checks."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Configuration file (defaults to $ADVISOR_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full advisory pipeline and print the plan and final letter
    Run {
        /// Portfolio statement (.txt or .pdf)
        #[arg(long, value_name = "FILE")]
        portfolio: PathBuf,

        /// Client risk profile (.txt or .pdf)
        #[arg(long, value_name = "FILE")]
        risk: PathBuf,

        /// Macro analysis report (.txt or .pdf)
        #[arg(long = "macro", value_name = "FILE")]
        macro_analysis: PathBuf,

        /// Monthly price table (CSV)
        #[arg(long, value_name = "FILE")]
        prices: PathBuf,

        /// Use the built-in heuristic extractor and template drafter instead of the LLM
        #[arg(long)]
        offline: bool,

        /// Write the final letter (or the JSON report with --json) to a file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Also export the final letter as a PDF
        #[arg(long, value_name = "FILE")]
        pdf: Option<PathBuf>,
    },

    /// Run only the compliance checks on an existing letter
    CheckLetter {
        /// Letter to check (.txt or .pdf)
        file: PathBuf,

        /// Write the sanitised letter to a file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "advisor",
            "--no-color",
            "run",
            "--portfolio",
            "p.txt",
            "--risk",
            "r.txt",
            "--macro",
            "m.pdf",
            "--prices",
            "prices.csv",
            "--offline",
            "--json",
        ])
        .unwrap();

        assert!(cli.no_color);
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                macro_analysis,
                offline,
                output,
                pdf,
                ..
            } => {
                assert_eq!(macro_analysis, PathBuf::from("m.pdf"));
                assert!(offline);
                assert!(output.is_none());
                assert!(pdf.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_every_input() {
        let result = Cli::try_parse_from(["advisor", "run", "--portfolio", "p.txt"]);
        assert!(result.is_err());
    }
}
