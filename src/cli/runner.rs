//! Command handlers behind the clap definitions

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::cli::formatters;
use crate::cli::{Cli, Commands};
use crate::collaborators::Collaborators;
use crate::compliance::ComplianceValidator;
use crate::config::AdvisorConfig;
use crate::export::export_letter_pdf;
use crate::pipeline::{run_advisory, AdvisoryInputs};
use crate::utils::read_document;

/// Execute the parsed command line
pub fn execute(cli: &Cli) -> Result<()> {
    let config = AdvisorConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Run {
            portfolio,
            risk,
            macro_analysis,
            prices,
            offline,
            output,
            pdf,
        } => {
            let inputs = AdvisoryInputs::from_files(portfolio, risk, macro_analysis, prices)?;
            let targets = RunTargets {
                output: output.as_deref(),
                pdf: pdf.as_deref(),
            };
            handle_run(inputs, &config, *offline, cli.json, targets)
        }
        Commands::CheckLetter { file, output } => {
            handle_check_letter(file, &config, cli.json, output.as_deref())
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Files a run writes besides stdout
struct RunTargets<'a> {
    output: Option<&'a Path>,
    pdf: Option<&'a Path>,
}

fn handle_run(
    inputs: AdvisoryInputs,
    config: &AdvisorConfig,
    offline: bool,
    json: bool,
    targets: RunTargets<'_>,
) -> Result<()> {
    let collaborators = if offline {
        Collaborators::offline(config)
    } else {
        Collaborators::openai(config)
            .context("Cannot use the LLM collaborators (pass --offline to run without them)")?
    };
    info!("Using collaborators {:?}", collaborators);

    let state = match run_advisory(inputs, config, collaborators) {
        Ok(state) => state,
        Err(failure) => {
            if json {
                println!("{}", formatters::format_failure_json(&failure));
            } else {
                eprint!("{}", formatters::format_failure(&failure));
            }
            bail!(
                "advisory run failed at {}: {}",
                failure.stage,
                failure.error
            );
        }
    };

    let report = if json {
        formatters::to_json(&state)
    } else {
        formatters::format_run_report(&state)
    };

    if let Some(path) = targets.pdf {
        export_letter_pdf(state.final_text().unwrap_or_default(), path)
            .context("Failed to export the letter as PDF")?;
    }

    match targets.output {
        Some(path) => {
            let content = if json {
                report.clone()
            } else {
                state.final_text().unwrap_or_default().to_string()
            };
            write_output(path, &content)?;
            if json {
                println!("{}", report);
            } else {
                print!("{}", report);
                println!("\nLetter written to {}", path.display());
            }
        }
        None if json => println!("{}", report),
        None => print!("{}", report),
    }
    if let (Some(path), false) = (targets.pdf, json) {
        println!("PDF written to {}", path.display());
    }
    Ok(())
}

fn handle_check_letter(
    file: &Path,
    config: &AdvisorConfig,
    json: bool,
    output: Option<&Path>,
) -> Result<()> {
    let text = read_document(file)?;
    let validator = ComplianceValidator::new(config.compliance.clone())
        .context("Compliance configuration is invalid")?;
    let outcome = validator
        .validate(&text, None)
        .with_context(|| format!("Letter {} could not be made compliant", file.display()))?;

    if let Some(path) = output {
        write_output(path, &outcome.letter.sanitized_text)?;
    }

    if json {
        #[derive(serde::Serialize)]
        struct JsonCheck<'a> {
            letter: &'a crate::compliance::AdvisoryLetter,
            report: &'a crate::compliance::ComplianceReport,
        }
        println!(
            "{}",
            formatters::to_json(&JsonCheck {
                letter: &outcome.letter,
                report: &outcome.report,
            })
        );
    } else {
        print!(
            "{}",
            formatters::format_compliance(&outcome.report, &outcome.letter)
        );
        if output.is_none() {
            println!("\n{}", outcome.letter.sanitized_text);
        }
    }
    Ok(())
}
