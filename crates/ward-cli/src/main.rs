//! `wardctl` binary entrypoint.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ward_cli::cli::{Cli, Commands};
use ward_cli::commands::{PolicyCommand, SimulateCommand};
use ward_cli::output::OutputFormat;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = OutputFormat::new(cli.output);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Policy { command } => {
            PolicyCommand::default()
                .execute(&mut stdout, &format, &command)
                .context("policy command failed")?;
        }
        Commands::Simulate(args) => {
            SimulateCommand::new()
                .execute(&mut stdout, &format, &args)
                .await
                .context("simulation failed")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ward_cli::cli::{Format, PolicyCommands};

    #[test]
    fn cli_parses_policy_check() {
        let cli = Cli::parse_from(["wardctl", "policy", "check", "ladders.json"]);
        match cli.command {
            Commands::Policy {
                command: PolicyCommands::Check { file },
            } => assert_eq!(file.to_str(), Some("ladders.json")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_respects_output_flag() {
        let cli = Cli::parse_from(["wardctl", "--output", "json", "policy", "check", "a.json"]);
        assert_eq!(cli.output, Format::Json);
    }

    #[tokio::test]
    async fn run_with_missing_policy_file_fails() {
        let cli = Cli::parse_from(["wardctl", "policy", "check", "/nonexistent/ladders.json"]);
        let err = run(cli).await.unwrap_err();
        assert!(format!("{err:#}").contains("configuration error"));
    }
}
