use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::gate::{EvaluateArgs, SelectArgs};

#[derive(Parser)]
#[command(name = "mg")]
#[command(about = "Model promotion gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gate decisions
    Gate {
        #[command(subcommand)]
        cmd: GateCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Decision log utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum GateCmd {
    /// Decide whether one model may be promoted; optionally run the promotion command.
    /// Exit code: 0 promote, 3 do not promote, 2 data/config/upstream error, 1 other.
    Evaluate(EvaluateArgs),

    /// Evaluate several candidates and print the best promotable one.
    Select(SelectArgs),
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a decision log
    Verify {
        /// Path to the JSONL decision log
        path: String,
    },
}

fn main() -> ExitCode {
    // Load .env.local if present (dev convenience). Silent if missing.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(commands::exit_code_for(&e))
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.cmd {
        Commands::Gate { cmd } => match cmd {
            GateCmd::Evaluate(args) => commands::gate::evaluate(args),
            GateCmd::Select(args) => commands::gate::select(args),
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = mg_config::load_layered_yaml(&path_refs)
                .map_err(commands::CliError::Config)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => {
                commands::audit::verify(&path)?;
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

/// Logs go to stderr; stdout carries `key=value` result lines only.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
