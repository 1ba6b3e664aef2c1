//! converge: import and convergence verification tooling.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use converge_core::kinds;

mod plan;

#[derive(Parser)]
#[command(name = "converge")]
#[command(about = "Import and convergence verification tooling")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a composite identifier into a resource identity
    Resolve {
        /// Resource kind name
        kind: String,
        /// Raw external identifier
        id: String,
    },
    /// List built-in resource kinds and their identifier rules
    Kinds,
    /// Execute a convergence plan file against the in-memory cloud
    Run {
        /// Path to a JSON plan file
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("converge_cli=info".parse()?)
                .add_directive("converge_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Resolve { kind, id } => {
            let spec = kinds::lookup(&kind)?;
            let identity = spec.resolve(&id)?;
            println!("{}", serde_json::to_string_pretty(&identity)?);
        }
        Command::Kinds => {
            for spec in kinds::KINDS {
                let derived = spec
                    .derived
                    .iter()
                    .map(|attr| match attr.default {
                        Some(default) => format!("{} (default: {})", attr.name, default),
                        None => format!("{} (mandatory)", attr.name),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let pinned = spec
                    .pinned
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "{:<26} separator '{}'  derived: [{}]  pinned: [{}]",
                    spec.kind, spec.separator, derived, pinned
                );
            }
        }
        Command::Run { plan } => {
            plan::execute(&plan).await?;
            println!("plan converged");
        }
    }

    Ok(())
}
