//! Forge CLI - execution environment Containerfile generator
//!
//! Usage:
//!   forge create [-f FILE] [-c DIR]    Generate the Containerfile and build context
//!
//! Building the resulting image is left to the container runtime:
//!   podman build -f context/Containerfile -t my-ee context/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ee_forge::{constants, output, Containerfile, Definition, GalaxyOptions, Runtime};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Generate Containerfiles for ansible execution environments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the instruction file and populate the build context
    Create {
        /// Path to the execution environment definition
        #[arg(short = 'f', long = "file", default_value = constants::DEFAULT_EE_FILENAME)]
        file: PathBuf,

        /// Build context directory to populate
        #[arg(short = 'c', long = "context", default_value = constants::DEFAULT_BUILD_CONTEXT)]
        context: PathBuf,

        /// Container runtime the generated file targets
        #[arg(long, default_value = "podman")]
        container_runtime: Runtime,

        /// Name of the generated file (defaults to Containerfile or
        /// Dockerfile depending on the runtime)
        #[arg(long)]
        output_filename: Option<String>,

        /// GPG keyring for galaxy collection signature verification
        #[arg(long)]
        galaxy_keyring: Option<PathBuf>,

        /// Number of valid collection signatures ansible-galaxy must see
        #[arg(long, requires = "galaxy_keyring")]
        galaxy_required_valid_signature_count: Option<u32>,

        /// GPG status code to ignore during collection verification (repeatable)
        #[arg(long = "galaxy-ignore-signature-status-code", requires = "galaxy_keyring")]
        galaxy_ignore_signature_status_codes: Vec<String>,
    },
}

fn main() {
    if let Err(err) = run() {
        output::error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            file,
            context,
            container_runtime,
            output_filename,
            galaxy_keyring,
            galaxy_required_valid_signature_count,
            galaxy_ignore_signature_status_codes,
        } => {
            let definition = Definition::load(&file)
                .with_context(|| format!("loading definition {}", file.display()))?;

            output::action(&format!(
                "Generating {} from {}",
                output_filename
                    .as_deref()
                    .unwrap_or_else(|| container_runtime.instruction_filename()),
                file.display()
            ));

            let galaxy = GalaxyOptions {
                keyring: galaxy_keyring,
                required_valid_signature_count: galaxy_required_valid_signature_count,
                ignore_signature_status_codes: galaxy_ignore_signature_status_codes,
            };

            let mut containerfile = Containerfile::new(
                &definition,
                &context,
                container_runtime,
                output_filename.as_deref(),
                galaxy,
            );
            containerfile.prepare()?;
            containerfile.write()?;

            output::success(&format!("Wrote {}", containerfile.path().display()));
            output::info(&format!(
                "Build with: podman build -f {} -t <tag> {}",
                containerfile.path().display(),
                context.display()
            ));
            Ok(())
        }
    }
}
