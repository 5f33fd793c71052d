//! casd-provision — single-node storage server bootstrap.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse and validate `--username` / `--password`
//!   3. Load provisioning settings
//!   4. Init logger
//!   5. Run the bootstrap pipeline
//!   6. Print the outcome and exit

use clap::{CommandFactory, Parser};
use tracing::info;

use casd_provision::{
    bootstrap::{self, Host, Outcome},
    cli::Cli,
    config,
    error::AppError,
    identity::Ed25519KeyRing,
    logger,
    system::{Chown, Modprobe, ProcessRunner, Systemctl},
};

fn main() {
    // Load .env if present; ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        if matches!(e, AppError::Usage(_)) {
            eprintln!("\n{}", Cli::command().render_help());
        }
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let credentials = cli.credentials()?;

    let config = config::load()?;
    logger::init(&config.log_level)?;

    info!(
        server_config = %config.paths.server_config.display(),
        secret_ring = %config.paths.secret_ring.display(),
        blob_dir = %config.paths.blob_dir.display(),
        "settings loaded"
    );

    let runner = ProcessRunner;
    let owner = Chown::new(&runner);
    let services = Systemctl::new(&runner);
    let modules = Modprobe::new(&runner);
    let host = Host {
        key_ring: &Ed25519KeyRing,
        owner: &owner,
        services: &services,
        modules: &modules,
    };

    match bootstrap::run(&config, &credentials, host)? {
        Outcome::AlreadyConfigured { path } => {
            println!("Configuration file {} already exists, nothing to do.", path.display());
        }
        Outcome::Provisioned { key_id, secret_ring, reused_identity } => {
            let how = if reused_identity { "re-used" } else { "generated" };
            println!(
                "✓ Server provisioned: identity {key_id} ({how}, {})",
                secret_ring.display()
            );
        }
    }

    Ok(())
}
