//! CMP client CLI - enroll, renew, and revoke certificates against a CA
//!
//! All transaction parameters come from a TOML configuration file; the
//! subcommand selects which exchange to run.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cmp_client::config::Config;
use cmp_client::material;

#[derive(Parser)]
#[command(name = "cmp-client")]
#[command(about = "Certificate Management Protocol (RFC 4210) client", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "cmp-client.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialization request: first enrollment with a new CA
    Ir {
        /// Where to write the enrolled certificate (PEM)
        #[arg(short, long, default_value = "cert.pem")]
        out: PathBuf,
    },
    /// Certification request: additional certificate from a known CA
    Cr {
        /// Where to write the enrolled certificate (PEM)
        #[arg(short, long, default_value = "cert.pem")]
        out: PathBuf,
    },
    /// Key update request: renew with a new key
    Kur {
        /// Where to write the renewed certificate (PEM)
        #[arg(short, long, default_value = "cert.pem")]
        out: PathBuf,
    },
    /// PKCS#10 certification request
    P10cr {
        /// Where to write the enrolled certificate (PEM)
        #[arg(short, long, default_value = "cert.pem")]
        out: PathBuf,
    },
    /// Revocation request for the configured certificate
    Rr,
    /// General message carrying the configured ITAVs
    Genm,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> cmp_client::Result<()> {
    let config = Config::load(&cli.config)?;
    let mut ctx = config.build_context()?;

    match cli.command {
        Commands::Ir { out } => {
            let cert = ctx.execute_ir().await?;
            material::save_certificate_pem(&out, &cert)?;
            tracing::info!("enrolled certificate written to {}", out.display());
        }
        Commands::Cr { out } => {
            let cert = ctx.execute_cr().await?;
            material::save_certificate_pem(&out, &cert)?;
            tracing::info!("enrolled certificate written to {}", out.display());
        }
        Commands::Kur { out } => {
            let cert = ctx.execute_kur().await?;
            material::save_certificate_pem(&out, &cert)?;
            tracing::info!("renewed certificate written to {}", out.display());
        }
        Commands::P10cr { out } => {
            let cert = ctx.execute_p10cr().await?;
            material::save_certificate_pem(&out, &cert)?;
            tracing::info!("enrolled certificate written to {}", out.display());
        }
        Commands::Rr => {
            ctx.execute_rr().await?;
            tracing::info!("certificate revoked");
        }
        Commands::Genm => {
            let itavs = ctx.execute_genm().await?;
            for itav in itavs {
                println!("{}", itav.info_type);
            }
        }
    }
    Ok(())
}
