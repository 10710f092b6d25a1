//! shue-srv: HTTP front end for the shue-ca certificate authority.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use shue_ca::{CaConfig, CertificateAuthority};

mod http;

#[derive(Debug, Parser)]
#[command(name = "shue-srv", version, about = "Domain-validated certificate authority")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "shue-ca.toml")]
    config: PathBuf,

    /// Listen address (overrides the config file).
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Serve HTTPS using the service credential issued at bootstrap.
    #[arg(long)]
    tls: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match CaConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, path = %args.config.display(), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    // Bootstrap failures are fatal: without a root trust anchor there is
    // nothing to serve.
    let ca = match CertificateAuthority::open(&config) {
        Ok(ca) => ca,
        Err(err) => {
            error!(%err, "CA bootstrap failed");
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::new(http::AppState {
        ca,
        cert_dir: config.storage.cert_dir.clone(),
    });
    let app = http::router(state);

    info!(addr = %config.listen, tls = args.tls, "starting CA server");

    let served = if args.tls {
        let tls_config = match axum_server::tls_rustls::RustlsConfig::from_pem_file(
            config.storage.service_cert_path(),
            config.storage.service_key_path(),
        )
        .await
        {
            Ok(tls_config) => tls_config,
            Err(err) => {
                error!(%err, "service credential unusable");
                return ExitCode::FAILURE;
            }
        };
        axum_server::bind_rustls(config.listen, tls_config)
            .serve(app.into_make_service())
            .await
    } else {
        axum_server::bind(config.listen)
            .serve(app.into_make_service())
            .await
    };

    if let Err(err) = served {
        error!(%err, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
