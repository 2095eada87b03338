use capctl::{Application, Config, telemetry};
use clap::Parser;

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // SMTP and OTLP clients build TLS configs from the process-wide provider
    let crypto_provider = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let args = capctl::config::Args::parse();

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) if args.validate => {
            eprintln!("Configuration is invalid: {e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;

    if let Err(e) = crypto_provider {
        tracing::debug!(?e, "rustls crypto provider was already installed");
    }
    tracing::debug!("{:?}", args);

    Application::new(config).await?.serve(shutdown_signal()).await
}
