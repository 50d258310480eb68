use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use weatherzip_api::{
    handler::{HealthHandler, WeatherHandler},
    middleware::TracingRequestLogger,
    routes::register_routes,
    server::WebServer,
};
use weatherzip_core::{Config, HealthCheckUseCase, WeatherByCepUseCase, providers_from_config};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weatherzip", version, about = "Current temperature by Brazilian postal code")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service until Ctrl-C or SIGTERM.
    Serve {
        /// TOML config file; the environment (and `.env`) is used when absent.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration with the API key masked.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Serve { config } => serve(load_config(config.as_deref())?).await,
            Command::Config { config } => {
                let config = load_config(config.as_deref())?;
                let rendered = toml::to_string_pretty(&config.redacted())
                    .context("Failed to render configuration")?;
                print!("{rendered}");
                Ok(())
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

async fn serve(config: Config) -> Result<()> {
    let (locations, weather) = providers_from_config(&config);
    let weather = WeatherHandler::new(Arc::new(WeatherByCepUseCase::new(locations, weather)));
    let health = HealthHandler::new(Arc::new(HealthCheckUseCase::from_system()));

    let mut server = WebServer::new(config.listen_address(), Arc::new(TracingRequestLogger));
    register_routes(&mut server, weather, health);
    server.prepare();
    let server = Arc::new(server);

    info!(address = %config.listen_address(), "starting weatherzip");
    let mut running = tokio::spawn({
        let server = server.clone();
        async move { server.run().await }
    });

    tokio::select! {
        joined = &mut running => {
            // The server only returns on its own when it failed to start.
            return match joined {
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                other => other.context("web server exited unexpectedly"),
            };
        }
        () = shutdown_signal() => {}
    }

    server.stop()?;
    running.await.context("web server task failed")?;
    info!("weatherzip stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_serve_with_config_file() {
        let cli = Cli::parse_from(["weatherzip", "serve", "--config", "weatherzip.toml"]);
        match cli.command {
            Command::Serve { config } => assert_eq!(config, Some(PathBuf::from("weatherzip.toml"))),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_config_without_file() {
        let cli = Cli::parse_from(["weatherzip", "config"]);
        assert!(matches!(cli.command, Command::Config { config: None }));
    }

    #[test]
    fn load_config_rejects_missing_file() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
