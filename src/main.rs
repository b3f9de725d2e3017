use clap::Parser;
use configuration::Config;
use log::{error, info};
use std::{error::Error, path::PathBuf, process, sync::Arc};

mod backend;
mod configuration;
mod error;
mod error_response;
mod listeners;
mod load_balancer;
mod logging;
mod server;
#[cfg(test)]
mod test_utils;

/// A reverse proxy that forwards requests to a fixed pool of backends in round-robin order
#[derive(Parser, Debug)]
#[clap(version)]
struct Args {
  /// TOML file with the listen address, backends and client timeouts
  #[clap(short, long)]
  config: Option<PathBuf>,

  /// Port to listen on, overrides the port of the configured listen address
  #[clap(short, long)]
  port: Option<u16>,

  /// Backend URL, can be repeated. Replaces the configured backends
  #[clap(short, long = "backend")]
  backends: Vec<String>,

  /// One of off, error, warn, info, debug, trace. Falls back to the LOG_LEVEL environment variable
  #[clap(long)]
  log_level: Option<String>,
}

#[tokio::main]
pub async fn main() {
  let args = Args::parse();

  if let Err(e) = logging::initialize(args.log_level.as_deref()) {
    eprintln!("error: {}", e);
    process::exit(1);
  }

  if let Err(e) = run(args).await {
    error!("error: {}", e);
    process::exit(1);
  }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
  let mut config = match &args.config {
    Some(path) => Config::load(path)?,
    None => Config::default(),
  };
  config.apply_overrides(args.port, args.backends);

  let load_balancer = Arc::new(config.build_load_balancer()?);
  let acceptor = listeners::bind(config.listen_address).await?;

  info!("serving requests at '{}'", acceptor.local_address());
  server::create(acceptor, load_balancer, shutdown_signal()).await?;
  Ok(())
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("Received shutdown signal"),
    Err(e) => {
      error!("Failed to listen for shutdown signal: {}", e);
      futures::future::pending::<()>().await
    }
  }
}
