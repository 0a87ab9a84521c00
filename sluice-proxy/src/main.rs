#![forbid(unsafe_code)]

use clap::Parser;
use sluice_proxy_lib::config::{Config, ProxyArgs};
use sluice_proxy_lib::{lifecycle, telemetry};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = ProxyArgs::parse();

    if let Err(err) = telemetry::init_tracing(&args.log_level, false) {
        eprintln!("{err}");
    }

    let config = match Config::try_from(args) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid configuration");
            std::process::exit(err.exit_code());
        }
    };
    info!(listen = %config.listen, target = %config.upstream, "configuration loaded");

    if let Err(err) = lifecycle::run(config).await {
        error!(%err, "proxy exited with error");
        std::process::exit(err.exit_code());
    }
}
