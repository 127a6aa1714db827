mod logging;

use pulsejack_engine::{config::BridgeConfig, session::Bridge};
use std::{path::PathBuf, process::ExitCode};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match BridgeConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let bridge = match Bridge::start(&config) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("{:?} error: {e}", e.phase());
            return ExitCode::FAILURE;
        }
    };

    match bridge.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?} error: {e}", e.phase());
            ExitCode::FAILURE
        }
    }
}
