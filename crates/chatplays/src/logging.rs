//! Logging
//!
//! Console output plus a plain-text `latest.log` in the log directory. The
//! previous run's file is kept as `previous.log`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LATEST_LOG: &str = "latest.log";
pub const PREVIOUS_LOG: &str = "previous.log";

/// Move `latest.log` to `previous.log` and start a fresh `latest.log`
pub fn rotate(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let latest = dir.join(LATEST_LOG);
    if latest.exists() {
        std::fs::rename(&latest, dir.join(PREVIOUS_LOG))?;
    }
    File::create(&latest)?;
    Ok(latest)
}

fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug {
            "chatplays=debug"
        } else {
            "chatplays=info"
        })
    })
}

/// Install the global subscriber
pub fn init(log_dir: &Path, debug: bool, json: bool) -> std::io::Result<()> {
    let file = File::options()
        .append(true)
        .open(rotate(log_dir)?)?;

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(default_filter(debug))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .with(file_layer)
        .try_init()
        .map_err(std::io::Error::other)
}
