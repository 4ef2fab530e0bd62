//! # shm-window
//!
//! Opens a single toplevel window filled with a solid colour and follows the
//! compositor's resizes until the window is closed.

use std::io::{self, Write};

use log::{error, info};

use shm_window::{wayland, ClientConfig, ClientError, VERSION};

fn main() {
    let (config, origin) = load_config();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log.level))
        .init();

    info!("🚀 Starting shm-window");
    info!(
        "📄 Version: {} ({} built {})",
        VERSION,
        option_env!("GIT_COMMIT").unwrap_or("unknown commit"),
        option_env!("BUILD_DATE").unwrap_or("unknown date")
    );
    info!("🎯 Target: {}", option_env!("TARGET_TRIPLE").unwrap_or("unknown"));
    match origin {
        Origin::File(path) => info!("✅ Configuration loaded from: {}", path),
        Origin::Failed(path, e) => {
            error!("❌ Failed to load configuration {}: {:#}", path, e);
            info!("📝 Using default configuration");
        }
        Origin::Default => info!("📝 Using default configuration"),
    }

    if let Err(e) = wayland::run(config) {
        error!("{}", e);
        report_fatal(&e, &mut io::stderr().lock());
        std::process::exit(e.exit_code());
    }
    info!("👋 shm-window exited cleanly");
}

enum Origin {
    File(String),
    Failed(String, anyhow::Error),
    Default,
}

/// Loads the configuration before the logger exists, so the outcome is
/// reported once logging is up
fn load_config() -> (ClientConfig, Origin) {
    let Some(path) = ClientConfig::discover_path() else {
        return (ClientConfig::default(), Origin::Default);
    };
    let shown = path.display().to_string();
    match ClientConfig::load(&path) {
        Ok(config) => (config, Origin::File(shown)),
        Err(e) => (ClientConfig::default(), Origin::Failed(shown, e)),
    }
}

/// Writes the fatal diagnostic to stderr, which the log filter cannot silence
fn report_fatal<W: Write>(err: &ClientError, out: &mut W) {
    // Nothing left to report a failed stderr write to.
    let _ = writeln!(out, "shm-window: {}", err);
}
