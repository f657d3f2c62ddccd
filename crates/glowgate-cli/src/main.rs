//! `glowgate-cli` – the `glowgate` gateway binary.
//!
//! It:
//!
//! 1. Loads `~/.glowgate/config.toml`, writing the defaults on first run,
//!    then applies environment overrides.
//! 2. Initialises tracing from the resolved config (compact or JSON console
//!    logs, optional OTLP export).
//! 3. Writes the boot marker, wires the device, session, relay bus and
//!    bridge together, and serves the HTTP/SSE surface.
//! 4. Stops gracefully on **Ctrl-C**, or exits with status 1 when the
//!    supervisor receives a restart request.

mod config;

use std::sync::Arc;

use colored::Colorize;
use glowgate_hal::{Device, SimDevice};
use glowgate_kernel::SessionState;
use glowgate_middleware::{DeviceBridge, RelayBus};
use glowgate_runtime::{Supervisor, init_tracing};
use glowgate_server::{AppState, Gateway, GatewayServer};
use glowgate_store::CredentialStore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    print_banner();
    let cfg = load_config();

    // Held for the life of the process; dropping it flushes pending spans.
    let telemetry = init_tracing(&cfg.telemetry());
    info!(
        config = ?cfg,
        span_export = telemetry.is_exporting(),
        "configuration resolved"
    );

    let store = CredentialStore::new(&cfg.assets_dir);
    if let Err(e) = store.mark_boot(chrono::Utc::now()).await {
        warn!(error = %e, "failed to write boot marker");
    }

    // ── Device, session and relay ─────────────────────────────────────────
    let device = Arc::new(SimDevice::demo());
    info!("no physical transport linked in, using the simulated controller");

    let session = Arc::new(SessionState::new());
    let bus = Arc::new(RelayBus::new());
    let _bridge = DeviceBridge::new(Arc::clone(&bus), Arc::clone(&session)).start(device.subscribe());

    let gateway = Gateway::new(device, session, store, &cfg.firmware_path);

    // ── Serve under supervision ───────────────────────────────────────────
    let (mut supervisor, restart) = Supervisor::new(cfg.restart_grace());
    let state = AppState::new(Arc::new(gateway), bus, restart).with_keep_alive(cfg.keep_alive());
    let server = GatewayServer::new(state)
        .with_bind_address(cfg.bind_address)
        .with_port(cfg.port);

    println!(
        "  Listening at {}\n",
        format!("http://localhost:{}/", cfg.port).bold()
    );

    tokio::select! {
        result = server.run(shutdown_signal()) => {
            if let Err(e) = result {
                error!(error = %e, "server failed");
                drop(telemetry);
                std::process::exit(1);
            }
            println!("{}", "  ✓ Gateway stopped.".green());
        }
        Some(request) = supervisor.wait() => {
            println!(
                "{} {}",
                "⚠  Restarting:".yellow().bold(),
                request.reason
            );
            drop(telemetry);
            std::process::exit(request.exit_code());
        }
    }
}

fn load_config() -> config::Config {
    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("  {} {}", "Could not write default config:".yellow(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    cfg
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
        std::future::pending::<()>().await;
    }
    println!();
    println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"        __                              __     "#.bold().cyan());
    println!("{}", r#"  ___ _/ /__ _    ______ ____ _/ /____ "#.bold().cyan());
    println!("{}", r#" / _ `/ / _ \ |/|/ / _ `/ _ `/ __/ -_)"#.bold().cyan());
    println!("{}", r#" \_, /_/\___/__,__/\_, /\_,_/\__/\__/ "#.bold().cyan());
    println!("{}", r#"/___/             /___/               "#.bold().cyan());
    println!();
    println!("  {} {}",
        "glowgate".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Single-device session gateway");
    println!();
}
