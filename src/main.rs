use std::{process, sync::OnceLock};

use padlink::{
    config::Config,
    core::{operator, readiness::Readiness, reporter},
    logger::LoggerManager,
    print_error,
};
use padlink_session::SessionManager;
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

fn log_session_table(cfg: &Config) {
    let session = &cfg.session;
    let subscriptions: Vec<&str> = session.subscriptions.iter().map(|e| e.as_str()).collect();
    let rows = [
        ("Server", session.url.clone()),
        (
            "Backoff",
            format!(
                "{} ms .. {} ms, {} attempts",
                session.reconnect_base_delay_ms,
                session.reconnect_max_delay_ms,
                session.max_reconnect_attempts
            ),
        ),
        ("Send stagger", format!("{} ms", session.send_stagger_ms)),
        ("Auto start stream", session.auto_start_stream.to_string()),
        ("Subscriptions", subscriptions.join(", ")),
    ];

    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(10);
    for (name, value) in rows {
        info!("{:<width$} | {}", name, value, width = width);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting padlink version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.session);
    log_session_table(cfg);

    let manager = SessionManager::from_config(cfg.session.clone()).unwrap_or_else(|e| {
        error!("Failed to create SessionManager: {}", e);
        process::exit(1);
    });
    let handle = manager
        .on_sensor_stream(reporter::sensor_handler(reporter::SUMMARY_INTERVAL))
        .on_profiles_changed(reporter::profiles_handler())
        .on_presence_changed(reporter::presence_handler())
        .build_and_start()
        .unwrap_or_else(|e| {
            error!("Failed to start session: {}", e);
            process::exit(1);
        });

    let readiness = Readiness::default();
    readiness.start_listening(handle.subscribe_state());

    let shutdown = handle.cancel_token();
    tokio::spawn(reporter::follow_notices(handle.notices(), shutdown.clone()));
    let operator_task = tokio::spawn(operator::run(
        handle.clone(),
        readiness.clone(),
        shutdown.clone(),
    ));

    tokio::select! {
        _ = shutdown.cancelled() => {
            info!("Quit requested from console, shutting down...");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
    }

    handle.shutdown();
    debug!("Cancellation token triggered, session closing...");
    // gives the driver time to send the close frame
    tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;
    operator_task.abort();

    info!("Shutdown complete");
    Ok(())
}
