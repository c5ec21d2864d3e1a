//! ==============================================================================
//! main.rs - sensor-hub entry point
//! ==============================================================================
//!
//! purpose:
//!     polls temperature/humidity sensors exposed through two kernel sysfs
//!     interfaces (1-Wire DS18B20 probes and an IIO DHT22), caches the
//!     latest snapshot, serves it over a small JSON API and pushes it to
//!     Home Assistant.
//!
//! responsibilities:
//!     - load configuration (config/hub.toml + environment overrides)
//!     - one-time IIO device probe
//!     - initial poll so the API has data before the first timer tick
//!     - run the HTTP server in the background
//!     - drive the periodic poll loop and dispatch fire-and-forget pushes
//!     - tear everything down on SIGINT/SIGTERM
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                      sensor-hub daemon                      │
//!     │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐  │
//!     │  │ poll loop   │──▶│  poll cache  │◀──│  http handlers  │  │
//!     │  │ (timer)     │   │  (snapshot)  │   │ /sensors /health│  │
//!     │  └──────┬──────┘   └──────────────┘   └─────────────────┘  │
//!     │         │ fire-and-forget                                  │
//!     │         ▼                                                  │
//!     │  ┌─────────────┐                                           │
//!     │  │  ha pusher  │──▶ POST /api/states/<entity>              │
//!     │  └─────────────┘                                           │
//!     └─────────────────────────────────────────────────────────────┘
//!          ▲ sysfs reads: <w1>/28-*/w1_slave, <iio>/in_*_input
//!
//! ==============================================================================

mod cache;
mod config;
mod domain;
mod ha;
mod sensors;
mod server;

use crate::cache::PollCache;
use crate::domain::Reading;
use crate::ha::HaPusher;
use crate::sensors::SensorMap;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  sensor-hub - 1-Wire / IIO to Home Assistant bridge");
    println!("===========================================================");

    // step 1: load configuration and initialize logging
    let config = config::HubConfig::load_or_default();
    init_tracing(&config.logging.level);
    config.log_summary();

    // step 2: build the sensor registry and probe the IIO device once
    let map = SensorMap::parse(&config.devices.sensor_map);
    if !map.is_empty() {
        tracing::info!("sensor map: {} mapped devices", map.len());
    }
    let iio_path = sensors::find_iio_device(&config.devices.iio_device);

    let cache = Arc::new(PollCache::new(
        PathBuf::from(&config.devices.w1_path),
        iio_path,
        map,
    ));

    let pusher = if config.ha_enabled() {
        Some(Arc::new(HaPusher::new(&config.ha.url, &config.ha.token)?))
    } else {
        tracing::info!("HA push disabled (no url/token configured)");
        None
    };

    // step 3: initial poll so the first HTTP request after boot sees data
    let snapshot = cache.refresh().await;
    spawn_push(&pusher, snapshot);

    // step 4: start the web server in the background.
    // the listener is bound here so a bind failure kills the process.
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {addr}");
    let server = tokio::spawn({
        let cache = cache.clone();
        async move {
            if let Err(e) = server::serve(listener, cache, shutdown_signal()).await {
                tracing::error!("server error: {}", e);
            }
        }
    });

    // step 5: periodic poll loop until a shutdown signal arrives
    let mut ticker = tokio::time::interval(Duration::from_secs(config.polling.interval_seconds));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // first tick completes immediately; the initial poll covered it

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = cache.refresh().await;
                spawn_push(&pusher, snapshot);
            }
            _ = &mut shutdown => break,
        }
    }

    // let the server finish draining; an in-flight push is not cancelled,
    // it finishes or hits its own request timeout
    tracing::info!("shutting down...");
    let _ = tokio::time::timeout(Duration::from_secs(5), server).await;
    Ok(())
}

/// dispatch one push bound to an immutable snapshot copy. the poll loop
/// never awaits the task: a slow hub cannot delay the next timer tick, and
/// the pusher's busy flag skips the next cycle if this one is still running.
fn spawn_push(pusher: &Option<Arc<HaPusher>>, snapshot: Arc<Vec<Reading>>) {
    if let Some(pusher) = pusher {
        let pusher = pusher.clone();
        tokio::spawn(async move {
            pusher.push(&snapshot).await;
        });
    }
}

/// RUST_LOG wins over the configured level when set
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
