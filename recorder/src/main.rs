mod capture;
mod disk;
mod indicator;
mod scanner;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use capture::{CaptureLoop, SequenceCounter};
use indicator::LogIndicator;
use sdcam_api::AppState;
use sdcam_common::config::Config;
use sdcam_common::naming::ImageNaming;
use sdcam_sensor::{FrameSource, HttpSnapshotSensor, PatternSensor};
use store::StoreWriter;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        root = config.storage.root,
        sensor = config.sensor.mode,
        width = config.sensor.width,
        height = config.sensor.height,
        write_chunk_bytes = config.storage.write_chunk_bytes,
        addr = config.server.addr(),
        "starting sdcam recorder"
    );

    let root = PathBuf::from(&config.storage.root);
    let naming = ImageNaming::from(&config.naming);

    // Resume numbering after whatever is already on the card.
    let mut counter = SequenceCounter::new(scanner::next_index(&root, &naming).await);

    let writer = match StoreWriter::new(config.storage.write_chunk_bytes) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Invalid storage config: {e}");
            std::process::exit(1);
        }
    };

    let listener = match sdcam_api::bind(&config.server.addr()).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let state = Arc::new(AppState::from_config(&config.storage));
    let server = tokio::spawn(async move {
        if let Err(e) = sdcam_api::serve(listener, state).await {
            error!(error = %e, "HTTP server stopped");
        }
    });

    let indicator = LogIndicator::new(Duration::from_millis(config.indicator.flash_ms));
    let min_interval = Duration::from_millis(config.capture.min_interval_ms);

    match config.sensor.mode.as_str() {
        "http" => {
            let url = config.sensor.url.as_deref().unwrap_or_default();
            let sensor = match HttpSnapshotSensor::new(url, config.sensor.acquire_timeout()) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Failed to create snapshot sensor for {url}: {e}");
                    std::process::exit(1);
                }
            };
            info!(url = sensor.url(), "using snapshot sensor");
            run_capture(sensor, writer, indicator, root, naming, min_interval, &mut counter).await;
        }
        _ => {
            let sensor = PatternSensor::from_config(&config.sensor);
            run_capture(sensor, writer, indicator, root, naming, min_interval, &mut counter).await;
        }
    }

    // Capture only returns once no index is left; keep serving what is stored.
    let _ = server.await;
}

async fn run_capture<S: FrameSource>(
    sensor: S,
    writer: StoreWriter,
    indicator: LogIndicator,
    root: PathBuf,
    naming: ImageNaming,
    min_interval: Duration,
    counter: &mut SequenceCounter,
) {
    let mut capture =
        CaptureLoop::new(sensor, writer, indicator, root, naming).with_min_interval(min_interval);
    capture.run(counter).await;
}
