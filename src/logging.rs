//
// logging.rs
// Dicom-Inference-Client
//
// Installs the tracing subscriber used by the CLI; RUST_LOG takes precedence over the flag.
//
// Thales Matheus Mendonça Santos - November 2025

use tracing_subscriber::EnvFilter;

pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dicom_inference_client={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
