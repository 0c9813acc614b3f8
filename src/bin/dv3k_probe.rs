//! DV3K Probe
//!
//! Opens the vocoder described by the `[ambe]` section of the bridge
//! configuration, runs the handshake and prints what the device reports.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use digivoice_bridge::{
    config::AppConfig,
    device::{SessionRegistry, VocoderSink},
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts frames arriving before the handshake completes
#[derive(Default)]
struct Tally {
    encoded: usize,
    decoded: usize,
}

impl VocoderSink for Tally {
    fn encoded_samples(&mut self, _data: &[u8]) {
        self.encoded += 1;
    }

    fn decoded_samples(&mut self, _samples: &[f32]) {
        self.decoded += 1;
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AppConfig::default_path)
        .context("no configuration file given and no default location")?;
    let config = AppConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    let key = config
        .ambe
        .context("configuration has no [ambe] section")?;

    let mut registry = SessionRegistry::new();
    let mut tally = Tally::default();
    registry.get_or_create(&key)?;

    let started = Instant::now();
    loop {
        registry.poll_all(&mut tally);
        let session = registry
            .get(&key)
            .context("vocoder session disappeared")?;
        if session.is_ready() {
            break;
        }
        if started.elapsed() > HANDSHAKE_TIMEOUT {
            let (describe, state) = (session.describe(), session.state());
            registry.destroy_all();
            bail!("no handshake from {} (state {:?})", describe, state);
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    if let Some(session) = registry.get(&key) {
        println!("\n=== Vocoder on {} ===", session.describe());
        println!("  Key:     {}", key);
        println!("  Product: {}", session.product_id().unwrap_or("?"));
        println!("  Version: {}", session.version().unwrap_or("?"));
        println!("  Frames:  {}", session.stats().frames_received);
        println!("  Resyncs: {}", session.stats().resyncs);
        println!(
            "  Audio:   {} encoded, {} decoded frames",
            tally.encoded, tally.decoded
        );
    }

    registry.destroy_all();
    Ok(())
}
