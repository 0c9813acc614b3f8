//! USRP Bridge Application
//!
//! Runs one USRP logic against its peer and, when configured, keeps a
//! vocoder session alive next to it.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use digivoice_bridge::{
    audio::NullSink,
    config::AppConfig,
    device::{SessionRegistry, VocoderSink},
    event::TracingEventSink,
    network::{
        create_socket, listen_addr, resolve_peer,
        udp::MAX_DATAGRAM_LEN,
        UsrpLogic,
    },
};

/// Vocoder output is only counted; nothing consumes it yet
#[derive(Default)]
struct CountingSink {
    encoded_bytes: u64,
    decoded_samples: u64,
}

impl VocoderSink for CountingSink {
    fn encoded_samples(&mut self, data: &[u8]) {
        self.encoded_bytes += data.len() as u64;
    }

    fn decoded_samples(&mut self, samples: &[f32]) {
        self.decoded_samples += samples.len() as u64;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting USRP bridge");

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AppConfig::default_path)
        .context("no configuration file given and no default location")?;
    let config = AppConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    let handler = config.logic.event_handler.clone().unwrap_or_default();
    let mut logic = UsrpLogic::new(
        &config.logic,
        Box::new(TracingEventSink::new(handler)),
        Box::new(NullSink::new()),
        Instant::now(),
    )?;
    tracing::debug!("Logic status: {}", logic.info_json());

    let socket = tokio::net::UdpSocket::from_std(create_socket(listen_addr(logic.rx_port()))?)?;
    let peer = resolve_peer(logic.usrp_host(), logic.tx_port())?;
    tracing::info!(
        "{}: Listening on {}, sending to {}",
        logic.name(),
        socket.local_addr()?,
        peer
    );

    let mut registry = SessionRegistry::new();
    if let Some(key) = &config.ambe {
        match registry.get_or_create(key) {
            Ok(session) => tracing::info!("Vocoder session on {}", session.describe()),
            Err(e) => tracing::warn!("Vocoder session {} not started: {}", key, e),
        }
    }
    let mut vocoder_sink = CountingSink::default();
    let mut vocoder_poll = tokio::time::interval(Duration::from_millis(10));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        let deadline = tokio::time::Instant::from_std(logic.next_deadline());

        tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, from)) => {
                    tracing::trace!("{} bytes from {}", len, from);
                    logic.on_datagram(&buf[..len], Instant::now());
                }
                Err(e) => tracing::warn!("Receive failed: {}", e),
            },
            _ = tokio::time::sleep_until(deadline) => logic.poll(Instant::now()),
            _ = vocoder_poll.tick(), if !registry.is_empty() => {
                registry.poll_all(&mut vocoder_sink);
            }
            _ = &mut shutdown => break,
        }

        let outbound: Vec<Bytes> = logic.drain_outbound().collect();
        for msg in outbound {
            if let Err(e) = socket.send_to(&msg, peer).await {
                tracing::warn!("{}: Send to {} failed: {}", logic.name(), peer, e);
            }
        }
    }

    tracing::info!(
        "Shutting down: {:?}, vocoder {} encoded bytes, {} decoded samples",
        logic.stats(),
        vocoder_sink.encoded_bytes,
        vocoder_sink.decoded_samples
    );
    registry.destroy_all();
    Ok(())
}
