//! Serial transport to a USB vocoder stick

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::Transport;
use crate::error::TransportError;

/// Received chunks buffered between the reader thread and the session
const RX_QUEUE_DEPTH: usize = 256;

/// Serial line with a dedicated reader thread.
///
/// The thread only moves raw chunks into a channel; all frame handling
/// stays on the thread that polls the session.
pub struct SerialTransport {
    device: String,
    port: Box<dyn SerialPort>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    rx: Receiver<Bytes>,
}

impl SerialTransport {
    /// Open `device` at `baud_rate`, 8-N-1, no flow control
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let open_failed = |e: serialport::Error| TransportError::OpenFailed {
            device: device.to_string(),
            reason: e.to_string(),
        };

        let port = serialport::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(open_failed)?;

        let mut reader_port = port.try_clone().map_err(open_failed)?;

        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();
        let (tx, rx) = bounded::<Bytes>(RX_QUEUE_DEPTH);

        let name = device.to_string();
        let reader = thread::Builder::new()
            .name(format!("serial-rx-{}", device))
            .spawn(move || {
                let mut buf = [0u8; 512];
                while running_for_loop.load(Ordering::Relaxed) {
                    match reader_port.read(&mut buf) {
                        Ok(0) => {}
                        Ok(n) => {
                            if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            tracing::error!("Serial read on {} failed: {}", name, e);
                            break;
                        }
                    }
                }
            })?;

        tracing::info!("Opened serial port {} at {} baud", device, baud_rate);

        Ok(Self {
            device: device.to_string(),
            port,
            running,
            reader: Some(reader),
            rx,
        })
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn poll_received(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.rx.try_recv() {
            Ok(chunk) => Ok(Some(chunk)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
            tracing::info!("Closed serial port {}", self.device);
        }
    }

    fn describe(&self) -> String {
        self.device.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}
