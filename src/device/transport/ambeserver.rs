//! UDP transport to an AMBEserver adapter
//!
//! The peer host is resolved lazily on a short-lived resolver thread, so
//! `send` and `poll_received` never wait on DNS. Frames sent before
//! resolution succeeds wait in a bounded queue and are flushed once the
//! address is known. Resolution is retried with exponential backoff; when
//! the attempts are exhausted the queue is dropped and the failure reported.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use crossbeam_channel::{bounded, Receiver, TryRecvError};

use super::Transport;
use crate::error::TransportError;

/// Largest datagram accepted from the adapter
const MAX_DATAGRAM: usize = 1500;

/// Retry policy for resolving the adapter host
#[derive(Debug, Clone)]
pub struct ResolvePolicy {
    /// Frames held while the address is unknown
    pub queue_depth: usize,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            queue_depth: 64,
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Outcome of one lookup, delivered when it completes
type Lookup = Receiver<Option<SocketAddr>>;

/// Starts a lookup and returns where its outcome will arrive
type Resolver = Box<dyn FnMut(&str, u16) -> Lookup + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerState {
    Resolved(SocketAddr),
    Pending { attempts: u32, retry_at: Instant },
    Failed,
}

/// UDP datagram transport with deferred peer resolution
pub struct AmbeServerTransport {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
    peer: PeerState,
    queue: ArrayQueue<Bytes>,
    policy: ResolvePolicy,
    resolver: Resolver,
    /// Lookup in flight
    lookup: Option<Lookup>,
    /// Frames dropped because the queue was full
    dropped: usize,
}

impl AmbeServerTransport {
    /// Bind an ephemeral local port and start resolving `host`
    pub fn open(host: &str, port: u16, policy: ResolvePolicy) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(|e| TransportError::OpenFailed {
            device: format!("{}:{}", host, port),
            reason: e.to_string(),
        })?;
        socket.set_nonblocking(true)?;

        Ok(Self::with_resolver(
            host,
            port,
            Some(socket),
            policy,
            Box::new(spawn_lookup),
        ))
    }

    fn with_resolver(
        host: &str,
        port: u16,
        socket: Option<UdpSocket>,
        policy: ResolvePolicy,
        resolver: Resolver,
    ) -> Self {
        let mut transport = Self {
            host: host.to_string(),
            port,
            socket,
            peer: PeerState::Pending {
                attempts: 0,
                retry_at: Instant::now(),
            },
            queue: ArrayQueue::new(policy.queue_depth.max(1)),
            policy,
            resolver,
            lookup: None,
            dropped: 0,
        };
        // first attempt right away, failures are retried from poll
        if let Err(e) = transport.try_resolve(Instant::now()) {
            tracing::warn!("AMBEserver {}: {}", transport.host, e);
        }
        transport
    }

    /// Resolved peer address, if any
    pub fn peer(&self) -> Option<SocketAddr> {
        match self.peer {
            PeerState::Resolved(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// True while a lookup is running
    pub fn is_resolving(&self) -> bool {
        self.lookup.is_some()
    }

    /// Start a lookup if one is due and collect a finished one. Never
    /// waits. Returns an error exactly once, when the last attempt fails.
    fn try_resolve(&mut self, now: Instant) -> Result<(), TransportError> {
        let PeerState::Pending { attempts, retry_at } = self.peer else {
            return Ok(());
        };
        if self.lookup.is_none() {
            if now < retry_at {
                return Ok(());
            }
            self.lookup = Some((self.resolver)(&self.host, self.port));
        }

        let outcome = match self.lookup.as_ref().map(Receiver::try_recv) {
            Some(Ok(outcome)) => outcome,
            Some(Err(TryRecvError::Disconnected)) => None,
            Some(Err(TryRecvError::Empty)) | None => return Ok(()),
        };
        self.lookup = None;

        if let Some(addr) = outcome {
            tracing::info!("Resolved AMBEserver {} to {}", self.host, addr);
            self.peer = PeerState::Resolved(addr);
            self.flush_queue();
            return Ok(());
        }

        let attempts = attempts + 1;
        if attempts >= self.policy.max_attempts {
            tracing::error!(
                "Giving up resolving {} after {} attempts, dropping {} queued frames",
                self.host,
                attempts,
                self.queue.len()
            );
            while self.queue.pop().is_some() {}
            self.peer = PeerState::Failed;
            return Err(TransportError::ResolveExhausted {
                host: self.host.clone(),
                attempts,
            });
        }

        let backoff = self.policy.initial_backoff * 2u32.saturating_pow(attempts - 1);
        tracing::warn!(
            "Could not resolve {}, retrying in {:?} (attempt {}/{})",
            self.host,
            backoff,
            attempts,
            self.policy.max_attempts
        );
        self.peer = PeerState::Pending {
            attempts,
            retry_at: now + backoff,
        };
        Ok(())
    }

    fn flush_queue(&mut self) {
        while let Some(packet) = self.queue.pop() {
            if let Err(e) = self.send_now(&packet) {
                tracing::warn!("Failed to send queued frame: {}", e);
            }
        }
    }

    fn send_now(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let (Some(socket), PeerState::Resolved(addr)) = (&self.socket, self.peer) else {
            return Err(TransportError::Closed);
        };
        match socket.send_to(bytes, addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(TransportError::SendFailed("socket buffer full".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Transport for AmbeServerTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self.peer {
            PeerState::Resolved(_) => self.send_now(bytes),
            PeerState::Failed => Err(TransportError::ResolveExhausted {
                host: self.host.clone(),
                attempts: self.policy.max_attempts,
            }),
            PeerState::Pending { .. } => {
                if self.queue.push(Bytes::copy_from_slice(bytes)).is_err() {
                    self.dropped += 1;
                    tracing::warn!("AMBEserver queue full, dropping frame");
                }
                self.try_resolve(Instant::now())
            }
        }
    }

    fn poll_received(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.try_resolve(Instant::now())?;

        let Some(socket) = &self.socket else {
            return Err(TransportError::Closed);
        };

        let mut buf = [0u8; MAX_DATAGRAM];
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                if Some(from) != self.peer() {
                    tracing::debug!("Ignoring datagram from unexpected peer {}", from);
                    return Ok(None);
                }
                Ok(Some(Bytes::copy_from_slice(&buf[..n])))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            tracing::info!("Closed AMBEserver socket for {}:{}", self.host, self.port);
        }
    }

    fn describe(&self) -> String {
        format!("udp://{}:{}", self.host, self.port)
    }
}

/// Resolve on a resolver thread. A thread that cannot be spawned counts
/// as a failed attempt.
fn spawn_lookup(host: &str, port: u16) -> Lookup {
    let (tx, rx) = bounded(1);
    let name = host.to_string();
    let spawned = thread::Builder::new()
        .name(format!("ambeserver-dns-{}", host))
        .spawn(move || {
            // the transport may be gone by now
            let _ = tx.send(resolve_host(&name, port));
        });
    if let Err(e) = spawned {
        tracing::warn!("Could not start DNS lookup for {}: {}", host, e);
    }
    rx
}

fn resolve_host(host: &str, port: u16) -> Option<SocketAddr> {
    match (host, port).to_socket_addrs() {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            tracing::debug!("DNS lookup for {} failed: {}", host, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Lookup that has already finished
    fn ready(outcome: Option<SocketAddr>) -> Lookup {
        let (tx, rx) = bounded(1);
        tx.send(outcome).unwrap();
        rx
    }

    fn policy(max_attempts: u32) -> ResolvePolicy {
        ResolvePolicy {
            queue_depth: 2,
            max_attempts,
            initial_backoff: Duration::ZERO,
        }
    }

    #[test]
    fn test_frames_queue_until_resolved() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_addr = peer.local_addr().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();

        let mut t = AmbeServerTransport::with_resolver(
            "adapter",
            peer_addr.port(),
            Some(socket),
            policy(3),
            Box::new(move |_, _| {
                // fails on the first two attempts
                ready((calls_in.fetch_add(1, Ordering::SeqCst) >= 2).then_some(peer_addr))
            }),
        );
        assert!(t.peer().is_none());

        // second attempt fails too, frame stays queued
        t.send(&[1, 2, 3]).unwrap();
        assert_eq!(t.queued(), 1);

        // third attempt succeeds and flushes
        t.poll_received().unwrap();
        assert_eq!(t.peer(), Some(peer_addr));
        assert_eq!(t.queued(), 0);

        let mut buf = [0u8; 16];
        peer.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
    }

    #[test]
    fn test_resolution_exhaustion_is_reported() {
        let mut t = AmbeServerTransport::with_resolver(
            "nowhere.invalid",
            2460,
            None,
            policy(4),
            Box::new(|_, _| ready(None)),
        );

        // attempts 2 and 3 of 4
        t.send(&[1]).unwrap();
        t.send(&[2]).unwrap();
        assert_eq!(t.queued(), 2);
        // queue is full and the last attempt fails
        let err = t.send(&[3]).unwrap_err();
        assert!(matches!(err, TransportError::ResolveExhausted { attempts: 4, .. }));
        assert_eq!(t.dropped(), 1);
        assert_eq!(t.queued(), 0);

        assert!(matches!(
            t.send(&[4]),
            Err(TransportError::ResolveExhausted { .. })
        ));
    }

    #[test]
    fn test_pending_lookup_does_not_block() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_addr = peer.local_addr().unwrap();
        let (answer_tx, answer_rx) = bounded(1);
        let mut pending = Some(answer_rx);

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        let mut t = AmbeServerTransport::with_resolver(
            "slow-dns",
            peer_addr.port(),
            Some(socket),
            policy(2),
            Box::new(move |_, _| pending.take().unwrap_or_else(|| ready(None))),
        );
        assert!(t.is_resolving());

        // lookup still running: frames queue, nothing fails or waits
        t.send(&[7, 7]).unwrap();
        assert_eq!(t.poll_received().unwrap(), None);
        assert_eq!(t.queued(), 1);
        assert!(t.peer().is_none());

        answer_tx.send(Some(peer_addr)).unwrap();
        t.poll_received().unwrap();
        assert_eq!(t.peer(), Some(peer_addr));
        assert!(!t.is_resolving());
        assert_eq!(t.queued(), 0);

        let mut buf = [0u8; 16];
        peer.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[7, 7]);
    }

    #[test]
    fn test_single_attempt_exhausts_at_open() {
        let mut t = AmbeServerTransport::with_resolver(
            "nowhere.invalid",
            2460,
            None,
            policy(1),
            Box::new(|_, _| ready(None)),
        );
        assert!(!t.is_resolving());
        assert!(matches!(
            t.send(&[1]),
            Err(TransportError::ResolveExhausted { attempts: 1, .. })
        ));
        assert_eq!(t.queued(), 0);
    }
}
