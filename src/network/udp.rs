//! UDP socket setup for the USRP link

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::error::NetworkError;

/// Kernel buffer size requested for both directions
pub const SOCKET_BUFFER_SIZE: usize = 256 * 1024;

/// Largest datagram the bridge expects to receive
pub const MAX_DATAGRAM_LEN: usize = 1024;

/// Create a non-blocking UDP socket bound to `bind`
pub fn create_socket(bind: SocketAddr) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE) {
        warn!("Could not set receive buffer size: {}", e);
    }
    if let Err(e) = socket.set_send_buffer_size(SOCKET_BUFFER_SIZE) {
        warn!("Could not set send buffer size: {}", e);
    }

    socket
        .set_nonblocking(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .bind(&bind.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind, e)))?;

    debug!("UDP socket bound to {}", bind);
    Ok(socket.into())
}

/// Wildcard IPv4 address on `port`
pub fn listen_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Resolve the peer address, preferring IPv4
pub fn resolve_peer(host: &str, port: u16) -> Result<SocketAddr, NetworkError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| NetworkError::SendFailed(format!("cannot resolve {}: {}", host, e)))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| NetworkError::SendFailed(format!("no address for {}", host)))
}
