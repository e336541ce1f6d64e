//! UDP connect and listen with socket options applied

use std::{io, net::SocketAddr};

use tokio::net::UdpSocket;

use super::{sys, AcceptOpts, AddrFamily, ConnectOpts};

/// Creates an outbound socket `connect()`ed to `addr`
pub async fn connect(addr: SocketAddr, opts: &ConnectOpts) -> io::Result<UdpSocket> {
    let socket = sys::create_outbound_udp_socket(AddrFamily::from(&addr), opts).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

/// Binds a datagram socket on `addr`
pub async fn listen(addr: SocketAddr, opts: &AcceptOpts) -> io::Result<UdpSocket> {
    sys::create_inbound_udp_socket(addr, opts).await
}
