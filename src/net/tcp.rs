//! TCP connect and listen with socket options applied

use std::{io, net::SocketAddr};

use tokio::net::{TcpListener, TcpStream};

use super::{sys, AcceptOpts, ConnectOpts};

/// Connects to `addr` as an outbound stream
pub async fn connect(addr: SocketAddr, opts: &ConnectOpts) -> io::Result<TcpStream> {
    sys::connect_tcp_stream(addr, opts).await
}

/// Binds a listening socket on `addr`
pub async fn listen(addr: SocketAddr, opts: &AcceptOpts) -> io::Result<TcpListener> {
    sys::create_inbound_tcp_listener(addr, opts).await
}

/// Applies per-connection options to an accepted stream
pub fn configure_accepted(stream: &TcpStream, opts: &AcceptOpts) -> io::Result<()> {
    sys::set_common_sockopt_after_accept(stream, opts)
}
