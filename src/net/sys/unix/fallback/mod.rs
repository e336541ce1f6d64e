use std::{
    io::{self, ErrorKind},
    os::unix::io::AsRawFd,
};

use tokio::net::TcpSocket;

use crate::net::AddrFamily;

pub fn set_mark<S: AsRawFd>(_socket: &S, _mark: u32) -> io::Result<()> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "socket mark is only supported on Linux",
    ))
}

pub fn set_bindtodevice<S: AsRawFd>(_socket: &S, _iface: &str) -> io::Result<()> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "interface binding is not supported on this platform",
    ))
}

pub fn set_tcp_fastopen<S: AsRawFd>(_socket: &S) -> io::Result<()> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "TFO is not supported on this platform",
    ))
}

pub fn set_fastopen_connect(_socket: &TcpSocket) -> io::Result<()> {
    // Plain handshake; the first write goes out after connect
    Ok(())
}

pub fn create_mptcp_socket(_af: AddrFamily) -> io::Result<TcpSocket> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "MPTCP is not supported on this platform",
    ))
}

pub fn set_disable_ip_fragmentation<S: AsRawFd>(_af: AddrFamily, _socket: &S) -> io::Result<()> {
    Ok(())
}
