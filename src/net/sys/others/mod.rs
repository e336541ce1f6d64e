use std::{
    io::{self, ErrorKind},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};

use crate::net::{AcceptOpts, AddrFamily, ConnectOpts};

fn check_opts_supported(
    fwmark: Option<u32>,
    bind_interface: Option<&str>,
    fastopen: bool,
    mptcp: bool,
) -> io::Result<()> {
    if fwmark.is_some() {
        return Err(io::Error::new(
            ErrorKind::Unsupported,
            "socket mark is only supported on Linux",
        ));
    }
    if bind_interface.is_some() {
        return Err(io::Error::new(
            ErrorKind::Unsupported,
            "interface binding is not supported on this platform",
        ));
    }
    if fastopen {
        return Err(io::Error::new(
            ErrorKind::Unsupported,
            "TFO is not supported on this platform",
        ));
    }
    if mptcp {
        return Err(io::Error::new(
            ErrorKind::Unsupported,
            "MPTCP is not supported on this platform",
        ));
    }
    Ok(())
}

pub async fn connect_tcp_stream(addr: SocketAddr, opts: &ConnectOpts) -> io::Result<TcpStream> {
    check_opts_supported(
        opts.fwmark,
        opts.bind_interface.as_deref(),
        opts.tcp.fastopen,
        opts.tcp.mptcp,
    )?;

    let socket = match addr {
        SocketAddr::V4(..) => TcpSocket::new_v4()?,
        SocketAddr::V6(..) => TcpSocket::new_v6()?,
    };

    if opts.reuse_addr {
        socket.set_reuseaddr(true)?;
    }

    match addr {
        SocketAddr::V4(..) => {
            if let Some(ip) = opts.bind_local_addr4 {
                socket.bind(SocketAddr::new(ip.into(), 0))?;
            }
        }
        SocketAddr::V6(..) => {
            if let Some(ip) = opts.bind_local_addr6 {
                socket.bind(SocketAddr::new(ip.into(), 0))?;
            }
        }
    }

    socket.connect(addr).await
}

pub async fn create_inbound_tcp_listener(addr: SocketAddr, opts: &AcceptOpts) -> io::Result<TcpListener> {
    check_opts_supported(None, opts.bind_interface.as_deref(), opts.tcp.fastopen, opts.tcp.mptcp)?;

    let socket = match addr {
        SocketAddr::V4(..) => TcpSocket::new_v4()?,
        SocketAddr::V6(..) => TcpSocket::new_v6()?,
    };

    if opts.reuse_addr {
        socket.set_reuseaddr(true)?;
    }

    socket.bind(addr)?;
    socket.listen(1024)
}

pub fn set_common_sockopt_after_accept(_stream: &TcpStream, _opts: &AcceptOpts) -> io::Result<()> {
    Ok(())
}

pub async fn create_outbound_udp_socket(af: AddrFamily, opts: &ConnectOpts) -> io::Result<UdpSocket> {
    check_opts_supported(opts.fwmark, opts.bind_interface.as_deref(), false, false)?;

    let bind_addr = match (af, opts.bind_local_addr4, opts.bind_local_addr6) {
        (AddrFamily::Ipv4, Some(ip), ..) => SocketAddr::new(ip.into(), 0),
        (AddrFamily::Ipv6, .., Some(ip)) => SocketAddr::new(ip.into(), 0),
        (AddrFamily::Ipv4, ..) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
        (AddrFamily::Ipv6, ..) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
    };

    UdpSocket::bind(bind_addr).await
}

pub async fn create_inbound_udp_socket(addr: SocketAddr, opts: &AcceptOpts) -> io::Result<UdpSocket> {
    check_opts_supported(None, opts.bind_interface.as_deref(), false, false)?;
    UdpSocket::bind(addr).await
}
