use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    os::unix::io::{AsRawFd, FromRawFd, IntoRawFd},
};

use log::warn;
use socket2::{Domain, Protocol as SockProtocol, SockAddr, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};

use crate::net::{
    option::{KEEPALIVE_IDLE, KEEPALIVE_INTERVAL, KEEPALIVE_PROBE_COUNT},
    AcceptOpts, AddrFamily, ConnectOpts, TcpSocketOpts,
};

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;
        use self::linux::{
            create_mptcp_socket,
            set_bindtodevice,
            set_disable_ip_fragmentation,
            set_fastopen_connect,
            set_mark,
            set_tcp_fastopen,
        };
    } else {
        mod fallback;
        use self::fallback::{
            create_mptcp_socket,
            set_bindtodevice,
            set_disable_ip_fragmentation,
            set_fastopen_connect,
            set_mark,
            set_tcp_fastopen,
        };
    }
}

#[inline(always)]
fn socket_call_warp<S: AsRawFd, F: FnOnce(&Socket) -> io::Result<()>>(stream: &S, f: F) -> io::Result<()> {
    let socket = unsafe { Socket::from_raw_fd(stream.as_raw_fd()) };
    let result = f(&socket);
    let _ = socket.into_raw_fd();
    result
}

fn set_keepalive<S: AsRawFd>(stream: &S) -> io::Result<()> {
    socket_call_warp(stream, |socket| {
        #[allow(unused_mut)]
        let mut keepalive = TcpKeepalive::new()
            .with_time(KEEPALIVE_IDLE)
            .with_interval(KEEPALIVE_INTERVAL);

        #[cfg(any(
            target_os = "linux",
            target_os = "android",
            target_os = "freebsd",
            target_os = "netbsd",
            target_vendor = "apple",
        ))]
        {
            keepalive = keepalive.with_retries(KEEPALIVE_PROBE_COUNT);
        }

        set_keepalive_sockopt(socket, &keepalive)
    })
}

// MPTCP sockets accept SO_KEEPALIVE but reject TCP_KEEPIDLE and TCP_KEEPINTVL
// on some kernels. Retry without them.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_keepalive_sockopt(socket: &Socket, keepalive: &TcpKeepalive) -> io::Result<()> {
    if let Err(err) = socket.set_tcp_keepalive(keepalive) {
        log::debug!("set TCP keep-alive with time & interval failed with error: {:?}", err);
        return socket.set_tcp_keepalive(&TcpKeepalive::new());
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_keepalive_sockopt(socket: &Socket, keepalive: &TcpKeepalive) -> io::Result<()> {
    socket.set_tcp_keepalive(keepalive)
}

fn set_ipv6_only<S: AsRawFd>(socket: &S, ipv6_only: bool) -> io::Result<()> {
    socket_call_warp(socket, |s| s.set_only_v6(ipv6_only))
}

fn create_tcp_socket(af: AddrFamily, opts: &TcpSocketOpts) -> io::Result<TcpSocket> {
    if opts.mptcp {
        return create_mptcp_socket(af);
    }
    match af {
        AddrFamily::Ipv4 => TcpSocket::new_v4(),
        AddrFamily::Ipv6 => TcpSocket::new_v6(),
    }
}

/// Connects a TCP stream to `addr` applying every outbound socket option
pub async fn connect_tcp_stream(addr: SocketAddr, opts: &ConnectOpts) -> io::Result<TcpStream> {
    let socket = create_tcp_socket(AddrFamily::from(&addr), &opts.tcp)?;

    if let Some(mark) = opts.fwmark {
        set_mark(&socket, mark)?;
    }

    if let Some(ref iface) = opts.bind_interface {
        set_bindtodevice(&socket, iface)?;
    }

    if opts.reuse_addr {
        socket.set_reuseaddr(true)?;
    }

    // Source binding only applies when the address families agree
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

    if opts.tcp.fastopen {
        set_fastopen_connect(&socket)?;
    }

    let stream = socket.connect(addr).await?;

    if opts.tcp.keepalive {
        set_keepalive(&stream)?;
    }

    Ok(stream)
}

/// Creates a TCP listener bound to `addr` with inbound socket options
pub async fn create_inbound_tcp_listener(addr: SocketAddr, opts: &AcceptOpts) -> io::Result<TcpListener> {
    let socket = create_tcp_socket(AddrFamily::from(&addr), &opts.tcp)?;

    if let SocketAddr::V6(..) = addr {
        set_ipv6_only(&socket, opts.ipv6_only)?;
    }

    if opts.reuse_addr {
        socket.set_reuseaddr(true)?;
    }

    if let Some(ref iface) = opts.bind_interface {
        set_bindtodevice(&socket, iface)?;
    }

    if opts.tcp.fastopen {
        set_tcp_fastopen(&socket)?;
    }

    socket.bind(addr)?;
    socket.listen(1024)
}

/// Applies per-connection options to an accepted stream
pub fn set_common_sockopt_after_accept(stream: &TcpStream, opts: &AcceptOpts) -> io::Result<()> {
    if opts.tcp.keepalive {
        set_keepalive(stream)?;
    }
    Ok(())
}

/// Creates an unconnected UDP socket for dialing out with family `af`
pub async fn create_outbound_udp_socket(af: AddrFamily, opts: &ConnectOpts) -> io::Result<UdpSocket> {
    let bind_addr = match (af, opts.bind_local_addr4, opts.bind_local_addr6) {
        (AddrFamily::Ipv4, Some(ip), ..) => SocketAddr::new(ip.into(), 0),
        (AddrFamily::Ipv6, .., Some(ip)) => SocketAddr::new(ip.into(), 0),
        (AddrFamily::Ipv4, ..) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
        (AddrFamily::Ipv6, ..) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
    };

    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(SockProtocol::UDP))?;

    if opts.reuse_addr {
        socket.set_reuse_address(true)?;
    }

    socket.bind(&SockAddr::from(bind_addr))?;
    socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(socket.into())?;

    if let Some(mark) = opts.fwmark {
        set_mark(&socket, mark)?;
    }

    if let Some(ref iface) = opts.bind_interface {
        set_bindtodevice(&socket, iface)?;
    }

    if !opts.udp.allow_fragmentation {
        if let Err(err) = set_disable_ip_fragmentation(af, &socket) {
            warn!("failed to disable IP fragmentation, error: {}", err);
        }
    }

    Ok(socket)
}

/// Creates a UDP socket bound to `addr` with inbound socket options
pub async fn create_inbound_udp_socket(addr: SocketAddr, opts: &AcceptOpts) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(SockProtocol::UDP))?;

    if let SocketAddr::V6(..) = addr {
        socket.set_only_v6(opts.ipv6_only)?;
    }

    if opts.reuse_addr {
        socket.set_reuse_address(true)?;
    }

    if let Some(ref iface) = opts.bind_interface {
        set_bindtodevice(&socket, iface)?;
    }

    socket.bind(&SockAddr::from(addr))?;
    socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(socket.into())?;

    if !opts.udp.allow_fragmentation {
        if let Err(err) = set_disable_ip_fragmentation(AddrFamily::from(&addr), &socket) {
            warn!("failed to disable IP fragmentation, error: {}", err);
        }
    }

    Ok(socket)
}
