use std::{
    io, mem,
    os::unix::io::{AsRawFd, FromRawFd},
    sync::atomic::{AtomicBool, Ordering},
};

use log::{debug, error};
use tokio::net::TcpSocket;

use crate::net::AddrFamily;

/// Set `SO_MARK` for mark-based routing (since Linux 2.6.25)
///
/// NOTE: This will require CAP_NET_ADMIN capability (root in most cases)
pub fn set_mark<S: AsRawFd>(socket: &S, mark: u32) -> io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_MARK,
            &mark as *const _ as *const _,
            mem::size_of_val(&mark) as libc::socklen_t,
        )
    };
    if ret != 0 {
        let err = io::Error::last_os_error();
        error!("set SO_MARK error: {}", err);
        return Err(err);
    }
    Ok(())
}

/// Set `SO_BINDTODEVICE` for binding to a specific interface
pub fn set_bindtodevice<S: AsRawFd>(socket: &S, iface: &str) -> io::Result<()> {
    let iface_bytes = iface.as_bytes();

    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            iface_bytes.as_ptr() as *const _ as *const libc::c_void,
            iface_bytes.len() as libc::socklen_t,
        )
    };
    if ret != 0 {
        let err = io::Error::last_os_error();
        error!("set SO_BINDTODEVICE error: {}", err);
        return Err(err);
    }
    Ok(())
}

/// Enable `TCP_FASTOPEN` on a listening socket
///
/// `TCP_FASTOPEN` was supported since Linux 3.7
pub fn set_tcp_fastopen<S: AsRawFd>(socket: &S) -> io::Result<()> {
    let queue: libc::c_int = 5;

    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_FASTOPEN,
            &queue as *const _ as *const libc::c_void,
            mem::size_of_val(&queue) as libc::socklen_t,
        )
    };
    if ret != 0 {
        let err = io::Error::last_os_error();
        error!("set TCP_FASTOPEN error: {}", err);
        return Err(err);
    }
    Ok(())
}

/// Enable `TCP_FASTOPEN_CONNECT` on a connecting socket, letting the first
/// write ride in the SYN payload.
///
/// `TCP_FASTOPEN_CONNECT` was supported since Linux 4.11. Older kernels get a
/// plain TCP handshake.
pub fn set_fastopen_connect(socket: &TcpSocket) -> io::Result<()> {
    static SUPPORT_TCP_FASTOPEN_CONNECT: AtomicBool = AtomicBool::new(true);
    if !SUPPORT_TCP_FASTOPEN_CONNECT.load(Ordering::Relaxed) {
        return Ok(());
    }

    let enable: libc::c_int = 1;

    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_FASTOPEN_CONNECT,
            &enable as *const _ as *const libc::c_void,
            mem::size_of_val(&enable) as libc::socklen_t,
        )
    };
    if ret != 0 {
        let err = io::Error::last_os_error();
        if let Some(libc::ENOPROTOOPT) = err.raw_os_error() {
            // kernel version < 4.11
            SUPPORT_TCP_FASTOPEN_CONNECT.store(false, Ordering::Relaxed);
            return Ok(());
        }
        error!("set TCP_FASTOPEN_CONNECT error: {}", err);
        return Err(err);
    }
    Ok(())
}

/// Create a Multipath-TCP socket (since Linux 5.6)
///
/// Falls back to a plain TCP socket when the kernel was built without MPTCP.
pub fn create_mptcp_socket(af: AddrFamily) -> io::Result<TcpSocket> {
    let domain = match af {
        AddrFamily::Ipv4 => libc::AF_INET,
        AddrFamily::Ipv6 => libc::AF_INET6,
    };

    let fd = unsafe {
        libc::socket(
            domain,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            libc::IPPROTO_MPTCP,
        )
    };
    if fd >= 0 {
        return Ok(unsafe { TcpSocket::from_raw_fd(fd) });
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EPROTONOSUPPORT) | Some(libc::EINVAL) => {
            debug!("kernel has no MPTCP support, falling back to TCP, error: {}", err);
            match af {
                AddrFamily::Ipv4 => TcpSocket::new_v4(),
                AddrFamily::Ipv6 => TcpSocket::new_v6(),
            }
        }
        _ => Err(err),
    }
}

/// Forbid IP fragmentation by forcing path-MTU discovery
pub fn set_disable_ip_fragmentation<S: AsRawFd>(af: AddrFamily, socket: &S) -> io::Result<()> {
    let (level, optname, optval) = match af {
        AddrFamily::Ipv4 => (libc::IPPROTO_IP, libc::IP_MTU_DISCOVER, libc::IP_PMTUDISC_DO),
        AddrFamily::Ipv6 => (libc::IPPROTO_IPV6, libc::IPV6_MTU_DISCOVER, libc::IPV6_PMTUDISC_DO),
    };

    let value: libc::c_int = optval;
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            optname,
            &value as *const _ as *const libc::c_void,
            mem::size_of_val(&value) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
