//! Async UDP socket wrapper.
//!
//! [`Socket`] is a thin layer over `tokio::net::UdpSocket` that applies the
//! benchmark's socket configuration at bind time: large send/receive buffers
//! so bursts above the drain rate are absorbed by the kernel instead of
//! dropped, plus address reuse.  All protocol logic lives elsewhere; this
//! module owns only byte I/O.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Kernel send/receive buffer size requested for both endpoints (4 MiB).
pub const SOCKET_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// An async datagram socket configured for the benchmark.
///
/// All methods are `&self` so the socket can be shared across tasks behind
/// an `Arc` (datagram sockets are safe for concurrent send and receive).
#[derive(Debug)]
pub struct Socket {
    /// Resolved local address (useful when binding to port 0).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind to `local_addr` and apply the benchmark socket options.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port; the resolved
    /// address is available in [`Socket::local_addr`].
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let std_socket = std::net::UdpSocket::bind(local_addr)?;
        configure(&std_socket);
        std_socket.set_nonblocking(true)?;

        let inner = UdpSocket::from_std(std_socket)?;
        let local_addr = inner.local_addr()?;
        log::debug!("socket bound to {local_addr}");
        Ok(Self { local_addr, inner })
    }

    /// Send one datagram to `dest`.  Returns the number of bytes written.
    pub async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, dest).await
    }

    /// Receive the next datagram into `buf`.
    ///
    /// Returns `(length, sender_address)`.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}

/// Request large kernel buffers and address reuse.
///
/// The requests are best-effort: the kernel may clamp the buffer sizes (on
/// Linux to `net.core.{r,w}mem_max`) and the benchmark works either way, so
/// failures are logged rather than surfaced.
#[cfg(unix)]
fn configure(socket: &std::net::UdpSocket) {
    use std::os::unix::io::AsRawFd;

    let fd = socket.as_raw_fd();
    for (opt, name, value) in [
        (libc::SO_SNDBUF, "SO_SNDBUF", SOCKET_BUFFER_SIZE as libc::c_int),
        (libc::SO_RCVBUF, "SO_RCVBUF", SOCKET_BUFFER_SIZE as libc::c_int),
        (libc::SO_REUSEADDR, "SO_REUSEADDR", 1),
    ] {
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                opt,
                &value as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            log::warn!("setsockopt({name}) failed: {}", io::Error::last_os_error());
        }
    }
}

#[cfg(not(unix))]
fn configure(_socket: &std::net::UdpSocket) {}
