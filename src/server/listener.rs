use crate::server::error::{ServerError, ServerResult};
use mio::Token;
use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::fd::AsRawFd;

pub const LISTEN_BACKLOG: i32 = 128;

/// A bound, listening, non-blocking socket for one configured port.
pub struct Listener {
    pub listener: TcpListener,
    pub addr: SocketAddr,
    pub server_idx: usize,
    pub port: u16,
}

impl Listener {
    pub fn bind(host: &str, port: u16, server_idx: usize) -> ServerResult<Self> {
        let bind_err = |source: io::Error| ServerError::Bind {
            addr: format!("{}:{}", host, port),
            source,
        };

        let addr = resolve(host, port).map_err(bind_err)?;
        let socket = open_socket(addr).map_err(bind_err)?;
        let listener = TcpListener::from_std(socket.into());
        let addr = listener.local_addr().unwrap_or(addr);

        Ok(Self {
            listener,
            addr,
            server_idx,
            port,
        })
    }

    /// Listeners are keyed by their descriptor, like connections.
    pub fn token(&self) -> Token {
        Token(self.listener.as_raw_fd() as usize)
    }
}

fn open_socket(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket)
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, format!("cannot resolve {}", host))
    })
}
