pub mod connection;
pub mod error;
pub mod listener;
pub mod routing;

use crate::config::{Config, Method, ServerConfig};
use crate::handlers::{HandlerError, RequestHandler};
use crate::http::response::builtin_error_body;
use crate::http::{Response, StatusCode};
use crate::server::connection::{Connection, ConnectionState, Exchange};
use crate::server::error::{ServerError, ServerResult};
use crate::server::listener::Listener;
use crate::server::routing::match_location;

use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAX_EVENTS: usize = 1024;
const POLL_TIMEOUT: Duration = Duration::from_millis(1000);
const READ_CHUNK: usize = 4096;

/// The readiness-driven engine: owns every listener and live connection.
pub struct Server<H: RequestHandler> {
    poll: Poll,
    listeners: HashMap<Token, Listener>,
    connections: HashMap<Token, Connection>,
    servers: Vec<ServerConfig>,
    handler: H,
    shutdown: Arc<AtomicBool>,
}

impl<H: RequestHandler> Server<H> {
    pub fn new(config: Config, handler: H, shutdown: Arc<AtomicBool>) -> ServerResult<Self> {
        Ok(Self {
            poll: Poll::new()?,
            listeners: HashMap::new(),
            connections: HashMap::new(),
            servers: config.servers,
            handler,
            shutdown,
        })
    }

    /// Opens one listener per configured `(host, port)`.
    ///
    /// A port that cannot be bound is logged and skipped; failing to bind any
    /// port at all is an error.
    pub fn bind(&mut self) -> ServerResult<()> {
        for (idx, s_cfg) in self.servers.iter().enumerate() {
            for (host, port) in s_cfg.addresses() {
                let mut entry = match Listener::bind(host, port, idx) {
                    Ok(entry) => entry,
                    Err(e) => {
                        error!(port, "{}", e);
                        continue;
                    }
                };

                let token = entry.token();
                self.poll
                    .registry()
                    .register(&mut entry.listener, token, Interest::READABLE)?;

                info!(port, addr = %entry.addr, "listening on http://{}", entry.addr);
                self.listeners.insert(token, entry);
            }
        }

        if self.listeners.is_empty() {
            return Err(ServerError::NoListeners);
        }
        Ok(())
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.values().map(|l| l.addr).collect()
    }

    pub fn run(&mut self) {
        let mut events = Events::with_capacity(MAX_EVENTS);

        info!(listeners = self.listeners.len(), "event loop started");
        while !self.shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if e.kind() != io::ErrorKind::Interrupted {
                    error!("poll error: {}", e);
                }
                continue;
            }

            for event in events.iter() {
                let token = event.token();

                if self.listeners.contains_key(&token) {
                    self.accept_connection(token);
                } else {
                    self.handle_client_event(token, event);
                }
            }
        }

        self.shutdown_all();
    }

    fn handle_client_event(&mut self, token: Token, event: &mio::event::Event) {
        if event.is_error() {
            self.close_connection(token);
            return;
        }

        if event.is_readable() {
            self.read_from_client(token);
        }

        if event.is_writable() {
            self.write_to_client(token);
        }
    }

    fn accept_connection(&mut self, listener_token: Token) {
        let Some(entry) = self.listeners.get(&listener_token) else {
            return;
        };
        let (server_idx, port) = (entry.server_idx, entry.port);
        let body_limit = self.servers[server_idx].client_body_limit;

        loop {
            let Some(entry) = self.listeners.get_mut(&listener_token) else {
                return;
            };
            match entry.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(stream.as_raw_fd() as usize);

                    if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
                        warn!(port, %peer, "failed to register client: {}", e);
                        let bytes = self
                            .error_response(server_idx, StatusCode::INTERNAL_SERVER_ERROR)
                            .to_bytes(false);
                        write_once(&mut stream, &bytes, peer);
                        continue;
                    }

                    debug!(port, %peer, token = token.0, "client connected");
                    self.connections
                        .insert(token, Connection::new(stream, peer, server_idx, port, body_limit));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(port, "accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn read_from_client(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let mut buf = [0u8; READ_CHUNK];
        while conn.exchange.is_reading() {
            match conn.stream.read(&mut buf) {
                Ok(0) => {
                    debug!(peer = %conn.peer, "peer closed connection");
                    conn.exchange.close();
                }
                Ok(n) => conn.exchange.receive(&buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %conn.peer, "read error: {}", e);
                    conn.exchange.close();
                }
            }
        }

        match conn.exchange.state() {
            ConnectionState::Closing => self.close_connection(token),
            ConnectionState::ReadyToRespond => self.process_request(token),
            _ => {}
        }
    }

    fn write_to_client(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        while conn.exchange.state() == ConnectionState::WritingResponse {
            match conn.stream.write(conn.exchange.pending_output()) {
                Ok(n) => conn.exchange.record_written(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %conn.peer, "write error: {}", e);
                    conn.exchange.close();
                }
            }
        }

        match conn.exchange.state() {
            ConnectionState::Closing => self.close_connection(token),
            ConnectionState::ReadyToRespond => self.process_request(token),
            _ => {
                debug!(peer = %conn.peer, "keep-alive: waiting for next request");
                if let Err(e) = self.poll.registry().reregister(&mut conn.stream, token, Interest::READABLE) {
                    warn!(token = token.0, "failed to reregister: {}", e);
                    self.close_connection(token);
                }
            }
        }
    }

    fn process_request(&mut self, token: Token) {
        let Some(conn) = self.connections.get(&token) else {
            return;
        };
        let server = &self.servers[conn.server_idx];
        let (response, keep_alive) = dispatch(server, &conn.exchange, &self.handler);

        self.finalize_response(token, response, keep_alive);
    }

    fn finalize_response(&mut self, token: Token, response: Response, keep_alive: bool) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        info!(port = conn.port, peer = %conn.peer, status = response.status.as_u16(), "response ready");

        conn.exchange.set_response(response.to_bytes(keep_alive), keep_alive);

        if let Err(e) = self.poll.registry().reregister(&mut conn.stream, token, Interest::WRITABLE) {
            warn!(token = token.0, "failed to reregister: {}", e);
            self.close_connection(token);
        }
    }

    fn error_response(&self, server_idx: usize, status: StatusCode) -> Response {
        error_response(&self.servers[server_idx], status)
    }

    fn close_connection(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!(port = conn.port, peer = %conn.peer, "client disconnected");
        }
    }

    fn shutdown_all(&mut self) {
        info!(connections = self.connections.len(), "shutting down");

        for (_, mut conn) in self.connections.drain() {
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
        for (_, mut entry) in self.listeners.drain() {
            let _ = self.poll.registry().deregister(&mut entry.listener);
            info!(port = entry.port, "listener closed");
        }
    }
}

/// Produces the response for a completed exchange and whether the connection
/// may stay open afterwards.
pub fn dispatch<H: RequestHandler>(server: &ServerConfig, exchange: &Exchange, handler: &H) -> (Response, bool) {
    let outcome = exchange.request().and_then(|request| {
        let location = match_location(&request.path, &server.locations).ok_or(HandlerError::NotFound)?;
        let method: Method = request.method.parse().map_err(|_| HandlerError::MethodNotAllowed)?;
        if !location.allows(method) {
            return Err(HandlerError::MethodNotAllowed);
        }
        if exchange.has_cookie() {
            debug!(path = %request.path, "request carries a session cookie");
        }
        handler.handle(&request, location)
    });

    match outcome {
        Ok(response) => (response, exchange.keep_alive()),
        Err(e) => {
            debug!("request failed: {}", e);
            (error_response(server, e.status()), false)
        }
    }
}

/// Single non-blocking write for a client that is about to be dropped.
/// Returns how many bytes the socket took.
fn write_once<W: Write>(stream: &mut W, bytes: &[u8], peer: SocketAddr) -> usize {
    match stream.write(bytes) {
        Ok(n) if n == bytes.len() => {
            debug!(%peer, "sent 500 to unregistered client");
            n
        }
        Ok(n) => {
            debug!(%peer, written = n, total = bytes.len(), "partial 500 to unregistered client");
            n
        }
        Err(e) => {
            debug!(%peer, "could not send 500 to unregistered client: {}", e);
            0
        }
    }
}

/// Error page for `status`: the configured file when readable, the built-in
/// page otherwise.
pub fn error_response(server: &ServerConfig, status: StatusCode) -> Response {
    let body = match server.error_pages.get(&status.as_u16()) {
        Some(page) => match std::fs::read(page) {
            Ok(content) => content,
            Err(e) => {
                warn!(page = %page, "custom error page defined but could not be read: {}", e);
                builtin_error_body(status).into_bytes()
            }
        },
        None => builtin_error_body(status).into_bytes(),
    };

    Response::new(status).with_body("text/html", body)
}
