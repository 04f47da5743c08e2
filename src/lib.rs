//! Single-threaded, multi-listener HTTP/1.1 server driven by a directive
//! configuration file.
//!
//! [`config`] compiles the file into a routing table, [`server`] runs the
//! readiness loop over it and hands resolved requests to a
//! [`handlers::RequestHandler`].

pub mod config;
pub mod handlers;
pub mod http;
pub mod server;

pub use config::{Config, ConfigError, parse_config};
pub use handlers::{HandlerError, RequestHandler, StaticFileHandler};
pub use server::Server;
pub use server::error::ServerError;
