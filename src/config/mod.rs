pub mod directives;
pub mod error;
pub mod models;
pub mod parser;
pub mod tokenizer;

pub use error::{ConfigError, ConfigResult};
pub use models::{Config, LocationConfig, Method, Redirect, ServerConfig};
pub use parser::{parse_config, parse_config_str};
