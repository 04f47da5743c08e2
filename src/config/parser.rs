use crate::config::directives::{self, Cursor};
use crate::config::error::{ConfigError, ConfigResult};
use crate::config::models::{Config, ServerConfig};
use crate::config::tokenizer::{self, Token};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Compiles a configuration file into its server list.
pub fn parse_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let tokens = tokenizer::tokenize_file(path.as_ref())?;
    compile(&tokens)
}

/// Same as [`parse_config`] for in-memory text.
pub fn parse_config_str(content: &str) -> ConfigResult<Config> {
    if content.is_empty() {
        return Err(ConfigError::FileEmpty);
    }
    let tokens = tokenizer::tokenize(content)?;
    compile(&tokens)
}

/// Cross-block state: names and listen addresses must be unique across the file.
struct Compiler {
    server_names: HashSet<String>,
    addresses: HashSet<(String, u16)>,
}

pub fn compile(tokens: &[Token]) -> ConfigResult<Config> {
    let mut compiler = Compiler {
        server_names: HashSet::new(),
        addresses: HashSet::new(),
    };
    let mut cur = Cursor::new(tokens);
    let mut servers = Vec::new();

    while let Some(token) = cur.bump() {
        match token {
            "server" => servers.push(compiler.server_block(&mut cur)?),
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
    }

    if servers.is_empty() {
        return Err(ConfigError::NoServers);
    }
    debug!(servers = servers.len(), "configuration compiled");
    Ok(Config { servers })
}

impl Compiler {
    fn server_block(&mut self, cur: &mut Cursor<'_>) -> ConfigResult<ServerConfig> {
        cur.expect("{", || ConfigError::InvalidServerBlock)?;
        let mut server = ServerConfig::new();

        loop {
            let key = match cur.bump() {
                Some("}") => break,
                Some(key) => key,
                None => return Err(ConfigError::UnexpectedEof),
            };

            match key {
                "listen" => server.ports.extend(directives::parse_listen(cur)?),
                "host" => server.host = directives::parse_host(cur)?,
                "server_name" => {
                    for name in directives::parse_server_names(cur)? {
                        if !self.server_names.insert(name.clone()) {
                            return Err(ConfigError::DuplicateServer(name));
                        }
                        server.server_names.push(name);
                    }
                }
                "client_max_body_size" => {
                    server.client_body_limit = directives::parse_client_max_body_size(cur)?
                }
                "error_page" => {
                    let (code, page) = directives::parse_error_page(cur)?;
                    server.error_pages.insert(code, page);
                }
                "root" => server.root = Some(directives::parse_root(cur)?),
                "location" => {
                    let location = directives::parse_location(cur, server.root.as_deref())?;
                    if server.locations.contains_key(&location.name) {
                        return Err(ConfigError::DuplicateLocation(location.name));
                    }
                    server.locations.insert(location.name.clone(), location);
                }
                other => return Err(ConfigError::UnknownKey(other.to_string())),
            }
        }

        if server.ports.is_empty() {
            return Err(ConfigError::MissingPort);
        }

        for (host, port) in server.addresses() {
            if !self.addresses.insert((host.to_string(), port)) {
                return Err(ConfigError::DuplicateServer(format!("{}:{}", host, port)));
            }
        }

        Ok(server)
    }
}
