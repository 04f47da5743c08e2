use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CLIENT_BODY_LIMIT: usize = 1024 * 1024;

/// HTTP methods a location may allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub code: u16,
    pub url: String,
}

/// A path-prefix scoped routing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationConfig {
    pub name: String,
    /// Never empty once parsed: explicit or inherited from the server.
    pub root: String,
    pub index: Option<String>,
    pub allowed_methods: Vec<Method>,
    pub autoindex: bool,
    pub cgi_path: Option<String>,
    pub redirect: Option<Redirect>,
    pub upload_path: Option<String>,
}

impl LocationConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            root: String::new(),
            index: None,
            allowed_methods: Vec::new(),
            autoindex: false,
            cgi_path: None,
            redirect: None,
            upload_path: None,
        }
    }

    /// An empty method list places no restriction.
    pub fn allows(&self, method: Method) -> bool {
        self.allowed_methods.is_empty() || self.allowed_methods.contains(&method)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ports: Vec<u16>,
    pub host: String,
    pub root: Option<String>,
    pub server_names: Vec<String>,
    pub client_body_limit: usize,
    pub error_pages: BTreeMap<u16, String>,
    pub locations: BTreeMap<String, LocationConfig>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            ports: Vec::new(),
            host: DEFAULT_HOST.to_string(),
            root: None,
            server_names: Vec::new(),
            client_body_limit: DEFAULT_CLIENT_BODY_LIMIT,
            error_pages: BTreeMap::new(),
            locations: BTreeMap::new(),
        }
    }

    /// Every `(host, port)` pair this server listens on.
    pub fn addresses(&self) -> impl Iterator<Item = (&str, u16)> + '_ {
        self.ports.iter().map(move |&port| (self.host.as_str(), port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
}

// Rendering back to the directive grammar. Compiling the output again yields
// the same routing table.

impl fmt::Display for LocationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    location {} {{", self.name)?;
        writeln!(f, "        root {};", self.root)?;
        if let Some(index) = &self.index {
            writeln!(f, "        index {};", index)?;
        }
        if !self.allowed_methods.is_empty() {
            let methods: Vec<&str> = self.allowed_methods.iter().map(Method::as_str).collect();
            writeln!(f, "        allowed_methods {};", methods.join(" "))?;
        }
        writeln!(f, "        autoindex {};", if self.autoindex { "on" } else { "off" })?;
        if let Some(cgi) = &self.cgi_path {
            writeln!(f, "        cgi_path {};", cgi)?;
        }
        if let Some(redirect) = &self.redirect {
            writeln!(f, "        return {} {};", redirect.code, redirect.url)?;
        }
        if let Some(upload) = &self.upload_path {
            writeln!(f, "        upload_path {};", upload)?;
        }
        writeln!(f, "    }}")
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "server {{")?;
        let ports: Vec<String> = self.ports.iter().map(u16::to_string).collect();
        writeln!(f, "    listen {};", ports.join(" "))?;
        writeln!(f, "    host {};", self.host)?;
        if !self.server_names.is_empty() {
            writeln!(f, "    server_name {};", self.server_names.join(" "))?;
        }
        writeln!(f, "    client_max_body_size {};", self.client_body_limit)?;
        if let Some(root) = &self.root {
            writeln!(f, "    root {};", root)?;
        }
        for (code, page) in &self.error_pages {
            writeln!(f, "    error_page {} {};", code, page)?;
        }
        for location in self.locations.values() {
            write!(f, "{}", location)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, server) in self.servers.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", server)?;
        }
        Ok(())
    }
}
