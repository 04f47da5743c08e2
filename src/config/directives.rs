use crate::config::error::{ConfigError, ConfigResult};
use crate::config::models::{DEFAULT_PORT, LocationConfig, Method, Redirect};
use crate::config::tokenizer::Token;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

const INDEX_EXTENSIONS: [&str; 8] = ["html", "css", "ico", "txt", "py", "sh", "pl", "cgi"];

/// Read position over a token stream.
pub struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    pub fn bump(&mut self) -> Option<&'a str> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    #[cfg(test)]
    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consumes one value token. Structural tokens never count as values.
    pub fn value(&mut self, err: impl FnOnce() -> ConfigError) -> ConfigResult<&'a str> {
        match self.peek() {
            Some(token) if !is_structural(token) && !token.is_empty() => {
                self.pos += 1;
                Ok(token)
            }
            _ => Err(err()),
        }
    }

    /// Consumes `expected` or fails with `err`.
    pub fn expect(&mut self, expected: &str, err: impl FnOnce() -> ConfigError) -> ConfigResult<()> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(err())
        }
    }

    pub fn expect_semicolon(&mut self, err: impl FnOnce() -> ConfigError) -> ConfigResult<()> {
        self.expect(";", err)
    }

    /// Collects value tokens up to (and consuming) the terminating `;`.
    fn values_until_semicolon(&mut self, err: impl Fn() -> ConfigError) -> ConfigResult<Vec<&'a str>> {
        let mut values = Vec::new();
        loop {
            match self.peek() {
                Some(";") => {
                    self.pos += 1;
                    return Ok(values);
                }
                Some(token) if !is_structural(token) => {
                    values.push(token);
                    self.pos += 1;
                }
                _ => return Err(err()),
            }
        }
    }
}

pub fn is_structural(token: &str) -> bool {
    matches!(token, "{" | "}" | ";")
}

// Server context

pub fn parse_listen(cur: &mut Cursor<'_>) -> ConfigResult<Vec<u16>> {
    let values = cur.values_until_semicolon(|| ConfigError::InvalidPort)?;
    if values.is_empty() {
        return Ok(vec![DEFAULT_PORT]);
    }

    values
        .into_iter()
        .map(|v| match v.parse::<u16>() {
            Ok(port) if port >= 1024 => Ok(port),
            _ => Err(ConfigError::InvalidPort),
        })
        .collect()
}

pub fn parse_host(cur: &mut Cursor<'_>) -> ConfigResult<String> {
    let host = cur.value(|| ConfigError::InvalidHost)?;
    cur.expect_semicolon(|| ConfigError::InvalidHost)?;
    Ok(host.to_string())
}

pub fn parse_server_names(cur: &mut Cursor<'_>) -> ConfigResult<Vec<String>> {
    let names = cur.values_until_semicolon(|| ConfigError::InvalidServerName)?;
    if names.is_empty() {
        return Err(ConfigError::InvalidServerName);
    }
    Ok(names.into_iter().map(str::to_string).collect())
}

pub fn parse_client_max_body_size(cur: &mut Cursor<'_>) -> ConfigResult<usize> {
    let raw = cur.value(|| ConfigError::InvalidClientMaxBodySize)?;
    let limit = match raw.parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => return Err(ConfigError::InvalidClientMaxBodySize),
    };
    cur.expect_semicolon(|| ConfigError::InvalidClientMaxBodySize)?;
    Ok(limit)
}

pub fn parse_error_page(cur: &mut Cursor<'_>) -> ConfigResult<(u16, String)> {
    let raw = cur.value(|| ConfigError::InvalidErrorPage)?;
    let code = match raw.parse::<u16>() {
        Ok(c) if (100..=599).contains(&c) => c,
        _ => return Err(ConfigError::InvalidErrorPage),
    };
    let page = cur.value(|| ConfigError::InvalidErrorPage)?;
    cur.expect_semicolon(|| ConfigError::InvalidErrorPage)?;
    Ok((code, page.to_string()))
}

/// `root` at either level: must be an existing, readable directory.
pub fn parse_root(cur: &mut Cursor<'_>) -> ConfigResult<String> {
    let raw = cur.value(|| ConfigError::InvalidRootPath(String::new()))?;
    let root = normalize_root(raw);

    let path = Path::new(&root);
    if !path.is_dir() || !is_accessible(path, libc::R_OK) {
        return Err(ConfigError::InvalidRootPath(root));
    }

    cur.expect_semicolon(|| ConfigError::InvalidRootPath(root.clone()))?;
    Ok(root)
}

fn normalize_root(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

// Location context

/// Parses `location <path> { ... }`. The cursor sits on the path token.
///
/// `index` and `cgi_path` are checked against the block's final root, so
/// directive order inside the block does not matter.
pub fn parse_location(cur: &mut Cursor<'_>, server_root: Option<&str>) -> ConfigResult<LocationConfig> {
    let name = cur.value(|| ConfigError::InvalidPrefix)?;
    cur.expect("{", || ConfigError::InvalidLocationBlock)?;

    let mut location = LocationConfig::new(name);
    let mut explicit_root: Option<String> = None;

    loop {
        let key = match cur.bump() {
            Some("}") => break,
            Some(key) => key,
            None => return Err(ConfigError::UnexpectedEof),
        };

        match key {
            "root" => explicit_root = Some(parse_root(cur)?),
            "index" => location.index = Some(parse_index(cur)?),
            "allowed_methods" => location.allowed_methods = parse_allowed_methods(cur)?,
            "autoindex" => location.autoindex = parse_autoindex(cur)?,
            "cgi_path" => location.cgi_path = Some(parse_cgi_path(cur)?),
            "return" => location.redirect = Some(parse_return(cur)?),
            "upload_path" => location.upload_path = Some(parse_upload_path(cur)?),
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
    }

    location.root = match explicit_root.or_else(|| server_root.map(str::to_string)) {
        Some(root) => root,
        None => return Err(ConfigError::InvalidRootPath(format!("location {} has no root", name))),
    };
    if let Some(index) = &location.index {
        check_index(&location.root, index)?;
    }
    if let Some(cgi) = &location.cgi_path {
        check_cgi_path(&location.root, cgi)?;
    }
    Ok(location)
}

/// `index <file>;` with an allowed extension. Existence is checked by
/// [`check_index`] once the root is known.
pub fn parse_index(cur: &mut Cursor<'_>) -> ConfigResult<String> {
    let index = cur.value(|| ConfigError::InvalidIndex(String::new()))?;

    let extension_ok = Path::new(index)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| INDEX_EXTENSIONS.contains(&e));
    if !extension_ok {
        return Err(ConfigError::InvalidIndex(index.to_string()));
    }

    cur.expect_semicolon(|| ConfigError::InvalidIndex(index.to_string()))?;
    Ok(index.to_string())
}

/// The index must be a readable regular file under `root`.
pub fn check_index(root: &str, index: &str) -> ConfigResult<()> {
    let full = resolve(root, index);
    if !full.is_file() || !is_accessible(&full, libc::R_OK) {
        return Err(ConfigError::InvalidIndex(full.display().to_string()));
    }
    Ok(())
}

pub fn parse_allowed_methods(cur: &mut Cursor<'_>) -> ConfigResult<Vec<Method>> {
    let values = cur.values_until_semicolon(|| ConfigError::InvalidAllowedMethods)?;
    if values.is_empty() {
        return Err(ConfigError::InvalidAllowedMethods);
    }

    let mut methods = Vec::with_capacity(values.len());
    for raw in values {
        let method: Method = raw.parse().map_err(|_| ConfigError::InvalidAllowedMethods)?;
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    Ok(methods)
}

pub fn parse_autoindex(cur: &mut Cursor<'_>) -> ConfigResult<bool> {
    let enabled = match cur.value(|| ConfigError::InvalidAutoindex)? {
        "on" => true,
        "off" => false,
        _ => return Err(ConfigError::InvalidAutoindex),
    };
    cur.expect_semicolon(|| ConfigError::InvalidAutoindex)?;
    Ok(enabled)
}

pub fn parse_cgi_path(cur: &mut Cursor<'_>) -> ConfigResult<String> {
    let cgi = cur.value(|| ConfigError::InvalidCgiPath(String::new()))?;
    cur.expect_semicolon(|| ConfigError::InvalidCgiPath(cgi.to_string()))?;
    Ok(cgi.to_string())
}

/// The interpreter must be an executable regular file under `root`.
pub fn check_cgi_path(root: &str, cgi: &str) -> ConfigResult<()> {
    let full = resolve(root, cgi);
    if !full.is_file() || !is_accessible(&full, libc::X_OK) {
        return Err(ConfigError::InvalidCgiPath(full.display().to_string()));
    }
    Ok(())
}

/// `return <code> <url>;` is stored for the request handler, not interpreted here.
pub fn parse_return(cur: &mut Cursor<'_>) -> ConfigResult<Redirect> {
    let raw = cur.value(|| ConfigError::InvalidRedirect)?;
    let code = match raw.parse::<u16>() {
        Ok(c) if (300..=399).contains(&c) => c,
        _ => return Err(ConfigError::InvalidRedirect),
    };
    let url = cur.value(|| ConfigError::InvalidRedirect)?;
    cur.expect_semicolon(|| ConfigError::InvalidRedirect)?;
    Ok(Redirect { code, url: url.to_string() })
}

pub fn parse_upload_path(cur: &mut Cursor<'_>) -> ConfigResult<String> {
    let path = cur.value(|| ConfigError::InvalidUploadPath)?;
    cur.expect_semicolon(|| ConfigError::InvalidUploadPath)?;
    Ok(path.to_string())
}

fn resolve(root: &str, name: &str) -> PathBuf {
    Path::new(root).join(name.trim_start_matches('/'))
}

/// access(2) check against the real uid, same as the shell's `test -r`/`-x`.
fn is_accessible(path: &Path, mode: libc::c_int) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated CString that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}
