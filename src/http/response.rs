use std::fmt;

pub const SERVER_NAME: &str = "localserver";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn reason(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            413 => "Payload Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Answer to a HEAD request: headers describe `body`, which is not sent.
    pub head_only: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            head_only: false,
        }
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.header("Content-Type", content_type)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn without_body(mut self) -> Self {
        self.head_only = true;
        self
    }

    /// Serializes the response. `Content-Length` and `Connection` are always
    /// written here, overriding anything a handler set.
    pub fn to_bytes(&self, keep_alive: bool) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {}\r\n", self.status);
        let mut has_content_type = false;

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection") {
                continue;
            }
            has_content_type |= name.eq_ignore_ascii_case("content-type");
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        if !has_content_type {
            head.push_str("Content-Type: text/plain\r\n");
        }
        head.push_str(&format!(
            "Content-Length: {}\r\nServer: {}\r\nConnection: {}\r\n\r\n",
            self.body.len(),
            SERVER_NAME,
            if keep_alive { "keep-alive" } else { "close" }
        ));

        let mut bytes = head.into_bytes();
        if !self.head_only {
            bytes.extend_from_slice(&self.body);
        }
        bytes
    }
}

/// Minimal HTML page used when no error page is configured or readable.
pub fn builtin_error_body(status: StatusCode) -> String {
    let message = match status.0 {
        400 => "Invalid request.",
        403 => "Access denied.",
        404 => "Page not found.",
        405 => "Unsupported method.",
        413 => "Request is too big.",
        500 => "Server error.",
        _ => "Something went wrong.",
    };
    format!(
        "<html><head><title>{status}</title></head><body><h1>{status}</h1><p>{message}</p></body></html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_status_line_and_length() {
        let bytes = Response::new(StatusCode::OK)
            .with_body("text/html", "<p>hi</p>")
            .to_bytes(true);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\n<p>hi</p>"));
    }

    #[test]
    fn handler_supplied_connection_header_is_replaced() {
        let bytes = Response::new(StatusCode::NOT_FOUND)
            .header("Connection", "keep-alive")
            .to_bytes(false);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Connection: close\r\n"));
        assert!(!text.contains("keep-alive"));
    }

    #[test]
    fn head_response_keeps_length_but_drops_body() {
        let bytes = Response::new(StatusCode::OK)
            .with_body("text/html", "<p>hi</p>")
            .without_body()
            .to_bytes(true);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn builtin_body_names_the_status() {
        assert!(builtin_error_body(StatusCode::PAYLOAD_TOO_LARGE).contains("413 Payload Too Large"));
    }
}
