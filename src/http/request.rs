use std::collections::HashMap;

/// A complete request as handed to a `RequestHandler`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub path: String,
    pub query: String,
    /// Keys are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// One `filename=` part of a `multipart/form-data` body.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MultipartForm {
    pub files: Vec<UploadedFile>,
}

impl HttpRequest {
    /// Parses a header section (terminator included) and its body.
    ///
    /// Returns `None` when the request line is unusable.
    pub fn parse(header_bytes: &[u8], body: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(header_bytes).ok()?;
        let mut lines = text.split("\r\n");

        let (method, uri) = match lines.next()?.split_whitespace().collect::<Vec<_>>()[..] {
            [method, uri, version] if version.starts_with("HTTP/") && uri.starts_with('/') => {
                (method.to_string(), uri.to_string())
            }
            _ => return None,
        };

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        let (path, query) = uri.split_once('?').unwrap_or((uri.as_str(), ""));
        let (path, query) = (path.to_string(), query.to_string());

        Some(Self {
            method,
            uri,
            path,
            query,
            headers,
            body: body.to_vec(),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Offset just past the `\r\n\r\n` terminator, if present.
    pub fn find_header_end(buf: &[u8]) -> Option<usize> {
        find_bytes(buf, b"\r\n\r\n", 0).map(|pos| pos + 4)
    }

    /// Raw value of the first header named `name` (case-insensitive name).
    pub fn raw_header_value<'a>(header_bytes: &'a [u8], name: &str) -> Option<&'a str> {
        let text = std::str::from_utf8(header_bytes).ok()?;
        text.split("\r\n")
            .skip(1)
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
    }

    /// File parts of a `multipart/form-data` body; `None` for any other
    /// content type.
    pub fn multipart(&self) -> Option<MultipartForm> {
        let content_type = self.header("content-type")?;
        if !content_type.starts_with("multipart/form-data") {
            return None;
        }
        let boundary = content_type.split_once("boundary=")?.1.trim().trim_matches('"');
        let delimiter = format!("--{boundary}").into_bytes();

        let mut form = MultipartForm::default();
        let mut cursor = find_bytes(&self.body, &delimiter, 0);
        while let Some(start) = cursor {
            let part_start = start + delimiter.len();
            let Some(next) = find_bytes(&self.body, &delimiter, part_start) else {
                break;
            };
            form.files.extend(file_part(&self.body[part_start..next]));
            cursor = Some(next);
        }
        Some(form)
    }
}

/// Part headers, a blank line, then content; parts without a filename are skipped.
fn file_part(part: &[u8]) -> Option<UploadedFile> {
    let part = part.strip_prefix(b"\r\n").unwrap_or(part);
    let split = HttpRequest::find_header_end(part)?;
    let headers = std::str::from_utf8(&part[..split]).ok()?;
    let content = &part[split..];

    let file_name = headers
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-disposition"))
        .and_then(|(_, value)| value.split_once("filename=\""))
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(name, _)| name)
        .filter(|name| !name.is_empty())?;

    Some(UploadedFile {
        file_name: file_name.to_string(),
        data: content.strip_suffix(b"\r\n").unwrap_or(content).to_vec(),
    })
}

fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
