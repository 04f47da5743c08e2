use crate::config::{LocationConfig, Method};
use crate::handlers::{HandlerError, RequestHandler};
use crate::http::request::MultipartForm;
use crate::http::{HttpRequest, Response, StatusCode};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Default handler: files under the location root, uploads and deletes.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticFileHandler;

impl RequestHandler for StaticFileHandler {
    fn handle(&self, request: &HttpRequest, location: &LocationConfig) -> Result<Response, HandlerError> {
        if let Some(redirect) = &location.redirect {
            return Ok(Response::new(StatusCode(redirect.code)).header("Location", &redirect.url));
        }

        let method: Method = request.method.parse().map_err(|_| HandlerError::MethodNotAllowed)?;
        let target = resolve_target(location, &request.path)?;

        match method {
            Method::Get => serve(&target, location),
            Method::Head => serve(&target, location).map(Response::without_body),
            Method::Post | Method::Put => store(request, location, &target),
            Method::Delete => remove(&target),
        }
    }
}

/// Maps the request path below the location prefix onto the location root.
fn resolve_target(location: &LocationConfig, path: &str) -> Result<PathBuf, HandlerError> {
    let relative = path.strip_prefix(location.name.as_str()).unwrap_or(path);
    let relative = Path::new(relative.trim_start_matches('/'));

    if relative.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(HandlerError::Forbidden);
    }
    Ok(Path::new(&location.root).join(relative))
}

fn serve(target: &Path, location: &LocationConfig) -> Result<Response, HandlerError> {
    let mut file_path = target.to_path_buf();

    if file_path.is_dir() {
        if let Some(index) = &location.index {
            file_path.push(index);
        } else if location.autoindex {
            let listing = list_directory(&file_path)?;
            return Ok(Response::new(StatusCode::OK).with_body("text/plain", listing));
        } else {
            return Err(HandlerError::Forbidden);
        }
    }

    let content = fs::read(&file_path).map_err(map_io)?;
    debug!(path = %file_path.display(), bytes = content.len(), "serving file");

    Ok(Response::new(StatusCode::OK).with_body(mime_type(&file_path), content))
}

/// One entry per line, directories suffixed with `/`.
fn list_directory(dir: &Path) -> Result<String, HandlerError> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(map_io)?
        .filter_map(Result::ok)
        .map(|entry| {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                name.push('/');
            }
            name
        })
        .collect();
    names.sort();

    let mut listing = names.join("\n");
    listing.push('\n');
    Ok(listing)
}

fn store(request: &HttpRequest, location: &LocationConfig, target: &Path) -> Result<Response, HandlerError> {
    let upload_dir = match &location.upload_path {
        Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
        Some(p) => Path::new(&location.root).join(p),
        None => target.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(&location.root)),
    };
    fs::create_dir_all(&upload_dir).map_err(map_io)?;

    if let Some(form) = request.multipart() {
        let saved = store_multipart(form, &upload_dir)?;
        info!(files = saved, dir = %upload_dir.display(), "multipart upload stored");
    } else {
        if request.body.is_empty() {
            return Err(HandlerError::BadRequest);
        }
        let file_name = target
            .file_name()
            .filter(|_| !request.path.ends_with('/'))
            .ok_or(HandlerError::BadRequest)?;
        let dest = upload_dir.join(file_name);
        fs::write(&dest, &request.body).map_err(map_io)?;
        info!(dest = %dest.display(), bytes = request.body.len(), "raw upload stored");
    }

    Ok(Response::new(StatusCode::CREATED)
        .with_body("text/html", "<html><body><h1>201 Created</h1><p>File created.</p></body></html>"))
}

fn store_multipart(form: MultipartForm, upload_dir: &Path) -> Result<usize, HandlerError> {
    if form.files.is_empty() {
        return Err(HandlerError::BadRequest);
    }

    for file in &form.files {
        let safe_name = Path::new(&file.file_name)
            .file_name()
            .ok_or(HandlerError::BadRequest)?;
        fs::write(upload_dir.join(safe_name), &file.data).map_err(map_io)?;
    }
    Ok(form.files.len())
}

fn remove(target: &Path) -> Result<Response, HandlerError> {
    let meta = fs::metadata(target).map_err(map_io)?;
    if meta.is_dir() {
        return Err(HandlerError::Forbidden);
    }
    fs::remove_file(target).map_err(map_io)?;
    info!(path = %target.display(), "file deleted");

    Ok(Response::new(StatusCode::OK)
        .with_body("text/html", "<html><body><h1>200 OK</h1><p>File deleted.</p></body></html>"))
}

fn map_io(e: io::Error) -> HandlerError {
    match e.kind() {
        io::ErrorKind::NotFound => HandlerError::NotFound,
        io::ErrorKind::PermissionDenied => HandlerError::Forbidden,
        _ => HandlerError::Internal,
    }
}

fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("svg") => "image/svg+xml",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(method: &str, path: &str, body: &[u8]) -> HttpRequest {
        HttpRequest {
            method: method.to_string(),
            uri: path.to_string(),
            path: path.to_string(),
            query: String::new(),
            headers: HashMap::new(),
            body: body.to_vec(),
        }
    }

    fn location(name: &str, root: &Path) -> LocationConfig {
        let mut loc = LocationConfig::new(name);
        loc.root = root.to_string_lossy().into_owned();
        loc
    }

    #[test]
    fn serves_index_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        let mut loc = location("/", dir.path());
        loc.index = Some("index.html".to_string());

        let resp = StaticFileHandler.handle(&request("GET", "/", b""), &loc).unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, b"<h1>home</h1>");
    }

    #[test]
    fn head_reports_file_length_without_sending_it() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("page.html"), "<h1>home</h1>").unwrap();
        let loc = location("/", dir.path());

        let resp = StaticFileHandler.handle(&request("HEAD", "/page.html", b""), &loc).unwrap();
        assert!(resp.head_only);
        let text = String::from_utf8(resp.to_bytes(true)).unwrap();
        assert!(text.contains("Content-Length: 13\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn directory_without_index_or_autoindex_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let loc = location("/", dir.path());
        let err = StaticFileHandler.handle(&request("GET", "/", b""), &loc).unwrap_err();
        assert_eq!(err, HandlerError::Forbidden);
    }

    #[test]
    fn autoindex_lists_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        let mut loc = location("/files/", dir.path());
        loc.autoindex = true;

        let resp = StaticFileHandler.handle(&request("GET", "/files/", b""), &loc).unwrap();
        assert_eq!(resp.body, b"a/\nb.txt\n");
    }

    #[test]
    fn parent_segments_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let loc = location("/", dir.path());
        let err = StaticFileHandler.handle(&request("GET", "/../etc/passwd", b""), &loc).unwrap_err();
        assert_eq!(err, HandlerError::Forbidden);
    }

    #[test]
    fn post_then_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let loc = location("/uploads/", dir.path());

        let resp = StaticFileHandler.handle(&request("POST", "/uploads/note.txt", b"data"), &loc).unwrap();
        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(fs::read(dir.path().join("note.txt")).unwrap(), b"data");

        let resp = StaticFileHandler.handle(&request("DELETE", "/uploads/note.txt", b""), &loc).unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert!(!dir.path().join("note.txt").exists());

        let err = StaticFileHandler.handle(&request("DELETE", "/uploads/note.txt", b""), &loc).unwrap_err();
        assert_eq!(err, HandlerError::NotFound);
    }

    #[test]
    fn redirect_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let mut loc = location("/old/", dir.path());
        loc.redirect = Some(crate::config::Redirect { code: 301, url: "/new/".to_string() });

        let resp = StaticFileHandler.handle(&request("GET", "/old/x", b""), &loc).unwrap();
        assert_eq!(resp.status, StatusCode(301));
        assert!(resp.headers.contains(&("Location".to_string(), "/new/".to_string())));
    }
}
