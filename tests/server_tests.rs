use localserver::config::parse_config_str;
use localserver::{Server, StaticFileHandler};
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;

struct Running {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    _site: TempDir,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn start() -> Running {
    let site = tempfile::tempdir().unwrap();
    let root = site.path().to_str().unwrap().to_string();
    fs::write(site.path().join("index.html"), "<h1>home</h1>").unwrap();
    fs::write(site.path().join("missing.html"), "custom not found").unwrap();
    fs::create_dir(site.path().join("files")).unwrap();
    fs::write(site.path().join("files/a.txt"), "alpha").unwrap();

    let port = free_port();
    let text = format!(
        "server {{
            listen {port};
            host 127.0.0.1;
            client_max_body_size 16;
            root {root};
            error_page 404 {root}/missing.html;
            location / {{ index index.html; allowed_methods GET HEAD; }}
            location /files/ {{ root {root}/files; allowed_methods GET POST DELETE; autoindex on; }}
        }}"
    );
    let cfg = parse_config_str(&text).unwrap();

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut server = Server::new(cfg, StaticFileHandler, Arc::clone(&shutdown)).unwrap();
    server.bind().unwrap();
    let addr = server.local_addrs()[0];
    let handle = thread::spawn(move || server.run());

    Running {
        addr,
        shutdown,
        handle: Some(handle),
        _site: site,
    }
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// Reads exactly one response: the head as text and a body of Content-Length bytes.
fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).unwrap();
        assert!(n > 0, "connection closed before headers completed");
        raw.push(byte[0]);
    }
    let head = String::from_utf8(raw).unwrap();

    let length = head
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .map(|v| v.trim().parse::<usize>().unwrap())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).unwrap();
    (head, body)
}

fn status_line(head: &str) -> &str {
    head.lines().next().unwrap()
}

fn assert_closed(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    let n = stream.read_to_end(&mut rest).unwrap();
    assert_eq!(n, 0);
}

#[test]
fn test_get_index_and_keep_alive() {
    let server = start();
    let mut stream = connect(server.addr);

    stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 200 OK");
    assert!(head.contains("Connection: keep-alive"));
    assert_eq!(body, b"<h1>home</h1>");

    // same socket, second request
    stream.write_all(b"GET /files/a.txt HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 200 OK");
    assert_eq!(body, b"alpha");
}

#[test]
fn test_head_carries_length_of_the_resource() {
    let server = start();
    let mut stream = connect(server.addr);

    stream.write_all(b"HEAD / HTTP/1.1\r\n\r\n").unwrap();
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        assert_eq!(stream.read(&mut byte).unwrap(), 1);
        raw.push(byte[0]);
    }
    let head = String::from_utf8(raw).unwrap();
    assert_eq!(status_line(&head), "HTTP/1.1 200 OK");
    assert!(head.contains("Content-Length: 13\r\n"));

    // no body bytes precede the next response
    stream.write_all(b"GET /files/a.txt HTTP/1.1\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 200 OK");
    assert_eq!(body, b"alpha");
}

#[test]
fn test_pipelined_requests_are_answered_in_order() {
    let server = start();
    let mut stream = connect(server.addr);

    stream
        .write_all(b"GET /files/a.txt HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\n\r\n")
        .unwrap();
    let (_, first) = read_response(&mut stream);
    let (_, second) = read_response(&mut stream);
    assert_eq!(first, b"alpha");
    assert_eq!(second, b"<h1>home</h1>");
}

#[test]
fn test_connection_close_is_honoured() {
    let server = start();
    let mut stream = connect(server.addr);

    stream.write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
    let (head, _) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 200 OK");
    assert!(head.contains("Connection: close"));
    assert_closed(&mut stream);
}

#[test]
fn test_unmatched_path_uses_custom_error_page() {
    let server = start();
    let mut stream = connect(server.addr);

    stream.write_all(b"GET /nowhere HTTP/1.1\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 404 Not Found");
    assert_eq!(body, b"custom not found");
    assert_closed(&mut stream);
}

#[test]
fn test_disallowed_method_is_405() {
    let server = start();
    let mut stream = connect(server.addr);

    stream.write_all(b"DELETE / HTTP/1.1\r\n\r\n").unwrap();
    let (head, _) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 405 Method Not Allowed");
    assert!(head.contains("Connection: close"));
}

#[test]
fn test_oversized_body_is_413() {
    let server = start();
    let mut stream = connect(server.addr);

    stream
        .write_all(b"POST /files/big.txt HTTP/1.1\r\nContent-Length: 1000\r\n\r\n")
        .unwrap();
    let (head, _) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 413 Payload Too Large");
}

#[test]
fn test_upload_then_fetch_then_delete() {
    let server = start();
    let mut stream = connect(server.addr);

    stream
        .write_all(b"POST /files/note.txt HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
        .unwrap();
    let (head, _) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 201 Created");

    stream.write_all(b"GET /files/note.txt HTTP/1.1\r\n\r\n").unwrap();
    let (_, body) = read_response(&mut stream);
    assert_eq!(body, b"hello");

    stream.write_all(b"DELETE /files/note.txt HTTP/1.1\r\n\r\n").unwrap();
    let (head, _) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 200 OK");
}

#[test]
fn test_body_split_across_writes() {
    let server = start();
    let mut stream = connect(server.addr);

    stream
        .write_all(b"POST /files/split.txt HTTP/1.1\r\nContent-Length: 6\r\n\r\nabc")
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"def").unwrap();
    let (head, _) = read_response(&mut stream);
    assert_eq!(status_line(&head), "HTTP/1.1 201 Created");

    stream.write_all(b"GET /files/split.txt HTTP/1.1\r\n\r\n").unwrap();
    let (_, body) = read_response(&mut stream);
    assert_eq!(body, b"abcdef");
}

#[test]
fn test_shutdown_flag_stops_the_loop() {
    let mut server = start();
    server.shutdown.store(true, Ordering::Relaxed);
    let handle = server.handle.take().unwrap();
    // the loop checks the flag at least once per poll timeout
    handle.join().unwrap();
}

#[test]
fn test_stalled_client_keeps_its_slot_without_blocking_others() {
    let server = start();

    // header section never terminated: there is no idle timeout to evict it
    let mut stalled = connect(server.addr);
    stalled.write_all(b"GET / HTTP/1.1\r\nHost: local").unwrap();

    let mut other = connect(server.addr);
    other.write_all(b"GET /files/a.txt HTTP/1.1\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut other);
    assert_eq!(status_line(&head), "HTTP/1.1 200 OK");
    assert_eq!(body, b"alpha");

    stalled.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    let mut byte = [0u8; 1];
    let err = stalled.read(&mut byte).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));

    // the same connection is still served once the headers complete
    stalled.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stalled.write_all(b"host\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stalled);
    assert_eq!(status_line(&head), "HTTP/1.1 200 OK");
    assert_eq!(body, b"<h1>home</h1>");
}
