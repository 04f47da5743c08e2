use crate::handlers::HandlerError;
use crate::http::HttpRequest;
use mio::net::TcpStream;
use std::net::SocketAddr;

/// Header sections larger than this are a protocol violation.
pub const MAX_HEADER_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    ReadingHeaders,
    ReadingBody,
    ReadyToRespond,
    WritingResponse,
    Closing,
}

/// One request/response cycle at a time, independent of the socket.
///
/// The engine feeds received bytes in and drains response bytes out; every
/// transition of the connection state machine happens here.
#[derive(Debug)]
pub struct Exchange {
    state: ConnectionState,
    body_limit: usize,
    read_buffer: Vec<u8>,
    header_len: usize,
    has_content_length: bool,
    expected_content_length: usize,
    keep_alive: bool,
    has_cookie: bool,
    rejection: Option<HandlerError>,
    write_buffer: Vec<u8>,
    bytes_written: usize,
}

impl Exchange {
    pub fn new(body_limit: usize) -> Self {
        Self {
            state: ConnectionState::ReadingHeaders,
            body_limit,
            read_buffer: Vec::with_capacity(8192),
            header_len: 0,
            has_content_length: false,
            expected_content_length: 0,
            keep_alive: true,
            has_cookie: false,
            rejection: None,
            write_buffer: Vec::new(),
            bytes_written: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn has_cookie(&self) -> bool {
        self.has_cookie
    }

    #[cfg(test)]
    fn expected_content_length(&self) -> Option<usize> {
        self.has_content_length.then_some(self.expected_content_length)
    }

    pub fn is_reading(&self) -> bool {
        matches!(self.state, ConnectionState::ReadingHeaders | ConnectionState::ReadingBody)
    }

    /// Appends received bytes and advances the parse.
    pub fn receive(&mut self, data: &[u8]) {
        if self.state == ConnectionState::Closing {
            return;
        }
        self.read_buffer.extend_from_slice(data);
        self.advance();
    }

    fn advance(&mut self) {
        if self.state == ConnectionState::ReadingHeaders {
            let Some(header_len) = HttpRequest::find_header_end(&self.read_buffer) else {
                if self.read_buffer.len() > MAX_HEADER_SIZE {
                    self.state = ConnectionState::Closing;
                }
                return;
            };
            if header_len > MAX_HEADER_SIZE {
                self.state = ConnectionState::Closing;
                return;
            }
            self.on_headers(header_len);
        }

        if self.state == ConnectionState::ReadingBody
            && self.read_buffer.len() - self.header_len >= self.expected_content_length
        {
            self.state = ConnectionState::ReadyToRespond;
        }
    }

    fn on_headers(&mut self, header_len: usize) {
        let headers = &self.read_buffer[..header_len];
        self.header_len = header_len;

        // Value match is case-sensitive: only the two spellings below keep the
        // connection open once the header is present.
        self.keep_alive = match HttpRequest::raw_header_value(headers, "Connection") {
            None => true,
            Some(value) => value == "keep-alive" || value == "Keep-Alive",
        };
        self.has_cookie = HttpRequest::raw_header_value(headers, "Cookie").is_some();

        match HttpRequest::raw_header_value(headers, "Content-Length").map(str::parse::<usize>) {
            None => {
                self.state = ConnectionState::ReadyToRespond;
            }
            Some(Err(_)) => {
                self.rejection = Some(HandlerError::BadRequest);
                self.state = ConnectionState::ReadyToRespond;
            }
            Some(Ok(len)) if len > self.body_limit => {
                self.has_content_length = true;
                self.expected_content_length = len;
                self.rejection = Some(HandlerError::PayloadTooLarge);
                self.state = ConnectionState::ReadyToRespond;
            }
            Some(Ok(len)) => {
                self.has_content_length = true;
                self.expected_content_length = len;
                self.state = ConnectionState::ReadingBody;
            }
        }
    }

    /// The complete request, or the reason it was refused while reading.
    pub fn request(&self) -> Result<HttpRequest, HandlerError> {
        if let Some(rejection) = self.rejection {
            return Err(rejection);
        }
        let body_end = self.header_len + self.body_len();
        HttpRequest::parse(&self.read_buffer[..self.header_len], &self.read_buffer[self.header_len..body_end])
            .ok_or(HandlerError::BadRequest)
    }

    fn body_len(&self) -> usize {
        if self.rejection.is_some() || !self.has_content_length {
            0
        } else {
            self.expected_content_length
        }
    }

    /// Installs the serialized response. `keep_alive` may only lower the flag
    /// computed from the request headers.
    pub fn set_response(&mut self, bytes: Vec<u8>, keep_alive: bool) {
        self.write_buffer = bytes;
        self.bytes_written = 0;
        self.keep_alive &= keep_alive;
        self.state = ConnectionState::WritingResponse;
    }

    pub fn pending_output(&self) -> &[u8] {
        &self.write_buffer[self.bytes_written.min(self.write_buffer.len())..]
    }

    /// Accounts for `n` bytes accepted by the socket.
    pub fn record_written(&mut self, n: usize) {
        if n == 0 {
            self.state = ConnectionState::Closing;
            return;
        }
        self.bytes_written += n;
        if self.bytes_written < self.write_buffer.len() {
            return;
        }

        if self.keep_alive {
            self.reset_for_next_request();
        } else {
            self.state = ConnectionState::Closing;
        }
    }

    /// Drops the finished request, keeping any pipelined bytes behind it.
    fn reset_for_next_request(&mut self) {
        let consumed = (self.header_len + self.body_len()).min(self.read_buffer.len());
        self.read_buffer.drain(..consumed);
        self.write_buffer.clear();
        self.bytes_written = 0;
        self.header_len = 0;
        self.has_content_length = false;
        self.expected_content_length = 0;
        self.keep_alive = true;
        self.has_cookie = false;
        self.rejection = None;
        self.state = ConnectionState::ReadingHeaders;

        if !self.read_buffer.is_empty() {
            self.advance();
        }
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closing;
    }
}

pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub server_idx: usize,
    pub port: u16,
    pub exchange: Exchange,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, server_idx: usize, port: u16, body_limit: usize) -> Self {
        Self {
            stream,
            peer,
            server_idx,
            port,
            exchange: Exchange::new(body_limit),
        }
    }
}
