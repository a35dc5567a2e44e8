// Just enough HTTP/1.0 for one form
//
// Requests are parsed out of a single receive buffer; the server keeps
// reading until `parse` stops returning `Incomplete`. Responses always
// close the connection.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write};

const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    /// Need more bytes.
    Incomplete,
    Malformed,
    /// Headers plus body do not fit the receive buffer.
    TooLarge,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "incomplete request"),
            Self::Malformed => write!(f, "malformed request"),
            Self::TooLarge => write!(f, "request too large"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub body: &'a [u8],
}

/// Parse a request held in `buf`, whose capacity is `cap`.
pub fn parse(buf: &[u8], cap: usize) -> Result<Request<'_>, HttpError> {
    let Some(head_len) = find(buf, HEADER_END) else {
        return Err(if buf.len() >= cap {
            HttpError::TooLarge
        } else {
            HttpError::Incomplete
        });
    };
    let head = core::str::from_utf8(&buf[..head_len]).map_err(|_| HttpError::Malformed)?;
    let mut lines = head.split("\r\n");

    let mut parts = lines.next().unwrap_or("").split(' ');
    let method = match parts.next() {
        Some("GET") => Method::Get,
        Some("POST") => Method::Post,
        Some(m) if !m.is_empty() => Method::Other,
        _ => return Err(HttpError::Malformed),
    };
    let target = parts.next().ok_or(HttpError::Malformed)?;
    // query strings are not used by any route
    let path = target.split('?').next().unwrap_or(target);

    let mut content_length = 0usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            content_length = value.trim().parse().map_err(|_| HttpError::Malformed)?;
        }
    }

    let body_start = head_len + HEADER_END.len();
    let body_end = match body_start.checked_add(content_length) {
        Some(end) if end <= cap => end,
        _ => return Err(HttpError::TooLarge),
    };
    if buf.len() < body_end {
        return Err(HttpError::Incomplete);
    }

    Ok(Request {
        method,
        path,
        body: &buf[body_start..body_end],
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
}

impl Status {
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub body: String,
}

impl Response {
    pub fn html(status: Status, body: String) -> Self {
        Self { status, body }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut head = String::with_capacity(128);
        // writing into a String cannot fail
        let _ = write!(
            head,
            "HTTP/1.0 {} {}\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n",
            self.status.code(),
            self.status.reason(),
            self.body.len()
        );
        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}
