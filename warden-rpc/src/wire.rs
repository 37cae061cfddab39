//! HTTP/1.1 framing for one request per connection.
//!
//! Requests are [`http::Request`] values written as a plain head plus body.
//! Response heads are parsed with `httparse`; bodies are framed by
//! `Content-Length`, chunked encoding, or connection close, and never grow
//! past [`MAX_RESPONSE_BYTES`].

use std::io::{self, BufRead, BufReader, Read, Write};

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Version};

/// Largest response body accepted from a peer, whatever it announces.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;
const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_HEADERS: usize = 64;

/// A fully-read response.
pub type HttpResponse = Response<Vec<u8>>;

#[derive(Debug)]
pub(crate) enum ReadError {
    Io(io::Error),
    Malformed(String),
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        ReadError::Io(e)
    }
}

fn malformed(detail: impl std::fmt::Display) -> ReadError {
    ReadError::Malformed(detail.to_string())
}

fn too_large(what: &str, len: u64) -> ReadError {
    ReadError::Malformed(format!(
        "{what} of {len} bytes exceeds the {MAX_RESPONSE_BYTES} byte limit"
    ))
}

pub(crate) fn write_request<W: Write>(w: &mut W, request: &Request<Vec<u8>>) -> io::Result<()> {
    let target = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    let mut head = format!("{} {target} HTTP/1.1\r\n", request.method()).into_bytes();
    for (name, value) in request.headers() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    w.write_all(&head)?;
    w.write_all(request.body())?;
    w.flush()
}

pub(crate) fn read_response<R: Read>(r: &mut R) -> Result<HttpResponse, ReadError> {
    let mut reader = BufReader::new(r);
    let head = read_head(&mut reader)?;

    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut slots);
    if parsed.parse(&head).map_err(malformed)?.is_partial() {
        return Err(malformed("incomplete response head"));
    }
    let status = parsed
        .code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| malformed("missing status code"))?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };
    let mut headers = HeaderMap::with_capacity(parsed.headers.len());
    for h in parsed.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes()).map_err(malformed)?;
        let value = HeaderValue::from_bytes(h.value).map_err(malformed)?;
        headers.append(name, value);
    }

    let body = read_body(&mut reader, &headers)?;
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.version_mut() = version;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Everything up to and including the blank line that ends the head.
fn read_head<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, ReadError> {
    let mut head = Vec::new();
    loop {
        let room = (MAX_HEAD_BYTES + 1).saturating_sub(head.len()) as u64;
        let n = reader.by_ref().take(room).read_until(b'\n', &mut head)?;
        if head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n") {
            return Ok(head);
        }
        if head.len() > MAX_HEAD_BYTES {
            return Err(malformed("response head too large"));
        }
        if n == 0 {
            return Err(malformed(if head.is_empty() {
                "connection closed before response"
            } else {
                "connection closed inside response head"
            }));
        }
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers.get_all(TRANSFER_ENCODING).iter().any(|v| {
        v.to_str().is_ok_and(|s| {
            s.split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        })
    })
}

fn read_body<R: BufRead>(reader: &mut R, headers: &HeaderMap) -> Result<Vec<u8>, ReadError> {
    if is_chunked(headers) {
        return read_chunked(reader);
    }

    if let Some(value) = headers.get(CONTENT_LENGTH) {
        let len: u64 = value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| malformed(format!("bad content-length {value:?}")))?;
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= MAX_RESPONSE_BYTES)
            .ok_or_else(|| too_large("content-length", len))?;
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        return Ok(body);
    }

    let mut body = Vec::new();
    reader
        .take(MAX_RESPONSE_BYTES as u64 + 1)
        .read_to_end(&mut body)?;
    if body.len() > MAX_RESPONSE_BYTES {
        return Err(too_large("body", body.len() as u64));
    }
    Ok(body)
}

fn read_chunked<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, ReadError> {
    let mut body = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        reader
            .by_ref()
            .take(MAX_HEAD_BYTES as u64)
            .read_until(b'\n', &mut line)?;
        let size = match httparse::parse_chunk_size(&line) {
            Ok(httparse::Status::Complete((_, size))) => size,
            Ok(httparse::Status::Partial) => {
                return Err(malformed("connection closed inside chunked body"))
            }
            Err(_) => {
                return Err(malformed(format!(
                    "bad chunk size {:?}",
                    String::from_utf8_lossy(&line).trim_end()
                )))
            }
        };
        if size == 0 {
            return skip_trailers(reader).map(|()| body);
        }

        let end = usize::try_from(size)
            .ok()
            .and_then(|size| body.len().checked_add(size))
            .filter(|end| *end <= MAX_RESPONSE_BYTES)
            .ok_or_else(|| too_large("chunked body", size))?;
        let start = body.len();
        body.resize(end, 0);
        reader.read_exact(&mut body[start..])?;

        line.clear();
        reader.by_ref().take(2).read_until(b'\n', &mut line)?;
        if line != b"\r\n" && line != b"\n" {
            return Err(malformed("chunk not followed by CRLF"));
        }
    }
}

fn skip_trailers<R: BufRead>(reader: &mut R) -> Result<(), ReadError> {
    let mut seen = 0usize;
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .by_ref()
            .take(MAX_HEAD_BYTES as u64)
            .read_until(b'\n', &mut line)?;
        seen += n;
        if n == 0 || line == b"\r\n" || line == b"\n" {
            return Ok(());
        }
        if seen > MAX_HEAD_BYTES {
            return Err(malformed("chunked trailers too large"));
        }
    }
}
