//! HTTP/1.1 transport.
//!
//! The request line and headers are written exactly as supplied: the
//! caller's casing, the caller's order, no canonicalization. Connection
//! reuse follows the profile's keep-alive policy rather than a generic
//! pool heuristic, because reuse cadence is observable.

use bytes::{Buf, Bytes, BytesMut};
use http::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::profile::KeepAlivePolicy;
use crate::tls::MaybeTlsStream;

/// Maximum response header block (64 KiB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum header count handed to httparse.
const MAX_HEADERS_COUNT: usize = 100;

/// One HTTP/1.1 connection.
pub struct H1Connection {
    stream: MaybeTlsStream,
    policy: KeepAlivePolicy,
    requests_served: u32,
    should_close: bool,
}

impl H1Connection {
    pub fn new(stream: MaybeTlsStream, policy: KeepAlivePolicy) -> Self {
        Self {
            stream,
            policy,
            requests_served: 0,
            should_close: false,
        }
    }

    /// True when the keep-alive policy allows another request.
    pub fn is_reusable(&self) -> bool {
        !self.should_close && self.requests_served < self.policy.max_requests
    }

    pub fn requests_served(&self) -> u32 {
        self.requests_served
    }

    /// Send one request and read the response. Returns
    /// `(status, headers, body)`.
    pub async fn send_request(
        &mut self,
        method: &Method,
        host: &str,
        path_and_query: &str,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<(u16, Vec<(String, String)>, Bytes)> {
        self.requests_served += 1;
        if self.requests_served >= self.policy.max_requests {
            self.should_close = true;
        }

        let request = self.build_request(method, host, path_and_query, headers, body);
        self.stream
            .write_all(&request)
            .await
            .map_err(|e| Error::http_protocol(format!("request write: {}", e)))?;
        if let Some(body) = body {
            self.stream
                .write_all(body)
                .await
                .map_err(|e| Error::http_protocol(format!("body write: {}", e)))?;
        }
        self.stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("flush: {}", e)))?;

        self.read_response(method).await
    }

    fn build_request(
        &mut self,
        method: &Method,
        host: &str,
        path_and_query: &str,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(1024);
        out.extend_from_slice(method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(path_and_query.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");

        let has_host = headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("host"));
        if !has_host {
            out.extend_from_slice(b"Host: ");
            out.extend_from_slice(host.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        let mut has_connection = false;
        let mut has_content_length = false;
        let mut has_transfer_encoding = false;
        for (name, value) in headers {
            if name.eq_ignore_ascii_case("connection") {
                has_connection = true;
                if value.eq_ignore_ascii_case("close") {
                    self.should_close = true;
                }
            }
            has_content_length |= name.eq_ignore_ascii_case("content-length");
            has_transfer_encoding |= name.eq_ignore_ascii_case("transfer-encoding");
            // Caller casing and order go to the wire untouched.
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        if !has_connection && self.policy.explicit_header {
            out.extend_from_slice(b"Connection: keep-alive\r\n");
        }

        if let Some(body) = body {
            // RFC 9112: Content-Length is forbidden alongside
            // Transfer-Encoding.
            if !has_content_length && !has_transfer_encoding {
                out.extend_from_slice(b"Content-Length: ");
                out.extend_from_slice(body.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }

        out.extend_from_slice(b"\r\n");
        out
    }

    async fn read_response(&mut self, method: &Method) -> Result<(u16, Vec<(String, String)>, Bytes)> {
        let mut buffer = BytesMut::with_capacity(8192);

        loop {
            let header_end = loop {
                if let Some(end) = find_header_end(&buffer) {
                    break end;
                }
                if buffer.len() >= MAX_HEADERS_SIZE {
                    return Err(Error::http_protocol("response headers too large"));
                }
                self.fill(&mut buffer).await?;
            };

            let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
            let mut parsed = httparse::Response::new(&mut header_storage);
            parsed
                .parse(&buffer[..header_end])
                .map_err(|e| Error::http_protocol(format!("response parse: {}", e)))?;

            let status = parsed
                .code
                .ok_or_else(|| Error::http_protocol("missing status code"))?;

            // 1xx interim responses are consumed and skipped (RFC 9112 §6).
            if (100..200).contains(&status) && status != 101 {
                buffer.advance(header_end);
                continue;
            }

            let headers: Vec<(String, String)> = parsed
                .headers
                .iter()
                .map(|h| {
                    (
                        h.name.to_string(),
                        String::from_utf8_lossy(h.value).into_owned(),
                    )
                })
                .collect();
            buffer.advance(header_end);

            if header_value(&headers, "connection")
                .map(|v| v.eq_ignore_ascii_case("close"))
                .unwrap_or(false)
            {
                self.should_close = true;
            }

            let body = self.read_body(method, status, &headers, buffer).await?;
            return Ok((status, headers, body));
        }
    }

    async fn read_body(
        &mut self,
        method: &Method,
        status: u16,
        headers: &[(String, String)],
        mut buffered: BytesMut,
    ) -> Result<Bytes> {
        // No body: HEAD responses and 1xx/204/304 (RFC 9110 §6.4.1).
        if method == Method::HEAD || status == 204 || status == 304 {
            return Ok(Bytes::new());
        }

        let chunked = header_value(headers, "transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);

        if chunked {
            return self.read_chunked_body(buffered).await;
        }

        if let Some(len) = header_value(headers, "content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            while buffered.len() < len {
                if self.fill(&mut buffered).await.is_err() {
                    self.should_close = true;
                    return Err(Error::TruncatedBody {
                        received: buffered.len(),
                    });
                }
            }
            return Ok(buffered.split_to(len).freeze());
        }

        // No framing: body runs to connection close.
        self.should_close = true;
        loop {
            match self.fill(&mut buffered).await {
                Ok(()) => {}
                Err(Error::Connection(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(buffered.freeze())
    }

    async fn read_chunked_body(&mut self, mut buffered: BytesMut) -> Result<Bytes> {
        let mut body = BytesMut::new();
        loop {
            // Read the chunk-size line.
            let line_end = loop {
                if let Some(pos) = find_crlf(&buffered) {
                    break pos;
                }
                self.fill(&mut buffered).await?;
            };
            let size_line = String::from_utf8_lossy(&buffered[..line_end]).into_owned();
            buffered.advance(line_end + 2);
            let size = usize::from_str_radix(
                size_line.split(';').next().unwrap_or("").trim(),
                16,
            )
            .map_err(|_| Error::http_protocol(format!("bad chunk size: {:?}", size_line)))?;

            if size == 0 {
                // Consume the trailer section up to the final CRLF.
                loop {
                    if let Some(pos) = find_crlf(&buffered) {
                        buffered.advance(pos + 2);
                        if pos == 0 {
                            return Ok(body.freeze());
                        }
                    } else {
                        self.fill(&mut buffered).await?;
                    }
                }
            }

            while buffered.len() < size + 2 {
                self.fill(&mut buffered).await?;
            }
            body.extend_from_slice(&buffered[..size]);
            buffered.advance(size + 2);
        }
    }

    async fn fill(&mut self, buffer: &mut BytesMut) -> Result<()> {
        let mut chunk = [0u8; 8192];
        let n = self
            .stream
            .read(&mut chunk)
            .await
            .map_err(|e| Error::connection(format!("read: {}", e)))?;
        if n == 0 {
            return Err(Error::connection("connection closed by peer"));
        }
        buffer.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
