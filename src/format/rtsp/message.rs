//! RTSP request and response messages.
//!
//! Requests are written as `METHOD uri RTSP/1.0` followed by `CSeq`, an
//! optional `User-Agent` and the method headers. Responses are read from a
//! buffered stream so bytes past the message stay available to the
//! interleaved data reader.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{RTSPError, RTSPMethod};
use crate::{ClientError, Result};

/// Largest accepted status line plus headers
pub const MAX_RESPONSE_HEADERS_SIZE: usize = 8 * 1024;
/// Largest accepted response body
pub const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;

/// Header fields in arrival order.
///
/// Names are stored upper-cased, so lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Parses `Name: value` lines. Lines without a colon are skipped.
    pub fn parse<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            lines
                .into_iter()
                .filter_map(|line| line.split_once(':'))
                .map(|(name, value)| (name.trim().to_ascii_uppercase(), value.trim().to_string()))
                .collect(),
        )
    }

    /// First value of `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no field was present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An outgoing RTSP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTSPRequest {
    /// Request method
    pub method: RTSPMethod,
    /// Request URI
    pub uri: String,
    /// Sequence number
    pub cseq: u32,
    /// `User-Agent` value, omitted when empty
    pub user_agent: String,
    /// Method headers, written in order
    pub headers: Vec<(String, String)>,
}

impl RTSPRequest {
    /// Appends a header
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Replaces a header, adding it if absent
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    /// Serialized request, ending with the empty line
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(512);
        buf.put_slice(self.to_string().as_bytes());
        buf.freeze()
    }
}

impl fmt::Display for RTSPRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} RTSP/1.0\r\n", self.method, self.uri)?;
        write!(f, "CSeq: {}\r\n", self.cseq)?;
        if !self.user_agent.is_empty() {
            write!(f, "User-Agent: {}\r\n", self.user_agent)?;
        }
        for (name, value) in &self.headers {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        f.write_str("\r\n")
    }
}

/// A parsed RTSP (or tunnel HTTP) response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTSPResponse {
    /// Protocol version from the status line, such as `1.0`
    pub version: String,
    /// Status code
    pub status_code: u16,
    /// Reason phrase, possibly empty
    pub reason: String,
    /// Echoed sequence number, 0 when absent
    pub cseq: u32,
    /// Header fields
    pub headers: Headers,
    /// Body of `Content-Length` bytes
    pub body: Bytes,
}

impl RTSPResponse {
    /// Parses the status line and headers.
    pub fn parse_head<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut lines = lines.into_iter();
        let status_line = lines
            .next()
            .ok_or_else(|| RTSPError::BadResponse("empty response".into()))?;

        let mut tokens = status_line.trim().splitn(3, ' ');
        let protocol = tokens.next().unwrap_or_default();
        let code = tokens
            .next()
            .ok_or_else(|| RTSPError::BadResponse(format!("missing status code: {}", status_line)))?;
        let reason = tokens.next().unwrap_or_default().trim().to_string();

        let version = match protocol.split_once('/') {
            Some((_, version)) if is_version(version) => version.to_string(),
            _ => {
                return Err(RTSPError::BadResponse(format!(
                    "invalid protocol name/version: {}",
                    protocol
                ))
                .into())
            }
        };
        let status_code = code
            .parse::<u16>()
            .map_err(|_| RTSPError::BadResponse(format!("invalid status code: {}", code)))?;

        let headers = Headers::parse(lines);
        let cseq = headers
            .get("CSeq")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            version,
            status_code,
            reason,
            cseq,
            headers,
            body: Bytes::new(),
        })
    }

    /// Value of a header, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// True for `200 OK`
    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }

    /// Fails with [`ClientError::BadStatus`] unless the status is 200
    pub fn ensure_ok(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(ClientError::BadStatus {
                code: self.status_code,
                reason: self.reason,
            })
        }
    }

    /// Declared body length
    pub fn content_length(&self) -> Result<usize> {
        match self.header("Content-Length") {
            None => Ok(0),
            Some(value) => value.parse().map_err(|_| {
                RTSPError::BadResponse(format!("invalid content-length header: {}", value)).into()
            }),
        }
    }
}

fn is_version(version: &str) -> bool {
    match version.split_once('.') {
        Some((major, minor)) => {
            major.parse::<u8>().is_ok() && minor.trim().parse::<u8>().is_ok()
        }
        None => false,
    }
}

/// Reads the status line and headers of the next message.
///
/// Lines before one starting with `protocol` are skipped, which discards
/// stray interleaved data. Returns the lines without terminators.
pub async fn read_head<R>(reader: &mut R, protocol: &str) -> Result<Vec<String>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut lines = Vec::new();
    let mut line = Vec::with_capacity(256);
    let mut total = 0;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "end of RTSP stream",
            )));
        }

        total += read;
        if total > MAX_RESPONSE_HEADERS_SIZE {
            return Err(RTSPError::ResponseTooLarge(total).into());
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches(['\r', '\n']);

        if lines.is_empty() {
            match text.find(protocol) {
                Some(start) => lines.push(text[start..].to_string()),
                None => log::debug!("Skipping {} bytes before response", read),
            }
            continue;
        }
        if text.is_empty() {
            return Ok(lines);
        }
        lines.push(text.to_string());
    }
}

/// Reads a complete RTSP response including its body.
pub async fn read_response<R>(reader: &mut R) -> Result<RTSPResponse>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let head = read_head(reader, "RTSP/").await?;
    let mut response = RTSPResponse::parse_head(head.iter().map(String::as_str))?;

    let content_length = response.content_length()?;
    if content_length > MAX_RESPONSE_BODY_SIZE {
        return Err(RTSPError::ResponseTooLarge(content_length).into());
    }
    if content_length > 0 {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
        response.body = Bytes::from(body);
    }

    log::debug!(
        "Received RTSP/{} {} {} (CSeq {})",
        response.version,
        response.status_code,
        response.reason,
        response.cseq
    );
    Ok(response)
}
