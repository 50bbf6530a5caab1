use std::num::ParseIntError;
use thiserror::Error;

use crate::codec::ParserError;
use crate::format::rtcp::RTCPError;
use crate::format::rtp::RTPError;
use crate::format::rtsp::RTSPError;
use crate::format::sdp::SDPError;
use crate::format::tpkt::TPKTError;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Socket or stream failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed RTP packet
    #[error("rtp error: {0}")]
    Rtp(#[from] RTPError),

    /// Malformed RTCP packet
    #[error("rtcp error: {0}")]
    Rtcp(#[from] RTCPError),

    /// Interleaved framing failure
    #[error("tpkt error: {0}")]
    Tpkt(#[from] TPKTError),

    /// Malformed session description
    #[error("sdp error: {0}")]
    Sdp(#[from] SDPError),

    /// RTSP protocol or handshake failure
    #[error("rtsp error: {0}")]
    Rtsp(#[from] RTSPError),

    /// Media payload could not be parsed
    #[error("parser error: {0}")]
    Parser(#[from] ParserError),

    /// Bit-level read failure
    #[error("codec error: {0}")]
    Codec(String),

    /// Server answered with a status other than 200
    #[error("bad response code: {code} {reason}")]
    BadStatus {
        /// Status code
        code: u16,
        /// Reason phrase
        reason: String,
    },

    /// Credentials missing or rejected
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Connect or receive deadline elapsed
    #[error("timeout: {0}")]
    Timeout(String),

    /// Caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid setup that will never succeed on retry
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid URI
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid integer in a text field
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

impl ClientError {
    /// Returns true for errors worth retrying after a delay.
    ///
    /// Authentication failures, cancellation and configuration errors
    /// are final.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ClientError::Authentication(_) | ClientError::Cancelled | ClientError::Config(_)
        )
    }

    /// Returns true if the server rejected the request as unauthorized.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::BadStatus { code: 401, .. })
            || matches!(self, ClientError::Authentication(_))
    }
}

/// Result alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;
