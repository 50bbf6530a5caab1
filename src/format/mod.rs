//! # Container and Transport Formats
//!
//! Wire formats between the socket and the payload parsers:
//!
//! - [`tpkt`]: `$`-prefixed interleaved frames on the RTSP connection
//! - [`rtp`]: RTP packets, reordering and per-track statistics
//! - [`rtcp`]: sender reports, BYE and the receiver reports we send back
//! - [`sdp`]: session descriptions returned by DESCRIBE
//! - [`rtsp`]: the RTSP session and client

pub mod rtcp;
pub mod rtp;
pub mod rtsp;
pub mod sdp;
pub mod tpkt;
