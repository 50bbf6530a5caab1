//! # H.265/HEVC Depacketization
//!
//! Turns RFC 7798 RTP payloads into complete access units. Structurally
//! this mirrors the H.264 path:
//!
//! - NAL unit header validation (base layer only)
//! - VPS/SPS/PPS caching keyed by parameter set id
//! - aggregation packet unpacking and fragmentation unit reassembly
//! - I/P classification from the NAL unit type, IRAP pictures being I-frames
//!
//! ## Example
//!
//! ```rust
//! use rtspio::codec::h265::NALUnitHeader;
//!
//! // IDR_W_RADL, layer 0, temporal id 0
//! let header = NALUnitHeader::parse(&[0x26, 0x01]).unwrap();
//! assert_eq!(header.nal_type, 19);
//! assert!(header.is_irap());
//! ```

/// Access unit assembly from NAL units
pub mod parser;
/// RTP payload unpacking
pub mod payload;
/// NAL unit header types
pub mod types;

pub use parser::H265Parser;
pub use payload::H265VideoPayloadParser;
pub use types::{NALUnitHeader, NALUnitType};
