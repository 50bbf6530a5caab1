//! # H.264/AVC Depacketization
//!
//! Turns RFC 6184 RTP payloads into complete access units:
//!
//! - NAL unit slicing on `00 00 00 01` start codes
//! - SPS/PPS caching keyed by parameter set id
//! - I/P classification from the slice header
//! - STAP-A/B and MTAP16/24 unpacking, FU-A/B reassembly
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use rtspio::av::RawFrame;
//! use rtspio::codec::h264::{H264Parser, H264Slicer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = [0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1f, 0xe9, 0, 0, 0, 1, 0x68, 0xce];
//! assert_eq!(H264Slicer::new(&data).count(), 2);
//!
//! let mut parser = H264Parser::new();
//! parser.parse(Utc::now(), &data, false, &mut |_: RawFrame| {})?;
//! assert_eq!(parser.sps_pps().len(), data.len());
//! # Ok(())
//! # }
//! ```

/// Access unit assembly from NAL units
pub mod parser;
/// RTP payload unpacking
pub mod payload;
/// NAL unit header types
pub mod types;

#[doc(inline)]
pub use parser::{H264Parser, H264Slicer};
#[doc(inline)]
pub use payload::H264VideoPayloadParser;
pub use types::{NALUnitHeader, NALUnitType, START_MARKER};
