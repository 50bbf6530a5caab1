//! # Real-time Transport Protocol (RTP) Implementation
//!
//! This module covers the receive side of RTP:
//!
//! - Zero-copy packet parsing with CSRC, extension and padding handling
//! - A fixed-window sequence assembler that restores order on UDP
//! - Per-track stream processing with loss statistics for RTCP reports
//!
//! ## Example: Building and Parsing RTP Packets
//!
//! ```rust
//! use rtspio::format::rtp::RTPPacket;
//!
//! let payload = [1u8, 2, 3, 4];
//! let packet = RTPPacket::new(96, 1000, 90000, 0x12345678, true, &payload);
//! let wire = packet.to_bytes();
//!
//! let parsed = RTPPacket::parse(&wire).unwrap();
//! assert_eq!(parsed.sequence_number, 1000);
//! assert_eq!(parsed.payload, &payload[..]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::utils::bytes::read_u16_be;

mod assembler;
mod stream;

pub use assembler::RTPSequenceAssembler;
pub use stream::{RTPStatisticsProvider, RTPStream};

/// Fixed part of the RTP header.
pub const RTP_HEADER_SIZE: usize = 12;

/// Errors that can occur during RTP operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RTPError {
    /// The packet is shorter than its headers claim
    #[error("Invalid RTP packet: {0}")]
    InvalidPacket(&'static str),

    /// Version field is not 2
    #[error("Unsupported RTP version {0}")]
    UnsupportedVersion(u8),
}

/// An RTP packet whose payload borrows from the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RTPPacket<'a> {
    /// RTP version (always 2)
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// Header extension flag
    pub extension: bool,
    /// CSRC count
    pub csrc_count: u8,
    /// Marker bit
    pub marker: bool,
    /// Payload type identifier
    pub payload_type: u8,
    /// Packet sequence number
    pub sequence_number: u16,
    /// Media timestamp
    pub timestamp: u32,
    /// Synchronization source identifier
    pub ssrc: u32,
    /// Optional header extension (profile-specific id, data)
    pub extension_data: Option<(u16, &'a [u8])>,
    /// Payload with padding removed
    pub payload: &'a [u8],
}

impl<'a> RTPPacket<'a> {
    /// Creates a version 2 packet without CSRCs, extension or padding.
    pub fn new(
        payload_type: u8,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        marker: bool,
        payload: &'a [u8],
    ) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            extension_data: None,
            payload,
        }
    }

    /// Parses an RTP packet.
    ///
    /// # Errors
    ///
    /// Returns `RTPError` if:
    /// - The packet is shorter than 12 bytes
    /// - The version is not 2
    /// - The CSRC list, extension or padding overrun the buffer
    pub fn parse(data: &'a [u8]) -> Result<Self, RTPError> {
        if data.len() < RTP_HEADER_SIZE {
            return Err(RTPError::InvalidPacket("shorter than fixed header"));
        }

        let first_byte = data[0];
        let second_byte = data[1];

        let version = first_byte >> 6;
        if version != 2 {
            return Err(RTPError::UnsupportedVersion(version));
        }

        let padding = first_byte & 0x20 != 0;
        let extension = first_byte & 0x10 != 0;
        let csrc_count = first_byte & 0x0f;

        let marker = second_byte & 0x80 != 0;
        let payload_type = second_byte & 0x7f;

        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut offset = RTP_HEADER_SIZE + csrc_count as usize * 4;
        if offset > data.len() {
            return Err(RTPError::InvalidPacket("CSRC list overruns packet"));
        }

        let extension_data = if extension {
            let profile = read_u16_be(data, offset)
                .ok_or(RTPError::InvalidPacket("extension header overruns packet"))?;
            let words = read_u16_be(data, offset + 2)
                .ok_or(RTPError::InvalidPacket("extension header overruns packet"))?;
            offset += 4;
            let end = offset + words as usize * 4;
            if end > data.len() {
                return Err(RTPError::InvalidPacket("extension overruns packet"));
            }
            let ext = &data[offset..end];
            offset = end;
            Some((profile, ext))
        } else {
            None
        };

        let mut end = data.len();
        if padding && end > offset {
            let padding_len = data[end - 1] as usize;
            if padding_len > end - offset {
                return Err(RTPError::InvalidPacket("padding overruns payload"));
            }
            end -= padding_len;
        }

        Ok(Self {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            extension_data,
            payload: &data[offset..end],
        })
    }

    /// Serializes the packet. CSRCs are not written.
    pub fn to_bytes(&self) -> Bytes {
        let ext_len = self.extension_data.map_or(0, |(_, ext)| 4 + ext.len());
        let mut buf = BytesMut::with_capacity(RTP_HEADER_SIZE + ext_len + self.payload.len());
        let extension = self.extension_data.is_some();
        buf.put_u8(0x80 | if extension { 0x10 } else { 0 });
        let marker = if self.marker { 0x80 } else { 0 };
        buf.put_u8(marker | (self.payload_type & 0x7f));
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        if let Some((profile, ext)) = self.extension_data {
            buf.put_u16(profile);
            buf.put_u16((ext.len() / 4) as u16);
            buf.put_slice(ext);
        }
        buf.put_slice(self.payload);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests;
