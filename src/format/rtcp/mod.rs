//! # RTP Control Protocol (RTCP) Implementation
//!
//! RTCP runs alongside RTP and carries reception feedback and session
//! control. A receiving client needs three things from it:
//!
//! - Sender Reports, whose NTP timestamp feeds the LSR/DLSR fields
//! - Goodbye packets, which end the session
//! - Receiver Report and Source Description generation
//!
//! ## Example
//!
//! ```rust
//! use rtspio::format::rtcp::{RTCPPacket, ReceptionReport};
//!
//! let report = RTCPPacket::ReceiverReport {
//!     ssrc: 0x12345678,
//!     reports: vec![ReceptionReport {
//!         ssrc: 0x87654321,
//!         fraction_lost: 0,
//!         packets_lost: 0,
//!         highest_seq: 1000,
//!         jitter: 0,
//!         last_sr: 0,
//!         delay_last_sr: 0,
//!     }],
//! };
//!
//! let wire = RTCPPacket::serialize_compound(&[report]);
//! assert_eq!(wire.len(), 32);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::utils::bytes::{read_u32_be, read_u64_be};

mod reports;
mod stream;

pub(crate) use reports::local_cname;
pub use reports::{RTCPReceiverReportsProvider, RTCPSenderStatisticsProvider};
pub use stream::RTCPStream;

/// Payload type of a Sender Report
pub const PT_SENDER_REPORT: u8 = 200;
/// Payload type of a Receiver Report
pub const PT_RECEIVER_REPORT: u8 = 201;
/// Payload type of a Source Description
pub const PT_SOURCE_DESCRIPTION: u8 = 202;
/// Payload type of a Goodbye
pub const PT_GOODBYE: u8 = 203;

/// SDES item type carrying the canonical name
pub const SDES_CNAME: u8 = 1;

const REPORT_BLOCK_SIZE: usize = 24;

/// Errors that can occur during RTCP packet operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RTCPError {
    /// The packet data is malformed or incomplete
    #[error("Invalid RTCP packet: {0}")]
    InvalidPacket(&'static str),
}

/// Specialized Result type for RTCP operations
pub type Result<T> = std::result::Result<T, RTCPError>;

/// Reception statistics for an RTP source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceptionReport {
    /// SSRC of the source this report is for
    pub ssrc: u32,
    /// Fraction of RTP data packets lost since the previous report
    pub fraction_lost: u8,
    /// Cumulative number of packets lost (24 bits)
    pub packets_lost: u32,
    /// Extended highest sequence number received
    pub highest_seq: u32,
    /// Interarrival jitter
    pub jitter: u32,
    /// Last SR timestamp (LSR)
    pub last_sr: u32,
    /// Delay since last SR (DLSR), in 1/65536 seconds
    pub delay_last_sr: u32,
}

/// RTCP packets understood by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RTCPPacket {
    /// Sender Report (SR) packet
    SenderReport {
        /// Synchronization source identifier
        ssrc: u32,
        /// NTP timestamp in 64-bit fixed point format
        ntp_timestamp: u64,
        /// RTP timestamp corresponding to the NTP timestamp
        rtp_timestamp: u32,
        /// Total number of packets sent
        packet_count: u32,
        /// Total number of payload octets sent
        octet_count: u32,
        /// Reception reports for other sources
        reports: Vec<ReceptionReport>,
    },

    /// Receiver Report (RR) packet
    ReceiverReport {
        /// Synchronization source identifier of the reporter
        ssrc: u32,
        /// Reception reports
        reports: Vec<ReceptionReport>,
    },

    /// Source Description (SDES) packet
    SourceDescription {
        /// List of (SSRC, item list) pairs. Each item is (type, value)
        chunks: Vec<(u32, Vec<(u8, String)>)>,
    },

    /// Goodbye (BYE) packet
    Goodbye {
        /// Sources leaving the session
        sources: Vec<u32>,
        /// Optional reason for leaving
        reason: Option<String>,
    },
}

impl RTCPPacket {
    /// Parses a compound RTCP packet.
    ///
    /// Sender Reports, Receiver Reports and Goodbyes are returned; every
    /// other payload type is skipped by its length field.
    ///
    /// # Errors
    ///
    /// Returns `RTCPError` if a header is truncated, the version is not 2,
    /// or a length field points past the end of `data`.
    pub fn parse_compound(mut data: &[u8]) -> Result<Vec<Self>> {
        let mut packets = Vec::new();

        while !data.is_empty() {
            if data.len() < 4 {
                return Err(RTCPError::InvalidPacket("truncated header"));
            }

            let first_byte = data[0];
            if first_byte >> 6 != 2 {
                return Err(RTCPError::InvalidPacket("unsupported version"));
            }
            let count = (first_byte & 0x1f) as usize;
            let packet_type = data[1];
            let length = (u16::from_be_bytes([data[2], data[3]]) as usize + 1) * 4;
            if length > data.len() {
                return Err(RTCPError::InvalidPacket("length exceeds buffer"));
            }

            let body = &data[4..length];
            match packet_type {
                PT_SENDER_REPORT => packets.push(Self::parse_sender_report(body, count)?),
                PT_RECEIVER_REPORT => packets.push(Self::parse_receiver_report(body, count)?),
                PT_GOODBYE => packets.push(Self::parse_goodbye(body, count)?),
                other => log::trace!("Skipping RTCP packet type {}", other),
            }

            data = &data[length..];
        }

        Ok(packets)
    }

    fn parse_sender_report(body: &[u8], count: usize) -> Result<Self> {
        let short = RTCPError::InvalidPacket("sender report too short");
        let ssrc = read_u32_be(body, 0).ok_or(short.clone())?;
        let ntp_timestamp = read_u64_be(body, 4).ok_or(short.clone())?;
        let rtp_timestamp = read_u32_be(body, 12).ok_or(short.clone())?;
        let packet_count = read_u32_be(body, 16).ok_or(short.clone())?;
        let octet_count = read_u32_be(body, 20).ok_or(short)?;
        let reports = parse_reception_reports(&body[24..], count)?;

        Ok(RTCPPacket::SenderReport {
            ssrc,
            ntp_timestamp,
            rtp_timestamp,
            packet_count,
            octet_count,
            reports,
        })
    }

    fn parse_receiver_report(body: &[u8], count: usize) -> Result<Self> {
        let ssrc =
            read_u32_be(body, 0).ok_or(RTCPError::InvalidPacket("receiver report too short"))?;
        let reports = parse_reception_reports(&body[4..], count)?;
        Ok(RTCPPacket::ReceiverReport { ssrc, reports })
    }

    fn parse_goodbye(body: &[u8], count: usize) -> Result<Self> {
        let sources = (0..count)
            .map(|i| read_u32_be(body, i * 4).ok_or(RTCPError::InvalidPacket("goodbye too short")))
            .collect::<Result<Vec<_>>>()?;

        let reason = body.get(count * 4).and_then(|&len| {
            body.get(count * 4 + 1..count * 4 + 1 + len as usize)
                .map(|text| String::from_utf8_lossy(text).into_owned())
        });

        Ok(RTCPPacket::Goodbye { sources, reason })
    }

    /// Appends the wire form of this packet to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let start = buf.len();
        match self {
            RTCPPacket::SenderReport {
                ssrc,
                ntp_timestamp,
                rtp_timestamp,
                packet_count,
                octet_count,
                reports,
            } => {
                put_header(buf, reports.len(), PT_SENDER_REPORT);
                buf.put_u32(*ssrc);
                buf.put_u64(*ntp_timestamp);
                buf.put_u32(*rtp_timestamp);
                buf.put_u32(*packet_count);
                buf.put_u32(*octet_count);
                reports.iter().for_each(|report| put_report_block(buf, report));
            }
            RTCPPacket::ReceiverReport { ssrc, reports } => {
                put_header(buf, reports.len(), PT_RECEIVER_REPORT);
                buf.put_u32(*ssrc);
                reports.iter().for_each(|report| put_report_block(buf, report));
            }
            RTCPPacket::SourceDescription { chunks } => {
                put_header(buf, chunks.len(), PT_SOURCE_DESCRIPTION);
                for (ssrc, items) in chunks {
                    let chunk_start = buf.len();
                    buf.put_u32(*ssrc);
                    for (item_type, value) in items {
                        let text = &value.as_bytes()[..value.len().min(255)];
                        buf.put_u8(*item_type);
                        buf.put_u8(text.len() as u8);
                        buf.put_slice(text);
                    }
                    // End-of-items marker plus padding to the next word
                    buf.put_u8(0);
                    while (buf.len() - chunk_start) % 4 != 0 {
                        buf.put_u8(0);
                    }
                }
            }
            RTCPPacket::Goodbye { sources, reason } => {
                put_header(buf, sources.len(), PT_GOODBYE);
                sources.iter().for_each(|ssrc| buf.put_u32(*ssrc));
                if let Some(reason) = reason {
                    let text = &reason.as_bytes()[..reason.len().min(255)];
                    buf.put_u8(text.len() as u8);
                    buf.put_slice(text);
                    while (buf.len() - start) % 4 != 0 {
                        buf.put_u8(0);
                    }
                }
            }
        }

        let words = ((buf.len() - start) / 4 - 1) as u16;
        buf[start + 2..start + 4].copy_from_slice(&words.to_be_bytes());
    }

    /// Serializes `packets` back to back into one compound packet.
    pub fn serialize_compound(packets: &[RTCPPacket]) -> Bytes {
        let mut buf = BytesMut::with_capacity(128);
        packets.iter().for_each(|packet| packet.write_to(&mut buf));
        buf.freeze()
    }
}

fn put_header(buf: &mut BytesMut, count: usize, packet_type: u8) {
    buf.put_u8(0x80 | (count as u8 & 0x1f));
    buf.put_u8(packet_type);
    buf.put_u16(0);
}

fn put_report_block(buf: &mut BytesMut, report: &ReceptionReport) {
    buf.put_u32(report.ssrc);
    buf.put_u8(report.fraction_lost);
    buf.put_slice(&report.packets_lost.to_be_bytes()[1..]);
    buf.put_u32(report.highest_seq);
    buf.put_u32(report.jitter);
    buf.put_u32(report.last_sr);
    buf.put_u32(report.delay_last_sr);
}

fn parse_reception_reports(data: &[u8], count: usize) -> Result<Vec<ReceptionReport>> {
    if data.len() < count * REPORT_BLOCK_SIZE {
        return Err(RTCPError::InvalidPacket("report blocks truncated"));
    }

    Ok(data
        .chunks_exact(REPORT_BLOCK_SIZE)
        .take(count)
        .map(|block| ReceptionReport {
            ssrc: u32::from_be_bytes([block[0], block[1], block[2], block[3]]),
            fraction_lost: block[4],
            packets_lost: u32::from_be_bytes([0, block[5], block[6], block[7]]),
            highest_seq: u32::from_be_bytes([block[8], block[9], block[10], block[11]]),
            jitter: u32::from_be_bytes([block[12], block[13], block[14], block[15]]),
            last_sr: u32::from_be_bytes([block[16], block[17], block[18], block[19]]),
            delay_last_sr: u32::from_be_bytes([block[20], block[21], block[22], block[23]]),
        })
        .collect())
}

#[cfg(test)]
mod tests;
