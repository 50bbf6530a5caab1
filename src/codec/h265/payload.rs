use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use super::parser::H265Parser;
use super::types::{NALUnitType, NAL_HEADER_SIZE};
use crate::av::RawFrame;
use crate::codec::h264::START_MARKER;
use crate::codec::{FrameClock, FrameSink, MediaPayloadParser, ParserError};
use crate::utils::bytes::read_u16_be;
use crate::utils::ElasticBuffer;

const DONL_FIELD_SIZE: usize = 2;
const DOND_FIELD_SIZE: usize = 1;
const FU_HEADER_SIZE: usize = 1;

/// RTP payload parser for H.265 (RFC 7798).
///
/// Handles single NAL unit packets, aggregation packets and fragmentation
/// units. DONL/DOND fields are expected when the session description sets
/// `sprop-max-don-diff` above zero.
#[derive(Debug)]
pub struct H265VideoPayloadParser {
    parser: H265Parser,
    clock: FrameClock,
    nal_buffer: ElasticBuffer,
    has_donl: bool,
    wait_for_start_fu: bool,
}

impl H265VideoPayloadParser {
    /// Creates a parser primed with the out-of-band parameter sets.
    ///
    /// Each set is a bare NAL unit without start code. Empty sets are skipped.
    pub fn new(vps: &Bytes, sps: &Bytes, pps: &Bytes, has_donl: bool) -> Result<Self, ParserError> {
        let mut parser = H265Parser::new();
        let now = Utc::now();
        for set in [vps, sps, pps] {
            if !set.is_empty() {
                parser.parse(now, set, false, &mut |_: RawFrame| {})?;
            }
        }

        Ok(Self {
            parser,
            clock: FrameClock::default(),
            nal_buffer: ElasticBuffer::new(8 * 1024, 512 * 1024),
            has_donl,
            wait_for_start_fu: true,
        })
    }

    fn parse_single(
        &mut self,
        timestamp: DateTime<Utc>,
        payload: &[u8],
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        if !self.has_donl {
            return self.parser.parse(timestamp, payload, marker, sink);
        }

        let body = payload
            .get(NAL_HEADER_SIZE + DONL_FIELD_SIZE..)
            .ok_or(ParserError::Truncated("DONL"))?;
        self.nal_buffer.reset();
        self.nal_buffer.add_bytes(&payload[..NAL_HEADER_SIZE])?;
        self.nal_buffer.add_bytes(body)?;
        let nal_unit = self.nal_buffer.take();
        self.parser.parse(timestamp, &nal_unit, marker, sink)
    }

    fn parse_aggregation(
        &mut self,
        timestamp: DateTime<Utc>,
        payload: &[u8],
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        let mut offset = NAL_HEADER_SIZE;
        let mut first = true;

        while offset < payload.len() {
            if self.has_donl {
                offset += if first { DONL_FIELD_SIZE } else { DOND_FIELD_SIZE };
            }
            first = false;

            let size = read_u16_be(payload, offset)
                .ok_or(ParserError::Truncated("AP unit size"))? as usize;
            offset += 2;

            let nal_unit = payload
                .get(offset..offset + size)
                .ok_or(ParserError::Truncated("AP unit"))?;
            offset += size;

            let last = offset >= payload.len();
            self.parser.parse(timestamp, nal_unit, marker && last, sink)?;
        }
        Ok(())
    }

    fn parse_fragment(
        &mut self,
        timestamp: DateTime<Utc>,
        payload: &[u8],
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        let fu_header = *payload
            .get(NAL_HEADER_SIZE)
            .ok_or(ParserError::Truncated("FU header"))?;
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;

        if start && end {
            return Err(ParserError::InvalidNalUnit(
                "fragmentation unit with both start and end bits".into(),
            ));
        }

        let mut data_offset = NAL_HEADER_SIZE + FU_HEADER_SIZE;
        if start {
            if self.has_donl {
                data_offset += DONL_FIELD_SIZE;
            }
            let nal_type = fu_header & 0x3F;
            let header = [(payload[0] & 0x81) | (nal_type << 1), payload[1]];

            self.nal_buffer.reset();
            self.nal_buffer.add_bytes(&START_MARKER)?;
            self.nal_buffer.add_bytes(&header)?;
            self.wait_for_start_fu = false;
        } else if self.wait_for_start_fu {
            return Ok(());
        }

        let data = payload
            .get(data_offset..)
            .ok_or(ParserError::Truncated("FU payload"))?;
        self.nal_buffer.add_bytes(data)?;

        if end {
            self.wait_for_start_fu = true;
            let nal_unit = self.nal_buffer.take();
            self.parser.parse(timestamp, &nal_unit, marker, sink)?;
        }
        Ok(())
    }
}

impl MediaPayloadParser for H265VideoPayloadParser {
    fn parse(
        &mut self,
        time_offset: Option<Duration>,
        payload: &[u8],
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        if payload.len() < NAL_HEADER_SIZE {
            return Ok(());
        }
        let timestamp = self.clock.timestamp(time_offset);

        match NALUnitType::from(payload[0] >> 1) {
            NALUnitType::AggregationPacket => {
                self.parse_aggregation(timestamp, payload, marker, sink)
            }
            NALUnitType::FragmentationUnit => self.parse_fragment(timestamp, payload, marker, sink),
            NALUnitType::PayloadContentInfo => {
                log::trace!("Skipping H265 PACI packet");
                Ok(())
            }
            _ => self.parse_single(timestamp, payload, marker, sink),
        }
    }

    fn reset_state(&mut self) {
        self.nal_buffer.reset();
        self.parser.reset_state();
        self.wait_for_start_fu = true;
    }
}
