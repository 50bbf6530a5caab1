use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use super::parser::H264Parser;
use super::types::{NALUnitType, START_MARKER};
use crate::av::RawFrame;
use crate::codec::{FrameClock, FrameSink, MediaPayloadParser, ParserError};
use crate::utils::bytes::read_u16_be;
use crate::utils::ElasticBuffer;

const DON_FIELD_SIZE: usize = 2;
const DOND_FIELD_SIZE: usize = 1;

/// RTP payload parser for H.264 (RFC 6184).
///
/// Handles single NAL unit packets, STAP-A/B, MTAP16/24 and FU-A/B.
#[derive(Debug)]
pub struct H264VideoPayloadParser {
    parser: H264Parser,
    clock: FrameClock,
    nal_buffer: ElasticBuffer,
    wait_for_start_fu: bool,
}

impl H264VideoPayloadParser {
    /// Creates a parser primed with the out-of-band parameter sets.
    pub fn new(sprop_parameter_sets: &Bytes) -> Result<Self, ParserError> {
        let mut parser = H264Parser::new();
        if !sprop_parameter_sets.is_empty() {
            parser.parse(Utc::now(), sprop_parameter_sets, false, &mut |_: RawFrame| {})?;
        }

        Ok(Self {
            parser,
            clock: FrameClock::default(),
            nal_buffer: ElasticBuffer::new(8 * 1024, 512 * 1024),
            wait_for_start_fu: true,
        })
    }

    fn parse_fu(
        &mut self,
        timestamp: DateTime<Utc>,
        payload: &[u8],
        don_size: usize,
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        let data_offset = 2 + don_size;
        if payload.len() < data_offset {
            return Err(ParserError::Truncated("FU header"));
        }

        let fu_header = payload[1];
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;

        if start {
            let nal_header = (fu_header & 0x1F) | (payload[0] & 0xE0);
            self.nal_buffer.reset();
            self.nal_buffer.add_bytes(&START_MARKER)?;
            self.nal_buffer.add_bytes(&[nal_header])?;
            self.wait_for_start_fu = false;
        } else if self.wait_for_start_fu {
            return Ok(());
        }

        self.nal_buffer.add_bytes(&payload[data_offset..])?;

        if end {
            self.wait_for_start_fu = true;
            let nal_unit = self.nal_buffer.take();
            self.parser.parse(timestamp, &nal_unit, marker, sink)?;
        }
        Ok(())
    }

    fn parse_stap(
        &mut self,
        timestamp: DateTime<Utc>,
        payload: &[u8],
        don_size: usize,
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        let mut offset = 1 + don_size;

        while offset < payload.len() {
            let size = read_u16_be(payload, offset)
                .ok_or(ParserError::Truncated("STAP unit size"))? as usize;
            offset += 2;

            let nal_unit = payload
                .get(offset..offset + size)
                .ok_or(ParserError::Truncated("STAP unit"))?;
            offset += size;

            let last = offset >= payload.len();
            self.parser
                .parse(timestamp, nal_unit, marker && last, sink)?;
        }
        Ok(())
    }

    fn parse_mtap(
        &mut self,
        timestamp: DateTime<Utc>,
        payload: &[u8],
        ts_offset_size: usize,
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        let mut offset = 1 + DON_FIELD_SIZE;

        while offset < payload.len() {
            let size = read_u16_be(payload, offset)
                .ok_or(ParserError::Truncated("MTAP unit size"))? as usize;
            offset += 2 + DOND_FIELD_SIZE + ts_offset_size;

            let nal_unit = payload
                .get(offset..offset + size)
                .ok_or(ParserError::Truncated("MTAP unit"))?;
            offset += size;

            let last = offset >= payload.len();
            self.parser
                .parse(timestamp, nal_unit, marker && last, sink)?;
        }
        Ok(())
    }
}

impl MediaPayloadParser for H264VideoPayloadParser {
    fn parse(
        &mut self,
        time_offset: Option<Duration>,
        payload: &[u8],
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        let Some(&first) = payload.first() else {
            return Ok(());
        };
        let timestamp = self.clock.timestamp(time_offset);

        match NALUnitType::from(first) {
            NALUnitType::FuA => self.parse_fu(timestamp, payload, 0, marker, sink),
            NALUnitType::FuB => self.parse_fu(timestamp, payload, DON_FIELD_SIZE, marker, sink),
            NALUnitType::StapA => self.parse_stap(timestamp, payload, 0, marker, sink),
            NALUnitType::StapB => {
                self.parse_stap(timestamp, payload, DON_FIELD_SIZE, marker, sink)
            }
            NALUnitType::Mtap16 => self.parse_mtap(timestamp, payload, 2, marker, sink),
            NALUnitType::Mtap24 => self.parse_mtap(timestamp, payload, 3, marker, sink),
            _ => self.parser.parse(timestamp, payload, marker, sink),
        }
    }

    fn reset_state(&mut self) {
        self.nal_buffer.reset();
        self.parser.reset_state();
        self.wait_for_start_fu = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::FrameKind;
    use base64::Engine as _;
    use pretty_assertions::assert_eq;

    fn sprop() -> Bytes {
        let engine = base64::engine::general_purpose::STANDARD;
        let mut sets = engine.decode("AAAAAWdNQCmaZgUB7YC1AQEBBenA").unwrap();
        sets.extend(engine.decode("AAAAAWjuPIA=").unwrap());
        Bytes::from(sets)
    }

    const IDR: [u8; 5] = [0x65, 0x88, 0x80, 0x10, 0x00];

    /// Aggregation payload with `unit_prefix` between each size field and unit
    fn aggregate(header: &[u8], unit_prefix: &[u8]) -> Vec<u8> {
        let sets = sprop();
        let mut payload = header.to_vec();
        for unit in [&sets[4..21], &sets[25..], &IDR[..]] {
            payload.extend_from_slice(&(unit.len() as u16).to_be_bytes());
            payload.extend_from_slice(unit_prefix);
            payload.extend_from_slice(unit);
        }
        payload
    }

    fn assert_single_iframe(frames: &[RawFrame]) {
        assert_eq!(frames.len(), 1);
        let mut expected = START_MARKER.to_vec();
        expected.extend_from_slice(&IDR);
        assert_eq!(&frames[0].data[..], &expected[..]);
        match &frames[0].kind {
            FrameKind::H264IFrame { sps_pps } => assert_eq!(sps_pps, &sprop()),
            other => panic!("unexpected frame kind {:?}", other),
        }
    }

    #[test]
    fn test_fu_a_reassembly() {
        let mut parser = H264VideoPayloadParser::new(&sprop()).unwrap();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        // IDR slice 0x65 0x88 0x80 0x10 0x00 split over three fragments
        let fragments: [(&[u8], bool); 3] = [
            (&[0x7c, 0x85, 0x88, 0x80], false),
            (&[0x7c, 0x05, 0x10], false),
            (&[0x7c, 0x45, 0x00], true),
        ];
        for (fragment, marker) in fragments {
            parser
                .parse(Some(Duration::zero()), fragment, marker, &mut sink)
                .unwrap();
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(
            &frames[0].data[..],
            &[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x80, 0x10, 0x00]
        );
        assert!(frames[0].kind.is_key_frame());
    }

    #[test]
    fn test_orphan_fu_continuation_is_ignored() {
        let mut parser = H264VideoPayloadParser::new(&sprop()).unwrap();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        parser
            .parse(None, &[0x7c, 0x45, 0x10, 0x00], true, &mut sink)
            .unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn test_stap_a_with_parameter_sets() {
        let mut parser = H264VideoPayloadParser::new(&Bytes::new()).unwrap();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        let sets = sprop();
        let sps = &sets[4..21];
        let pps = &sets[25..];
        let idr = [0x65, 0x88, 0x80, 0x10, 0x00];

        let mut payload = vec![0x78];
        for unit in [sps, pps, &idr[..]] {
            payload.extend_from_slice(&(unit.len() as u16).to_be_bytes());
            payload.extend_from_slice(unit);
        }
        parser.parse(None, &payload, true, &mut sink).unwrap();

        assert_eq!(frames.len(), 1);
        match &frames[0].kind {
            FrameKind::H264IFrame { sps_pps } => assert_eq!(sps_pps, &sets),
            other => panic!("unexpected frame kind {:?}", other),
        }
    }

    #[test]
    fn test_truncated_stap_is_an_error() {
        let mut parser = H264VideoPayloadParser::new(&Bytes::new()).unwrap();
        let mut sink = |_: RawFrame| {};

        let err = parser
            .parse(None, &[0x78, 0x00, 0x10, 0x67], true, &mut sink)
            .unwrap_err();
        assert_eq!(err, ParserError::Truncated("STAP unit"));
    }

    #[test]
    fn test_stap_b_skips_decoding_order_number() {
        let mut parser = H264VideoPayloadParser::new(&Bytes::new()).unwrap();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        let payload = aggregate(&[0x79, 0x12, 0x34], &[]);
        parser.parse(None, &payload, true, &mut sink).unwrap();

        assert_single_iframe(&frames);
    }

    #[test]
    fn test_mtap16_units() {
        let mut parser = H264VideoPayloadParser::new(&Bytes::new()).unwrap();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        // DONB, then DOND and a 16-bit timestamp offset per unit
        let payload = aggregate(&[0x7a, 0x00, 0x01], &[0x00, 0x0b, 0xb8]);
        parser.parse(None, &payload, true, &mut sink).unwrap();

        assert_single_iframe(&frames);
    }

    #[test]
    fn test_mtap24_units() {
        let mut parser = H264VideoPayloadParser::new(&Bytes::new()).unwrap();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        // DONB, then DOND and a 24-bit timestamp offset per unit
        let payload = aggregate(&[0x7b, 0x00, 0x01], &[0x01, 0x00, 0x0b, 0xb8]);
        parser.parse(None, &payload, true, &mut sink).unwrap();

        assert_single_iframe(&frames);
    }

    #[test]
    fn test_truncated_mtap_is_an_error() {
        let mut parser = H264VideoPayloadParser::new(&Bytes::new()).unwrap();
        let mut sink = |_: RawFrame| {};

        // Size field cut short
        let err = parser
            .parse(None, &[0x7a, 0x00, 0x01, 0x00], true, &mut sink)
            .unwrap_err();
        assert_eq!(err, ParserError::Truncated("MTAP unit size"));

        // Unit shorter than its size field, then a unit missing its offset fields
        let err = parser
            .parse(None, &[0x7a, 0x00, 0x01, 0x00, 0x10, 0x00, 0x00, 0x00, 0x67], true, &mut sink)
            .unwrap_err();
        assert_eq!(err, ParserError::Truncated("MTAP unit"));
        let err = parser
            .parse(None, &[0x7b, 0x00, 0x01, 0x00, 0x01, 0x00], true, &mut sink)
            .unwrap_err();
        assert_eq!(err, ParserError::Truncated("MTAP unit"));
    }

    #[test]
    fn test_fu_b_then_fu_a_reassembly() {
        let mut parser = H264VideoPayloadParser::new(&sprop()).unwrap();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        // Only the first fragment carries a DON
        let fragments: [(&[u8], bool); 3] = [
            (&[0x7d, 0x85, 0x00, 0x07, 0x88, 0x80], false),
            (&[0x7c, 0x05, 0x10], false),
            (&[0x7c, 0x45, 0x00], true),
        ];
        for (fragment, marker) in fragments {
            parser
                .parse(Some(Duration::zero()), fragment, marker, &mut sink)
                .unwrap();
        }

        assert_single_iframe(&frames);
    }
}
