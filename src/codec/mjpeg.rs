//! RTP/JPEG depacketization (RFC 2435).
//!
//! RTP/JPEG strips the JPEG headers from each image and sends only the
//! scan data plus a compact main header. The parser rebuilds SOI, DQT,
//! DRI, SOF, DHT and SOS segments from that header so every emitted frame
//! is a standalone JPEG file.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Duration, Utc};

use crate::av::{FrameKind, RawFrame};
use crate::codec::{FrameClock, FrameSink, MediaPayloadParser, ParserError};
use crate::utils::bytes::{read_u16_be, read_u24_be};

const MAIN_HEADER_SIZE: usize = 8;
const RESTART_HEADER_SIZE: usize = 4;
const QUANTIZATION_HEADER_SIZE: usize = 4;
const EOI: [u8; 2] = [0xff, 0xd9];
const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

#[rustfmt::skip]
const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10,
    17, 24, 32, 25, 18, 11, 4, 5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13, 6, 7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// Table K.1 of ITU-T T.81
#[rustfmt::skip]
const LUMA_QUANTIZER: [i32; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61,
    12, 12, 14, 19, 26, 58, 60, 55,
    14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62,
    18, 22, 37, 56, 68, 109, 103, 77,
    24, 35, 55, 64, 81, 104, 113, 92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Table K.2 of ITU-T T.81
#[rustfmt::skip]
const CHROMA_QUANTIZER: [i32; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99,
    18, 21, 26, 66, 99, 99, 99, 99,
    24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

const LUM_DC_CODELENS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const LUM_DC_SYMBOLS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const LUM_AC_CODELENS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];

#[rustfmt::skip]
const LUM_AC_SYMBOLS: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12,
    0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08,
    0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16,
    0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
    0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59,
    0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79,
    0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98,
    0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6,
    0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4,
    0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea,
    0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

const CHM_DC_CODELENS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const CHM_DC_SYMBOLS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const CHM_AC_CODELENS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];

#[rustfmt::skip]
const CHM_AC_SYMBOLS: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21,
    0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91,
    0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34,
    0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38,
    0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58,
    0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78,
    0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96,
    0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4,
    0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2,
    0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9,
    0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Luma and chroma tables, in zigzag order, for a quality factor of 1 to 99.
fn make_tables(q: u8) -> Bytes {
    let factor = i32::from(q).clamp(1, 99);
    let scale = if factor < 50 {
        5000 / factor
    } else {
        200 - factor * 2
    };

    let mut tables = [0u8; 128];
    for i in 0..64 {
        let luma = (LUMA_QUANTIZER[ZIGZAG[i]] * scale + 50) / 100;
        let chroma = (CHROMA_QUANTIZER[ZIGZAG[i]] * scale + 50) / 100;
        tables[i] = luma.clamp(1, 255) as u8;
        tables[i + 64] = chroma.clamp(1, 255) as u8;
    }
    Bytes::copy_from_slice(&tables)
}

fn put_quantization_table(buf: &mut BytesMut, table: &[u8], table_no: u8) {
    buf.put_slice(&[0xff, 0xdb]);
    buf.put_u16(table.len() as u16 + 3);
    buf.put_u8(table_no);
    buf.put_slice(table);
}

fn put_huffman_table(buf: &mut BytesMut, codelens: &[u8], symbols: &[u8], table_no: u8, class: u8) {
    buf.put_slice(&[0xff, 0xc4]);
    buf.put_u16((3 + codelens.len() + symbols.len()) as u16);
    buf.put_u8((class << 4) | table_no);
    buf.put_slice(codelens);
    buf.put_slice(symbols);
}

#[derive(Debug, Clone, Copy)]
struct MainHeader {
    image_type: u8,
    width: u16,
    height: u16,
}

fn put_jpeg_headers(
    buf: &mut BytesMut,
    header: MainHeader,
    tables: &[u8],
    precision: u8,
    restart_interval: u16,
) -> Result<(), ParserError> {
    buf.put_slice(&[0xff, 0xd8]);

    let luma_size = if precision & 1 != 0 { 128 } else { 64 };
    let chroma_size = if precision & 2 != 0 { 128 } else { 64 };
    if tables.len() < luma_size + chroma_size {
        return Err(ParserError::Truncated("JPEG quantization tables"));
    }
    put_quantization_table(buf, &tables[..luma_size], 0);
    put_quantization_table(buf, &tables[luma_size..luma_size + chroma_size], 1);

    if restart_interval != 0 {
        buf.put_slice(&[0xff, 0xdd, 0x00, 0x04]);
        buf.put_u16(restart_interval);
    }

    // SOF0, three components
    buf.put_slice(&[0xff, 0xc0, 0x00, 17, 8]);
    buf.put_u16(header.height);
    buf.put_u16(header.width);
    buf.put_u8(3);
    let luma_sampling = if header.image_type & 0x3f == 0 { 0x21 } else { 0x22 };
    buf.put_slice(&[0, luma_sampling, 0]);
    buf.put_slice(&[1, 0x11, 1]);
    buf.put_slice(&[2, 0x11, 1]);

    put_huffman_table(buf, &LUM_DC_CODELENS, &LUM_DC_SYMBOLS, 0, 0);
    put_huffman_table(buf, &LUM_AC_CODELENS, &LUM_AC_SYMBOLS, 0, 1);
    put_huffman_table(buf, &CHM_DC_CODELENS, &CHM_DC_SYMBOLS, 1, 0);
    put_huffman_table(buf, &CHM_AC_CODELENS, &CHM_AC_SYMBOLS, 1, 1);

    // SOS
    buf.put_slice(&[0xff, 0xda, 0x00, 12, 3]);
    buf.put_slice(&[0, 0x00, 1, 0x11, 2, 0x11]);
    buf.put_slice(&[0, 63, 0]);
    Ok(())
}

/// RTP payload parser for Motion JPEG.
///
/// A frame is emitted on the marker bit, or when a fragment with offset
/// zero starts the next image while one is still open.
#[derive(Debug)]
pub struct MJPEGVideoPayloadParser {
    clock: FrameClock,
    frame: BytesMut,
    frame_timestamp: Option<DateTime<Utc>>,
    tables: Vec<Option<Bytes>>,
    max_frame_size: usize,
}

impl Default for MJPEGVideoPayloadParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MJPEGVideoPayloadParser {
    /// Creates a parser with an empty quantization table cache
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Creates a parser that drops images larger than `max_frame_size` bytes
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            clock: FrameClock::default(),
            frame: BytesMut::with_capacity(max_frame_size.min(64 * 1024)),
            frame_timestamp: None,
            tables: vec![None; 256],
            max_frame_size,
        }
    }

    /// Resolves the quantization tables of a first fragment and returns
    /// them with their precision byte and the bytes they consumed.
    fn quantization_tables(&mut self, q: u8, data: &[u8]) -> Result<(Bytes, u8, usize), ParserError> {
        if q < 128 {
            let tables = self.tables[q as usize].get_or_insert_with(|| make_tables(q));
            return Ok((tables.clone(), 0, 0));
        }

        if data.len() < QUANTIZATION_HEADER_SIZE {
            return Err(ParserError::Truncated("JPEG quantization header"));
        }
        let precision = data[1];
        let length = read_u16_be(data, 2).unwrap_or(0) as usize;
        let consumed = QUANTIZATION_HEADER_SIZE + length;

        if length == 0 {
            return match &self.tables[q as usize] {
                Some(tables) => Ok((tables.clone(), precision, consumed)),
                None => Err(ParserError::InvalidConfig(format!(
                    "no cached quantization tables for Q={}",
                    q
                ))),
            };
        }

        let tables = data
            .get(QUANTIZATION_HEADER_SIZE..consumed)
            .map(Bytes::copy_from_slice)
            .ok_or(ParserError::Truncated("JPEG quantization tables"))?;
        if q != 255 {
            self.tables[q as usize] = Some(tables.clone());
        }
        Ok((tables, precision, consumed))
    }

    fn emit_frame(&mut self, sink: &mut dyn FrameSink) {
        let Some(timestamp) = self.frame_timestamp.take() else {
            return;
        };
        if !self.frame.ends_with(&EOI) {
            self.frame.put_slice(&EOI);
        }
        let data = self.frame.split().freeze();
        sink.on_frame(RawFrame::new(timestamp, data, FrameKind::JPEG));
    }
}

impl MediaPayloadParser for MJPEGVideoPayloadParser {
    fn parse(
        &mut self,
        time_offset: Option<Duration>,
        payload: &[u8],
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        if payload.len() < MAIN_HEADER_SIZE {
            return Err(ParserError::Truncated("RTP/JPEG header"));
        }

        let fragment_offset = read_u24_be(payload, 1).unwrap_or(0);
        let header = MainHeader {
            image_type: payload[4],
            width: u16::from(payload[6]) * 8,
            height: u16::from(payload[7]) * 8,
        };
        let q = payload[5];
        let mut data = &payload[MAIN_HEADER_SIZE..];

        let mut restart_interval = 0;
        if header.image_type > 63 {
            restart_interval =
                read_u16_be(data, 0).ok_or(ParserError::Truncated("JPEG restart header"))?;
            data = &data[RESTART_HEADER_SIZE.min(data.len())..];
        }

        if fragment_offset == 0 {
            self.emit_frame(sink);

            let (tables, precision, consumed) = self.quantization_tables(q, data)?;
            data = &data[consumed..];

            self.frame.clear();
            put_jpeg_headers(&mut self.frame, header, &tables, precision, restart_interval)?;
            self.frame_timestamp = Some(self.clock.timestamp(time_offset));
        } else if self.frame_timestamp.is_none() {
            return Ok(());
        }

        let required = self.frame.len() + data.len() + EOI.len();
        if required > self.max_frame_size {
            self.reset_state();
            return Err(ParserError::BufferOverflow {
                required,
                max: self.max_frame_size,
            });
        }
        self.frame.put_slice(data);

        if marker {
            self.emit_frame(sink);
        }
        Ok(())
    }

    fn reset_state(&mut self) {
        self.frame.clear();
        self.frame_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Collector;
    use pretty_assertions::assert_eq;

    fn main_header(fragment_offset: u32, q: u8) -> Vec<u8> {
        let offset = fragment_offset.to_be_bytes();
        vec![0, offset[1], offset[2], offset[3], 1, q, (640u16 / 8) as u8, (480u16 / 8) as u8]
    }

    #[test]
    fn test_next_image_flushes_previous() {
        let mut parser = MJPEGVideoPayloadParser::new();
        let mut sink = Collector::default();

        let mut first = main_header(0, 1);
        first.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut second = main_header(0, 1);
        second.extend_from_slice(&[1, 2, 3, 4]);

        parser
            .parse(Some(Duration::zero()), &first, false, &mut sink)
            .unwrap();
        assert!(sink.frames.is_empty());
        parser
            .parse(Some(Duration::zero()), &second, false, &mut sink)
            .unwrap();

        assert_eq!(sink.frames.len(), 1);
        let data = &sink.frames[0].data;
        assert_eq!(&data[..2], &[0xff, 0xd8]);
        assert!(data.ends_with(&[1, 2, 3, 4, 5, 6, 7, 8, 0xff, 0xd9]));
        assert_eq!(sink.frames[0].kind, FrameKind::JPEG);
    }

    #[test]
    fn test_fragments_joined_on_marker() {
        let mut parser = MJPEGVideoPayloadParser::new();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        let mut first = main_header(0, 50);
        first.extend_from_slice(&[0xaa; 4]);
        let mut last = main_header(4, 50);
        last.extend_from_slice(&[0xbb, 0xff, 0xd9]);

        parser.parse(None, &first, false, &mut sink).unwrap();
        parser.parse(None, &last, true, &mut sink).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0]
            .data
            .ends_with(&[0xaa, 0xaa, 0xaa, 0xaa, 0xbb, 0xff, 0xd9]));
    }

    #[test]
    fn test_inline_quantization_tables() {
        let mut parser = MJPEGVideoPayloadParser::new();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        let mut packet = main_header(0, 255);
        packet.extend_from_slice(&[0, 0, 0, 128]);
        packet.extend(std::iter::repeat(7u8).take(128));
        packet.extend_from_slice(&[0x11, 0x22]);
        parser.parse(None, &packet, true, &mut sink).unwrap();

        assert_eq!(frames.len(), 1);
        let data = &frames[0].data;
        // SOI, then DQT for table 0 carrying the inline values
        assert_eq!(&data[2..7], &[0xff, 0xdb, 0x00, 67, 0x00]);
        assert_eq!(data[7], 7);
        assert!(data.ends_with(&[0x11, 0x22, 0xff, 0xd9]));
    }

    #[test]
    fn test_missing_dynamic_tables_is_an_error() {
        let mut parser = MJPEGVideoPayloadParser::new();
        let mut packet = main_header(0, 200);
        packet.extend_from_slice(&[0, 0, 0, 0]);
        let result = parser.parse(None, &packet, true, &mut |_: RawFrame| {});
        assert!(matches!(result, Err(ParserError::InvalidConfig(_))));
    }

    #[test]
    fn test_orphan_fragment_is_ignored() {
        let mut parser = MJPEGVideoPayloadParser::new();
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);

        let mut packet = main_header(100, 50);
        packet.extend_from_slice(&[1, 2, 3]);
        parser.parse(None, &packet, true, &mut sink).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn test_oversized_image_is_dropped() {
        let mut parser = MJPEGVideoPayloadParser::with_max_frame_size(1024);
        let mut sink = Collector::default();

        let mut first = main_header(0, 50);
        first.extend_from_slice(&[0xaa; 64]);
        parser.parse(None, &first, false, &mut sink).unwrap();

        let mut next = main_header(64, 50);
        next.extend_from_slice(&[0xbb; 1024]);
        let err = parser.parse(None, &next, true, &mut sink).unwrap_err();
        assert!(matches!(err, ParserError::BufferOverflow { max: 1024, .. }));

        // The rest of the dropped image is ignored until the next one starts
        let mut last = main_header(1088, 50);
        last.extend_from_slice(&[0xcc; 4]);
        parser.parse(None, &last, true, &mut sink).unwrap();
        assert!(sink.frames.is_empty());

        parser.parse(None, &first, true, &mut sink).unwrap();
        assert_eq!(sink.frames.len(), 1);
    }
}
