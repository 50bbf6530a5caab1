//! ONVIF metadata stream parser.
//!
//! The metadata track carries an XML document per event, split across
//! as many RTP packets as needed. The outermost element name is learned
//! from the first document; raw bytes accumulate until its closing tag.

use bytes::Bytes;
use chrono::Duration;

use crate::av::{FrameKind, RawFrame};
use crate::codec::{FrameClock, FrameSink, MediaPayloadParser, ParserError};
use crate::utils::bytes::index_of;
use crate::utils::ElasticBuffer;

const XML_DECLARATION: &[u8] = b"<?xml";
const MAX_DOCUMENT_SIZE: usize = 1024 * 1024;

/// RTP payload parser for `vnd.onvif.metadata` tracks
#[derive(Debug)]
pub struct OnvifMetadataPayloadParser {
    clock: FrameClock,
    end_tag: Option<Vec<u8>>,
    document: ElasticBuffer,
}

impl Default for OnvifMetadataPayloadParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OnvifMetadataPayloadParser {
    /// Creates a parser that has not yet seen a document
    pub fn new() -> Self {
        Self::with_max_size(MAX_DOCUMENT_SIZE)
    }

    /// Creates a parser that drops documents larger than `max_size` bytes
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            clock: FrameClock::default(),
            end_tag: None,
            document: ElasticBuffer::new(max_size.min(4 * 1024), max_size),
        }
    }

    /// Closing tag of the first element in `xml`, without attributes.
    fn detect_end_tag(xml: &[u8]) -> Option<Vec<u8>> {
        let start = xml.iter().position(|&b| b == b'<')? + 1;
        let end = start + xml[start..].iter().position(|&b| b == b'>')?;
        let name = xml[start..end]
            .split(|b| b.is_ascii_whitespace())
            .next()?;
        let name = name.strip_suffix(b"/").unwrap_or(name);
        if name.is_empty() {
            return None;
        }

        let mut tag = b"</".to_vec();
        tag.extend_from_slice(name);
        tag.push(b'>');
        Some(tag)
    }
}

fn trim_line_breaks(document: Bytes) -> Bytes {
    let is_break = |b: &u8| *b == b'\r' || *b == b'\n';
    let start = document
        .iter()
        .position(|b| !is_break(b))
        .unwrap_or(document.len());
    let end = document
        .iter()
        .rposition(|b| !is_break(b))
        .map_or(start, |i| i + 1);
    document.slice(start..end)
}

impl MediaPayloadParser for OnvifMetadataPayloadParser {
    fn parse(
        &mut self,
        time_offset: Option<Duration>,
        payload: &[u8],
        _marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        let mut data = payload;
        if data.starts_with(XML_DECLARATION) {
            if let Some(end) = index_of(data, b"?>", 0) {
                data = &data[end + 2..];
            }
        }

        let searched = self.document.len();
        if let Err(e) = self.document.add_bytes(data) {
            self.document.reset();
            return Err(e);
        }

        let mut from = match self.end_tag.as_ref().map(Vec::len) {
            Some(tag_len) => searched.saturating_sub(tag_len - 1),
            None => {
                let Some(tag) = Self::detect_end_tag(self.document.accumulated()) else {
                    return Ok(());
                };
                log::debug!(
                    "ONVIF metadata root element is <{}>",
                    String::from_utf8_lossy(&tag[2..tag.len() - 1])
                );
                self.end_tag = Some(tag);
                0
            }
        };
        let Some(end_tag) = &self.end_tag else {
            return Ok(());
        };

        // The closing tag may straddle the previous packet
        while let Some(index) = index_of(self.document.accumulated(), end_tag, from) {
            let document = trim_line_breaks(self.document.split_to(index + end_tag.len()));
            let timestamp = self.clock.timestamp(time_offset);
            sink.on_frame(RawFrame::new(timestamp, document, FrameKind::OnvifMetadata));
            from = 0;
        }
        Ok(())
    }

    fn reset_state(&mut self) {
        self.end_tag = None;
        self.document.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn documents(parser: &mut OnvifMetadataPayloadParser, packets: &[&[u8]]) -> Vec<String> {
        let mut frames = Vec::new();
        let mut sink = |frame: RawFrame| frames.push(frame);
        for packet in packets {
            parser.parse(None, packet, false, &mut sink).unwrap();
        }
        frames
            .into_iter()
            .map(|frame| String::from_utf8(frame.data.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_document_split_across_packets() {
        let mut parser = OnvifMetadataPayloadParser::new();
        let docs = documents(
            &mut parser,
            &[
                b"<?xml version=\"1.0\"?><tt:MetadataStream xmlns:tt=\"x\">",
                b"<tt:Event/>",
                b"</tt:MetadataStream>\r\n",
            ],
        );

        assert_eq!(
            docs,
            vec!["<tt:MetadataStream xmlns:tt=\"x\"><tt:Event/></tt:MetadataStream>".to_string()]
        );
    }

    #[test]
    fn test_closing_tag_split_across_packets() {
        let mut parser = OnvifMetadataPayloadParser::new();
        let docs = documents(
            &mut parser,
            &[
                b"<tt:MetadataStream>x</tt:Meta",
                b"dataStream>",
                b"<tt:MetadataStream>y</tt:MetadataStream>",
            ],
        );
        assert_eq!(
            docs,
            vec![
                "<tt:MetadataStream>x</tt:MetadataStream>",
                "<tt:MetadataStream>y</tt:MetadataStream>",
            ]
        );
    }

    #[test]
    fn test_multibyte_character_split_across_packets() {
        let text = "<m>é</m>".as_bytes();
        let mut parser = OnvifMetadataPayloadParser::new();
        // Split between the two bytes of 'é'
        let docs = documents(&mut parser, &[&text[..4], &text[4..]]);
        assert_eq!(docs, vec!["<m>é</m>"]);
    }

    #[test]
    fn test_leftover_starts_next_document() {
        let mut parser = OnvifMetadataPayloadParser::new();
        let docs = documents(&mut parser, &[b"<m>1</m><m>2", b"</m><m>3</m>"]);
        assert_eq!(docs, vec!["<m>1</m>", "<m>2</m>", "<m>3</m>"]);
    }

    #[test]
    fn test_reset_forgets_partial_document() {
        let mut parser = OnvifMetadataPayloadParser::new();
        assert!(documents(&mut parser, &[b"<a>partial"]).is_empty());
        parser.reset_state();
        assert_eq!(documents(&mut parser, &[b"<b>x</b>"]), vec!["<b>x</b>"]);
    }

    #[test]
    fn test_oversized_document_is_dropped() {
        let mut parser = OnvifMetadataPayloadParser::with_max_size(16);
        parser
            .parse(None, b"<m>0123456789", false, &mut |_: RawFrame| {})
            .unwrap();
        let err = parser
            .parse(None, b"abcdef", false, &mut |_: RawFrame| {})
            .unwrap_err();
        assert_eq!(err, ParserError::BufferOverflow { required: 19, max: 16 });

        assert_eq!(documents(&mut parser, &[b"<m>x</m>"]), vec!["<m>x</m>"]);
    }
}
