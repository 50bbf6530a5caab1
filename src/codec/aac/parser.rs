use bytes::Bytes;
use chrono::Duration;

use super::types::AudioSpecificConfig;
use crate::av::{FrameKind, RawFrame};
use crate::codec::{FrameClock, FrameSink, MediaPayloadParser, ParserError};
use crate::utils::bytes::read_u16_be;
use crate::utils::BitReader;

const AU_HEADERS_LENGTH_SIZE: usize = 2;

/// RTP payload parser for MPEG-4 AAC in `mpeg4-generic` mode (RFC 3640).
///
/// Every access unit in a packet becomes one frame carrying the
/// AudioSpecificConfig from the session description.
#[derive(Debug)]
pub struct AACAudioPayloadParser {
    clock: FrameClock,
    config: Bytes,
    size_length: u32,
    index_length: u32,
    index_delta_length: u32,
}

impl AACAudioPayloadParser {
    /// Creates a parser for the AU header layout given in the `fmtp` line.
    ///
    /// # Errors
    ///
    /// Returns [`ParserError::InvalidConfig`] when `size_length` is zero or
    /// any field is wider than 32 bits.
    pub fn new(
        config: Bytes,
        size_length: u32,
        index_length: u32,
        index_delta_length: u32,
    ) -> Result<Self, ParserError> {
        if size_length == 0 || size_length > 32 || index_length > 32 || index_delta_length > 32 {
            return Err(ParserError::InvalidConfig(format!(
                "unusable AU header layout sizeLength={} indexLength={} indexDeltaLength={}",
                size_length, index_length, index_delta_length
            )));
        }

        match AudioSpecificConfig::parse(&config) {
            Ok(asc) => log::debug!(
                "AAC {:?} at {} Hz, channel configuration {}",
                asc.profile,
                asc.sample_rate,
                asc.channel_configuration
            ),
            Err(e) => log::warn!("Passing through unreadable AAC config: {}", e),
        }

        Ok(Self {
            clock: FrameClock::default(),
            config,
            size_length,
            index_length,
            index_delta_length,
        })
    }
}

impl MediaPayloadParser for AACAudioPayloadParser {
    fn parse(
        &mut self,
        time_offset: Option<Duration>,
        payload: &[u8],
        _marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        let headers_bits = read_u16_be(payload, 0)
            .ok_or(ParserError::Truncated("AU-headers-length"))? as u32;

        let first_header_bits = self.size_length + self.index_length;
        if headers_bits < first_header_bits {
            return Ok(());
        }
        let next_header_bits = self.size_length + self.index_delta_length;
        let frames_count = 1 + (headers_bits - first_header_bits) / next_header_bits;

        let headers = payload
            .get(AU_HEADERS_LENGTH_SIZE..)
            .ok_or(ParserError::Truncated("AU headers"))?;
        let mut reader = BitReader::new(headers);
        let mut offset = AU_HEADERS_LENGTH_SIZE + headers_bits.div_ceil(8) as usize;
        let timestamp = self.clock.timestamp(time_offset);

        for i in 0..frames_count {
            let truncated = |_| ParserError::Truncated("AU header");
            let frame_size = reader.read_bits(self.size_length).map_err(truncated)? as usize;
            let index_bits = if i == 0 {
                self.index_length
            } else {
                self.index_delta_length
            };
            reader.skip_bits(index_bits).map_err(truncated)?;

            let frame = payload
                .get(offset..offset + frame_size)
                .ok_or(ParserError::Truncated("access unit"))?;
            offset += frame_size;

            sink.on_frame(RawFrame::new(
                timestamp,
                Bytes::copy_from_slice(frame),
                FrameKind::AAC {
                    config: self.config.clone(),
                },
            ));
        }
        Ok(())
    }

    fn reset_state(&mut self) {}
}
