//! # Media Payload Parsers
//!
//! Each negotiated track gets one [`MediaPayloadParser`], chosen from its
//! [`CodecInfo`] by [`create_parser`]. The parser receives RTP payloads in
//! sequence order and pushes complete [`RawFrame`]s into a [`FrameSink`].
//!
//! ```rust
//! use bytes::Bytes;
//! use rtspio::av::{FrameKind, RawFrame};
//! use rtspio::codec::{create_parser, CodecInfo, G711Law};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let info = CodecInfo::G711 {
//!     law: G711Law::MuLaw,
//!     sample_rate: 8000,
//!     channels: 1,
//! };
//! let mut parser = create_parser(&info)?;
//!
//! let mut frames = Vec::new();
//! let mut sink = |frame: RawFrame| frames.push(frame);
//! parser.parse(None, &[0xff; 160], true, &mut sink)?;
//!
//! assert!(matches!(frames[0].kind, FrameKind::G711U { .. }));
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::av::RawFrame;

pub mod aac;
pub mod audio;
pub mod h264;
pub mod h265;
mod info;
pub mod mjpeg;
pub mod onvif;

pub use info::{CodecInfo, G711Law};

/// Errors raised while turning RTP payloads into frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParserError {
    /// NAL unit header or content is not valid
    #[error("invalid NAL unit: {0}")]
    InvalidNalUnit(String),

    /// A frame outgrew the assembly buffer
    #[error("frame of {required} bytes exceeds the {max} byte limit")]
    BufferOverflow {
        /// Bytes the frame would need
        required: usize,
        /// Hard buffer limit
        max: usize,
    },

    /// Payload ended before a length field said it would
    #[error("truncated payload: {0}")]
    Truncated(&'static str),

    /// No parser exists for the codec
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Codec parameters can never produce a working parser
    #[error("invalid codec configuration: {0}")]
    InvalidConfig(String),
}

/// Receives the output of a payload parser.
///
/// Any `FnMut(RawFrame)` closure is a sink. Implement the trait directly to
/// also observe individual NAL units.
pub trait FrameSink {
    /// Called once per completed frame
    fn on_frame(&mut self, frame: RawFrame);

    /// Called with every complete, start-code prefixed H.264/H.265 NAL unit
    fn on_nal_unit(&mut self, _nal_unit: &[u8]) {}
}

impl<F: FnMut(RawFrame)> FrameSink for F {
    fn on_frame(&mut self, frame: RawFrame) {
        self(frame)
    }
}

/// Converts the RTP payloads of one track into frames.
pub trait MediaPayloadParser: Send {
    /// Consumes one RTP payload.
    ///
    /// `time_offset` is the media time since the first packet of the track.
    /// `None` stamps frames with the current time instead.
    fn parse(
        &mut self,
        time_offset: Option<Duration>,
        payload: &[u8],
        marker: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError>;

    /// Drops any partially assembled frame. Called after packet loss.
    fn reset_state(&mut self);
}

/// Maps media time offsets to wall-clock timestamps.
#[derive(Debug, Default, Clone)]
pub(crate) struct FrameClock {
    base: Option<DateTime<Utc>>,
}

impl FrameClock {
    /// The base time is captured on the first offset seen.
    pub(crate) fn timestamp(&mut self, time_offset: Option<Duration>) -> DateTime<Utc> {
        match time_offset {
            Some(offset) => *self.base.get_or_insert_with(Utc::now) + offset,
            None => Utc::now(),
        }
    }
}

/// Creates the payload parser for a codec.
///
/// # Errors
///
/// Returns [`ParserError::InvalidConfig`] for parameters no stream could
/// satisfy, such as a G.726 bitrate outside 16, 24, 32 and 40 kbit/s.
pub fn create_parser(info: &CodecInfo) -> Result<Box<dyn MediaPayloadParser>, ParserError> {
    Ok(match info {
        CodecInfo::H264 {
            sprop_parameter_sets,
        } => Box::new(h264::H264VideoPayloadParser::new(sprop_parameter_sets)?),
        CodecInfo::H265 {
            vps,
            sps,
            pps,
            has_donl,
        } => Box::new(h265::H265VideoPayloadParser::new(vps, sps, pps, *has_donl)?),
        CodecInfo::MJPEG => Box::new(mjpeg::MJPEGVideoPayloadParser::new()),
        CodecInfo::AAC {
            config,
            size_length,
            index_length,
            index_delta_length,
        } => Box::new(aac::AACAudioPayloadParser::new(
            config.clone(),
            *size_length,
            *index_length,
            *index_delta_length,
        )?),
        CodecInfo::G711 {
            law,
            sample_rate,
            channels,
        } => Box::new(audio::G711AudioPayloadParser::new(
            *law,
            *sample_rate,
            *channels,
        )),
        CodecInfo::G726 {
            bitrate,
            sample_rate,
            channels,
        } => Box::new(audio::G726AudioPayloadParser::new(
            *bitrate,
            *sample_rate,
            *channels,
        )?),
        CodecInfo::PCM {
            sample_rate,
            bits_per_sample,
            channels,
        } => Box::new(audio::PCMAudioPayloadParser::new(
            *sample_rate,
            *bits_per_sample,
            *channels,
        )),
        CodecInfo::OnvifMetadata => Box::new(onvif::OnvifMetadataPayloadParser::new()),
    })
}

/// Sink that records everything a parser emits.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct Collector {
    pub(crate) frames: Vec<RawFrame>,
    pub(crate) nal_units: Vec<Vec<u8>>,
}

#[cfg(test)]
impl FrameSink for Collector {
    fn on_frame(&mut self, frame: RawFrame) {
        self.frames.push(frame);
    }

    fn on_nal_unit(&mut self, nal_unit: &[u8]) {
        self.nal_units.push(nal_unit.to_vec());
    }
}
