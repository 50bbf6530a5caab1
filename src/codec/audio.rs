//! Pass-through parsers for uncompressed and sample-based audio.
//!
//! G.711, G.726 and linear PCM payloads need no reassembly. Each RTP
//! payload becomes one frame tagged with the track's static format.

use bytes::Bytes;
use chrono::Duration;

use crate::av::{FrameKind, RawFrame};
use crate::codec::{FrameClock, FrameSink, G711Law, MediaPayloadParser, ParserError};

/// Bits per coded G.726 sample for a bitrate in bits per second
pub fn g726_bits_per_coded_sample(bitrate: u32) -> Option<u8> {
    match bitrate {
        16000 => Some(2),
        24000 => Some(3),
        32000 => Some(4),
        40000 => Some(5),
        _ => None,
    }
}

/// Wraps every payload in a frame of one fixed kind.
#[derive(Debug)]
struct PassThrough {
    clock: FrameClock,
    kind: FrameKind,
}

impl PassThrough {
    fn new(kind: FrameKind) -> Self {
        Self {
            clock: FrameClock::default(),
            kind,
        }
    }

    fn emit(&mut self, time_offset: Option<Duration>, payload: &[u8], sink: &mut dyn FrameSink) {
        if payload.is_empty() {
            return;
        }
        let timestamp = self.clock.timestamp(time_offset);
        sink.on_frame(RawFrame::new(
            timestamp,
            Bytes::copy_from_slice(payload),
            self.kind.clone(),
        ));
    }
}

/// RTP payload parser for G.711 A-law and mu-law
#[derive(Debug)]
pub struct G711AudioPayloadParser(PassThrough);

impl G711AudioPayloadParser {
    /// Creates a parser for the given companding law
    pub fn new(law: G711Law, sample_rate: u32, channels: u8) -> Self {
        let kind = match law {
            G711Law::ALaw => FrameKind::G711A {
                sample_rate,
                channels,
            },
            G711Law::MuLaw => FrameKind::G711U {
                sample_rate,
                channels,
            },
        };
        Self(PassThrough::new(kind))
    }
}

/// RTP payload parser for G.726 ADPCM
#[derive(Debug)]
pub struct G726AudioPayloadParser(PassThrough);

impl G726AudioPayloadParser {
    /// Creates a parser for a 16, 24, 32 or 40 kbit/s stream.
    ///
    /// # Errors
    ///
    /// Any other bitrate is [`ParserError::InvalidConfig`].
    pub fn new(bitrate: u32, sample_rate: u32, channels: u8) -> Result<Self, ParserError> {
        let bits_per_coded_sample = g726_bits_per_coded_sample(bitrate).ok_or_else(|| {
            ParserError::InvalidConfig(format!("unsupported G726 bitrate {}", bitrate))
        })?;

        Ok(Self(PassThrough::new(FrameKind::G726 {
            bits_per_coded_sample,
            sample_rate,
            channels,
        })))
    }
}

/// RTP payload parser for linear PCM (L8 and L16)
#[derive(Debug)]
pub struct PCMAudioPayloadParser(PassThrough);

impl PCMAudioPayloadParser {
    /// Creates a parser for the given sample format
    pub fn new(sample_rate: u32, bits_per_sample: u8, channels: u8) -> Self {
        Self(PassThrough::new(FrameKind::PCM {
            sample_rate,
            bits_per_sample,
            channels,
        }))
    }
}

macro_rules! impl_pass_through {
    ($($parser:ty),+) => {
        $(
            impl MediaPayloadParser for $parser {
                fn parse(
                    &mut self,
                    time_offset: Option<Duration>,
                    payload: &[u8],
                    _marker: bool,
                    sink: &mut dyn FrameSink,
                ) -> Result<(), ParserError> {
                    self.0.emit(time_offset, payload, sink);
                    Ok(())
                }

                fn reset_state(&mut self) {}
            }
        )+
    };
}

impl_pass_through!(
    G711AudioPayloadParser,
    G726AudioPayloadParser,
    PCMAudioPayloadParser
);
