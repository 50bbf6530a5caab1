use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Broad media category of a track or frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Video frames
    Video,
    /// Audio frames
    Audio,
    /// Metadata and other data streams
    Data,
}

/// What a frame contains, plus the side data needed to decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// H.264 access unit starting with an intra slice
    H264IFrame {
        /// Start-code prefixed SPS and PPS NAL units
        sps_pps: Bytes,
    },
    /// H.264 access unit made of prediction slices
    H264PFrame,
    /// H.265 access unit containing an IRAP picture
    H265IFrame {
        /// Start-code prefixed VPS, SPS and PPS NAL units
        vps_sps_pps: Bytes,
    },
    /// H.265 non-IRAP access unit
    H265PFrame,
    /// Complete JPEG image including a reconstructed header
    JPEG,
    /// One AAC access unit
    AAC {
        /// AudioSpecificConfig from the session description
        config: Bytes,
    },
    /// G.711 A-law samples
    G711A {
        /// Samples per second
        sample_rate: u32,
        /// Channel count
        channels: u8,
    },
    /// G.711 mu-law samples
    G711U {
        /// Samples per second
        sample_rate: u32,
        /// Channel count
        channels: u8,
    },
    /// G.726 ADPCM samples
    G726 {
        /// Bits per coded sample, 2 to 5
        bits_per_coded_sample: u8,
        /// Samples per second
        sample_rate: u32,
        /// Channel count
        channels: u8,
    },
    /// Linear PCM samples
    PCM {
        /// Samples per second
        sample_rate: u32,
        /// Bits per sample
        bits_per_sample: u8,
        /// Channel count
        channels: u8,
    },
    /// One ONVIF metadata XML document
    OnvifMetadata,
}

impl FrameKind {
    /// Media category of this frame
    pub fn media_kind(&self) -> MediaKind {
        match self {
            FrameKind::H264IFrame { .. }
            | FrameKind::H264PFrame
            | FrameKind::H265IFrame { .. }
            | FrameKind::H265PFrame
            | FrameKind::JPEG => MediaKind::Video,
            FrameKind::AAC { .. }
            | FrameKind::G711A { .. }
            | FrameKind::G711U { .. }
            | FrameKind::G726 { .. }
            | FrameKind::PCM { .. } => MediaKind::Audio,
            FrameKind::OnvifMetadata => MediaKind::Data,
        }
    }

    /// Returns true for frames a decoder can start from
    pub fn is_key_frame(&self) -> bool {
        matches!(
            self,
            FrameKind::H264IFrame { .. } | FrameKind::H265IFrame { .. } | FrameKind::JPEG
        )
    }
}

/// A complete elementary frame produced by a payload parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Wall-clock time of the frame
    pub timestamp: DateTime<Utc>,
    /// Frame bytes. Video frames carry start-code prefixed NAL units.
    pub data: Bytes,
    /// Frame type and side data
    pub kind: FrameKind,
}

impl RawFrame {
    /// Creates a frame
    pub fn new(timestamp: DateTime<Utc>, data: Bytes, kind: FrameKind) -> Self {
        Self {
            timestamp,
            data,
            kind,
        }
    }

    /// Media category of this frame
    pub fn media_kind(&self) -> MediaKind {
        self.kind.media_kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_classification() {
        let frame = RawFrame::new(Utc::now(), Bytes::from_static(&[1, 2]), FrameKind::H264PFrame);
        assert_eq!(frame.media_kind(), MediaKind::Video);
        assert!(!frame.kind.is_key_frame());

        let kind = FrameKind::G726 {
            bits_per_coded_sample: 4,
            sample_rate: 8000,
            channels: 1,
        };
        assert_eq!(kind.media_kind(), MediaKind::Audio);
        assert_eq!(FrameKind::OnvifMetadata.media_kind(), MediaKind::Data);
        assert!(FrameKind::JPEG.is_key_frame());
    }
}
