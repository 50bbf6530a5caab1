use bytes::Bytes;

use crate::av::MediaKind;

/// G.711 companding law
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum G711Law {
    /// PCMA
    ALaw,
    /// PCMU
    MuLaw,
}

/// Codec parameters of one track, taken from the session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecInfo {
    /// H.264 video
    H264 {
        /// Start-code prefixed parameter sets from `sprop-parameter-sets`
        sprop_parameter_sets: Bytes,
    },
    /// H.265 video
    H265 {
        /// Video parameter set from `sprop-vps`
        vps: Bytes,
        /// Sequence parameter set from `sprop-sps`
        sps: Bytes,
        /// Picture parameter set from `sprop-pps`
        pps: Bytes,
        /// Payloads carry DONL fields (`sprop-max-don-diff` > 0)
        has_donl: bool,
    },
    /// RFC 2435 Motion JPEG
    MJPEG,
    /// MPEG-4 AAC in RFC 3640 high bitrate mode
    AAC {
        /// AudioSpecificConfig bytes
        config: Bytes,
        /// Bits of the AU-size field
        size_length: u32,
        /// Bits of the AU-Index field
        index_length: u32,
        /// Bits of the AU-Index-delta field
        index_delta_length: u32,
    },
    /// G.711 audio
    G711 {
        /// Companding law
        law: G711Law,
        /// Samples per second
        sample_rate: u32,
        /// Channel count
        channels: u8,
    },
    /// G.726 audio
    G726 {
        /// Bits per second
        bitrate: u32,
        /// Samples per second
        sample_rate: u32,
        /// Channel count
        channels: u8,
    },
    /// Linear PCM (L8/L16)
    PCM {
        /// Samples per second
        sample_rate: u32,
        /// Bits per sample
        bits_per_sample: u8,
        /// Channel count
        channels: u8,
    },
    /// ONVIF metadata stream
    OnvifMetadata,
}

impl CodecInfo {
    /// Media category used to filter tracks before SETUP
    pub fn media_kind(&self) -> MediaKind {
        match self {
            CodecInfo::H264 { .. } | CodecInfo::H265 { .. } | CodecInfo::MJPEG => MediaKind::Video,
            CodecInfo::AAC { .. }
            | CodecInfo::G711 { .. }
            | CodecInfo::G726 { .. }
            | CodecInfo::PCM { .. } => MediaKind::Audio,
            CodecInfo::OnvifMetadata => MediaKind::Data,
        }
    }
}
