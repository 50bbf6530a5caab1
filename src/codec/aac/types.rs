use crate::codec::ParserError;
use crate::utils::BitReader;

/// MPEG-4 audio object types found in RTSP cameras
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    /// AAC Main
    Main,
    /// AAC Low Complexity
    LC,
    /// AAC Scalable Sample Rate
    SSR,
    /// AAC Long Term Prediction
    LTP,
    /// High-Efficiency AAC (SBR)
    HE,
    /// Any other audio object type
    Other(u8),
}

impl From<u8> for ProfileType {
    fn from(value: u8) -> Self {
        match value {
            1 => ProfileType::Main,
            2 => ProfileType::LC,
            3 => ProfileType::SSR,
            4 => ProfileType::LTP,
            5 => ProfileType::HE,
            other => ProfileType::Other(other),
        }
    }
}

/// Sample rate for a sampling frequency index
pub fn sample_rate(index: u8) -> Option<u32> {
    match index {
        0 => Some(96000),
        1 => Some(88200),
        2 => Some(64000),
        3 => Some(48000),
        4 => Some(44100),
        5 => Some(32000),
        6 => Some(24000),
        7 => Some(22050),
        8 => Some(16000),
        9 => Some(12000),
        10 => Some(11025),
        11 => Some(8000),
        12 => Some(7350),
        _ => None,
    }
}

/// The leading fields of an MPEG-4 AudioSpecificConfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type
    pub profile: ProfileType,
    /// Samples per second
    pub sample_rate: u32,
    /// Channel configuration, 0 meaning defined in-band
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// Reads the object type, sampling frequency and channel configuration.
    pub fn parse(data: &[u8]) -> Result<Self, ParserError> {
        let invalid = |_| ParserError::InvalidConfig("truncated AudioSpecificConfig".into());
        let mut reader = BitReader::new(data);

        let mut object_type = reader.read_bits(5).map_err(invalid)? as u8;
        if object_type == 31 {
            object_type = 32 + reader.read_bits(6).map_err(invalid)? as u8;
        }

        let index = reader.read_bits(4).map_err(invalid)? as u8;
        let sample_rate = if index == 0x0f {
            reader.read_bits(24).map_err(invalid)?
        } else {
            sample_rate(index).ok_or_else(|| {
                ParserError::InvalidConfig(format!("reserved sampling frequency index {}", index))
            })?
        };

        let channel_configuration = reader.read_bits(4).map_err(invalid)? as u8;

        Ok(Self {
            profile: ProfileType::from(object_type),
            sample_rate,
            channel_configuration,
        })
    }
}
