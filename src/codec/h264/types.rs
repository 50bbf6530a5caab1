/// Start code placed in front of every NAL unit handed to the application
pub const START_MARKER: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// First byte of an H.264 NAL unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NALUnitHeader {
    /// nal_ref_idc, zero for disposable units
    pub nal_ref_idc: u8,
    /// nal_unit_type
    pub nal_type: u8,
}

impl NALUnitHeader {
    /// Splits a header byte into its fields
    pub fn new(header: u8) -> Self {
        Self {
            nal_ref_idc: (header >> 5) & 0x03,
            nal_type: header & 0x1F,
        }
    }

    /// Coded slice of an IDR or non-IDR picture
    pub fn is_slice(&self) -> bool {
        self.nal_type == 1 || self.nal_type == 5
    }
}

/// NAL unit types, including the RTP packetization types of RFC 6184
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    /// Types 0 and 30-31
    Unspecified,
    /// Non-IDR coded slice
    CodedSliceNonIDR,
    /// Data partitions A to C
    CodedSliceDataPartition,
    /// IDR coded slice
    CodedSliceIDR,
    /// Supplemental enhancement information
    SEI,
    /// Sequence parameter set
    SPS,
    /// Picture parameter set
    PPS,
    /// Any other single NAL unit type up to 23
    Other,
    /// Single-time aggregation packet A
    StapA,
    /// Single-time aggregation packet B
    StapB,
    /// Multi-time aggregation packet, 16-bit timestamp offsets
    Mtap16,
    /// Multi-time aggregation packet, 24-bit timestamp offsets
    Mtap24,
    /// Fragmentation unit A
    FuA,
    /// Fragmentation unit B
    FuB,
}

impl From<u8> for NALUnitType {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            1 => NALUnitType::CodedSliceNonIDR,
            2..=4 => NALUnitType::CodedSliceDataPartition,
            5 => NALUnitType::CodedSliceIDR,
            6 => NALUnitType::SEI,
            7 => NALUnitType::SPS,
            8 => NALUnitType::PPS,
            9..=23 => NALUnitType::Other,
            24 => NALUnitType::StapA,
            25 => NALUnitType::StapB,
            26 => NALUnitType::Mtap16,
            27 => NALUnitType::Mtap24,
            28 => NALUnitType::FuA,
            29 => NALUnitType::FuB,
            _ => NALUnitType::Unspecified,
        }
    }
}
