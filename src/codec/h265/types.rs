use crate::codec::ParserError;

/// Size of the two-byte H.265 NAL unit header
pub const NAL_HEADER_SIZE: usize = 2;

/// Two-byte H.265 NAL unit header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NALUnitHeader {
    /// nal_unit_type, 6 bits
    pub nal_type: u8,
    /// nuh_layer_id, 6 bits
    pub layer_id: u8,
    /// nuh_temporal_id_plus1, 3 bits
    pub temporal_id_plus1: u8,
}

impl NALUnitHeader {
    /// Splits the first two bytes of a NAL unit into header fields.
    ///
    /// Rejects a set forbidden bit, a non-zero layer id and a zero
    /// temporal id. Only the base layer is supported.
    pub fn parse(data: &[u8]) -> Result<Self, ParserError> {
        let (b0, b1) = match data {
            [b0, b1, ..] => (*b0, *b1),
            _ => return Err(ParserError::Truncated("H265 NAL unit header")),
        };

        if b0 & 0x80 != 0 {
            return Err(ParserError::InvalidNalUnit("forbidden bit set".into()));
        }

        let header = Self {
            nal_type: (b0 >> 1) & 0x3F,
            layer_id: ((b0 & 0x01) << 5) | (b1 >> 3),
            temporal_id_plus1: b1 & 0x07,
        };

        if header.layer_id != 0 {
            return Err(ParserError::InvalidNalUnit(format!(
                "unsupported layer id {}",
                header.layer_id
            )));
        }
        if header.temporal_id_plus1 == 0 {
            return Err(ParserError::InvalidNalUnit("temporal id plus one is zero".into()));
        }
        Ok(header)
    }

    /// Video coding layer unit (types 0 to 31)
    pub fn is_vcl(&self) -> bool {
        self.nal_type < 32
    }

    /// Intra random access point picture (types 16 to 21)
    pub fn is_irap(&self) -> bool {
        (16..=21).contains(&self.nal_type)
    }
}

/// H.265 NAL unit types, including the RTP packetization types of RFC 7798
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NALUnitType {
    /// Trailing, TSA, STSA, RADL and RASL pictures (0 to 9)
    NonIrapPicture,
    /// Reserved VCL types (10 to 15, 22 to 31)
    ReservedVcl,
    /// Broken link access (16 to 18)
    Bla,
    /// Instantaneous decoding refresh (19 and 20)
    Idr,
    /// Clean random access (21)
    Cra,
    /// Video parameter set
    Vps,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    /// End of sequence, end of bitstream and filler data
    EndOrFiller,
    /// Prefix or suffix supplemental enhancement information
    Sei,
    /// Reserved and unspecified non-VCL types
    Other,
    /// Aggregation packet
    AggregationPacket,
    /// Fragmentation unit
    FragmentationUnit,
    /// Payload content information
    PayloadContentInfo,
}

impl From<u8> for NALUnitType {
    fn from(value: u8) -> Self {
        match value & 0x3F {
            0..=9 => NALUnitType::NonIrapPicture,
            16..=18 => NALUnitType::Bla,
            19 | 20 => NALUnitType::Idr,
            21 => NALUnitType::Cra,
            10..=15 | 22..=31 => NALUnitType::ReservedVcl,
            32 => NALUnitType::Vps,
            33 => NALUnitType::Sps,
            34 => NALUnitType::Pps,
            35 => NALUnitType::Aud,
            36..=38 => NALUnitType::EndOrFiller,
            39 | 40 => NALUnitType::Sei,
            48 => NALUnitType::AggregationPacket,
            49 => NALUnitType::FragmentationUnit,
            50 => NALUnitType::PayloadContentInfo,
            _ => NALUnitType::Other,
        }
    }
}
