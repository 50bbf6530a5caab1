use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use super::types::{NALUnitHeader, NALUnitType, NAL_HEADER_SIZE};
use crate::av::{FrameKind, RawFrame};
use crate::codec::h264::START_MARKER;
use crate::codec::{FrameSink, ParserError};
use crate::utils::bytes::index_of;
use crate::utils::BitReader;

/// general_profile_space through general_level_idc
const GENERAL_PROFILE_TIER_LEVEL_BITS: u32 = 96;
const SUB_LAYER_PROFILE_BITS: u32 = 88;
const SUB_LAYER_LEVEL_BITS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParameterSet {
    Vps,
    Sps,
    Pps,
}

/// Assembles H.265 access units from individual NAL units.
///
/// VPS, SPS and PPS units are cached by id and attached to every I-frame.
/// A frame is emitted when the caller signals the end of an access unit,
/// or when NAL units with a new timestamp arrive while one is pending.
#[derive(Debug)]
pub struct H265Parser {
    vps_map: BTreeMap<u32, Bytes>,
    sps_map: BTreeMap<u32, Bytes>,
    pps_map: BTreeMap<u32, Bytes>,
    extra_data: Bytes,
    update_extra_data: bool,
    wait_for_iframe: bool,
    has_irap: bool,
    frame: BytesMut,
    frame_timestamp: Option<DateTime<Utc>>,
    buffer: BytesMut,
}

impl Default for H265Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl H265Parser {
    /// Creates a parser waiting for parameter sets and an I-frame
    pub fn new() -> Self {
        Self {
            vps_map: BTreeMap::new(),
            sps_map: BTreeMap::new(),
            pps_map: BTreeMap::new(),
            extra_data: Bytes::new(),
            update_extra_data: false,
            wait_for_iframe: true,
            has_irap: false,
            frame: BytesMut::with_capacity(8 * 1024),
            frame_timestamp: None,
            buffer: BytesMut::new(),
        }
    }

    /// Feeds one NAL unit, or a start-code prefixed run of them.
    pub fn parse(
        &mut self,
        timestamp: DateTime<Utc>,
        data: &[u8],
        generate_frame: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        if !self.frame.is_empty() && self.frame_timestamp != Some(timestamp) {
            if let Some(previous) = self.frame_timestamp {
                self.try_generate_frame(previous, sink);
            }
        }

        if data.starts_with(&START_MARKER) {
            let mut start = 0;
            while start < data.len() {
                let end = index_of(data, &START_MARKER, start + START_MARKER.len())
                    .unwrap_or(data.len());
                let nal_unit = &data[start..end];
                if nal_unit.len() > START_MARKER.len() {
                    sink.on_nal_unit(nal_unit);
                    self.process_nal_unit(timestamp, &nal_unit[START_MARKER.len()..])?;
                }
                start = end;
            }
        } else if !data.is_empty() {
            self.buffer.clear();
            self.buffer.put_slice(&START_MARKER);
            self.buffer.put_slice(data);
            sink.on_nal_unit(&self.buffer);
            self.process_nal_unit(timestamp, data)?;
        }

        if generate_frame {
            self.try_generate_frame(timestamp, sink);
        }
        Ok(())
    }

    /// Discards the current access unit and waits for the next I-frame.
    pub fn reset_state(&mut self) {
        self.frame.clear();
        self.frame_timestamp = None;
        self.has_irap = false;
        self.wait_for_iframe = true;
    }

    /// Start-code prefixed VPS, SPS and PPS units, in that order.
    ///
    /// Empty until at least one of each has been seen.
    pub fn extra_data(&mut self) -> &Bytes {
        self.rebuild_extra_data();
        &self.extra_data
    }

    /// Removes emulation prevention bytes (`00 00 03` becomes `00 00`).
    pub fn remove_emulation_prevention(&mut self, data: &[u8]) -> Bytes {
        self.buffer.clear();
        let mut zeros = 0;

        for &byte in data {
            if zeros >= 2 && byte == 0x03 {
                zeros = 0;
                continue;
            }
            zeros = if byte == 0 { zeros + 1 } else { 0 };
            self.buffer.put_u8(byte);
        }

        self.buffer.split().freeze()
    }

    fn process_nal_unit(
        &mut self,
        timestamp: DateTime<Utc>,
        nal_unit: &[u8],
    ) -> Result<(), ParserError> {
        let header = NALUnitHeader::parse(nal_unit)?;

        match NALUnitType::from(header.nal_type) {
            NALUnitType::Vps => return self.update_parameter_set(nal_unit, ParameterSet::Vps),
            NALUnitType::Sps => return self.update_parameter_set(nal_unit, ParameterSet::Sps),
            NALUnitType::Pps => return self.update_parameter_set(nal_unit, ParameterSet::Pps),
            NALUnitType::AggregationPacket
            | NALUnitType::FragmentationUnit
            | NALUnitType::PayloadContentInfo => {
                return Err(ParserError::InvalidNalUnit(format!(
                    "packetization unit type {} inside the bitstream",
                    header.nal_type
                )));
            }
            _ => {}
        }

        if !header.is_vcl() {
            return Ok(());
        }

        self.has_irap |= header.is_irap();
        self.frame_timestamp = Some(timestamp);
        self.frame.put_slice(&START_MARKER);
        self.frame.put_slice(nal_unit);
        Ok(())
    }

    fn update_parameter_set(
        &mut self,
        nal_unit: &[u8],
        kind: ParameterSet,
    ) -> Result<(), ParserError> {
        let rbsp = self.remove_emulation_prevention(&nal_unit[NAL_HEADER_SIZE..]);
        let id = match kind {
            ParameterSet::Vps => read_vps_id(&rbsp),
            ParameterSet::Sps => read_sps_id(&rbsp),
            ParameterSet::Pps => read_pps_id(&rbsp),
        }
        .ok_or_else(|| ParserError::InvalidNalUnit(format!("truncated {:?}", kind)))?;

        let map = match kind {
            ParameterSet::Vps => &mut self.vps_map,
            ParameterSet::Sps => &mut self.sps_map,
            ParameterSet::Pps => &mut self.pps_map,
        };

        if map.get(&id).map(|known| &known[..]) != Some(nal_unit) {
            log::debug!("H265 {:?} {} updated ({} bytes)", kind, id, nal_unit.len());
            map.insert(id, Bytes::copy_from_slice(nal_unit));
            self.update_extra_data = true;
        }
        Ok(())
    }

    fn rebuild_extra_data(&mut self) {
        if !self.update_extra_data {
            return;
        }
        self.update_extra_data = false;

        if self.vps_map.is_empty() || self.sps_map.is_empty() || self.pps_map.is_empty() {
            self.extra_data = Bytes::new();
            return;
        }

        let mut extra = BytesMut::new();
        let sets = self
            .vps_map
            .values()
            .chain(self.sps_map.values())
            .chain(self.pps_map.values());
        for set in sets {
            extra.put_slice(&START_MARKER);
            extra.put_slice(set);
        }
        self.extra_data = extra.freeze();
    }

    fn try_generate_frame(&mut self, timestamp: DateTime<Utc>, sink: &mut dyn FrameSink) {
        let is_iframe = std::mem::take(&mut self.has_irap);
        self.frame_timestamp = None;
        if self.frame.is_empty() {
            return;
        }
        let data = self.frame.split().freeze();

        self.rebuild_extra_data();
        if is_iframe {
            if self.extra_data.is_empty() {
                log::debug!("Dropping H265 I-frame received before parameter sets");
                return;
            }
            self.wait_for_iframe = false;
            sink.on_frame(RawFrame::new(
                timestamp,
                data,
                FrameKind::H265IFrame {
                    vps_sps_pps: self.extra_data.clone(),
                },
            ));
        } else if !self.wait_for_iframe {
            sink.on_frame(RawFrame::new(timestamp, data, FrameKind::H265PFrame));
        }
    }
}

/// vps_video_parameter_set_id, the first four bits of the RBSP
fn read_vps_id(rbsp: &[u8]) -> Option<u32> {
    BitReader::new(rbsp).read_bits(4).ok()
}

fn read_sps_id(rbsp: &[u8]) -> Option<u32> {
    let mut reader = BitReader::new(rbsp);
    reader.skip_bits(4).ok()?; // sps_video_parameter_set_id
    let max_sub_layers_minus1 = reader.read_bits(3).ok()?;
    reader.skip_bits(1).ok()?; // sps_temporal_id_nesting_flag
    skip_profile_tier_level(&mut reader, max_sub_layers_minus1)?;
    reader.read_golomb().ok()
}

fn read_pps_id(rbsp: &[u8]) -> Option<u32> {
    BitReader::new(rbsp).read_golomb().ok()
}

fn skip_profile_tier_level(reader: &mut BitReader, max_sub_layers_minus1: u32) -> Option<()> {
    reader.skip_bits(GENERAL_PROFILE_TIER_LEVEL_BITS).ok()?;

    let mut present = Vec::with_capacity(max_sub_layers_minus1 as usize);
    for _ in 0..max_sub_layers_minus1 {
        let profile = reader.read_bit().ok()?;
        let level = reader.read_bit().ok()?;
        present.push((profile, level));
    }
    if max_sub_layers_minus1 > 0 {
        reader.skip_bits(2 * (8 - max_sub_layers_minus1)).ok()?;
    }
    for (profile, level) in present {
        if profile {
            reader.skip_bits(SUB_LAYER_PROFILE_BITS).ok()?;
        }
        if level {
            reader.skip_bits(SUB_LAYER_LEVEL_BITS).ok()?;
        }
    }
    Some(())
}
