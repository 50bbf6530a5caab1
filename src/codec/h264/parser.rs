use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};

use super::types::{NALUnitHeader, START_MARKER};
use crate::av::{FrameKind, RawFrame};
use crate::codec::{FrameSink, ParserError};
use crate::utils::bytes::index_of;
use crate::utils::BitReader;

const SPS_MIN_SIZE: usize = 5;
const PPS_MIN_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameType {
    Intra,
    Prediction,
    Unknown,
}

impl FrameType {
    fn from_slice_type(slice_type: u32) -> Self {
        match slice_type {
            2 | 7 => FrameType::Intra,
            0 | 5 => FrameType::Prediction,
            _ => FrameType::Unknown,
        }
    }
}

/// Splits a start-code prefixed buffer into NAL units.
///
/// Each item keeps its start code. A coded slice (type 1 or 5) is assumed
/// to run to the end of the buffer, so slice data is never scanned.
pub struct H264Slicer<'a> {
    data: &'a [u8],
    position: Option<usize>,
}

impl<'a> H264Slicer<'a> {
    /// Starts slicing at the first start code in `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: index_of(data, &START_MARKER, 0),
        }
    }
}

impl<'a> Iterator for H264Slicer<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            let start = self.position?;
            let tail = &self.data[start..];
            if tail.len() <= START_MARKER.len() {
                self.position = None;
                return None;
            }

            if NALUnitHeader::new(tail[START_MARKER.len()]).is_slice() {
                self.position = None;
                return Some(tail);
            }

            match index_of(self.data, &START_MARKER, start + START_MARKER.len()) {
                Some(next) => {
                    self.position = Some(next);
                    if next - start != START_MARKER.len() {
                        return Some(&self.data[start..next]);
                    }
                }
                None => {
                    self.position = None;
                    return Some(tail);
                }
            }
        }
    }
}

/// Assembles H.264 access units from individual NAL units.
///
/// SPS and PPS units are cached by id and prepended as side data to every
/// I-frame. P-frames are held back until the first I-frame is seen.
#[derive(Debug)]
pub struct H264Parser {
    sps_map: BTreeMap<u32, Bytes>,
    pps_map: BTreeMap<u32, Bytes>,
    sps_pps: Bytes,
    update_sps_pps: bool,
    wait_for_iframe: bool,
    slice_type: Option<u32>,
    frame: BytesMut,
    scratch: BytesMut,
}

impl Default for H264Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl H264Parser {
    /// Creates a parser waiting for parameter sets and an I-frame
    pub fn new() -> Self {
        Self {
            sps_map: BTreeMap::new(),
            pps_map: BTreeMap::new(),
            sps_pps: Bytes::new(),
            update_sps_pps: false,
            wait_for_iframe: true,
            slice_type: None,
            frame: BytesMut::with_capacity(8 * 1024),
            scratch: BytesMut::new(),
        }
    }

    /// Feeds one NAL unit, or a start-code prefixed run of them.
    ///
    /// With `generate_frame` set, the accumulated access unit is emitted
    /// once `data` has been processed.
    pub fn parse(
        &mut self,
        timestamp: DateTime<Utc>,
        data: &[u8],
        generate_frame: bool,
        sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        if data.starts_with(&START_MARKER) {
            for nal_unit in H264Slicer::new(data) {
                sink.on_nal_unit(nal_unit);
                self.process_nal_unit(&nal_unit[START_MARKER.len()..])?;
            }
        } else if !data.is_empty() {
            self.scratch.clear();
            self.scratch.extend_from_slice(&START_MARKER);
            self.scratch.extend_from_slice(data);
            sink.on_nal_unit(&self.scratch);
            self.process_nal_unit(data)?;
        }

        if generate_frame {
            self.try_generate_frame(timestamp, sink);
        }
        Ok(())
    }

    /// Discards the current access unit and waits for the next I-frame.
    pub fn reset_state(&mut self) {
        self.frame.clear();
        self.slice_type = None;
        self.wait_for_iframe = true;
    }

    /// Start-code prefixed SPS and PPS units, SPS first.
    pub fn sps_pps(&mut self) -> &Bytes {
        self.rebuild_sps_pps();
        &self.sps_pps
    }

    fn process_nal_unit(&mut self, nal_unit: &[u8]) -> Result<(), ParserError> {
        let Some(&first) = nal_unit.first() else {
            return Ok(());
        };
        let header = NALUnitHeader::new(first);

        if !(1..24).contains(&header.nal_type) {
            return Err(ParserError::InvalidNalUnit(format!(
                "unexpected nal unit type {}",
                header.nal_type
            )));
        }

        match header.nal_type {
            7 => {
                if nal_unit.len() >= SPS_MIN_SIZE {
                    self.update_parameter_set(nal_unit, SPS_MIN_SIZE - 1, true);
                }
                return Ok(());
            }
            8 => {
                if nal_unit.len() >= PPS_MIN_SIZE {
                    self.update_parameter_set(nal_unit, PPS_MIN_SIZE - 1, false);
                }
                return Ok(());
            }
            _ => {}
        }

        if self.slice_type.is_none() && header.is_slice() {
            self.slice_type = read_slice_type(&nal_unit[1..]);
        }

        if header.nal_ref_idc == 0 || header.nal_type == 6 {
            return Ok(());
        }

        self.frame.extend_from_slice(&START_MARKER);
        self.frame.extend_from_slice(nal_unit);
        Ok(())
    }

    fn update_parameter_set(&mut self, nal_unit: &[u8], id_offset: usize, is_sps: bool) {
        let Ok(id) = BitReader::new(&nal_unit[id_offset..]).read_golomb() else {
            return;
        };

        let map = if is_sps {
            &mut self.sps_map
        } else {
            &mut self.pps_map
        };

        if map.get(&id).map(|known| &known[..]) != Some(nal_unit) {
            log::debug!(
                "H264 {} {} updated ({} bytes)",
                if is_sps { "SPS" } else { "PPS" },
                id,
                nal_unit.len()
            );
            map.insert(id, Bytes::copy_from_slice(nal_unit));
            self.update_sps_pps = true;
        }
    }

    fn rebuild_sps_pps(&mut self) {
        if !self.update_sps_pps {
            return;
        }
        self.update_sps_pps = false;

        let mut extra = BytesMut::new();
        for set in self.sps_map.values().chain(self.pps_map.values()) {
            extra.extend_from_slice(&START_MARKER);
            extra.extend_from_slice(set);
        }
        self.sps_pps = extra.freeze();
    }

    fn try_generate_frame(&mut self, timestamp: DateTime<Utc>, sink: &mut dyn FrameSink) {
        let slice_type = self.slice_type.take();
        if self.frame.is_empty() {
            return;
        }
        let data = self.frame.split().freeze();

        self.rebuild_sps_pps();
        let Some(slice_type) = slice_type else {
            return;
        };
        if self.sps_pps.is_empty() {
            return;
        }

        match FrameType::from_slice_type(slice_type) {
            FrameType::Prediction if !self.wait_for_iframe => {
                sink.on_frame(RawFrame::new(timestamp, data, FrameKind::H264PFrame));
            }
            FrameType::Intra => {
                self.wait_for_iframe = false;
                sink.on_frame(RawFrame::new(
                    timestamp,
                    data,
                    FrameKind::H264IFrame {
                        sps_pps: self.sps_pps.clone(),
                    },
                ));
            }
            _ => {}
        }
    }
}

/// Reads slice_type from the slice header that follows the NAL header.
fn read_slice_type(slice_header: &[u8]) -> Option<u32> {
    let mut reader = BitReader::new(slice_header);
    reader.read_golomb().ok()?; // first_mb_in_slice
    reader.read_golomb().ok()
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
