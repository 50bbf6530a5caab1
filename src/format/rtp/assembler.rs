use crate::utils::ChunksArray;

use super::RTPPacket;

/// Header fields of a packet parked in the reorder window.
#[derive(Debug, Clone, Copy)]
struct BufferedPacket {
    sequence_number: u16,
    timestamp: u32,
    ssrc: u32,
    payload_type: u8,
    marker: bool,
    chunk: usize,
}

impl BufferedPacket {
    fn to_packet<'a>(&self, payload: &'a [u8]) -> RTPPacket<'a> {
        RTPPacket::new(
            self.payload_type,
            self.sequence_number,
            self.timestamp,
            self.ssrc,
            self.marker,
            payload,
        )
    }
}

/// Restores RTP sequence order within a bounded correction window.
///
/// Out-of-order payloads are copied into a [`ChunksArray`] sized for
/// `max_correction_length` packets of at most `max_packet_size` bytes.
/// Packets are handed to the caller in sequence order; a gap larger than
/// the window, a timestamp change, or a full window releases buffered
/// packets nearest sequence number first.
#[derive(Debug)]
pub struct RTPSequenceAssembler {
    chunks: ChunksArray,
    buffered: Vec<BufferedPacket>,
    max_correction_length: usize,
    previous_seq: u16,
    previous_timestamp: u32,
    initialized: bool,
}

impl RTPSequenceAssembler {
    /// Creates an assembler holding up to `max_correction_length` packets.
    pub fn new(max_packet_size: usize, max_correction_length: usize) -> Self {
        let max_correction_length = max_correction_length.max(1);
        Self {
            chunks: ChunksArray::new(max_packet_size, max_correction_length),
            buffered: Vec::with_capacity(max_correction_length),
            max_correction_length,
            previous_seq: 0,
            previous_timestamp: 0,
            initialized: false,
        }
    }

    /// Feeds one packet; `emit` is called for every packet released in order.
    pub fn process_packet(&mut self, packet: &RTPPacket<'_>, emit: &mut dyn FnMut(&RTPPacket<'_>)) {
        if !self.initialized {
            self.initialized = true;
            self.pass(packet, emit);
            return;
        }

        let delta = packet.sequence_number.wrapping_sub(self.previous_seq);
        if delta == 0 {
            return;
        }

        if delta == 1 {
            self.pass(packet, emit);
            self.drain_contiguous(emit);
            return;
        }

        if packet.timestamp != self.previous_timestamp
            || delta as usize > self.max_correction_length
        {
            self.flush(emit);
            self.pass(packet, emit);
            return;
        }

        if self
            .buffered
            .iter()
            .any(|buffered| buffered.sequence_number == packet.sequence_number)
        {
            return;
        }

        let Some(chunk) = self.chunks.add(packet.payload) else {
            log::warn!(
                "RTP packet {} does not fit the reorder window, releasing it unordered",
                packet.sequence_number
            );
            self.flush(emit);
            self.pass(packet, emit);
            return;
        };

        self.buffered.push(BufferedPacket {
            sequence_number: packet.sequence_number,
            timestamp: packet.timestamp,
            ssrc: packet.ssrc,
            payload_type: packet.payload_type,
            marker: packet.marker,
            chunk,
        });

        if self.buffered.len() >= self.max_correction_length {
            self.pass_nearest(emit);
            self.drain_contiguous(emit);
        }
    }

    /// Releases every buffered packet, nearest sequence number first.
    pub fn flush(&mut self, emit: &mut dyn FnMut(&RTPPacket<'_>)) {
        while !self.buffered.is_empty() {
            self.pass_nearest(emit);
        }
    }

    /// Number of packets currently held back.
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    fn pass(&mut self, packet: &RTPPacket<'_>, emit: &mut dyn FnMut(&RTPPacket<'_>)) {
        self.previous_seq = packet.sequence_number;
        self.previous_timestamp = packet.timestamp;
        emit(packet);
    }

    fn drain_contiguous(&mut self, emit: &mut dyn FnMut(&RTPPacket<'_>)) {
        while let Some(index) = self
            .buffered
            .iter()
            .position(|buffered| buffered.sequence_number == self.previous_seq.wrapping_add(1))
        {
            self.pass_buffered(index, emit);
        }
    }

    fn pass_nearest(&mut self, emit: &mut dyn FnMut(&RTPPacket<'_>)) {
        let previous_seq = self.previous_seq;
        let nearest = self
            .buffered
            .iter()
            .enumerate()
            .min_by_key(|(_, buffered)| buffered.sequence_number.wrapping_sub(previous_seq))
            .map(|(index, _)| index);

        if let Some(index) = nearest {
            self.pass_buffered(index, emit);
        }
    }

    fn pass_buffered(&mut self, index: usize, emit: &mut dyn FnMut(&RTPPacket<'_>)) {
        let entry = self.buffered.swap_remove(index);
        self.previous_seq = entry.sequence_number;
        self.previous_timestamp = entry.timestamp;

        if let Some(payload) = self.chunks.get(entry.chunk) {
            emit(&entry.to_packet(payload));
        }
        self.chunks.remove_at(entry.chunk);
    }
}
