use chrono::Duration;

use crate::codec::{FrameSink, MediaPayloadParser};

use super::{RTPPacket, RTPSequenceAssembler};

/// Loss and sequence statistics consumed by RTCP receiver reports.
pub trait RTPStatisticsProvider {
    /// SSRC of the media sender
    fn sync_source_id(&self) -> u32;
    /// Highest sequence number received
    fn highest_sequence_number(&self) -> u16;
    /// Number of sequence number wrap-arounds
    fn sequence_cycles(&self) -> u16;
    /// Total packets lost, capped at 0x7FFFFF
    fn cumulative_packet_lost(&self) -> u32;
    /// Packets lost since the last report
    fn packets_lost_since_last_reset(&self) -> u32;
    /// Packets received since the last report
    fn packets_received_since_last_reset(&self) -> u32;
    /// Zeroes the since-last-report counters
    fn reset_state(&mut self);
}

const MAX_CUMULATIVE_LOST: u32 = 0x7F_FFFF;

#[derive(Debug, Default, Clone)]
struct Statistics {
    sync_source_id: u32,
    highest_sequence_number: u16,
    sequence_cycles: u16,
    cumulative_packet_lost: u32,
    packets_lost_since_last_reset: u32,
    packets_received_since_last_reset: u32,
}

/// Parser side of a stream, kept apart from the assembler so the
/// assembler can call back into it.
struct PayloadReceiver {
    parser: Box<dyn MediaPayloadParser>,
    samples_frequency: u32,
    stats: Statistics,
    previous_seq: Option<u16>,
    previous_timestamp: Option<u32>,
    timestamp_units: i64,
}

impl PayloadReceiver {
    fn process(&mut self, packet: &RTPPacket<'_>, sink: &mut dyn FrameSink) {
        self.stats.sync_source_id = packet.ssrc;

        if let Some(previous) = self.previous_seq {
            let delta = packet.sequence_number.wrapping_sub(previous);
            if delta == 0 {
                return;
            }
            if delta != 1 {
                if delta < 0x8000 {
                    let lost = u32::from(delta - 1);
                    self.stats.cumulative_packet_lost =
                        (self.stats.cumulative_packet_lost + lost).min(MAX_CUMULATIVE_LOST);
                    self.stats.packets_lost_since_last_reset += lost;
                    log::debug!(
                        "RTP loss detected: {} packet(s) before seq {}",
                        lost,
                        packet.sequence_number
                    );
                }
                self.parser.reset_state();
            }
            if packet.sequence_number < self.stats.highest_sequence_number {
                self.stats.sequence_cycles = self.stats.sequence_cycles.wrapping_add(1);
            }
        }

        self.stats.packets_received_since_last_reset += 1;
        self.stats.highest_sequence_number = packet.sequence_number;
        self.previous_seq = Some(packet.sequence_number);

        if packet.payload.is_empty() {
            return;
        }

        let time_offset = self.time_offset(packet.timestamp);
        if let Err(e) = self
            .parser
            .parse(time_offset, packet.payload, packet.marker, sink)
        {
            log::warn!(
                "Dropping partial frame at seq {}: {}",
                packet.sequence_number,
                e
            );
            self.parser.reset_state();
        }
    }

    fn time_offset(&mut self, timestamp: u32) -> Option<Duration> {
        if self.samples_frequency == 0 {
            return None;
        }
        if let Some(previous) = self.previous_timestamp {
            self.timestamp_units += i64::from(timestamp.wrapping_sub(previous) as i32);
        }
        self.previous_timestamp = Some(timestamp);

        let micros = self.timestamp_units * 1_000_000 / i64::from(self.samples_frequency);
        Some(Duration::microseconds(micros.max(0)))
    }
}

/// Receive path of one RTP channel: optional reordering, loss accounting
/// and payload parsing.
pub struct RTPStream {
    assembler: Option<RTPSequenceAssembler>,
    receiver: PayloadReceiver,
}

impl RTPStream {
    /// Creates a stream feeding `parser`.
    ///
    /// `samples_frequency` is the RTP clock rate; zero stamps every frame
    /// with the arrival time. Pass an assembler for datagram transports.
    pub fn new(
        parser: Box<dyn MediaPayloadParser>,
        samples_frequency: u32,
        assembler: Option<RTPSequenceAssembler>,
    ) -> Self {
        Self {
            assembler,
            receiver: PayloadReceiver {
                parser,
                samples_frequency,
                stats: Statistics::default(),
                previous_seq: None,
                previous_timestamp: None,
                timestamp_units: 0,
            },
        }
    }

    /// Processes one RTP datagram or interleaved frame.
    ///
    /// Malformed packets are logged and dropped.
    pub fn process(&mut self, data: &[u8], sink: &mut dyn FrameSink) {
        let packet = match RTPPacket::parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("Ignoring malformed RTP packet: {}", e);
                return;
            }
        };

        let Self {
            assembler,
            receiver,
        } = self;
        match assembler {
            Some(assembler) => {
                assembler.process_packet(&packet, &mut |ordered| receiver.process(ordered, sink))
            }
            None => receiver.process(&packet, sink),
        }
    }
}

impl RTPStatisticsProvider for RTPStream {
    fn sync_source_id(&self) -> u32 {
        self.receiver.stats.sync_source_id
    }

    fn highest_sequence_number(&self) -> u16 {
        self.receiver.stats.highest_sequence_number
    }

    fn sequence_cycles(&self) -> u16 {
        self.receiver.stats.sequence_cycles
    }

    fn cumulative_packet_lost(&self) -> u32 {
        self.receiver.stats.cumulative_packet_lost
    }

    fn packets_lost_since_last_reset(&self) -> u32 {
        self.receiver.stats.packets_lost_since_last_reset
    }

    fn packets_received_since_last_reset(&self) -> u32 {
        self.receiver.stats.packets_received_since_last_reset
    }

    fn reset_state(&mut self) {
        self.receiver.stats.packets_lost_since_last_reset = 0;
        self.receiver.stats.packets_received_since_last_reset = 0;
    }
}
