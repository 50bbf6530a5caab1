use super::*;
use crate::av::RawFrame;
use crate::codec::{FrameSink, MediaPayloadParser, ParserError};
use chrono::Duration;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

#[test]
fn test_rtp_packet_parse() {
    let data = vec![
        0x80, 0x60, 0x03, 0xe8, // V=2, P=0, X=0, CC=0, M=0, PT=96, seq=1000
        0x00, 0x01, 0x5f, 0x90, // timestamp=90000
        0x12, 0x34, 0x56, 0x78, // SSRC=0x12345678
        0x01, 0x02, 0x03, 0x04, // payload
    ];

    let packet = RTPPacket::parse(&data).unwrap();

    assert_eq!(packet.version, 2);
    assert_eq!(packet.padding, false);
    assert_eq!(packet.extension, false);
    assert_eq!(packet.csrc_count, 0);
    assert_eq!(packet.marker, false);
    assert_eq!(packet.payload_type, 96);
    assert_eq!(packet.sequence_number, 1000);
    assert_eq!(packet.timestamp, 90000);
    assert_eq!(packet.ssrc, 0x12345678);
    assert_eq!(packet.payload, &[1, 2, 3, 4]);
}

#[test]
fn test_rtp_packet_parse_with_extension_and_csrc() {
    let data = vec![
        0x91, 0xe0, 0x03, 0xe8, // V=2, X=1, CC=1, M=1, PT=96
        0x00, 0x01, 0x5f, 0x90, // timestamp
        0x12, 0x34, 0x56, 0x78, // SSRC
        0xaa, 0xbb, 0xcc, 0xdd, // CSRC
        0xbe, 0xde, 0x00, 0x01, // extension header, one word
        0x10, 0x20, 0x30, 0x40, // extension data
        0x01, 0x02, // payload
    ];

    let packet = RTPPacket::parse(&data).unwrap();

    assert!(packet.marker);
    assert_eq!(packet.csrc_count, 1);
    assert_eq!(packet.extension_data, Some((0xbede, &[0x10u8, 0x20, 0x30, 0x40][..])));
    assert_eq!(packet.payload, &[1, 2]);
}

#[test]
fn test_rtp_packet_padding_is_removed() {
    let data = vec![
        0xa0, 0x60, 0x00, 0x01, // V=2, P=1
        0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x01, //
        0x07, 0x08, 0x00, 0x00, 0x03, // payload 7 8, padding of 3
    ];

    let packet = RTPPacket::parse(&data).unwrap();
    assert_eq!(packet.payload, &[7, 8]);
}

#[test]
fn test_rtp_packet_rejects_invalid_input() {
    assert!(RTPPacket::parse(&[0x80, 0x60, 0x00]).is_err());

    let mut data = vec![0u8; 12];
    data[0] = 0x40;
    assert_eq!(RTPPacket::parse(&data), Err(RTPError::UnsupportedVersion(1)));

    data[0] = 0x8f; // 15 CSRCs claimed, none present
    assert!(RTPPacket::parse(&data).is_err());
}

#[test]
fn test_rtp_packet_to_bytes() {
    let payload = [9u8, 8, 7];
    let packet = RTPPacket::new(97, 65535, 1234, 42, true, &payload);
    let wire = packet.to_bytes();

    assert_eq!(&wire[..2], &[0x80, 0xe1]);
    assert_eq!(RTPPacket::parse(&wire).unwrap(), packet);
}

type Seen = Arc<Mutex<Vec<(Option<Duration>, Vec<u8>)>>>;

/// Records every payload it is given and counts resets.
struct RecordingParser {
    seen: Seen,
    resets: Arc<Mutex<usize>>,
}

impl MediaPayloadParser for RecordingParser {
    fn parse(
        &mut self,
        time_offset: Option<Duration>,
        payload: &[u8],
        _marker: bool,
        _sink: &mut dyn FrameSink,
    ) -> Result<(), ParserError> {
        self.seen.lock().unwrap().push((time_offset, payload.to_vec()));
        Ok(())
    }

    fn reset_state(&mut self) {
        *self.resets.lock().unwrap() += 1;
    }
}

fn recording_stream(frequency: u32, assembler: Option<RTPSequenceAssembler>) -> (RTPStream, Seen, Arc<Mutex<usize>>) {
    let seen: Seen = Arc::default();
    let resets = Arc::new(Mutex::new(0));
    let parser = RecordingParser {
        seen: seen.clone(),
        resets: resets.clone(),
    };
    (RTPStream::new(Box::new(parser), frequency, assembler), seen, resets)
}

#[test]
fn test_stream_counts_losses_and_resets_parser() {
    let (mut stream, seen, resets) = recording_stream(90000, None);
    let mut sink = |_frame: RawFrame| {};

    for (seq, ts) in [(10u16, 0u32), (11, 90000), (14, 180000)] {
        let payload = [seq as u8];
        let wire = RTPPacket::new(96, seq, ts, 77, false, &payload).to_bytes();
        stream.process(&wire, &mut sink);
    }

    assert_eq!(stream.sync_source_id(), 77);
    assert_eq!(stream.highest_sequence_number(), 14);
    assert_eq!(stream.cumulative_packet_lost(), 2);
    assert_eq!(stream.packets_lost_since_last_reset(), 2);
    assert_eq!(stream.packets_received_since_last_reset(), 3);
    assert_eq!(*resets.lock().unwrap(), 1);

    let offsets: Vec<_> = seen.lock().unwrap().iter().map(|(offset, _)| *offset).collect();
    assert_eq!(
        offsets,
        vec![
            Some(Duration::zero()),
            Some(Duration::seconds(1)),
            Some(Duration::seconds(2))
        ]
    );

    stream.reset_state();
    assert_eq!(stream.packets_lost_since_last_reset(), 0);
    assert_eq!(stream.packets_received_since_last_reset(), 0);
    assert_eq!(stream.cumulative_packet_lost(), 2);
}

#[test]
fn test_stream_counts_sequence_cycles() {
    let (mut stream, _seen, _resets) = recording_stream(0, None);
    let mut sink = |_frame: RawFrame| {};

    for seq in [65534u16, 65535, 0, 1] {
        let wire = RTPPacket::new(96, seq, 0, 1, false, &[1]).to_bytes();
        stream.process(&wire, &mut sink);
    }

    assert_eq!(stream.sequence_cycles(), 1);
    assert_eq!(stream.highest_sequence_number(), 1);
    assert_eq!(stream.cumulative_packet_lost(), 0);
}

#[test]
fn test_stream_reorders_through_assembler() {
    let (mut stream, seen, resets) = recording_stream(0, Some(RTPSequenceAssembler::new(2048, 8)));
    let mut sink = |_frame: RawFrame| {};

    for seq in [1u16, 3, 2, 4] {
        let payload = [seq as u8];
        let wire = RTPPacket::new(96, seq, 0, 1, false, &payload).to_bytes();
        stream.process(&wire, &mut sink);
    }

    let payloads: Vec<_> = seen.lock().unwrap().iter().map(|(_, p)| p[0]).collect();
    assert_eq!(payloads, vec![1, 2, 3, 4]);
    assert_eq!(*resets.lock().unwrap(), 0);
    assert!(seen.lock().unwrap().iter().all(|(offset, _)| offset.is_none()));
}
