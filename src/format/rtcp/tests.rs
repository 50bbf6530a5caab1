use super::*;
use crate::format::rtp::RTPStatisticsProvider;
use pretty_assertions::assert_eq;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[test]
fn test_rtcp_sender_report_parse() {
    let data = vec![
        0x80, 0xc8, 0x00, 0x06, // V=2, P=0, Count=0, Type=SR(200), Len=6
        0x12, 0x34, 0x56, 0x78, // SSRC
        0xdf, 0xa0, 0x00, 0x00, // NTP timestamp (MSW)
        0x00, 0x00, 0x80, 0x00, // NTP timestamp (LSW)
        0x00, 0x01, 0x86, 0xa0, // RTP timestamp (100000)
        0x00, 0x00, 0x00, 0x0a, // Packet count (10)
        0x00, 0x00, 0x0b, 0xb8, // Octet count (3000)
    ];

    let packets = RTCPPacket::parse_compound(&data).unwrap();
    assert_eq!(
        packets,
        vec![RTCPPacket::SenderReport {
            ssrc: 0x12345678,
            ntp_timestamp: 0xdfa0_0000_0000_8000,
            rtp_timestamp: 100000,
            packet_count: 10,
            octet_count: 3000,
            reports: vec![],
        }]
    );
}

#[test]
fn test_rtcp_compound_skips_unknown_types() {
    let data = vec![
        0x81, 0xca, 0x00, 0x02, // SDES, one chunk, 2 words
        0x00, 0x00, 0x00, 0x01, //
        0x01, 0x01, 0x61, 0x00, // CNAME "a"
        0x81, 0xcb, 0x00, 0x01, // BYE, one source
        0x00, 0x00, 0x00, 0x2a, //
    ];

    let packets = RTCPPacket::parse_compound(&data).unwrap();
    assert_eq!(
        packets,
        vec![RTCPPacket::Goodbye {
            sources: vec![42],
            reason: None
        }]
    );
}

#[test]
fn test_rtcp_rejects_bad_length() {
    let data = vec![0x80, 0xc8, 0x00, 0x06, 0x00, 0x00];
    assert!(RTCPPacket::parse_compound(&data).is_err());

    let data = vec![0x40, 0xcb, 0x00, 0x00];
    assert!(RTCPPacket::parse_compound(&data).is_err());
}

#[test]
fn test_receiver_report_serialization() {
    let report = RTCPPacket::ReceiverReport {
        ssrc: 1,
        reports: vec![ReceptionReport {
            ssrc: 2,
            fraction_lost: 3,
            packets_lost: 0x010203,
            highest_seq: 0x0002_000a,
            jitter: 0,
            last_sr: 1234,
            delay_last_sr: 65536,
        }],
    };

    let wire = RTCPPacket::serialize_compound(std::slice::from_ref(&report));
    assert_eq!(&wire[..4], &[0x81, 201, 0x00, 0x07]);
    assert_eq!(&wire[12..16], &[3, 0x01, 0x02, 0x03]);
    assert_eq!(RTCPPacket::parse_compound(&wire).unwrap(), vec![report]);
}

#[test]
fn test_sdes_chunk_is_word_aligned() {
    let sdes = RTCPPacket::SourceDescription {
        chunks: vec![(1112234, vec![(SDES_CNAME, "camera-host".to_string())])],
    };

    let wire = RTCPPacket::serialize_compound(&[sdes]);
    assert_eq!(wire.len() % 4, 0);
    assert_eq!(wire[0], 0x81);
    assert_eq!(wire[1], PT_SOURCE_DESCRIPTION);
    assert_eq!(u16::from_be_bytes([wire[2], wire[3]]) as usize, wire.len() / 4 - 1);
    assert_eq!(&wire[4..8], &1112234u32.to_be_bytes());
    assert_eq!(wire[8], SDES_CNAME);
    assert_eq!(wire[9] as usize, "camera-host".len());
    assert_eq!(&wire[10..21], b"camera-host");
    assert_eq!(wire[21], 0);
}

struct FakeRtpStatistics {
    reset_calls: usize,
}

impl RTPStatisticsProvider for FakeRtpStatistics {
    fn sync_source_id(&self) -> u32 {
        99987
    }
    fn highest_sequence_number(&self) -> u16 {
        10
    }
    fn sequence_cycles(&self) -> u16 {
        2
    }
    fn cumulative_packet_lost(&self) -> u32 {
        100
    }
    fn packets_lost_since_last_reset(&self) -> u32 {
        4
    }
    fn packets_received_since_last_reset(&self) -> u32 {
        10
    }
    fn reset_state(&mut self) {
        self.reset_calls += 1;
    }
}

struct FakeSenderStatistics {
    last_time: Instant,
}

impl RTCPSenderStatisticsProvider for FakeSenderStatistics {
    fn last_time_report_received(&self) -> Option<Instant> {
        Some(self.last_time)
    }
    fn last_ntp_time_report_received(&self) -> u64 {
        1234 << 16
    }
}

#[test]
fn test_receiver_report_fields() {
    let provider = RTCPReceiverReportsProvider::new(1112234, "host");
    let mut rtp = FakeRtpStatistics { reset_calls: 0 };
    let sender = FakeSenderStatistics {
        last_time: Instant::now(),
    };

    let packets = provider.report_packets(&mut rtp, &sender);

    assert_eq!(rtp.reset_calls, 1);
    assert_eq!(packets.len(), 2);
    assert_eq!(
        packets[0],
        RTCPPacket::ReceiverReport {
            ssrc: 1112234,
            reports: vec![ReceptionReport {
                ssrc: 99987,
                fraction_lost: 102,
                packets_lost: 100,
                highest_seq: 2 << 16 | 10,
                jitter: 0,
                last_sr: 1234,
                delay_last_sr: 0,
            }],
        }
    );
    assert!(matches!(
        &packets[1],
        RTCPPacket::SourceDescription { chunks } if chunks[0].0 == 1112234
    ));
    let wire = RTCPPacket::serialize_compound(&packets);
    assert_eq!(wire[1], PT_RECEIVER_REPORT);
}

#[test]
fn test_goodbye_packets_end_with_bye() {
    let provider = RTCPReceiverReportsProvider::new(7, "host");
    let mut rtp = FakeRtpStatistics { reset_calls: 0 };
    let stream = RTCPStream::new(CancellationToken::new());

    let packets = provider.goodbye_packets(&mut rtp, &stream);
    assert_eq!(
        packets.last(),
        Some(&RTCPPacket::Goodbye {
            sources: vec![7],
            reason: None
        })
    );
    match &packets[0] {
        RTCPPacket::ReceiverReport { reports, .. } => {
            assert_eq!(reports[0].last_sr, 0);
            assert_eq!(reports[0].delay_last_sr, 0);
        }
        other => panic!("expected receiver report, got {:?}", other),
    }
}

#[test]
fn test_stream_tracks_sender_reports_and_goodbye() {
    let shutdown = CancellationToken::new();
    let stream = RTCPStream::new(shutdown.clone());
    assert!(stream.last_time_report_received().is_none());

    let sr = RTCPPacket::SenderReport {
        ssrc: 1,
        ntp_timestamp: 0x1122_3344_5566_7788,
        rtp_timestamp: 0,
        packet_count: 0,
        octet_count: 0,
        reports: vec![],
    };
    stream.process(&RTCPPacket::serialize_compound(&[sr]));
    assert_eq!(stream.last_ntp_time_report_received(), 0x1122_3344_5566_7788);
    assert!(stream.last_time_report_received().is_some());
    assert!(!shutdown.is_cancelled());

    stream.process(&[0x80, 0xcb, 0x00, 0x00]);
    assert!(shutdown.is_cancelled());
}
