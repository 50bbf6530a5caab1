use std::time::Instant;

use crate::format::rtp::RTPStatisticsProvider;

use super::{RTCPPacket, ReceptionReport, SDES_CNAME};

/// What the receiver knows about the sender's last Sender Report.
pub trait RTCPSenderStatisticsProvider {
    /// When the last Sender Report arrived, if any did
    fn last_time_report_received(&self) -> Option<Instant>;
    /// NTP timestamp carried by the last Sender Report
    fn last_ntp_time_report_received(&self) -> u64;
}

/// Builds the periodic RR + SDES compound report for one track.
#[derive(Debug, Clone)]
pub struct RTCPReceiverReportsProvider {
    sender_ssrc: u32,
    cname: String,
}

impl RTCPReceiverReportsProvider {
    /// Creates a provider reporting as `sender_ssrc` with the given CNAME.
    pub fn new(sender_ssrc: u32, cname: impl Into<String>) -> Self {
        Self {
            sender_ssrc,
            cname: cname.into(),
        }
    }

    /// Returns the Receiver Report and SDES packets for the current interval.
    ///
    /// Resets the since-last-report counters of `rtp`.
    pub fn report_packets(
        &self,
        rtp: &mut dyn RTPStatisticsProvider,
        sender: &dyn RTCPSenderStatisticsProvider,
    ) -> Vec<RTCPPacket> {
        vec![self.receiver_report(rtp, sender), self.sdes_report()]
    }

    /// Returns the final report sent when leaving: RR, SDES and BYE.
    pub fn goodbye_packets(
        &self,
        rtp: &mut dyn RTPStatisticsProvider,
        sender: &dyn RTCPSenderStatisticsProvider,
    ) -> Vec<RTCPPacket> {
        let mut packets = self.report_packets(rtp, sender);
        packets.push(RTCPPacket::Goodbye {
            sources: vec![self.sender_ssrc],
            reason: None,
        });
        packets
    }

    fn receiver_report(
        &self,
        rtp: &mut dyn RTPStatisticsProvider,
        sender: &dyn RTCPSenderStatisticsProvider,
    ) -> RTCPPacket {
        let received = rtp.packets_received_since_last_reset();
        let fraction_lost = if received == 0 {
            0
        } else {
            (u64::from(rtp.packets_lost_since_last_reset()) * 256 / u64::from(received)).min(255)
                as u8
        };

        let (last_sr, delay_last_sr) = match sender.last_time_report_received() {
            Some(received_at) => {
                let lsr = (sender.last_ntp_time_report_received() >> 16) as u32;
                let delay_secs = u32::try_from(received_at.elapsed().as_secs()).unwrap_or(u32::MAX);
                (lsr, delay_secs.saturating_mul(65536))
            }
            None => (0, 0),
        };

        let block = ReceptionReport {
            ssrc: rtp.sync_source_id(),
            fraction_lost,
            packets_lost: rtp.cumulative_packet_lost().min(0x7F_FFFF),
            highest_seq: u32::from(rtp.sequence_cycles()) << 16
                | u32::from(rtp.highest_sequence_number()),
            jitter: 0,
            last_sr,
            delay_last_sr,
        };

        rtp.reset_state();

        RTCPPacket::ReceiverReport {
            ssrc: self.sender_ssrc,
            reports: vec![block],
        }
    }

    fn sdes_report(&self) -> RTCPPacket {
        RTCPPacket::SourceDescription {
            chunks: vec![(self.sender_ssrc, vec![(SDES_CNAME, self.cname.clone())])],
        }
    }
}

/// Host name used as the SDES CNAME.
pub(crate) fn local_cname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "rtspio".to_string())
}
