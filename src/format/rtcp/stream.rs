use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{RTCPPacket, RTCPSenderStatisticsProvider};

#[derive(Debug, Default)]
struct SenderState {
    last_time_report_received: Option<Instant>,
    last_ntp_time_report_received: u64,
}

/// Receive path of one RTCP channel.
///
/// Cloning shares the Sender Report state, so the RTP side of a track can
/// read it while this side runs on its own socket. A Goodbye cancels the
/// session shutdown token.
#[derive(Debug, Clone)]
pub struct RTCPStream {
    state: Arc<Mutex<SenderState>>,
    shutdown: CancellationToken,
}

impl RTCPStream {
    /// Creates a stream that cancels `shutdown` when the server says goodbye.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            state: Arc::default(),
            shutdown,
        }
    }

    /// Processes one compound RTCP packet. Malformed input is logged and dropped.
    pub fn process(&self, data: &[u8]) {
        let packets = match RTCPPacket::parse_compound(data) {
            Ok(packets) => packets,
            Err(e) => {
                log::debug!("Ignoring malformed RTCP packet: {}", e);
                return;
            }
        };

        for packet in packets {
            match packet {
                RTCPPacket::SenderReport { ntp_timestamp, .. } => {
                    let mut state = self.state.lock();
                    state.last_ntp_time_report_received = ntp_timestamp;
                    state.last_time_report_received = Some(Instant::now());
                }
                RTCPPacket::Goodbye { sources, .. } => {
                    log::info!("RTCP goodbye received from {:08X?}", sources);
                    self.shutdown.cancel();
                }
                _ => {}
            }
        }
    }
}

impl RTCPSenderStatisticsProvider for RTCPStream {
    fn last_time_report_received(&self) -> Option<Instant> {
        self.state.lock().last_time_report_received
    }

    fn last_ntp_time_report_received(&self) -> u64 {
        self.state.lock().last_ntp_time_report_received
    }
}
