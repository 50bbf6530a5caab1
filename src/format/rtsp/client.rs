use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use super::connection::RTSPTransport;
use super::session::RTSPSession;
use crate::codec::FrameSink;
use crate::config::ConnectionParameters;
use crate::{ClientError, Result};

/// Notices when the receive loop has seen no data for `timeout`.
///
/// The flag is polled four times per timeout, so a stall is reported at
/// most a quarter timeout late.
struct Watchdog {
    activity: Arc<AtomicBool>,
    timeout: Duration,
    last_activity: Instant,
}

impl Watchdog {
    fn new(activity: Arc<AtomicBool>, timeout: Duration) -> Self {
        activity.store(false, Ordering::Relaxed);
        Self {
            activity,
            timeout,
            last_activity: Instant::now(),
        }
    }

    fn period(&self) -> Duration {
        (self.timeout / 4).max(Duration::from_millis(10))
    }

    fn expired(&mut self, now: Instant) -> bool {
        if self.activity.swap(false, Ordering::Relaxed) {
            self.last_activity = now;
            return false;
        }
        now.saturating_duration_since(self.last_activity) >= self.timeout
    }
}

/// RTSP client delivering decoded frames to a sink.
///
/// Wraps an [`RTSPSession`] with the connect deadline, the receive
/// watchdog and the grace period given to a cancelled receive loop.
#[derive(Debug)]
pub struct RTSPClient {
    session: RTSPSession,
}

impl RTSPClient {
    /// Creates a client for `params`; nothing is sent until [`connect`](Self::connect)
    pub fn new(params: ConnectionParameters, sink: impl FrameSink + Send + 'static) -> Self {
        Self {
            session: RTSPSession::new(params, sink),
        }
    }

    /// Uses `transport` instead of a TCP connection or HTTP tunnel
    pub fn with_transport(self, transport: Box<dyn RTSPTransport>) -> Self {
        Self {
            session: self.session.with_transport(transport),
        }
    }

    /// Parameters the client was created with
    pub fn connection_parameters(&self) -> &ConnectionParameters {
        self.session.params()
    }

    /// Connects and starts playback.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Timeout`] when the handshake outlasts `connect_timeout`
    /// - [`ClientError::Cancelled`] when `token` fires first
    /// - [`ClientError::Authentication`] when the credentials are missing or rejected
    pub async fn connect(&mut self, token: &CancellationToken) -> Result<()> {
        let connect_timeout = self.session.params().connect_timeout;

        let result = match timeout(connect_timeout, self.session.connect(token)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout("connection timeout".into())),
        };

        result.map_err(|e| {
            self.session.close();
            if e.is_unauthorized() {
                ClientError::Authentication("invalid login and/or password".into())
            } else {
                log::warn!("Connect failed: {}", e);
                e
            }
        })
    }

    /// Receives media until `token` fires or the server ends the session.
    ///
    /// A server BYE returns `Ok`. Without any incoming data for
    /// `receive_timeout` the call fails with [`ClientError::Timeout`].
    /// After cancellation the session gets `cancel_timeout` to send
    /// TEARDOWN before [`ClientError::Cancelled`] is returned.
    pub async fn receive(&mut self, token: &CancellationToken) -> Result<()> {
        let params = self.session.params();
        let (receive_timeout, cancel_timeout) = (params.receive_timeout, params.cancel_timeout);
        let mut watchdog = Watchdog::new(self.session.activity(), receive_timeout);

        let result = {
            let receive = self.session.receive(token);
            tokio::pin!(receive);

            loop {
                tokio::select! {
                    result = &mut receive => break result,
                    _ = token.cancelled() => {
                        if timeout(cancel_timeout, &mut receive).await.is_err() {
                            log::warn!("Receive loop did not stop within {:?}", cancel_timeout);
                        }
                        break Err(ClientError::Cancelled);
                    }
                    _ = sleep(watchdog.period()) => {
                        if watchdog.expired(Instant::now()) {
                            break Err(ClientError::Timeout("receive timeout".into()));
                        }
                    }
                }
            }
        };

        self.session.close();
        result
    }
}
