use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::connection::{RTSPConnection, RTSPTransport, TcpTransport};
use super::http::HttpTunnelTransport;
use super::message::RTSPResponse;
use super::request_factory::RTSPRequestFactory;
use super::transport::TransportInfo;
use super::RTSPError;
use crate::codec::{create_parser, FrameSink};
use crate::config::{ConnectionParameters, RTPTransportProtocol};
use crate::format::rtcp::{local_cname, RTCPPacket, RTCPReceiverReportsProvider, RTCPStream};
use crate::format::rtp::{RTPSequenceAssembler, RTPStream};
use crate::format::sdp::{self, MediaTrackInfo};
use crate::format::tpkt::TPKTReader;
use crate::utils::bytes::find_ignore_case;
use crate::{ClientError, Result};

type SharedSink = Arc<Mutex<Box<dyn FrameSink + Send>>>;

const RTCP_REPORT_INTERVAL_BASE_MS: u64 = 5000;
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);
const UDP_RECEIVE_BUFFER_SIZE: usize = 2048;
const UDP_MAX_CORRECTION_LENGTH: usize = 8;

/// Sockets of one track received over UDP
struct UdpSockets {
    rtp: UdpSocket,
    rtcp: UdpSocket,
    /// Report destination for unconnected (multicast) sockets
    report_target: Option<SocketAddr>,
}

impl UdpSockets {
    async fn send_report(&self, data: &[u8]) -> io::Result<()> {
        match self.report_target {
            Some(target) => self.rtcp.send_to(data, target).await?,
            None => self.rtcp.send(data).await?,
        };
        Ok(())
    }
}

/// Receive state of one SETUP track
struct Track {
    name: String,
    rtp: RTPStream,
    rtcp: RTCPStream,
    reports: RTCPReceiverReportsProvider,
    rtp_channel: u8,
    rtcp_channel: u8,
    udp: Option<UdpSockets>,
}

enum TcpEvent {
    Stop,
    Packet(std::result::Result<crate::format::tpkt::TPKTPacket, crate::format::tpkt::TPKTError>),
    Report,
    KeepAlive,
}

/// One RTSP session: the handshake and the receive loop.
///
/// ```text
/// Disconnected -> connect() -> Connected -> receive() -> Closed
/// ```
///
/// An RTCP BYE from the server on any track ends [`receive`](Self::receive)
/// normally. Frames of all tracks go to one sink. On UDP the sink is shared
/// by the per-track tasks, so it is kept behind a mutex.
pub struct RTSPSession {
    params: ConnectionParameters,
    fixed_uri: Url,
    requests: RTSPRequestFactory,
    transport: Option<Box<dyn RTSPTransport>>,
    connection: Option<RTSPConnection>,
    tracks: Vec<Track>,
    sink: SharedSink,
    shutdown: CancellationToken,
    activity: Arc<AtomicBool>,
    supports_get_parameter: bool,
    keep_alive_timeout: Duration,
}

impl RTSPSession {
    /// Creates a disconnected session delivering frames to `sink`
    pub fn new(params: ConnectionParameters, sink: impl FrameSink + Send + 'static) -> Self {
        let fixed_uri = params
            .fixed_uri()
            .unwrap_or_else(|_| params.connection_uri.clone());
        let requests = RTSPRequestFactory::new(fixed_uri.clone(), params.user_agent.clone());

        Self {
            params,
            fixed_uri,
            requests,
            transport: None,
            connection: None,
            tracks: Vec::new(),
            sink: Arc::new(Mutex::new(Box::new(sink))),
            shutdown: CancellationToken::new(),
            activity: Arc::new(AtomicBool::new(false)),
            supports_get_parameter: false,
            keep_alive_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Uses `transport` for the next connect instead of one derived from
    /// the URI scheme
    pub fn with_transport(mut self, transport: Box<dyn RTSPTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Parameters the session was created with
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// True between a successful connect and the end of receive
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Set whenever data arrives; cleared by whoever watches for silence
    pub fn activity(&self) -> Arc<AtomicBool> {
        self.activity.clone()
    }

    /// Drops the connection and every track
    pub fn close(&mut self) {
        self.connection = None;
        self.tracks.clear();
    }

    /// Runs OPTIONS, DESCRIBE, SETUP for each wanted track, then PLAY.
    ///
    /// # Errors
    ///
    /// [`ClientError::Cancelled`] if `token` fires first. Non-200 answers to
    /// DESCRIBE, SETUP or PLAY are [`ClientError::BadStatus`]. A description
    /// without a wanted track is [`RTSPError::NoSuitableTracks`].
    pub async fn connect(&mut self, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        tokio::select! {
            _ = token.cancelled() => {
                self.close();
                Err(ClientError::Cancelled)
            }
            result = self.handshake() => result,
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        self.close();
        self.requests = RTSPRequestFactory::new(self.fixed_uri.clone(), self.params.user_agent.clone());
        self.shutdown = CancellationToken::new();
        self.supports_get_parameter = false;
        self.keep_alive_timeout = DEFAULT_SESSION_TIMEOUT;

        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => self.create_transport(),
        };
        let mut connection = RTSPConnection::new(
            transport,
            self.params.credentials.clone(),
            self.fixed_uri.to_string(),
        );
        connection.connect().await?;

        let mut request = self.requests.options();
        let response = connection.execute(&mut request, &mut self.requests).await?;
        if response.is_ok() {
            self.supports_get_parameter = response
                .header("Public")
                .is_some_and(|methods| methods.contains("GET_PARAMETER"));
        }

        let mut request = self.requests.describe();
        let response = connection
            .ensure_execute(&mut request, &mut self.requests)
            .await?;

        if let Some(content_base) = response.header("Content-Base") {
            match Url::parse(content_base) {
                Ok(content_base) => self.requests.set_content_base(content_base),
                Err(e) => log::warn!("Ignoring Content-Base {}: {}", content_base, e),
            }
        }

        let description = String::from_utf8_lossy(&response.body);
        let tracks = sdp::parse(&description)?;
        log::debug!("Session description offers {} tracks", tracks.len());

        for track in tracks {
            let kind = track.codec.media_kind();
            if !self.params.required_tracks.contains(kind) {
                log::debug!("Skipping {:?} track {}", kind, track.track_name);
                continue;
            }
            self.setup_track(&mut connection, &track).await?;
        }

        if self.tracks.is_empty() {
            return Err(RTSPError::NoSuitableTracks.into());
        }

        let mut request = self.requests.play();
        connection
            .ensure_execute(&mut request, &mut self.requests)
            .await?;

        log::info!(
            "Playing {} with {} tracks over {:?}",
            self.fixed_uri,
            self.tracks.len(),
            self.params.rtp_transport
        );
        self.connection = Some(connection);
        Ok(())
    }

    fn create_transport(&self) -> Box<dyn RTSPTransport> {
        if self.params.is_http_tunnel() {
            Box::new(HttpTunnelTransport::new(
                self.params.connection_uri.clone(),
                self.params.credentials.clone(),
            ))
        } else {
            Box::new(TcpTransport::new(self.params.connection_uri.clone()))
        }
    }

    async fn setup_track(
        &mut self,
        connection: &mut RTSPConnection,
        track: &MediaTrackInfo,
    ) -> Result<()> {
        let parser = create_parser(&track.codec)
            .map_err(|e| ClientError::Config(format!("track {}: {}", track.track_name, e)))?;

        let (rtp_channel, rtcp_channel, udp, response) = match self.params.rtp_transport {
            RTPTransportProtocol::TCP => {
                let first = u8::try_from(self.tracks.len() * 2)
                    .ok()
                    .filter(|channel| *channel < u8::MAX)
                    .ok_or_else(|| ClientError::Config("too many tracks".into()))?;
                let requested = (first, first + 1);

                let transport = TransportInfo::new_tcp_interleaved(requested);
                let mut request = self.requests.setup(&track.track_name, &transport)?;
                let response = connection
                    .ensure_execute(&mut request, &mut self.requests)
                    .await?;

                let (rtp, rtcp) = transport_info(&response)?
                    .interleaved
                    .unwrap_or_else(|| {
                        log::debug!("No interleaved channels in reply, using {:?}", requested);
                        requested
                    });
                (rtp, rtcp, None, response)
            }
            RTPTransportProtocol::UDP => {
                let (sockets, response) = self.setup_udp_unicast(connection, track).await?;
                (0, 0, Some(sockets), response)
            }
            RTPTransportProtocol::Multicast => {
                let (sockets, response) = self.setup_udp_multicast(connection, track).await?;
                (0, 0, Some(sockets), response)
            }
        };

        let (session_id, timeout) = parse_session_header(response.header("Session"));
        if let Some(session_id) = session_id {
            self.requests.set_session_id(session_id);
        }
        self.keep_alive_timeout = timeout;

        let assembler = udp.as_ref().map(|_| {
            RTPSequenceAssembler::new(UDP_RECEIVE_BUFFER_SIZE, UDP_MAX_CORRECTION_LENGTH)
        });

        log::info!(
            "Track {} set up: {:?} at {} Hz",
            track.track_name,
            track.codec.media_kind(),
            track.samples_frequency
        );
        self.tracks.push(Track {
            name: track.track_name.clone(),
            rtp: RTPStream::new(parser, track.samples_frequency, assembler),
            rtcp: RTCPStream::new(self.shutdown.clone()),
            reports: RTCPReceiverReportsProvider::new(rand::random(), local_cname()),
            rtp_channel,
            rtcp_channel,
            udp,
        });
        Ok(())
    }

    async fn setup_udp_unicast(
        &mut self,
        connection: &mut RTSPConnection,
        track: &MediaTrackInfo,
    ) -> Result<(UdpSockets, RTSPResponse)> {
        let remote = connection
            .remote_addr()
            .ok_or(RTSPError::InvalidState("server address is unknown"))?;
        let local_ip = unspecified_like(remote.ip());
        let factory = &self.params.socket_factory;

        let rtp = factory.create_udp_socket(SocketAddr::new(local_ip, 0), false)?;
        let rtp_port = rtp.local_addr()?.port();
        let rtcp = match factory
            .create_udp_socket(SocketAddr::new(local_ip, rtp_port.wrapping_add(1)), false)
        {
            Ok(socket) => socket,
            Err(e) => {
                log::debug!("RTCP port {} unavailable: {}", rtp_port.wrapping_add(1), e);
                factory.create_udp_socket(SocketAddr::new(local_ip, 0), false)?
            }
        };
        let rtcp_port = rtcp.local_addr()?.port();

        let transport = TransportInfo::new_udp_unicast((rtp_port, rtcp_port));
        let mut request = self.requests.setup(&track.track_name, &transport)?;
        let response = connection
            .ensure_execute(&mut request, &mut self.requests)
            .await?;

        let (server_rtp, server_rtcp) = transport_info(&response)?
            .server_port
            .ok_or_else(|| RTSPError::BadResponse("server ports are not found".into()))?;

        let rtp = UdpSocket::from_std(rtp)?;
        let rtcp = UdpSocket::from_std(rtcp)?;
        rtp.connect(SocketAddr::new(remote.ip(), server_rtp)).await?;
        rtcp.connect(SocketAddr::new(remote.ip(), server_rtcp)).await?;

        // Empty datagrams open NAT mappings towards the server
        rtp.send(&[]).await?;
        rtcp.send(&[]).await?;

        log::debug!(
            "UDP ports {}-{} paired with server {}-{}",
            rtp_port,
            rtcp_port,
            server_rtp,
            server_rtcp
        );
        Ok((
            UdpSockets {
                rtp,
                rtcp,
                report_target: None,
            },
            response,
        ))
    }

    async fn setup_udp_multicast(
        &mut self,
        connection: &mut RTSPConnection,
        track: &MediaTrackInfo,
    ) -> Result<(UdpSockets, RTSPResponse)> {
        let transport = TransportInfo::new_udp_multicast();
        let mut request = self.requests.setup(&track.track_name, &transport)?;
        let response = connection
            .ensure_execute(&mut request, &mut self.requests)
            .await?;

        let info = transport_info(&response)?;
        let group = info
            .destination
            .ok_or_else(|| RTSPError::BadResponse("multicast destination is not found".into()))?;
        let (rtp_port, rtcp_port) = info
            .server_channels()
            .ok_or_else(|| RTSPError::BadResponse("multicast ports are not found".into()))?;

        let factory = &self.params.socket_factory;
        let local_ip = unspecified_like(group);
        let rtp = factory.create_udp_socket(SocketAddr::new(local_ip, rtp_port), true)?;
        let rtcp = factory.create_udp_socket(SocketAddr::new(local_ip, rtcp_port), true)?;
        let rtp = join_group(rtp, group, info.source)?;
        let rtcp = join_group(rtcp, group, info.source)?;

        let sender = match (info.source, connection.remote_addr()) {
            (Some(source), _) => source,
            (None, Some(remote)) => remote.ip(),
            (None, None) => group,
        };

        log::debug!("Joined {} ports {}-{}", group, rtp_port, rtcp_port);
        Ok((
            UdpSockets {
                rtp: UdpSocket::from_std(rtp)?,
                rtcp: UdpSocket::from_std(rtcp)?,
                report_target: Some(SocketAddr::new(sender, rtcp_port)),
            },
            response,
        ))
    }

    /// Receives until `token` fires, the server says BYE or the transport
    /// fails.
    ///
    /// Sends TEARDOWN when stopped by either signal. The session is closed
    /// afterwards and needs a new connect.
    ///
    /// # Errors
    ///
    /// [`ClientError::Cancelled`] when `token` stopped the loop. Transport
    /// failures end the loop with their error. Over UDP that happens only
    /// once every track has failed.
    pub async fn receive(&mut self, token: &CancellationToken) -> Result<()> {
        let mut connection = self
            .connection
            .take()
            .ok_or(RTSPError::InvalidState("client should be connected first"))?;
        let tracks = std::mem::take(&mut self.tracks);

        let stop = link_tokens(token, &self.shutdown);
        let result = match self.params.rtp_transport {
            RTPTransportProtocol::TCP => self.receive_over_tcp(&mut connection, tracks, &stop).await,
            _ => self.receive_over_udp(&mut connection, tracks, &stop).await,
        };

        let stopped = stop.is_cancelled();
        stop.cancel();
        if stopped {
            self.close_session(&mut connection).await;
        }

        match result {
            Ok(()) if token.is_cancelled() => Err(ClientError::Cancelled),
            result => result,
        }
    }

    async fn close_session(&mut self, connection: &mut RTSPConnection) {
        let mut request = self.requests.teardown();
        let result = match self.params.rtp_transport {
            RTPTransportProtocol::TCP => connection.send_request(&mut request).await,
            _ => connection
                .ensure_execute(&mut request, &mut self.requests)
                .await
                .map(|_| ()),
        };
        match result {
            Ok(()) => log::info!("Session {} torn down", self.fixed_uri),
            Err(e) => log::warn!("TEARDOWN failed: {}", e),
        }
    }

    async fn receive_over_tcp(
        &mut self,
        connection: &mut RTSPConnection,
        mut tracks: Vec<Track>,
        stop: &CancellationToken,
    ) -> Result<()> {
        let mut channels = HashMap::new();
        for (index, track) in tracks.iter().enumerate() {
            channels.insert(track.rtp_channel, (index, true));
            channels.insert(track.rtcp_channel, (index, false));
        }

        let mut reader = TPKTReader::new();
        let mut next_report = Instant::now() + next_rtcp_report_interval();
        let mut next_keep_alive = self.next_keep_alive();

        loop {
            let event = {
                let stream = connection.reader()?;
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => TcpEvent::Stop,
                    packet = reader.read_packet(stream) => TcpEvent::Packet(packet),
                    _ = sleep_until(next_report) => TcpEvent::Report,
                    _ = sleep_until_some(next_keep_alive) => TcpEvent::KeepAlive,
                }
            };

            match event {
                TcpEvent::Stop => return Ok(()),
                TcpEvent::Packet(packet) => {
                    let packet = packet.map_err(|e| {
                        log::error!("Interleaved receive loop ended: {}", e);
                        e
                    })?;
                    self.activity.store(true, Ordering::Relaxed);

                    match channels.get(&packet.channel) {
                        Some(&(index, true)) => {
                            let mut sink = self.sink.lock();
                            tracks[index].rtp.process(&packet.payload, &mut **sink);
                        }
                        Some(&(index, false)) => tracks[index].rtcp.process(&packet.payload),
                        None => log::debug!("Ignoring data on channel {}", packet.channel),
                    }
                }
                TcpEvent::Report => {
                    for track in tracks.iter_mut() {
                        let packets = track.reports.report_packets(&mut track.rtp, &track.rtcp);
                        let data = RTCPPacket::serialize_compound(&packets);
                        connection.write_interleaved(track.rtcp_channel, &data).await?;
                    }
                    next_report = Instant::now() + next_rtcp_report_interval();
                }
                TcpEvent::KeepAlive => {
                    let mut request = self.requests.get_parameter();
                    connection.send_request(&mut request).await?;
                    next_keep_alive = self.next_keep_alive();
                }
            }
        }
    }

    async fn receive_over_udp(
        &mut self,
        connection: &mut RTSPConnection,
        tracks: Vec<Track>,
        stop: &CancellationToken,
    ) -> Result<()> {
        // Stops the tracks without marking the session as stopped by the caller
        let tracks_stop = stop.child_token();
        let mut tasks = JoinSet::new();
        for track in tracks {
            tasks.spawn(receive_udp_track(
                track,
                self.sink.clone(),
                self.activity.clone(),
                tracks_stop.clone(),
            ));
        }

        let total = tasks.len();
        let mut failures = 0;
        let mut last_error = None;
        let mut next_keep_alive = self.next_keep_alive();

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let result = match joined {
                        None => break,
                        Some(Ok(result)) => result,
                        Some(Err(e)) => Err(ClientError::Io(io::Error::other(e))),
                    };
                    if let Err(e) = result {
                        log::error!("Track receive loop ended: {}", e);
                        failures += 1;
                        last_error = Some(e);
                    }
                }
                _ = sleep_until_some(next_keep_alive) => {
                    let mut request = self.requests.get_parameter();
                    if let Err(e) = connection.ensure_execute(&mut request, &mut self.requests).await {
                        log::error!("Keep-alive failed: {}", e);
                        tracks_stop.cancel();
                        while tasks.join_next().await.is_some() {}
                        return Err(e);
                    }
                    next_keep_alive = self.next_keep_alive();
                }
            }
        }

        match last_error {
            Some(e) if failures == total => Err(e),
            _ => Ok(()),
        }
    }

    fn next_keep_alive(&self) -> Option<Instant> {
        self.supports_get_parameter
            .then(|| Instant::now() + next_keep_alive_interval(self.keep_alive_timeout))
    }
}

impl std::fmt::Debug for RTSPSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTSPSession")
            .field("uri", &self.fixed_uri.as_str())
            .field("transport", &self.params.rtp_transport)
            .field("connected", &self.connection.is_some())
            .field(
                "tracks",
                &self.tracks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Receive loop of one UDP track. Sends RR+SDES+BYE when stopped.
async fn receive_udp_track(
    track: Track,
    sink: SharedSink,
    activity: Arc<AtomicBool>,
    stop: CancellationToken,
) -> Result<()> {
    let Track {
        name,
        mut rtp,
        rtcp,
        reports,
        udp,
        ..
    } = track;
    let sockets = udp.ok_or(RTSPError::InvalidState("track has no UDP sockets"))?;

    let mut rtp_buffer = vec![0u8; UDP_RECEIVE_BUFFER_SIZE];
    let mut rtcp_buffer = vec![0u8; UDP_RECEIVE_BUFFER_SIZE];
    let mut next_report = Instant::now() + next_rtcp_report_interval();

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            received = sockets.rtp.recv(&mut rtp_buffer) => match received {
                Ok(size) => {
                    activity.store(true, Ordering::Relaxed);
                    let mut sink = sink.lock();
                    rtp.process(&rtp_buffer[..size], &mut **sink);
                }
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    log::debug!("Track {}: {}", name, e);
                }
                Err(e) => {
                    log::error!("Track {} RTP socket failed: {}", name, e);
                    return Err(e.into());
                }
            },
            received = sockets.rtcp.recv(&mut rtcp_buffer) => match received {
                Ok(size) => rtcp.process(&rtcp_buffer[..size]),
                Err(e) => log::debug!("Track {} RTCP receive: {}", name, e),
            },
            _ = sleep_until(next_report) => {
                let packets = reports.report_packets(&mut rtp, &rtcp);
                if let Err(e) = sockets.send_report(&RTCPPacket::serialize_compound(&packets)).await {
                    log::warn!("Track {} receiver report not sent: {}", name, e);
                }
                next_report = Instant::now() + next_rtcp_report_interval();
            }
        }
    }

    let packets = reports.goodbye_packets(&mut rtp, &rtcp);
    if let Err(e) = sockets
        .send_report(&RTCPPacket::serialize_compound(&packets))
        .await
    {
        log::debug!("Track {} goodbye not sent: {}", name, e);
    }
    Ok(())
}

/// A token cancelled when either input is cancelled, until the result
/// itself is cancelled.
fn link_tokens(caller: &CancellationToken, shutdown: &CancellationToken) -> CancellationToken {
    let linked = caller.child_token();
    let watcher = linked.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => watcher.cancel(),
            _ = watcher.cancelled() => {}
        }
    });
    linked
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

/// 5 to 6 seconds in 100 ms steps, so receivers do not report in lockstep
fn next_rtcp_report_interval() -> Duration {
    let steps = rand::thread_rng().gen_range(0..=10);
    Duration::from_millis(RTCP_REPORT_INTERVAL_BASE_MS + steps * 100)
}

/// Random point between half and three quarters of the session timeout
fn next_keep_alive_interval(timeout: Duration) -> Duration {
    let timeout_ms = timeout.as_millis() as u64;
    let (low, high) = (timeout_ms / 2, timeout_ms * 3 / 4);
    if low >= high {
        return Duration::from_millis(low);
    }
    Duration::from_millis(rand::thread_rng().gen_range(low..high))
}

fn transport_info(response: &RTSPResponse) -> Result<TransportInfo> {
    let header = response
        .header("Transport")
        .ok_or(RTSPError::MissingHeader("Transport"))?;
    TransportInfo::parse(header)
        .ok_or_else(|| RTSPError::BadResponse(format!("invalid transport: {}", header)).into())
}

/// Session id and keep-alive timeout from a `Session` header.
///
/// An absent or zero timeout means 60 seconds.
fn parse_session_header(header: Option<&str>) -> (Option<String>, Duration) {
    let Some(header) = header.map(str::trim).filter(|header| !header.is_empty()) else {
        return (None, DEFAULT_SESSION_TIMEOUT);
    };
    let (id, parameters) = header.split_once(';').unwrap_or((header, ""));

    let timeout = find_ignore_case(parameters, "timeout")
        .and_then(|start| {
            let value = parameters[start + "timeout".len()..]
                .trim_start()
                .strip_prefix('=')?
                .trim_start_matches([' ', '"']);
            let digits = value
                .find(|c: char| !c.is_ascii_digit())
                .map_or(value, |end| &value[..end]);
            digits.parse::<u64>().ok()
        })
        .filter(|seconds| *seconds != 0)
        .map_or(DEFAULT_SESSION_TIMEOUT, Duration::from_secs);

    (Some(id.trim().to_string()), timeout)
}

fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// Joins `group`, source-specific when a source is known and supported.
fn join_group(
    socket: std::net::UdpSocket,
    group: IpAddr,
    source: Option<IpAddr>,
) -> io::Result<std::net::UdpSocket> {
    let socket = socket2::Socket::from(socket);
    match (group, source) {
        (IpAddr::V4(group), Some(IpAddr::V4(source))) => {
            if let Err(e) = socket.join_ssm_v4(&source, &group, &Ipv4Addr::UNSPECIFIED) {
                log::warn!("Source-specific join of {} failed, joining any-source: {}", group, e);
                socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
            }
        }
        (IpAddr::V4(group), _) => socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?,
        (IpAddr::V6(group), _) => socket.join_multicast_v6(&group, 0)?,
    }
    Ok(socket.into())
}
