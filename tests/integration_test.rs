//! Complete sessions against an in-process RTSP server.

use md5::{Digest, Md5};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rtspio::av::{FrameKind, RawFrame};
use rtspio::config::{ConnectionParameters, RTPTransportProtocol, RequiredTracks};
use rtspio::format::rtcp::RTCPPacket;
use rtspio::format::rtp::RTPPacket;
use rtspio::format::rtsp::{Credentials, RTSPClient, TransportInfo};
use rtspio::format::tpkt;
use rtspio::ClientError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SESSION_ID: &str = "12345678";
const SERVER_SSRC: u32 = 0x1020_3040;
const REALM: &str = "camera";
const NONCE: &str = "0a4f113b";

const SDP: &str = "v=0\r\n\
                   o=- 0 0 IN IP4 127.0.0.1\r\n\
                   s=emulated camera\r\n\
                   t=0 0\r\n\
                   m=audio 0 RTP/AVP 0\r\n\
                   a=rtpmap:0 PCMU/8000\r\n\
                   a=control:trackID=1\r\n\
                   m=application 0 RTP/AVP 107\r\n\
                   a=rtpmap:107 vnd.onvif.metadata/90000\r\n\
                   a=control:trackID=2\r\n";

#[derive(Debug)]
struct Request {
    method: String,
    uri: String,
    headers: Vec<(String, String)>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the emulated camera does after answering PLAY
#[derive(Debug, Clone, Copy, PartialEq)]
enum AfterPlay {
    /// Sends audio packets followed by an RTCP BYE
    StreamThenBye,
    /// Sends nothing
    Silent,
    /// Closes the RTSP connection and waits for the client's RTCP BYE.
    /// Advertises a 2 second session timeout so a keep-alive is due soon.
    HangUp,
}

#[derive(Debug, Clone)]
struct Camera {
    after_play: AfterPlay,
    password: Option<&'static str>,
}

async fn read_request(reader: &mut BufReader<TcpStream>) -> Option<Request> {
    loop {
        let buffer = reader.fill_buf().await.ok()?;
        if buffer.is_empty() {
            return None;
        }
        if buffer[0] != b'$' {
            break;
        }
        // Interleaved RTCP from the client
        let mut header = [0u8; 4];
        reader.read_exact(&mut header).await.ok()?;
        let mut payload = vec![0u8; u16::from_be_bytes([header[2], header[3]]) as usize];
        reader.read_exact(&mut payload).await.ok()?;
    }

    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let line = line.trim_end().to_string();
        if line.is_empty() {
            if lines.is_empty() {
                continue;
            }
            break;
        }
        lines.push(line);
    }

    let mut request_line = lines[0].split(' ');
    let method = request_line.next()?.to_string();
    let uri = request_line.next()?.to_string();
    let headers = lines[1..]
        .iter()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();
    Some(Request {
        method,
        uri,
        headers,
    })
}

async fn respond(stream: &mut TcpStream, request: &Request, status: &str, headers: &[(&str, String)], body: &str) {
    let mut response = format!(
        "RTSP/1.0 {}\r\nCSeq: {}\r\n",
        status,
        request.header("CSeq").unwrap_or("0")
    );
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    if !body.is_empty() {
        response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    response.push_str("\r\n");
    response.push_str(body);
    // The client may already be gone after TEARDOWN
    let _ = stream.write_all(response.as_bytes()).await;
}

fn md5_hex(data: String) -> String {
    hex::encode(Md5::digest(data.as_bytes()))
}

fn digest_parameter<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    let start = header.find(&format!("{}=\"", name))? + name.len() + 2;
    let end = header[start..].find('"')? + start;
    Some(&header[start..end])
}

fn authorized(request: &Request, password: &str) -> bool {
    let Some(header) = request.header("Authorization") else {
        return false;
    };
    let (Some(uri), Some(response)) = (
        digest_parameter(header, "uri"),
        digest_parameter(header, "response"),
    ) else {
        return false;
    };
    let ha1 = md5_hex(format!("admin:{}:{}", REALM, password));
    let ha2 = md5_hex(format!("{}:{}", request.method, uri));
    response == md5_hex(format!("{}:{}:{}", ha1, NONCE, ha2))
}

fn audio_packet(sequence_number: u16) -> Vec<u8> {
    let samples = [0xFFu8; 160];
    RTPPacket::new(0, sequence_number, sequence_number as u32 * 160, SERVER_SSRC, false, &samples)
        .to_bytes()
        .to_vec()
}

fn goodbye() -> Vec<u8> {
    RTCPPacket::serialize_compound(&[RTCPPacket::Goodbye {
        sources: vec![SERVER_SSRC],
        reason: None,
    }])
    .to_vec()
}

/// UDP sockets the server uses for one SETUP
struct ServerPorts {
    rtp: UdpSocket,
    rtcp: UdpSocket,
    client_rtp: SocketAddr,
    client_rtcp: SocketAddr,
}

/// Serves one RTSP connection and returns the methods it received.
async fn serve(listener: TcpListener, camera: Camera) -> Vec<String> {
    let (stream, peer) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(stream);
    let mut methods = Vec::new();
    let mut udp: Option<ServerPorts> = None;
    let content_base = format!("rtsp://{}/live/", listener.local_addr().unwrap());

    while let Some(request) = read_request(&mut reader).await {
        let stream = reader.get_mut();

        if let Some(password) = camera.password {
            if !authorized(&request, password) {
                methods.push(format!("{} (401)", request.method));
                let challenge = format!("Digest realm=\"{}\", nonce=\"{}\"", REALM, NONCE);
                respond(stream, &request, "401 Unauthorized", &[("WWW-Authenticate", challenge)], "").await;
                continue;
            }
        }
        methods.push(request.method.clone());

        match request.method.as_str() {
            "OPTIONS" => {
                let public = "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN, GET_PARAMETER".to_string();
                respond(stream, &request, "200 OK", &[("Public", public)], "").await;
            }
            "DESCRIBE" => {
                let headers = [
                    ("Content-Type", "application/sdp".to_string()),
                    ("Content-Base", content_base.clone()),
                ];
                respond(stream, &request, "200 OK", &headers, SDP).await;
            }
            "SETUP" => {
                assert_eq!(request.uri, format!("{}trackID=1", content_base));
                let transport = TransportInfo::parse(request.header("Transport").unwrap()).unwrap();

                let reply = match transport.client_port {
                    Some((client_rtp, client_rtcp)) => {
                        let rtp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
                        let rtcp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
                        let reply = format!(
                            "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
                            client_rtp,
                            client_rtcp,
                            rtp.local_addr().unwrap().port(),
                            rtcp.local_addr().unwrap().port()
                        );
                        udp = Some(ServerPorts {
                            rtp,
                            rtcp,
                            client_rtp: SocketAddr::new(peer.ip(), client_rtp),
                            client_rtcp: SocketAddr::new(peer.ip(), client_rtcp),
                        });
                        reply
                    }
                    None => {
                        assert_eq!(transport.interleaved, Some((0, 1)));
                        "RTP/AVP/TCP;unicast;interleaved=0-1".to_string()
                    }
                };
                let timeout = if camera.after_play == AfterPlay::HangUp { 2 } else { 60 };
                let headers = [
                    ("Transport", reply),
                    ("Session", format!("{};timeout={}", SESSION_ID, timeout)),
                ];
                respond(stream, &request, "200 OK", &headers, "").await;
            }
            "PLAY" => {
                assert_eq!(request.header("Session"), Some(SESSION_ID));
                respond(stream, &request, "200 OK", &[("Session", SESSION_ID.to_string())], "").await;

                if camera.after_play == AfterPlay::HangUp {
                    break;
                }
                if camera.after_play == AfterPlay::StreamThenBye {
                    match &udp {
                        Some(ports) => {
                            for sequence_number in 1..=3 {
                                ports.rtp.send_to(&audio_packet(sequence_number), ports.client_rtp).await.unwrap();
                            }
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            ports.rtcp.send_to(&goodbye(), ports.client_rtcp).await.unwrap();
                        }
                        None => {
                            for sequence_number in 1..=3 {
                                let frame = tpkt::encode_packet(0, &audio_packet(sequence_number)).unwrap();
                                stream.write_all(&frame).await.unwrap();
                            }
                            stream.write_all(&tpkt::encode_packet(1, &goodbye()).unwrap()).await.unwrap();
                        }
                    }
                }
            }
            "TEARDOWN" => {
                assert_eq!(request.header("Session"), Some(SESSION_ID));
                respond(stream, &request, "200 OK", &[], "").await;
                break;
            }
            _ => respond(stream, &request, "200 OK", &[], "").await,
        }
    }

    if camera.after_play == AfterPlay::HangUp {
        drop(reader);
        if let Some(ports) = &udp {
            let mut buffer = [0u8; 1500];
            while let Ok(Ok((size, _))) =
                tokio::time::timeout(Duration::from_secs(5), ports.rtcp.recv_from(&mut buffer)).await
            {
                let packets = RTCPPacket::parse_compound(&buffer[..size]).unwrap_or_default();
                if packets.iter().any(|packet| matches!(packet, RTCPPacket::Goodbye { .. })) {
                    methods.push("RTCP BYE".to_string());
                    break;
                }
            }
        }
    }
    methods
}

async fn start(camera: Camera) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uri = format!("rtsp://{}/live", listener.local_addr().unwrap());
    (uri, tokio::spawn(serve(listener, camera)))
}

fn audio_only(uri: &str) -> ConnectionParameters {
    ConnectionParameters::new(uri)
        .unwrap()
        .with_required_tracks(RequiredTracks::AUDIO)
}

fn collecting_client(params: ConnectionParameters) -> (RTSPClient, Arc<Mutex<Vec<RawFrame>>>) {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = frames.clone();
    let client = RTSPClient::new(params, move |frame: RawFrame| sink.lock().push(frame));
    (client, frames)
}

fn methods(list: &[&str]) -> Vec<String> {
    list.iter().map(|method| method.to_string()).collect()
}

#[tokio::test]
async fn test_interleaved_session_ends_on_server_bye() {
    let (uri, server) = start(Camera {
        after_play: AfterPlay::StreamThenBye,
        password: None,
    })
    .await;
    let (mut client, frames) = collecting_client(audio_only(&uri));

    let token = CancellationToken::new();
    client.connect(&token).await.unwrap();
    client.receive(&token).await.unwrap();

    let frames = frames.lock();
    assert_eq!(frames.len(), 3);
    for frame in frames.iter() {
        assert_eq!(frame.data.len(), 160);
        assert!(matches!(
            frame.kind,
            FrameKind::G711U {
                sample_rate: 8000,
                channels: 1
            }
        ));
    }

    assert_eq!(
        server.await.unwrap(),
        methods(&["OPTIONS", "DESCRIBE", "SETUP", "PLAY", "TEARDOWN"])
    );
}

#[tokio::test]
async fn test_udp_session_ends_on_server_bye() {
    let (uri, server) = start(Camera {
        after_play: AfterPlay::StreamThenBye,
        password: None,
    })
    .await;
    let params = audio_only(&uri).with_transport(RTPTransportProtocol::UDP);
    let (mut client, frames) = collecting_client(params);

    let token = CancellationToken::new();
    client.connect(&token).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), client.receive(&token))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(frames.lock().len(), 3);
    assert_eq!(
        server.await.unwrap(),
        methods(&["OPTIONS", "DESCRIBE", "SETUP", "PLAY", "TEARDOWN"])
    );
}

#[tokio::test]
async fn test_udp_keep_alive_failure_still_says_goodbye() {
    let (uri, server) = start(Camera {
        after_play: AfterPlay::HangUp,
        password: None,
    })
    .await;
    let params = audio_only(&uri).with_transport(RTPTransportProtocol::UDP);
    let (mut client, _) = collecting_client(params);

    let token = CancellationToken::new();
    client.connect(&token).await.unwrap();
    let error = tokio::time::timeout(Duration::from_secs(5), client.receive(&token))
        .await
        .unwrap()
        .unwrap_err();
    assert!(!matches!(error, ClientError::Cancelled | ClientError::Timeout(_)));

    assert_eq!(
        server.await.unwrap(),
        methods(&["OPTIONS", "DESCRIBE", "SETUP", "PLAY", "RTCP BYE"])
    );
}

#[tokio::test]
async fn test_digest_authentication() {
    let (uri, server) = start(Camera {
        after_play: AfterPlay::StreamThenBye,
        password: Some("secret"),
    })
    .await;
    let params = audio_only(&uri).with_credentials(Credentials::new("admin", "secret"));
    let (mut client, frames) = collecting_client(params);

    let token = CancellationToken::new();
    client.connect(&token).await.unwrap();
    client.receive(&token).await.unwrap();

    assert_eq!(frames.lock().len(), 3);
    assert_eq!(
        server.await.unwrap(),
        methods(&["OPTIONS (401)", "OPTIONS", "DESCRIBE", "SETUP", "PLAY", "TEARDOWN"])
    );
}

#[tokio::test]
async fn test_wrong_password() {
    let (uri, server) = start(Camera {
        after_play: AfterPlay::Silent,
        password: Some("secret"),
    })
    .await;
    let params = audio_only(&uri).with_credentials(Credentials::new("admin", "guess"));
    let (mut client, _) = collecting_client(params);

    let error = client.connect(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(error, ClientError::Authentication(_)));
    assert!(!error.is_transient());
    server.abort();
}

#[tokio::test]
async fn test_cancel_sends_teardown() {
    let (uri, server) = start(Camera {
        after_play: AfterPlay::Silent,
        password: None,
    })
    .await;
    let (mut client, frames) = collecting_client(audio_only(&uri));

    let token = CancellationToken::new();
    client.connect(&token).await.unwrap();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });
    assert!(matches!(
        client.receive(&token).await,
        Err(ClientError::Cancelled)
    ));

    assert!(frames.lock().is_empty());
    assert_eq!(
        server.await.unwrap(),
        methods(&["OPTIONS", "DESCRIBE", "SETUP", "PLAY", "TEARDOWN"])
    );
}

#[tokio::test]
async fn test_cancelled_before_connect() {
    let (uri, server) = start(Camera {
        after_play: AfterPlay::Silent,
        password: None,
    })
    .await;
    let (mut client, _) = collecting_client(audio_only(&uri));

    let token = CancellationToken::new();
    token.cancel();
    assert!(matches!(
        client.connect(&token).await,
        Err(ClientError::Cancelled)
    ));
    assert!(matches!(
        client.receive(&CancellationToken::new()).await,
        Err(ClientError::Rtsp(_))
    ));
    server.abort();
}

#[tokio::test]
async fn test_receive_timeout_without_data() {
    let (uri, server) = start(Camera {
        after_play: AfterPlay::Silent,
        password: None,
    })
    .await;
    let params = audio_only(&uri).with_timeouts(
        Duration::from_secs(5),
        Duration::from_millis(300),
        Duration::from_millis(100),
    );
    let (mut client, _) = collecting_client(params);

    let token = CancellationToken::new();
    client.connect(&token).await.unwrap();
    let error = client.receive(&token).await.unwrap_err();
    assert!(matches!(error, ClientError::Timeout(_)));
    assert!(error.is_transient());
    server.abort();
}

#[tokio::test]
async fn test_no_suitable_tracks() {
    let (uri, server) = start(Camera {
        after_play: AfterPlay::Silent,
        password: None,
    })
    .await;
    let params = ConnectionParameters::new(&uri)
        .unwrap()
        .with_required_tracks(RequiredTracks::VIDEO);
    let (mut client, _) = collecting_client(params);

    let error = client.connect(&CancellationToken::new()).await.unwrap_err();
    assert!(error.to_string().contains("no suitable track"));
    server.abort();
}

/// Live camera check, configured through `RTSPIO_URL` or a `.env` file.
#[tokio::test]
#[ignore]
async fn test_live_camera() {
    dotenv::dotenv().ok();
    let config = rtspio::config::get();
    let params = config.connection_parameters().unwrap();
    let (mut client, frames) = collecting_client(params);

    let token = CancellationToken::new();
    client.connect(&token).await.unwrap();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        canceller.cancel();
    });
    let _ = client.receive(&token).await;
    assert!(!frames.lock().is_empty());
}
