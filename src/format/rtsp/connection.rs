use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use url::Url;

use super::auth::{Authenticator, Credentials};
use super::message::{self, RTSPRequest, RTSPResponse};
use super::request_factory::RTSPRequestFactory;
use super::{RTSPError, DEFAULT_RTSP_PORT};
use crate::format::tpkt;
use crate::{ClientError, Result};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Byte channel carrying RTSP messages and interleaved data.
#[async_trait]
pub trait RTSPTransport: Send {
    /// Opens the channel
    async fn connect(&mut self) -> Result<()>;

    /// Address of the server, once connected
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Sends raw bytes to the server
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Buffered reader over the server to client direction
    fn reader(&mut self) -> Result<&mut (dyn AsyncBufRead + Unpin + Send)>;
}

/// RTSP over a plain TCP connection
#[derive(Debug)]
pub struct TcpTransport {
    uri: Url,
    remote_addr: Option<SocketAddr>,
    reader: Option<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
}

impl TcpTransport {
    /// Creates an unconnected transport for `uri`; port 554 if absent
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            remote_addr: None,
            reader: None,
            writer: None,
        }
    }
}

#[async_trait]
impl RTSPTransport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        let host = self
            .uri
            .host_str()
            .ok_or_else(|| ClientError::Config(format!("no host in {}", self.uri)))?;
        let port = self.uri.port().unwrap_or(DEFAULT_RTSP_PORT);
        let addr = format!("{}:{}", host, port);

        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        self.remote_addr = Some(stream.peer_addr()?);
        log::debug!("Connected to {}", addr);

        let (reader, writer) = stream.into_split();
        self.reader = Some(BufReader::with_capacity(READ_BUFFER_SIZE, reader));
        self.writer = Some(writer);
        Ok(())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or(RTSPError::InvalidState("client is not connected"))?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    fn reader(&mut self) -> Result<&mut (dyn AsyncBufRead + Unpin + Send)> {
        match self.reader.as_mut() {
            Some(reader) => Ok(reader),
            None => Err(RTSPError::InvalidState("client is not connected").into()),
        }
    }
}

/// A transport plus the request/response exchange on top of it.
///
/// Answers 401 once per connection: the request is re-sent with a new
/// CSeq and an `Authorization` header built from the challenge.
pub struct RTSPConnection {
    transport: Box<dyn RTSPTransport>,
    credentials: Option<Credentials>,
    authenticator: Option<Authenticator>,
    auth_uri: String,
}

impl RTSPConnection {
    /// Wraps a transport.
    ///
    /// `auth_uri` is the URI hashed into Digest responses.
    pub fn new(
        transport: Box<dyn RTSPTransport>,
        credentials: Option<Credentials>,
        auth_uri: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            authenticator: None,
            auth_uri: auth_uri.into(),
        }
    }

    /// Opens the underlying transport
    pub async fn connect(&mut self) -> Result<()> {
        self.transport.connect().await
    }

    /// Address of the server
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.transport.remote_addr()
    }

    /// Sends a request without waiting for the response
    pub async fn send_request(&mut self, request: &mut RTSPRequest) -> Result<()> {
        if let Some(authenticator) = &self.authenticator {
            let value =
                authenticator.response(request.cseq, &self.auth_uri, request.method.as_str(), &[]);
            request.set_header("Authorization", value);
        }
        log::debug!("Sending {} {} (CSeq {})", request.method, request.uri, request.cseq);
        self.transport.write(&request.to_bytes()).await
    }

    /// Sends a request and reads its response, authenticating once on 401.
    pub async fn execute(
        &mut self,
        request: &mut RTSPRequest,
        requests: &mut RTSPRequestFactory,
    ) -> Result<RTSPResponse> {
        self.send_request(request).await?;
        let response = self.read_response().await?;
        if response.status_code != 401 {
            return Ok(response);
        }

        let challenge = response.header("WWW-Authenticate");
        let (Some(credentials), None, Some(challenge)) =
            (&self.credentials, &self.authenticator, challenge)
        else {
            return response.ensure_ok();
        };

        log::info!("Server requested authentication for {}", request.method);
        self.authenticator = Some(Authenticator::from_challenge(
            credentials.clone(),
            challenge,
        )?);
        request.cseq = requests.next_cseq();

        self.send_request(request).await?;
        let response = self.read_response().await?;
        if response.status_code == 401 {
            return response.ensure_ok();
        }
        Ok(response)
    }

    /// Like [`execute`](Self::execute) but any status other than 200 is an error
    pub async fn ensure_execute(
        &mut self,
        request: &mut RTSPRequest,
        requests: &mut RTSPRequestFactory,
    ) -> Result<RTSPResponse> {
        self.execute(request, requests).await?.ensure_ok()
    }

    /// Reads the next RTSP response
    pub async fn read_response(&mut self) -> Result<RTSPResponse> {
        message::read_response(self.transport.reader()?).await
    }

    /// Reader for the interleaved data that follows PLAY
    pub fn reader(&mut self) -> Result<&mut (dyn AsyncBufRead + Unpin + Send)> {
        self.transport.reader()
    }

    /// Sends one interleaved frame
    pub async fn write_interleaved(&mut self, channel: u8, payload: &[u8]) -> Result<()> {
        let frame = tpkt::encode_packet(channel, payload)?;
        self.transport.write(&frame).await
    }
}

impl std::fmt::Debug for RTSPConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTSPConnection")
            .field("remote_addr", &self.transport.remote_addr())
            .field("authenticated", &self.authenticator.is_some())
            .finish()
    }
}
