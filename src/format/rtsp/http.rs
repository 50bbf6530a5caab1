use async_trait::async_trait;
use base64::Engine as _;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use url::Url;

use super::auth::{Authenticator, Credentials};
use super::connection::RTSPTransport;
use super::message::{self, RTSPResponse};
use super::{RTSPError, DEFAULT_HTTP_PORT};
use crate::{ClientError, Result};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// RTSP tunnelled through HTTP.
///
/// A long-lived GET connection carries responses and media from the server.
/// Every client message goes out on its own short POST connection with a
/// base64 body. Both sides are tied together by `x-sessioncookie`.
pub struct HttpTunnelTransport {
    uri: Url,
    credentials: Option<Credentials>,
    authenticator: Option<Authenticator>,
    session_cookie: String,
    command_counter: u32,
    remote_addr: Option<SocketAddr>,
    data: Option<BufReader<TcpStream>>,
}

impl HttpTunnelTransport {
    /// Creates an unconnected tunnel for an `http://` URI; port 80 if absent
    pub fn new(uri: Url, credentials: Option<Credentials>) -> Self {
        Self {
            uri,
            credentials,
            authenticator: None,
            session_cookie: String::new(),
            command_counter: 0,
            remote_addr: None,
            data: None,
        }
    }

    fn address(&self) -> Result<String> {
        let host = self
            .uri
            .host_str()
            .ok_or_else(|| ClientError::Config(format!("no host in {}", self.uri)))?;
        Ok(format!(
            "{}:{}",
            host,
            self.uri.port().unwrap_or(DEFAULT_HTTP_PORT)
        ))
    }

    fn path_and_query(&self) -> String {
        match self.uri.query() {
            Some(query) => format!("{}?{}", self.uri.path(), query),
            None => self.uri.path().to_string(),
        }
    }

    fn authorization_header(&mut self, method: &str, body: &[u8]) -> String {
        self.command_counter += 1;
        match &self.authenticator {
            Some(authenticator) => format!(
                "Authorization: {}\r\n",
                authenticator.response(self.command_counter, &self.path_and_query(), method, body)
            ),
            None => String::new(),
        }
    }

    fn get_request(&mut self) -> String {
        let authorization = self.authorization_header("GET", &[]);
        format!(
            "GET {} HTTP/1.0\r\n\
             x-sessioncookie: {}\r\n\
             Accept: application/x-rtsp-tunnelled\r\n\
             Pragma: no-cache\r\n\
             Cache-Control: no-cache\r\n\
             {}\r\n",
            self.path_and_query(),
            self.session_cookie,
            authorization
        )
    }

    fn post_request(&mut self, body: &[u8]) -> String {
        let authorization = self.authorization_header("POST", body);
        format!(
            "POST {} HTTP/1.0\r\n\
             x-sessioncookie: {}\r\n\
             Content-Type: application/x-rtsp-tunnelled\r\n\
             Pragma: no-cache\r\n\
             Cache-Control: no-cache\r\n\
             Content-Length: {}\r\n\
             Expires: Sun, 9 Jan 1972 00:00:00 GMT\r\n\
             {}\r\n",
            self.path_and_query(),
            self.session_cookie,
            body.len(),
            authorization
        )
    }

    /// Opens the GET connection and returns its response head.
    async fn open_data_connection(&mut self) -> Result<RTSPResponse> {
        let stream = TcpStream::connect(self.address()?).await?;
        stream.set_nodelay(true)?;
        self.remote_addr = Some(stream.peer_addr()?);

        let mut data = BufReader::with_capacity(READ_BUFFER_SIZE, stream);
        let request = self.get_request();
        data.get_mut().write_all(request.as_bytes()).await?;

        let head = message::read_head(&mut data, "HTTP/").await?;
        let response = RTSPResponse::parse_head(head.iter().map(String::as_str))?;
        self.data = Some(data);
        Ok(response)
    }
}

#[async_trait]
impl RTSPTransport for HttpTunnelTransport {
    async fn connect(&mut self) -> Result<()> {
        self.command_counter = 0;
        self.session_cookie = hex::encode(rand::random::<[u8; 5]>());

        let mut response = self.open_data_connection().await?;

        if response.status_code == 401 && self.authenticator.is_none() {
            let challenge = response.header("WWW-Authenticate").map(str::to_string);
            if let (Some(credentials), Some(challenge)) = (self.credentials.clone(), challenge) {
                log::info!("HTTP tunnel requested authentication");
                self.authenticator = Some(Authenticator::from_challenge(credentials, &challenge)?);
                self.data = None;
                response = self.open_data_connection().await?;
            }
        }

        if !response.is_ok() {
            self.data = None;
            return Err(ClientError::BadStatus {
                code: response.status_code,
                reason: response.reason,
            });
        }
        log::debug!("HTTP tunnel open with cookie {}", self.session_cookie);
        Ok(())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.data.is_none() {
            return Err(RTSPError::InvalidState("client is not connected").into());
        }

        let body = base64::engine::general_purpose::STANDARD.encode(data);
        let header = self.post_request(body.as_bytes());

        let mut commands = TcpStream::connect(self.address()?).await?;
        commands.write_all(header.as_bytes()).await?;
        commands.write_all(body.as_bytes()).await?;
        commands.flush().await?;
        commands.shutdown().await?;
        Ok(())
    }

    fn reader(&mut self) -> Result<&mut (dyn AsyncBufRead + Unpin + Send)> {
        match self.data.as_mut() {
            Some(data) => Ok(data),
            None => Err(RTSPError::InvalidState("client is not connected").into()),
        }
    }
}

impl std::fmt::Debug for HttpTunnelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTunnelTransport")
            .field("uri", &self.uri.as_str())
            .field("session_cookie", &self.session_cookie)
            .field("connected", &self.data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt};
    use tokio::net::TcpListener;

    async fn read_request(stream: &mut BufReader<TcpStream>) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            stream.read_line(&mut line).await.unwrap();
            let line = line.trim_end().to_string();
            if line.is_empty() {
                return lines;
            }
            lines.push(line);
        }
    }

    #[tokio::test]
    async fn test_tunnel_get_and_post() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (get, _) = listener.accept().await.unwrap();
            let mut get = BufReader::new(get);
            let get_head = read_request(&mut get).await;
            get.get_mut()
                .write_all(b"HTTP/1.0 200 OK\r\nContent-Type: application/x-rtsp-tunnelled\r\n\r\nRTSP/1.0 200 OK\r\n")
                .await
                .unwrap();

            let (post, _) = listener.accept().await.unwrap();
            let mut post = BufReader::new(post);
            let post_head = read_request(&mut post).await;
            let mut body = String::new();
            post.read_to_string(&mut body).await.unwrap();
            (get_head, post_head, body)
        });

        let uri = Url::parse(&format!("http://{}/cam?ch=1", addr)).unwrap();
        let mut tunnel = HttpTunnelTransport::new(uri, None);
        tunnel.connect().await.unwrap();
        tunnel.write(b"OPTIONS * RTSP/1.0\r\n\r\n").await.unwrap();

        let mut line = String::new();
        tunnel.reader().unwrap().read_line(&mut line).await.unwrap();
        assert_eq!(line, "RTSP/1.0 200 OK\r\n");

        let (get_head, post_head, body) = server.await.unwrap();
        assert_eq!(get_head[0], "GET /cam?ch=1 HTTP/1.0");
        let cookie = get_head
            .iter()
            .find(|line| line.starts_with("x-sessioncookie: "))
            .unwrap();
        assert_eq!(cookie.len(), "x-sessioncookie: ".len() + 10);

        assert_eq!(post_head[0], "POST /cam?ch=1 HTTP/1.0");
        assert!(post_head.contains(cookie));
        assert_eq!(
            base64::engine::general_purpose::STANDARD.decode(body).unwrap(),
            b"OPTIONS * RTSP/1.0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_tunnel_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut get, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = get.read(&mut buf).await;
            get.write_all(b"HTTP/1.0 403 Forbidden\r\n\r\n").await.unwrap();
        });

        let uri = Url::parse(&format!("http://{}/", addr)).unwrap();
        let mut tunnel = HttpTunnelTransport::new(uri, None);
        let error = tunnel.connect().await.unwrap_err();
        assert!(matches!(error, ClientError::BadStatus { code: 403, .. }));
        assert!(tunnel.reader().is_err());
    }
}
