use url::Url;

use super::message::RTSPRequest;
use super::transport::TransportInfo;
use super::RTSPMethod;
use crate::Result;

/// Builds the requests of one session.
///
/// Holds the sequence counter, the content base announced by DESCRIBE and
/// the session id returned by SETUP.
#[derive(Debug, Clone)]
pub struct RTSPRequestFactory {
    uri: Url,
    user_agent: String,
    cseq: u32,
    content_base: Option<Url>,
    session_id: Option<String>,
}

impl RTSPRequestFactory {
    /// Creates a factory for requests against `uri`
    pub fn new(uri: Url, user_agent: impl Into<String>) -> Self {
        Self {
            uri,
            user_agent: user_agent.into(),
            cseq: 0,
            content_base: None,
            session_id: None,
        }
    }

    /// Next sequence number, starting at 1
    pub fn next_cseq(&mut self) -> u32 {
        self.cseq = self.cseq.wrapping_add(1);
        self.cseq
    }

    /// Base for relative track URIs and the PLAY request
    pub fn set_content_base(&mut self, content_base: Url) {
        self.content_base = Some(content_base);
    }

    /// Session id added to every following request
    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into());
    }

    /// Current session id
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// OPTIONS request
    pub fn options(&mut self) -> RTSPRequest {
        self.request(RTSPMethod::OPTIONS, self.uri.to_string())
    }

    /// DESCRIBE request accepting SDP
    pub fn describe(&mut self) -> RTSPRequest {
        let mut request = self.request(RTSPMethod::DESCRIBE, self.uri.to_string());
        request.add_header("Accept", "application/sdp");
        request
    }

    /// SETUP of a track with the given transport
    pub fn setup(&mut self, track_name: &str, transport: &TransportInfo) -> Result<RTSPRequest> {
        let uri = self.track_uri(track_name)?;
        let mut request = self.request(RTSPMethod::SETUP, uri.to_string());
        request.add_header("Transport", transport.to_string());
        Ok(request)
    }

    /// PLAY from the start of the content
    pub fn play(&mut self) -> RTSPRequest {
        let uri = self.content_base_uri().to_string();
        let mut request = self.request(RTSPMethod::PLAY, uri);
        request.add_header("Range", "npt=0.000-");
        request
    }

    /// TEARDOWN of the session
    pub fn teardown(&mut self) -> RTSPRequest {
        self.request(RTSPMethod::TEARDOWN, self.uri.to_string())
    }

    /// Empty GET_PARAMETER used as keep-alive
    pub fn get_parameter(&mut self) -> RTSPRequest {
        self.request(RTSPMethod::GET_PARAMETER, self.uri.to_string())
    }

    /// URI of a track named by `a=control`.
    ///
    /// Absolute names are used as they are. Relative names are appended to
    /// the content base, or the session URI, with a single `/`.
    pub fn track_uri(&self, track_name: &str) -> Result<Url> {
        if let Ok(uri) = Url::parse(track_name) {
            if uri.has_host() {
                return Ok(uri);
            }
        }

        let base = self.content_base_uri();
        let mut joined = base.to_string();
        if let Some(query_start) = joined.find('?') {
            joined.truncate(query_start);
        }
        if !joined.ends_with('/') {
            joined.push('/');
        }
        joined.push_str(track_name.trim_start_matches('/'));
        if let Some(query) = base.query() {
            joined.push('?');
            joined.push_str(query);
        }
        Ok(Url::parse(&joined)?)
    }

    fn content_base_uri(&self) -> &Url {
        self.content_base.as_ref().unwrap_or(&self.uri)
    }

    fn request(&mut self, method: RTSPMethod, uri: String) -> RTSPRequest {
        let mut request = RTSPRequest {
            method,
            uri,
            cseq: self.next_cseq(),
            user_agent: self.user_agent.clone(),
            headers: Vec::new(),
        };
        if let Some(session_id) = &self.session_id {
            request.add_header("Session", session_id.clone());
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn factory(uri: &str) -> RTSPRequestFactory {
        RTSPRequestFactory::new(Url::parse(uri).unwrap(), "rtspio/test")
    }

    #[test]
    fn test_cseq_increments_from_one() {
        let mut factory = factory("rtsp://camera/live");
        assert_eq!(factory.options().cseq, 1);
        assert_eq!(factory.describe().cseq, 2);
        assert_eq!(factory.next_cseq(), 3);
        assert_eq!(factory.play().cseq, 4);
    }

    #[test]
    fn test_describe_and_play_headers() {
        let mut factory = factory("rtsp://camera:554/live");
        let describe = factory.describe();
        assert_eq!(
            describe.headers,
            vec![("Accept".to_string(), "application/sdp".to_string())]
        );

        factory.set_content_base(Url::parse("rtsp://camera:554/live/").unwrap());
        let play = factory.play();
        assert_eq!(play.uri, "rtsp://camera:554/live/");
        assert_eq!(
            play.headers,
            vec![("Range".to_string(), "npt=0.000-".to_string())]
        );
    }

    #[test]
    fn test_session_header_after_setup() {
        let mut factory = factory("rtsp://camera/live");
        assert!(!factory.options().to_string().contains("Session:"));

        factory.set_session_id("12345678");
        let teardown = factory.teardown();
        assert_eq!(
            teardown.headers,
            vec![("Session".to_string(), "12345678".to_string())]
        );
        assert_eq!(factory.session_id(), Some("12345678"));
    }

    #[test]
    fn test_track_uri_joining() {
        let mut factory = factory("rtsp://camera/live");
        assert_eq!(
            factory.track_uri("trackID=1").unwrap().as_str(),
            "rtsp://camera/live/trackID=1"
        );
        assert_eq!(
            factory.track_uri("rtsp://other/stream/track2").unwrap().as_str(),
            "rtsp://other/stream/track2"
        );

        factory.set_content_base(Url::parse("rtsp://camera/live/").unwrap());
        assert_eq!(
            factory.track_uri("trackID=1").unwrap().as_str(),
            "rtsp://camera/live/trackID=1"
        );
    }

    #[test]
    fn test_track_uri_keeps_query() {
        let factory = factory("rtsp://camera/cam?channel=1");
        assert_eq!(
            factory.track_uri("track1").unwrap().as_str(),
            "rtsp://camera/cam/track1?channel=1"
        );
    }

    #[test]
    fn test_setup_transport_header() {
        let mut factory = factory("rtsp://camera/live");
        let setup = factory
            .setup("track1", &TransportInfo::new_tcp_interleaved((0, 1)))
            .unwrap();
        assert_eq!(setup.method, RTSPMethod::SETUP);
        assert_eq!(setup.uri, "rtsp://camera/live/track1");
        assert_eq!(
            setup.headers,
            vec![(
                "Transport".to_string(),
                "RTP/AVP/TCP;unicast;interleaved=0-1".to_string()
            )]
        );
    }
}
