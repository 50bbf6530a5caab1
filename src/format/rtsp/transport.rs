use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// Parsed `Transport` header of a SETUP request or response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportInfo {
    /// Transport specifier such as `RTP/AVP/TCP`
    pub protocol: String,
    /// Unicast or multicast delivery
    pub cast_type: CastType,
    /// Interleaved channel pair on the RTSP connection
    pub interleaved: Option<(u8, u8)>,
    /// Client RTP/RTCP port pair
    pub client_port: Option<(u16, u16)>,
    /// Server RTP/RTCP port pair
    pub server_port: Option<(u16, u16)>,
    /// Multicast RTP/RTCP port pair
    pub port: Option<(u16, u16)>,
    /// Multicast group or unicast destination
    pub destination: Option<IpAddr>,
    /// Address the stream is sent from
    pub source: Option<IpAddr>,
    /// Multicast time to live
    pub ttl: Option<u8>,
    /// Synchronization source the server will use
    pub ssrc: Option<u32>,
    /// `PLAY` or `RECORD`
    pub mode: Option<String>,
    /// Parameters not interpreted above
    pub extra_params: HashMap<String, Option<String>>,
}

/// Delivery mode of a transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CastType {
    /// Point to point delivery
    #[default]
    Unicast,
    /// Group delivery
    Multicast,
}

impl TransportInfo {
    /// Transport for RTP interleaved on the RTSP connection
    pub fn new_tcp_interleaved(channels: (u8, u8)) -> Self {
        Self {
            protocol: "RTP/AVP/TCP".to_string(),
            interleaved: Some(channels),
            ..Self::default()
        }
    }

    /// Transport for RTP over UDP to the given client ports
    pub fn new_udp_unicast(ports: (u16, u16)) -> Self {
        Self {
            protocol: "RTP/AVP/UDP".to_string(),
            client_port: Some(ports),
            ..Self::default()
        }
    }

    /// Transport asking the server for a multicast group
    pub fn new_udp_multicast() -> Self {
        Self {
            protocol: "RTP/AVP".to_string(),
            cast_type: CastType::Multicast,
            ..Self::default()
        }
    }

    /// Parse a transport string into TransportInfo.
    ///
    /// Only the first transport of a comma separated list is read.
    /// Parameter names are matched without case.
    pub fn parse(transport: &str) -> Option<Self> {
        let transport = transport.split(',').next()?.trim();
        let mut parts = transport.split(';');

        let protocol = parts.next()?.trim();
        if protocol.is_empty() {
            return None;
        }

        let mut info = TransportInfo {
            protocol: protocol.to_string(),
            ..Self::default()
        };

        for part in parts.map(str::trim).filter(|part| !part.is_empty()) {
            let (key, value) = match part.split_once('=') {
                Some((key, value)) => (key.trim().to_ascii_lowercase(), Some(value.trim())),
                None => (part.to_ascii_lowercase(), None),
            };

            match (key.as_str(), value) {
                ("unicast", None) => info.cast_type = CastType::Unicast,
                ("multicast", None) => info.cast_type = CastType::Multicast,
                ("interleaved", Some(value)) => info.interleaved = parse_pair(value),
                ("client_port", Some(value)) => info.client_port = parse_pair(value),
                ("server_port", Some(value)) => info.server_port = parse_pair(value),
                ("port", Some(value)) => info.port = parse_pair(value),
                ("destination", Some(value)) => info.destination = value.parse().ok(),
                ("source", Some(value)) => info.source = value.parse().ok(),
                ("ttl", Some(value)) => info.ttl = value.parse().ok(),
                ("ssrc", Some(value)) => {
                    info.ssrc = u32::from_str_radix(value.trim_start_matches("0x"), 16).ok()
                }
                ("mode", Some(value)) => info.mode = Some(value.trim_matches('"').to_string()),
                (key, value) => {
                    info.extra_params
                        .insert(key.to_string(), value.map(str::to_string));
                }
            }
        }

        Some(info)
    }

    /// The server's RTP/RTCP pair for the negotiated mode.
    ///
    /// Interleaved channels take precedence, then the multicast `port`,
    /// then `server_port`.
    pub fn server_channels(&self) -> Option<(u16, u16)> {
        if let Some((rtp, rtcp)) = self.interleaved {
            return Some((rtp.into(), rtcp.into()));
        }
        match self.cast_type {
            CastType::Multicast => self.port.or(self.server_port),
            CastType::Unicast => self.server_port,
        }
    }
}

/// Reads `a-b`, or a single `a` meaning `a-(a+1)`.
fn parse_pair<T>(value: &str) -> Option<(T, T)>
where
    T: std::str::FromStr + Copy + TryFrom<u32>,
    u32: From<T>,
{
    match value.split_once('-') {
        Some((first, second)) => Some((first.trim().parse().ok()?, second.trim().parse().ok()?)),
        None => {
            let first: T = value.trim().parse().ok()?;
            let second = T::try_from(u32::from(first) + 1).ok()?;
            Some((first, second))
        }
    }
}

impl fmt::Display for TransportInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.protocol)?;
        f.write_str(match self.cast_type {
            CastType::Unicast => ";unicast",
            CastType::Multicast => ";multicast",
        })?;

        if let Some(destination) = self.destination {
            write!(f, ";destination={}", destination)?;
        }
        if let Some(source) = self.source {
            write!(f, ";source={}", source)?;
        }
        if let Some((rtp, rtcp)) = self.interleaved {
            write!(f, ";interleaved={}-{}", rtp, rtcp)?;
        }
        if let Some((rtp, rtcp)) = self.client_port {
            write!(f, ";client_port={}-{}", rtp, rtcp)?;
        }
        if let Some((rtp, rtcp)) = self.server_port {
            write!(f, ";server_port={}-{}", rtp, rtcp)?;
        }
        if let Some((rtp, rtcp)) = self.port {
            write!(f, ";port={}-{}", rtp, rtcp)?;
        }
        if let Some(ttl) = self.ttl {
            write!(f, ";ttl={}", ttl)?;
        }
        if let Some(ssrc) = self.ssrc {
            write!(f, ";ssrc={:08X}", ssrc)?;
        }
        if let Some(ref mode) = self.mode {
            write!(f, ";mode={}", mode)?;
        }

        let mut extra: Vec<_> = self.extra_params.iter().collect();
        extra.sort();
        for (key, value) in extra {
            match value {
                Some(value) => write!(f, ";{}={}", key, value)?,
                None => write!(f, ";{}", key)?,
            }
        }
        Ok(())
    }
}
