//! # Session Description Parsing
//!
//! Extracts the media tracks of an SDP document returned by DESCRIBE.
//! Only the lines a receiving client needs are interpreted:
//!
//! - `m=` opens a track and names its RTP payload type
//! - `a=rtpmap` sets the codec, clock rate and channel count
//! - `a=fmtp` carries codec parameters (parameter sets, AAC AU layout)
//! - `a=control` names the track URI
//!
//! ```rust
//! use rtspio::codec::CodecInfo;
//! use rtspio::format::sdp;
//!
//! let tracks = sdp::parse("m=video 0 RTP/AVP 26\r\na=control:track1\r\n").unwrap();
//! assert_eq!(tracks[0].track_name, "track1");
//! assert_eq!(tracks[0].codec, CodecInfo::MJPEG);
//! assert_eq!(tracks[0].samples_frequency, 90000);
//! ```

use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::codec::h264::START_MARKER;
use crate::codec::{CodecInfo, G711Law};

/// AU header layout used when an AAC track carries no `fmtp` line
const DEFAULT_AAC_LAYOUT: (u32, u32, u32) = (13, 3, 3);

/// Errors that can occur while parsing a session description
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SDPError {
    /// The document has no content
    #[error("empty SDP document")]
    Empty,

    /// A required `fmtp` parameter is absent
    #[error("{0} parameter is not found")]
    MissingParameter(&'static str),

    /// A format parameter is malformed
    #[error("bad format parameter: {0}")]
    BadParameter(String),
}

/// Specialized Result type for SDP parsing
pub type Result<T> = std::result::Result<T, SDPError>;

/// One negotiable media track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrackInfo {
    /// Value of `a=control`, absolute or relative to the content base
    pub track_name: String,
    /// Codec and its parameters
    pub codec: CodecInfo,
    /// RTP clock rate in Hz
    pub samples_frequency: u32,
}

#[derive(Debug)]
struct PayloadFormat {
    payload_type: u8,
    track_name: Option<String>,
    codec: Option<CodecInfo>,
    samples_frequency: u32,
}

/// Parses the tracks of an SDP document.
///
/// Tracks without a control attribute or without a recognised codec are
/// left out.
///
/// # Errors
///
/// Fails on an empty document, on undecodable parameter sets or AAC
/// config, and on an AAC `fmtp` line missing one of the AU header lengths.
pub fn parse(text: &str) -> Result<Vec<MediaTrackInfo>> {
    if text.trim().is_empty() {
        return Err(SDPError::Empty);
    }

    let mut formats: Vec<PayloadFormat> = Vec::new();

    for line in text.lines().map(str::trim) {
        if let Some(media) = line.strip_prefix("m=") {
            if let Some(format) = parse_media_line(media) {
                formats.push(format);
            }
        } else if let Some(attribute) = line.strip_prefix("a=") {
            parse_attribute(attribute, &mut formats)?;
        }
    }

    Ok(formats
        .into_iter()
        .filter_map(|format| {
            Some(MediaTrackInfo {
                track_name: format.track_name?,
                codec: format.codec?,
                samples_frequency: format.samples_frequency,
            })
        })
        .collect())
}

fn parse_media_line(media: &str) -> Option<PayloadFormat> {
    let payload_type = media.rsplit(' ').next()?.trim().parse::<u8>().ok()?;
    Some(PayloadFormat {
        payload_type,
        track_name: None,
        codec: static_codec(payload_type),
        samples_frequency: static_clock_rate(payload_type),
    })
}

fn parse_attribute(attribute: &str, formats: &mut [PayloadFormat]) -> Result<()> {
    let Some((name, value)) = attribute.split_once(':') else {
        return Ok(());
    };
    let value = value.trim_start();
    if value.is_empty() {
        return Ok(());
    }

    match name.trim().to_ascii_uppercase().as_str() {
        "RTPMAP" => parse_rtpmap(value, formats),
        "CONTROL" => {
            if let Some(format) = formats.last_mut() {
                format.track_name = Some(value.to_string());
            }
        }
        "FMTP" => return parse_fmtp(value, formats),
        _ => {}
    }
    Ok(())
}

/// Format of the most recent `m=` line using `payload_type`
fn find_format<'a>(
    formats: &'a mut [PayloadFormat],
    payload_type: &str,
) -> Option<&'a mut PayloadFormat> {
    let payload_type = payload_type.parse::<u8>().ok()?;
    formats
        .iter_mut()
        .rev()
        .find(|format| format.payload_type == payload_type)
}

fn parse_rtpmap(value: &str, formats: &mut [PayloadFormat]) {
    let Some((payload_type, encoding)) = value.split_once(' ') else {
        return;
    };
    let Some(format) = find_format(formats, payload_type) else {
        return;
    };

    let mut parts = encoding.trim().split('/');
    let codec_name = parts.next().unwrap_or_default().to_ascii_uppercase();
    let clock_rate = parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
    let channels = parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(0);

    if clock_rate != 0 {
        format.samples_frequency = clock_rate;
    }
    format.codec = dynamic_codec(&codec_name, format.samples_frequency, channels);
}

fn parse_fmtp(value: &str, formats: &mut [PayloadFormat]) -> Result<()> {
    let Some((payload_type, parameters)) = value.split_once(' ') else {
        return Ok(());
    };
    let Some(format) = find_format(formats, payload_type) else {
        return Ok(());
    };

    let parameters: Vec<&str> = parameters.split(';').map(str::trim).collect();
    match &mut format.codec {
        Some(CodecInfo::H264 {
            sprop_parameter_sets,
        }) => {
            if let Some(sets) = find_parameter(&parameters, "sprop-parameter-sets")? {
                *sprop_parameter_sets = decode_parameter_sets(sets)?;
            }
        }
        Some(CodecInfo::H265 {
            vps,
            sps,
            pps,
            has_donl,
        }) => {
            for (name, target) in [("sprop-vps", vps), ("sprop-sps", sps), ("sprop-pps", pps)] {
                if let Some(set) = find_parameter(&parameters, name)? {
                    *target = decode_base64(set.split(',').next().unwrap_or_default())?;
                }
            }
            if let Some(diff) = find_parameter(&parameters, "sprop-max-don-diff")? {
                *has_donl = diff.parse::<u32>().map(|d| d > 0).map_err(|_| {
                    SDPError::BadParameter(format!("sprop-max-don-diff={}", diff))
                })?;
            }
        }
        Some(CodecInfo::AAC {
            config,
            size_length,
            index_length,
            index_delta_length,
        }) => {
            *size_length = required_length(&parameters, "sizeLength")?;
            *index_length = required_length(&parameters, "indexLength")?;
            *index_delta_length = required_length(&parameters, "indexDeltaLength")?;
            if let Some(hex_config) = find_parameter(&parameters, "config")? {
                *config = hex::decode(hex_config)
                    .map(Bytes::from)
                    .map_err(|e| SDPError::BadParameter(format!("config={}: {}", hex_config, e)))?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Value of `name=value` among `parameters`, matching the name without case.
fn find_parameter<'a>(parameters: &[&'a str], name: &str) -> Result<Option<&'a str>> {
    let Some(parameter) = parameters.iter().find(|parameter| {
        parameter
            .split('=')
            .next()
            .is_some_and(|key| key.trim().eq_ignore_ascii_case(name))
    }) else {
        return Ok(None);
    };

    match parameter.split_once('=') {
        Some((_, value)) if !value.trim().is_empty() => Ok(Some(value.trim())),
        _ => Err(SDPError::BadParameter(parameter.to_string())),
    }
}

fn required_length(parameters: &[&str], name: &'static str) -> Result<u32> {
    let value = find_parameter(parameters, name)?.ok_or(SDPError::MissingParameter(name))?;
    value
        .parse()
        .map_err(|_| SDPError::BadParameter(format!("{}={}", name, value)))
}

fn decode_base64(text: &str) -> Result<Bytes> {
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map(Bytes::from)
        .map_err(|e| SDPError::BadParameter(format!("{}: {}", text, e)))
}

/// Decodes comma separated base64 sets into one start-code prefixed blob.
fn decode_parameter_sets(text: &str) -> Result<Bytes> {
    let mut sets = BytesMut::new();
    for set in text.split(',').filter(|set| !set.trim().is_empty()) {
        sets.put_slice(&START_MARKER);
        sets.put_slice(&decode_base64(set)?);
    }
    Ok(sets.freeze())
}

fn static_codec(payload_type: u8) -> Option<CodecInfo> {
    Some(match payload_type {
        0 => CodecInfo::G711 {
            law: G711Law::MuLaw,
            sample_rate: 8000,
            channels: 1,
        },
        2 => CodecInfo::G726 {
            bitrate: 32000,
            sample_rate: 8000,
            channels: 1,
        },
        8 => CodecInfo::G711 {
            law: G711Law::ALaw,
            sample_rate: 8000,
            channels: 1,
        },
        10 => CodecInfo::PCM {
            sample_rate: 44100,
            bits_per_sample: 16,
            channels: 2,
        },
        11 => CodecInfo::PCM {
            sample_rate: 44100,
            bits_per_sample: 16,
            channels: 1,
        },
        26 => CodecInfo::MJPEG,
        _ => return None,
    })
}

/// RTP clock rate of a static payload type (RFC 3551)
fn static_clock_rate(payload_type: u8) -> u32 {
    match payload_type {
        0 | 2..=5 | 7..=9 | 12 | 15 | 18 => 8000,
        6 => 16000,
        10 | 11 => 44100,
        16 => 11025,
        17 => 22050,
        14 | 25 | 26 | 28 | 31..=34 => 90000,
        _ => 0,
    }
}

fn dynamic_codec(name: &str, samples_frequency: u32, channels: u8) -> Option<CodecInfo> {
    let sample_rate = if samples_frequency != 0 {
        samples_frequency
    } else {
        8000
    };
    let channels = channels.max(1);

    Some(match name {
        "JPEG" => CodecInfo::MJPEG,
        "H264" => CodecInfo::H264 {
            sprop_parameter_sets: Bytes::new(),
        },
        "H265" => CodecInfo::H265 {
            vps: Bytes::new(),
            sps: Bytes::new(),
            pps: Bytes::new(),
            has_donl: false,
        },
        "PCMU" | "PCMA" => CodecInfo::G711 {
            law: if name == "PCMU" {
                G711Law::MuLaw
            } else {
                G711Law::ALaw
            },
            sample_rate,
            channels,
        },
        "L16" | "L8" => CodecInfo::PCM {
            sample_rate,
            bits_per_sample: if name == "L16" { 16 } else { 8 },
            channels,
        },
        "MPEG4-GENERIC" => {
            let (size_length, index_length, index_delta_length) = DEFAULT_AAC_LAYOUT;
            CodecInfo::AAC {
                config: Bytes::new(),
                size_length,
                index_length,
                index_delta_length,
            }
        }
        "VND.ONVIF.METADATA" => CodecInfo::OnvifMetadata,
        _ if name.contains("726") => {
            let bitrate = ["16", "24", "32", "40"]
                .iter()
                .find(|rate| name.contains(*rate))
                .and_then(|rate| rate.parse::<u32>().ok())?
                * 1000;
            CodecInfo::G726 {
                bitrate,
                sample_rate,
                channels,
            }
        }
        _ => return None,
    })
}
