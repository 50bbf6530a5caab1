//! # AAC Depacketization
//!
//! Splits RFC 3640 `mpeg4-generic` payloads into access units using the
//! AU header layout negotiated in the session description.
//!
//! ```rust
//! use rtspio::codec::aac::AudioSpecificConfig;
//!
//! let config = AudioSpecificConfig::parse(&[0x12, 0x10]).unwrap();
//! assert_eq!(config.sample_rate, 44100);
//! assert_eq!(config.channel_configuration, 2);
//! ```

mod parser;
mod types;

pub use parser::AACAudioPayloadParser;
pub use types::{sample_rate, AudioSpecificConfig, ProfileType};
