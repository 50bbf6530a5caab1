//! # Elementary Frames
//!
//! Everything a payload parser hands to the application is a [`RawFrame`]:
//! a timestamp, the frame bytes and a [`FrameKind`] carrying the
//! codec-specific side data needed to decode it.

mod frame;
pub use frame::*;
