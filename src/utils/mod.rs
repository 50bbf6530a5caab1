//! # Utility Functions and Types
//!
//! Binary helpers used throughout the rtspio library:
//!
//! - Bit-level reading for NAL unit and AAC headers
//! - Big-endian integer reads and byte-pattern search
//! - A fixed-capacity slot pool for the RTP reorder window
//! - A bounded growable buffer for fragment reassembly
//!
//! ## Bit Operations
//!
//! ```rust
//! use rtspio::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! let value = reader.read_bits(3)?;
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// Big-endian reads and pattern search
pub mod bytes;

/// Fixed-capacity byte slot pool
pub mod chunks;

/// Bounded growable buffer
pub mod elastic;

pub use bits::BitReader;
pub use chunks::ChunksArray;
pub use elastic::ElasticBuffer;
