//! # TPKT Interleaved Framing
//!
//! When RTP runs over the RTSP TCP connection, every RTP and RTCP packet is
//! wrapped in a 4-byte header:
//!
//! ```text
//!  0        1          2-3
//! +--------+---------+----------------+---------------+
//! |  0x24  | channel | length (BE u16) | payload ...   |
//! +--------+---------+----------------+---------------+
//! ```
//!
//! RTSP responses to keep-alive requests share the same byte stream, so the
//! reader skips anything up to the next `0x24` marker.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Marker byte opening every interleaved frame
pub const TPKT_MAGIC: u8 = 0x24;
/// Size of the interleaved frame header
pub const TPKT_HEADER_SIZE: usize = 4;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Errors raised by the interleaved framing layer
#[derive(Debug, Error)]
pub enum TPKTError {
    /// The peer closed the stream
    #[error("end of TPKT stream")]
    EndOfStream,

    /// Payload does not fit a 16-bit length field
    #[error("payload of {0} bytes exceeds the TPKT limit")]
    PayloadTooLarge(usize),

    /// Underlying stream failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One interleaved frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TPKTPacket {
    /// Interleaved channel number
    pub channel: u8,
    /// Frame payload, usually an RTP or RTCP packet
    pub payload: Bytes,
}

/// Incremental reader for interleaved frames.
///
/// Partially received frames stay in the reader's buffer, so a read that
/// is dropped mid-way (for example by `tokio::select!`) loses nothing.
#[derive(Debug)]
pub struct TPKTReader {
    buffer: BytesMut,
}

impl Default for TPKTReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TPKTReader {
    /// Creates a reader with an 8 KiB initial buffer
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
        }
    }

    /// Reads the next frame from `stream`, skipping bytes that precede a
    /// frame marker.
    pub async fn read_packet<R>(&mut self, stream: &mut R) -> Result<TPKTPacket, TPKTError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        loop {
            if let Some(packet) = self.try_parse() {
                return Ok(packet);
            }

            if self.buffer.capacity() - self.buffer.len() < READ_BUFFER_SIZE / 2 {
                self.buffer.reserve(READ_BUFFER_SIZE);
            }
            if stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(TPKTError::EndOfStream);
            }
        }
    }

    fn try_parse(&mut self) -> Option<TPKTPacket> {
        match self.buffer.iter().position(|&b| b == TPKT_MAGIC) {
            Some(0) => {}
            Some(skip) => {
                log::warn!("TPKT resync: skipped {} bytes", skip);
                self.buffer.advance(skip);
            }
            None => {
                if !self.buffer.is_empty() {
                    log::warn!("TPKT resync: skipped {} bytes", self.buffer.len());
                    self.buffer.clear();
                }
                return None;
            }
        }

        if self.buffer.len() < TPKT_HEADER_SIZE {
            return None;
        }

        let payload_size = u16::from_be_bytes([self.buffer[2], self.buffer[3]]) as usize;
        let total_size = TPKT_HEADER_SIZE + payload_size;
        if self.buffer.len() < total_size {
            self.buffer.reserve(total_size - self.buffer.len());
            return None;
        }

        let mut frame = self.buffer.split_to(total_size);
        let channel = frame[1];
        frame.advance(TPKT_HEADER_SIZE);
        Some(TPKTPacket {
            channel,
            payload: frame.freeze(),
        })
    }
}

/// Serializes an interleaved frame.
pub fn encode_packet(channel: u8, payload: &[u8]) -> Result<Bytes, TPKTError> {
    let length =
        u16::try_from(payload.len()).map_err(|_| TPKTError::PayloadTooLarge(payload.len()))?;

    let mut buf = BytesMut::with_capacity(TPKT_HEADER_SIZE + payload.len());
    buf.put_u8(TPKT_MAGIC);
    buf.put_u8(channel);
    buf.put_u16(length);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Writes one interleaved frame to `stream`.
pub async fn write_packet<W>(stream: &mut W, channel: u8, payload: &[u8]) -> Result<(), TPKTError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_packet(channel, payload)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}
