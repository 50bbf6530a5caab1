use bitvec::field::BitField;
use bitvec::order::Msb0;
use bitvec::slice::BitSlice;
use bitvec::view::BitView;

use crate::error::{ClientError, Result};

/// A bit-level reader over a byte slice, most significant bit first.
///
/// Covers the reads needed by NAL unit headers and AAC AU headers:
/// - single bits and fixed-width fields of up to 32 bits
/// - unsigned exponential Golomb codes (ue(v))
///
/// Example:
/// ```
/// use rtspio::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
pub struct BitReader<'a> {
    bits: &'a BitSlice<u8, Msb0>,
    position: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            bits: data.view_bits::<Msb0>(),
            position: 0,
        }
    }

    /// Reads a single bit. Returns an error at the end of data.
    pub fn read_bit(&mut self) -> Result<bool> {
        let bit = self
            .bits
            .get(self.position)
            .map(|bit| *bit)
            .ok_or_else(|| ClientError::Codec("Reached end of data".into()))?;
        self.position += 1;
        Ok(bit)
    }

    /// Reads `n` bits as a big-endian number.
    ///
    /// Returns an error if `n > 32` or fewer than `n` bits remain.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(ClientError::Codec("Too many bits requested".into()));
        }
        if n == 0 {
            return Ok(0);
        }

        let end = self.position + n as usize;
        if end > self.bits.len() {
            return Err(ClientError::Codec("Reached end of data".into()));
        }

        let value = self.bits[self.position..end].load_be::<u32>();
        self.position = end;
        Ok(value)
    }

    /// Reads an unsigned exponential Golomb code (ue(v)).
    ///
    /// M leading zeros, a one, then M info bits: value = 2^M + INFO - 1.
    pub fn read_golomb(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(ClientError::Codec("Invalid Golomb code".into()));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let info = self.read_bits(leading_zeros)?;
        Ok((1u32 << leading_zeros) + info - 1)
    }

    /// Skips `n` bits.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        let end = self.position + n as usize;
        if end > self.bits.len() {
            return Err(ClientError::Codec("Reached end of data".into()));
        }
        self.position = end;
        Ok(())
    }
}

#[cfg(test)]
mod test_utils {
    /// Packs a sequence of ue(v) codes into bytes, padding the tail with zeros.
    pub fn encode_golomb(values: &[u32]) -> Vec<u8> {
        let mut bits: Vec<bool> = Vec::new();
        for &value in values {
            let code = value as u64 + 1;
            let width = 64 - code.leading_zeros();
            bits.extend(std::iter::repeat(false).take(width as usize - 1));
            for i in (0..width).rev() {
                bits.push((code >> i) & 1 == 1);
            }
        }

        bits.chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, bit)| acc | ((*bit as u8) << (7 - i)))
            })
            .collect()
    }
}
