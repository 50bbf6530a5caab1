//! Byte-span helpers shared by the RTP, RTCP and NAL unit code.

/// Reads a big-endian `u16` at `offset`, if enough bytes remain.
#[inline]
pub fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

/// Reads a big-endian 24-bit value at `offset`.
#[inline]
pub fn read_u24_be(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 3)
        .map(|b| u32::from_be_bytes([0, b[0], b[1], b[2]]))
}

/// Reads a big-endian `u32` at `offset`.
#[inline]
pub fn read_u32_be(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Reads a big-endian `u64` at `offset`.
#[inline]
pub fn read_u64_be(data: &[u8], offset: usize) -> Option<u64> {
    let b = data.get(offset..offset + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Some(u64::from_be_bytes(raw))
}

/// Finds the first occurrence of `pattern` in `data` at or after `from`.
pub fn index_of(data: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    if pattern.is_empty() || from >= data.len() {
        return None;
    }
    data[from..]
        .windows(pattern.len())
        .position(|window| window == pattern)
        .map(|pos| pos + from)
}

/// Case-insensitive ASCII search, used on RTSP header values.
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}
