// src/protocol/hex.rs
//! ASCII hex codec used by the binary-over-text reply formats
//!
//! Byte order on the wire follows memory order unless the caller asks
//! for the reversed (most-significant-first) rendering used when a
//! multi-byte value should read naturally.

/// Encode bytes as uppercase hex, reversed when `msb_first`
pub fn write_hex(source: &[u8], msb_first: bool) -> String {
    let mut out = String::with_capacity(source.len() * 2);
    let write = |out: &mut String, byte: u8| {
        out.push(char::from_digit((byte >> 4) as u32, 16).unwrap().to_ascii_uppercase());
        out.push(char::from_digit((byte & 0xF) as u32, 16).unwrap().to_ascii_uppercase());
    };
    if msb_first {
        for byte in source.iter().rev() {
            write(&mut out, *byte);
        }
    } else {
        for byte in source {
            write(&mut out, *byte);
        }
    }
    out
}

/// Decode hex pairs into `dest`, stopping at the first non-hex
/// character or when `dest` fills; returns bytes written
pub fn read_hex(dest: &mut [u8], source: &str) -> usize {
    let mut read = 0;
    let mut chars = source.bytes();
    while read < dest.len() {
        let hi = match chars.next().and_then(|c| (c as char).to_digit(16)) {
            Some(value) => value,
            None => break,
        };
        let lo = match chars.next().and_then(|c| (c as char).to_digit(16)) {
            Some(value) => value,
            None => break,
        };
        dest[read] = ((hi << 4) | lo) as u8;
        read += 1;
    }
    read
}
