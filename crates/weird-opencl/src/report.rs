//! Hex rendering of the read-back buffer.

use std::fmt::Write;

/// Two lowercase hex digits per byte, no separators, no newline.
pub fn hex_line(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // Writing into a String cannot fail.
        let _ = write!(out, "{b:02x}");
    }
    out
}
