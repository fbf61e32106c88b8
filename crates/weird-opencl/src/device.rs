//! Platform and device selection by 1-based index.

use tracing::{debug, warn};

use crate::backend::ComputeBackend;
use crate::error::{HarnessError, Result, SelectionKind};

/// Most platforms, and most devices per platform, the harness considers.
pub const MAX_ENTRIES: usize = 4;

/// Parse an index the way C `atoi` does: optional leading whitespace, an
/// optional sign, then leading decimal digits. Anything unparsable is 0,
/// which the range check later rejects.
pub fn parse_index(raw: &str) -> i64 {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0_i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));

    if negative { -magnitude } else { magnitude }
}

/// Check a 1-based `index` against `count` entries, returning the 0-based
/// position.
pub fn checked_position(kind: SelectionKind, index: i64, count: usize) -> Result<usize> {
    if index < 1 || index as u64 > count as u64 {
        return Err(HarnessError::IndexOutOfRange { kind, count, index });
    }
    Ok((index - 1) as usize)
}

fn capped<T>(kind: SelectionKind, mut entries: Vec<T>) -> Vec<T> {
    if entries.len() > MAX_ENTRIES {
        warn!(
            "{} {}s found, only the first {} are selectable",
            entries.len(),
            kind,
            MAX_ENTRIES
        );
        entries.truncate(MAX_ENTRIES);
    }
    entries
}

/// Enumerate platforms and pick the one at 1-based `index`.
pub fn select_platform<B: ComputeBackend>(backend: &B, index: i64) -> Result<(B::Platform, String)> {
    let mut platforms = capped(SelectionKind::Platform, backend.platforms()?);
    for (i, p) in platforms.iter().enumerate() {
        debug!("Platform {}: {}", i + 1, backend.platform_name(p));
    }
    let pos = checked_position(SelectionKind::Platform, index, platforms.len())?;
    let platform = platforms.swap_remove(pos);
    let name = backend.platform_name(&platform);
    Ok((platform, name))
}

/// Enumerate devices of every type on `platform` and pick the one at
/// 1-based `index`.
pub fn select_device<B: ComputeBackend>(
    backend: &B,
    platform: &B::Platform,
    index: i64,
) -> Result<(B::Device, String)> {
    let mut devices = capped(SelectionKind::Device, backend.devices(platform)?);
    for (i, d) in devices.iter().enumerate() {
        debug!("Device {}: {}", i + 1, backend.device_name(d));
    }
    let pos = checked_position(SelectionKind::Device, index, devices.len())?;
    let device = devices.swap_remove(pos);
    let name = backend.device_name(&device);
    Ok((device, name))
}
