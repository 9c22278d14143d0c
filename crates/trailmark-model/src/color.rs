//! Path colors
//!
//! Colors are packed `0xAARRGGBB`. Zero means "unset"; an unset path shows
//! the palette entry picked by hashing its id, so every client agrees on it
//! without having to exchange it.

use crate::error::ValidationError;
use crate::path::PathId;
use sha2::{Digest, Sha256};

/// Fixed palette used for derived colors, with the names accepted by
/// [`parse_color`].
pub const PALETTE: [(&str, u32); 9] = [
    ("red", 0xFFE5_3935),
    ("orange", 0xFFFB_8C00),
    ("yellow", 0xFFFD_D835),
    ("lime", 0xFF7C_B342),
    ("green", 0xFF43_A047),
    ("cyan", 0xFF00_ACC1),
    ("blue", 0xFF1E_88E5),
    ("purple", 0xFF8E_24AA),
    ("pink", 0xFFD8_1B60),
];

/// Deterministic palette color for a path id.
pub fn derive_color(id: &PathId) -> u32 {
    let digest = Sha256::digest(id.as_uuid().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let index = (u64::from_be_bytes(head) % PALETTE.len() as u64) as usize;
    PALETTE[index].1
}

/// Parse user color input: a palette name, or `RRGGBB` / `AARRGGBB` hex with
/// an optional `#` or `0x` prefix. Six-digit input is made fully opaque.
pub fn parse_color(input: &str) -> Result<u32, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidColor(input.to_string()));
    }

    if let Some((_, value)) = PALETTE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
    {
        return Ok(*value);
    }

    let hex = trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidColor(input.to_string()));
    }

    let value = match hex.len() {
        6 => u32::from_str_radix(hex, 16).map(|rgb| 0xFF00_0000 | rgb),
        8 => u32::from_str_radix(hex, 16),
        _ => return Err(ValidationError::InvalidColor(input.to_string())),
    }
    .map_err(|_| ValidationError::InvalidColor(input.to_string()))?;

    if value == 0 {
        return Err(ValidationError::InvalidColor(input.to_string()));
    }
    Ok(value)
}
