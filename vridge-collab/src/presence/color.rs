//! Deterministic cursor colors.

/// Fixed cursor palette. Index is chosen by [`color_for`].
pub const CURSOR_PALETTE: [&str; 15] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FECA57",
    "#DDA0DD", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E2",
    "#F8B739", "#52B788", "#FF6B9D", "#C9E4CA", "#55CBCD",
];

/// Shift-subtract string hash over UTF-16 code units.
///
/// `h = c + ((h << 5) - h)`, where the shift operates on the low 32 bits of
/// `h` and wraps, matching the hash used by browser clients so every peer
/// agrees on a user's color.
pub fn user_hash(user_id: &str) -> i64 {
    user_id.encode_utf16().fold(0_i64, |h, unit| {
        let shifted = i64::from((h as i32).wrapping_shl(5));
        i64::from(unit).wrapping_add(shifted).wrapping_sub(h)
    })
}

/// Palette color for a user id.
pub fn color_for(user_id: &str) -> &'static str {
    let index = user_hash(user_id).unsigned_abs() % CURSOR_PALETTE.len() as u64;
    CURSOR_PALETTE[index as usize]
}
