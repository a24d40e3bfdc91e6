//! Decimal-string ↔ minor-unit conversion. Integer math only, no f64.
//!
//! Report cells carry more precision than cents (App Store proceeds such
//! as `"4.114697"`), so parsing goes through micro-units and daily totals
//! are rounded to cents once, after summing.

pub const MICROS_PER_MINOR: i64 = 10_000;
const FRACTION_DIGITS: usize = 6;

/// Parse a decimal amount to micro-units (1e-6).
///
/// Accepts `"1234.56"`, `"-0.7"`, `"+3"`, `"100."`, `".5"`. Digits past the
/// sixth fractional place are ignored. Returns `None` for anything that is
/// not a plain decimal (`"N/A"`, `""`, `"1,234.00"`, `"1e3"`) or that would
/// overflow.
pub fn parse_decimal_micros(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, unsigned) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let (whole, frac) = match unsigned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (unsigned, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole_value: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };

    let mut frac_value: i64 = 0;
    for i in 0..FRACTION_DIGITS {
        let digit = frac.as_bytes().get(i).map(|b| (b - b'0') as i64).unwrap_or(0);
        frac_value = frac_value * 10 + digit;
    }

    let micros = whole_value.checked_mul(1_000_000)?.checked_add(frac_value)?;
    Some(if negative { -micros } else { micros })
}

/// Round micro-units to minor units, half away from zero.
///
/// Works in i128 so the full i64 range rounds without overflow; the
/// result is always within i64 after dividing by [`MICROS_PER_MINOR`].
pub fn micros_to_minor(micros: i64) -> i64 {
    let unit = i128::from(MICROS_PER_MINOR);
    let half = unit / 2;
    let micros = i128::from(micros);
    let minor = if micros >= 0 {
        (micros + half) / unit
    } else {
        -((-micros + half) / unit)
    };
    minor as i64
}

/// Render minor units as a decimal string with two places (`-0.01`, `3.50`).
pub fn format_minor(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
