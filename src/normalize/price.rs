// normalize/price.rs

/// Returned for listings that advertise "Price on Request".
pub const PRICE_ON_REQUEST: i64 = -1;

/// Returned when the price is missing or cannot be parsed.
pub const PRICE_UNKNOWN: i64 = 0;

// Longest first so "LACS" is not read as "L" with a trailing "ACS".
const SUFFIXES: &[(&str, i64)] = &[
    ("CRORES", 1_00_00_000),
    ("CRORE", 1_00_00_000),
    ("CR", 1_00_00_000),
    ("LAKHS", 1_00_000),
    ("LAKH", 1_00_000),
    ("LACS", 1_00_000),
    ("LAC", 1_00_000),
    ("L", 1_00_000),
    ("K", 1_000),
];

const CURRENCY_MARKS: &[&str] = &["RS.", "INR"];

const RANGE_SEPARATORS: &[&str] = &[" - ", " – ", " to ", " TO "];

/// Converts a displayed price ("₹1.5 Cr", "45 L", "12,000") into an integer
/// amount in rupees. Never fails: unparseable input yields [`PRICE_UNKNOWN`].
pub fn normalize_price(text: &str) -> i64 {
    let mut cleaned = text
        .replace("â‚¹", "")
        .replace('₹', "")
        .replace(',', "")
        .trim()
        .to_uppercase();
    for mark in CURRENCY_MARKS {
        cleaned = cleaned.replace(mark, "");
    }
    let cleaned = cleaned.trim();

    if cleaned.contains("PRICE ON REQUEST") {
        return PRICE_ON_REQUEST;
    }

    let cleaned = strip_area_qualifier(cleaned);
    if cleaned.is_empty() {
        return PRICE_UNKNOWN;
    }

    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| {
            cleaned
                .strip_suffix(suffix)
                .map(|rest| (rest.trim(), *multiplier))
        })
        .unwrap_or((cleaned, 1));

    scale_decimal(number, multiplier).unwrap_or(PRICE_UNKNOWN)
}

/// Splits "A - B" and normalizes each side; a single value fills both ends.
pub fn normalize_price_range(text: &str) -> (i64, i64) {
    let split = RANGE_SEPARATORS
        .iter()
        .find_map(|sep| text.split_once(sep));

    match split {
        Some((low, high)) => (normalize_price(low), normalize_price(high)),
        None => {
            let value = normalize_price(text);
            (value, value)
        }
    }
}

/// Drops a trailing "PER SQ. FT" / "/SQFT" qualifier, whatever its spelling.
fn strip_area_qualifier(s: &str) -> &str {
    for marker in ["PER", "/"] {
        if let Some(idx) = s.rfind(marker) {
            let tail: String = s[idx + marker.len()..]
                .chars()
                .filter(|c| c.is_ascii_alphabetic())
                .collect();
            if tail == "SQFT" {
                return s[..idx].trim_end();
            }
        }
    }
    s
}

/// Multiplies a plain decimal by a power of ten without going through
/// floating point, truncating any remaining fraction.
fn scale_decimal(number: &str, multiplier: i64) -> Option<i64> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return None;
    }

    let whole_value: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut value = whole_value.checked_mul(multiplier)?;

    let mut scale = multiplier;
    for digit in frac.bytes() {
        scale /= 10;
        if scale == 0 {
            break;
        }
        value = value.checked_add(i64::from(digit - b'0') * scale)?;
    }
    Some(value)
}
