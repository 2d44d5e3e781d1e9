mod area;
mod price;

pub use area::{normalize_area, AreaMagnitude, AreaValue};
pub use price::{normalize_price, normalize_price_range};

/// Reads the first run of digits in text like "240 Units" or "1,024 flats".
pub fn normalize_count(text: &str) -> Option<i64> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Parses a coordinate, rejecting values outside the valid degree range.
pub fn normalize_coordinate(text: &str, limit: f64) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_take_the_first_number() {
        assert_eq!(normalize_count("240 Units"), Some(240));
        assert_eq!(normalize_count("Total 1,024 flats in 3 towers"), Some(1024));
        assert_eq!(normalize_count("N/A"), None);
    }

    #[test]
    fn coordinates_are_range_checked() {
        assert_eq!(normalize_coordinate(" 12.9716 ", 90.0), Some(12.9716));
        assert_eq!(normalize_coordinate("190.0", 180.0), None);
        assert_eq!(normalize_coordinate("N/A", 90.0), None);
    }
}
