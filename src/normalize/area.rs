// normalize/area.rs
use serde::{Deserialize, Serialize};

pub const SQ_FT: &str = "Sq. Ft";
pub const UNIT_UNKNOWN: &str = "N/A";

const SQ_FT_PER_ACRE: f64 = 43_560.0;

/// Either a converted square-foot figure or the untouched source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AreaMagnitude {
    Value(f64),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaValue {
    pub magnitude: AreaMagnitude,
    pub unit: String,
}

impl AreaValue {
    pub fn square_feet(value: f64) -> Self {
        Self {
            magnitude: AreaMagnitude::Value(value),
            unit: SQ_FT.to_string(),
        }
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            magnitude: AreaMagnitude::Raw(text.into()),
            unit: UNIT_UNKNOWN.to_string(),
        }
    }
}

/// Converts "2 Acres" or "1,200 Sq. Ft" into square feet. Anything else is
/// kept verbatim with unit "N/A" so the raw value is not lost.
pub fn normalize_area(text: &str) -> AreaValue {
    let trimmed = text.trim();
    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);

    let magnitude = number
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|m| m.is_finite());

    // Only a bare unit phrase is read; "1200 - 1800 Sq. Ft" stays raw.
    let is_unit_phrase = unit
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c == '.' || c.is_whitespace());
    if !is_unit_phrase {
        return AreaValue::raw(text);
    }

    // "Sq. Ft", "sqft", "SQ.FT." and "square feet" all reduce to the same key.
    let unit_key: String = unit
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();

    match (magnitude, unit_key.as_str()) {
        (Some(m), "ACRE" | "ACRES") => AreaValue::square_feet(m * SQ_FT_PER_ACRE),
        (Some(m), "SQFT" | "SQFEET" | "SFT" | "SQUAREFEET" | "SQUAREFOOT" | "SQUAREFT") => {
            AreaValue::square_feet(m)
        }
        _ => AreaValue::raw(text),
    }
}
