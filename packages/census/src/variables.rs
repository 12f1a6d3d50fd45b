//! Human-readable name ↔ ACS variable code mapping.
//!
//! The mapping is fixed configuration, not data: the pipeline accepts
//! either form everywhere and reports columns under the readable name.

use std::sync::OnceLock;

use regex::Regex;

use crate::CensusError;

/// The fixed forward map: `(human_name, acs_code)`.
const VARIABLE_MAPPING: &[(&str, &str)] = &[
    ("total_population", "B01003_001E"),
    ("median_household_income", "B19013_001E"),
    ("median_home_value", "B25077_001E"),
    ("median_age", "B01002_001E"),
    ("white_population", "B02001_002E"),
    ("black_population", "B02001_003E"),
    ("hispanic_population", "B03003_003E"),
    ("housing_units", "B25001_001E"),
    ("education_bachelors_plus", "B15003_022E"),
    ("percent_poverty", "B17001_002E"),
];

/// ACS variable code shape, e.g. `B01003_001E`.
fn acs_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z][0-9]{5}_[0-9]{3}[A-Z]$").unwrap_or_else(|e| {
            unreachable!("invalid ACS code regex: {e}")
        })
    })
}

/// Converts a human-readable name to its ACS code.
#[must_use]
pub fn name_to_code(name: &str) -> Option<&'static str> {
    let wanted = name.trim().to_lowercase();
    VARIABLE_MAPPING
        .iter()
        .find(|(human, _)| *human == wanted)
        .map(|(_, code)| *code)
}

/// Converts an ACS code to its human-readable name.
#[must_use]
pub fn code_to_name(code: &str) -> Option<&'static str> {
    let wanted = code.trim().to_uppercase();
    VARIABLE_MAPPING
        .iter()
        .find(|(_, c)| *c == wanted)
        .map(|(human, _)| *human)
}

/// Normalizes either form to the ACS code.
///
/// # Errors
///
/// Returns [`CensusError::UnknownVariable`] when the input is neither a
/// known name nor a syntactically valid ACS code.
pub fn normalize(variable: &str) -> Result<String, CensusError> {
    let trimmed = variable.trim();
    if let Some(code) = name_to_code(trimmed) {
        return Ok(code.to_string());
    }
    let upper = trimmed.to_uppercase();
    if acs_code_pattern().is_match(&upper) {
        return Ok(upper);
    }
    Err(CensusError::UnknownVariable {
        variable: variable.to_string(),
    })
}

/// Human-readable rendering of a variable: the mapped name when known,
/// the code itself otherwise.
#[must_use]
pub fn readable(variable: &str) -> String {
    let trimmed = variable.trim();
    if let Some(code) = name_to_code(trimmed) {
        // Already a readable name; round-trip through the table.
        return code_to_name(code).unwrap_or(trimmed).to_string();
    }
    code_to_name(trimmed).map_or_else(|| trimmed.to_string(), ToString::to_string)
}

/// Returns `true` iff the input is a recognized name or matches the
/// ACS code shape.
#[must_use]
pub fn validate(variable: &str) -> bool {
    normalize(variable).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_reverse_agree() {
        for (name, code) in VARIABLE_MAPPING {
            assert_eq!(name_to_code(name), Some(*code));
            assert_eq!(code_to_name(code), Some(*name));
        }
    }

    #[test]
    fn normalize_accepts_both_forms() {
        assert_eq!(normalize("total_population").unwrap(), "B01003_001E");
        assert_eq!(normalize("B01003_001E").unwrap(), "B01003_001E");
        assert_eq!(normalize("b19013_001e").unwrap(), "B19013_001E");
    }

    #[test]
    fn normalize_round_trips_through_readable() {
        for input in ["total_population", "B19013_001E", "B99999_001E"] {
            let code = normalize(input).unwrap();
            assert_eq!(normalize(&readable(&code)).unwrap(), code);
        }
    }

    #[test]
    fn unknown_code_reads_as_itself() {
        assert_eq!(readable("B99999_001E"), "B99999_001E");
        assert_eq!(readable("median_age"), "median_age");
        assert_eq!(readable("B19013_001E"), "median_household_income");
    }

    #[test]
    fn validation_rejects_garbage() {
        assert!(validate("total_population"));
        assert!(validate("B01003_001E"));
        assert!(!validate("population"));
        assert!(!validate("B01003001E"));
        assert!(!validate("B01003_0001E"));
    }
}
