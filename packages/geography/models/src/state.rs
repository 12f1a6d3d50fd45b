//! Free-form state identifier normalization.
//!
//! Inputs arrive as FIPS codes ("37"), abbreviations ("NC"), or full
//! names ("North Carolina"), sometimes as bare integers from parsed
//! files. Everything funnels through [`normalize_state`].

use serde::{Deserialize, Serialize};

use crate::fips;

/// The three representations a state identifier can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateFormat {
    /// Two-digit FIPS code, zero-padded ("06").
    Fips,
    /// Two-letter postal abbreviation ("CA").
    Abbreviation,
    /// Full name ("California").
    Name,
}

/// Detects which format a state identifier is in.
///
/// Returns `None` when the input matches no known state in any format.
#[must_use]
pub fn detect_state_format(state: &str) -> Option<StateFormat> {
    let trimmed = state.trim();
    if is_fips_code(trimmed) {
        return Some(StateFormat::Fips);
    }
    if trimmed.len() == 2 && fips::abbr_to_fips(trimmed).is_some() {
        return Some(StateFormat::Abbreviation);
    }
    if fips::name_to_fips(trimmed).is_some() {
        return Some(StateFormat::Name);
    }
    None
}

/// Returns `true` if the input is a recognized 2-digit state FIPS code.
/// A bare single digit ("6") is accepted and zero-padded.
#[must_use]
pub fn is_fips_code(state: &str) -> bool {
    zero_padded(state)
        .is_some_and(|padded| fips::STATE_FIPS.contains(&padded.as_str()))
}

/// Converts a state identifier in any recognized format to `to_format`.
///
/// Returns `None` when the input cannot be resolved to one of the 50
/// states + DC.
#[must_use]
pub fn normalize_state(state: &str, to_format: StateFormat) -> Option<String> {
    let trimmed = state.trim();

    let fips_code: &'static str = match detect_state_format(trimmed)? {
        StateFormat::Fips => {
            let padded = zero_padded(trimmed)?;
            fips::STATE_FIPS
                .iter()
                .find(|f| **f == padded.as_str())
                .copied()?
        }
        StateFormat::Abbreviation => fips::abbr_to_fips(trimmed)?,
        StateFormat::Name => fips::name_to_fips(trimmed)?,
    };

    Some(match to_format {
        StateFormat::Fips => fips_code.to_string(),
        StateFormat::Abbreviation => fips::state_abbr(fips_code).to_string(),
        StateFormat::Name => fips::state_name(fips_code).to_string(),
    })
}

/// Normalizes a list, silently dropping unresolvable entries.
#[must_use]
pub fn normalize_state_list(states: &[String], to_format: StateFormat) -> Vec<String> {
    let mut out = Vec::with_capacity(states.len());
    for state in states {
        if let Some(normalized) = normalize_state(state, to_format) {
            if !out.contains(&normalized) {
                out.push(normalized);
            }
        }
    }
    out
}

fn zero_padded(state: &str) -> Option<String> {
    if state.is_empty() || state.len() > 2 || !state.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{state:0>2}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_all_formats() {
        assert_eq!(detect_state_format("37"), Some(StateFormat::Fips));
        assert_eq!(detect_state_format("NC"), Some(StateFormat::Abbreviation));
        assert_eq!(
            detect_state_format("North Carolina"),
            Some(StateFormat::Name)
        );
        assert_eq!(detect_state_format("Atlantis"), None);
    }

    #[test]
    fn normalizes_between_formats() {
        assert_eq!(
            normalize_state("North Carolina", StateFormat::Abbreviation),
            Some("NC".to_string())
        );
        assert_eq!(
            normalize_state("NC", StateFormat::Fips),
            Some("37".to_string())
        );
        assert_eq!(
            normalize_state("37", StateFormat::Name),
            Some("North Carolina".to_string())
        );
    }

    #[test]
    fn single_digit_fips_is_padded() {
        assert_eq!(
            normalize_state("6", StateFormat::Abbreviation),
            Some("CA".to_string())
        );
    }

    #[test]
    fn list_normalization_dedupes_and_drops_unknown() {
        let input = vec![
            "NC".to_string(),
            "North Carolina".to_string(),
            "??".to_string(),
        ];
        assert_eq!(
            normalize_state_list(&input, StateFormat::Fips),
            vec!["37".to_string()]
        );
    }
}
