//! GEOID levels and component helpers.
//!
//! Census GEOIDs are fixed-width, zero-padded digit strings whose
//! prefixes encode the containing geographies: state (2), county (5),
//! tract (11), block group (12). ZCTAs are a separate 5-digit space.

use serde::{Deserialize, Serialize};

/// The geography levels the pipeline operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeographicLevel {
    /// 2-digit state GEOID.
    State,
    /// 5-digit county GEOID.
    County,
    /// 11-digit tract GEOID.
    Tract,
    /// 12-digit block-group GEOID.
    BlockGroup,
    /// 5-digit ZIP Code Tabulation Area.
    Zcta,
}

impl GeographicLevel {
    /// Canonical GEOID width for this level.
    #[must_use]
    pub const fn geoid_len(self) -> usize {
        match self {
            Self::State => 2,
            Self::County | Self::Zcta => 5,
            Self::Tract => 11,
            Self::BlockGroup => 12,
        }
    }

    /// Returns `true` when `geoid` has this level's canonical shape.
    #[must_use]
    pub fn matches(self, geoid: &str) -> bool {
        geoid.len() == self.geoid_len() && geoid.chars().all(|c| c.is_ascii_digit())
    }
}

impl std::fmt::Display for GeographicLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::State => "state",
            Self::County => "county",
            Self::Tract => "tract",
            Self::BlockGroup => "block-group",
            Self::Zcta => "zcta",
        };
        f.write_str(label)
    }
}

/// State FIPS prefix of a tract or block-group GEOID.
#[must_use]
pub fn state_of_geoid(geoid: &str) -> Option<&str> {
    (geoid.len() >= 2).then(|| &geoid[..2])
}

/// County FIPS component (digits 3..5) of a tract or block-group GEOID.
#[must_use]
pub fn county_of_geoid(geoid: &str) -> Option<&str> {
    (geoid.len() >= 5).then(|| &geoid[2..5])
}

/// Assembles a 12-digit block-group GEOID from its zero-padded parts.
#[must_use]
pub fn block_group_geoid(state: &str, county: &str, tract: &str, block_group: &str) -> String {
    format!("{state:0>2}{county:0>3}{tract:0>6}{block_group}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_widths() {
        assert!(GeographicLevel::State.matches("37"));
        assert!(GeographicLevel::County.matches("37183"));
        assert!(GeographicLevel::Tract.matches("37183052404"));
        assert!(GeographicLevel::BlockGroup.matches("371830524042"));
        assert!(GeographicLevel::Zcta.matches("27601"));
        assert!(!GeographicLevel::BlockGroup.matches("37183"));
        assert!(!GeographicLevel::Zcta.matches("2760A"));
    }

    #[test]
    fn component_extraction() {
        assert_eq!(state_of_geoid("371830524042"), Some("37"));
        assert_eq!(county_of_geoid("371830524042"), Some("183"));
        assert_eq!(state_of_geoid("3"), None);
    }

    #[test]
    fn block_group_assembly_pads_components() {
        assert_eq!(block_group_geoid("37", "183", "52404", "2"), "371830524042");
        assert_eq!(block_group_geoid("6", "37", "1234", "1"), "060370012341");
    }

    #[test]
    fn display_labels() {
        assert_eq!(GeographicLevel::BlockGroup.to_string(), "block-group");
        assert_eq!(GeographicLevel::Zcta.to_string(), "zcta");
    }
}
