//! Static state adjacency table.
//!
//! Land-border adjacency for the 50 states + DC, used to seed the
//! neighbor store. The relation is symmetric; Alaska and Hawaii have no
//! land neighbors and map to empty sets.

use crate::fips::STATE_FIPS;

/// Returns the land-adjacent state FIPS codes for `fips`.
///
/// Unknown codes return an empty slice.
#[must_use]
pub fn state_neighbors(fips: &str) -> &'static [&'static str] {
    match fips {
        "01" => &["12", "13", "28", "47"],
        "04" => &["06", "08", "32", "35", "49"],
        "05" => &["22", "28", "29", "40", "47", "48"],
        "06" => &["04", "32", "41"],
        "08" => &["04", "20", "31", "35", "40", "49", "56"],
        "09" => &["25", "36", "44"],
        "10" => &["24", "34", "42"],
        "11" => &["24", "51"],
        "12" => &["01", "13"],
        "13" => &["01", "12", "37", "45", "47"],
        "16" => &["30", "32", "41", "49", "53", "56"],
        "17" => &["18", "19", "21", "29", "55"],
        "18" => &["17", "21", "26", "39"],
        "19" => &["17", "27", "29", "31", "46", "55"],
        "20" => &["08", "29", "31", "40"],
        "21" => &["17", "18", "29", "39", "47", "51", "54"],
        "22" => &["05", "28", "48"],
        "23" => &["33"],
        "24" => &["10", "11", "42", "51", "54"],
        "25" => &["09", "33", "36", "44", "50"],
        "26" => &["18", "39", "55"],
        "27" => &["19", "38", "46", "55"],
        "28" => &["01", "05", "22", "47"],
        "29" => &["05", "17", "19", "20", "21", "31", "40", "47"],
        "30" => &["16", "38", "46", "56"],
        "31" => &["08", "19", "20", "29", "46", "56"],
        "32" => &["04", "06", "16", "41", "49"],
        "33" => &["23", "25", "50"],
        "34" => &["10", "36", "42"],
        "35" => &["04", "08", "40", "48", "49"],
        "36" => &["09", "25", "34", "42", "50"],
        "37" => &["13", "45", "47", "51"],
        "38" => &["27", "30", "46"],
        "39" => &["18", "21", "26", "42", "54"],
        "40" => &["05", "08", "20", "29", "35", "48"],
        "41" => &["06", "16", "32", "53"],
        "42" => &["10", "24", "34", "36", "39", "54"],
        "44" => &["09", "25"],
        "45" => &["13", "37"],
        "46" => &["19", "27", "30", "31", "38", "56"],
        "47" => &["01", "05", "13", "21", "28", "29", "37", "51"],
        "48" => &["05", "22", "35", "40"],
        "49" => &["04", "08", "16", "32", "35", "56"],
        "50" => &["25", "33", "36"],
        "51" => &["11", "21", "24", "37", "47", "54"],
        "53" => &["16", "41"],
        "54" => &["21", "24", "39", "42", "51"],
        "55" => &["17", "19", "26", "27"],
        "56" => &["08", "16", "30", "31", "46", "49"],
        // AK ("02"), HI ("15"): no land borders.
        _ => &[],
    }
}

/// Every `(state, neighbor)` pair in the table, both directions.
#[must_use]
pub fn all_state_neighbor_pairs() -> Vec<(&'static str, &'static str)> {
    let mut pairs = Vec::new();
    for state in STATE_FIPS {
        for neighbor in state_neighbors(state) {
            pairs.push((*state, *neighbor));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_is_symmetric() {
        for state in STATE_FIPS {
            for neighbor in state_neighbors(state) {
                assert!(
                    state_neighbors(neighbor).contains(state),
                    "{state} lists {neighbor} but not vice versa"
                );
            }
        }
    }

    #[test]
    fn no_state_neighbors_itself() {
        for state in STATE_FIPS {
            assert!(!state_neighbors(state).contains(state));
        }
    }

    #[test]
    fn islands_have_no_neighbors() {
        assert!(state_neighbors("02").is_empty()); // AK
        assert!(state_neighbors("15").is_empty()); // HI
    }

    #[test]
    fn nc_borders_match() {
        assert_eq!(state_neighbors("37"), &["13", "45", "47", "51"]);
    }

    #[test]
    fn every_listed_neighbor_is_a_real_state() {
        for (_, neighbor) in all_state_neighbor_pairs() {
            assert!(STATE_FIPS.contains(&neighbor));
        }
    }
}
