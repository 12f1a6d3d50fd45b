//! The neighbor store: seeded state adjacency, lazily built county
//! adjacency, and the point-geography cache.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use socialmapper_boundaries::{BoundaryService, GeographicUnit};
use socialmapper_geocoder::Geocoder;
use socialmapper_geography_models::fips::STATE_FIPS;
use socialmapper_geography_models::neighbors::state_neighbors as static_state_neighbors;

use crate::repository::{CountyNeighbor, NeighborRepository, NeighborStatistics, PointGeography};
use crate::{NeighborError, adjacency};

type CountyKey = (String, String);

/// Fast neighbor lookups over a pluggable repository.
///
/// State adjacency is seeded from the static table at construction.
/// County adjacency is computed per state on first use from county
/// polygons and persisted; a session-local overlay keeps the edges
/// queryable even when the repository does not persist.
pub struct NeighborStore {
    repo: Arc<dyn NeighborRepository>,
    geocoder: Arc<Geocoder>,
    boundaries: Arc<BoundaryService>,
    session_edges: Mutex<HashMap<CountyKey, BTreeSet<CountyKey>>>,
    session_built: Mutex<HashSet<String>>,
}

impl NeighborStore {
    /// Builds the store and seeds state adjacency into the repository.
    ///
    /// # Errors
    ///
    /// Returns [`NeighborError`] if the repository rejects the seed.
    pub fn new(
        repo: Arc<dyn NeighborRepository>,
        geocoder: Arc<Geocoder>,
        boundaries: Arc<BoundaryService>,
    ) -> Result<Self, NeighborError> {
        let pairs: Vec<(String, String)> = STATE_FIPS
            .iter()
            .flat_map(|state| {
                static_state_neighbors(state)
                    .iter()
                    .map(|neighbor| ((*state).to_string(), (*neighbor).to_string()))
            })
            .collect();
        let seeded = repo.seed_state_neighbors(&pairs)?;
        log::debug!("seeded {seeded} state neighbor relationships");

        Ok(Self {
            repo,
            geocoder,
            boundaries,
            session_edges: Mutex::new(HashMap::new()),
            session_built: Mutex::new(HashSet::new()),
        })
    }

    /// Neighboring states for a state FIPS code.
    ///
    /// # Errors
    ///
    /// Returns [`NeighborError`] on repository failure.
    pub fn neighbors_of_state(&self, fips: &str) -> Result<Vec<String>, NeighborError> {
        let stored = self.repo.state_neighbors(fips)?;
        if stored.is_empty() {
            // Non-persisting repository; answer from the static table.
            return Ok(static_state_neighbors(fips)
                .iter()
                .map(ToString::to_string)
                .collect());
        }
        Ok(stored)
    }

    /// Neighboring `(state, county)` pairs for a county, building the
    /// state's adjacency on first use.
    ///
    /// # Errors
    ///
    /// Returns [`NeighborError`] if the build or lookup fails.
    pub async fn neighbors_of_county(
        &self,
        state: &str,
        county: &str,
        include_cross_state: bool,
    ) -> Result<Vec<(String, String)>, NeighborError> {
        self.ensure_county_neighbors(state).await?;
        let mut neighbors = self.merged_county_neighbors(state, county)?;
        if !include_cross_state {
            neighbors.retain(|(neighbor_state, _)| neighbor_state == state);
        }
        Ok(neighbors)
    }

    /// Geography identifiers for a point, via cache then geocoder.
    ///
    /// # Errors
    ///
    /// Returns [`NeighborError`] when both the cache misses and the
    /// geocoder fails at the transport level.
    pub async fn geography_of_point(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<PointGeography, NeighborError> {
        if let Some(cached) = self.repo.lookup_point(lat, lon)? {
            return Ok(cached);
        }

        let result = self.geocoder.geocode_point(lat, lon).await?;
        let point = PointGeography {
            lat,
            lon,
            state_fips: result.state_fips,
            county_fips: result.county_fips,
            tract_geoid: result.tract_geoid,
            block_group_geoid: result.block_group_geoid,
        };

        if point.state_fips.is_some() || point.tract_geoid.is_some() {
            self.repo.upsert_point(&point)?;
        }
        Ok(point)
    }

    /// Home counties of the given points, optionally expanded to the
    /// neighbor closure at `depth` hops (BFS with a visited set; the
    /// home county is always included).
    ///
    /// # Errors
    ///
    /// Returns [`NeighborError`] if a lookup or build fails. Points
    /// that fail to geocode are skipped with a warning.
    pub async fn counties_of_pois(
        &self,
        points: &[(f64, f64)],
        include_neighbors: bool,
        depth: u32,
    ) -> Result<Vec<(String, String)>, NeighborError> {
        let mut homes: BTreeSet<CountyKey> = BTreeSet::new();

        for &(lat, lon) in points {
            match self.geography_of_point(lat, lon).await {
                Ok(geography) => {
                    if let (Some(state), Some(county)) =
                        (geography.state_fips, geography.county_fips)
                    {
                        homes.insert((state, county));
                    } else {
                        log::warn!("point ({lat}, {lon}) resolved to no county");
                    }
                }
                Err(e) => log::warn!("county lookup failed for ({lat}, {lon}): {e}"),
            }
        }

        let mut result = homes.clone();

        if include_neighbors && depth > 0 {
            for home in &homes {
                let mut visited: HashSet<CountyKey> = HashSet::new();
                visited.insert(home.clone());
                let mut frontier = vec![home.clone()];

                for _ in 0..depth {
                    let mut next = Vec::new();
                    for (state, county) in frontier {
                        self.ensure_county_neighbors(&state).await?;
                        for neighbor in self.merged_county_neighbors(&state, &county)? {
                            if visited.insert(neighbor.clone()) {
                                result.insert(neighbor.clone());
                                next.push(neighbor);
                            }
                        }
                    }
                    frontier = next;
                }
            }
        }

        Ok(result.into_iter().collect())
    }

    /// Aggregate repository statistics.
    ///
    /// # Errors
    ///
    /// Returns [`NeighborError`] on repository failure.
    pub fn statistics(&self) -> Result<NeighborStatistics, NeighborError> {
        self.repo.statistics()
    }

    /// Builds county adjacency for a state if neither the repository
    /// nor this session has it yet.
    async fn ensure_county_neighbors(&self, state: &str) -> Result<(), NeighborError> {
        if self.session_lock(&self.session_built).contains(state) {
            return Ok(());
        }
        if self.repo.has_county_data(state)? {
            self.session_lock(&self.session_built)
                .insert(state.to_string());
            return Ok(());
        }

        log::info!("computing county neighbors for state {state}");
        let counties = self.boundaries.counties_for_state(state).await?;
        let mut edges = intra_state_edges(state, &counties);

        for neighbor_state in self.neighbors_of_state(state)? {
            let neighbor_counties = self.boundaries.counties_for_state(&neighbor_state).await?;
            edges.extend(cross_state_edges(
                state,
                &counties,
                &neighbor_state,
                &neighbor_counties,
            ));
        }

        let inserted = self.repo.insert_county_neighbors(&edges)?;
        self.repo.mark_county_build(state)?;
        log::info!(
            "state {state}: stored {inserted} county neighbor edges ({} computed)",
            edges.len()
        );

        {
            let mut session = self.session_lock(&self.session_edges);
            for edge in &edges {
                session
                    .entry((edge.state_fips.clone(), edge.county_fips.clone()))
                    .or_default()
                    .insert((
                        edge.neighbor_state_fips.clone(),
                        edge.neighbor_county_fips.clone(),
                    ));
            }
        }
        self.session_lock(&self.session_built)
            .insert(state.to_string());
        Ok(())
    }

    /// Union of repository edges and session-overlay edges.
    fn merged_county_neighbors(
        &self,
        state: &str,
        county: &str,
    ) -> Result<Vec<(String, String)>, NeighborError> {
        let mut merged: BTreeSet<CountyKey> =
            self.repo.county_neighbors(state, county)?.into_iter().collect();
        if let Some(session) = self
            .session_lock(&self.session_edges)
            .get(&(state.to_string(), county.to_string()))
        {
            merged.extend(session.iter().cloned());
        }
        Ok(merged.into_iter().collect())
    }

    fn session_lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Directed adjacency edges between counties of one state.
fn intra_state_edges(state: &str, counties: &[GeographicUnit]) -> Vec<CountyNeighbor> {
    let mut edges = Vec::new();
    for (i, a) in counties.iter().enumerate() {
        for b in &counties[i + 1..] {
            if adjacency::counties_are_adjacent(&a.geometry, &b.geometry) {
                let length = adjacency::shared_boundary_length_m(&a.geometry, &b.geometry);
                push_both_directions(&mut edges, state, a, state, b, length);
            }
        }
    }
    edges
}

/// Directed adjacency edges between counties of two different states.
fn cross_state_edges(
    state_a: &str,
    counties_a: &[GeographicUnit],
    state_b: &str,
    counties_b: &[GeographicUnit],
) -> Vec<CountyNeighbor> {
    let mut edges = Vec::new();
    for a in counties_a {
        for b in counties_b {
            if adjacency::counties_are_adjacent(&a.geometry, &b.geometry) {
                let length = adjacency::shared_boundary_length_m(&a.geometry, &b.geometry);
                push_both_directions(&mut edges, state_a, a, state_b, b, length);
            }
        }
    }
    edges
}

fn push_both_directions(
    edges: &mut Vec<CountyNeighbor>,
    state_a: &str,
    a: &GeographicUnit,
    state_b: &str,
    b: &GeographicUnit,
    shared_length: f64,
) {
    let (Some(county_a), Some(county_b)) = (a.county_fips.clone(), b.county_fips.clone()) else {
        return;
    };
    edges.push(CountyNeighbor {
        state_fips: state_a.to_string(),
        county_fips: county_a.clone(),
        neighbor_state_fips: state_b.to_string(),
        neighbor_county_fips: county_b.clone(),
        shared_boundary_length: Some(shared_length),
    });
    edges.push(CountyNeighbor {
        state_fips: state_b.to_string(),
        county_fips: county_b,
        neighbor_state_fips: state_a.to_string(),
        neighbor_county_fips: county_a,
        shared_boundary_length: Some(shared_length),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use socialmapper_cache::NoopCache;
    use socialmapper_http::{CancelToken, HttpClientConfig, RateLimitedClient};

    fn test_store() -> NeighborStore {
        let http = RateLimitedClient::new(HttpClientConfig::default(), CancelToken::new())
            .unwrap();
        let cache = Arc::new(NoopCache);
        let geocoder = Arc::new(Geocoder::new(http.clone(), cache.clone()));
        let boundaries = Arc::new(BoundaryService::new(http, cache, 2023));
        NeighborStore::new(Arc::new(MemoryRepository::default()), geocoder, boundaries).unwrap()
    }

    fn seed_county_graph(store: &NeighborStore) {
        // Wake (183) borders Durham (063) and Johnston (101);
        // Durham also borders Orange (135).
        let mut edges = Vec::new();
        for (a, b) in [("183", "063"), ("183", "101"), ("063", "135")] {
            edges.push(CountyNeighbor {
                state_fips: "37".to_string(),
                county_fips: a.to_string(),
                neighbor_state_fips: "37".to_string(),
                neighbor_county_fips: b.to_string(),
                shared_boundary_length: None,
            });
            edges.push(CountyNeighbor {
                state_fips: "37".to_string(),
                county_fips: b.to_string(),
                neighbor_state_fips: "37".to_string(),
                neighbor_county_fips: a.to_string(),
                shared_boundary_length: None,
            });
        }
        store.repo.insert_county_neighbors(&edges).unwrap();
        store.repo.mark_county_build("37").unwrap();
    }

    #[test]
    fn state_neighbors_are_symmetric_for_all_states() {
        let store = test_store();
        for state in STATE_FIPS {
            for neighbor in store.neighbors_of_state(state).unwrap() {
                let back = store.neighbors_of_state(&neighbor).unwrap();
                assert!(
                    back.contains(&(*state).to_string()),
                    "{state} -> {neighbor} not symmetric"
                );
            }
        }
    }

    #[tokio::test]
    async fn county_bfs_honors_depth() {
        let store = test_store();
        seed_county_graph(&store);

        // Cached point in Wake County avoids any geocoder call.
        store
            .repo
            .upsert_point(&PointGeography {
                lat: 35.7796,
                lon: -78.6382,
                state_fips: Some("37".to_string()),
                county_fips: Some("183".to_string()),
                tract_geoid: None,
                block_group_geoid: None,
            })
            .unwrap();

        let depth1 = store
            .counties_of_pois(&[(35.7796, -78.6382)], true, 1)
            .await
            .unwrap();
        assert_eq!(
            depth1,
            vec![
                ("37".to_string(), "063".to_string()),
                ("37".to_string(), "101".to_string()),
                ("37".to_string(), "183".to_string()),
            ]
        );

        let depth2 = store
            .counties_of_pois(&[(35.7796, -78.6382)], true, 2)
            .await
            .unwrap();
        // Depth 2 adds Orange (135) via Durham; Wake itself included.
        assert_eq!(depth2.len(), 4);
        assert!(depth2.contains(&("37".to_string(), "135".to_string())));
        assert!(depth2.contains(&("37".to_string(), "183".to_string())));
    }

    #[tokio::test]
    async fn home_counties_only_without_neighbors() {
        let store = test_store();
        seed_county_graph(&store);
        store
            .repo
            .upsert_point(&PointGeography {
                lat: 35.0,
                lon: -78.0,
                state_fips: Some("37".to_string()),
                county_fips: Some("183".to_string()),
                tract_geoid: None,
                block_group_geoid: None,
            })
            .unwrap();

        let counties = store
            .counties_of_pois(&[(35.0, -78.0)], false, 1)
            .await
            .unwrap();
        assert_eq!(counties, vec![("37".to_string(), "183".to_string())]);
    }

    #[tokio::test]
    async fn cross_state_filter_applies() {
        let store = test_store();
        store
            .repo
            .insert_county_neighbors(&[
                CountyNeighbor {
                    state_fips: "37".to_string(),
                    county_fips: "169".to_string(),
                    neighbor_state_fips: "51".to_string(),
                    neighbor_county_fips: "141".to_string(),
                    shared_boundary_length: None,
                },
                CountyNeighbor {
                    state_fips: "37".to_string(),
                    county_fips: "169".to_string(),
                    neighbor_state_fips: "37".to_string(),
                    neighbor_county_fips: "171".to_string(),
                    shared_boundary_length: None,
                },
            ])
            .unwrap();
        store.repo.mark_county_build("37").unwrap();

        let all = store.neighbors_of_county("37", "169", true).await.unwrap();
        assert_eq!(all.len(), 2);

        let intra = store.neighbors_of_county("37", "169", false).await.unwrap();
        assert_eq!(intra, vec![("37".to_string(), "171".to_string())]);
    }
}
