//! Persistence backends for neighbor relationships.
//!
//! The relationship data is a directed-edge relation keyed by
//! composite identifiers; lookups are edge queries, never graph
//! traversals over in-memory pointers. Three backends: ephemeral
//! in-process maps, a durable SQLite file, and a null backend that
//! persists nothing (every build re-runs).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::NeighborError;

/// Which persistence backend to use for neighbor/boundary state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RepositoryType {
    /// In-process only; state dies with the run.
    #[default]
    Memory,
    /// Durable SQLite database at the given path.
    Sqlite(PathBuf),
    /// No persistence at all; neighbor builds repeat per query.
    None,
}

/// Cached geography identifiers for a point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointGeography {
    /// Latitude of the cached point.
    pub lat: f64,
    /// Longitude of the cached point.
    pub lon: f64,
    /// Two-digit state FIPS code.
    pub state_fips: Option<String>,
    /// Three-digit county FIPS code.
    pub county_fips: Option<String>,
    /// 11-digit tract GEOID.
    pub tract_geoid: Option<String>,
    /// 12-digit block-group GEOID.
    pub block_group_geoid: Option<String>,
}

/// One directed county adjacency edge.
#[derive(Debug, Clone, PartialEq)]
pub struct CountyNeighbor {
    /// Source state FIPS.
    pub state_fips: String,
    /// Source county FIPS.
    pub county_fips: String,
    /// Neighbor state FIPS.
    pub neighbor_state_fips: String,
    /// Neighbor county FIPS.
    pub neighbor_county_fips: String,
    /// Length of the shared border in meters, when computed.
    pub shared_boundary_length: Option<f64>,
}

/// Aggregate counts over the stored relationships.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NeighborStatistics {
    /// Directed state adjacency edges.
    pub state_neighbors: usize,
    /// Directed county adjacency edges.
    pub county_neighbors: usize,
    /// County edges crossing a state line.
    pub cross_state_county_neighbors: usize,
    /// Cached point-geography entries.
    pub cached_points: usize,
    /// States whose county adjacency has been built.
    pub states_with_county_data: usize,
}

/// Edge storage for neighbor relationships and the point cache.
///
/// Implementations guard writes internally; all methods take `&self`.
pub trait NeighborRepository: Send + Sync {
    /// Inserts state adjacency pairs, ignoring duplicates. Returns the
    /// number of directed edges now stored.
    fn seed_state_neighbors(&self, pairs: &[(String, String)]) -> Result<usize, NeighborError>;

    /// Neighboring state FIPS codes, sorted.
    fn state_neighbors(&self, fips: &str) -> Result<Vec<String>, NeighborError>;

    /// Inserts county adjacency edges, ignoring duplicates.
    fn insert_county_neighbors(&self, edges: &[CountyNeighbor]) -> Result<usize, NeighborError>;

    /// Neighboring `(state, county)` pairs for a county, sorted.
    fn county_neighbors(&self, state: &str, county: &str)
    -> Result<Vec<(String, String)>, NeighborError>;

    /// Marks a state's county adjacency as fully built.
    fn mark_county_build(&self, state: &str) -> Result<(), NeighborError>;

    /// Returns `true` once [`mark_county_build`](Self::mark_county_build)
    /// has recorded this state.
    fn has_county_data(&self, state: &str) -> Result<bool, NeighborError>;

    /// Upserts a cached point lookup.
    fn upsert_point(&self, point: &PointGeography) -> Result<(), NeighborError>;

    /// Exact-match point lookup.
    fn lookup_point(&self, lat: f64, lon: f64) -> Result<Option<PointGeography>, NeighborError>;

    /// Aggregate counts for diagnostics.
    fn statistics(&self) -> Result<NeighborStatistics, NeighborError>;
}

/// Constructs the repository selected by `repository_type`.
///
/// # Errors
///
/// Returns [`NeighborError`] when the SQLite file cannot be opened.
pub fn build_repository(
    repository_type: &RepositoryType,
) -> Result<Arc<dyn NeighborRepository>, NeighborError> {
    match repository_type {
        RepositoryType::Memory => Ok(Arc::new(MemoryRepository::default())),
        RepositoryType::Sqlite(path) => Ok(Arc::new(SqliteRepository::open(path)?)),
        RepositoryType::None => Ok(Arc::new(NullRepository)),
    }
}

// ============================================================
// In-memory backend
// ============================================================

#[derive(Default)]
struct MemoryState {
    state_neighbors: HashMap<String, BTreeSet<String>>,
    county_neighbors: HashMap<(String, String), BTreeSet<(String, String)>>,
    built_states: HashSet<String>,
    points: HashMap<(u64, u64), PointGeography>,
}

/// Ephemeral in-process repository.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn point_key(lat: f64, lon: f64) -> (u64, u64) {
    (lat.to_bits(), lon.to_bits())
}

impl NeighborRepository for MemoryRepository {
    fn seed_state_neighbors(&self, pairs: &[(String, String)]) -> Result<usize, NeighborError> {
        let mut state = self.lock();
        for (a, b) in pairs {
            state
                .state_neighbors
                .entry(a.clone())
                .or_default()
                .insert(b.clone());
        }
        Ok(state.state_neighbors.values().map(BTreeSet::len).sum())
    }

    fn state_neighbors(&self, fips: &str) -> Result<Vec<String>, NeighborError> {
        Ok(self
            .lock()
            .state_neighbors
            .get(fips)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_county_neighbors(&self, edges: &[CountyNeighbor]) -> Result<usize, NeighborError> {
        let mut state = self.lock();
        let mut inserted = 0;
        for edge in edges {
            let added = state
                .county_neighbors
                .entry((edge.state_fips.clone(), edge.county_fips.clone()))
                .or_default()
                .insert((
                    edge.neighbor_state_fips.clone(),
                    edge.neighbor_county_fips.clone(),
                ));
            if added {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn county_neighbors(
        &self,
        state_fips: &str,
        county: &str,
    ) -> Result<Vec<(String, String)>, NeighborError> {
        Ok(self
            .lock()
            .county_neighbors
            .get(&(state_fips.to_string(), county.to_string()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn mark_county_build(&self, state_fips: &str) -> Result<(), NeighborError> {
        self.lock().built_states.insert(state_fips.to_string());
        Ok(())
    }

    fn has_county_data(&self, state_fips: &str) -> Result<bool, NeighborError> {
        Ok(self.lock().built_states.contains(state_fips))
    }

    fn upsert_point(&self, point: &PointGeography) -> Result<(), NeighborError> {
        self.lock()
            .points
            .insert(point_key(point.lat, point.lon), point.clone());
        Ok(())
    }

    fn lookup_point(&self, lat: f64, lon: f64) -> Result<Option<PointGeography>, NeighborError> {
        Ok(self.lock().points.get(&point_key(lat, lon)).cloned())
    }

    fn statistics(&self) -> Result<NeighborStatistics, NeighborError> {
        let state = self.lock();
        let county_neighbors: usize = state.county_neighbors.values().map(BTreeSet::len).sum();
        let cross_state = state
            .county_neighbors
            .iter()
            .map(|((src_state, _), neighbors)| {
                neighbors.iter().filter(|(s, _)| s != src_state).count()
            })
            .sum();
        Ok(NeighborStatistics {
            state_neighbors: state.state_neighbors.values().map(BTreeSet::len).sum(),
            county_neighbors,
            cross_state_county_neighbors: cross_state,
            cached_points: state.points.len(),
            states_with_county_data: state.built_states.len(),
        })
    }
}

// ============================================================
// SQLite backend
// ============================================================

/// Durable repository backed by a SQLite file.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Opens (or creates) the repository database and its schema.
    ///
    /// # Errors
    ///
    /// Returns [`NeighborError`] if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, NeighborError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS state_neighbors (
                state_fips TEXT NOT NULL,
                neighbor_state_fips TEXT NOT NULL,
                relationship_type TEXT NOT NULL DEFAULT 'adjacent',
                PRIMARY KEY (state_fips, neighbor_state_fips)
            );
            CREATE TABLE IF NOT EXISTS county_neighbors (
                state_fips TEXT NOT NULL,
                county_fips TEXT NOT NULL,
                neighbor_state_fips TEXT NOT NULL,
                neighbor_county_fips TEXT NOT NULL,
                relationship_type TEXT NOT NULL DEFAULT 'adjacent',
                shared_boundary_length REAL,
                PRIMARY KEY (state_fips, county_fips, neighbor_state_fips, neighbor_county_fips)
            );
            CREATE TABLE IF NOT EXISTS county_build_log (
                state_fips TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS point_geography_cache (
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                state_fips TEXT,
                county_fips TEXT,
                tract_geoid TEXT,
                block_group_geoid TEXT,
                PRIMARY KEY (lat, lon)
            );
            CREATE INDEX IF NOT EXISTS idx_county_neighbors_county
                ON county_neighbors(state_fips, county_fips);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl NeighborRepository for SqliteRepository {
    fn seed_state_neighbors(&self, pairs: &[(String, String)]) -> Result<usize, NeighborError> {
        let conn = self.lock();
        {
            let mut stmt = conn.prepare(
                "INSERT OR IGNORE INTO state_neighbors (state_fips, neighbor_state_fips)
                 VALUES (?1, ?2)",
            )?;
            for (a, b) in pairs {
                stmt.execute(rusqlite::params![a, b])?;
            }
        }
        let count: usize =
            conn.query_row("SELECT COUNT(*) FROM state_neighbors", [], |row| row.get(0))?;
        Ok(count)
    }

    fn state_neighbors(&self, fips: &str) -> Result<Vec<String>, NeighborError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT neighbor_state_fips FROM state_neighbors
             WHERE state_fips = ?1 ORDER BY neighbor_state_fips",
        )?;
        let rows = stmt.query_map([fips], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn insert_county_neighbors(&self, edges: &[CountyNeighbor]) -> Result<usize, NeighborError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO county_neighbors
             (state_fips, county_fips, neighbor_state_fips, neighbor_county_fips,
              shared_boundary_length)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let mut inserted = 0;
        for edge in edges {
            inserted += stmt.execute(rusqlite::params![
                edge.state_fips,
                edge.county_fips,
                edge.neighbor_state_fips,
                edge.neighbor_county_fips,
                edge.shared_boundary_length,
            ])?;
        }
        Ok(inserted)
    }

    fn county_neighbors(
        &self,
        state: &str,
        county: &str,
    ) -> Result<Vec<(String, String)>, NeighborError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT neighbor_state_fips, neighbor_county_fips FROM county_neighbors
             WHERE state_fips = ?1 AND county_fips = ?2
             ORDER BY neighbor_state_fips, neighbor_county_fips",
        )?;
        let rows = stmt.query_map([state, county], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn mark_county_build(&self, state: &str) -> Result<(), NeighborError> {
        self.lock().execute(
            "INSERT OR IGNORE INTO county_build_log (state_fips) VALUES (?1)",
            [state],
        )?;
        Ok(())
    }

    fn has_county_data(&self, state: &str) -> Result<bool, NeighborError> {
        let count: usize = self.lock().query_row(
            "SELECT COUNT(*) FROM county_build_log WHERE state_fips = ?1",
            [state],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn upsert_point(&self, point: &PointGeography) -> Result<(), NeighborError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO point_geography_cache
             (lat, lon, state_fips, county_fips, tract_geoid, block_group_geoid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                point.lat,
                point.lon,
                point.state_fips,
                point.county_fips,
                point.tract_geoid,
                point.block_group_geoid,
            ],
        )?;
        Ok(())
    }

    fn lookup_point(&self, lat: f64, lon: f64) -> Result<Option<PointGeography>, NeighborError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT state_fips, county_fips, tract_geoid, block_group_geoid
             FROM point_geography_cache WHERE lat = ?1 AND lon = ?2",
        )?;
        let mut rows = stmt.query(rusqlite::params![lat, lon])?;
        match rows.next()? {
            Some(row) => Ok(Some(PointGeography {
                lat,
                lon,
                state_fips: row.get(0)?,
                county_fips: row.get(1)?,
                tract_geoid: row.get(2)?,
                block_group_geoid: row.get(3)?,
            })),
            None => Ok(None),
        }
    }

    fn statistics(&self) -> Result<NeighborStatistics, NeighborError> {
        let conn = self.lock();
        let count = |sql: &str| -> Result<usize, rusqlite::Error> {
            conn.query_row(sql, [], |row| row.get(0))
        };
        Ok(NeighborStatistics {
            state_neighbors: count("SELECT COUNT(*) FROM state_neighbors")?,
            county_neighbors: count("SELECT COUNT(*) FROM county_neighbors")?,
            cross_state_county_neighbors: count(
                "SELECT COUNT(*) FROM county_neighbors WHERE state_fips != neighbor_state_fips",
            )?,
            cached_points: count("SELECT COUNT(*) FROM point_geography_cache")?,
            states_with_county_data: count("SELECT COUNT(*) FROM county_build_log")?,
        })
    }
}

// ============================================================
// Null backend
// ============================================================

/// Repository that stores nothing. Every lookup misses and county
/// builds are never marked complete, so adjacency is recomputed per
/// query.
pub struct NullRepository;

impl NeighborRepository for NullRepository {
    fn seed_state_neighbors(&self, _pairs: &[(String, String)]) -> Result<usize, NeighborError> {
        Ok(0)
    }

    fn state_neighbors(&self, _fips: &str) -> Result<Vec<String>, NeighborError> {
        Ok(Vec::new())
    }

    fn insert_county_neighbors(&self, _edges: &[CountyNeighbor]) -> Result<usize, NeighborError> {
        Ok(0)
    }

    fn county_neighbors(
        &self,
        _state: &str,
        _county: &str,
    ) -> Result<Vec<(String, String)>, NeighborError> {
        Ok(Vec::new())
    }

    fn mark_county_build(&self, _state: &str) -> Result<(), NeighborError> {
        Ok(())
    }

    fn has_county_data(&self, _state: &str) -> Result<bool, NeighborError> {
        Ok(false)
    }

    fn upsert_point(&self, _point: &PointGeography) -> Result<(), NeighborError> {
        Ok(())
    }

    fn lookup_point(&self, _lat: f64, _lon: f64) -> Result<Option<PointGeography>, NeighborError> {
        Ok(None)
    }

    fn statistics(&self) -> Result<NeighborStatistics, NeighborError> {
        Ok(NeighborStatistics::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(s: &str, c: &str, ns: &str, nc: &str) -> CountyNeighbor {
        CountyNeighbor {
            state_fips: s.to_string(),
            county_fips: c.to_string(),
            neighbor_state_fips: ns.to_string(),
            neighbor_county_fips: nc.to_string(),
            shared_boundary_length: Some(1000.0),
        }
    }

    fn exercise(repo: &dyn NeighborRepository) {
        repo.seed_state_neighbors(&[
            ("37".to_string(), "45".to_string()),
            ("45".to_string(), "37".to_string()),
        ])
        .unwrap();
        assert_eq!(repo.state_neighbors("37").unwrap(), vec!["45".to_string()]);

        repo.insert_county_neighbors(&[
            edge("37", "183", "37", "063"),
            edge("37", "063", "37", "183"),
            edge("37", "183", "37", "063"), // duplicate, ignored
        ])
        .unwrap();
        assert_eq!(
            repo.county_neighbors("37", "183").unwrap(),
            vec![("37".to_string(), "063".to_string())]
        );

        assert!(!repo.has_county_data("37").unwrap());
        repo.mark_county_build("37").unwrap();
        assert!(repo.has_county_data("37").unwrap());

        let point = PointGeography {
            lat: 35.7796,
            lon: -78.6382,
            state_fips: Some("37".to_string()),
            county_fips: Some("183".to_string()),
            tract_geoid: None,
            block_group_geoid: None,
        };
        repo.upsert_point(&point).unwrap();
        assert_eq!(repo.lookup_point(35.7796, -78.6382).unwrap(), Some(point));
        assert!(repo.lookup_point(0.0, 0.0).unwrap().is_none());

        let stats = repo.statistics().unwrap();
        assert_eq!(stats.state_neighbors, 2);
        assert_eq!(stats.county_neighbors, 2);
        assert_eq!(stats.cross_state_county_neighbors, 0);
        assert_eq!(stats.cached_points, 1);
        assert_eq!(stats.states_with_county_data, 1);
    }

    #[test]
    fn memory_repository_round_trips() {
        exercise(&MemoryRepository::default());
    }

    #[test]
    fn sqlite_repository_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::open(&dir.path().join("neighbors.db")).unwrap();
        exercise(&repo);
    }

    #[test]
    fn sqlite_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neighbors.db");
        {
            let repo = SqliteRepository::open(&path).unwrap();
            repo.mark_county_build("37").unwrap();
        }
        let repo = SqliteRepository::open(&path).unwrap();
        assert!(repo.has_county_data("37").unwrap());
    }

    #[test]
    fn null_repository_never_stores() {
        let repo = NullRepository;
        repo.mark_county_build("37").unwrap();
        assert!(!repo.has_county_data("37").unwrap());
        assert_eq!(repo.statistics().unwrap(), NeighborStatistics::default());
    }
}
