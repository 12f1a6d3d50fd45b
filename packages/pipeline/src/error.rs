//! The pipeline error taxonomy.
//!
//! Components return their own typed errors; the orchestrator lifts
//! them into [`PipelineError`] with the stage that failed and, for the
//! user-facing kinds, remediation suggestions.

use thiserror::Error;

/// The pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Environment/directory setup.
    Setup,
    /// POI extraction and validation.
    PoiExtraction,
    /// Isochrone generation.
    Isochrones,
    /// Candidate-unit resolution and intersection.
    CandidateUnits,
    /// Distance enrichment.
    Distances,
    /// Census data fetch and merge.
    CensusData,
    /// Final export and reporting.
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Setup => "setup",
            Self::PoiExtraction => "poi-extraction",
            Self::Isochrones => "isochrones",
            Self::CandidateUnits => "candidate-units",
            Self::Distances => "distances",
            Self::CensusData => "census-data",
            Self::Report => "report",
        };
        f.write_str(label)
    }
}

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid input caught before any network I/O.
    #[error("configuration error: {message}")]
    Configuration {
        /// What is wrong.
        message: String,
        /// How to fix it.
        suggestions: Vec<String>,
    },

    /// A free-form location could not be resolved to a state.
    #[error("could not resolve location '{location}' to a state")]
    InvalidLocation {
        /// The offending input.
        location: String,
        /// How to fix it.
        suggestions: Vec<String>,
    },

    /// A stage produced nothing to continue with.
    #[error("no data found during {stage}: {message}")]
    NoDataFound {
        /// Stage that came up empty.
        stage: Stage,
        /// What was empty.
        message: String,
        /// How to fix it.
        suggestions: Vec<String>,
    },

    /// An upstream service failed after retries.
    #[error("external service {host} failed during {stage}: {message}")]
    ExternalService {
        /// Upstream host.
        host: String,
        /// Last observed HTTP status, when there was one.
        status: Option<u16>,
        /// Stage that was talking to it.
        stage: Stage,
        /// Underlying failure.
        message: String,
    },

    /// HTTP 429 with the retry budget exhausted.
    #[error("rate limited by {host} during {stage}")]
    RateLimit {
        /// Upstream host.
        host: String,
        /// Stage that was talking to it.
        stage: Stage,
    },

    /// A fetched payload failed schema or validation checks, or a
    /// failure ratio crossed the configured threshold.
    #[error("data processing failed during {stage}: {message}")]
    DataProcessing {
        /// Stage that failed.
        stage: Stage,
        /// What went wrong.
        message: String,
    },

    /// Census data was requested without an API key.
    #[error("census API key missing; set CENSUS_API_KEY or pass api_key")]
    MissingApiKey,
}

impl PipelineError {
    /// The stage an error is attributed to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Configuration { .. } | Self::InvalidLocation { .. } => Stage::Setup,
            Self::MissingApiKey => Stage::CensusData,
            Self::NoDataFound { stage, .. }
            | Self::ExternalService { stage, .. }
            | Self::RateLimit { stage, .. }
            | Self::DataProcessing { stage, .. } => *stage,
        }
    }

    /// Remediation suggestions, when the error carries any.
    #[must_use]
    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::Configuration { suggestions, .. }
            | Self::InvalidLocation { suggestions, .. }
            | Self::NoDataFound { suggestions, .. } => suggestions,
            _ => &[],
        }
    }

    /// Lifts an HTTP error into the taxonomy at the given stage.
    #[must_use]
    pub fn from_http(stage: Stage, error: socialmapper_http::HttpError) -> Self {
        use socialmapper_http::HttpError;
        match error {
            HttpError::RateLimited { host, .. } => Self::RateLimit { host, stage },
            HttpError::Status { host, status } => Self::ExternalService {
                host,
                status: Some(status),
                stage,
                message: format!("HTTP {status}"),
            },
            other => Self::ExternalService {
                host: "unknown".to_string(),
                status: None,
                stage,
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_attributed() {
        let error = PipelineError::NoDataFound {
            stage: Stage::Isochrones,
            message: "zero isochrones".to_string(),
            suggestions: vec![],
        };
        assert_eq!(error.stage(), Stage::Isochrones);

        let config = PipelineError::Configuration {
            message: "bad".to_string(),
            suggestions: vec!["fix it".to_string()],
        };
        assert_eq!(config.stage(), Stage::Setup);
        assert_eq!(config.suggestions().len(), 1);
    }

    #[test]
    fn http_rate_limit_maps_to_rate_limit() {
        let http = socialmapper_http::HttpError::RateLimited {
            host: "overpass-api.de".to_string(),
            attempts: 4,
        };
        match PipelineError::from_http(Stage::PoiExtraction, http) {
            PipelineError::RateLimit { host, stage } => {
                assert_eq!(host, "overpass-api.de");
                assert_eq!(stage, Stage::PoiExtraction);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn http_status_maps_to_external_service() {
        let http = socialmapper_http::HttpError::Status {
            host: "api.census.gov".to_string(),
            status: 503,
        };
        match PipelineError::from_http(Stage::CensusData, http) {
            PipelineError::ExternalService { status, .. } => {
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
