use anyping_model::ProbeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe not found: {0}")]
    ProbeNotFound(ProbeId),

    #[error("position {position} is out of range for {len} probes")]
    ReorderOutOfRange { position: usize, len: usize },

    #[error("failed to spawn ping for {address}: {source}")]
    CheckSpawnFailure {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ping report: {0}")]
    CheckParseFailure(String),

    #[error("invalid probe spec: {0}")]
    InvalidSpec(String),

    #[error("failed to start loop for probe {id}: {source}")]
    LoopSpawnFailure {
        id: ProbeId,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProbeError>;
