//! Typed error hierarchy, one enum per spec.md §7 error category.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("process count {0} is not a power of two")]
    SizeNotPowerOfTwo(i32),
    #[error("missing required input file")]
    MissingInputFile,
    #[error("invalid numeric parameter `{name}`: {value}")]
    InvalidParameter { name: String, value: String },
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("body {id} at entry to ORB lies outside the global box")]
    BodyOutsideGlobalBox { id: u64 },
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("received message of unexpected size: expected {expected}, got {got}")]
    UnexpectedMessageSize { expected: usize, got: usize },
    #[error("parent index {idx} out of range in received subtree of {len} cells")]
    BadParentIndex { idx: i64, len: usize },
    #[error("attempted to graft a cell onto an already-occupied slot")]
    OccupiedSlot,
    #[error("received cell's parent has no free child slot (sender/receiver octant-order mismatch)")]
    NoFreeChildSlot,
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed body record at line {line}: {detail}")]
    BodyParse { line: usize, detail: String },
    #[error(transparent)]
    Step(#[from] crate::integrator::StepError),
}
