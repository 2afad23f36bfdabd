//! Parallel contraction hierarchy preprocessing
//!
//! [`GraphContractor`] turns a directed, weighted road graph into a
//! contraction hierarchy: a level per node plus the shortcut edges that keep
//! upward/downward searches exact. Contraction can stop early and leave a
//! core of uncontracted nodes for a different query technique.

pub mod cli;
pub mod config;
pub mod contractor;
pub mod graph;
pub mod graph_file;
pub mod logging;
pub mod scratch;
pub mod storage;
pub mod synthetic;
pub mod validate;
pub mod witness;

pub use config::ContractorConfig;
pub use contractor::{ContractedHierarchy, ContractionSummary, GraphContractor, NodeLevel, INVALID_LEVEL};
pub use graph::{ContractorGraph, InputEdge};
pub use storage::{EdgeStorageKind, QueryEdge};
