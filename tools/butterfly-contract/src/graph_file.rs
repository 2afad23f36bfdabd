//! JSON graph and hierarchy files used by the CLI

use butterfly_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::contractor::{ContractedHierarchy, ContractionSummary, NodeLevel};
use crate::graph::{EdgeWeight, InputEdge};

/// Input graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFile {
    pub n_nodes: usize,
    pub edges: Vec<InputEdge>,
    /// Loop penalty per node, zero when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_weights: Option<Vec<EdgeWeight>>,
    /// Levels of an earlier run; contraction follows this order when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_levels: Option<Vec<NodeLevel>>,
}

impl GraphFile {
    pub fn new(n_nodes: usize, edges: Vec<InputEdge>) -> Self {
        Self {
            n_nodes,
            edges,
            node_weights: None,
            node_levels: None,
        }
    }

    pub fn check(&self) -> Result<()> {
        for (name, len) in [
            ("node_weights", self.node_weights.as_ref().map(Vec::len)),
            ("node_levels", self.node_levels.as_ref().map(Vec::len)),
        ] {
            if let Some(len) = len {
                if len != self.n_nodes {
                    return Err(Error::invalid_graph(format!("{} has {} entries for {} nodes", name, len, self.n_nodes)));
                }
            }
        }
        Ok(())
    }
}

/// Contraction output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyFile {
    pub summary: ContractionSummary,
    #[serde(flatten)]
    pub hierarchy: ContractedHierarchy,
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_minimal_graph_file() {
        let json = r#"{"n_nodes": 2, "edges": [{"source": 0, "target": 1, "weight": 5}]}"#;
        let file: GraphFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.edges[0], InputEdge { duration: 0, ..InputEdge::directed(0, 1, 5) });
        assert!(file.node_weights.is_none());
        assert!(file.check().is_ok());
    }

    #[test]
    fn test_mismatched_node_weights() {
        let mut file = GraphFile::new(3, vec![]);
        file.node_weights = Some(vec![0; 2]);
        assert!(matches!(file.check(), Err(Error::InvalidGraph(_))));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let file = GraphFile::new(2, vec![InputEdge::bidirectional(0, 1, 3)]);
        write_json(&path, &file).unwrap();
        let back: GraphFile = read_json(&path).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_json::<GraphFile>(Path::new("/nonexistent/graph.json")).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }
}
