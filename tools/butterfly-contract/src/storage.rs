//! Storage for finished hierarchy edges
//!
//! Edges owned by contracted nodes never change again. When the working graph
//! is flushed they move here, either kept in memory or streamed to an
//! anonymous temp file as fixed-size little-endian records and read back on
//! export.

use butterfly_common::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use crate::graph::{ContractorEdge, EdgeDuration, EdgeWeight, NodeId};

/// Backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeStorageKind {
    #[default]
    InMemory,
    Spill,
}

/// Hierarchy edge in original node ids, as consumed by the query side
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: EdgeWeight,
    pub duration: EdgeDuration,
    pub original_edges: u32,
    pub via: NodeId,
    pub shortcut: bool,
    pub forward: bool,
    pub backward: bool,
}

const RECORD_SIZE: usize = 25;

const FLAG_SHORTCUT: u8 = 1;
const FLAG_FORWARD: u8 = 2;
const FLAG_BACKWARD: u8 = 4;

impl QueryEdge {
    /// Translate endpoints through `orig_ids`; the via-node is already original
    pub fn from_contractor_edge(edge: &ContractorEdge, orig_ids: &[NodeId]) -> Self {
        Self {
            source: orig_ids[edge.source as usize],
            target: orig_ids[edge.target as usize],
            weight: edge.data.weight,
            duration: edge.data.duration,
            original_edges: edge.data.original_edges,
            via: edge.data.via,
            shortcut: edge.data.shortcut,
            forward: edge.data.forward,
            backward: edge.data.backward,
        }
    }

    fn to_le_bytes(self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.source.to_le_bytes());
        buf[4..8].copy_from_slice(&self.target.to_le_bytes());
        buf[8..12].copy_from_slice(&self.weight.to_le_bytes());
        buf[12..16].copy_from_slice(&self.duration.to_le_bytes());
        buf[16..20].copy_from_slice(&self.original_edges.to_le_bytes());
        buf[20..24].copy_from_slice(&self.via.to_le_bytes());
        let mut flags = 0u8;
        if self.shortcut {
            flags |= FLAG_SHORTCUT;
        }
        if self.forward {
            flags |= FLAG_FORWARD;
        }
        if self.backward {
            flags |= FLAG_BACKWARD;
        }
        buf[24] = flags;
        buf
    }

    fn from_le_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        let word = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        let flags = buf[24];
        Self {
            source: word(0),
            target: word(4),
            weight: word(8),
            duration: word(12),
            original_edges: word(16),
            via: word(20),
            shortcut: flags & FLAG_SHORTCUT != 0,
            forward: flags & FLAG_FORWARD != 0,
            backward: flags & FLAG_BACKWARD != 0,
        }
    }
}

/// Temp-file backed edge buffer
pub struct SpillFile {
    writer: BufWriter<File>,
    len: usize,
}

/// Pluggable edge storage chosen at construction
pub enum EdgeStorage {
    InMemory(Vec<QueryEdge>),
    Spill(SpillFile),
}

impl EdgeStorage {
    pub fn new(kind: EdgeStorageKind) -> Result<Self> {
        Ok(match kind {
            EdgeStorageKind::InMemory => EdgeStorage::InMemory(Vec::new()),
            EdgeStorageKind::Spill => EdgeStorage::Spill(SpillFile {
                writer: BufWriter::with_capacity(4 * 1024 * 1024, tempfile::tempfile()?),
                len: 0,
            }),
        })
    }

    pub fn kind(&self) -> EdgeStorageKind {
        match self {
            EdgeStorage::InMemory(_) => EdgeStorageKind::InMemory,
            EdgeStorage::Spill(_) => EdgeStorageKind::Spill,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EdgeStorage::InMemory(edges) => edges.len(),
            EdgeStorage::Spill(spill) => spill.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, edge: QueryEdge) -> Result<()> {
        match self {
            EdgeStorage::InMemory(edges) => edges.push(edge),
            EdgeStorage::Spill(spill) => {
                spill.writer.write_all(&edge.to_le_bytes())?;
                spill.len += 1;
            }
        }
        Ok(())
    }

    pub fn extend(&mut self, edges: impl IntoIterator<Item = QueryEdge>) -> Result<()> {
        for edge in edges {
            self.push(edge)?;
        }
        Ok(())
    }

    /// Load everything back into memory
    pub fn into_vec(self) -> Result<Vec<QueryEdge>> {
        match self {
            EdgeStorage::InMemory(edges) => Ok(edges),
            EdgeStorage::Spill(spill) => {
                let mut file = spill.writer.into_inner().map_err(|e| e.into_error())?;
                file.seek(SeekFrom::Start(0))?;

                let mut reader = BufReader::with_capacity(4 * 1024 * 1024, file);
                let mut edges = Vec::with_capacity(spill.len);
                let mut buf = [0u8; RECORD_SIZE];
                for _ in 0..spill.len {
                    reader.read_exact(&mut buf)?;
                    edges.push(QueryEdge::from_le_bytes(&buf));
                }
                Ok(edges)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SPECIAL_NODE_ID;

    fn sample() -> Vec<QueryEdge> {
        vec![
            QueryEdge {
                source: 0,
                target: 7,
                weight: 12,
                duration: 30,
                original_edges: 1,
                via: SPECIAL_NODE_ID,
                shortcut: false,
                forward: true,
                backward: true,
            },
            QueryEdge {
                source: 3,
                target: 7,
                weight: 40,
                duration: 41,
                original_edges: 3,
                via: 5,
                shortcut: true,
                forward: false,
                backward: true,
            },
        ]
    }

    #[test]
    fn test_spill_reads_back_what_was_written() {
        let mut storage = EdgeStorage::new(EdgeStorageKind::Spill).unwrap();
        assert_eq!(storage.kind(), EdgeStorageKind::Spill);
        storage.extend(sample()).unwrap();
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.into_vec().unwrap(), sample());
    }

    #[test]
    fn test_in_memory_storage() {
        let mut storage = EdgeStorage::new(EdgeStorageKind::InMemory).unwrap();
        assert!(storage.is_empty());
        storage.extend(sample()).unwrap();
        assert_eq!(storage.into_vec().unwrap(), sample());
    }

    #[test]
    fn test_empty_spill() {
        let storage = EdgeStorage::new(EdgeStorageKind::Spill).unwrap();
        assert!(storage.into_vec().unwrap().is_empty());
    }

    #[test]
    fn test_storage_kind_json_names() {
        assert_eq!(serde_json::to_string(&EdgeStorageKind::InMemory).unwrap(), "\"in-memory\"");
        assert_eq!(serde_json::from_str::<EdgeStorageKind>("\"spill\"").unwrap(), EdgeStorageKind::Spill);
    }
}
