//! Parallel in-place rewrite of edge payloads.
//!
//! A transform maps `(src, dst, old)` to a new payload for every edge without
//! touching topology. Each vertex's by-source and by-destination lists are
//! claimed by exactly one rayon task, and since the two indices hold separate
//! copies of every payload the two writes for one edge never alias.

use std::fmt;
use std::time::Instant;

use rayon::prelude::*;
use tracing::info;

use crate::storage::MutableGraph;
use crate::types::{ConvertError, EdgeDataKind, Result, VertexId};

/// Vertices handed to a rayon task at a time.
const GRAIN: usize = 64;

/// Built-in payload rewrites.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EdgeDataTransform {
    /// Every payload becomes zero.
    Null,
    /// Payload derived from the endpoints; never zero.
    Hash,
}

impl EdgeDataTransform {
    /// Resolves a case-insensitive transform name.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "null" | "nulledgedata" | "zero" => Ok(EdgeDataTransform::Null),
            "hash" | "hashedgedata" => Ok(EdgeDataTransform::Hash),
            _ => Err(ConvertError::UnknownTransform(name.to_string())),
        }
    }

    /// Kind the graph carries after this transform: the current kind when it
    /// has data, integers otherwise.
    pub fn target_kind(self, current: EdgeDataKind) -> EdgeDataKind {
        if current.has_data() {
            current
        } else {
            EdgeDataKind::U64
        }
    }

    /// New payload bits for edge `(src, dst)` stored as `kind`.
    pub fn compute(self, kind: EdgeDataKind, src: VertexId, dst: VertexId) -> u64 {
        match self {
            EdgeDataTransform::Null => 0,
            EdgeDataTransform::Hash => {
                let value = hash_edge(src, dst);
                match kind {
                    EdgeDataKind::F64 => (value as f64).to_bits(),
                    _ => value,
                }
            }
        }
    }

    /// Rewrites every payload of `graph` and records the resulting kind.
    pub fn apply(self, graph: &mut MutableGraph) {
        let start = Instant::now();
        let target = self.target_kind(graph.edge_data());
        let (by_source, by_destination) = graph.indices_mut();
        by_source
            .slots_mut()
            .par_iter_mut()
            .with_min_len(GRAIN)
            .enumerate()
            .for_each(|(v, slot)| {
                if let Some(list) = slot.get_mut() {
                    let src = v as VertexId;
                    list.rewrite_data(|dst, _| self.compute(target, src, dst));
                }
            });
        by_destination
            .slots_mut()
            .par_iter_mut()
            .with_min_len(GRAIN)
            .enumerate()
            .for_each(|(v, slot)| {
                if let Some(list) = slot.get_mut() {
                    let dst = v as VertexId;
                    list.rewrite_data(|src, _| self.compute(target, src, dst));
                }
            });
        graph.set_edge_data_kind(target);
        info!(
            transform = %self,
            edge_data = %target,
            edges = graph.num_edges(),
            duration_ms = start.elapsed().as_secs_f64() * 1_000.0,
            "transform.apply"
        );
    }
}

impl fmt::Display for EdgeDataTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeDataTransform::Null => f.write_str("null"),
            EdgeDataTransform::Hash => f.write_str("hash"),
        }
    }
}

/// Bits 39:25 of `(3 * dst + src) * 2654435761`, plus one.
pub fn hash_edge(src: VertexId, dst: VertexId) -> u64 {
    let mixed = dst
        .wrapping_mul(3)
        .wrapping_add(src)
        .wrapping_mul(2_654_435_761);
    ((mixed >> 25) & 0x7fff) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Orientation;
    use crate::types::EdgeRecord;

    fn graph_of(kind: EdgeDataKind, edges: &[(u64, u64, u64)]) -> MutableGraph {
        let mut graph = MutableGraph::new(kind);
        for &(s, d, w) in edges {
            graph.insert(&EdgeRecord::with_data(s, d, w)).unwrap();
        }
        graph
    }

    #[test]
    fn hash_of_zero_one_is_stable_on_both_indices() {
        let mut graph = graph_of(EdgeDataKind::U64, &[(0, 1, 0), (1, 0, 0)]);
        EdgeDataTransform::Hash.apply(&mut graph);
        assert_eq!(hash_edge(0, 1), 238);
        let by_src = graph.edge_list(Orientation::BySource, 0).unwrap();
        let by_dst = graph.edge_list(Orientation::ByDestination, 1).unwrap();
        assert_eq!(by_src.data_for(1), Some(238));
        assert_eq!(by_dst.data_for(0), Some(238));
        graph.check_coherency().unwrap();
    }

    #[test]
    fn hash_is_never_zero() {
        for src in 0..200u64 {
            for dst in (0..200u64).step_by(7) {
                let h = hash_edge(src, dst);
                assert!((1..=0x8000).contains(&h));
                assert_eq!(h, hash_edge(src, dst));
            }
        }
    }

    #[test]
    fn null_zeroes_and_topology_graphs_become_integer() {
        let mut graph = graph_of(EdgeDataKind::None, &[(0, 1, 0), (2, 1, 0), (1, 2, 0)]);
        EdgeDataTransform::Hash.apply(&mut graph);
        assert_eq!(graph.edge_data(), EdgeDataKind::U64);
        graph.check_coherency().unwrap();
        EdgeDataTransform::Null.apply(&mut graph);
        assert!(graph.edges(Orientation::BySource).all(|e| e.data == 0));
        assert!(graph.edges(Orientation::ByDestination).all(|e| e.data == 0));
    }

    #[test]
    fn float_graphs_store_hashes_as_floats() {
        let mut graph = graph_of(EdgeDataKind::F64, &[(3, 4, 1.5f64.to_bits())]);
        EdgeDataTransform::Hash.apply(&mut graph);
        let edge = graph.edges(Orientation::BySource).next().unwrap();
        assert_eq!(f64::from_bits(edge.data), hash_edge(3, 4) as f64);
        graph.check_coherency().unwrap();
    }

    #[test]
    fn large_graphs_stay_coherent() {
        let edges: Vec<_> = (0..5_000u64).map(|i| (i % 701, (i * 13) % 977, i)).collect();
        let mut graph = graph_of(EdgeDataKind::U64, &edges);
        EdgeDataTransform::Hash.apply(&mut graph);
        graph.check_coherency().unwrap();
        for edge in graph.edges(Orientation::BySource) {
            assert_eq!(edge.data, hash_edge(edge.src, edge.dst));
        }
    }

    #[test]
    fn names_parse() {
        assert_eq!(EdgeDataTransform::parse("Hash").unwrap(), EdgeDataTransform::Hash);
        assert_eq!(EdgeDataTransform::parse("nulledgedata").unwrap(), EdgeDataTransform::Null);
        assert!(matches!(
            EdgeDataTransform::parse("pagerank"),
            Err(ConvertError::UnknownTransform(_))
        ));
    }
}
