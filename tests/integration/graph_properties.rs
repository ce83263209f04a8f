#![allow(missing_docs)]

use std::collections::BTreeMap;

use edgeconv::formats::{EdgeReader, InputHeader};
use edgeconv::pipeline::{read_into_graph, PipelineOptions};
use edgeconv::storage::{
    IndexedEdge, MutableGraph, Orientation, SparseVector, VectorSparseGraph, EDGES_PER_VECTOR,
};
use edgeconv::transform::hash_edge;
use edgeconv::types::{EdgeDataKind, EdgeRecord, Result};
use proptest::prelude::*;

const VERTICES: u64 = 24;

#[derive(Debug, Clone)]
enum Operation {
    Insert { src: u64, dst: u64, data: u64 },
    RemoveEdge { src: u64, dst: u64 },
    RemoveVertex { vertex: u64 },
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        6 => (0..VERTICES, 0..VERTICES, 0u64..1_000)
            .prop_map(|(src, dst, data)| Operation::Insert { src, dst, data }),
        2 => (0..VERTICES, 0..VERTICES).prop_map(|(src, dst)| Operation::RemoveEdge { src, dst }),
        1 => (0..VERTICES).prop_map(|vertex| Operation::RemoveVertex { vertex }),
    ]
}

fn arb_edges() -> impl Strategy<Value = Vec<(u64, u64, u64)>> {
    prop::collection::vec((0..VERTICES, 0..VERTICES, 0u64..1_000), 0..200)
}

fn multiset(edges: impl Iterator<Item = EdgeRecord>) -> BTreeMap<EdgeRecord, usize> {
    let mut counts = BTreeMap::new();
    for edge in edges {
        *counts.entry(edge).or_insert(0) += 1;
    }
    counts
}

struct VecReader {
    header: InputHeader,
    edges: Vec<EdgeRecord>,
    cursor: usize,
}

impl EdgeReader for VecReader {
    fn header(&self) -> InputHeader {
        self.header
    }

    fn read_edges(&mut self, buf: &mut [EdgeRecord]) -> Result<usize> {
        let n = buf.len().min(self.edges.len() - self.cursor);
        buf[..n].copy_from_slice(&self.edges[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn serial_graph(kind: EdgeDataKind, edges: &[(u64, u64, u64)]) -> MutableGraph {
    let mut graph = MutableGraph::new(kind);
    for &(src, dst, data) in edges {
        graph
            .insert(&EdgeRecord::with_data(src, dst, data))
            .expect("insert");
    }
    graph
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_serial_updates_keep_indices_coherent(ops in prop::collection::vec(arb_operation(), 1..150)) {
        let mut graph = MutableGraph::new(EdgeDataKind::U64);
        let mut model: BTreeMap<(u64, u64), Vec<u64>> = BTreeMap::new();
        for op in ops {
            match op {
                Operation::Insert { src, dst, data } => {
                    if model.contains_key(&(src, dst)) {
                        continue;
                    }
                    graph.insert(&EdgeRecord::with_data(src, dst, data)).unwrap();
                    model.entry((src, dst)).or_default().push(data);
                }
                Operation::RemoveEdge { src, dst } => {
                    graph.remove_edge(src, dst);
                    model.remove(&(src, dst));
                }
                Operation::RemoveVertex { vertex } => {
                    graph.remove_vertex(vertex);
                    model.retain(|&(s, d), _| s != vertex && d != vertex);
                }
            }
        }
        let expected: u64 = model.values().map(|v| v.len() as u64).sum();
        prop_assert_eq!(graph.by_source().num_edges(), graph.by_destination().num_edges());
        prop_assert_eq!(graph.num_edges(), expected);
        let enumerated = graph.edges(Orientation::BySource).count() as u64;
        prop_assert_eq!(enumerated, expected);
        prop_assert!(graph.check_coherency().is_ok());
    }

    #[test]
    fn prop_every_list_packs_into_ceil_quarter_vectors(edges in arb_edges()) {
        let graph = serial_graph(EdgeDataKind::None, &edges);
        for orientation in Orientation::ALL {
            for (_, list) in graph.index(orientation).iter() {
                prop_assert_eq!(list.degree() as usize, list.scan().len());
                prop_assert_eq!(list.num_vectors(), list.degree().div_ceil(EDGES_PER_VECTOR));
            }
        }
    }

    #[test]
    fn prop_parallel_ingest_matches_recount(edges in arb_edges(), consumers in 1usize..5, per_buffer in 1usize..9) {
        let records: Vec<EdgeRecord> = edges
            .iter()
            .map(|&(s, d, w)| EdgeRecord::with_data(s, d, w))
            .collect();
        let mut reader = VecReader {
            header: InputHeader { num_vertices: VERTICES, num_edges: records.len() as u64 },
            edges: records.clone(),
            cursor: 0,
        };
        let options = PipelineOptions {
            buffer_bytes: per_buffer * EdgeDataKind::U64.record_size(),
            read_threads: Some(consumers),
            numa_node: 0,
            pin_threads: false,
        };
        let mut graph = MutableGraph::new(EdgeDataKind::U64);
        let stats = read_into_graph(&mut reader, &mut graph, &options).unwrap();
        prop_assert_eq!(stats.records, records.len() as u64);
        for orientation in Orientation::ALL {
            let index = graph.index(orientation);
            let (edges, vectors, present) = index.recount();
            prop_assert_eq!(index.num_edges(), edges);
            prop_assert_eq!(index.num_vectors(), vectors);
            prop_assert_eq!(index.num_vertices_present(), present);
        }
        prop_assert!(graph.check_coherency().is_ok());
        prop_assert_eq!(multiset(graph.edges(Orientation::BySource)), multiset(records.into_iter()));
    }

    #[test]
    fn prop_vector_sparse_decodes_to_the_same_multiset(edges in arb_edges(), weighted in any::<bool>()) {
        let kind = if weighted { EdgeDataKind::U64 } else { EdgeDataKind::None };
        let edges: Vec<_> = edges
            .into_iter()
            .map(|(s, d, w)| (s, d, if weighted { w } else { 0 }))
            .collect();
        let graph = serial_graph(kind, &edges);
        let vs = VectorSparseGraph::build(&graph).unwrap();
        for orientation in Orientation::ALL {
            prop_assert_eq!(vs.num_vectors(orientation), graph.num_vectors(orientation));
            prop_assert_eq!(
                multiset(vs.edges(orientation)),
                multiset(graph.edges(orientation))
            );
        }
    }

    #[test]
    fn prop_variable_field_round_trips(
        shared in 0u64..(1 << 48),
        others in prop::collection::vec(0u64..(1 << 48), 1..=4),
        value in 0u16..(1 << 12),
    ) {
        let entries: Vec<IndexedEdge> = others
            .iter()
            .map(|&other| IndexedEdge { other, data: 0 })
            .collect();
        let (mut vector, _) = SparseVector::encode(shared, &entries);
        vector.set_variable_field(value);
        prop_assert_eq!(vector.variable_field(), value);
        prop_assert_eq!(vector.shared_vertex(), shared);
        prop_assert_eq!(vector.count(), others.len());
        for (slot, &other) in others.iter().enumerate() {
            prop_assert_eq!(vector.other(slot), other);
        }
    }

    #[test]
    fn prop_hash_is_deterministic_and_nonzero(src in any::<u64>(), dst in any::<u64>()) {
        let h = hash_edge(src, dst);
        prop_assert!(h >= 1 && h <= 0x8000);
        prop_assert_eq!(h, hash_edge(src, dst));
    }
}
