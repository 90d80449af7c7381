//! The lowered graph store.
//!
//! Nodes and edges live in a petgraph `StableGraph`, so indices stay valid
//! across the one mutation the pass performs on existing structure:
//! [`LoweredGraph::split_edge`], which replaces an edge with two. Input
//! ordering is explicit -- every edge carries its consumer input port in the
//! [`ValueEdge`] weight -- rather than relying on adjacency-list order.
//!
//! Nodes are created monotonically and never deleted; the graph is fully
//! built when the conversion pass returns.

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::error::LowerError;
use crate::node::{LoweredKind, LoweredNode};

/// Stable lowered-node identifier. Maps to a petgraph `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Stable lowered-edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl From<NodeIndex<u32>> for NodeId {
    fn from(idx: NodeIndex<u32>) -> Self {
        NodeId(idx.index() as u32)
    }
}

impl From<NodeId> for NodeIndex<u32> {
    fn from(id: NodeId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

impl From<EdgeIndex<u32>> for EdgeId {
    fn from(idx: EdgeIndex<u32>) -> Self {
        EdgeId(idx.index() as u32)
    }
}

impl From<EdgeId> for EdgeIndex<u32> {
    fn from(id: EdgeId) -> Self {
        EdgeIndex::new(id.0 as usize)
    }
}

/// Edge weight: which producer output feeds which consumer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueEdge {
    /// Output port of the producer (lowered nodes produce one value, so
    /// this is 0 throughout the pass).
    pub source_port: u16,
    /// Input port of the consumer.
    pub target_port: u16,
}

/// The lowered graph: a DAG of [`LoweredNode`]s.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoweredGraph {
    graph: StableGraph<LoweredNode, ValueEdge, Directed, u32>,
}

impl LoweredGraph {
    pub fn new() -> Self {
        LoweredGraph::default()
    }

    pub fn add_node(&mut self, node: LoweredNode) -> NodeId {
        NodeId::from(self.graph.add_node(node))
    }

    pub fn node(&self, id: NodeId) -> &LoweredNode {
        let idx: NodeIndex<u32> = id.into();
        &self.graph[idx]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterates all nodes with their ids, in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &LoweredNode)> + '_ {
        self.graph
            .node_indices()
            .map(move |idx| (NodeId::from(idx), &self.graph[idx]))
    }

    /// Connects `src` to the next free input port of `dst`.
    pub fn connect(&mut self, src: NodeId, dst: NodeId) -> EdgeId {
        let dst_idx: NodeIndex<u32> = dst.into();
        let port = self
            .graph
            .edges_directed(dst_idx, Direction::Incoming)
            .count() as u16;
        let edge = self.graph.add_edge(
            src.into(),
            dst_idx,
            ValueEdge {
                source_port: 0,
                target_port: port,
            },
        );
        EdgeId::from(edge)
    }

    /// Inserts `middle` between the endpoints of `edge`, preserving the
    /// consumer's input port. Returns the new `middle -> consumer` edge.
    pub fn split_edge(&mut self, edge: EdgeId, middle: NodeId) -> EdgeId {
        let idx: EdgeIndex<u32> = edge.into();
        let (src, dst) = self
            .graph
            .edge_endpoints(idx)
            .expect("split_edge: edge not in graph");
        let weight = self
            .graph
            .remove_edge(idx)
            .expect("split_edge: edge not in graph");
        self.graph.add_edge(
            src,
            middle.into(),
            ValueEdge {
                source_port: weight.source_port,
                target_port: 0,
            },
        );
        let out = self.graph.add_edge(
            middle.into(),
            dst,
            ValueEdge {
                source_port: 0,
                target_port: weight.target_port,
            },
        );
        EdgeId::from(out)
    }

    /// Incoming edges of a node as `(edge, producer)`, ordered by input
    /// port.
    pub fn input_edges(&self, id: NodeId) -> Vec<(EdgeId, NodeId)> {
        let idx: NodeIndex<u32> = id.into();
        let mut edges: Vec<(u16, EdgeId, NodeId)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| {
                (
                    e.weight().target_port,
                    EdgeId::from(e.id()),
                    NodeId::from(e.source()),
                )
            })
            .collect();
        edges.sort_by_key(|(port, _, _)| *port);
        edges.into_iter().map(|(_, edge, src)| (edge, src)).collect()
    }

    /// Producer connected to input port `port` of a node.
    pub fn input_source(&self, id: NodeId, port: u16) -> Option<NodeId> {
        let idx: NodeIndex<u32> = id.into();
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .find(|e| e.weight().target_port == port)
            .map(|e| NodeId::from(e.source()))
    }

    /// Checks the structural invariants of a fully built graph:
    /// acyclicity, at least one input edge on every non-source node,
    /// contiguous input ports, layout agreement along every edge (layout
    /// fixups excepted), and non-empty provenance.
    pub fn validate(&self) -> Result<(), LowerError> {
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            return Err(LowerError::InvalidGraph {
                reason: "cycle detected".into(),
            });
        }
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let id = NodeId::from(idx);
            if node.sources.is_empty() {
                return Err(LowerError::InvalidGraph {
                    reason: format!("{} node {} has empty provenance", node.kind_name(), id.0),
                });
            }
            let inputs = self.input_edges(id);
            if inputs.is_empty() && !node.is_source() {
                return Err(LowerError::InvalidGraph {
                    reason: format!("{} node {} has no input edges", node.kind_name(), id.0),
                });
            }
            for (port, (edge, _)) in inputs.iter().enumerate() {
                let eidx: EdgeIndex<u32> = (*edge).into();
                let weight = self.graph[eidx];
                if weight.target_port as usize != port {
                    return Err(LowerError::InvalidGraph {
                        reason: format!(
                            "{} node {} input ports are not contiguous",
                            node.kind_name(),
                            id.0
                        ),
                    });
                }
            }
            if !node.accepts_any_input_format() {
                for (_, producer) in &inputs {
                    let producer_node = self.node(*producer);
                    if producer_node.format != node.format {
                        return Err(LowerError::InvalidGraph {
                            reason: format!(
                                "layout mismatch on edge {} -> {}: {:?} feeds {:?}",
                                producer.0, id.0, producer_node.format, node.format
                            ),
                        });
                    }
                }
            }
            if matches!(node.kind, LoweredKind::Concat { .. }) {
                for (_, producer) in &inputs {
                    let producer_node = self.node(*producer);
                    if producer_node.quant != node.quant {
                        return Err(LowerError::InvalidGraph {
                            reason: format!(
                                "quantization mismatch on concat input {} -> {}",
                                producer.0, id.0
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
