//! Arena-backed computation graph and the two differentiation passes.
//!
//! Nodes live in a `Vec` and refer to their inputs by [`NodeId`] index, so
//! creation order is a topological order and clearing the whole graph is a
//! single truncation. A [`Graph`] is a cheap handle; clones share one arena.
//!
//! Gradient slots accumulate: running a pass twice without
//! [`Graph::clear_grads`] or [`Graph::reset`] adds the derivatives twice.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::ops::{expand, Op};
use crate::value::{NodeRef, Value};

/// Index of a node in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creation order of the node within the current epoch.
    pub fn index(self) -> usize {
        self.0
    }
}

/// An input edge. Cut edges keep the source value for local derivatives but
/// no longer carry tangents or adjoints.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub(crate) source: NodeId,
    pub(crate) live: bool,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) op: Op,
    pub(crate) inputs: Vec<Edge>,
    pub(crate) value: Vec<f64>,
    pub(crate) grad: Option<Vec<f64>>,
}

/// Options for a single forward or backward pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdFlags {
    /// Cut every edge the pass traversed once it completes.
    pub clear_edges: bool,
}

impl AdFlags {
    pub const NONE: AdFlags = AdFlags { clear_edges: false };
    pub const CLEAR_EDGES: AdFlags = AdFlags { clear_edges: true };
}

/// What [`Graph::grad`] returns for a value the graph does not track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GradPolicy {
    /// A zero gradient shaped like the value.
    #[default]
    Zero,
    /// [`Error::UntrackedGradientRequest`].
    Strict,
}

/// Graph-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    pub grad_policy: GradPolicy,
    /// Node count past which a warning is logged once per epoch.
    pub node_warning_threshold: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            grad_policy: GradPolicy::Zero,
            node_warning_threshold: 1 << 20,
        }
    }
}

struct Tape {
    nodes: Vec<Node>,
    epoch: u64,
    config: GraphConfig,
    warned: bool,
}

impl Tape {
    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        if !self.warned && self.nodes.len() > self.config.node_warning_threshold {
            self.warned = true;
            log::warn!(
                "computation graph holds {} nodes; reset it after each optimization step",
                self.nodes.len()
            );
        }
        id
    }

    /// Nodes from which `target` is reachable through live edges (target included).
    fn ancestors(&self, target: NodeId) -> Vec<bool> {
        let mut marked = vec![false; target.0 + 1];
        marked[target.0] = true;
        for i in (0..=target.0).rev() {
            if !marked[i] {
                continue;
            }
            for edge in self.nodes[i].inputs.iter().filter(|e| e.live) {
                marked[edge.source.0] = true;
            }
        }
        marked
    }

    /// JVP of node `i` from whatever tangents its live inputs currently hold.
    fn node_tangent(&self, i: usize, tangents: &[Option<Vec<f64>>]) -> Option<Vec<f64>> {
        let node = &self.nodes[i];
        if node.inputs.is_empty() {
            return None;
        }
        let inputs: Vec<&[f64]> = node
            .inputs
            .iter()
            .map(|e| self.nodes[e.source.0].value.as_slice())
            .collect();
        let input_tangents: Vec<Option<&[f64]>> = node
            .inputs
            .iter()
            .map(|e| {
                if e.live {
                    tangents[e.source.0].as_deref()
                } else {
                    None
                }
            })
            .collect();
        node.op.jvp(&inputs, &node.value, &input_tangents)
    }

    /// Live edges of node `i` whose source holds a tangent.
    fn carrying_edges(&self, i: usize, tangents: &[Option<Vec<f64>>]) -> Vec<(usize, usize)> {
        self.nodes[i]
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, e)| e.live && tangents[e.source.0].is_some())
            .map(|(k, _)| (i, k))
            .collect()
    }

    fn cut(&mut self, edges: &[(usize, usize)]) {
        for &(node, input) in edges {
            self.nodes[node].inputs[input].live = false;
        }
        log::debug!("cut {} traversed edges", edges.len());
    }
}

fn accumulate(slot: &mut Option<Vec<f64>>, contribution: &[f64]) {
    match slot {
        Some(existing) => {
            for (g, c) in existing.iter_mut().zip(contribution) {
                *g += c;
            }
        }
        None => *slot = Some(contribution.to_vec()),
    }
}

/// Handle to a computation graph.
///
/// Single-threaded: a pass runs to completion before anyone reads gradients.
#[derive(Clone)]
pub struct Graph(Rc<RefCell<Tape>>);

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tape = self.0.borrow();
        f.debug_struct("Graph")
            .field("nodes", &tape.nodes.len())
            .field("epoch", &tape.epoch)
            .field("config", &tape.config)
            .finish()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new()
    }
}

impl Graph {
    /// Create an empty graph with the default configuration.
    pub fn new() -> Self {
        Graph::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Graph(Rc::new(RefCell::new(Tape {
            nodes: Vec::new(),
            epoch: 0,
            config,
            warned: false,
        })))
    }

    pub fn config(&self) -> GraphConfig {
        self.0.borrow().config.clone()
    }

    /// Number of nodes recorded since the last reset.
    pub fn len(&self) -> usize {
        self.0.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of input edges that still carry derivatives.
    pub fn live_edge_count(&self) -> usize {
        self.0
            .borrow()
            .nodes
            .iter()
            .flat_map(|n| n.inputs.iter())
            .filter(|e| e.live)
            .count()
    }

    /// Incremented by every [`Graph::reset`].
    pub fn epoch(&self) -> u64 {
        self.0.borrow().epoch
    }

    /// Whether two handles share one arena.
    pub fn ptr_eq(&self, other: &Graph) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn record(&self, op: Op, inputs: Vec<NodeId>, value: Vec<f64>) -> NodeRef {
        let mut tape = self.0.borrow_mut();
        let id = tape.push(Node {
            op,
            inputs: inputs
                .into_iter()
                .map(|source| Edge { source, live: true })
                .collect(),
            value,
            grad: None,
        });
        NodeRef {
            graph: self.clone(),
            id,
            epoch: tape.epoch,
        }
    }

    /// The node of `value` if it belongs to this graph's current epoch.
    pub fn node_of(&self, value: &Value) -> Option<NodeId> {
        value
            .node_ref()
            .filter(|r| r.graph.ptr_eq(self) && r.epoch == self.epoch())
            .map(|r| r.id)
    }

    /// Make `value` a differentiable root with a zeroed gradient slot.
    ///
    /// A value already tracked by this graph keeps its node; only its slot is
    /// allocated if missing.
    pub fn enable_grad(&self, value: &mut Value) -> Result<()> {
        if let Some(r) = value.node_ref() {
            if r.is_live() && !r.graph.ptr_eq(self) {
                return Err(Error::ForeignGraph);
            }
        }
        if let Some(id) = self.node_of(value) {
            let mut tape = self.0.borrow_mut();
            let node = &mut tape.nodes[id.0];
            if node.grad.is_none() {
                node.grad = Some(vec![0.0; node.value.len()]);
            }
            return Ok(());
        }

        let node_ref = {
            let mut tape = self.0.borrow_mut();
            let id = tape.push(Node {
                op: Op::Leaf,
                inputs: Vec::new(),
                value: value.data().to_vec(),
                grad: Some(vec![0.0; value.len()]),
            });
            NodeRef {
                graph: self.clone(),
                id,
                epoch: tape.epoch,
            }
        };
        value.attach(node_ref);
        Ok(())
    }

    /// Gradient slot of `value`, or the policy's answer for untracked values.
    pub fn grad(&self, value: &Value) -> Result<Value> {
        let Some(id) = self.node_of(value) else {
            return match self.0.borrow().config.grad_policy {
                GradPolicy::Zero => Ok(Value::zeros(value.len())),
                GradPolicy::Strict => Err(Error::UntrackedGradientRequest),
            };
        };
        let tape = self.0.borrow();
        let node = &tape.nodes[id.0];
        Ok(Value::from_vec(
            node.grad
                .clone()
                .unwrap_or_else(|| vec![0.0; node.value.len()]),
        ))
    }

    /// Overwrite the gradient slot of a tracked value. A length-1 gradient is
    /// broadcast over the value.
    pub fn set_grad(&self, value: &Value, grad: &Value) -> Result<()> {
        let id = self.node_of(value).ok_or(Error::UntrackedGradientRequest)?;
        let mut tape = self.0.borrow_mut();
        let node = &mut tape.nodes[id.0];
        node.grad = Some(expand(grad.data(), node.value.len(), "set_grad")?);
        Ok(())
    }

    /// Zero every allocated gradient slot.
    pub fn clear_grads(&self) {
        for node in self.0.borrow_mut().nodes.iter_mut() {
            if let Some(grad) = node.grad.as_mut() {
                grad.iter_mut().for_each(|g| *g = 0.0);
            }
        }
    }

    /// Drop every node. Values recorded before the reset read as untracked.
    pub fn reset(&self) {
        let mut tape = self.0.borrow_mut();
        let dropped = tape.nodes.len();
        tape.nodes.clear();
        tape.nodes.shrink_to(1024);
        tape.epoch += 1;
        tape.warned = false;
        log::debug!("graph reset: dropped {dropped} nodes, epoch {}", tape.epoch);
    }

    /// Forward mode from `seed` with a unit tangent.
    pub fn forward(&self, seed: &Value, flags: AdFlags) -> Result<()> {
        self.forward_with(seed, &Value::scalar(1.0), flags)
    }

    /// Forward mode from `seed` along `tangent` (length 1 broadcasts).
    ///
    /// Every node depending on the seed through live edges receives
    /// d(node)/d(seed) · tangent in its gradient slot.
    pub fn forward_with(&self, seed: &Value, tangent: &Value, flags: AdFlags) -> Result<()> {
        let Some(root) = self.node_of(seed) else {
            log::debug!("forward: seed is not tracked, nothing to propagate");
            return Ok(());
        };
        let mut guard = self.0.borrow_mut();
        let tape = &mut *guard;
        let n = tape.nodes.len();
        let seed_tangent = expand(tangent.data(), tape.nodes[root.0].value.len(), "forward seed")?;

        let mut tangents: Vec<Option<Vec<f64>>> = vec![None; n];
        tangents[root.0] = Some(seed_tangent);
        let mut traversed = Vec::new();
        for i in root.0 + 1..n {
            if let Some(t) = tape.node_tangent(i, &tangents) {
                traversed.extend(tape.carrying_edges(i, &tangents));
                tangents[i] = Some(t);
            }
        }

        let mut reached = 0;
        for (node, t) in tape.nodes.iter_mut().zip(&tangents) {
            if let Some(t) = t {
                accumulate(&mut node.grad, t);
                reached += 1;
            }
        }
        log::debug!("forward pass from node {}: reached {reached} nodes", root.0);
        if flags.clear_edges {
            tape.cut(&traversed);
        }
        Ok(())
    }

    /// Push gradients already present on ancestors of `target` forward to it,
    /// returning the target's gradient.
    ///
    /// Slots on the path are updated in place, so a tangent that was already
    /// propagated along an edge that was not cut is counted again.
    pub fn forward_to(&self, target: &Value, flags: AdFlags) -> Result<Value> {
        let Some(target_id) = self.node_of(target) else {
            log::debug!("forward_to: target is not tracked, gradient is zero");
            return Ok(Value::zeros(target.len()));
        };
        let mut guard = self.0.borrow_mut();
        let tape = &mut *guard;
        let on_path = tape.ancestors(target_id);

        let mut tangents: Vec<Option<Vec<f64>>> = vec![None; target_id.0 + 1];
        let mut traversed = Vec::new();
        for i in 0..=target_id.0 {
            if !on_path[i] {
                continue;
            }
            let own = tape.nodes[i].grad.clone();
            let incoming = tape.node_tangent(i, &tangents);
            if incoming.is_some() {
                traversed.extend(tape.carrying_edges(i, &tangents));
            }
            tangents[i] = match (own, incoming) {
                (Some(mut own), Some(incoming)) => {
                    own.iter_mut().zip(&incoming).for_each(|(g, t)| *g += t);
                    Some(own)
                }
                (own, incoming) => own.or(incoming),
            };
        }

        for (i, t) in tangents.iter().enumerate() {
            if let Some(t) = t {
                tape.nodes[i].grad = Some(t.clone());
            }
        }
        let grad = tangents[target_id.0]
            .clone()
            .unwrap_or_else(|| vec![0.0; tape.nodes[target_id.0].value.len()]);
        if flags.clear_edges {
            tape.cut(&traversed);
        }
        Ok(Value::from_vec(grad))
    }

    /// Reverse mode from `output` with a unit adjoint.
    pub fn backward(&self, output: &Value, flags: AdFlags) -> Result<()> {
        self.backward_with(output, &Value::scalar(1.0), flags)
    }

    /// Reverse mode from `output` seeded with `adjoint` (length 1 broadcasts).
    ///
    /// Every node contributing to the output through live edges receives
    /// d(output)/d(node) in its gradient slot.
    pub fn backward_with(&self, output: &Value, adjoint: &Value, flags: AdFlags) -> Result<()> {
        let Some(out) = self.node_of(output) else {
            log::debug!("backward: output is not tracked, nothing to propagate");
            return Ok(());
        };
        let mut guard = self.0.borrow_mut();
        let tape = &mut *guard;
        let seed = expand(adjoint.data(), tape.nodes[out.0].value.len(), "backward seed")?;

        let mut adjoints: Vec<Option<Vec<f64>>> = vec![None; out.0 + 1];
        adjoints[out.0] = Some(seed);
        let mut traversed = Vec::new();
        for i in (0..=out.0).rev() {
            let (lower, upper) = adjoints.split_at_mut(i);
            let Some(adj) = upper[0].as_deref() else {
                continue;
            };
            let node = &tape.nodes[i];
            if !node.inputs.iter().any(|e| e.live) {
                continue;
            }
            let inputs: Vec<&[f64]> = node
                .inputs
                .iter()
                .map(|e| tape.nodes[e.source.0].value.as_slice())
                .collect();
            let grads = node.op.vjp(&inputs, &node.value, adj);
            for (k, (edge, g)) in node.inputs.iter().zip(grads).enumerate() {
                if edge.live {
                    accumulate(&mut lower[edge.source.0], &g);
                    traversed.push((i, k));
                }
            }
        }

        let mut reached = 0;
        for (node, adj) in tape.nodes.iter_mut().zip(adjoints) {
            if let Some(adj) = adj {
                accumulate(&mut node.grad, &adj);
                reached += 1;
            }
        }
        log::debug!("backward pass from node {}: reached {reached} nodes", out.0);
        if flags.clear_edges {
            tape.cut(&traversed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(graph: &Graph, value: f64) -> Value {
        let mut v = Value::scalar(value);
        graph.enable_grad(&mut v).unwrap();
        v
    }

    #[test]
    fn test_creation_order_is_topological() {
        let graph = Graph::new();
        let x = tracked(&graph, 1.0);
        let y = tracked(&graph, 2.0);
        let z = &(&x + &y) * &x;

        let tape = graph.0.borrow();
        for (i, node) in tape.nodes.iter().enumerate() {
            for edge in &node.inputs {
                assert!(edge.source.0 < i);
            }
        }
        assert_eq!(graph.node_of(&z).map(NodeId::index), Some(tape.nodes.len() - 1));
    }

    #[test]
    fn test_untracked_ops_leave_graph_empty() {
        let graph = Graph::new();
        let a = Value::scalar(2.0);
        let b = Value::rgb(1.0, 2.0, 3.0);
        let _ = &a * &b + 1.0;
        assert!(graph.is_empty());
    }

    #[test]
    fn test_enable_grad_is_idempotent() {
        let graph = Graph::new();
        let mut x = Value::scalar(1.0);
        graph.enable_grad(&mut x).unwrap();
        graph.enable_grad(&mut x).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.grad(&x).unwrap().data(), &[0.0]);
    }

    #[test]
    fn test_enable_grad_foreign_graph() {
        let g1 = Graph::new();
        let g2 = Graph::new();
        let mut x = Value::scalar(1.0);
        g1.enable_grad(&mut x).unwrap();
        assert_eq!(g2.enable_grad(&mut x), Err(Error::ForeignGraph));
    }

    #[test]
    fn test_backward_simple_add() {
        let graph = Graph::new();
        let x = tracked(&graph, 2.0);
        let y = tracked(&graph, 3.0);
        let z = &x + &y;

        graph.backward(&z, AdFlags::NONE).unwrap();
        assert_eq!(graph.grad(&x).unwrap().item(), 1.0);
        assert_eq!(graph.grad(&y).unwrap().item(), 1.0);
    }

    #[test]
    fn test_backward_chain() {
        // z = (x + 1)^2, dz/dx = 2(x + 1)
        let graph = Graph::new();
        let x = tracked(&graph, 2.0);
        let z = (&x + 1.0).powf(2.0);

        graph.backward(&z, AdFlags::NONE).unwrap();
        assert!((graph.grad(&x).unwrap().item() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_forward_vector_output() {
        // color = theta * (0.2, 0.5, 0.8)
        let graph = Graph::new();
        let theta = tracked(&graph, 0.5);
        let color = &theta * &Value::rgb(0.2, 0.5, 0.8);

        graph.forward(&theta, AdFlags::NONE).unwrap();
        assert_eq!(graph.grad(&color).unwrap().data(), &[0.2, 0.5, 0.8]);
        assert_eq!(graph.grad(&theta).unwrap().item(), 1.0);
    }

    #[test]
    fn test_forward_with_directional_tangent() {
        let graph = Graph::new();
        let mut v = Value::rgb(1.0, 2.0, 3.0);
        graph.enable_grad(&mut v).unwrap();
        let s = v.sqr().sum();

        graph
            .forward_with(&v, &Value::rgb(1.0, 0.0, -1.0), AdFlags::NONE)
            .unwrap();
        // d/dt sum((v + t*d)^2) = 2 v . d = 2 - 6
        assert!((graph.grad(&s).unwrap().item() + 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_backward_accumulates_without_clearing() {
        let graph = Graph::new();
        let x = tracked(&graph, 3.0);
        let y = &x * 2.0;

        graph.backward(&y, AdFlags::NONE).unwrap();
        graph.backward(&y, AdFlags::NONE).unwrap();
        assert_eq!(graph.grad(&x).unwrap().item(), 4.0);

        graph.clear_grads();
        graph.backward(&y, AdFlags::NONE).unwrap();
        assert_eq!(graph.grad(&x).unwrap().item(), 2.0);
    }

    #[test]
    fn test_clear_edges_stops_reaccumulation() {
        let graph = Graph::new();
        let theta = tracked(&graph, 0.5);
        let color = &theta * &Value::rgb(0.2, 0.5, 0.8);
        let edges_before = graph.live_edge_count();

        graph.forward(&theta, AdFlags::CLEAR_EDGES).unwrap();
        assert!(graph.live_edge_count() < edges_before);

        // A later render consumes `color`; its seeded tangent flows exactly once.
        let image = &color * 2.0;
        let grad = graph.forward_to(&image, AdFlags::NONE).unwrap();
        for (g, c) in grad.data().iter().zip([0.2, 0.5, 0.8]) {
            assert!((g - 2.0 * c).abs() < 1e-12);
        }
    }

    #[test]
    fn test_forward_to_double_counts_uncut_edges() {
        let graph = Graph::new();
        let theta = tracked(&graph, 0.5);
        let color = &theta * 3.0;

        graph.forward(&theta, AdFlags::NONE).unwrap();
        let grad = graph.forward_to(&color, AdFlags::NONE).unwrap();
        assert_eq!(grad.item(), 6.0);
    }

    #[test]
    fn test_backward_clear_edges() {
        let graph = Graph::new();
        let x = tracked(&graph, 1.0);
        let y = &x * 4.0;
        graph.backward(&y, AdFlags::CLEAR_EDGES).unwrap();
        assert_eq!(graph.live_edge_count(), 0);

        graph.backward(&y, AdFlags::NONE).unwrap();
        assert_eq!(graph.grad(&x).unwrap().item(), 4.0);
    }

    #[test]
    fn test_reset_returns_to_baseline() {
        let graph = Graph::new();
        let baseline = graph.len();
        let x = tracked(&graph, 1.0);
        let y = x.exp().sin();
        assert!(graph.len() > baseline);

        graph.reset();
        assert_eq!(graph.len(), baseline);
        assert!(!x.is_tracked());
        assert!(!y.is_tracked());
        assert!(graph.node_of(&y).is_none());

        // stale handles behave as constants
        let z = &y + 1.0;
        assert!(!z.is_tracked());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_strict_policy_rejects_untracked() {
        let graph = Graph::with_config(GraphConfig {
            grad_policy: GradPolicy::Strict,
            ..GraphConfig::default()
        });
        let v = Value::rgb(1.0, 1.0, 1.0);
        assert_eq!(graph.grad(&v), Err(Error::UntrackedGradientRequest));
    }

    #[test]
    fn test_untracked_passes_are_no_ops() {
        let graph = Graph::new();
        let v = Value::scalar(2.0);
        graph.backward(&v, AdFlags::NONE).unwrap();
        graph.forward(&v, AdFlags::NONE).unwrap();
        assert_eq!(graph.forward_to(&v, AdFlags::NONE).unwrap().item(), 0.0);
    }

    #[test]
    fn test_seed_shape_mismatch() {
        let graph = Graph::new();
        let mut v = Value::rgb(1.0, 2.0, 3.0);
        graph.enable_grad(&mut v).unwrap();
        let err = graph
            .forward_with(&v, &Value::from_vec(vec![1.0, 2.0]), AdFlags::NONE)
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 3, found: 2, .. }));
    }

    #[test]
    fn test_set_grad_broadcasts() {
        let graph = Graph::new();
        let mut v = Value::rgb(1.0, 2.0, 3.0);
        graph.enable_grad(&mut v).unwrap();
        graph.set_grad(&v, &Value::scalar(0.5)).unwrap();
        assert_eq!(graph.grad(&v).unwrap().data(), &[0.5, 0.5, 0.5]);
    }
}
