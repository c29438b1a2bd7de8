//! Priority-BP scheduling:
//!
//! ```text
//! assign priorities to nodes and declare them uncommitted
//! for k = 1 to K:
//!     forward pass, then backward pass
//! assign to each node the label that maximizes its belief
//!
//! forward pass:
//!     for time = 1 to N:
//!         p = uncommitted node of highest priority
//!         prune p's labels
//!         forward_order[time] = p; commit p
//!         for each uncommitted neighbor q of p:
//!             send messages p -> q, update q's beliefs and priority
//!
//! backward pass:
//!     for time = N to 1:
//!         p = forward_order[time]; uncommit p
//!         for each committed neighbor q of p:
//!             send messages p -> q, update q's beliefs and priority
//! ```

use crate::error::{LacunaError, Result};
use crate::node::{NeighborEdge, NodeContext, NodeSet};
use crate::patches::Patch;

enum ProcessNeighbors {
    Uncommitted,
    Committed,
}

pub struct PriorityBpRunner {
    forward_order: Vec<usize>,
}

impl PriorityBpRunner {
    pub fn new() -> Self {
        Self {
            forward_order: Vec::new(),
        }
    }

    /// Run the configured number of forward/backward iterations.
    pub fn run(&mut self, nodes: &mut NodeSet, ctx: &mut NodeContext) -> Result<()> {
        // Assign initial priorities and declare every node uncommitted.
        for i in 0..nodes.len() {
            nodes.update_priority(i, ctx);
            nodes.set_committed(i, false);
        }

        let iterations = ctx.settings.num_iterations;
        for iteration in 0..iterations {
            tracing::debug!(iteration, nodes = nodes.len(), "priority-bp iteration");
            self.forward_pass(nodes, ctx)?;
            self.backward_pass(nodes, ctx);
        }

        Ok(())
    }

    /// Run, then read off each node's best label as a solved patch. Patches
    /// come back sorted by ascending priority so compositing lays confident
    /// patches atop less confident ones.
    pub fn run_and_get_patches(
        &mut self,
        nodes: &mut NodeSet,
        ctx: &mut NodeContext,
    ) -> Result<Vec<Patch>> {
        self.run(nodes, ctx)?;
        self.populate_patches(nodes, ctx)
    }

    fn forward_pass(&mut self, nodes: &mut NodeSet, ctx: &mut NodeContext) -> Result<()> {
        self.forward_order.clear();

        for _ in 0..nodes.len() {
            let index = nodes.highest_priority_uncommitted().ok_or_else(|| {
                LacunaError::Compute("no uncommitted node left mid-pass".into())
            })?;

            nodes.prune_labels(index, ctx);
            self.forward_order.push(index);
            nodes.set_committed(index, true);

            self.process_neighbors(nodes, ctx, index, ProcessNeighbors::Uncommitted);
        }

        Ok(())
    }

    fn backward_pass(&mut self, nodes: &mut NodeSet, ctx: &mut NodeContext) {
        for i in (0..self.forward_order.len()).rev() {
            let index = self.forward_order[i];
            nodes.set_committed(index, false);
            self.process_neighbors(nodes, ctx, index, ProcessNeighbors::Committed);
        }
    }

    fn process_neighbors(
        &self,
        nodes: &mut NodeSet,
        ctx: &mut NodeContext,
        index: usize,
        which: ProcessNeighbors,
    ) {
        for edge in NeighborEdge::ALL {
            let Some(neighbor) = nodes.node(index).neighbor(edge) else {
                continue;
            };
            let wanted = matches!(which, ProcessNeighbors::Committed);
            if nodes.is_committed(neighbor) == wanted {
                nodes.send_messages(index, neighbor, ctx);
                nodes.update_priority(neighbor, ctx);
            }
        }
    }

    /// After pruning, each node's label list is sorted by descending
    /// belief, so its solution is the label at index 0.
    fn populate_patches(&self, nodes: &NodeSet, ctx: &NodeContext) -> Result<Vec<Patch>> {
        let mut patches = Vec::with_capacity(self.forward_order.len());

        for &index in &self.forward_order {
            let node = nodes.node(index);
            let info = node.label_info().first().ok_or_else(|| {
                LacunaError::Compute("node has no labels after pruning".into())
            })?;

            patches.push(Patch {
                src_left: info.label.left,
                src_top: info.label.top,
                dest_left: node.left(ctx.settings),
                dest_top: node.top(ctx.settings),
                priority: nodes.priority(index),
            });
        }

        patches.sort_by(|a, b| {
            a.priority
                .partial_cmp(&b.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(patches)
    }
}

impl Default for PriorityBpRunner {
    fn default() -> Self {
        Self::new()
    }
}
