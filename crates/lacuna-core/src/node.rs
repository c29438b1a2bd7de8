use crate::consts::{ENERGY_MAX, ENERGY_MIN, PRIORITY_MIN};
use crate::energy::container::{EnergyCalculatorContainer, QueuedEnergyBatch};
use crate::energy::{BatchParams, Belief, Energy, EnergyContext, Priority};
use crate::image::RgbImage;
use crate::label::{Label, LabelSet};
use crate::mask::{MaskLod, MaskValue};
use crate::settings::Settings;

pub const NUM_NEIGHBOR_EDGES: usize = 4;

/// The four lattice directions a node can have a neighbor in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborEdge {
    Left = 0,
    Up = 1,
    Right = 2,
    Down = 3,
}

impl NeighborEdge {
    pub const ALL: [NeighborEdge; NUM_NEIGHBOR_EDGES] = [
        NeighborEdge::Left,
        NeighborEdge::Up,
        NeighborEdge::Right,
        NeighborEdge::Down,
    ];

    pub fn direction(self) -> (i32, i32) {
        match self {
            NeighborEdge::Left => (-1, 0),
            NeighborEdge::Up => (0, -1),
            NeighborEdge::Right => (1, 0),
            NeighborEdge::Down => (0, 1),
        }
    }
}

/// One candidate label at a node, with the inbound message from each edge.
#[derive(Clone, Debug)]
pub struct LabelInfo {
    pub label: Label,
    pub messages: [Energy; NUM_NEIGHBOR_EDGES],
}

/// An MRF vertex at a lattice point whose patch neighborhood touches the
/// unknown region.
pub struct Node {
    /// Lattice coordinates per pyramid depth; last entry is current.
    resolutions: Vec<(i32, i32)>,
    overlaps_known_region: bool,
    has_pruned_once: bool,
    neighbors: [Option<usize>; NUM_NEIGHBOR_EDGES],
    /// Empty until the first pruning populates it from the global label set.
    label_info: Vec<LabelInfo>,
}

impl Node {
    fn new(settings: &Settings, mask: &MaskLod, x: i32, y: i32) -> Self {
        let mut node = Self {
            resolutions: vec![(x, y)],
            overlaps_known_region: false,
            has_pruned_once: false,
            neighbors: [None; NUM_NEIGHBOR_EDGES],
            label_info: Vec::new(),
        };

        // Clip the patch rectangle to the mask extent before asking; cells
        // outside the image are not usable source data for this node.
        let left = node.left(settings).max(0);
        let top = node.top(settings).max(0);
        let right = (node.left(settings) + settings.patch_width).min(mask.width() as i32);
        let bottom = (node.top(settings) + settings.patch_height).min(mask.height() as i32);
        if right > left && bottom > top {
            node.overlaps_known_region =
                mask.region_has_any(left, top, right - left, bottom - top, MaskValue::Known);
        }

        node
    }

    pub fn x(&self) -> i32 {
        self.resolutions.last().expect("node has a resolution").0
    }

    pub fn y(&self) -> i32 {
        self.resolutions.last().expect("node has a resolution").1
    }

    /// Left edge of this node's patch rectangle.
    pub fn left(&self, settings: &Settings) -> i32 {
        self.x() - settings.patch_width / 2
    }

    /// Top edge of this node's patch rectangle.
    pub fn top(&self, settings: &Settings) -> i32 {
        self.y() - settings.patch_height / 2
    }

    pub fn overlaps_known_region(&self) -> bool {
        self.overlaps_known_region
    }

    pub fn has_pruned_once(&self) -> bool {
        self.has_pruned_once
    }

    pub fn neighbor(&self, edge: NeighborEdge) -> Option<usize> {
        self.neighbors[edge as usize]
    }

    /// Which of this node's edges points at `index`.
    fn edge_of(&self, index: usize) -> Option<NeighborEdge> {
        NeighborEdge::ALL
            .into_iter()
            .find(|&edge| self.neighbors[edge as usize] == Some(index))
    }

    pub fn label_info(&self) -> &[LabelInfo] {
        &self.label_info
    }

    /// Before the first pruning a node implicitly holds every global label
    /// with zeroed messages; materialize that when messages must be stored.
    fn populate_label_info_if_needed(&mut self, labels: &LabelSet) {
        if self.label_info.is_empty() {
            self.label_info = (0..labels.len())
                .map(|i| LabelInfo {
                    label: labels.get(i),
                    messages: [ENERGY_MIN; NUM_NEIGHBOR_EDGES],
                })
                .collect();
        }
    }

    fn scale_down(&mut self) {
        // Nothing populates label info until priority-bp runs at the
        // coarsest resolution, after all scale-downs.
        debug_assert!(self.label_info.is_empty());
        let (x, y) = *self.resolutions.last().expect("node has a resolution");
        self.resolutions.push((x / 2, y / 2));
    }

    /// Pop back to the finer resolution, exploding each kept coarse label
    /// into its valid children there. Children inherit the coarse label's
    /// messages. The label set must already be at the finer resolution.
    fn scale_up(&mut self, labels: &LabelSet) {
        debug_assert!(self.resolutions.len() > 1);
        self.resolutions.pop();

        let mut expanded = Vec::with_capacity(self.label_info.len() * 4);
        for info in &self.label_info {
            for label in labels.expand_low_to_current(info.label) {
                expanded.push(LabelInfo {
                    label,
                    messages: info.messages,
                });
            }
        }
        self.label_info = expanded;
    }
}

/// A node's current candidates: its own pruned set, or the whole global
/// label set (with zero messages) before first pruning.
enum NodeLabels<'a> {
    Global(&'a LabelSet),
    Own(&'a [LabelInfo]),
}

impl NodeLabels<'_> {
    fn len(&self) -> usize {
        match self {
            NodeLabels::Global(labels) => labels.len(),
            NodeLabels::Own(infos) => infos.len(),
        }
    }

    fn label(&self, i: usize) -> Label {
        match self {
            NodeLabels::Global(labels) => labels.get(i),
            NodeLabels::Own(infos) => infos[i].label,
        }
    }

    fn messages(&self, i: usize) -> [Energy; NUM_NEIGHBOR_EDGES] {
        match self {
            NodeLabels::Global(_) => [ENERGY_MIN; NUM_NEIGHBOR_EDGES],
            NodeLabels::Own(infos) => infos[i].messages,
        }
    }
}

/// Everything node operations read besides the nodes themselves.
pub struct NodeContext<'a> {
    pub energy: &'a mut EnergyCalculatorContainer,
    pub labels: &'a LabelSet,
    pub image: &'a RgbImage,
    pub mask: &'a MaskLod,
    pub settings: &'a Settings,
}

/// A queued batch of this-node-versus-image energies. A node whose patch
/// rectangle holds no known pixels short-circuits to zero energy; the
/// masked SSD would mask away every contribution anyway.
struct NodeEnergyBatch<'a> {
    batch: Option<QueuedEnergyBatch<'a>>,
}

impl<'a> NodeEnergyBatch<'a> {
    fn open(
        node: &Node,
        params: BatchParams,
        energy: &'a mut EnergyCalculatorContainer,
        ctx: EnergyContext<'a>,
    ) -> Self {
        let batch = node
            .overlaps_known_region()
            .then(|| energy.open_queued(params, ctx));
        Self { batch }
    }

    fn queue(&mut self, b_left: i32, b_top: i32) {
        if let Some(batch) = self.batch.as_mut() {
            batch.queue(b_left, b_top);
        }
    }

    fn process(&mut self) {
        if let Some(batch) = self.batch.as_mut() {
            batch.process();
        }
    }

    fn result(&self, handle: usize) -> Energy {
        match &self.batch {
            Some(batch) => batch.result(handle),
            None => ENERGY_MIN,
        }
    }
}

struct NodeInfo {
    priority: Priority,
    committed: bool,
}

/// The MRF lattice. Owns contiguous node storage; neighbors are indices
/// into it, which keeps the cyclic graph traversable in both pass orders
/// without back-references.
pub struct NodeSet {
    nodes: Vec<Node>,
    info: Vec<NodeInfo>,
    depth: usize,
}

impl NodeSet {
    /// Lay a lattice over the image, padded by one gap on every side, and
    /// keep a node wherever the patch neighborhood touches unknown cells.
    pub fn new(settings: &Settings, image_width: usize, image_height: usize, mask: &MaskLod) -> Self {
        let gap_x = settings.lattice_gap_x;
        let gap_y = settings.lattice_gap_y;
        let patch_w = settings.patch_width;
        let patch_h = settings.patch_height;

        let left_most = -gap_x;
        let top_most = -gap_y;
        let num_cols = ((image_width as i32 + 2 * gap_x) / gap_x) as usize;
        let num_rows = ((image_height as i32 + 2 * gap_y) / gap_y) as usize;

        let mut nodes = Vec::new();
        let mut point_indices = vec![usize::MAX; num_cols * num_rows];

        for row in 0..num_rows {
            let y = top_most + row as i32 * gap_y;
            for col in 0..num_cols {
                let x = left_most + col as i32 * gap_x;
                let has_unknown = mask.region_has_any(
                    x - patch_w / 2,
                    y - patch_h / 2,
                    patch_w,
                    patch_h,
                    MaskValue::Unknown,
                );
                if has_unknown {
                    point_indices[row * num_cols + col] = nodes.len();
                    nodes.push(Node::new(settings, mask, x, y));
                }
            }
        }

        // Connect orthogonal neighbors through the lattice grid.
        for row in 0..num_rows {
            for col in 0..num_cols {
                let index = point_indices[row * num_cols + col];
                if index == usize::MAX {
                    continue;
                }
                for edge in NeighborEdge::ALL {
                    let (dx, dy) = edge.direction();
                    let ncol = col as i32 + dx;
                    let nrow = row as i32 + dy;
                    if ncol < 0 || nrow < 0 || ncol >= num_cols as i32 || nrow >= num_rows as i32 {
                        continue;
                    }
                    let neighbor = point_indices[nrow as usize * num_cols + ncol as usize];
                    if neighbor != usize::MAX {
                        nodes[index].neighbors[edge as usize] = Some(neighbor);
                    }
                }
            }
        }

        tracing::debug!(nodes = nodes.len(), "built MRF lattice");

        let info = nodes
            .iter()
            .map(|_| NodeInfo {
                priority: PRIORITY_MIN,
                committed: false,
            })
            .collect();

        Self {
            nodes,
            info,
            depth: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn priority(&self, index: usize) -> Priority {
        self.info[index].priority
    }

    pub fn is_committed(&self, index: usize) -> bool {
        self.info[index].committed
    }

    pub fn set_committed(&mut self, index: usize, committed: bool) {
        self.info[index].committed = committed;
    }

    /// The uncommitted node with the highest priority, if any stands out
    /// above the floor.
    pub fn highest_priority_uncommitted(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut best_priority = PRIORITY_MIN;
        for (i, info) in self.info.iter().enumerate() {
            if !info.committed && info.priority > best_priority {
                best = Some(i);
                best_priority = info.priority;
            }
        }
        best
    }

    pub fn update_priority(&mut self, index: usize, ctx: &mut NodeContext) {
        self.info[index].priority = self.calculate_priority(index, ctx);
    }

    /// `1 / |confusion set|`: the count of candidates whose belief is within
    /// the confidence threshold of the best. Fewer viable candidates means a
    /// more decided node, which should commit earlier.
    pub fn calculate_priority(&self, index: usize, ctx: &mut NodeContext) -> Priority {
        let node = &self.nodes[index];
        let labels = node_labels(node, ctx.labels);
        let n = labels.len();
        if n == 0 {
            return PRIORITY_MIN;
        }

        let beliefs = self.node_beliefs(node, &labels, ctx);
        let belief_max = beliefs.iter().copied().max().unwrap_or(ENERGY_MIN);

        let confusion = beliefs
            .iter()
            .filter(|&&b| b - belief_max > ctx.settings.confidence_belief_threshold)
            .count();

        if confusion > 0 {
            1.0 / confusion as Priority
        } else {
            PRIORITY_MIN
        }
    }

    /// Belief of every current candidate: negated patch-versus-image energy
    /// minus the inbound messages.
    fn node_beliefs(&self, node: &Node, labels: &NodeLabels, ctx: &mut NodeContext) -> Vec<Belief> {
        let n = labels.len();
        let settings = ctx.settings;
        let params = BatchParams::new(
            n,
            settings.patch_width,
            settings.patch_height,
            node.left(settings),
            node.top(settings),
            true,
        );
        let ectx = EnergyContext {
            image: ctx.image,
            mask: ctx.mask,
            settings,
        };

        let mut batch = NodeEnergyBatch::open(node, params, &mut *ctx.energy, ectx);
        for i in 0..n {
            let label = labels.label(i);
            batch.queue(label.left, label.top);
        }
        batch.process();

        (0..n)
            .map(|i| {
                let mut belief = -batch.result(i);
                for message in labels.messages(i) {
                    belief -= message;
                }
                belief
            })
            .collect()
    }

    /// Compute and normalize the messages from node `p` to neighbor `q`,
    /// replacing `q`'s stored inbound edge from `p`.
    ///
    /// For each candidate label `q_i` of the neighbor, the message is the
    /// minimum over this node's candidates `p_i` of: `p_i`'s patch energy,
    /// plus the SSD over the two patches' overlapping rectangle, plus the
    /// messages into `p_i` from every edge except the one toward `q`.
    pub fn send_messages(&mut self, p: usize, q: usize, ctx: &mut NodeContext) {
        let (p_node, q_node) = pair_mut(&mut self.nodes, p, q);

        // This node must already have been pruned down to its own set.
        debug_assert!(!p_node.label_info.is_empty());
        debug_assert!(p_node.label_info.len() <= ctx.settings.post_prune_labels_max);

        q_node.populate_label_info_if_needed(ctx.labels);

        let p_edge_in_q = q_node.edge_of(p).expect("p is a neighbor of q");
        let q_edge_in_p = p_node.edge_of(q).expect("q is a neighbor of p");

        let settings = ctx.settings;
        let patch_w = settings.patch_width;
        let patch_h = settings.patch_height;

        let p_left = p_node.left(settings);
        let p_top = p_node.top(settings);
        let q_left = q_node.left(settings);
        let q_top = q_node.top(settings);

        // Overlapping rectangle of the two patch neighborhoods, expressed as
        // offsets from each node's patch origin.
        let overlap_left = p_left.max(q_left);
        let overlap_top = p_top.max(q_top);
        let overlap_right = (p_left + patch_w - 1).min(q_left + patch_w - 1);
        let overlap_bottom = (p_top + patch_h - 1).min(q_top + patch_h - 1);
        let overlap_w = overlap_right - overlap_left + 1;
        let overlap_h = overlap_bottom - overlap_top + 1;
        let p_overlap_left_offset = overlap_left - p_left;
        let p_overlap_top_offset = overlap_top - p_top;
        let q_overlap_left_offset = overlap_left - q_left;
        let q_overlap_top_offset = overlap_top - q_top;

        // This node's label energies against the image at its own rectangle.
        let p_n = p_node.label_info.len();
        let p_label_energies: Vec<Energy> = {
            let params = BatchParams::new(
                p_n,
                patch_w,
                patch_h,
                p_left,
                p_top,
                true,
            );
            let ectx = EnergyContext {
                image: ctx.image,
                mask: ctx.mask,
                settings,
            };
            let mut batch = NodeEnergyBatch::open(p_node, params, &mut *ctx.energy, ectx);
            for info in &p_node.label_info {
                batch.queue(info.label.left, info.label.top);
            }
            batch.process();
            (0..p_n).map(|i| batch.result(i)).collect()
        };

        // The natural loop order is per-q-label, min over p-labels; it is
        // swapped here so each p label's overlap energies form one batch.
        let q_n = q_node.label_info.len();
        let mut messages = vec![ENERGY_MAX; q_n];
        let mut messages_min = ENERGY_MAX;

        for (pi, p_info) in p_node.label_info.iter().enumerate() {
            let p_overlap_left = p_info.label.left + p_overlap_left_offset;
            let p_overlap_top = p_info.label.top + p_overlap_top_offset;

            let params = BatchParams::new(
                q_n,
                overlap_w,
                overlap_h,
                p_overlap_left,
                p_overlap_top,
                false,
            );
            let ectx = EnergyContext {
                image: ctx.image,
                mask: ctx.mask,
                settings,
            };
            let mut batch = ctx.energy.open_queued(params, ectx);
            for q_info in &q_node.label_info {
                batch.queue(
                    q_info.label.left + q_overlap_left_offset,
                    q_info.label.top + q_overlap_top_offset,
                );
            }
            batch.process();

            let mut messages_from_p = p_label_energies[pi];
            for (edge, message) in p_info.messages.iter().enumerate() {
                if edge != q_edge_in_p as usize {
                    messages_from_p += message;
                }
            }

            for qi in 0..q_n {
                let candidate = messages_from_p + batch.result(qi);
                if candidate < messages[qi] {
                    messages[qi] = candidate;
                    if candidate < messages_min {
                        messages_min = candidate;
                    }
                }
            }
        }

        // Normalize so the smallest message is zero, then store.
        for (qi, message) in messages.into_iter().enumerate() {
            debug_assert!(message >= ENERGY_MIN && message < ENERGY_MAX);
            q_node.label_info[qi].messages[p_edge_in_q as usize] = message - messages_min;
        }
    }

    /// Sort candidates by descending belief and keep the best, stopping at
    /// the post-prune maximum or when belief falls below the prune
    /// threshold (the minimum count is kept regardless). On the first
    /// pruning only, a candidate too close in energy to one already kept is
    /// discarded as redundant.
    pub fn prune_labels(&mut self, index: usize, ctx: &mut NodeContext) {
        let node = &self.nodes[index];
        let labels = node_labels(node, ctx.labels);
        let n = labels.len();

        let beliefs = self.node_beliefs(node, &labels, ctx);
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(beliefs[i]));

        let settings = ctx.settings;
        let has_pruned_once = node.has_pruned_once;
        let mut kept: Vec<LabelInfo> = Vec::with_capacity(settings.post_prune_labels_max.min(n));

        for &label_index in &order {
            if kept.len() >= settings.post_prune_labels_max {
                break;
            }

            let keep_by_belief = kept.len() < settings.post_prune_labels_min
                || beliefs[label_index] > settings.prune_belief_threshold;
            if !keep_by_belief {
                continue;
            }

            let label = labels.label(label_index);

            // Labels that survived an earlier pruning already passed the
            // similarity filter; only first-time pruning re-checks it.
            let similar_to_kept = if has_pruned_once || kept.is_empty() {
                false
            } else {
                let params = BatchParams::new(
                    kept.len(),
                    settings.patch_width,
                    settings.patch_height,
                    label.left,
                    label.top,
                    false,
                );
                let ectx = EnergyContext {
                    image: ctx.image,
                    mask: ctx.mask,
                    settings,
                };
                let batch = ctx.energy.open_immediate(params, ectx);
                kept.iter().any(|kept_info| {
                    batch.calculate(kept_info.label.left, kept_info.label.top)
                        < settings.prune_energy_similar_threshold
                })
            };

            if !similar_to_kept {
                kept.push(LabelInfo {
                    label,
                    messages: labels.messages(label_index),
                });
            }
        }

        let node = &mut self.nodes[index];
        node.label_info = kept;
        node.has_pruned_once = true;
    }

    pub fn scale_down(&mut self) {
        self.depth += 1;
        for node in &mut self.nodes {
            node.scale_down();
        }
    }

    /// The label set must already be back at the finer resolution.
    pub fn scale_up(&mut self, labels: &LabelSet) {
        debug_assert!(self.depth > 0);
        self.depth -= 1;
        for node in &mut self.nodes {
            node.scale_up(labels);
        }
    }
}

fn node_labels<'a>(node: &'a Node, labels: &'a LabelSet) -> NodeLabels<'a> {
    if node.label_info.is_empty() {
        NodeLabels::Global(labels)
    } else {
        NodeLabels::Own(node.label_info())
    }
}

/// Disjoint borrows of two nodes; the first is read, the second written.
fn pair_mut(nodes: &mut [Node], p: usize, q: usize) -> (&mut Node, &mut Node) {
    debug_assert!(p != q);
    if p < q {
        let (left, right) = nodes.split_at_mut(q);
        (&mut left[p], &mut right[0])
    } else {
        let (left, right) = nodes.split_at_mut(p);
        let q_node = &mut left[q];
        (&mut right[0], q_node)
    }
}
