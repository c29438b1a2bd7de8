mod common;

use lacuna_core::consts::PRIORITY_MIN;
use lacuna_core::energy::container::EnergyCalculatorContainer;
use lacuna_core::label::LabelSet;
use lacuna_core::mask::{MaskLod, MaskValue};
use lacuna_core::node::{NeighborEdge, NodeContext, NodeSet};
use lacuna_core::image::RgbImage;
use lacuna_core::settings::Settings;

struct Fixture {
    settings: Settings,
    image: RgbImage,
    mask: MaskLod,
    labels: LabelSet,
}

impl Fixture {
    fn new(seed: u64) -> Self {
        let settings = Settings::for_image(100, 100);
        let image = common::noise_image(100, 100, seed);
        let mask = common::hole_mask(100, 100, 35, 35, 30, 30);
        let labels = LabelSet::new(&settings, 100, 100, &mask);
        Self {
            settings,
            image,
            mask,
            labels,
        }
    }

    fn nodes(&self) -> NodeSet {
        NodeSet::new(&self.settings, 100, 100, &self.mask)
    }

    fn context<'a>(&'a self, energy: &'a mut EnergyCalculatorContainer) -> NodeContext<'a> {
        NodeContext {
            energy,
            labels: &self.labels,
            image: &self.image,
            mask: &self.mask,
            settings: &self.settings,
        }
    }
}

fn find_node(nodes: &NodeSet, x: i32, y: i32) -> usize {
    (0..nodes.len())
        .find(|&i| nodes.node(i).x() == x && nodes.node(i).y() == y)
        .unwrap_or_else(|| panic!("no node at ({x}, {y})"))
}

#[test]
fn test_lattice_covers_the_unknown_region() {
    let fixture = Fixture::new(1);
    let nodes = fixture.nodes();
    assert!(!nodes.is_empty());

    // Every node's patch neighborhood touches unknown cells, and neighbors
    // sit exactly one lattice gap apart.
    for i in 0..nodes.len() {
        let node = nodes.node(i);
        assert!(fixture.mask.region_has_any(
            node.left(&fixture.settings),
            node.top(&fixture.settings),
            fixture.settings.patch_width,
            fixture.settings.patch_height,
            MaskValue::Unknown
        ));

        for edge in NeighborEdge::ALL {
            if let Some(neighbor) = node.neighbor(edge) {
                let (dx, dy) = edge.direction();
                let other = nodes.node(neighbor);
                assert_eq!(other.x() - node.x(), dx * fixture.settings.lattice_gap_x);
                assert_eq!(other.y() - node.y(), dy * fixture.settings.lattice_gap_y);
            }
        }
    }
}

#[test]
fn test_interior_node_does_not_overlap_known() {
    let fixture = Fixture::new(2);
    let nodes = fixture.nodes();

    // Patch rectangle (44,44)..(52,52) sits fully inside the 35..65 hole.
    let interior = find_node(&nodes, 48, 48);
    assert!(!nodes.node(interior).overlaps_known_region());

    // Patch rectangle (32,32)..(40,40) straddles the hole boundary.
    let border = find_node(&nodes, 36, 36);
    assert!(nodes.node(border).overlaps_known_region());
}

#[test]
fn test_border_node_outranks_interior_node() {
    let fixture = Fixture::new(3);
    let nodes = fixture.nodes();
    let mut energy = EnergyCalculatorContainer::new();
    let mut ctx = fixture.context(&mut energy);

    let interior = find_node(&nodes, 48, 48);
    let border = find_node(&nodes, 36, 36);

    let interior_priority = nodes.calculate_priority(interior, &mut ctx);
    let border_priority = nodes.calculate_priority(border, &mut ctx);

    assert!(border_priority > interior_priority);
    assert!(interior_priority > PRIORITY_MIN);
}

#[test]
fn test_pruning_respects_bounds() {
    let fixture = Fixture::new(4);
    let mut nodes = fixture.nodes();
    let mut energy = EnergyCalculatorContainer::new();
    let mut ctx = fixture.context(&mut energy);

    let index = find_node(&nodes, 36, 36);
    assert!(fixture.labels.len() > fixture.settings.post_prune_labels_min);

    nodes.prune_labels(index, &mut ctx);
    let kept = nodes.node(index).label_info().len();
    assert!(kept >= fixture.settings.post_prune_labels_min);
    assert!(kept <= fixture.settings.post_prune_labels_max);

    // Re-pruning the already pruned set stays within bounds.
    nodes.prune_labels(index, &mut ctx);
    let kept = nodes.node(index).label_info().len();
    assert!(kept >= fixture.settings.post_prune_labels_min);
    assert!(kept <= fixture.settings.post_prune_labels_max);
}

#[test]
fn test_messages_are_normalized_to_zero_minimum() {
    let fixture = Fixture::new(5);
    let mut nodes = fixture.nodes();
    let mut energy = EnergyCalculatorContainer::new();
    let mut ctx = fixture.context(&mut energy);

    // Two horizontally adjacent nodes inside the unknown region.
    let p = find_node(&nodes, 40, 40);
    let q = find_node(&nodes, 44, 40);
    assert_eq!(nodes.node(p).neighbor(NeighborEdge::Right), Some(q));

    nodes.prune_labels(p, &mut ctx);
    nodes.send_messages(p, q, &mut ctx);

    // p is q's left neighbor, so its messages land on that edge.
    let edge = NeighborEdge::Left as usize;
    let messages: Vec<i64> = nodes
        .node(q)
        .label_info()
        .iter()
        .map(|info| info.messages[edge])
        .collect();

    assert!(!messages.is_empty());
    assert!(messages.iter().all(|&m| m >= 0));
    assert_eq!(messages.iter().copied().min(), Some(0));
}
