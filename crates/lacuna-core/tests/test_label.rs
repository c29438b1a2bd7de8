mod common;

use lacuna_core::label::LabelSet;
use lacuna_core::mask::MaskValue;
use lacuna_core::scale::Scalable;
use lacuna_core::settings::Settings;

#[test]
fn test_every_label_window_is_fully_known() {
    let settings = Settings::for_image(40, 40);
    let mask = common::hole_mask(40, 40, 12, 12, 8, 8);
    let labels = LabelSet::new(&settings, 40, 40, &mask);

    assert!(!labels.is_empty());
    for i in 0..labels.len() {
        let label = labels.get(i);
        assert!(mask.region_has_all(
            label.left,
            label.top,
            settings.patch_width,
            settings.patch_height,
            MaskValue::Known
        ));
    }
}

#[test]
fn test_labels_exclude_windows_touching_the_hole() {
    let settings = Settings::for_image(40, 40);
    let mask = common::hole_mask(40, 40, 12, 12, 8, 8);
    let labels = LabelSet::new(&settings, 40, 40, &mask);

    for i in 0..labels.len() {
        let label = labels.get(i);
        let intersects = label.left < 20
            && label.left + settings.patch_width > 12
            && label.top < 20
            && label.top + settings.patch_height > 12;
        assert!(!intersects, "label at ({}, {}) overlaps the hole", label.left, label.top);
    }
}

#[test]
fn test_coarse_label_set_when_any_child_was_set() {
    let settings = Settings::for_image(40, 40);
    let mask = common::hole_mask(40, 40, 16, 16, 8, 8);
    let mut labels = LabelSet::new(&settings, 40, 40, &mask);

    let fine: Vec<(i32, i32)> = (0..labels.len())
        .map(|i| (labels.get(i).left, labels.get(i).top))
        .collect();

    labels.scale_down();
    assert_eq!(labels.depth(), 1);

    // Every fine label's quad must be present at the coarse level.
    for &(x, y) in &fine {
        let found = (0..labels.len())
            .any(|i| labels.get(i).left == x / 2 && labels.get(i).top == y / 2);
        assert!(found, "fine label ({x}, {y}) lost its coarse quad");
    }
}

#[test]
fn test_expansion_returns_only_valid_children() {
    let settings = Settings::for_image(40, 40);
    let mask = common::hole_mask(40, 40, 16, 16, 8, 8);
    let mut labels = LabelSet::new(&settings, 40, 40, &mask);

    let fine: Vec<(i32, i32)> = (0..labels.len())
        .map(|i| (labels.get(i).left, labels.get(i).top))
        .collect();

    labels.scale_down();
    let coarse: Vec<_> = (0..labels.len()).map(|i| labels.get(i)).collect();
    labels.scale_up();

    let mut expanded_total = 0;
    for low in coarse {
        let children = labels.expand_low_to_current(low);
        for child in &children {
            assert!(fine.contains(&(child.left, child.top)));
            assert_eq!(child.left / 2, low.left);
            assert_eq!(child.top / 2, low.top);
        }
        expanded_total += children.len();
    }

    // Every fine label is some coarse label's child.
    assert_eq!(expanded_total, fine.len());
}

#[test]
fn test_odd_edge_folds_into_neighbor_quad() {
    // 41 wide: the last 3-column strip folds into the quad at x = 38.
    let settings = Settings::for_image(41, 40);
    let mask = common::hole_mask(41, 40, 16, 16, 8, 8);
    let mut labels = LabelSet::new(&settings, 41, 40, &mask);

    let has_fine_label_at_39 = (0..labels.len()).any(|i| labels.get(i).left >= 39);

    labels.scale_down();
    let coarse: Vec<_> = (0..labels.len()).map(|i| labels.get(i)).collect();
    labels.scale_up();

    if has_fine_label_at_39 {
        let edge_quad = coarse
            .iter()
            .find(|l| l.left == 19)
            .expect("edge labels fold into the quad at coarse x = 19");
        let children = labels.expand_low_to_current(*edge_quad);
        assert!(children.iter().any(|c| c.left >= 38));
    }
}
