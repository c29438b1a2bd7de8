mod common;

use ndarray::Array2;

use lacuna_core::mask::{MaskLod, MaskPyramid, MaskValue};
use lacuna_core::scale::Scalable;

#[test]
fn test_byte_decoding() {
    assert_eq!(MaskValue::from_byte(0), MaskValue::Unknown);
    assert_eq!(MaskValue::from_byte(128), MaskValue::Ignored);
    assert_eq!(MaskValue::from_byte(255), MaskValue::Known);

    // Ties resolve toward the lower intensity.
    assert_eq!(MaskValue::from_byte(64), MaskValue::Unknown);
    assert_eq!(MaskValue::from_byte(65), MaskValue::Ignored);
    assert_eq!(MaskValue::from_byte(191), MaskValue::Ignored);
    assert_eq!(MaskValue::from_byte(192), MaskValue::Known);
}

#[test]
fn test_out_of_bounds_reads_known() {
    let mask = common::hole_mask(16, 16, 4, 4, 8, 8);
    assert_eq!(mask.value(-1, 0), MaskValue::Known);
    assert_eq!(mask.value(0, -1), MaskValue::Known);
    assert_eq!(mask.value(16, 0), MaskValue::Known);
    assert_eq!(mask.value(0, 16), MaskValue::Known);
    assert_eq!(mask.value(4, 4), MaskValue::Unknown);
    assert_eq!(mask.value(0, 0), MaskValue::Known);
}

#[test]
fn test_region_queries_match_brute_force() {
    // Irregular mask with all three values present.
    let mut gray = Array2::from_elem((24, 32), 255u8);
    let mut lcg = common::Lcg::new(9);
    for value in gray.iter_mut() {
        *value = match lcg.next_u8() % 3 {
            0 => 0,
            1 => 128,
            _ => 255,
        };
    }
    let mask = MaskLod::from_gray(&gray, 32, 24).unwrap();

    let values = [MaskValue::Unknown, MaskValue::Known, MaskValue::Ignored];
    for &value in &values {
        for (x, y, w, h) in [
            (0, 0, 32, 24),
            (3, 2, 7, 5),
            (-4, -4, 10, 10),
            (28, 20, 8, 8),
            (10, 10, 1, 1),
        ] {
            let mut brute_any = false;
            let mut brute_all = true;
            for yy in y..y + h {
                for xx in x..x + w {
                    let cell = mask.value(xx, yy);
                    brute_any |= cell == value;
                    brute_all &= cell == value;
                }
            }

            assert_eq!(mask.region_has_any(x, y, w, h, value), brute_any);
            assert_eq!(mask.region_has_all(x, y, w, h, value), brute_all);
        }
    }
}

#[test]
fn test_scale_down_never_loses_unknown() {
    // Every unknown parent cell must stay unknown in the coarse mask; the
    // reduced resolutions err on the side of completing.
    let gray = common::hole_mask_gray(64, 48, 13, 9, 17, 11);
    let mask = MaskLod::from_gray(&gray, 64, 48).unwrap();

    let mut pyramid = MaskPyramid::new(mask.clone());
    pyramid.scale_down();

    for y in 0..48i32 {
        for x in 0..64i32 {
            if mask.value(x, y) == MaskValue::Unknown {
                assert_ne!(
                    pyramid.value(x / 2, y / 2),
                    MaskValue::Known,
                    "unknown parent ({x}, {y}) scaled to known"
                );
            }
        }
    }
}

#[test]
fn test_scale_up_restores_fine_mask() {
    let mask = common::hole_mask(60, 60, 20, 20, 10, 10);
    let mut pyramid = MaskPyramid::new(mask);

    pyramid.scale_down();
    assert_eq!(pyramid.depth(), 1);
    assert_eq!(pyramid.value(11, 11), MaskValue::Unknown);

    pyramid.scale_up();
    assert_eq!(pyramid.depth(), 0);
    assert_eq!(pyramid.value(25, 25), MaskValue::Unknown);
    assert_eq!(pyramid.value(5, 5), MaskValue::Known);
}
