use ndarray::Array2;

use crate::error::{LacunaError, Result};
use crate::scale::Scalable;

/// State of a single mask cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskValue {
    /// Must be filled by the completion.
    Unknown,
    /// Usable source data; never overwritten.
    Known,
    /// Neither contributes source data nor receives output.
    Ignored,
    /// Only appears in reduced levels-of-detail: the block mixed values.
    Indeterminate,
}

impl MaskValue {
    /// Decode a grayscale byte: nearest of 0 (unknown), 128 (ignored),
    /// 255 (known), ties resolving toward the lower intensity.
    pub fn from_byte(byte: u8) -> MaskValue {
        let ignored_diff = (byte as i32 - 128).abs();
        if byte as i32 <= ignored_diff {
            MaskValue::Unknown
        } else if ignored_diff <= 255 - byte as i32 {
            MaskValue::Ignored
        } else {
            MaskValue::Known
        }
    }
}

/// One level-of-detail plane. Level 0 is cell-per-pixel; level L covers
/// 2^L x 2^L pixel blocks.
#[derive(Clone, Debug)]
struct LodPlane {
    values: Array2<MaskValue>,
}

impl LodPlane {
    fn width(&self) -> usize {
        self.values.ncols()
    }

    fn height(&self) -> usize {
        self.values.nrows()
    }
}

/// A mask with a level-of-detail stack for fast region queries.
#[derive(Clone, Debug)]
pub struct MaskLod {
    planes: Vec<LodPlane>,
}

enum RegionSearch {
    Any,
    All,
}

impl MaskLod {
    /// Build from per-pixel mask values (the decoded mask image).
    pub fn new(values: Array2<MaskValue>) -> Self {
        let mut mask = Self {
            planes: vec![LodPlane { values }],
        };
        mask.create_lower_lods();
        mask
    }

    /// Decode a grayscale mask image, checking its extent against the input
    /// image.
    pub fn from_gray(gray: &Array2<u8>, image_width: usize, image_height: usize) -> Result<Self> {
        let (h, w) = gray.dim();
        if w != image_width || h != image_height {
            return Err(LacunaError::InvalidMask(format!(
                "mask is {}x{} but the image is {}x{}",
                w, h, image_width, image_height
            )));
        }
        Ok(Self::new(gray.mapv(MaskValue::from_byte)))
    }

    pub fn width(&self) -> usize {
        self.planes[0].width()
    }

    pub fn height(&self) -> usize {
        self.planes[0].height()
    }

    /// The mask value at (x, y). Out-of-bounds coordinates read `Known`.
    pub fn value(&self, x: i32, y: i32) -> MaskValue {
        let plane = &self.planes[0];
        if x >= 0 && y >= 0 && (x as usize) < plane.width() && (y as usize) < plane.height() {
            plane.values[[y as usize, x as usize]]
        } else {
            MaskValue::Known
        }
    }

    /// Does any cell of the w x h region at (x, y) hold `value`?
    pub fn region_has_any(&self, x: i32, y: i32, w: i32, h: i32, value: MaskValue) -> bool {
        self.region_search(x, y, x + w - 1, y + h - 1, value, RegionSearch::Any)
    }

    /// Do all cells of the w x h region at (x, y) hold `value`?
    pub fn region_has_all(&self, x: i32, y: i32, w: i32, h: i32, value: MaskValue) -> bool {
        self.region_search(x, y, x + w - 1, y + h - 1, value, RegionSearch::All)
    }

    /// Start at the coarsest LOD whose block size covers the region span and
    /// descend only where blocks are indeterminate. `Any` returns true on the
    /// first match; `All` returns false on the first mismatch.
    fn region_search(
        &self,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        value: MaskValue,
        mode: RegionSearch,
    ) -> bool {
        debug_assert!(left <= right && top <= bottom);

        let span = (right - left).max(bottom - top).max(0) as u32 + 1;
        let mut lod = (32 - span.leading_zeros()).saturating_sub(1) as usize;
        lod = lod.min(self.planes.len() - 1);

        loop {
            let plane = &self.planes[lod];
            let pw = plane.width() as i32;
            let ph = plane.height() as i32;

            let mut found_indeterminate = false;
            for y in (top >> lod)..=(bottom >> lod) {
                for x in (left >> lod)..=(right >> lod) {
                    let block = if x >= 0 && y >= 0 && x < pw && y < ph {
                        plane.values[[y as usize, x as usize]]
                    } else {
                        MaskValue::Known
                    };

                    match (block == value, &mode) {
                        (_, _) if block == MaskValue::Indeterminate => {
                            found_indeterminate = true;
                        }
                        (true, RegionSearch::Any) => return true,
                        (false, RegionSearch::All) => return false,
                        _ => {}
                    }
                }
            }

            if !found_indeterminate || lod == 0 {
                break;
            }
            lod -= 1;
        }

        matches!(mode, RegionSearch::All)
    }

    /// Build a half-resolution mask from this one. Indeterminate blocks are
    /// forced to `Unknown`: reduced passes must err on the side of completing.
    fn scaled_down(&self) -> MaskLod {
        debug_assert!(self.planes.len() >= 2);
        let coarse = &self.planes[1];
        let values = coarse.values.mapv(|v| {
            if v == MaskValue::Indeterminate {
                MaskValue::Unknown
            } else {
                v
            }
        });
        MaskLod::new(values)
    }

    /// Add lower LODs until one is all-indeterminate or 1x1 is reached.
    fn create_lower_lods(&mut self) {
        loop {
            let prev = self.planes.last().expect("at least lod 0 exists");
            let prev_w = prev.width();
            let prev_h = prev.height();
            if prev_w == 1 && prev_h == 1 {
                break;
            }

            let w = (prev_w / 2).max(1);
            let h = (prev_h / 2).max(1);

            // An odd edge in the previous LOD is folded into its neighboring
            // block, making that block 3 cells wide/tall.
            let odd_edge_x = if prev_w & 1 == 1 { prev_w as i32 - 3 } else { -1 };
            let odd_edge_y = if prev_h & 1 == 1 { prev_h as i32 - 3 } else { -1 };

            let mut values = Array2::from_elem((h, w), MaskValue::Known);
            let mut all_indeterminate = true;
            for y in 0..h {
                let py = y * 2;
                let nv = if py as i32 == odd_edge_y { 3 } else { 2 };
                for x in 0..w {
                    let px = x * 2;
                    let nu = if px as i32 == odd_edge_x { 3 } else { 2 };

                    let mut value = None;
                    'block: for v in 0..nv {
                        for u in 0..nu {
                            let cell = prev.values[[(py + v).min(prev_h - 1), (px + u).min(prev_w - 1)]];
                            match value {
                                None => value = Some(cell),
                                Some(current) if current != cell => {
                                    value = Some(MaskValue::Indeterminate);
                                    break 'block;
                                }
                                _ => {}
                            }
                        }
                    }

                    let value = value.expect("block has at least one cell");
                    if value != MaskValue::Indeterminate {
                        all_indeterminate = false;
                    }
                    values[[y, x]] = value;
                }
            }

            self.planes.push(LodPlane { values });
            if all_indeterminate {
                break;
            }
        }
    }
}

/// The scalable mask stack driven by the coarse-to-fine pipeline.
pub struct MaskPyramid {
    resolutions: Vec<Option<MaskLod>>,
    depth: usize,
}

impl MaskPyramid {
    pub fn new(mask: MaskLod) -> Self {
        Self {
            resolutions: vec![Some(mask)],
            depth: 0,
        }
    }

    pub fn current(&self) -> &MaskLod {
        self.resolutions[self.depth]
            .as_ref()
            .expect("current mask resolution is always present")
    }

    pub fn value(&self, x: i32, y: i32) -> MaskValue {
        self.current().value(x, y)
    }

    pub fn region_has_any(&self, x: i32, y: i32, w: i32, h: i32, value: MaskValue) -> bool {
        self.current().region_has_any(x, y, w, h, value)
    }

    pub fn region_has_all(&self, x: i32, y: i32, w: i32, h: i32, value: MaskValue) -> bool {
        self.current().region_has_all(x, y, w, h, value)
    }

    pub fn scale_down(&mut self) {
        if self.depth == self.resolutions.len() - 1 {
            let scaled = self.current().scaled_down();
            self.resolutions.push(Some(scaled));
        }
        self.depth += 1;
        debug_assert!(self.resolutions[self.depth].is_some());
    }
}

impl Scalable for MaskPyramid {
    fn scale_up(&mut self) {
        debug_assert!(self.depth > 0);
        self.resolutions[self.depth] = None;
        self.depth -= 1;
    }

    fn depth(&self) -> usize {
        self.depth
    }
}
