use crate::mask::{MaskLod, MaskValue};
use crate::scale::Scalable;
use crate::settings::Settings;

/// A candidate source patch position: the (left, top) of a patch-sized
/// window that lies entirely in the known region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label {
    pub left: i32,
    pub top: i32,
}

/// One bit per image coordinate, recording label validity. Used to expand a
/// coarse label into its finer children without searching the label list.
struct BitGrid {
    bits: Vec<u8>,
    width: usize,
    height: usize,
}

impl BitGrid {
    fn new(width: usize, height: usize) -> Self {
        Self {
            bits: vec![0; (width * height + 7) / 8],
            width,
            height,
        }
    }

    fn set(&mut self, x: usize, y: usize) {
        let index = y * self.width + x;
        self.bits[index / 8] |= 1 << (index & 7);
    }

    fn is_set(&self, x: usize, y: usize) -> bool {
        let index = y * self.width + x;
        (self.bits[index / 8] >> (index & 7)) & 1 != 0
    }
}

struct LabelResolution {
    labels: Vec<Label>,
    grid: BitGrid,
}

impl LabelResolution {
    /// Enumerate every patch window that is fully known.
    fn finest(settings: &Settings, image_width: usize, image_height: usize, mask: &MaskLod) -> Self {
        let mut grid = BitGrid::new(image_width, image_height);
        let mut labels = Vec::new();

        let pw = settings.patch_width;
        let ph = settings.patch_height;
        let x_max = image_width as i32 - pw;
        let y_max = image_height as i32 - ph;

        for y in 0..=y_max {
            for x in 0..=x_max {
                if mask.region_has_all(x, y, pw, ph, MaskValue::Known) {
                    grid.set(x as usize, y as usize);
                    labels.push(Label { left: x, top: y });
                }
            }
        }

        Self { labels, grid }
    }

    /// Halve the grid: a coarse bit is set when any child bit is. Odd edges
    /// fold into the neighboring quad, like the mask's LOD reduction.
    fn scaled_down(&self) -> Self {
        let high_w = self.grid.width;
        let high_h = self.grid.height;
        let (odd_edge_x, odd_edge_y) = odd_edge_coordinates(high_w, high_h);

        let mut grid = BitGrid::new(high_w / 2, high_h / 2);
        let mut labels = Vec::new();

        let mut y = 0usize;
        while y < high_h {
            let block_h = if y as i32 == odd_edge_y { 3 } else { 2 };
            let mut x = 0usize;
            while x < high_w {
                let block_w = if x as i32 == odd_edge_x { 3 } else { 2 };

                let mut any_set = false;
                'block: for dy in 0..block_h {
                    for dx in 0..block_w {
                        if y + dy < high_h && x + dx < high_w && self.grid.is_set(x + dx, y + dy) {
                            any_set = true;
                            break 'block;
                        }
                    }
                }

                if any_set {
                    grid.set(x / 2, y / 2);
                    labels.push(Label {
                        left: (x / 2) as i32,
                        top: (y / 2) as i32,
                    });
                }

                x += block_w;
            }
            y += block_h;
        }

        Self { labels, grid }
    }
}

/// If a dimension is odd, its final 3-cell strip belongs to the quad at
/// `dim - 3`; even dimensions have no such quad (-1).
fn odd_edge_coordinates(width: usize, height: usize) -> (i32, i32) {
    let x = if width & 1 == 1 { width as i32 - 3 } else { -1 };
    let y = if height & 1 == 1 { height as i32 - 3 } else { -1 };
    (x, y)
}

/// All candidate source patch positions, across pyramid resolutions.
pub struct LabelSet {
    resolutions: Vec<Option<LabelResolution>>,
    depth: usize,
}

impl LabelSet {
    pub fn new(settings: &Settings, image_width: usize, image_height: usize, mask: &MaskLod) -> Self {
        Self {
            resolutions: vec![Some(LabelResolution::finest(
                settings,
                image_width,
                image_height,
                mask,
            ))],
            depth: 0,
        }
    }

    fn current(&self) -> &LabelResolution {
        self.resolutions[self.depth]
            .as_ref()
            .expect("current label resolution is always present")
    }

    pub fn len(&self) -> usize {
        self.current().labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Label {
        self.current().labels[index]
    }

    pub fn scale_down(&mut self) {
        if self.depth == self.resolutions.len() - 1 {
            let scaled = self.current().scaled_down();
            self.resolutions.push(Some(scaled));
        }
        self.depth += 1;
        debug_assert!(self.resolutions[self.depth].is_some());
    }

    /// Map a label from one resolution down into its children at the
    /// current (finer) resolution: the 2x2 quad it covered, widened to
    /// 2x3 / 3x2 / 3x3 where an odd edge was folded in. Only children whose
    /// validity bit is set are returned; there may be none.
    pub fn expand_low_to_current(&self, low: Label) -> Vec<Label> {
        let current = self.current();
        let (odd_edge_x, odd_edge_y) = odd_edge_coordinates(current.grid.width, current.grid.height);

        let base_x = low.left * 2;
        let base_y = low.top * 2;
        let block_w = if base_x == odd_edge_x { 3 } else { 2 };
        let block_h = if base_y == odd_edge_y { 3 } else { 2 };

        let mut out = Vec::with_capacity(9);
        for dy in 0..block_h {
            for dx in 0..block_w {
                let x = base_x + dx;
                let y = base_y + dy;
                if x >= 0
                    && y >= 0
                    && (x as usize) < current.grid.width
                    && (y as usize) < current.grid.height
                    && current.grid.is_set(x as usize, y as usize)
                {
                    out.push(Label { left: x, top: y });
                }
            }
        }
        out
    }
}

impl Scalable for LabelSet {
    fn scale_up(&mut self) {
        debug_assert!(self.depth > 0);
        self.resolutions[self.depth] = None;
        self.depth -= 1;
    }

    fn depth(&self) -> usize {
        self.depth
    }
}
