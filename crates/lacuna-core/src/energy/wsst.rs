use ndarray::Array2;

use crate::energy::Energy;
use crate::image::{Pixel, RgbImage};
use crate::mask::{MaskLod, MaskValue};

/// Windowed sum-squared table: for any block-aligned rectangle whose sides
/// are multiples of the block size, returns the exact integer sum of
/// `r^2 + g^2 + b^2` over the region in O(blocks spanned).
///
/// The table is padded to the left and top by one block so that windows
/// hanging off those edges still resolve (to zero). Built in two passes:
/// first a reverse prefix sum inside each block, then adjacent block sums
/// are combined so each cell holds the total of a full block-sized window
/// anchored there.
pub struct Wsst {
    block_width: i32,
    block_height: i32,
    table: Array2<Energy>,
}

impl Wsst {
    /// Unmasked table: every pixel contributes.
    pub fn new(image: &RgbImage, block_width: i32, block_height: i32) -> Self {
        Self::build(image, None, block_width, block_height)
    }

    /// Masked table: pixels whose mask cell is not `Known` count as zero.
    pub fn new_masked(image: &RgbImage, mask: &MaskLod, block_width: i32, block_height: i32) -> Self {
        Self::build(image, Some(mask), block_width, block_height)
    }

    pub fn block_width(&self) -> i32 {
        self.block_width
    }

    pub fn block_height(&self) -> i32 {
        self.block_height
    }

    /// Sum of squared pixel norms over the region. Width and height must be
    /// positive multiples of the block size.
    pub fn calculate(&self, left: i32, top: i32, width: i32, height: i32) -> Energy {
        debug_assert!(width > 0 && height > 0);
        debug_assert!(width % self.block_width == 0);
        debug_assert!(height % self.block_height == 0);

        let (table_h, table_w) = self.table.dim();

        // Image space to table space: the table is padded by one block.
        let table_left = left + self.block_width;
        let table_top = top + self.block_height;

        let mut e: Energy = 0;
        let mut table_y = table_top;
        for _ in 0..height / self.block_height {
            let mut table_x = table_left;
            for _ in 0..width / self.block_width {
                if table_x >= 0
                    && table_y >= 0
                    && (table_x as usize) < table_w
                    && (table_y as usize) < table_h
                {
                    e += self.table[[table_y as usize, table_x as usize]];
                }
                table_x += self.block_width;
            }
            table_y += self.block_height;
        }
        e
    }

    fn build(image: &RgbImage, mask: Option<&MaskLod>, block_width: i32, block_height: i32) -> Self {
        let image_w = image.width() as i32;
        let image_h = image.height() as i32;
        let table_w = (block_width + image_w) as usize;
        let table_h = (block_height + image_h) as usize;

        let pixel_energy = |x: i32, y: i32| -> Energy {
            if x < 0 || y < 0 || x >= image_w || y >= image_h {
                return 0;
            }
            if let Some(mask) = mask {
                if mask.value(x, y) != MaskValue::Known {
                    return 0;
                }
            }
            let p: Pixel = image.data[[y as usize, x as usize]];
            let (r, g, b) = (p[0] as Energy, p[1] as Energy, p[2] as Energy);
            r * r + g * g + b * b
        };

        // Phase 1: per-block reverse prefix sums. Each cell accumulates the
        // squared energies from itself to the bottom-right corner of its
        // block.
        let mut sst = Array2::<Energy>::zeros((table_h, table_w));
        let get = |t: &Array2<Energy>, x: i32, y: i32| -> Energy {
            if (x as usize) < table_w && (y as usize) < table_h {
                t[[y as usize, x as usize]]
            } else {
                0
            }
        };

        let mut image_top = -block_height;
        while image_top < image_h {
            let bh = block_height.min(image_h - image_top);
            let mut image_left = -block_width;
            while image_left < image_w {
                let bw = block_width.min(image_w - image_left);

                for j in (0..bh).rev() {
                    let image_y = image_top + j;
                    for i in (0..bw).rev() {
                        let image_x = image_left + i;
                        let table_x = image_x + block_width;
                        let table_y = image_y + block_height;

                        let mut e = pixel_energy(image_x, image_y);
                        if i < bw - 1 {
                            e += get(&sst, table_x + 1, table_y);
                        }
                        if j < bh - 1 {
                            e += get(&sst, table_x, table_y + 1);
                            if i < bw - 1 {
                                e -= get(&sst, table_x + 1, table_y + 1);
                            }
                        }
                        sst[[table_y as usize, table_x as usize]] = e;
                    }
                }

                image_left += block_width;
            }
            image_top += block_height;
        }

        // Phase 2: stitch neighboring block sums so each cell covers a full
        // block-sized window anchored at that cell, regardless of where it
        // falls within its block.
        let mut table = Array2::<Energy>::zeros((table_h, table_w));
        for y in 0..table_h as i32 {
            let y_neighbor0 = ((y / block_height) + 1) * block_height;
            let y_neighbor1 = y + block_height;
            for x in 0..table_w as i32 {
                let x_neighbor0 = ((x / block_width) + 1) * block_width;
                let x_neighbor1 = x + block_width;

                let mut e = sst[[y as usize, x as usize]];

                let stitch_x = x_neighbor0 < table_w as i32 && x_neighbor0 != x_neighbor1;
                let stitch_y = y_neighbor0 < table_h as i32 && y_neighbor0 != y_neighbor1;

                if stitch_x {
                    e += get(&sst, x_neighbor0, y) - get(&sst, x_neighbor1, y);
                }
                if stitch_y {
                    e += get(&sst, x, y_neighbor0) - get(&sst, x, y_neighbor1);
                    if stitch_x {
                        e += get(&sst, x_neighbor0, y_neighbor0) + get(&sst, x_neighbor1, y_neighbor1)
                            - get(&sst, x_neighbor1, y_neighbor0)
                            - get(&sst, x_neighbor0, y_neighbor1);
                    }
                }

                table[[y as usize, x as usize]] = e;
            }
        }

        Self {
            block_width,
            block_height,
            table,
        }
    }
}
