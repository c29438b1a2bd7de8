use crate::energy::Energy;

/// Largest accepted width or height for the input image.
pub const IMAGE_DIMENSION_MAX: usize = 32767;

/// Minimum lattice gap along either axis.
pub const LATTICE_GAP_MIN: i32 = 4;

/// A patch side is always this multiple of the lattice gap on that axis.
pub const PATCH_TO_LATTICE_RATIO: i32 = 2;

/// Minimum patch side at the original resolution.
pub const PATCH_SIDE_MIN: i32 = LATTICE_GAP_MIN * PATCH_TO_LATTICE_RATIO;

/// Low-resolution passes may shrink patches down to half the normal minimum.
pub const LOW_RES_PATCH_SIDE_MIN: i32 = PATCH_SIDE_MIN / 2;

/// Neither image side may be reduced below this during coarse passes.
pub const IMAGE_SIDE_REDUCTION_MIN: i32 = 50;

/// Sentinel for `Settings::low_resolution_passes_max`: keep reducing until
/// the patch or image floor is hit.
pub const LOW_RESOLUTION_PASSES_AUTO: i32 = -1;

pub const NUM_ITERATIONS_DEFAULT: u32 = 6;

/// Fewest labels a node may keep after pruning.
pub const POST_PRUNE_LABELS_MIN: usize = 3;

/// Coarser resolutions keep this many times more labels per node, so that
/// error introduced by the reduced data can be recovered one level up.
pub const NODE_LABELS_KEPT_SCALE_MULTIPLIER: usize = 4;

/// Queued energy batches at or above this size are processed in parallel.
/// Below it, synchronization overhead outweighs the win.
pub const MIN_CALCULATIONS_FOR_ASYNC_BATCH: usize = 30;

pub const ENERGY_MIN: Energy = 0;
pub const ENERGY_MAX: Energy = i64::MAX;

pub const PRIORITY_MIN: f32 = f32::MIN_POSITIVE;
pub const PRIORITY_MAX: f32 = 1.0;
