use serde::Serialize;
use thiserror::Error;

use crate::consts::{
    IMAGE_DIMENSION_MAX, LATTICE_GAP_MIN, LOW_RESOLUTION_PASSES_AUTO,
    NODE_LABELS_KEPT_SCALE_MULTIPLIER, NUM_ITERATIONS_DEFAULT, PATCH_SIDE_MIN,
    PATCH_TO_LATTICE_RATIO, POST_PRUNE_LABELS_MIN,
};
use crate::energy::{Belief, Energy};
use crate::scale::Scalable;

/// How patch pixels are obtained during compositing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchSourceKind {
    /// Copy straight from the input image at the solved source rectangle.
    #[default]
    Normal,
    /// Solid-fill each patch with a rainbow color keyed to its compositing
    /// order: red for the least confident, violet for the most.
    DebugPatchOrder,
}

/// How overlapping patches combine in the working image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchBlenderKind {
    /// Weight each patch by its priority and feather its edges.
    #[default]
    Priority,
    /// Later patches overwrite earlier ones outright.
    None,
}

/// How the blended patches merge back into the original image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputBlenderKind {
    /// Alpha-blend through a softened mask so seams fade over a few pixels.
    #[default]
    SoftMask,
    /// Write patch pixels only where the hard mask is unknown.
    None,
    /// Write the soft mask itself as a grayscale image.
    DebugSoftMaskIntensity,
}

/// Tunables for a completion run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Settings {
    /// Composite and keep each low-resolution pass's intermediate solution.
    pub debug_low_resolution_passes: bool,

    /// Number of coarse passes, or `LOW_RESOLUTION_PASSES_AUTO` to keep
    /// halving until a patch or image size floor is reached.
    pub low_resolution_passes_max: i32,

    /// Priority-BP forward/backward iterations per resolution.
    pub num_iterations: u32,

    /// Spacing of the MRF lattice.
    pub lattice_gap_x: i32,
    pub lattice_gap_y: i32,

    /// Patch sides; always `PATCH_TO_LATTICE_RATIO` times the gap.
    pub patch_width: i32,
    pub patch_height: i32,

    /// Labels with belief within this of the best form the confusion set;
    /// the smaller that set, the higher a node's scheduling priority.
    pub confidence_belief_threshold: Belief,

    /// Labels whose belief falls below this are pruned from a node.
    pub prune_belief_threshold: Belief,

    /// On the first pruning, a label this close in energy to an already
    /// kept one is discarded as redundant.
    pub prune_energy_similar_threshold: Energy,

    /// Bounds on the per-node label count after pruning.
    pub post_prune_labels_min: usize,
    pub post_prune_labels_max: usize,

    pub compositor_patch_source: PatchSourceKind,
    pub compositor_patch_blender: PatchBlenderKind,
    pub compositor_output_blender: OutputBlenderKind,
}

/// A settings field that failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SettingsField {
    LowResolutionPassesMax,
    NumIterations,
    LatticeGapX,
    LatticeGapY,
    PatchWidth,
    PatchHeight,
    PruneEnergySimilarThreshold,
    PostPruneLabelsMin,
    PostPruneLabelsMax,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsIssue {
    pub field: SettingsField,
    pub message: String,
}

/// Validation failure carrying one issue per invalid field.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{}", issues.iter().map(|i| format!("{:?} {}", i.field, i.message)).collect::<Vec<_>>().join("; "))]
pub struct SettingsError {
    pub issues: Vec<SettingsIssue>,
}

impl Settings {
    /// Settings with an explicit lattice gap.
    pub fn with_lattice_gap(lattice_gap_x: i32, lattice_gap_y: i32) -> Self {
        let patch_width = lattice_gap_x * PATCH_TO_LATTICE_RATIO;
        let patch_height = lattice_gap_y * PATCH_TO_LATTICE_RATIO;

        // A mediocre-but-acceptable whole-patch SSD, assuming a tolerable
        // per-channel difference of 15% of full range. The belief and
        // similarity thresholds all hang off this baseline.
        let component_diff = (0.15f32 * 255.0) as Energy;
        let ssd0 = patch_width as Energy * patch_height as Energy * 3 * component_diff * component_diff;

        Self {
            debug_low_resolution_passes: false,
            low_resolution_passes_max: 0,
            num_iterations: NUM_ITERATIONS_DEFAULT,
            lattice_gap_x,
            lattice_gap_y,
            patch_width,
            patch_height,
            confidence_belief_threshold: -ssd0,
            prune_belief_threshold: -ssd0 * 2,
            prune_energy_similar_threshold: ssd0 / 2,
            post_prune_labels_min: POST_PRUNE_LABELS_MIN,
            post_prune_labels_max: POST_PRUNE_LABELS_MIN * 4,
            compositor_patch_source: PatchSourceKind::default(),
            compositor_patch_blender: PatchBlenderKind::default(),
            compositor_output_blender: OutputBlenderKind::default(),
        }
    }

    /// Suggested settings for an image: the gap grows linearly with image
    /// size (4 pixels per 100), floored at the minimum gap and clamped so
    /// neither gap exceeds twice the other.
    pub fn for_image(image_width: usize, image_height: usize) -> Self {
        const IMAGE_SIZE_AT_GAP_MIN: i32 = 100;

        let mut gap_x =
            ((LATTICE_GAP_MIN * image_width as i32) / IMAGE_SIZE_AT_GAP_MIN).max(LATTICE_GAP_MIN);
        let mut gap_y =
            ((LATTICE_GAP_MIN * image_height as i32) / IMAGE_SIZE_AT_GAP_MIN).max(LATTICE_GAP_MIN);

        const GAP_RATIO_MAX: i32 = 2;
        if gap_x > gap_y * GAP_RATIO_MAX {
            gap_x = gap_y * GAP_RATIO_MAX;
        }
        if gap_y > gap_x * GAP_RATIO_MAX {
            gap_y = gap_x * GAP_RATIO_MAX;
        }

        Self::with_lattice_gap(gap_x, gap_y)
    }

    /// Check every field, collecting one issue per violation.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut issues = Vec::new();
        let mut check = |ok: bool, field: SettingsField, message: String| {
            if !ok {
                issues.push(SettingsIssue { field, message });
            }
        };

        check(
            self.low_resolution_passes_max >= LOW_RESOLUTION_PASSES_AUTO,
            SettingsField::LowResolutionPassesMax,
            format!("({}) is less than {}", self.low_resolution_passes_max, LOW_RESOLUTION_PASSES_AUTO),
        );
        check(
            self.num_iterations >= 1,
            SettingsField::NumIterations,
            format!("({}) is less than 1", self.num_iterations),
        );
        check(
            self.lattice_gap_x >= LATTICE_GAP_MIN,
            SettingsField::LatticeGapX,
            format!("({}) is less than {}", self.lattice_gap_x, LATTICE_GAP_MIN),
        );
        check(
            self.lattice_gap_y >= LATTICE_GAP_MIN,
            SettingsField::LatticeGapY,
            format!("({}) is less than {}", self.lattice_gap_y, LATTICE_GAP_MIN),
        );
        check(
            self.patch_width >= PATCH_SIDE_MIN,
            SettingsField::PatchWidth,
            format!("({}) is less than {}", self.patch_width, PATCH_SIDE_MIN),
        );
        check(
            self.patch_height >= PATCH_SIDE_MIN,
            SettingsField::PatchHeight,
            format!("({}) is less than {}", self.patch_height, PATCH_SIDE_MIN),
        );

        // The 64-bit energy accumulator must cover the worst-case patch:
        // every pixel a full-range difference in all three channels.
        let patch_pixels_max = (IMAGE_DIMENSION_MAX as Energy * PATCH_TO_LATTICE_RATIO as Energy)
            * (IMAGE_DIMENSION_MAX as Energy * PATCH_TO_LATTICE_RATIO as Energy);
        if self.patch_width as Energy * self.patch_height as Energy > patch_pixels_max {
            let field = if self.patch_width > self.patch_height {
                SettingsField::PatchWidth
            } else {
                SettingsField::PatchHeight
            };
            check(
                false,
                field,
                format!(
                    "yields too large a patch ({} * {} > {})",
                    self.patch_width, self.patch_height, patch_pixels_max
                ),
            );
        }

        check(
            self.prune_energy_similar_threshold >= 0,
            SettingsField::PruneEnergySimilarThreshold,
            format!("({}) is negative", self.prune_energy_similar_threshold),
        );
        check(
            self.post_prune_labels_min >= POST_PRUNE_LABELS_MIN,
            SettingsField::PostPruneLabelsMin,
            format!("({}) is less than {}", self.post_prune_labels_min, POST_PRUNE_LABELS_MIN),
        );
        check(
            self.post_prune_labels_max >= self.post_prune_labels_min,
            SettingsField::PostPruneLabelsMax,
            format!(
                "({}) is less than the minimum ({})",
                self.post_prune_labels_max, self.post_prune_labels_min
            ),
        );

        if issues.is_empty() {
            Ok(())
        } else {
            Err(SettingsError { issues })
        }
    }
}

/// Settings with the saved copies of every finer resolution.
pub struct SettingsStack {
    current: Settings,
    saved: Vec<Settings>,
}

impl SettingsStack {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: settings,
            saved: Vec::new(),
        }
    }

    pub fn current(&self) -> &Settings {
        &self.current
    }

    /// Halve the lattice gap and recompute the patch size from it (dividing
    /// the patch size directly would drift on odd values). Coarser levels
    /// keep more labels per node.
    pub fn scale_down(&mut self) {
        self.saved.push(self.current.clone());

        self.current.lattice_gap_x /= 2;
        self.current.lattice_gap_y /= 2;
        self.current.patch_width = self.current.lattice_gap_x * PATCH_TO_LATTICE_RATIO;
        self.current.patch_height = self.current.lattice_gap_y * PATCH_TO_LATTICE_RATIO;

        self.current.post_prune_labels_min *= NODE_LABELS_KEPT_SCALE_MULTIPLIER;
        self.current.post_prune_labels_max *= NODE_LABELS_KEPT_SCALE_MULTIPLIER;
    }
}

impl Scalable for SettingsStack {
    fn scale_up(&mut self) {
        self.current = self.saved.pop().expect("scale_up without matching scale_down");
    }

    fn depth(&self) -> usize {
        self.saved.len()
    }
}
