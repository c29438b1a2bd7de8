//! The coarse-to-fine completion driver.
//!
//! The session recurses down the pyramid while the patch and image sizes
//! stay above their floors, solves at the coarsest level, then pops back up
//! one level at a time, letting each solution seed the next finer one
//! through the nodes' kept labels.

use std::io::{Read, Write};

use crate::compositor::{self, CompositorInput};
use crate::consts::{
    IMAGE_SIDE_REDUCTION_MIN, LOW_RESOLUTION_PASSES_AUTO, LOW_RES_PATCH_SIDE_MIN,
};
use crate::energy::container::EnergyCalculatorContainer;
use crate::error::{LacunaError, Result};
use crate::image::{ImagePyramid, RgbImage};
use crate::label::LabelSet;
use crate::mask::{MaskLod, MaskPyramid};
use crate::node::{NodeContext, NodeSet};
use crate::patches::{read_patches, write_patches, Patch};
use crate::scale::Scalable;
use crate::settings::{Settings, SettingsStack};
use crate::solver::PriorityBpRunner;

pub struct CompletionOutput {
    /// The completed image.
    pub image: RgbImage,
    /// The solved patches that produced it, in ascending priority order.
    pub patches: Vec<Patch>,
    /// One composited intermediate per low-resolution pass, coarsest first,
    /// when `debug_low_resolution_passes` is set.
    pub pass_images: Vec<RgbImage>,
}

/// Complete the unknown region of `image` as marked by `mask`.
///
/// With a `patches_reader`, solving is skipped and the read patches are
/// composited directly. With a `patches_writer`, the solved patches are
/// recorded before compositing.
pub fn complete(
    settings: &Settings,
    image: &RgbImage,
    mask: &MaskLod,
    patches_reader: Option<&mut dyn Read>,
    patches_writer: Option<&mut dyn Write>,
) -> Result<CompletionOutput> {
    image.validate()?;
    if mask.width() != image.width() || mask.height() != image.height() {
        return Err(LacunaError::InvalidMask(format!(
            "mask is {}x{} but the image is {}x{}",
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        )));
    }
    settings.validate()?;

    let mut pass_images = Vec::new();
    let patches = match patches_reader {
        Some(reader) => read_patches(reader)?,
        None => solve(settings, image, mask, &mut pass_images)?,
    };

    if let Some(writer) = patches_writer {
        write_patches(writer, &patches)?;
    }

    let output = compositor::compose(&CompositorInput {
        patches: &patches,
        image,
        mask,
        settings,
    })?;

    Ok(CompletionOutput {
        image: output,
        patches,
        pass_images,
    })
}

/// Everything the solver scales together across pyramid levels.
struct Session {
    settings: SettingsStack,
    image: ImagePyramid,
    mask: MaskPyramid,
    labels: LabelSet,
    nodes: NodeSet,
    energy: EnergyCalculatorContainer,
}

fn solve(
    settings: &Settings,
    image: &RgbImage,
    mask: &MaskLod,
    pass_images: &mut Vec<RgbImage>,
) -> Result<Vec<Patch>> {
    tracing::info!(
        width = image.width(),
        height = image.height(),
        gap_x = settings.lattice_gap_x,
        gap_y = settings.lattice_gap_y,
        "starting completion solve"
    );

    let mut session = Session {
        settings: SettingsStack::new(settings.clone()),
        image: ImagePyramid::new(image.clone()),
        mask: MaskPyramid::new(mask.clone()),
        labels: LabelSet::new(settings, image.width(), image.height(), mask),
        nodes: NodeSet::new(settings, image.width(), image.height(), mask),
        energy: EnergyCalculatorContainer::new(),
    };
    let mut runner = PriorityBpRunner::new();

    run_low_resolution_passes(&mut session, &mut runner, pass_images, 1)?;

    // The original-resolution pass produces the final patches.
    let Session {
        settings,
        image,
        mask,
        labels,
        nodes,
        energy,
    } = &mut session;
    let mut ctx = NodeContext {
        energy,
        labels,
        image: image.current(),
        mask: mask.current(),
        settings: settings.current(),
    };
    runner.run_and_get_patches(nodes, &mut ctx)
}

fn run_low_resolution_passes(
    session: &mut Session,
    runner: &mut PriorityBpRunner,
    pass_images: &mut Vec<RgbImage>,
    pass: i32,
) -> Result<()> {
    // Stop once the next halving would undercut the patch or image floors,
    // or once the configured number of passes is reached.
    let should_evaluate = {
        let settings = session.settings.current();
        let within_pass_limit = settings.low_resolution_passes_max == LOW_RESOLUTION_PASSES_AUTO
            || pass <= settings.low_resolution_passes_max;
        within_pass_limit
            && settings.patch_width / 2 >= LOW_RES_PATCH_SIDE_MIN
            && settings.patch_height / 2 >= LOW_RES_PATCH_SIDE_MIN
            && session.image.width() as i32 / 2 >= IMAGE_SIDE_REDUCTION_MIN
            && session.image.height() as i32 / 2 >= IMAGE_SIDE_REDUCTION_MIN
    };
    if !should_evaluate {
        return Ok(());
    }

    // Push one level down. The order is load-bearing: the image averages
    // 2x2 blocks against the mask still at the parent depth.
    session.settings.scale_down();
    session.image.scale_down(&session.mask);
    session.mask.scale_down();
    session.labels.scale_down();
    session.nodes.scale_down();
    session.energy.scale_down();

    tracing::info!(
        pass,
        width = session.image.width(),
        height = session.image.height(),
        "low-resolution pass"
    );

    run_low_resolution_passes(session, runner, pass_images, pass + 1)?;

    // Solve at this level on the way back up.
    {
        let Session {
            settings,
            image,
            mask,
            labels,
            nodes,
            energy,
        } = session;
        let debug_pass = settings.current().debug_low_resolution_passes;

        let ctx = &mut NodeContext {
            energy,
            labels,
            image: image.current(),
            mask: mask.current(),
            settings: settings.current(),
        };

        if debug_pass {
            let patches = runner.run_and_get_patches(nodes, ctx)?;
            let preview = compositor::compose(&CompositorInput {
                patches: &patches,
                image: image.current(),
                mask: mask.current(),
                settings: settings.current(),
            })?;
            pass_images.push(preview);
        } else {
            runner.run(nodes, ctx)?;
        }
    }

    // Pop back up in the same order the push went down.
    session.settings.scale_up();
    session.image.scale_up();
    session.mask.scale_up();
    session.labels.scale_up();
    session.nodes.scale_up(&session.labels);
    session.energy.scale_up();

    Ok(())
}
