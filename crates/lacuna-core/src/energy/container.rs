use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::consts::MIN_CALCULATIONS_FOR_ASYNC_BATCH;
use crate::energy::fft::FftCalculator;
use crate::energy::{per_pixel, BatchParams, Energy, EnergyContext};
use crate::scale::Scalable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalculatorKind {
    PerPixel,
    Fft,
}

/// Rank of a batch: window pixels and calculation count. Partially ordered;
/// one batch subsumes another only when both components do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BatchSize {
    pixels: i64,
    calculations: usize,
}

impl BatchSize {
    fn new(params: &BatchParams) -> Self {
        Self {
            pixels: params.width as i64 * params.height as i64,
            calculations: params.max_calculations,
        }
    }

    fn le(&self, other: &Self) -> bool {
        self.pixels <= other.pixels && self.calculations <= other.calculations
    }
}

/// Wall-clocks the FFT and per-pixel calculators on batches of one size,
/// then remembers the faster of the two.
struct Measurer {
    size: BatchSize,
    fft_time: Duration,
    per_pixel_time: Duration,
    fft_measured: bool,
    per_pixel_measured: bool,
    winner: Option<CalculatorKind>,
}

impl Measurer {
    fn new(size: BatchSize) -> Self {
        Self {
            size,
            fft_time: Duration::ZERO,
            per_pixel_time: Duration::ZERO,
            fft_measured: false,
            per_pixel_measured: false,
            winner: None,
        }
    }
}

struct FftSlot {
    calculator: Option<FftCalculator>,
}

/// Per-resolution energy calculators plus the routing state that decides
/// which one serves a given batch.
///
/// The FFT calculator is allocated lazily per pyramid level (its spectra
/// dominate the session's memory) and freed when the level is popped. The
/// per-pixel path is stateless and shared by every level.
pub struct EnergyCalculatorContainer {
    resolutions: Vec<Option<FftSlot>>,
    measurers: Vec<Measurer>,
    depth: usize,
}

impl EnergyCalculatorContainer {
    pub fn new() -> Self {
        Self {
            resolutions: vec![Some(FftSlot { calculator: None })],
            measurers: Vec::new(),
            depth: 0,
        }
    }

    pub fn scale_down(&mut self) {
        if self.depth == self.resolutions.len() - 1 {
            self.resolutions.push(Some(FftSlot { calculator: None }));
        }
        self.depth += 1;
        debug_assert!(self.resolutions[self.depth].is_some());
    }

    /// Open a batch that computes each energy on demand.
    pub fn open_immediate<'a>(
        &'a mut self,
        params: BatchParams,
        ctx: EnergyContext<'a>,
    ) -> ImmediateEnergyBatch<'a> {
        let (kind, measurer) = self.route(&params, &ctx);
        ImmediateEnergyBatch {
            container: self,
            ctx,
            kind,
            measurer,
            params,
            started: Instant::now(),
        }
    }

    /// Open a batch that buffers positions, processes them together, then
    /// serves results by handle. Handles are dense 0-based queue indices.
    pub fn open_queued<'a>(
        &'a mut self,
        params: BatchParams,
        ctx: EnergyContext<'a>,
    ) -> QueuedEnergyBatch<'a> {
        let (kind, measurer) = self.route(&params, &ctx);
        QueuedEnergyBatch {
            container: self,
            ctx,
            kind,
            measurer,
            params,
            pending: Vec::with_capacity(params.max_calculations),
            results: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Pick a calculator for this batch size. A resolved measurer covers
    /// every smaller batch when per-pixel won, and every larger batch when
    /// FFT won. Unresolved sizes measure FFT first: if the size is only ever
    /// seen once, FFT's worst case on a large batch beats per-pixel's.
    fn route(&mut self, params: &BatchParams, ctx: &EnergyContext) -> (CalculatorKind, Option<usize>) {
        let size = BatchSize::new(params);

        enum Hit {
            Resolved(CalculatorKind),
            Measure(usize),
        }

        let mut hit = None;
        for (i, measurer) in self.measurers.iter().enumerate() {
            match measurer.winner {
                Some(CalculatorKind::PerPixel) if size.le(&measurer.size) => {
                    hit = Some(Hit::Resolved(CalculatorKind::PerPixel));
                    break;
                }
                Some(CalculatorKind::Fft) if measurer.size.le(&size) => {
                    hit = Some(Hit::Resolved(CalculatorKind::Fft));
                    break;
                }
                None if measurer.size == size => {
                    hit = Some(Hit::Measure(i));
                    break;
                }
                _ => {}
            }
        }

        let (kind, measurer) = match hit {
            Some(Hit::Resolved(kind)) => (kind, None),
            Some(Hit::Measure(index)) => {
                let kind = if !self.measurers[index].fft_measured {
                    CalculatorKind::Fft
                } else {
                    CalculatorKind::PerPixel
                };
                (kind, Some(index))
            }
            None => {
                self.measurers.push(Measurer::new(size));
                (CalculatorKind::Fft, Some(self.measurers.len() - 1))
            }
        };

        if kind == CalculatorKind::Fft {
            self.ensure_fft(params, ctx);
        }
        (kind, measurer)
    }

    fn ensure_fft(&mut self, params: &BatchParams, ctx: &EnergyContext) {
        let slot = self.resolutions[self.depth]
            .as_mut()
            .expect("current resolution slot is always present");
        let fft = slot.calculator.get_or_insert_with(|| FftCalculator::new(ctx));
        fft.batch_open(*params, ctx);
    }

    fn fft_mut(&mut self) -> &mut FftCalculator {
        self.resolutions[self.depth]
            .as_mut()
            .and_then(|slot| slot.calculator.as_mut())
            .expect("FFT calculator exists while an FFT batch is open")
    }

    fn fft(&self) -> &FftCalculator {
        self.resolutions[self.depth]
            .as_ref()
            .and_then(|slot| slot.calculator.as_ref())
            .expect("FFT calculator exists while an FFT batch is open")
    }

    /// Record a measured batch. Once both calculators have times for a
    /// size, per-pixel wins when it is within 5% of FFT (smaller memory
    /// footprint breaks the near-tie), and measurers the winner subsumes
    /// are dropped to shorten future routing scans.
    fn on_measured(&mut self, index: usize, kind: CalculatorKind, elapsed: Duration) {
        let measurer = &mut self.measurers[index];
        match kind {
            CalculatorKind::Fft => {
                measurer.fft_time += elapsed;
                measurer.fft_measured = true;
            }
            CalculatorKind::PerPixel => {
                measurer.per_pixel_time += elapsed;
                measurer.per_pixel_measured = true;
            }
        }

        if measurer.fft_measured && measurer.per_pixel_measured && measurer.winner.is_none() {
            let winner = if measurer.per_pixel_time.as_secs_f64()
                <= measurer.fft_time.as_secs_f64() * 1.05
            {
                CalculatorKind::PerPixel
            } else {
                CalculatorKind::Fft
            };
            measurer.winner = Some(winner);
            let size = measurer.size;

            tracing::debug!(
                ?winner,
                pixels = size.pixels,
                calculations = size.calculations,
                "energy batch size resolved"
            );

            self.measurers.retain(|other| {
                let subsumed = match winner {
                    CalculatorKind::PerPixel => other.size.le(&size),
                    CalculatorKind::Fft => size.le(&other.size),
                };
                !subsumed || (other.size == size && other.winner == Some(winner))
            });
        }
    }
}

impl Default for EnergyCalculatorContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scalable for EnergyCalculatorContainer {
    fn scale_up(&mut self) {
        debug_assert!(self.depth > 0);
        // The outgoing level's FFT state is the memory hog; drop it now
        // rather than caching it for a revisit that never happens.
        self.resolutions[self.depth] = None;
        self.depth -= 1;
    }

    fn depth(&self) -> usize {
        self.depth
    }
}

/// Batch guard for synchronous calculations.
pub struct ImmediateEnergyBatch<'a> {
    container: &'a mut EnergyCalculatorContainer,
    ctx: EnergyContext<'a>,
    kind: CalculatorKind,
    measurer: Option<usize>,
    params: BatchParams,
    started: Instant,
}

impl ImmediateEnergyBatch<'_> {
    pub fn calculate(&self, b_left: i32, b_top: i32) -> Energy {
        match self.kind {
            CalculatorKind::PerPixel => {
                per_pixel::calculate(self.ctx.image, self.ctx.mask, &self.params, b_left, b_top)
            }
            CalculatorKind::Fft => self.container.fft().calculate(b_left, b_top),
        }
    }
}

impl Drop for ImmediateEnergyBatch<'_> {
    fn drop(&mut self) {
        if self.kind == CalculatorKind::Fft {
            self.container.fft_mut().batch_close();
        }
        if let Some(index) = self.measurer {
            self.container.on_measured(index, self.kind, self.started.elapsed());
        }
    }
}

/// Batch guard for queue-then-process calculations.
pub struct QueuedEnergyBatch<'a> {
    container: &'a mut EnergyCalculatorContainer,
    ctx: EnergyContext<'a>,
    kind: CalculatorKind,
    measurer: Option<usize>,
    params: BatchParams,
    pending: Vec<(i32, i32)>,
    results: Vec<Energy>,
    started: Instant,
}

impl QueuedEnergyBatch<'_> {
    /// Handles count up from zero in queueing order, so callers that queue
    /// and read in the same order can use their loop index as the handle.
    pub fn queue(&mut self, b_left: i32, b_top: i32) -> usize {
        match self.kind {
            CalculatorKind::PerPixel => {
                self.pending.push((b_left, b_top));
                self.pending.len() - 1
            }
            CalculatorKind::Fft => self.container.fft_mut().queue(b_left, b_top),
        }
    }

    pub fn process(&mut self) {
        match self.kind {
            CalculatorKind::PerPixel => {
                let image = self.ctx.image;
                let mask = self.ctx.mask;
                let params = self.params;
                self.results = if self.pending.len() >= MIN_CALCULATIONS_FOR_ASYNC_BATCH {
                    self.pending
                        .par_iter()
                        .map(|&(bl, bt)| per_pixel::calculate(image, mask, &params, bl, bt))
                        .collect()
                } else {
                    self.pending
                        .iter()
                        .map(|&(bl, bt)| per_pixel::calculate(image, mask, &params, bl, bt))
                        .collect()
                };
            }
            CalculatorKind::Fft => self.container.fft_mut().process(),
        }
    }

    pub fn result(&self, handle: usize) -> Energy {
        match self.kind {
            CalculatorKind::PerPixel => self.results[handle],
            CalculatorKind::Fft => self.container.fft().result(handle),
        }
    }
}

impl Drop for QueuedEnergyBatch<'_> {
    fn drop(&mut self) {
        if self.kind == CalculatorKind::Fft {
            self.container.fft_mut().batch_close();
        }
        if let Some(index) = self.measurer {
            self.container.on_measured(index, self.kind, self.started.elapsed());
        }
    }
}
