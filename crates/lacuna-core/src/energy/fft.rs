use ndarray::Array2;
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::FftPlanner;

use crate::consts::ENERGY_MIN;
use crate::energy::wsst::Wsst;
use crate::energy::{BatchParams, Energy, EnergyContext};
use crate::image::NUM_CHANNELS;
use crate::mask::MaskValue;

/// Pixel count at which the 2D FFT helpers switch to row/column
/// parallelism.
const PARALLEL_FFT_THRESHOLD: usize = 65_536;

/// FFT-accelerated SSD for batches where window A is fixed and many window
/// B positions share the image.
///
/// Expanding the square:
///
/// ```text
/// unmasked:  sum (A - B)^2        = sum A^2     - 2 sum A*B     + sum B^2
/// masked:    sum M*(A - B)^2      = sum (M*A)^2 - 2 sum (M*A)*B + sum M*B^2
/// ```
///
/// The first term comes from the windowed sum-squared table. The cross
/// terms are correlations of a window against the whole image, which is one
/// pointwise spectrum product per channel. Opening a batch does all of that
/// heavy lifting; each per-B query afterwards is two table lookups.
pub struct FftCalculator {
    input_width: usize,
    input_height: usize,
    fft_width: usize,
    fft_height: usize,

    wsst: Wsst,
    wsst_masked: Wsst,

    /// Forward spectra of each channel, and of each channel squared.
    image_spectra: Vec<Array2<Complex<f64>>>,
    image_sq_spectra: Vec<Array2<Complex<f64>>>,

    // Open-batch state.
    params: Option<BatchParams>,
    first_term: Energy,
    second_and_third: Array2<Energy>,
    queued_results: Vec<Energy>,
    processed: bool,
}

impl FftCalculator {
    pub fn new(ctx: &EnergyContext) -> Self {
        let input_width = ctx.image.width();
        let input_height = ctx.image.height();
        let fft_width = input_width + ctx.settings.patch_width as usize - 1;
        let fft_height = input_height + ctx.settings.patch_height as usize - 1;

        tracing::debug!(
            fft_width,
            fft_height,
            "building FFT energy calculator spectra"
        );

        let mut image_spectra = Vec::with_capacity(NUM_CHANNELS);
        let mut image_sq_spectra = Vec::with_capacity(NUM_CHANNELS);
        for channel in 0..NUM_CHANNELS {
            let mut spatial = Array2::<f64>::zeros((fft_height, fft_width));
            for y in 0..input_height {
                for x in 0..input_width {
                    spatial[[y, x]] = ctx.image.data[[y, x]][channel] as f64;
                }
            }
            image_spectra.push(fft2d_forward(&spatial));

            spatial.mapv_inplace(|v| v * v);
            image_sq_spectra.push(fft2d_forward(&spatial));
        }

        Self {
            input_width,
            input_height,
            fft_width,
            fft_height,
            wsst: Wsst::new(ctx.image, ctx.settings.lattice_gap_x, ctx.settings.lattice_gap_y),
            wsst_masked: Wsst::new_masked(
                ctx.image,
                ctx.mask,
                ctx.settings.lattice_gap_x,
                ctx.settings.lattice_gap_y,
            ),
            image_spectra,
            image_sq_spectra,
            params: None,
            first_term: ENERGY_MIN,
            second_and_third: Array2::zeros((input_height, input_width)),
            queued_results: Vec::new(),
            processed: false,
        }
    }

    /// Precompute the A-only term and the per-B cross-term table.
    pub fn batch_open(&mut self, params: BatchParams, ctx: &EnergyContext) {
        debug_assert!(self.params.is_none());
        self.params = Some(params);

        let wsst = if params.a_masked { &self.wsst_masked } else { &self.wsst };
        self.first_term = wsst.calculate(params.a_left, params.a_top, params.width, params.height);

        // Cross term: correlate 2*(M?)*A against each channel of the image,
        // then subtract from the table.
        for channel in 0..NUM_CHANNELS {
            let spatial = self.fill_reverse(&params, |x, y| {
                let value = 2.0 * ctx.image.data[[y as usize, x as usize]][channel] as f64;
                if params.a_masked && ctx.mask.value(x, y) != MaskValue::Known {
                    0.0
                } else {
                    value
                }
            });
            let mut spectrum = fft2d_forward(&spatial);
            spectrum.zip_mut_with(&self.image_spectra[channel], |a, b| *a *= *b);
            let correlation = ifft2d_inverse(&spectrum);

            if channel == 0 {
                self.apply_correlation(&params, &correlation, |cell, v| *cell = -v);
            } else {
                self.apply_correlation(&params, &correlation, |cell, v| *cell -= v);
            }
        }

        // Masked third term: correlate the mask window against the squared
        // image. The unmasked third term is a table lookup per query instead.
        if params.a_masked {
            for channel in 0..NUM_CHANNELS {
                let spatial = self.fill_reverse(&params, |x, y| {
                    if ctx.mask.value(x, y) == MaskValue::Known {
                        1.0
                    } else {
                        0.0
                    }
                });
                let mut spectrum = fft2d_forward(&spatial);
                spectrum.zip_mut_with(&self.image_sq_spectra[channel], |a, b| *a *= *b);
                let correlation = ifft2d_inverse(&spectrum);
                self.apply_correlation(&params, &correlation, |cell, v| *cell += v);
            }
        }
    }

    pub fn batch_close(&mut self) {
        debug_assert!(self.params.is_some());
        self.params = None;
        self.processed = false;
        self.queued_results.clear();
    }

    /// O(1) per query: the precomputed terms, clamped at zero since the
    /// float round trip can drift slightly negative.
    pub fn calculate(&self, b_left: i32, b_top: i32) -> Energy {
        let params = self.params.as_ref().expect("batch is open");
        debug_assert!(b_left >= 0 && b_top >= 0);
        debug_assert!(b_left + params.width <= self.input_width as i32);
        debug_assert!(b_top + params.height <= self.input_height as i32);

        let mut e = self.first_term + self.second_and_third[[b_top as usize, b_left as usize]];
        if !params.a_masked {
            e += self.wsst.calculate(b_left, b_top, params.width, params.height);
        }
        e.max(ENERGY_MIN)
    }

    /// Queued calculations are computed eagerly; the batch opening already
    /// did the real work.
    pub fn queue(&mut self, b_left: i32, b_top: i32) -> usize {
        debug_assert!(!self.processed);
        let handle = self.queued_results.len();
        self.queued_results.push(self.calculate(b_left, b_top));
        handle
    }

    pub fn process(&mut self) {
        debug_assert!(!self.processed);
        self.processed = true;
    }

    pub fn result(&self, handle: usize) -> Energy {
        debug_assert!(self.processed);
        self.queued_results[handle]
    }

    /// Fill an FFT-sized buffer with the 180-degree-rotated window A so the
    /// spectrum product computes a correlation. The window is clamped to
    /// start inside the image; overhang past the right/bottom shifts the
    /// rotated copy by the overhang amount.
    fn fill_reverse<F: Fn(i32, i32) -> f64>(&self, params: &BatchParams, value_at: F) -> Array2<f64> {
        let mut left = params.a_left;
        let mut top = params.a_top;
        let mut width = params.width.min(self.fft_width as i32);
        let mut height = params.height.min(self.fft_height as i32);

        if left < 0 {
            width += left;
            left = 0;
        }
        if top < 0 {
            height += top;
            top = 0;
        }

        let right = left + width - 1;
        let bottom = top + height - 1;
        let left_padding = (right - (self.input_width as i32 - 1)).max(0);
        let top_padding = (bottom - (self.input_height as i32 - 1)).max(0);

        let mut out = Array2::<f64>::zeros((self.fft_height, self.fft_width));
        let right = right - left_padding;
        let bottom = bottom - top_padding;
        for y in 0..height - top_padding {
            for x in 0..width - left_padding {
                out[[(top_padding + y) as usize, (left_padding + x) as usize]] =
                    value_at(right - x, bottom - y);
            }
        }
        out
    }

    /// Fold one channel's correlation surface into the per-B term table.
    /// Valid B positions read the surface shifted by the window size minus
    /// one, where full-overlap correlations land.
    fn apply_correlation<F: Fn(&mut Energy, Energy)>(
        &mut self,
        params: &BatchParams,
        correlation: &Array2<f64>,
        op: F,
    ) {
        let shift_x = (params.width - 1) as usize;
        let shift_y = (params.height - 1) as usize;
        for y in 0..self.input_height {
            for x in 0..self.input_width {
                let v = correlation[[shift_y + y, shift_x + x]].round() as Energy;
                op(&mut self.second_and_third[[y, x]], v);
            }
        }
    }
}

/// 2D forward FFT with parallel row/column processing for large inputs.
pub(crate) fn fft2d_forward(data: &Array2<f64>) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft_forward(w);
    let fft_col = planner.plan_fft_forward(h);

    let mut result = data.mapv(|v| Complex::new(v, 0.0));

    if h * w >= PARALLEL_FFT_THRESHOLD {
        let processed_rows: Vec<Vec<Complex<f64>>> = (0..h)
            .into_par_iter()
            .map(|row| {
                let mut row_data: Vec<Complex<f64>> = (0..w).map(|c| result[[row, c]]).collect();
                fft_row.process(&mut row_data);
                row_data
            })
            .collect();
        for (row, row_data) in processed_rows.into_iter().enumerate() {
            for (col, val) in row_data.into_iter().enumerate() {
                result[[row, col]] = val;
            }
        }

        let processed_cols: Vec<Vec<Complex<f64>>> = (0..w)
            .into_par_iter()
            .map(|col| {
                let mut col_data: Vec<Complex<f64>> = (0..h).map(|r| result[[r, col]]).collect();
                fft_col.process(&mut col_data);
                col_data
            })
            .collect();
        for (col, col_data) in processed_cols.into_iter().enumerate() {
            for (row, val) in col_data.into_iter().enumerate() {
                result[[row, col]] = val;
            }
        }
    } else {
        for row in 0..h {
            let mut row_data: Vec<Complex<f64>> = (0..w).map(|c| result[[row, c]]).collect();
            fft_row.process(&mut row_data);
            for col in 0..w {
                result[[row, col]] = row_data[col];
            }
        }
        for col in 0..w {
            let mut col_data: Vec<Complex<f64>> = (0..h).map(|r| result[[r, col]]).collect();
            fft_col.process(&mut col_data);
            for row in 0..h {
                result[[row, col]] = col_data[row];
            }
        }
    }

    result
}

/// 2D inverse FFT, returning the real part normalized by `1/(h*w)`.
pub(crate) fn ifft2d_inverse(data: &Array2<Complex<f64>>) -> Array2<f64> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let ifft_row = planner.plan_fft_inverse(w);
    let ifft_col = planner.plan_fft_inverse(h);

    let mut work = data.clone();

    if h * w >= PARALLEL_FFT_THRESHOLD {
        let processed_cols: Vec<Vec<Complex<f64>>> = (0..w)
            .into_par_iter()
            .map(|col| {
                let mut col_data: Vec<Complex<f64>> = (0..h).map(|r| work[[r, col]]).collect();
                ifft_col.process(&mut col_data);
                col_data
            })
            .collect();
        for (col, col_data) in processed_cols.into_iter().enumerate() {
            for (row, val) in col_data.into_iter().enumerate() {
                work[[row, col]] = val;
            }
        }

        let processed_rows: Vec<Vec<Complex<f64>>> = (0..h)
            .into_par_iter()
            .map(|row| {
                let mut row_data: Vec<Complex<f64>> = (0..w).map(|c| work[[row, c]]).collect();
                ifft_row.process(&mut row_data);
                row_data
            })
            .collect();
        for (row, row_data) in processed_rows.into_iter().enumerate() {
            for (col, val) in row_data.into_iter().enumerate() {
                work[[row, col]] = val;
            }
        }
    } else {
        for col in 0..w {
            let mut col_data: Vec<Complex<f64>> = (0..h).map(|r| work[[r, col]]).collect();
            ifft_col.process(&mut col_data);
            for row in 0..h {
                work[[row, col]] = col_data[row];
            }
        }
        for row in 0..h {
            let mut row_data: Vec<Complex<f64>> = (0..w).map(|c| work[[row, c]]).collect();
            ifft_row.process(&mut row_data);
            for col in 0..w {
                work[[row, col]] = row_data[col];
            }
        }
    }

    let scale = 1.0 / (h * w) as f64;
    work.mapv(|v| v.re * scale)
}
