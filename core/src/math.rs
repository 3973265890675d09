//! f32 tensor primitives over flat channel-major buffers.
//!
//! Each primitive checks buffer lengths and window geometry once on entry and
//! then runs loops that only branch on padding. Output channel planes never
//! depend on each other, so with the `parallel` feature they are handed to the
//! rayon pool; the per-plane code is the same either way, which keeps results
//! bit-identical between the two builds.

use core::ops::Range;

use crate::error::{CnnError, CnnResult};
use crate::tensor::{Shape, Window};

// =============================================================================
// Helpers
// =============================================================================

/// Runs `f(channel, plane)` for every `plane`-sized chunk of `output`.
#[inline]
fn for_each_plane<F>(output: &mut [f32], plane: usize, f: F)
where
    F: Fn(usize, &mut [f32]) + Send + Sync,
{
    if plane == 0 {
        return;
    }

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        output
            .par_chunks_mut(plane)
            .enumerate()
            .for_each(|(c, out)| f(c, out));
    }

    #[cfg(not(feature = "parallel"))]
    {
        output
            .chunks_mut(plane)
            .enumerate()
            .for_each(|(c, out)| f(c, out));
    }
}

/// Kernel taps `k` of one axis whose input coordinate `base + k - pad` lands
/// inside `[0, extent)`.
#[inline(always)]
fn valid_taps(base: usize, pad: usize, extent: usize, kernel: usize) -> Range<usize> {
    let lo = pad.saturating_sub(base);
    let hi = (extent + pad).saturating_sub(base).min(kernel);
    lo..hi.max(lo)
}

fn check_len(what: Shape, actual: usize) -> CnnResult<()> {
    if what.total() != actual {
        return Err(CnnError::InvalidInputLength {
            expected: what.total(),
            actual,
        });
    }
    Ok(())
}

fn check_param(name: &str, expected: usize, actual: usize) -> CnnResult<()> {
    if expected != actual {
        return Err(CnnError::ParameterLength {
            name: name.into(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_output_shape(stage: &str, window: &Window, input: Shape, output: Shape) -> CnnResult<()> {
    let expected = window.output_shape(stage, input, output.c)?;
    if expected != output {
        return Err(CnnError::shape(stage, expected, output));
    }
    Ok(())
}

/// Clamp every element to `max(0, x)`.
#[inline]
pub fn relu_in_place(data: &mut [f32]) {
    for val in data.iter_mut() {
        if *val < 0.0 {
            *val = 0.0;
        }
    }
}

// =============================================================================
// Convolution
// =============================================================================

/// Standard 2D convolution with implicit zero padding.
///
/// `weights` is `[out_c, in_c, kh, kw]` flattened; `biases`, when present, has
/// `out_c` entries. For every `(oc, oh, ow)`:
///
/// ```text
/// out = bias[oc] + Σ_ic Σ_kh Σ_kw in[ic, oh*sh + kh - ph, ow*sw + kw - pw] * w[oc, ic, kh, kw]
/// ```
///
/// where taps outside the input contribute nothing.
#[allow(clippy::too_many_arguments)]
pub fn convolution(
    input: &[f32],
    in_shape: Shape,
    weights: &[f32],
    biases: Option<&[f32]>,
    output: &mut [f32],
    out_shape: Shape,
    window: Window,
    apply_relu: bool,
) -> CnnResult<()> {
    const STAGE: &str = "convolution";
    check_len(in_shape, input.len())?;
    check_len(out_shape, output.len())?;
    check_output_shape(STAGE, &window, in_shape, out_shape)?;
    let per_filter = in_shape.c * window.taps();
    check_param("convolution.weight", out_shape.c * per_filter, weights.len())?;
    if let Some(b) = biases {
        check_param("convolution.bias", out_shape.c, b.len())?;
    }

    let in_plane = in_shape.plane();
    let taps = window.taps();

    for_each_plane(output, out_shape.plane(), |oc, plane| {
        let bias = biases.map_or(0.0, |b| b[oc]);
        let filter = &weights[oc * per_filter..(oc + 1) * per_filter];

        for oh in 0..out_shape.h {
            let base_h = oh * window.stride_h;
            let rows = valid_taps(base_h, window.pad_h, in_shape.h, window.kh);
            for ow in 0..out_shape.w {
                let base_w = ow * window.stride_w;
                let cols = valid_taps(base_w, window.pad_w, in_shape.w, window.kw);

                let mut sum = bias;
                for ic in 0..in_shape.c {
                    let channel = &input[ic * in_plane..(ic + 1) * in_plane];
                    let kernel = &filter[ic * taps..(ic + 1) * taps];
                    for kh in rows.clone() {
                        let ih = base_h + kh - window.pad_h;
                        let row = &channel[ih * in_shape.w..(ih + 1) * in_shape.w];
                        let krow = &kernel[kh * window.kw..(kh + 1) * window.kw];
                        for kw in cols.clone() {
                            sum += row[base_w + kw - window.pad_w] * krow[kw];
                        }
                    }
                }

                plane[oh * out_shape.w + ow] = if apply_relu { sum.max(0.0) } else { sum };
            }
        }
    });

    Ok(())
}

/// Depthwise convolution: channel `c` of the output only sees channel `c` of
/// the input and filter `weights[c, 0, :, :]`.
#[allow(clippy::too_many_arguments)]
pub fn depthwise_convolution(
    input: &[f32],
    in_shape: Shape,
    weights: &[f32],
    biases: Option<&[f32]>,
    output: &mut [f32],
    out_shape: Shape,
    window: Window,
    apply_relu: bool,
) -> CnnResult<()> {
    const STAGE: &str = "depthwise_convolution";
    check_len(in_shape, input.len())?;
    check_len(out_shape, output.len())?;
    if in_shape.c != out_shape.c {
        return Err(CnnError::shape(STAGE, out_shape.with_channels(in_shape.c), out_shape));
    }
    check_output_shape(STAGE, &window, in_shape, out_shape)?;
    let taps = window.taps();
    check_param("depthwise_convolution.weight", in_shape.c * taps, weights.len())?;
    if let Some(b) = biases {
        check_param("depthwise_convolution.bias", in_shape.c, b.len())?;
    }

    let in_plane = in_shape.plane();

    for_each_plane(output, out_shape.plane(), |c, plane| {
        let bias = biases.map_or(0.0, |b| b[c]);
        let channel = &input[c * in_plane..(c + 1) * in_plane];
        let kernel = &weights[c * taps..(c + 1) * taps];

        for oh in 0..out_shape.h {
            let base_h = oh * window.stride_h;
            let rows = valid_taps(base_h, window.pad_h, in_shape.h, window.kh);
            for ow in 0..out_shape.w {
                let base_w = ow * window.stride_w;
                let cols = valid_taps(base_w, window.pad_w, in_shape.w, window.kw);

                let mut sum = bias;
                for kh in rows.clone() {
                    let ih = base_h + kh - window.pad_h;
                    for kw in cols.clone() {
                        let iw = base_w + kw - window.pad_w;
                        sum += channel[ih * in_shape.w + iw] * kernel[kh * window.kw + kw];
                    }
                }

                plane[oh * out_shape.w + ow] = if apply_relu { sum.max(0.0) } else { sum };
            }
        }
    });

    Ok(())
}

// =============================================================================
// Pooling
// =============================================================================

/// Max pooling. Window positions outside the input (including padded ones)
/// are left out of the maximum instead of being read as zero.
pub fn max_pool(
    input: &[f32],
    in_shape: Shape,
    output: &mut [f32],
    out_shape: Shape,
    window: Window,
) -> CnnResult<()> {
    const STAGE: &str = "max_pool";
    check_len(in_shape, input.len())?;
    check_len(out_shape, output.len())?;
    if in_shape.c != out_shape.c {
        return Err(CnnError::shape(STAGE, out_shape.with_channels(in_shape.c), out_shape));
    }
    let expected = window.pool_output_shape(STAGE, in_shape)?;
    if expected != out_shape {
        return Err(CnnError::shape(STAGE, expected, out_shape));
    }

    let in_plane = in_shape.plane();

    for_each_plane(output, out_shape.plane(), |c, plane| {
        let channel = &input[c * in_plane..(c + 1) * in_plane];

        for oh in 0..out_shape.h {
            let base_h = oh * window.stride_h;
            let rows = valid_taps(base_h, window.pad_h, in_shape.h, window.kh);
            for ow in 0..out_shape.w {
                let base_w = ow * window.stride_w;
                let cols = valid_taps(base_w, window.pad_w, in_shape.w, window.kw);

                let mut max_val = f32::NEG_INFINITY;
                for kh in rows.clone() {
                    let ih = base_h + kh - window.pad_h;
                    for kw in cols.clone() {
                        let val = channel[ih * in_shape.w + base_w + kw - window.pad_w];
                        if val > max_val {
                            max_val = val;
                        }
                    }
                }

                plane[oh * out_shape.w + ow] = max_val;
            }
        }
    });

    Ok(())
}

/// Output size of a pooling window; same formula as convolution, but the
/// padding must be smaller than the kernel.
pub fn pool_output_size(in_h: usize, in_w: usize, window: &Window) -> CnnResult<(usize, usize)> {
    window.pool_output_hw("max_pool", in_h, in_w)
}

/// Mean of every channel plane. `output` has one entry per channel.
pub fn global_average_pool(input: &[f32], in_shape: Shape, output: &mut [f32]) -> CnnResult<()> {
    const STAGE: &str = "global_average_pool";
    check_len(in_shape, input.len())?;
    check_len(Shape::vector(in_shape.c), output.len())?;

    let plane = in_shape.plane();
    if plane == 0 {
        return Err(CnnError::shape(STAGE, Shape::new(in_shape.c, 1, 1), in_shape));
    }
    let scale = plane as f32;

    for (out, channel) in output.iter_mut().zip(input.chunks_exact(plane)) {
        let sum: f32 = channel.iter().sum();
        *out = sum / scale;
    }

    Ok(())
}

// =============================================================================
// Elementwise
// =============================================================================

/// `result[i] = a[i] + b[i]`. No activation.
pub fn add(a: &[f32], b: &[f32], result: &mut [f32]) -> CnnResult<()> {
    if a.len() != b.len() {
        return Err(CnnError::InvalidInputLength {
            expected: a.len(),
            actual: b.len(),
        });
    }
    if result.len() != a.len() {
        return Err(CnnError::InvalidInputLength {
            expected: a.len(),
            actual: result.len(),
        });
    }

    for ((r, &x), &y) in result.iter_mut().zip(a).zip(b) {
        *r = x + y;
    }
    Ok(())
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(data: &[f32]) -> CnnResult<usize> {
    if data.is_empty() {
        return Err(CnnError::InvalidInputLength {
            expected: 1,
            actual: 0,
        });
    }

    let mut best = 0;
    for (i, &val) in data.iter().enumerate().skip(1) {
        if val > data[best] {
            best = i;
        }
    }
    Ok(best)
}
