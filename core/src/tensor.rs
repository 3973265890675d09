//! Feature-map shapes and sliding-window geometry.
//!
//! A feature map is stored flat in channel-major order:
//! `index = channel * H * W + row * W + col`. Vectors (the output of global
//! average pooling, logits) are maps of shape `(C, 1, 1)`, which lets a 1×1
//! convolution act as a fully connected projection without a special case.

use core::fmt;

use crate::error::{CnnError, CnnResult};

/// (Channels, Height, Width) of one feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shape {
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl Shape {
    pub const fn new(c: usize, h: usize, w: usize) -> Self {
        Self { c, h, w }
    }

    /// A length-`n` vector, i.e. `n` channels of 1×1.
    pub const fn vector(n: usize) -> Self {
        Self { c: n, h: 1, w: 1 }
    }

    /// Elements in one channel plane.
    #[inline(always)]
    pub const fn plane(&self) -> usize {
        self.h * self.w
    }

    /// Total element count.
    #[inline(always)]
    pub const fn total(&self) -> usize {
        self.c * self.h * self.w
    }

    /// Same spatial extent, different channel count.
    pub const fn with_channels(&self, c: usize) -> Self {
        Self { c, h: self.h, w: self.w }
    }

    #[inline(always)]
    pub const fn index(&self, c: usize, row: usize, col: usize) -> usize {
        c * self.h * self.w + row * self.w + col
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.c, self.h, self.w)
    }
}

/// Kernel size, stride and zero padding of a sliding window, per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Window {
    pub kh: usize,
    pub kw: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
}

impl Window {
    pub const fn new(
        kh: usize,
        kw: usize,
        stride_h: usize,
        stride_w: usize,
        pad_h: usize,
        pad_w: usize,
    ) -> Self {
        Self { kh, kw, stride_h, stride_w, pad_h, pad_w }
    }

    /// `k`×`k` window with equal stride and padding on both axes.
    pub const fn square(k: usize, stride: usize, pad: usize) -> Self {
        Self::new(k, k, stride, stride, pad, pad)
    }

    /// Padding `(k - 1) / 2`: preserves H and W at stride 1 for odd `k`.
    pub const fn same(k: usize, stride: usize) -> Self {
        Self::square(k, stride, (k - 1) / 2)
    }

    /// 1×1, stride 1, no padding.
    pub const fn pointwise() -> Self {
        Self::square(1, 1, 0)
    }

    /// Output spatial size for an input of `in_h`×`in_w`.
    ///
    /// Rejects a zero stride, a zero-sized kernel and a kernel that does not
    /// fit into the padded input. Padding may exceed the kernel; windows that
    /// lie wholly in the padding have no taps.
    pub fn output_hw(&self, stage: &str, in_h: usize, in_w: usize) -> CnnResult<(usize, usize)> {
        if self.stride_h == 0 || self.stride_w == 0 {
            return Err(CnnError::window(stage, "stride must be non-zero"));
        }
        if self.kh == 0 || self.kw == 0 {
            return Err(CnnError::window(stage, "kernel must be non-empty"));
        }
        let out_h = conv_output_dim(in_h, self.kh, self.stride_h, self.pad_h)
            .ok_or_else(|| CnnError::window(stage, "kernel taller than padded input"))?;
        let out_w = conv_output_dim(in_w, self.kw, self.stride_w, self.pad_w)
            .ok_or_else(|| CnnError::window(stage, "kernel wider than padded input"))?;
        Ok((out_h, out_w))
    }

    /// Output shape with `out_c` channels.
    pub fn output_shape(&self, stage: &str, input: Shape, out_c: usize) -> CnnResult<Shape> {
        let (h, w) = self.output_hw(stage, input.h, input.w)?;
        Ok(Shape::new(out_c, h, w))
    }

    /// Like [`Window::output_hw`], but every window must overlap the input:
    /// padding has to be smaller than the kernel on both axes.
    pub fn pool_output_hw(&self, stage: &str, in_h: usize, in_w: usize) -> CnnResult<(usize, usize)> {
        if self.pad_h >= self.kh || self.pad_w >= self.kw {
            return Err(CnnError::window(stage, "padding must be smaller than the kernel"));
        }
        self.output_hw(stage, in_h, in_w)
    }

    /// Pooling output shape; channels are preserved.
    pub fn pool_output_shape(&self, stage: &str, input: Shape) -> CnnResult<Shape> {
        let (h, w) = self.pool_output_hw(stage, input.h, input.w)?;
        Ok(Shape::new(input.c, h, w))
    }

    #[inline(always)]
    pub const fn taps(&self) -> usize {
        self.kh * self.kw
    }
}

/// `floor((input - kernel + 2 * pad) / stride) + 1`, or `None` when the kernel
/// does not fit or the stride is zero.
///
/// ```
/// use tinyconv_core::conv_output_dim;
/// // 224 input, 3x3 kernel, stride 2, no padding: 111, not 112.
/// assert_eq!(conv_output_dim(224, 3, 2, 0), Some(111));
/// ```
pub const fn conv_output_dim(input: usize, kernel: usize, stride: usize, pad: usize) -> Option<usize> {
    let padded = input + 2 * pad;
    if stride == 0 || kernel == 0 || kernel > padded {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}
