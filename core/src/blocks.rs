//! Parameterized composite-stage constructors.
//!
//! Each function binds its tensors under a name prefix and appends stages to
//! a [`PlanBuilder`]. Networks call them once per repetition with a fresh
//! prefix, so repeated blocks get their own weights.
//!
//! Parameter names, for a prefix `p`:
//! - convolution: `p.weight`, `p.bias`
//! - separable: `p.depthwise.weight`, optional `p.depthwise.bias`,
//!   `p.pointwise.weight`, `p.pointwise.bias`
//! - fire: `p.squeeze.*`, `p.expand1x1.*`, `p.expand3x3.*`
//! - residual stage: `p.shortcut.*`, `p.sep1.*`, `p.sep2.*`
//! - middle-flow stage: `p.sep1.*`, `p.sep2.*`, `p.sep3.*`

use alloc::format;
use alloc::string::{String, ToString};

use crate::arena::BufferId;
use crate::error::CnnResult;
use crate::layers::{Conv2d, DepthwiseConv2d, FireBlock, MaxPool2d, SeparableConv};
use crate::params::Binder;
use crate::plan::{PlanBuilder, TensorRef};
use crate::tensor::Window;

/// `prefix.suffix`, the naming scheme for stages and parameters.
pub(crate) fn join(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{prefix}.{suffix}")
    }
}

/// Channel counts of one fire block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FireSpec {
    pub squeeze: usize,
    pub expand1x1: usize,
    pub expand3x3: usize,
}

impl FireSpec {
    pub const fn new(squeeze: usize, expand1x1: usize, expand3x3: usize) -> Self {
        Self { squeeze, expand1x1, expand3x3 }
    }

    pub const fn out_channels(&self) -> usize {
        self.expand1x1 + self.expand3x3
    }
}

/// Which halves of a separable block apply ReLU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeparableActivation {
    pub depthwise: bool,
    pub pointwise: bool,
}

impl SeparableActivation {
    pub const LINEAR: Self = Self { depthwise: false, pointwise: false };
    pub const POINTWISE: Self = Self { depthwise: false, pointwise: true };
    pub const BOTH: Self = Self { depthwise: true, pointwise: true };
    pub const DEPTHWISE: Self = Self { depthwise: true, pointwise: false };
}

/// Work buffers shared by the residual stages of a network.
#[derive(Debug, Clone, Copy)]
pub struct StageBuffers {
    /// First separable output, later the pooled (or last separable) map.
    pub main: BufferId,
    /// Second separable output.
    pub alt: BufferId,
    /// Projection shortcut output.
    pub shortcut: BufferId,
}

/// Convolution with required weight and bias.
pub fn bind_conv<'w>(
    binder: &mut Binder<'w>,
    prefix: &str,
    in_c: usize,
    out_c: usize,
    window: Window,
    relu: bool,
) -> CnnResult<Conv2d<'w>> {
    let weights = binder.required(join(prefix, "weight"), out_c * in_c * window.taps())?;
    let bias = binder.required(join(prefix, "bias"), out_c)?;
    Conv2d::new(weights, Some(bias), in_c, out_c, window, relu)
}

/// Depthwise convolution with optional bias.
pub fn bind_depthwise<'w>(
    binder: &mut Binder<'w>,
    prefix: &str,
    channels: usize,
    window: Window,
    relu: bool,
) -> CnnResult<DepthwiseConv2d<'w>> {
    let weights = binder.required(join(prefix, "weight"), channels * window.taps())?;
    let bias = binder.optional(join(prefix, "bias"), channels)?;
    DepthwiseConv2d::new(weights, bias, channels, window, relu)
}

/// 3×3 same-padded depthwise followed by a 1×1 pointwise to `out_c`.
pub fn bind_separable<'w>(
    binder: &mut Binder<'w>,
    prefix: &str,
    in_c: usize,
    out_c: usize,
    activation: SeparableActivation,
) -> CnnResult<SeparableConv<'w>> {
    let depthwise = bind_depthwise(
        binder,
        &join(prefix, "depthwise"),
        in_c,
        Window::same(3, 1),
        activation.depthwise,
    )?;
    let pointwise = bind_conv(
        binder,
        &join(prefix, "pointwise"),
        in_c,
        out_c,
        Window::pointwise(),
        activation.pointwise,
    )?;
    SeparableConv::new(depthwise, pointwise)
}

/// Squeeze, dual expand, concat: output channels are the 1×1 branch first,
/// then the 3×3 branch.
pub fn fire_block<'w>(
    plan: &mut PlanBuilder<'w>,
    binder: &mut Binder<'w>,
    name: &str,
    spec: &FireSpec,
    input: TensorRef,
    output: BufferId,
) -> CnnResult<TensorRef> {
    let in_c = input.shape.c;
    let squeeze = bind_conv(
        binder,
        &join(name, "squeeze"),
        in_c,
        spec.squeeze,
        Window::pointwise(),
        true,
    )?;
    let expand1x1 = bind_conv(
        binder,
        &join(name, "expand1x1"),
        spec.squeeze,
        spec.expand1x1,
        Window::pointwise(),
        true,
    )?;
    let expand3x3 = bind_conv(
        binder,
        &join(name, "expand3x3"),
        spec.squeeze,
        spec.expand3x3,
        Window::same(3, 1),
        true,
    )?;
    plan.layer(name, FireBlock::new(squeeze, expand1x1, expand3x3)?, input, output)
}

/// One separable stage writing `output`.
pub fn separable_conv_block<'w>(
    plan: &mut PlanBuilder<'w>,
    binder: &mut Binder<'w>,
    name: &str,
    out_c: usize,
    activation: SeparableActivation,
    input: TensorRef,
    output: BufferId,
) -> CnnResult<TensorRef> {
    let layer = bind_separable(binder, name, input.shape.c, out_c, activation)?;
    plan.layer(name, layer, input, output)
}

/// Downsampling residual stage of the entry and exit flows.
///
/// ```text
/// input ─┬─ sep1 (pw ReLU) ─ sep2 (linear) ─ maxpool 3x3/2 ─┬─ add ─ output
///        └────────────── conv 1x1/2 (linear) ──────────────┘
/// ```
///
/// `output` may be the buffer holding `input`; the input is dead once the
/// shortcut and the first separable have read it.
pub fn residual_stage<'w>(
    plan: &mut PlanBuilder<'w>,
    binder: &mut Binder<'w>,
    name: &str,
    channels: (usize, usize),
    buffers: &StageBuffers,
    input: TensorRef,
    output: BufferId,
) -> CnnResult<TensorRef> {
    let (sep1_c, sep2_c) = channels;
    let in_c = input.shape.c;

    let shortcut_name = join(name, "shortcut");
    let projection = bind_conv(binder, &shortcut_name, in_c, sep2_c, Window::square(1, 2, 0), false)?;
    let shortcut = plan.layer(shortcut_name, projection, input, buffers.shortcut)?;

    let x = separable_conv_block(
        plan,
        binder,
        &join(name, "sep1"),
        sep1_c,
        SeparableActivation::POINTWISE,
        input,
        buffers.main,
    )?;
    let x = separable_conv_block(
        plan,
        binder,
        &join(name, "sep2"),
        sep2_c,
        SeparableActivation::LINEAR,
        x,
        buffers.alt,
    )?;
    // padded so the pooled map lines up with the stride-2 projection
    let x = plan.layer(
        join(name, "pool"),
        MaxPool2d::new(Window::square(3, 2, 1)),
        x,
        buffers.main,
    )?;

    plan.add(join(name, "add"), x, shortcut, output)
}

/// Middle-flow stage: three separables and an identity shortcut.
///
/// ```text
/// input ─┬─ sep1 ─ sep2 ─ sep3 (pw linear) ─┬─ add ─ output
///        └──────────── identity ─────────────┘
/// ```
///
/// `input` must survive until the add, so it may not live in `main` or
/// `alt`, and `output` must differ from the input's buffer.
pub fn middle_flow_stage<'w>(
    plan: &mut PlanBuilder<'w>,
    binder: &mut Binder<'w>,
    name: &str,
    buffers: &StageBuffers,
    input: TensorRef,
    output: BufferId,
) -> CnnResult<TensorRef> {
    let c = input.shape.c;
    let both = SeparableActivation::BOTH;
    let x = separable_conv_block(plan, binder, &join(name, "sep1"), c, both, input, buffers.main)?;
    let x = separable_conv_block(plan, binder, &join(name, "sep2"), c, both, x, buffers.alt)?;
    let last = SeparableActivation::DEPTHWISE;
    let x = separable_conv_block(plan, binder, &join(name, "sep3"), c, last, x, buffers.main)?;
    plan.add(join(name, "add"), x, input, output)
}
