//! Xception: two stem convolutions, three downsampling residual stages
//! (entry flow), repeated identity-residual stages (middle flow), one more
//! downsampling stage and two wide separables (exit flow), then global
//! average pool and a 1×1 classifier.
//!
//! Buffers: the stream alternates between `a` and `b`; residual stages keep
//! their intermediates in `main`, `alt` and `shortcut`.

use alloc::format;

use crate::blocks::{
    bind_conv, middle_flow_stage, residual_stage, separable_conv_block, SeparableActivation, StageBuffers,
};
use crate::error::CnnResult;
use crate::layers::GlobalAvgPool;
use crate::params::{Binder, ParamSource};
use crate::plan::{ExecutionPlan, PlanBuilder};
use crate::tensor::{Shape, Window};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct XceptionConfig {
    pub input: Shape,
    pub num_classes: usize,
    /// Output channels of the 3×3/2 and 3×3/1 stem convolutions.
    pub stem_channels: [usize; 2],
    /// Output channels of the three entry-flow residual stages.
    pub entry_channels: [usize; 3],
    /// Number of middle-flow stages; each binds its own weights.
    pub middle_repeats: usize,
    /// Separable widths of the exit-flow residual stage.
    pub exit_channels: [usize; 2],
    /// The two separables between the exit stage and the pool.
    pub head_channels: [usize; 2],
    /// ReLU on the classifier output.
    pub classifier_relu: bool,
}

impl Default for XceptionConfig {
    fn default() -> Self {
        Self {
            input: Shape::new(3, 299, 299),
            num_classes: 10,
            stem_channels: [32, 64],
            entry_channels: [128, 256, 728],
            middle_repeats: 8,
            exit_channels: [728, 1024],
            head_channels: [1536, 2048],
            classifier_relu: false,
        }
    }
}

/// Wires the network and binds every tensor from `params`.
///
/// Stage and parameter prefixes: `entry.conv1`, `entry.conv2`,
/// `entry.block1` .. `entry.block3`, `middle.block4` onwards, then
/// `exit.block{n}`, `exit.sep1`, `exit.sep2` and `classifier`. Blocks are
/// numbered across the flows, so with the default eight middle stages the
/// exit stage is `exit.block12`.
pub fn build<'w>(config: &XceptionConfig, params: &'w dyn ParamSource) -> CnnResult<ExecutionPlan<'w>> {
    let mut plan = PlanBuilder::new(config.input);
    let mut binder = Binder::new(params);
    let a = plan.buffer("a");
    let b = plan.buffer("b");
    let buffers = StageBuffers {
        main: plan.buffer("main"),
        alt: plan.buffer("alt"),
        shortcut: plan.buffer("shortcut"),
    };
    let [stem1, stem2] = config.stem_channels;

    // entry flow
    let conv1 = bind_conv(&mut binder, "entry.conv1", config.input.c, stem1, Window::square(3, 2, 1), true)?;
    let x = plan.layer("entry.conv1", conv1, plan.input(), a)?;
    let conv2 = bind_conv(&mut binder, "entry.conv2", stem1, stem2, Window::same(3, 1), true)?;
    let mut x = plan.layer("entry.conv2", conv2, x, b)?;

    let mut block = 0;
    for &c in &config.entry_channels {
        block += 1;
        let name = format!("entry.block{block}");
        x = residual_stage(&mut plan, &mut binder, &name, (c, c), &buffers, x, b)?;
    }

    // middle flow
    for _ in 0..config.middle_repeats {
        block += 1;
        let target = if x.buffer() == Some(a) { b } else { a };
        let name = format!("middle.block{block}");
        x = middle_flow_stage(&mut plan, &mut binder, &name, &buffers, x, target)?;
    }

    // exit flow
    block += 1;
    let [exit1, exit2] = config.exit_channels;
    let stream = x.buffer().unwrap_or(b);
    let name = format!("exit.block{block}");
    x = residual_stage(&mut plan, &mut binder, &name, (exit1, exit2), &buffers, x, stream)?;

    let [head1, head2] = config.head_channels;
    let both = SeparableActivation::BOTH;
    x = separable_conv_block(&mut plan, &mut binder, "exit.sep1", head1, both, x, buffers.main)?;
    x = separable_conv_block(&mut plan, &mut binder, "exit.sep2", head2, both, x, buffers.alt)?;
    x = plan.layer("exit.gap", GlobalAvgPool, x, buffers.main)?;

    let classifier = bind_conv(
        &mut binder,
        "classifier",
        head2,
        config.num_classes,
        Window::pointwise(),
        config.classifier_relu,
    )?;
    let logits = plan.layer("classifier", classifier, x, stream)?;

    plan.finish(logits, binder.into_bound())
}
