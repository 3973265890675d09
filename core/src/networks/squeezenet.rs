//! SqueezeNet v1.1: a strided stem, eight fire blocks with three pools
//! between them, a 1×1 classifier and a global average pool.
//!
//! Feature maps ping-pong between two buffers, `a` and `b`; fire blocks use
//! the plan's shared scratch buffer for their squeeze output.

use alloc::format;

use crate::blocks::{bind_conv, fire_block, FireSpec};
use crate::error::CnnResult;
use crate::layers::{GlobalAvgPool, MaxPool2d};
use crate::params::{Binder, ParamSource};
use crate::plan::{ExecutionPlan, PlanBuilder};
use crate::tensor::{Shape, Window};

/// Fires after which a 3×3/2 max pool follows (0-based into `fires`).
const POOL_AFTER: [usize; 2] = [2, 6];

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SqueezeNetConfig {
    pub input: Shape,
    pub num_classes: usize,
    /// Output channels of the 3×3/2 stem convolution.
    pub stem_channels: usize,
    /// fire2 through fire9.
    pub fires: [FireSpec; 8],
    /// ReLU on the 1×1 classifier before the pool.
    pub classifier_relu: bool,
}

impl Default for SqueezeNetConfig {
    fn default() -> Self {
        Self {
            input: Shape::new(3, 224, 224),
            num_classes: 10,
            stem_channels: 64,
            fires: [
                FireSpec::new(16, 64, 64),
                FireSpec::new(16, 64, 64),
                FireSpec::new(32, 128, 128),
                FireSpec::new(32, 128, 128),
                FireSpec::new(48, 192, 192),
                FireSpec::new(48, 192, 192),
                FireSpec::new(64, 256, 256),
                FireSpec::new(64, 256, 256),
            ],
            classifier_relu: true,
        }
    }
}

/// Wires the network and binds every tensor from `params`.
///
/// Parameters: `conv1.{weight,bias}`, `fire2` .. `fire9` (see
/// [`fire_block`]), `conv10.{weight,bias}`.
pub fn build<'w>(config: &SqueezeNetConfig, params: &'w dyn ParamSource) -> CnnResult<ExecutionPlan<'w>> {
    let mut plan = PlanBuilder::new(config.input);
    let mut binder = Binder::new(params);
    let a = plan.buffer("a");
    let b = plan.buffer("b");

    let conv1 = bind_conv(
        &mut binder,
        "conv1",
        config.input.c,
        config.stem_channels,
        Window::square(3, 2, 0),
        true,
    )?;
    let mut x = plan.layer("conv1", conv1, plan.input(), a)?;
    x = plan.layer("pool1", MaxPool2d::square(3, 2), x, b)?;

    let mut pools = 1;
    for (i, spec) in config.fires.iter().enumerate() {
        let name = format!("fire{}", i + 2);
        let target = if x.buffer() == Some(a) { b } else { a };
        x = fire_block(&mut plan, &mut binder, &name, spec, x, target)?;
        if POOL_AFTER.contains(&i) {
            pools += 1;
            let target = if x.buffer() == Some(a) { b } else { a };
            x = plan.layer(format!("pool{pools}"), MaxPool2d::square(3, 2), x, target)?;
        }
    }

    let target = if x.buffer() == Some(a) { b } else { a };
    let conv10 = bind_conv(
        &mut binder,
        "conv10",
        x.shape.c,
        config.num_classes,
        Window::pointwise(),
        config.classifier_relu,
    )?;
    x = plan.layer("conv10", conv10, x, target)?;

    let target = if x.buffer() == Some(a) { b } else { a };
    let logits = plan.layer("gap", GlobalAvgPool, x, target)?;

    plan.finish(logits, binder.into_bound())
}
