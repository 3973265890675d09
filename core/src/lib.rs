//! # tinyconv-core: statically planned CNN inference
//!
//! A `no_std` library that runs the forward pass of two fixed-topology image
//! classifiers, SqueezeNet v1.1 and Xception, over one `f32` image at a time.
//!
//! ## Architecture
//!
//! - **Primitives** ([`math`]): convolution, depthwise convolution, max and
//!   global-average pooling, elementwise add over flat `C×H×W` slices
//! - **Layers** ([`layers`]): primitives bound to borrowed weights, plus the
//!   fire and separable composites
//! - **Plans** ([`plan`]): a validated stage list over named buffers, sized in
//!   one pass and packed into a single workspace ([`arena`])
//! - **Parameters** ([`params`]): weights are injected by name at build time,
//!   never baked in
//!
//! Heap allocation happens only while a plan is built. Running it never
//! allocates.
//!
//! ## Usage
//!
//! ```
//! use tinyconv_core::networks::squeezenet::{self, SqueezeNetConfig};
//! use tinyconv_core::{ConstantParams, Session, Shape};
//!
//! let config = SqueezeNetConfig {
//!     input: Shape::new(3, 32, 32),
//!     ..SqueezeNetConfig::default()
//! };
//! let params = ConstantParams::zeros(256 * 64 * 9);
//! let plan = squeezenet::build(&config, &params)?;
//!
//! let mut session = Session::new(plan);
//! let logits = session.run_network(&[0.5; 3 * 32 * 32])?;
//! assert_eq!(logits, &[0.0; 10]);
//! # Ok::<(), tinyconv_core::CnnError>(())
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod arena;
pub mod blocks;
pub mod error;
pub mod layers;
pub mod math;
pub mod networks;
pub mod params;
pub mod plan;
pub mod tensor;

pub use arena::{Arena, ArenaLayout, BufferId, BufferSlot};
pub use blocks::{
    fire_block, middle_flow_stage, residual_stage, separable_conv_block, FireSpec, SeparableActivation,
    StageBuffers,
};
pub use error::{CnnError, CnnResult};
pub use layers::{Conv2d, DepthwiseConv2d, FireBlock, GlobalAvgPool, Layer, MaxPool2d, SeparableConv};
pub use math::{
    add, argmax, convolution, depthwise_convolution, global_average_pool, max_pool, pool_output_size,
    relu_in_place,
};
pub use networks::{SqueezeNetConfig, XceptionConfig};
pub use params::{Binder, ConstantParams, ParamSet, ParamSource, ParamSpec};
pub use plan::{ExecutionPlan, PlanBuilder, Session, Stage, TensorRef};
pub use tensor::{conv_output_dim, Shape, Window};
