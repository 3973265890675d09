//! Python bindings for tinyconv-core via PyO3.
//!
//! Weights come in as a `dict[str, list[float]]` keyed by parameter name;
//! images go in and logits come out as flat lists in channel-major order.

use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use tinyconv_core::networks::{squeezenet, xception};
use tinyconv_core::{CnnError, ExecutionPlan, ParamSet, Session, Shape, SqueezeNetConfig, XceptionConfig};

fn to_py_err(e: CnnError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Moves the weights to the heap for the life of the process; plans borrow
/// them as `'static`.
fn leak_params(weights: HashMap<String, Vec<f32>>) -> &'static ParamSet {
    let mut params = ParamSet::new();
    for (name, values) in weights {
        params.insert(name, values);
    }
    Box::leak(Box::new(params))
}

fn shape_of((c, h, w): (usize, usize, usize)) -> Shape {
    Shape::new(c, h, w)
}

/// A built network with its own workspace.
#[pyclass]
pub struct PyNetwork {
    session: Session<'static>,
}

impl PyNetwork {
    fn from_plan(plan: ExecutionPlan<'static>) -> Self {
        Self {
            session: Session::new(plan),
        }
    }
}

#[pymethods]
impl PyNetwork {
    /// SqueezeNet v1.1 with the standard fire widths.
    ///
    /// The weights are copied and kept alive until the interpreter exits,
    /// even after this network is dropped; every call costs one full weight
    /// set (about 5 MB for the default widths).
    #[staticmethod]
    #[pyo3(signature = (weights, input_shape=(3, 224, 224), num_classes=10, classifier_relu=true))]
    fn squeezenet(
        weights: HashMap<String, Vec<f32>>,
        input_shape: (usize, usize, usize),
        num_classes: usize,
        classifier_relu: bool,
    ) -> PyResult<Self> {
        let config = SqueezeNetConfig {
            input: shape_of(input_shape),
            num_classes,
            classifier_relu,
            ..SqueezeNetConfig::default()
        };
        let plan = squeezenet::build(&config, leak_params(weights)).map_err(to_py_err)?;
        Ok(Self::from_plan(plan))
    }

    /// Xception with the standard entry/exit widths.
    ///
    /// The weights are copied and kept alive until the interpreter exits,
    /// even after this network is dropped; every call costs one full weight
    /// set (about 90 MB for the default widths).
    #[staticmethod]
    #[pyo3(signature = (
        weights,
        input_shape=(3, 299, 299),
        num_classes=10,
        middle_repeats=8,
        classifier_relu=false
    ))]
    fn xception(
        weights: HashMap<String, Vec<f32>>,
        input_shape: (usize, usize, usize),
        num_classes: usize,
        middle_repeats: usize,
        classifier_relu: bool,
    ) -> PyResult<Self> {
        let config = XceptionConfig {
            input: shape_of(input_shape),
            num_classes,
            middle_repeats,
            classifier_relu,
            ..XceptionConfig::default()
        };
        let plan = xception::build(&config, leak_params(weights)).map_err(to_py_err)?;
        Ok(Self::from_plan(plan))
    }

    /// Forward pass; returns the logits.
    fn run_network(&mut self, image: Vec<f32>) -> PyResult<Vec<f32>> {
        self.session.run_network(&image).map(<[f32]>::to_vec).map_err(to_py_err)
    }

    /// Index of the largest logit.
    fn predict(&mut self, image: Vec<f32>) -> PyResult<usize> {
        self.session.predict(&image).map_err(to_py_err)
    }

    fn input_shape(&self) -> (usize, usize, usize) {
        let s = self.session.plan().input_shape();
        (s.c, s.h, s.w)
    }

    fn output_shape(&self) -> (usize, usize, usize) {
        let s = self.session.plan().output_shape();
        (s.c, s.h, s.w)
    }

    fn workspace_len(&self) -> usize {
        self.session.plan().workspace_len()
    }

    fn num_stages(&self) -> usize {
        self.session.plan().stages().len()
    }

    fn stage_names(&self) -> Vec<String> {
        self.session.plan().stages().iter().map(|s| s.name().to_string()).collect()
    }

    /// `(name, length, optional)` for every tensor the network binds.
    fn parameters(&self) -> Vec<(String, usize, bool)> {
        self.session
            .plan()
            .parameters()
            .iter()
            .map(|p| (p.name.clone(), p.len, p.optional))
            .collect()
    }
}

#[pymodule]
fn tinyconv_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyNetwork>()?;
    Ok(())
}
