//! Weight and bias injection.
//!
//! Trained values are never baked into the crate. A network builder asks a
//! [`ParamSource`] for every tensor by name while it wires the plan, checks the
//! element count, and borrows the slice for the lifetime of the plan. The
//! same plan type therefore runs against any trained parameter set, and tests
//! run it against synthetic ones.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::{CnnError, CnnResult};

/// One named tensor a network binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    /// Element count; weights are `[out, in, kh, kw]` flattened.
    pub len: usize,
    /// Optional tensors (depthwise biases) read as all-zero when absent.
    pub optional: bool,
}

/// Anything that can hand out named `f32` tensors.
pub trait ParamSource {
    /// The tensor for `spec`, or `None` if this source does not have it.
    /// Length checking is left to the caller.
    fn fetch(&self, spec: &ParamSpec) -> Option<&[f32]>;
}

/// Owned, named tensors. The usual way to inject trained weights.
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    tensors: BTreeMap<String, Vec<f32>>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every spec in `specs` filled with `value`, optional ones included.
    pub fn filled<'a>(specs: impl IntoIterator<Item = &'a ParamSpec>, value: f32) -> Self {
        let mut set = Self::new();
        for spec in specs {
            set.insert(spec.name.clone(), vec![value; spec.len]);
        }
        set
    }

    /// Stores `values` under `name`, returning the previous tensor if any.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f32>) -> Option<Vec<f32>> {
        self.tensors.insert(name.into(), values)
    }

    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.tensors.get(name).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut [f32]> {
        self.tensors.get_mut(name).map(Vec::as_mut_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl ParamSource for ParamSet {
    fn fetch(&self, spec: &ParamSpec) -> Option<&[f32]> {
        self.get(&spec.name)
    }
}

/// Serves every tensor, whatever its name, as a run of one constant value.
///
/// Useful for shape-only builds of full-size networks and for the all-zero
/// regression run, without materializing a full parameter set.
#[derive(Debug, Clone)]
pub struct ConstantParams {
    storage: Vec<f32>,
}

impl ConstantParams {
    /// `max_len` bounds the largest tensor this source can serve.
    pub fn new(value: f32, max_len: usize) -> Self {
        Self {
            storage: vec![value; max_len],
        }
    }

    pub fn zeros(max_len: usize) -> Self {
        Self::new(0.0, max_len)
    }
}

impl ParamSource for ConstantParams {
    fn fetch(&self, spec: &ParamSpec) -> Option<&[f32]> {
        self.storage.get(..spec.len)
    }
}

/// Resolves tensors from a source during plan construction and remembers
/// every spec it was asked for.
pub struct Binder<'w> {
    source: &'w dyn ParamSource,
    bound: Vec<ParamSpec>,
}

impl<'w> Binder<'w> {
    pub fn new(source: &'w dyn ParamSource) -> Self {
        Self {
            source,
            bound: Vec::new(),
        }
    }

    /// A tensor that must be present with exactly `len` values.
    pub fn required(&mut self, name: String, len: usize) -> CnnResult<&'w [f32]> {
        let spec = ParamSpec {
            name,
            len,
            optional: false,
        };
        let source = self.source;
        let values = source.fetch(&spec).ok_or_else(|| CnnError::MissingParameter {
            name: spec.name.clone(),
        })?;
        Self::check(&spec, values)?;
        self.bound.push(spec);
        Ok(values)
    }

    /// A tensor that may be absent; if present it must have `len` values.
    pub fn optional(&mut self, name: String, len: usize) -> CnnResult<Option<&'w [f32]>> {
        let spec = ParamSpec {
            name,
            len,
            optional: true,
        };
        let source = self.source;
        let values = source.fetch(&spec);
        if let Some(values) = values {
            Self::check(&spec, values)?;
        }
        self.bound.push(spec);
        Ok(values)
    }

    fn check(spec: &ParamSpec, values: &[f32]) -> CnnResult<()> {
        if values.len() != spec.len {
            return Err(CnnError::ParameterLength {
                name: spec.name.clone(),
                expected: spec.len,
                actual: values.len(),
            });
        }
        Ok(())
    }

    /// Every tensor requested so far, in request order.
    pub fn into_bound(self) -> Vec<ParamSpec> {
        self.bound
    }
}
