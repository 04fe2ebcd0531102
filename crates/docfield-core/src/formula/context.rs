//! Value contexts that formula references are resolved against.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::ast::{Reference, ReferenceKind};
use crate::models::query::{ConstantScope, Query, QueryConstant};

/// Values available to formulas before any output is computed.
///
/// Formulas only ever read this context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputContext {
    /// Extracted field values.
    #[serde(default)]
    pub fields: BTreeMap<String, f64>,

    /// Query-local constants.
    #[serde(default)]
    pub variables: BTreeMap<String, f64>,

    /// Global constants.
    #[serde(default)]
    pub constants: BTreeMap<String, f64>,
}

impl InputContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: f64) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    /// Build the input context for a query run.
    ///
    /// Query constants with local scope become variables; global-scope query
    /// constants and the supplied global constants become constants.
    pub fn for_query(query: &Query, fields: &HashMap<String, f64>, globals: &[&QueryConstant]) -> Self {
        let mut context = Self {
            fields: fields.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            ..Self::default()
        };

        for constant in globals {
            context.constants.insert(constant.name.clone(), constant.default_value);
        }

        for constant in &query.constants {
            match constant.scope {
                ConstantScope::Local => {
                    context.variables.insert(constant.name.clone(), constant.default_value);
                }
                ConstantScope::Global => {
                    context
                        .constants
                        .entry(constant.name.clone())
                        .or_insert(constant.default_value);
                }
            }
        }

        context
    }
}

/// Outputs computed so far in a query run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculatedContext {
    values: BTreeMap<String, f64>,
}

impl CalculatedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolves references to values.
pub trait ReferenceResolver {
    fn resolve(&self, reference: &Reference) -> Option<f64>;
}

/// The `{inputs, calculated}` pair a formula is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub inputs: &'a InputContext,
    pub calculated: &'a CalculatedContext,
}

impl<'a> Scope<'a> {
    pub fn new(inputs: &'a InputContext, calculated: &'a CalculatedContext) -> Self {
        Self { inputs, calculated }
    }
}

impl ReferenceResolver for Scope<'_> {
    fn resolve(&self, reference: &Reference) -> Option<f64> {
        let name = reference.name.as_str();
        match reference.kind {
            ReferenceKind::Input => self.inputs.fields.get(name).copied(),
            ReferenceKind::Calculated => self.calculated.get(name),
            ReferenceKind::Variable => self
                .inputs
                .variables
                .get(name)
                .or_else(|| self.inputs.constants.get(name))
                .copied(),
            ReferenceKind::Constant => self.inputs.constants.get(name).copied(),
        }
    }
}
