//! Formula language for query outputs.
//!
//! Formulas are parsed once into an [`Expr`] tree and evaluated recursively.
//! References use the `[Kind:Name#Id]` form (`#Id` optional) and resolve
//! against an [`InputContext`] or the [`CalculatedContext`] of outputs
//! computed earlier in the same run.

pub mod ast;
mod calculator;
mod context;
mod eval;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expr, Function, Reference, ReferenceKind, UnaryOp};
pub use calculator::{CalculationResult, FormulaOutcome, QueryCalculator};
pub use context::{CalculatedContext, InputContext, ReferenceResolver, Scope};
pub use eval::{evaluate, Evaluator};
pub use parser::parse;
