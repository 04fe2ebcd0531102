//! Expression tree for output formulas.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FormulaError;

/// Which context a reference is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Extracted field value.
    Input,
    /// Output computed earlier in the same query.
    Calculated,
    /// Query constant (local scope shadows global).
    Variable,
    /// Global constant.
    Constant,
}

impl ReferenceKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "input" => Some(ReferenceKind::Input),
            "calculated" => Some(ReferenceKind::Calculated),
            "variable" => Some(ReferenceKind::Variable),
            "constant" => Some(ReferenceKind::Constant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Input => "Input",
            ReferenceKind::Calculated => "Calculated",
            ReferenceKind::Variable => "Variable",
            ReferenceKind::Constant => "Constant",
        }
    }
}

/// A typed `[Kind:Name#Id]` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub name: String,
    pub id: Option<u32>,
}

impl Reference {
    pub fn new(kind: ReferenceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// Parse the inside of a placeholder, e.g. `Input:Revenue#1`.
    pub fn parse(inner: &str) -> Result<Self, FormulaError> {
        let invalid = || FormulaError::InvalidReference(inner.to_string());

        let (kind, rest) = inner.split_once(':').ok_or_else(invalid)?;
        let kind = ReferenceKind::parse(kind).ok_or_else(invalid)?;

        let (name, id) = match rest.rsplit_once('#') {
            Some((name, id)) => (name, Some(id.trim().parse::<u32>().map_err(|_| invalid())?)),
            None => (rest, None),
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            kind,
            name: name.to_string(),
            id,
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "[{}:{}#{}]", self.kind.as_str(), self.name, id),
            None => write!(f, "[{}:{}]", self.kind.as_str(), self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Pow,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    And,
    Or,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    If,
    Power,
    Sqrt,
    Abs,
    Round,
    Floor,
    Ceil,
    Max,
    Min,
    Sum,
    Avg,
    And,
    Or,
    Not,
}

impl Function {
    /// Look up a function by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name.to_uppercase().as_str() {
            "IF" => Function::If,
            "POWER" => Function::Power,
            "SQRT" => Function::Sqrt,
            "ABS" => Function::Abs,
            "ROUND" => Function::Round,
            "FLOOR" => Function::Floor,
            "CEIL" | "CEILING" => Function::Ceil,
            "MAX" => Function::Max,
            "MIN" => Function::Min,
            "SUM" => Function::Sum,
            "AVG" | "AVERAGE" => Function::Avg,
            "AND" => Function::And,
            "OR" => Function::Or,
            "NOT" => Function::Not,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::If => "IF",
            Function::Power => "POWER",
            Function::Sqrt => "SQRT",
            Function::Abs => "ABS",
            Function::Round => "ROUND",
            Function::Floor => "FLOOR",
            Function::Ceil => "CEIL",
            Function::Max => "MAX",
            Function::Min => "MIN",
            Function::Sum => "SUM",
            Function::Avg => "AVG",
            Function::And => "AND",
            Function::Or => "OR",
            Function::Not => "NOT",
        }
    }

    /// Accepted argument count as (min, max); `None` means variadic.
    fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::If => (3, Some(3)),
            Function::Power => (2, Some(2)),
            Function::Sqrt | Function::Abs | Function::Floor | Function::Ceil | Function::Not => (1, Some(1)),
            Function::Round => (1, Some(2)),
            Function::Max | Function::Min | Function::Sum | Function::Avg | Function::And | Function::Or => {
                (1, None)
            }
        }
    }

    /// Check an argument count against this function's arity.
    pub fn check_arity(&self, found: usize) -> Result<(), FormulaError> {
        let (min, max) = self.arity();
        let ok = found >= min && max.is_none_or(|max| found <= max);
        if ok {
            return Ok(());
        }

        let expected = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{}-{}", min, max),
            None => format!("at least {}", min),
        };
        Err(FormulaError::Arity {
            function: self.name().to_string(),
            expected,
            found,
        })
    }
}

/// A parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Reference(Reference),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// All references in the expression, in source order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a Reference>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Reference(r) => refs.push(r),
            Expr::Unary { operand, .. } => operand.collect_references(refs),
            Expr::Binary { left, right, .. } => {
                left.collect_references(refs);
                right.collect_references(refs);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(refs);
                }
            }
        }
    }
}
