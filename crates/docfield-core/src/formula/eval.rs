//! Recursive evaluation of expression trees.

use super::ast::{BinaryOp, Expr, Function, Reference, UnaryOp};
use super::context::ReferenceResolver;
use crate::error::FormulaError;

fn truthy(value: f64) -> bool {
    value != 0.0
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// Evaluates an expression, recording references that did not resolve.
///
/// Unresolved references evaluate to 0.
pub struct Evaluator<'a, R: ReferenceResolver + ?Sized> {
    resolver: &'a R,
    unresolved: Vec<Reference>,
}

impl<'a, R: ReferenceResolver + ?Sized> Evaluator<'a, R> {
    pub fn new(resolver: &'a R) -> Self {
        Self {
            resolver,
            unresolved: Vec::new(),
        }
    }

    /// References that fell back to 0, in evaluation order.
    pub fn unresolved(&self) -> &[Reference] {
        &self.unresolved
    }

    pub fn into_unresolved(self) -> Vec<Reference> {
        self.unresolved
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<f64, FormulaError> {
        let value = self.eval(expr)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(FormulaError::NonFinite)
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<f64, FormulaError> {
        match expr {
            Expr::Literal(value) => Ok(*value),
            Expr::Reference(reference) => Ok(self.lookup(reference)),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Neg => -value,
                    UnaryOp::Plus => value,
                    UnaryOp::Not => flag(!truthy(value)),
                })
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::Call { function, args } => self.eval_call(*function, args),
        }
    }

    fn lookup(&mut self, reference: &Reference) -> f64 {
        match self.resolver.resolve(reference) {
            Some(value) => value,
            None => {
                if !self.unresolved.contains(reference) {
                    self.unresolved.push(reference.clone());
                }
                0.0
            }
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<f64, FormulaError> {
        // Logical operators short-circuit
        match op {
            BinaryOp::And => {
                let l = self.eval(left)?;
                return Ok(flag(truthy(l) && truthy(self.eval(right)?)));
            }
            BinaryOp::Or => {
                let l = self.eval(left)?;
                return Ok(flag(truthy(l) || truthy(self.eval(right)?)));
            }
            _ => {}
        }

        let l = self.eval(left)?;
        let r = self.eval(right)?;

        let value = match op {
            BinaryOp::Pow => l.powf(r),
            BinaryOp::Mul => l * r,
            BinaryOp::Div => {
                if r == 0.0 {
                    return Err(FormulaError::DivisionByZero);
                }
                l / r
            }
            BinaryOp::Mod => {
                if r == 0.0 {
                    return Err(FormulaError::DivisionByZero);
                }
                l % r
            }
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Gt => flag(l > r),
            BinaryOp::Lt => flag(l < r),
            BinaryOp::Ge => flag(l >= r),
            BinaryOp::Le => flag(l <= r),
            BinaryOp::Eq => flag(l == r),
            BinaryOp::Ne => flag(l != r),
            BinaryOp::And => flag(truthy(l) && truthy(r)),
            BinaryOp::Or => flag(truthy(l) || truthy(r)),
        };
        Ok(value)
    }

    fn eval_call(&mut self, function: Function, args: &[Expr]) -> Result<f64, FormulaError> {
        function.check_arity(args.len())?;

        if function == Function::If {
            // Only the selected branch is evaluated
            let condition = self.eval(&args[0])?;
            let branch = if truthy(condition) { &args[1] } else { &args[2] };
            return self.eval(branch);
        }

        let values = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<f64>, FormulaError>>()?;
        let first = values[0];

        let value = match function {
            Function::If => unreachable!("IF returns before its arguments are evaluated"),
            Function::Power => first.powf(values[1]),
            Function::Sqrt => {
                if first < 0.0 {
                    return Err(FormulaError::Domain {
                        function: function.name().to_string(),
                        value: first,
                    });
                }
                first.sqrt()
            }
            Function::Abs => first.abs(),
            Function::Round => {
                let digits = values.get(1).copied().unwrap_or(0.0);
                if !digits.is_finite() {
                    return Err(FormulaError::Domain {
                        function: function.name().to_string(),
                        value: digits,
                    });
                }
                round_to(first, digits.trunc() as i32)
            }
            Function::Floor => first.floor(),
            Function::Ceil => first.ceil(),
            Function::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Function::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Function::Sum => values.iter().sum(),
            Function::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Function::And => flag(values.iter().all(|v| truthy(*v))),
            Function::Or => flag(values.iter().any(|v| truthy(*v))),
            Function::Not => flag(!truthy(first)),
        };
        Ok(value)
    }
}

/// Round half away from zero to `digits` decimal places (negative rounds
/// to tens, hundreds, ...).
fn round_to(value: f64, digits: i32) -> f64 {
    if digits >= 0 {
        let factor = 10f64.powi(digits);
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-digits);
        (value / factor).round() * factor
    }
}

/// Evaluate an expression, returning the value and any unresolved references.
pub fn evaluate<R: ReferenceResolver + ?Sized>(
    expr: &Expr,
    resolver: &R,
) -> (Result<f64, FormulaError>, Vec<Reference>) {
    let mut evaluator = Evaluator::new(resolver);
    let result = evaluator.evaluate(expr);
    (result, evaluator.into_unresolved())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::context::{CalculatedContext, InputContext, Scope};
    use crate::formula::parser::parse;

    fn eval_with(source: &str, inputs: &InputContext) -> Result<f64, FormulaError> {
        let calculated = CalculatedContext::new();
        let scope = Scope::new(inputs, &calculated);
        evaluate(&parse(source)?, &scope).0
    }

    fn eval(source: &str) -> Result<f64, FormulaError> {
        eval_with(source, &InputContext::new())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Ok(7.0));
        assert_eq!(eval("(1 + 2) * 3"), Ok(9.0));
        assert_eq!(eval("2 ^ 3 ^ 2"), Ok(512.0));
        assert_eq!(eval("-2 ^ 2"), Ok(-4.0));
        assert_eq!(eval("10 % 4"), Ok(2.0));
        assert_eq!(eval("+5 - -5"), Ok(10.0));
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval("3 > 2"), Ok(1.0));
        assert_eq!(eval("3 <> 3"), Ok(0.0));
        assert_eq!(eval("2 = 2 && 1 != 2"), Ok(1.0));
        assert_eq!(eval("0 || !0"), Ok(1.0));
        assert_eq!(eval("AND(1, 2, 0)"), Ok(0.0));
        assert_eq!(eval("OR(0, 0, 3)"), Ok(1.0));
        assert_eq!(eval("NOT(5)"), Ok(0.0));
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("ROUND(3.14159, 2)"), Ok(3.14));
        assert_eq!(eval("SQRT(16)"), Ok(4.0));
        assert_eq!(eval("MAX(5,3,9)"), Ok(9.0));
        assert_eq!(eval("MIN(5,3,9)"), Ok(3.0));
        assert_eq!(eval("SUM(1, 2, 3)"), Ok(6.0));
        assert_eq!(eval("AVERAGE(1, 2, 3)"), Ok(2.0));
        assert_eq!(eval("power(2, 10)"), Ok(1024.0));
        assert_eq!(eval("ABS(-2.5)"), Ok(2.5));
        assert_eq!(eval("FLOOR(2.7) + CEILING(2.1)"), Ok(5.0));
        assert_eq!(eval("ROUND(2.5)"), Ok(3.0));
        assert_eq!(eval("ROUND(1234, -2)"), Ok(1200.0));
    }

    #[test]
    fn test_if_is_lazy() {
        let inputs = InputContext::new().with_field("Revenue", 1500.0);
        let formula = "IF([Input:Revenue#1] > 1000, [Input:Revenue#1], 0)";
        assert_eq!(eval_with(formula, &inputs), Ok(1500.0));

        let inputs = InputContext::new().with_field("Revenue", 500.0);
        assert_eq!(eval_with(formula, &inputs), Ok(0.0));

        // the division by zero sits in the branch that is not taken
        assert_eq!(eval("IF(1, 7, 1 / 0)"), Ok(7.0));
    }

    #[test]
    fn test_errors() {
        assert_eq!(eval("1 / 0"), Err(FormulaError::DivisionByZero));
        assert_eq!(eval("5 % 0"), Err(FormulaError::DivisionByZero));
        assert!(matches!(eval("SQRT(-1)"), Err(FormulaError::Domain { .. })));
        assert_eq!(eval("POWER(10, 400)"), Err(FormulaError::NonFinite));
    }

    #[test]
    fn test_unresolved_reference_is_zero() {
        let inputs = InputContext::new();
        let calculated = CalculatedContext::new();
        let scope = Scope::new(&inputs, &calculated);
        let expr = parse("[Calculated:Missing#9] + 1").unwrap();

        let (result, unresolved) = evaluate(&expr, &scope);
        assert_eq!(result, Ok(1.0));
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].name, "Missing");
    }
}
