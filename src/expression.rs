//! Expressions over column references.
//!
//! These are the expressions computed-column aliases stand for and the
//! predicates a scope resolver qualifies. Supports:
//! - constants and column references (`t.a`, `a`)
//! - correlated references into an enclosing scope
//! - comparisons, `IS NULL`, `AND`, `OR`, `NOT`
//!
//! Evaluation follows SQL three-valued logic: a comparison with a NULL
//! operand yields NULL, and NULL is not a match.

use crate::column::DataValue;
use crate::error::{Result, TableError};
use crate::name::ColumnName;
use crate::scheme::CompareOp;
use std::cmp::Ordering;
use std::fmt;

/// Supplies the live value of a column reference for the row being visited.
pub trait VariableResolver {
    fn resolve(&self, variable: &ColumnName) -> Result<DataValue>;
}

/// A reference to a column of an enclosing scope, `level` scopes out.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedVariable {
    variable: ColumnName,
    level: usize,
}

impl CorrelatedVariable {
    pub fn new(variable: ColumnName, level: usize) -> Self {
        CorrelatedVariable { variable, level }
    }

    pub fn variable(&self) -> &ColumnName {
        &self.variable
    }

    /// How many scopes out the reference was found.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Reads the current value from `scopes[level]`, where `scopes[0]` is the
    /// innermost scope's resolver.
    pub fn fetch(&self, scopes: &[&dyn VariableResolver]) -> Result<DataValue> {
        let resolver = scopes
            .get(self.level)
            .ok_or_else(|| TableError::ReferenceNotFound(self.to_string()))?;
        resolver.resolve(&self.variable)
    }
}

impl fmt::Display for CorrelatedVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CORRELATED({}, {})", self.variable, self.level)
    }
}

/// An expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(DataValue),
    Variable(ColumnName),
    Correlated(CorrelatedVariable),
    Compare {
        op: CompareOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    IsNull(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    pub fn constant(value: impl Into<DataValue>) -> Self {
        Expression::Constant(value.into())
    }

    /// A column reference parsed from `a`, `t.a` or `s.t.a`.
    pub fn variable(reference: &str) -> Self {
        Expression::Variable(ColumnName::parse(reference))
    }

    pub fn compare(op: CompareOp, lhs: Expression, rhs: Expression) -> Self {
        Expression::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn and(lhs: Expression, rhs: Expression) -> Self {
        Expression::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Expression, rhs: Expression) -> Self {
        Expression::Or(Box::new(lhs), Box::new(rhs))
    }

    /// Every plain column reference in the tree, left to right.
    pub fn variables(&self) -> Vec<&ColumnName> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a ColumnName>) {
        match self {
            Expression::Variable(v) => out.push(v),
            Expression::Constant(_) | Expression::Correlated(_) => {}
            Expression::Compare { lhs, rhs, .. } | Expression::And(lhs, rhs) | Expression::Or(lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expression::IsNull(e) | Expression::Not(e) => e.collect_variables(out),
        }
    }

    /// Rebuilds the tree with every plain column reference replaced by `f`.
    pub fn prepare<F>(&self, f: &mut F) -> Result<Expression>
    where
        F: FnMut(&ColumnName) -> Result<Expression>,
    {
        Ok(match self {
            Expression::Variable(v) => f(v)?,
            Expression::Constant(_) | Expression::Correlated(_) => self.clone(),
            Expression::Compare { op, lhs, rhs } => Expression::compare(*op, lhs.prepare(f)?, rhs.prepare(f)?),
            Expression::And(l, r) => Expression::and(l.prepare(f)?, r.prepare(f)?),
            Expression::Or(l, r) => Expression::or(l.prepare(f)?, r.prepare(f)?),
            Expression::IsNull(e) => Expression::IsNull(Box::new(e.prepare(f)?)),
            Expression::Not(e) => Expression::Not(Box::new(e.prepare(f)?)),
        })
    }

    /// Evaluates against `scopes`; `scopes[0]` resolves plain references and
    /// `scopes[n]` resolves correlated references of level `n`.
    pub fn evaluate(&self, scopes: &[&dyn VariableResolver]) -> Result<DataValue> {
        match self {
            Expression::Constant(v) => Ok(v.clone()),
            Expression::Variable(v) => match scopes.first() {
                Some(resolver) => resolver.resolve(v),
                None => Err(TableError::ReferenceNotFound(v.to_string())),
            },
            Expression::Correlated(cv) => cv.fetch(scopes),
            Expression::Compare { op, lhs, rhs } => {
                let l = lhs.evaluate(scopes)?;
                let r = rhs.evaluate(scopes)?;
                if l.is_null() || r.is_null() {
                    return Ok(DataValue::Null);
                }
                Ok(DataValue::Bool(compare_ord(l.compare(&r), *op)))
            }
            Expression::IsNull(e) => Ok(DataValue::Bool(e.evaluate(scopes)?.is_null())),
            Expression::And(l, r) => {
                let (l, r) = (truth(&l.evaluate(scopes)?), truth(&r.evaluate(scopes)?));
                Ok(match (l, r) {
                    (Some(false), _) | (_, Some(false)) => DataValue::Bool(false),
                    (Some(true), Some(true)) => DataValue::Bool(true),
                    _ => DataValue::Null,
                })
            }
            Expression::Or(l, r) => {
                let (l, r) = (truth(&l.evaluate(scopes)?), truth(&r.evaluate(scopes)?));
                Ok(match (l, r) {
                    (Some(true), _) | (_, Some(true)) => DataValue::Bool(true),
                    (Some(false), Some(false)) => DataValue::Bool(false),
                    _ => DataValue::Null,
                })
            }
            Expression::Not(e) => Ok(match truth(&e.evaluate(scopes)?) {
                Some(b) => DataValue::Bool(!b),
                None => DataValue::Null,
            }),
        }
    }

    /// True only if the expression evaluates to boolean true.
    pub fn matches(&self, scopes: &[&dyn VariableResolver]) -> Result<bool> {
        Ok(truth(&self.evaluate(scopes)?) == Some(true))
    }
}

fn truth(value: &DataValue) -> Option<bool> {
    match value {
        DataValue::Bool(b) => Some(*b),
        _ => None,
    }
}

fn compare_ord(ord: Ordering, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(v) => write!(f, "{}", v),
            Expression::Variable(v) => write!(f, "{}", v),
            Expression::Correlated(cv) => write!(f, "{}", cv),
            Expression::Compare { op, lhs, rhs } => {
                let sym = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "<>",
                    CompareOp::Lt => "<",
                    CompareOp::Le => "<=",
                    CompareOp::Gt => ">",
                    CompareOp::Ge => ">=",
                };
                write!(f, "({} {} {})", lhs, sym, rhs)
            }
            Expression::IsNull(e) => write!(f, "({} IS NULL)", e),
            Expression::And(l, r) => write!(f, "({} AND {})", l, r),
            Expression::Or(l, r) => write!(f, "({} OR {})", l, r),
            Expression::Not(e) => write!(f, "(NOT {})", e),
        }
    }
}
