//! Permission expressions: set algebra over relation and permission names
//!
//! The grammar lives in `expr.pest`. All operators share one precedence level
//! and associate to the left. An empty expression grants nobody.

use crate::error::{AcpError, AcpResult};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

/// Deepest parenthesis nesting accepted in one expression
pub const MAX_EXPR_DEPTH: usize = 32;
/// Most names one expression may reference
pub const MAX_EXPR_TERMS: usize = 256;

#[derive(Parser)]
#[grammar = "local/expr.pest"]
struct ExprParser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Nobody,
    Term(String),
    Union(Box<Expr>, Box<Expr>),
    Intersection(Box<Expr>, Box<Expr>),
    Difference(Box<Expr>, Box<Expr>),
}

/// Reject input whose nesting or length would make the parse tree unbounded.
fn check_bounds(text: &str) -> AcpResult<()> {
    let mut depth = 0usize;
    let mut operators = 0usize;
    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_EXPR_DEPTH {
                    return Err(AcpError::invalid_policy(format!(
                        "expression nests deeper than {} levels",
                        MAX_EXPR_DEPTH
                    )));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            '+' | '&' | '-' => {
                operators += 1;
                if operators >= MAX_EXPR_TERMS {
                    return Err(AcpError::invalid_policy(format!(
                        "expression references more than {} names",
                        MAX_EXPR_TERMS
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn build_expr(pair: Pair<Rule>) -> AcpResult<Expr> {
    match pair.as_rule() {
        Rule::expr => {
            let mut inner = pair.into_inner();
            let mut left = match inner.next() {
                Some(first) => build_expr(first)?,
                None => return Ok(Expr::Nobody),
            };
            while let Some(op_pair) = inner.next() {
                let right = match inner.next() {
                    Some(rhs) => build_expr(rhs)?,
                    None => return Err(AcpError::invalid_policy("operator without operand")),
                };
                left = match op_pair.as_str() {
                    "+" => Expr::Union(Box::new(left), Box::new(right)),
                    "&" => Expr::Intersection(Box::new(left), Box::new(right)),
                    "-" => Expr::Difference(Box::new(left), Box::new(right)),
                    other => {
                        return Err(AcpError::invalid_policy(format!(
                            "unknown operator '{}'",
                            other
                        )))
                    }
                };
            }
            Ok(left)
        }
        Rule::primary => match pair.into_inner().next() {
            Some(inner) => build_expr(inner),
            None => Err(AcpError::invalid_policy("empty operand")),
        },
        Rule::ident => Ok(Expr::Term(pair.as_str().to_string())),
        rule => Err(AcpError::invalid_policy(format!(
            "unexpected rule {:?} in expression",
            rule
        ))),
    }
}

impl Expr {
    /// Parse `text`, which may be empty.
    ///
    /// Nesting past [`MAX_EXPR_DEPTH`] or more than [`MAX_EXPR_TERMS`] names
    /// is an invalid policy.
    pub fn parse(text: &str) -> AcpResult<Expr> {
        check_bounds(text)?;

        let mut pairs = ExprParser::parse(Rule::expression, text).map_err(|e| {
            AcpError::invalid_policy(format!("malformed expression '{}': {}", text, e))
        })?;
        let expression = match pairs.next() {
            Some(pair) => pair,
            None => return Ok(Expr::Nobody),
        };

        match expression.into_inner().find(|p| p.as_rule() == Rule::expr) {
            Some(expr) => build_expr(expr),
            None => Ok(Expr::Nobody),
        }
    }

    /// Every name referenced by the expression
    pub fn terms(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Nobody => {}
            Expr::Term(name) => out.push(name),
            Expr::Union(l, r) | Expr::Intersection(l, r) | Expr::Difference(l, r) => {
                l.collect_terms(out);
                r.collect_terms(out);
            }
        }
    }

    /// Evaluate with `resolve` deciding membership for each term.
    pub fn evaluate<F>(&self, resolve: &mut F) -> AcpResult<bool>
    where
        F: FnMut(&str) -> AcpResult<bool>,
    {
        match self {
            Expr::Nobody => Ok(false),
            Expr::Term(name) => resolve(name),
            Expr::Union(l, r) => Ok(l.evaluate(resolve)? || r.evaluate(resolve)?),
            Expr::Intersection(l, r) => Ok(l.evaluate(resolve)? && r.evaluate(resolve)?),
            Expr::Difference(l, r) => Ok(l.evaluate(resolve)? && !r.evaluate(resolve)?),
        }
    }
}
