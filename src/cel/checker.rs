//! Static checks over a parsed expression
//!
//! Resolves identifiers against the declared names and macro variables, and
//! checks operator and function overloads with the types it can infer.
//! Everything fetched at runtime is `dyn`, so most checks only fire on
//! literals, function results and mismatched operators. All issues are
//! collected; a failed subexpression is treated as `dyn` from then on.

use super::ast::{BinaryOp, Expr, ExprKind, Literal, Macro, UnaryOp};
use super::functions::{self, signature};
use super::value::CelType;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CheckIssue {
    pub offset: usize,
    pub message: String,
}

pub(crate) fn check(expr: &Expr, declared: &BTreeSet<String>) -> Result<CelType, Vec<CheckIssue>> {
    let mut checker = Checker {
        declared,
        scopes: Vec::new(),
        issues: Vec::new(),
    };
    let result = checker.check(expr);
    if checker.issues.is_empty() {
        Ok(result)
    } else {
        Err(checker.issues)
    }
}

struct Checker<'a> {
    declared: &'a BTreeSet<String>,
    /// Comprehension variables, innermost last
    scopes: Vec<String>,
    issues: Vec<CheckIssue>,
}

impl Checker<'_> {
    fn report(&mut self, offset: usize, message: String) -> CelType {
        self.issues.push(CheckIssue { offset, message });
        CelType::Dyn
    }

    fn no_overload(&mut self, offset: usize, function: &str, args: String) -> CelType {
        self.report(
            offset,
            format!("found no matching overload for '{function}' applied to '{args}'"),
        )
    }

    fn expect_bool(&mut self, expr: &Expr) {
        let found = self.check(expr);
        if !found.is_assignable_to(CelType::Bool) {
            self.report(
                expr.offset,
                format!("expected type 'bool' but found '{found}'"),
            );
        }
    }

    fn check(&mut self, expr: &Expr) -> CelType {
        match &expr.kind {
            ExprKind::Literal(literal) => literal_type(literal),
            ExprKind::Ident(name) => self.check_ident(expr.offset, name),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => {
                let operand_type = self.check(operand);
                if !matches!(operand_type, CelType::Dyn | CelType::Map) {
                    return self.report(
                        expr.offset,
                        format!(
                            "type '{operand_type}' does not support field selection (field '{field}')"
                        ),
                    );
                }
                if *test_only { CelType::Bool } else { CelType::Dyn }
            }
            ExprKind::Index { operand, index } => {
                let operand_type = self.check(operand);
                let index_type = self.check(index);
                let valid = match operand_type {
                    CelType::Dyn | CelType::Map => true,
                    CelType::List => {
                        matches!(index_type, CelType::Int | CelType::Uint | CelType::Dyn)
                    }
                    _ => false,
                };
                if !valid {
                    return self.no_overload(
                        expr.offset,
                        "_[_]",
                        signature([operand_type, index_type]),
                    );
                }
                CelType::Dyn
            }
            ExprKind::Call {
                target,
                function,
                args,
            } => self.check_call(expr.offset, target.as_deref(), function, args),
            ExprKind::Unary { op, operand } => {
                let operand_type = self.check(operand);
                let valid = match op {
                    UnaryOp::Not => operand_type.is_assignable_to(CelType::Bool),
                    UnaryOp::Neg => {
                        matches!(operand_type, CelType::Int | CelType::Double | CelType::Dyn)
                    }
                };
                if !valid {
                    return self.no_overload(
                        expr.offset,
                        op.overload_name(),
                        signature([operand_type]),
                    );
                }
                match op {
                    UnaryOp::Not => CelType::Bool,
                    UnaryOp::Neg => operand_type,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_type = self.check(lhs);
                let rhs_type = self.check(rhs);
                match binary_result(*op, lhs_type, rhs_type) {
                    Some(result) => result,
                    None => self.no_overload(
                        expr.offset,
                        op.overload_name(),
                        signature([lhs_type, rhs_type]),
                    ),
                }
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let condition_type = self.check(condition);
                let then_type = self.check(then);
                let otherwise_type = self.check(otherwise);
                if !condition_type.is_assignable_to(CelType::Bool) {
                    return self.no_overload(
                        expr.offset,
                        "_?_:_",
                        signature([condition_type, then_type, otherwise_type]),
                    );
                }
                if then_type == otherwise_type {
                    then_type
                } else {
                    CelType::Dyn
                }
            }
            ExprKind::List(items) => {
                for item in items {
                    self.check(item);
                }
                CelType::List
            }
            ExprKind::Map(entries) => {
                for (key, value) in entries {
                    let key_type = self.check(key);
                    if !matches!(
                        key_type,
                        CelType::String | CelType::Int | CelType::Uint | CelType::Bool | CelType::Dyn
                    ) {
                        self.report(key.offset, format!("unsupported map key type '{key_type}'"));
                    }
                    self.check(value);
                }
                CelType::Map
            }
            ExprKind::Comprehension {
                kind,
                range,
                variable,
                filter,
                body,
            } => self.check_comprehension(*kind, range, variable, filter.as_deref(), body),
        }
    }

    fn check_ident(&mut self, offset: usize, name: &str) -> CelType {
        if self.scopes.iter().any(|scoped| scoped == name) || self.declared.contains(name) {
            return CelType::Dyn;
        }
        self.report(
            offset,
            format!("undeclared reference to '{name}' (in container '')"),
        )
    }

    fn check_call(
        &mut self,
        offset: usize,
        target: Option<&Expr>,
        function: &str,
        args: &[Expr],
    ) -> CelType {
        let receiver = target.map(|t| self.check(t));
        let arg_types: Vec<CelType> = args.iter().map(|arg| self.check(arg)).collect();

        let Some(decl) = functions::lookup(function, receiver.is_some()) else {
            return self.report(
                offset,
                format!("undeclared reference to '{function}' (in container '')"),
            );
        };

        let params: Vec<CelType> = receiver.into_iter().chain(arg_types.iter().copied()).collect();
        let candidates: Vec<CelType> = decl
            .overloads
            .iter()
            .filter(|overload| {
                overload.params.len() == params.len()
                    && overload
                        .params
                        .iter()
                        .zip(&params)
                        .all(|(expected, found)| found.is_assignable_to(*expected))
            })
            .map(|overload| overload.result)
            .collect();

        match candidates.split_first() {
            Some((first, rest)) if rest.iter().all(|r| r == first) => *first,
            Some(_) => CelType::Dyn,
            None => {
                let rendered = match receiver {
                    Some(receiver_type) => format!("{receiver_type}.{}", signature(arg_types)),
                    None => signature(arg_types),
                };
                self.no_overload(offset, function, rendered)
            }
        }
    }

    fn check_comprehension(
        &mut self,
        kind: Macro,
        range: &Expr,
        variable: &str,
        filter: Option<&Expr>,
        body: &Expr,
    ) -> CelType {
        let range_type = self.check(range);
        if !matches!(range_type, CelType::List | CelType::Map | CelType::Dyn) {
            self.report(
                range.offset,
                format!(
                    "expression of type '{range_type}' cannot be the range of a comprehension (must be list, map, or dynamic)"
                ),
            );
        }

        self.scopes.push(variable.to_string());
        if let Some(filter) = filter {
            self.expect_bool(filter);
        }
        match kind {
            Macro::Map => {
                self.check(body);
            }
            Macro::All | Macro::Exists | Macro::ExistsOne | Macro::Filter => self.expect_bool(body),
        }
        self.scopes.pop();

        match kind {
            Macro::All | Macro::Exists | Macro::ExistsOne => CelType::Bool,
            Macro::Map | Macro::Filter => CelType::List,
        }
    }
}

fn literal_type(literal: &Literal) -> CelType {
    match literal {
        Literal::Null => CelType::Null,
        Literal::Bool(_) => CelType::Bool,
        Literal::Int(_) => CelType::Int,
        Literal::Uint(_) => CelType::Uint,
        Literal::Double(_) => CelType::Double,
        Literal::String(_) => CelType::String,
    }
}

/// Result type of a binary operator, `None` when no overload applies
fn binary_result(op: BinaryOp, lhs: CelType, rhs: CelType) -> Option<CelType> {
    use CelType::*;

    let dyn_involved = lhs == Dyn || rhs == Dyn;
    match op {
        BinaryOp::And | BinaryOp::Or => {
            (lhs.is_assignable_to(Bool) && rhs.is_assignable_to(Bool)).then_some(Bool)
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let comparable = dyn_involved
                || lhs == rhs
                || (lhs.is_numeric() && rhs.is_numeric())
                || lhs == Null
                || rhs == Null;
            comparable.then_some(Bool)
        }
        BinaryOp::In => matches!(rhs, List | Map | Dyn).then_some(Bool),
        _ if op.is_ordering() => {
            let ordered = |t: CelType| t.is_numeric() || matches!(t, String | Bool | Dyn);
            let compatible = dyn_involved || lhs == rhs || (lhs.is_numeric() && rhs.is_numeric());
            (ordered(lhs) && ordered(rhs) && compatible).then_some(Bool)
        }
        _ => {
            let supports = |t: CelType| match op {
                BinaryOp::Add => matches!(t, Int | Uint | Double | String | List | Dyn),
                BinaryOp::Rem => matches!(t, Int | Uint | Dyn),
                _ => matches!(t, Int | Uint | Double | Dyn),
            };
            if !supports(lhs) || !supports(rhs) {
                return None;
            }
            match (lhs, rhs) {
                (Dyn, other) | (other, Dyn) => Some(other),
                (l, r) if l == r => Some(l),
                _ => None,
            }
        }
    }
}
