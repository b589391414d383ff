//! Tree-walking evaluator
//!
//! Values are borrowed from the activation wherever possible; only computed
//! results are owned. `&&`, `||` and the `all`/`exists` macros absorb errors
//! when the other side already decides the outcome.

use super::ast::{BinaryOp, Expr, ExprKind, Literal, Macro, UnaryOp};
use super::functions::{self, signature};
use super::value::Value;
use crate::error::EvalError;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

type EvalResult<'a> = Result<Cow<'a, Value>, EvalError>;

pub(crate) fn evaluate(expr: &Expr, bindings: &HashMap<String, Value>) -> Result<Value, EvalError> {
    let mut evaluator = Evaluator {
        bindings,
        scopes: Vec::new(),
    };
    evaluator.eval(expr).map(Cow::into_owned)
}

struct Evaluator<'a> {
    bindings: &'a HashMap<String, Value>,
    scopes: Vec<(String, Cow<'a, Value>)>,
}

fn owned<'a>(value: Value) -> EvalResult<'a> {
    Ok(Cow::Owned(value))
}

fn no_overload(function: &str, values: &[&Value]) -> EvalError {
    EvalError::NoMatchingOverload {
        function: function.to_string(),
        args: signature(values.iter().map(|v| v.cel_type())),
    }
}

/// Narrows a value to one of its parts without cloning borrowed data
fn project<'a>(
    value: Cow<'a, Value>,
    select: impl for<'v> Fn(&'v Value) -> Result<&'v Value, EvalError>,
) -> EvalResult<'a> {
    match value {
        Cow::Borrowed(v) => select(v).map(Cow::Borrowed),
        Cow::Owned(v) => select(&v).map(|inner| Cow::Owned(inner.clone())),
    }
}

fn select_field<'v>(value: &'v Value, field: &str) -> Result<&'v Value, EvalError> {
    match value {
        Value::Map(entries) => entries
            .get(field)
            .ok_or_else(|| EvalError::NoSuchAttribute(field.to_string())),
        other => Err(EvalError::UnsupportedSelection {
            field: field.to_string(),
            type_name: other.cel_type().to_string(),
        }),
    }
}

fn select_index<'v>(value: &'v Value, index: &Value) -> Result<&'v Value, EvalError> {
    match (value, index) {
        (Value::List(items), Value::Int(_) | Value::Uint(_)) => {
            let position = match *index {
                Value::Uint(u) => i64::try_from(u).unwrap_or(i64::MAX),
                Value::Int(i) => i,
                _ => -1,
            };
            usize::try_from(position)
                .ok()
                .and_then(|p| items.get(p))
                .ok_or(EvalError::IndexOutOfRange {
                    index: position,
                    size: items.len(),
                })
        }
        (Value::Map(entries), key) => {
            let key = key
                .map_key()
                .ok_or_else(|| no_overload("_[_]", &[value, index]))?;
            entries.get(&key).ok_or(EvalError::NoSuchKey(key))
        }
        _ => Err(no_overload("_[_]", &[value, index])),
    }
}

impl<'a> Evaluator<'a> {
    fn eval(&mut self, expr: &Expr) -> EvalResult<'a> {
        match &expr.kind {
            ExprKind::Literal(literal) => owned(literal_value(literal)),
            ExprKind::Ident(name) => self.lookup(name),
            ExprKind::Select {
                operand,
                field,
                test_only: true,
            } => {
                let operand = self.eval(operand)?;
                match &*operand {
                    Value::Map(entries) => owned(Value::Bool(entries.contains_key(field))),
                    other => Err(EvalError::UnsupportedSelection {
                        field: field.clone(),
                        type_name: other.cel_type().to_string(),
                    }),
                }
            }
            ExprKind::Select { operand, field, .. } => {
                let operand = self.eval(operand)?;
                project(operand, |v| select_field(v, field))
            }
            ExprKind::Index { operand, index } => {
                let operand = self.eval(operand)?;
                let index = self.eval(index)?;
                project(operand, |v| select_index(v, &index))
            }
            ExprKind::Call {
                target,
                function,
                args,
            } => {
                let mut values = Vec::with_capacity(args.len() + 1);
                if let Some(target) = target {
                    values.push(self.eval(target)?.into_owned());
                }
                for arg in args {
                    values.push(self.eval(arg)?.into_owned());
                }
                functions::call(function, target.is_some(), &values).map(Cow::Owned)
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                owned(unary(*op, &operand)?)
            }
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => self.logical(lhs, rhs, false),
            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => self.logical(lhs, rhs, true),
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                owned(binary(*op, &lhs, &rhs)?)
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.eval(condition)?;
                match &*condition {
                    Value::Bool(true) => self.eval(then),
                    Value::Bool(false) => self.eval(otherwise),
                    other => Err(no_overload("_?_:_", &[other])),
                }
            }
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?.into_owned());
                }
                owned(Value::List(values))
            }
            ExprKind::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key_value = self.eval(key)?;
                    let key = key_value.map_key().ok_or_else(|| EvalError::Function {
                        function: "map".to_string(),
                        message: format!(
                            "unsupported key type '{}'",
                            key_value.cel_type()
                        ),
                    })?;
                    let value = self.eval(value)?.into_owned();
                    if map.insert(key.clone(), value).is_some() {
                        return Err(EvalError::Function {
                            function: "map".to_string(),
                            message: format!("repeated key '{key}'"),
                        });
                    }
                }
                owned(Value::Map(map))
            }
            ExprKind::Comprehension {
                kind,
                range,
                variable,
                filter,
                body,
            } => self.comprehension(*kind, range, variable, filter.as_deref(), body),
        }
    }

    fn lookup(&self, name: &str) -> EvalResult<'a> {
        if let Some((_, value)) = self.scopes.iter().rev().find(|(scoped, _)| scoped == name) {
            return Ok(value.clone());
        }
        self.bindings
            .get(name)
            .map(Cow::Borrowed)
            .ok_or_else(|| EvalError::NoSuchAttribute(name.to_string()))
    }

    /// `&&` when `decisive` is false, `||` when true
    fn logical(&mut self, lhs: &Expr, rhs: &Expr, decisive: bool) -> EvalResult<'a> {
        let function = if decisive { "_||_" } else { "_&&_" };
        let left = self.eval(lhs).and_then(|v| as_bool(function, &v));
        if left == Ok(decisive) {
            return owned(Value::Bool(decisive));
        }
        let right = self.eval(rhs).and_then(|v| as_bool(function, &v));
        match (left, right) {
            (_, Ok(r)) if r == decisive => owned(Value::Bool(decisive)),
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(_), Ok(_)) => owned(Value::Bool(!decisive)),
        }
    }

    fn comprehension(
        &mut self,
        kind: Macro,
        range: &Expr,
        variable: &str,
        filter: Option<&Expr>,
        body: &Expr,
    ) -> EvalResult<'a> {
        let range = self.eval(range)?;
        let elements: Vec<Cow<'a, Value>> = match range {
            Cow::Borrowed(Value::List(items)) => items.iter().map(Cow::Borrowed).collect(),
            Cow::Borrowed(Value::Map(entries)) => entries
                .keys()
                .map(|k| Cow::Owned(Value::String(k.clone())))
                .collect(),
            Cow::Owned(Value::List(items)) => items.into_iter().map(Cow::Owned).collect(),
            Cow::Owned(Value::Map(entries)) => entries
                .into_keys()
                .map(|k| Cow::Owned(Value::String(k)))
                .collect(),
            other => return Err(no_overload(kind.name(), &[&*other])),
        };

        let mut first_error = None;
        let mut matched = 0usize;
        let mut collected = Vec::new();

        for element in elements {
            self.scopes.push((variable.to_string(), element));
            let outcome = self.step(kind, filter, body);
            self.scopes.pop();

            match outcome {
                Err(e) if matches!(kind, Macro::All | Macro::Exists) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
                Ok(Step::Predicate(false)) if kind == Macro::All => {
                    return owned(Value::Bool(false));
                }
                Ok(Step::Predicate(true)) if kind == Macro::Exists => {
                    return owned(Value::Bool(true));
                }
                Ok(Step::Predicate(true)) => matched += 1,
                Ok(Step::Predicate(false)) | Ok(Step::Skip) => {}
                Ok(Step::Push(value)) => collected.push(value),
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        match kind {
            Macro::All => owned(Value::Bool(true)),
            Macro::Exists => owned(Value::Bool(false)),
            Macro::ExistsOne => owned(Value::Bool(matched == 1)),
            Macro::Filter | Macro::Map => owned(Value::List(collected)),
        }
    }

    /// One iteration with the element already bound in the innermost scope
    fn step(&mut self, kind: Macro, filter: Option<&Expr>, body: &Expr) -> Result<Step, EvalError> {
        match kind {
            Macro::All | Macro::Exists | Macro::ExistsOne => {
                let value = self.eval(body)?;
                Ok(Step::Predicate(as_bool(kind.name(), &value)?))
            }
            Macro::Filter => {
                let keep = self.eval(body)?;
                if !as_bool(kind.name(), &keep)? {
                    return Ok(Step::Skip);
                }
                let element = self
                    .scopes
                    .last()
                    .map(|(_, value)| value.clone().into_owned())
                    .unwrap_or(Value::Null);
                Ok(Step::Push(element))
            }
            Macro::Map => {
                if let Some(filter) = filter {
                    let keep = self.eval(filter)?;
                    if !as_bool(kind.name(), &keep)? {
                        return Ok(Step::Skip);
                    }
                }
                Ok(Step::Push(self.eval(body)?.into_owned()))
            }
        }
    }
}

enum Step {
    Predicate(bool),
    Skip,
    Push(Value),
}

fn as_bool(function: &str, value: &Value) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| no_overload(function, &[value]))
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Uint(u) => Value::Uint(*u),
        Literal::Double(d) => Value::Double(*d),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn unary(op: UnaryOp, operand: &Value) -> Result<Value, EvalError> {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow("-_")),
        (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
        _ => Err(no_overload(op.overload_name(), &[operand])),
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let name = op.overload_name();
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.cel_equals(rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.cel_equals(rhs))),
        BinaryOp::In => match rhs {
            Value::List(items) => Ok(Value::Bool(items.iter().any(|item| item.cel_equals(lhs)))),
            Value::Map(entries) => Ok(Value::Bool(
                lhs.map_key().is_some_and(|key| entries.contains_key(&key)),
            )),
            _ => Err(no_overload(name, &[lhs, rhs])),
        },
        _ if op.is_ordering() => {
            let ordering = lhs
                .cel_compare(rhs)
                .ok_or_else(|| no_overload(name, &[lhs, rhs]))?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        _ => arithmetic(op, lhs, rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let name = op.overload_name();
    let overflow = || EvalError::Overflow(name);
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div | BinaryOp::Rem if *b == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Div => a.checked_div(*b),
                BinaryOp::Rem => a.checked_rem(*b),
                _ => return Err(no_overload(name, &[lhs, rhs])),
            };
            result.map(Value::Int).ok_or_else(overflow)
        }
        (Value::Uint(a), Value::Uint(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div | BinaryOp::Rem if *b == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Div => a.checked_div(*b),
                BinaryOp::Rem => a.checked_rem(*b),
                _ => return Err(no_overload(name, &[lhs, rhs])),
            };
            result.map(Value::Uint).ok_or_else(overflow)
        }
        (Value::Double(a), Value::Double(b)) => match op {
            BinaryOp::Add => Ok(Value::Double(a + b)),
            BinaryOp::Sub => Ok(Value::Double(a - b)),
            BinaryOp::Mul => Ok(Value::Double(a * b)),
            BinaryOp::Div => Ok(Value::Double(a / b)),
            _ => Err(no_overload(name, &[lhs, rhs])),
        },
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        (Value::List(a), Value::List(b)) if op == BinaryOp::Add => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        _ => Err(no_overload(name, &[lhs, rhs])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::parser::parse;
    use serde_json::json;

    fn eval_with(source: &str, bindings: &HashMap<String, Value>) -> Result<Value, EvalError> {
        let expr = parse(source).unwrap();
        evaluate(&expr, bindings)
    }

    fn eval(source: &str) -> Result<Value, EvalError> {
        eval_with(source, &HashMap::new())
    }

    fn pods() -> HashMap<String, Value> {
        HashMap::from([(
            "pods".to_string(),
            Value::from(json!({
                "items": [
                    {"metadata": {"name": "web"}, "spec": {"replicas": 3}},
                    {"metadata": {"name": "db"}, "spec": {"replicas": 1}}
                ]
            })),
        )])
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        assert_eq!(eval("1 + 2 * 3 == 7"), Ok(Value::Bool(true)));
        assert_eq!(eval("'a' + 'b'"), Ok(Value::String("ab".to_string())));
        assert_eq!(eval("7 % 3"), Ok(Value::Int(1)));
        assert_eq!(eval("2 < 2.5"), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_integer_errors() {
        assert_eq!(eval("1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(
            eval("9223372036854775807 + 1"),
            Err(EvalError::Overflow("_+_"))
        );
    }

    #[test]
    fn test_comprehensions_over_bindings() {
        let bindings = pods();
        assert_eq!(
            eval_with("pods.items.all(p, p.spec.replicas > 0)", &bindings),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            eval_with("pods.items.exists(p, p.spec.replicas > 2)", &bindings),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            eval_with("pods.items.exists_one(p, p.spec.replicas >= 1)", &bindings),
            Ok(Value::Bool(false))
        );
        assert_eq!(
            eval_with("pods.items.map(p, p.metadata.name)", &bindings),
            Ok(Value::List(vec![
                Value::String("web".to_string()),
                Value::String("db".to_string()),
            ]))
        );
        assert_eq!(
            eval_with("size(pods.items.filter(p, p.spec.replicas > 1))", &bindings),
            Ok(Value::Int(1))
        );
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let err = eval_with("pods.items[0].status.phase == 'Running'", &pods()).unwrap_err();
        assert_eq!(err, EvalError::NoSuchAttribute("status".to_string()));
    }

    #[test]
    fn test_has_tests_presence() {
        let bindings = pods();
        assert_eq!(
            eval_with("has(pods.items[0].status)", &bindings),
            Ok(Value::Bool(false))
        );
        assert_eq!(
            eval_with("has(pods.items[0].spec)", &bindings),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn test_logical_operators_absorb_errors() {
        let bindings = pods();
        assert_eq!(
            eval_with("pods.missing == 1 || true", &bindings),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            eval_with("false && pods.missing == 1", &bindings),
            Ok(Value::Bool(false))
        );
        assert!(eval_with("true && pods.missing == 1", &bindings).is_err());
    }

    #[test]
    fn test_all_absorbs_error_when_a_false_element_exists() {
        let bindings = HashMap::from([(
            "xs".to_string(),
            Value::from(json!([{"a": 1}, {"b": 2}])),
        )]);
        assert_eq!(eval_with("xs.all(x, x.a == 2)", &bindings), Ok(Value::Bool(false)));
        assert!(eval_with("xs.all(x, x.a == 1)", &bindings).is_err());
    }

    #[test]
    fn test_index_and_membership() {
        assert_eq!(eval("[1, 2, 3][1]"), Ok(Value::Int(2)));
        assert_eq!(
            eval("[1][5]"),
            Err(EvalError::IndexOutOfRange { index: 5, size: 1 })
        );
        assert_eq!(eval("'b' in {'a': 1, 'b': 2}"), Ok(Value::Bool(true)));
        assert_eq!(eval("3 in [1, 2]"), Ok(Value::Bool(false)));
        assert_eq!(
            eval("{'a': 1}['z']"),
            Err(EvalError::NoSuchKey("z".to_string()))
        );
    }

    #[test]
    fn test_conditional() {
        assert_eq!(eval("1 > 0 ? 'yes' : 'no'"), Ok(Value::String("yes".to_string())));
    }

    #[test]
    fn test_parse_json_then_select() {
        let bindings = HashMap::from([(
            "raw".to_string(),
            Value::String(r#"{"tls": {"enabled": true}}"#.to_string()),
        )]);
        assert_eq!(
            eval_with("parseJSON(raw).tls.enabled", &bindings),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn test_repeated_map_key() {
        assert!(matches!(
            eval("{'a': 1, 'a': 2}"),
            Err(EvalError::Function { .. })
        ));
    }
}
