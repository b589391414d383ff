//! Builtin function library
//!
//! Declarations drive the checker's overload resolution; `call` is the runtime
//! half. Member functions list the receiver as their first parameter.

use super::value::{CelType, Value};
use crate::error::EvalError;

use CelType::{Bool, Double, Dyn, Int, List, Map, String as Str, Uint};

pub(crate) struct Overload {
    pub params: &'static [CelType],
    pub result: CelType,
}

pub(crate) struct FunctionDecl {
    pub name: &'static str,
    pub member: bool,
    pub overloads: &'static [Overload],
}

const fn overload(params: &'static [CelType], result: CelType) -> Overload {
    Overload { params, result }
}

const SIZE: &[Overload] = &[
    overload(&[Str], Int),
    overload(&[List], Int),
    overload(&[Map], Int),
];

const STRING_PREDICATE: &[Overload] = &[overload(&[Str, Str], Bool)];
const STRING_TRANSFORM: &[Overload] = &[overload(&[Str], Str)];

static FUNCTIONS: &[FunctionDecl] = &[
    FunctionDecl {
        name: "size",
        member: false,
        overloads: SIZE,
    },
    FunctionDecl {
        name: "size",
        member: true,
        overloads: SIZE,
    },
    FunctionDecl {
        name: "int",
        member: false,
        overloads: &[
            overload(&[Int], Int),
            overload(&[Uint], Int),
            overload(&[Double], Int),
            overload(&[Str], Int),
        ],
    },
    FunctionDecl {
        name: "uint",
        member: false,
        overloads: &[
            overload(&[Int], Uint),
            overload(&[Uint], Uint),
            overload(&[Double], Uint),
            overload(&[Str], Uint),
        ],
    },
    FunctionDecl {
        name: "double",
        member: false,
        overloads: &[
            overload(&[Int], Double),
            overload(&[Uint], Double),
            overload(&[Double], Double),
            overload(&[Str], Double),
        ],
    },
    FunctionDecl {
        name: "string",
        member: false,
        overloads: &[
            overload(&[Str], Str),
            overload(&[Int], Str),
            overload(&[Uint], Str),
            overload(&[Double], Str),
            overload(&[Bool], Str),
        ],
    },
    FunctionDecl {
        name: "bool",
        member: false,
        overloads: &[overload(&[Bool], Bool), overload(&[Str], Bool)],
    },
    FunctionDecl {
        name: "dyn",
        member: false,
        overloads: &[overload(&[Dyn], Dyn)],
    },
    FunctionDecl {
        name: "parseJSON",
        member: false,
        overloads: &[overload(&[Str], Dyn)],
    },
    FunctionDecl {
        name: "parseYAML",
        member: false,
        overloads: &[overload(&[Str], Dyn)],
    },
    FunctionDecl {
        name: "matches",
        member: false,
        overloads: STRING_PREDICATE,
    },
    FunctionDecl {
        name: "contains",
        member: true,
        overloads: STRING_PREDICATE,
    },
    FunctionDecl {
        name: "startsWith",
        member: true,
        overloads: STRING_PREDICATE,
    },
    FunctionDecl {
        name: "endsWith",
        member: true,
        overloads: STRING_PREDICATE,
    },
    FunctionDecl {
        name: "matches",
        member: true,
        overloads: STRING_PREDICATE,
    },
    FunctionDecl {
        name: "lowerAscii",
        member: true,
        overloads: STRING_TRANSFORM,
    },
    FunctionDecl {
        name: "upperAscii",
        member: true,
        overloads: STRING_TRANSFORM,
    },
    FunctionDecl {
        name: "trim",
        member: true,
        overloads: STRING_TRANSFORM,
    },
    FunctionDecl {
        name: "split",
        member: true,
        overloads: &[overload(&[Str, Str], List)],
    },
    FunctionDecl {
        name: "join",
        member: true,
        overloads: &[overload(&[List], Str), overload(&[List, Str], Str)],
    },
];

pub(crate) fn lookup(name: &str, member: bool) -> Option<&'static FunctionDecl> {
    FUNCTIONS
        .iter()
        .find(|decl| decl.name == name && decl.member == member)
}

/// Renders argument types the way overload diagnostics show them
pub(crate) fn signature(types: impl IntoIterator<Item = CelType>) -> String {
    let names: Vec<String> = types.into_iter().map(|t| t.to_string()).collect();
    format!("({})", names.join(", "))
}

/// Invokes a builtin; for member calls `args[0]` is the receiver
pub(crate) fn call(name: &str, member: bool, args: &[Value]) -> Result<Value, EvalError> {
    let result = match (name, args) {
        ("size", [value]) => size(value),
        ("int", [value]) => to_int(value)?,
        ("uint", [value]) => to_uint(value)?,
        ("double", [value]) => to_double(value)?,
        ("string", [value]) => to_string(value),
        ("bool", [value]) => to_bool(value)?,
        ("dyn", [value]) => Some(value.clone()),
        ("parseJSON", [Value::String(text)]) => Some(parse_json(text)?),
        ("parseYAML", [Value::String(text)]) => Some(parse_yaml(text)?),
        ("contains", [Value::String(s), Value::String(sub)]) => {
            Some(Value::Bool(s.contains(sub.as_str())))
        }
        ("startsWith", [Value::String(s), Value::String(prefix)]) => {
            Some(Value::Bool(s.starts_with(prefix.as_str())))
        }
        ("endsWith", [Value::String(s), Value::String(suffix)]) => {
            Some(Value::Bool(s.ends_with(suffix.as_str())))
        }
        ("matches", [Value::String(s), Value::String(pattern)]) => {
            Some(Value::Bool(matches(s, pattern)?))
        }
        ("lowerAscii", [Value::String(s)]) => Some(Value::String(s.to_ascii_lowercase())),
        ("upperAscii", [Value::String(s)]) => Some(Value::String(s.to_ascii_uppercase())),
        ("trim", [Value::String(s)]) => Some(Value::String(s.trim().to_string())),
        ("split", [Value::String(s), Value::String(separator)]) => Some(Value::List(
            s.split(separator.as_str())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        )),
        ("join", [Value::List(items)]) => join(items, "")?,
        ("join", [Value::List(items), Value::String(separator)]) => join(items, separator)?,
        _ => None,
    };

    result.ok_or_else(|| no_overload(name, member, args))
}

fn no_overload(name: &str, member: bool, args: &[Value]) -> EvalError {
    let function = match (member, args.first()) {
        (true, Some(receiver)) => format!("{}.{}", receiver.cel_type(), name),
        _ => name.to_string(),
    };
    let params = if member { args.get(1..).unwrap_or(&[]) } else { args };
    EvalError::NoMatchingOverload {
        function,
        args: signature(params.iter().map(Value::cel_type)),
    }
}

fn function_error(function: &str, message: impl Into<String>) -> EvalError {
    EvalError::Function {
        function: function.to_string(),
        message: message.into(),
    }
}

fn size(value: &Value) -> Option<Value> {
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        _ => return None,
    };
    Some(Value::Int(len as i64))
}

fn to_int(value: &Value) -> Result<Option<Value>, EvalError> {
    let converted = match value {
        Value::Int(i) => *i,
        Value::Uint(u) => i64::try_from(*u).map_err(|_| EvalError::Overflow("int"))?,
        Value::Double(d) => {
            if !d.is_finite() || *d <= i64::MIN as f64 || *d >= i64::MAX as f64 {
                return Err(EvalError::Overflow("int"));
            }
            d.trunc() as i64
        }
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|e| function_error("int", format!("cannot convert '{s}': {e}")))?,
        _ => return Ok(None),
    };
    Ok(Some(Value::Int(converted)))
}

fn to_uint(value: &Value) -> Result<Option<Value>, EvalError> {
    let converted = match value {
        Value::Int(i) => u64::try_from(*i).map_err(|_| EvalError::Overflow("uint"))?,
        Value::Uint(u) => *u,
        Value::Double(d) => {
            if !d.is_finite() || *d < 0.0 || *d >= u64::MAX as f64 {
                return Err(EvalError::Overflow("uint"));
            }
            d.trunc() as u64
        }
        Value::String(s) => s
            .parse::<u64>()
            .map_err(|e| function_error("uint", format!("cannot convert '{s}': {e}")))?,
        _ => return Ok(None),
    };
    Ok(Some(Value::Uint(converted)))
}

fn to_double(value: &Value) -> Result<Option<Value>, EvalError> {
    let converted = match value {
        Value::Int(i) => *i as f64,
        Value::Uint(u) => *u as f64,
        Value::Double(d) => *d,
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| function_error("double", format!("cannot convert '{s}': {e}")))?,
        _ => return Ok(None),
    };
    Ok(Some(Value::Double(converted)))
}

fn to_string(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Int(i) => Some(Value::String(i.to_string())),
        Value::Uint(u) => Some(Value::String(u.to_string())),
        Value::Double(d) => Some(Value::String(d.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Result<Option<Value>, EvalError> {
    match value {
        Value::Bool(_) => Ok(Some(value.clone())),
        Value::String(s) => match s.as_str() {
            "true" | "True" | "TRUE" | "t" | "1" => Ok(Some(Value::Bool(true))),
            "false" | "False" | "FALSE" | "f" | "0" => Ok(Some(Value::Bool(false))),
            _ => Err(function_error("bool", format!("cannot convert '{s}'"))),
        },
        _ => Ok(None),
    }
}

fn parse_json(text: &str) -> Result<Value, EvalError> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|e| function_error("parseJSON", e.to_string()))
}

fn parse_yaml(text: &str) -> Result<Value, EvalError> {
    serde_yaml::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|e| function_error("parseYAML", e.to_string()))
}

fn matches(text: &str, pattern: &str) -> Result<bool, EvalError> {
    let regex = regex::Regex::new(pattern)
        .map_err(|e| function_error("matches", format!("invalid pattern '{pattern}': {e}")))?;
    Ok(regex.is_match(text))
}

fn join(items: &[Value], separator: &str) -> Result<Option<Value>, EvalError> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => parts.push(s.as_str()),
            other => {
                return Err(function_error(
                    "join",
                    format!("list element of type '{}' is not a string", other.cel_type()),
                ));
            }
        }
    }
    Ok(Some(Value::String(parts.join(separator))))
}
