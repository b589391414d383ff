#![forbid(unsafe_code)]

//! Embedded CEL (Common Expression Language) engine
//!
//! Covers the subset compliance rules use: literals, field selection,
//! indexing, the usual operators, the `has`/`all`/`exists`/`exists_one`/
//! `map`/`filter` macros, and a small function library that includes
//! `parseJSON` and `parseYAML`. Compilation is parse + check against the set
//! of declared variable names; every declared name is dynamically typed.

mod ast;
mod checker;
mod eval;
mod functions;
mod lexer;
mod parser;
mod value;

pub use ast::{BinaryOp, Expr, ExprKind, Literal, Macro, UnaryOp};
pub use value::{CelType, Value};

use crate::error::EvalError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A located compilation issue
///
/// Displays as `ERROR: <input>:LINE:COL: message`, which is the form the
/// validator's issue classification parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ERROR: <input>:{}:{}: {}",
            self.line, self.column, self.message
        )
    }
}

/// Renders a list of diagnostics one per line
pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Maps byte offsets in the source to 1-based line and column numbers
struct SourceMap<'s> {
    source: &'s str,
    line_offsets: Vec<usize>,
}

impl<'s> SourceMap<'s> {
    fn new(source: &'s str) -> Self {
        let mut line_offsets = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_offsets.push(i + 1);
            }
        }
        Self {
            source,
            line_offsets,
        }
    }

    /// Columns count characters, not bytes
    fn location(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.source.len());
        let line_idx = self
            .line_offsets
            .partition_point(|&o| o <= offset)
            .saturating_sub(1);
        let line_start = self.line_offsets[line_idx];
        let column = self
            .source
            .get(line_start..offset)
            .map_or(offset - line_start, |prefix| prefix.chars().count());
        ((line_idx + 1) as u32, (column + 1) as u32)
    }

    fn diagnostic(&self, offset: usize, message: String) -> Diagnostic {
        let (line, column) = self.location(offset);
        Diagnostic {
            line,
            column,
            message,
        }
    }
}

/// The set of variable names an expression may reference
#[derive(Debug, Clone, Default)]
pub struct Environment {
    declared: BTreeSet<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment declaring each of `names` as a dynamically typed variable
    pub fn with_variables<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            declared: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn declare(&mut self, name: impl Into<String>) {
        self.declared.insert(name.into());
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(String::as_str)
    }

    /// Parses and checks `source`
    ///
    /// Parsing stops at the first syntax error; checking reports every issue
    /// it finds.
    pub fn compile(&self, source: &str) -> Result<Program, Vec<Diagnostic>> {
        let map = SourceMap::new(source);
        let expr = parser::parse(source)
            .map_err(|e| vec![map.diagnostic(e.offset, e.message)])?;
        let result_type = checker::check(&expr, &self.declared).map_err(|issues| {
            issues
                .into_iter()
                .map(|issue| map.diagnostic(issue.offset, issue.message))
                .collect::<Vec<_>>()
        })?;
        Ok(Program { expr, result_type })
    }
}

/// A checked expression ready for evaluation
#[derive(Debug, Clone)]
pub struct Program {
    expr: Expr,
    result_type: CelType,
}

impl Program {
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Statically inferred result type; `Dyn` when it depends on data
    pub fn result_type(&self) -> CelType {
        self.result_type
    }

    pub fn evaluate(&self, activation: &Activation) -> Result<Value, EvalError> {
        eval::evaluate(&self.expr, &activation.bindings)
    }
}

/// Variable bindings for one evaluation
#[derive(Debug, Clone, Default)]
pub struct Activation {
    bindings: HashMap<String, Value>,
}

impl Activation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, serde_json::Value)> for Activation {
    fn from_iter<T: IntoIterator<Item = (S, serde_json::Value)>>(iter: T) -> Self {
        Self {
            bindings: iter
                .into_iter()
                .map(|(name, value)| (name.into(), Value::from(value)))
                .collect(),
        }
    }
}
