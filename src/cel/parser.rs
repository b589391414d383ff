//! Recursive-descent parser for CEL
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, relations (`< <= > >= == != in`),
//! `+ -`, `* / %`, unary `! -`, member access / index / call.

use super::ast::{BinaryOp, Expr, ExprKind, Literal, Macro, UnaryOp};
use super::lexer::{self, Spanned, Token};

/// Parser nesting limit; deeper expressions are rejected instead of exhausting the stack
const MAX_DEPTH: usize = 100;

/// Tree height limit, which bounds recursion in the checker and evaluator
const MAX_HEIGHT: usize = 100;

const RECURSION_LIMIT: &str = "Syntax error: expression recursion limit exceeded";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseError {
    pub offset: usize,
    pub message: String,
}

pub(crate) fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = lexer::tokenize(source).map_err(|e| ParseError {
        offset: e.offset,
        message: e.message,
    })?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expr()?;
    let trailing = parser.current();
    if trailing.token != Token::Eof {
        return Err(ParseError {
            offset: trailing.offset,
            message: format!("Syntax error: extraneous input '{}'", trailing.token),
        });
    }
    Ok(expr)
}

struct Parser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    depth: usize,
}

type ParseResult<T> = Result<T, ParseError>;

impl<'t> Parser<'t> {
    fn current(&self) -> &'t Spanned {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &'t Token {
        &self.current().token
    }

    fn advance(&mut self) -> &'t Spanned {
        let token = self.current();
        if token.token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            return true;
        }
        false
    }

    fn error<T>(&self, expecting: &str) -> ParseResult<T> {
        let current = self.current();
        Err(ParseError {
            offset: current.offset,
            message: format!(
                "Syntax error: mismatched input '{}' expecting {}",
                current.token, expecting
            ),
        })
    }

    fn expect(&mut self, token: &Token, expecting: &str) -> ParseResult<()> {
        if self.eat(token) {
            return Ok(());
        }
        self.error(expecting)
    }

    fn expect_ident(&mut self) -> ParseResult<(String, usize)> {
        let current = self.current();
        if let Token::Ident(name) = &current.token {
            self.advance();
            return Ok((name.clone(), current.offset));
        }
        self.error("IDENTIFIER")
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError {
                offset: self.current().offset,
                message: RECURSION_LIMIT.to_string(),
            });
        }
        let result = self.parse_conditional();
        self.depth -= 1;
        result
    }

    /// Rejects `expr` once it is taller than the evaluator may recurse
    fn bounded(&self, expr: Expr) -> ParseResult<Expr> {
        if expr.height() > MAX_HEIGHT {
            return Err(ParseError {
                offset: expr.offset,
                message: RECURSION_LIMIT.to_string(),
            });
        }
        Ok(expr)
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let condition = self.parse_or()?;
        let offset = self.current().offset;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.parse_or()?;
        self.expect(&Token::Colon, "':'")?;
        let otherwise = self.parse_expr()?;
        self.bounded(Expr::new(
            offset,
            ExprKind::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        ))
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let first = self.parse_and()?;
        let mut rest = Vec::new();
        while self.peek() == &Token::Or {
            let offset = self.advance().offset;
            rest.push((offset, self.parse_and()?));
        }
        self.bounded(balanced(BinaryOp::Or, first, rest))
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let first = self.parse_relation()?;
        let mut rest = Vec::new();
        while self.peek() == &Token::And {
            let offset = self.advance().offset;
            rest.push((offset, self.parse_relation()?));
        }
        self.bounded(balanced(BinaryOp::And, first, rest))
    }

    fn parse_relation(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_addition()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                Token::In => BinaryOp::In,
                _ => return Ok(lhs),
            };
            let offset = self.advance().offset;
            let rhs = self.parse_addition()?;
            lhs = self.bounded(binary(offset, op, lhs, rhs))?;
        }
    }

    fn parse_addition(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_multiplication()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            let offset = self.advance().offset;
            let rhs = self.parse_multiplication()?;
            lhs = self.bounded(binary(offset, op, lhs, rhs))?;
        }
    }

    fn parse_multiplication(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            let offset = self.advance().offset;
            let rhs = self.parse_unary()?;
            lhs = self.bounded(binary(offset, op, lhs, rhs))?;
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.parse_member(),
        };
        let offset = self.advance().offset;

        // Fold negative numeric literals so `-1` is a literal, not a call
        if op == UnaryOp::Neg {
            match self.peek() {
                Token::Int(magnitude) => {
                    let literal = self.advance();
                    let value = 0i64
                        .checked_sub_unsigned(*magnitude)
                        .ok_or_else(|| invalid_int(literal.offset))?;
                    return Ok(Expr::new(offset, ExprKind::Literal(Literal::Int(value))));
                }
                Token::Double(value) => {
                    self.advance();
                    return Ok(Expr::new(
                        offset,
                        ExprKind::Literal(Literal::Double(-value)),
                    ));
                }
                _ => {}
            }
        }

        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError {
                offset,
                message: RECURSION_LIMIT.to_string(),
            });
        }
        let operand = self.parse_unary();
        self.depth -= 1;
        self.bounded(Expr::new(
            offset,
            ExprKind::Unary {
                op,
                operand: Box::new(operand?),
            },
        ))
    }

    fn parse_member(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    let dot = self.advance().offset;
                    let (field, field_offset) = self.expect_ident()?;
                    if self.eat(&Token::LParen) {
                        let args = self.parse_arguments(&Token::RParen, "')'")?;
                        expr = self.bounded(self.member_call(expr, field, field_offset, args)?)?;
                    } else {
                        expr = self.bounded(Expr::new(
                            dot,
                            ExprKind::Select {
                                operand: Box::new(expr),
                                field,
                                test_only: false,
                            },
                        ))?;
                    }
                }
                Token::LBracket => {
                    let offset = self.advance().offset;
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = self.bounded(Expr::new(
                        offset,
                        ExprKind::Index {
                            operand: Box::new(expr),
                            index: Box::new(index),
                        },
                    ))?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let current = self.current();
        let offset = current.offset;
        let literal = |value| Ok(Expr::new(offset, ExprKind::Literal(value)));

        match &current.token {
            Token::Int(magnitude) => {
                self.advance();
                let value = i64::try_from(*magnitude).map_err(|_| invalid_int(offset))?;
                literal(Literal::Int(value))
            }
            Token::Uint(v) => {
                self.advance();
                literal(Literal::Uint(*v))
            }
            Token::Double(v) => {
                self.advance();
                literal(Literal::Double(*v))
            }
            Token::Str(s) => {
                self.advance();
                literal(Literal::String(s.clone()))
            }
            Token::True => {
                self.advance();
                literal(Literal::Bool(true))
            }
            Token::False => {
                self.advance();
                literal(Literal::Bool(false))
            }
            Token::Null => {
                self.advance();
                literal(Literal::Null)
            }
            Token::Ident(name) => {
                self.advance();
                if self.eat(&Token::LParen) {
                    let args = self.parse_arguments(&Token::RParen, "')'")?;
                    return self.bounded(global_call(name.clone(), offset, args)?);
                }
                Ok(Expr::new(offset, ExprKind::Ident(name.clone())))
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                let items = self.parse_arguments(&Token::RBracket, "']'")?;
                self.bounded(Expr::new(offset, ExprKind::List(items)))
            }
            Token::LBrace => {
                self.advance();
                self.parse_map(offset)
            }
            _ => self.error("an expression"),
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed
    fn parse_arguments(&mut self, close: &Token, expecting: &str) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(close) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(close) {
                return Ok(args);
            }
            self.expect(&Token::Comma, expecting)?;
            if self.eat(close) {
                return Ok(args);
            }
        }
    }

    fn parse_map(&mut self, offset: usize) -> ParseResult<Expr> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::new(offset, ExprKind::Map(entries)));
        }
        loop {
            let key = self.parse_expr()?;
            self.expect(&Token::Colon, "':'")?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            if self.eat(&Token::RBrace) {
                break;
            }
            self.expect(&Token::Comma, "'}'")?;
            if self.eat(&Token::RBrace) {
                break;
            }
        }
        self.bounded(Expr::new(offset, ExprKind::Map(entries)))
    }

    fn member_call(
        &self,
        target: Expr,
        function: String,
        offset: usize,
        args: Vec<Expr>,
    ) -> ParseResult<Expr> {
        let Some(kind) = Macro::from_name(&function) else {
            return Ok(call(offset, Some(target), function, args));
        };
        let arity_ok = match kind {
            Macro::Map => args.len() == 2 || args.len() == 3,
            _ => args.len() == 2,
        };
        if !arity_ok {
            // Not a macro shape; leave it to the checker as an ordinary call
            return Ok(call(offset, Some(target), function, args));
        }

        let mut args = args.into_iter();
        let (Some(first), Some(second)) = (args.next(), args.next()) else {
            return Ok(call(offset, Some(target), function, Vec::new()));
        };
        let ExprKind::Ident(variable) = first.kind else {
            return Err(ParseError {
                offset: first.offset,
                message: format!(
                    "Syntax error: argument to {}() must be a simple name",
                    kind.name()
                ),
            });
        };
        let (filter, body) = match args.next() {
            Some(transform) => (Some(Box::new(second)), transform),
            None => (None, second),
        };
        Ok(Expr::new(
            offset,
            ExprKind::Comprehension {
                kind,
                range: Box::new(target),
                variable,
                filter,
                body: Box::new(body),
            },
        ))
    }
}

fn binary(offset: usize, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(
        offset,
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    )
}

/// Joins a chain of one associative operator into a balanced tree
///
/// `rest` pairs each operator's offset with the operand to its right. Operand
/// order is preserved.
fn balanced(op: BinaryOp, first: Expr, mut rest: Vec<(usize, Expr)>) -> Expr {
    if rest.is_empty() {
        return first;
    }
    let right = rest.split_off(rest.len() / 2);
    let mut right = right.into_iter();
    let Some((offset, right_first)) = right.next() else {
        return balanced(op, first, rest);
    };
    let lhs = balanced(op, first, rest);
    let rhs = balanced(op, right_first, right.collect());
    binary(offset, op, lhs, rhs)
}

fn invalid_int(offset: usize) -> ParseError {
    ParseError {
        offset,
        message: "Syntax error: invalid int literal".to_string(),
    }
}

fn call(offset: usize, target: Option<Expr>, function: String, args: Vec<Expr>) -> Expr {
    Expr::new(
        offset,
        ExprKind::Call {
            target: target.map(Box::new),
            function,
            args,
        },
    )
}

fn global_call(function: String, offset: usize, args: Vec<Expr>) -> ParseResult<Expr> {
    if function != "has" {
        return Ok(call(offset, None, function, args));
    }
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (
            Some(Expr {
                offset: select_offset,
                kind:
                    ExprKind::Select {
                        operand,
                        field,
                        test_only: false,
                    },
                ..
            }),
            None,
        ) => Ok(Expr::new(
            select_offset,
            ExprKind::Select {
                operand,
                field,
                test_only: true,
            },
        )),
        _ => Err(ParseError {
            offset,
            message: "Syntax error: invalid argument to has() macro".to_string(),
        }),
    }
}
