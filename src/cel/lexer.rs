//! Tokenizer for CEL source text

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// Unsigned magnitude; the parser applies the sign and range check
    Int(u64),
    Uint(u64),
    Double(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Int(v) => return write!(f, "{v}"),
            Token::Uint(v) => return write!(f, "{v}u"),
            Token::Double(v) => return write!(f, "{v}"),
            Token::Str(s) => return write!(f, "{s:?}"),
            Token::Ident(name) => return f.write_str(name),
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::In => "in",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Question => "?",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Not => "!",
            Token::And => "&&",
            Token::Or => "||",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Eof => "<EOF>",
        };
        f.write_str(text)
    }
}

/// A token and the byte offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub offset: usize,
    pub message: String,
}

impl LexError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Splits `source` into tokens; the last token is always `Eof`
pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, LexError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map_or(self.source.len(), |&(offset, _)| offset)
    }

    fn run(mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let offset = self.offset();
            let Some(c) = self.peek() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    offset,
                });
                return Ok(tokens);
            };

            let token = match c {
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(false)?,
                'r' | 'R' if matches!(self.peek_at(1), Some('"') | Some('\'')) => {
                    self.pos += 1;
                    self.string(true)?
                }
                c if c == '_' || c.is_ascii_alphabetic() => self.identifier(),
                _ => self.operator(c, offset)?,
            };
            tokens.push(Spanned { token, offset });
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '/' && self.peek_at(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn operator(&mut self, c: char, offset: usize) -> Result<Token, LexError> {
        let next = self.peek_at(1);
        let (token, width) = match (c, next) {
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Not, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            ('.', _) => (Token::Dot, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            ('?', _) => (Token::Question, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            _ => {
                return Err(LexError::new(
                    offset,
                    format!("Syntax error: token recognition error at: '{c}'"),
                ));
            }
        };
        self.pos += width;
        Ok(token)
    }

    fn identifier(&mut self) -> Token {
        let start = self.offset();
        while self
            .peek()
            .is_some_and(|c| c == '_' || c.is_ascii_alphanumeric())
        {
            self.pos += 1;
        }
        match &self.source[start..self.offset()] {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "in" => Token::In,
            name => Token::Ident(name.to_string()),
        }
    }

    fn number(&mut self) -> Result<Token, LexError> {
        let start = self.offset();

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            let digits_start = self.offset();
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = &self.source[digits_start..self.offset()];
            if self.eat_uint_suffix() {
                return u64::from_str_radix(digits, 16)
                    .map(Token::Uint)
                    .map_err(|_| LexError::new(start, "Syntax error: invalid uint literal"));
            }
            return u64::from_str_radix(digits, 16)
                .map(Token::Int)
                .map_err(|_| LexError::new(start, "Syntax error: invalid int literal"));
        }

        let mut is_double = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+') | Some('-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                self.pos += 1 + sign;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text = &self.source[start..self.offset()];
        if is_double {
            return text
                .parse::<f64>()
                .map(Token::Double)
                .map_err(|_| LexError::new(start, "Syntax error: invalid double literal"));
        }
        if self.eat_uint_suffix() {
            return text
                .parse::<u64>()
                .map(Token::Uint)
                .map_err(|_| LexError::new(start, "Syntax error: invalid uint literal"));
        }
        text.parse::<u64>()
            .map(Token::Int)
            .map_err(|_| LexError::new(start, "Syntax error: invalid int literal"))
    }

    fn eat_uint_suffix(&mut self) -> bool {
        if matches!(self.peek(), Some('u') | Some('U')) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn string(&mut self, raw: bool) -> Result<Token, LexError> {
        let start = self.offset();
        let Some(quote) = self.peek() else {
            return Err(LexError::new(start, "Syntax error: unterminated string"));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(LexError::new(start, "Syntax error: unterminated string"));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' && !triple {
                return Err(LexError::new(start, "Syntax error: unterminated string"));
            }
            if c == '\\' && !raw {
                self.pos += 1;
                value.push(self.escape(start)?);
                continue;
            }
            value.push(c);
            self.pos += 1;
        }
        Ok(Token::Str(value))
    }

    fn escape(&mut self, start: usize) -> Result<char, LexError> {
        let invalid = || LexError::new(start, "Syntax error: invalid escape sequence");
        let c = self.peek().ok_or_else(invalid)?;
        self.pos += 1;
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0c}',
            'v' => '\u{0b}',
            '\\' | '\'' | '"' | '`' | '?' => c,
            'x' => self.hex_escape(2).ok_or_else(invalid)?,
            'u' => self.hex_escape(4).ok_or_else(invalid)?,
            'U' => self.hex_escape(8).ok_or_else(invalid)?,
            '0'..='3' => {
                let mut code = c.to_digit(8).ok_or_else(invalid)?;
                for _ in 0..2 {
                    let digit = self.peek().and_then(|d| d.to_digit(8)).ok_or_else(invalid)?;
                    code = code * 8 + digit;
                    self.pos += 1;
                }
                char::from_u32(code).ok_or_else(invalid)?
            }
            _ => return Err(invalid()),
        };
        Ok(decoded)
    }

    fn hex_escape(&mut self, digits: usize) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            code = code * 16 + self.peek()?.to_digit(16)?;
            self.pos += 1;
        }
        char::from_u32(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            kinds("1 + 2u >= 3.5 && !x"),
            vec![
                Token::Int(1),
                Token::Plus,
                Token::Uint(2),
                Token::Ge,
                Token::Double(3.5),
                Token::And,
                Token::Not,
                Token::Ident("x".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_member_access_after_index() {
        assert_eq!(
            kinds("items[0].name"),
            vec![
                Token::Ident("items".to_string()),
                Token::LBracket,
                Token::Int(0),
                Token::RBracket,
                Token::Dot,
                Token::Ident("name".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'a\'b' "c\n" r"\d+" """x"y""""#),
            vec![
                Token::Str("a'b".to_string()),
                Token::Str("c\n".to_string()),
                Token::Str("\\d+".to_string()),
                Token::Str("x\"y".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("a // trailing\n|| b"),
            vec![
                Token::Ident("a".to_string()),
                Token::Or,
                Token::Ident("b".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_offsets_point_at_token_start() {
        let tokens = tokenize("ab  == cd").unwrap();
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 4, 7, 9]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("'abc").unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(err.message.contains("Syntax error"));
    }

    #[test]
    fn test_unknown_character() {
        let err = tokenize("a # b").unwrap_err();
        assert_eq!(err.offset, 2);
        assert!(err.message.contains("token recognition error"));
    }
}
