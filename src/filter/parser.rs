//! Recursive-descent parser for SCIM filter strings.
//!
//! Grammar:
//!
//! ```text
//! expr   := term ("or" term)*
//! term   := factor ("and" factor)*
//! factor := "(" expr ")" | path op value?
//! ```
//!
//! Without parentheses, `and` binds tighter than `or`. String literals are
//! double-quoted with `\"` and `\\` escapes; any other token is taken as a
//! bare word. Nesting depth is bounded.

use crate::error::{ScimError, ScimResult};

use super::{AttributePath, Filter, FilterOp};

const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Word(String),
    Literal(String),
}

fn tokenize(input: &str) -> ScimResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '(' {
            chars.next();
            tokens.push(Token::LParen);
        } else if c == ')' {
            chars.next();
            tokens.push(Token::RParen);
        } else if c == '"' {
            chars.next();
            let mut literal = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some('"') => literal.push('"'),
                        Some('\\') => literal.push('\\'),
                        other => {
                            return Err(ScimError::invalid_filter(format!(
                                "invalid escape sequence '\\{}'",
                                other.map(String::from).unwrap_or_default()
                            )));
                        }
                    },
                    Some('"') => break,
                    Some(ch) => literal.push(ch),
                    None => {
                        return Err(ScimError::invalid_filter(
                            "unterminated string literal".to_string(),
                        ));
                    }
                }
            }
            tokens.push(Token::Literal(literal));
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn parse_expr(&mut self, depth: usize) -> ScimResult<Filter> {
        if depth > MAX_DEPTH {
            return Err(ScimError::invalid_filter(format!(
                "filter nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        let mut terms = vec![self.parse_term(depth)?];
        while self.peek_keyword("or") {
            self.pos += 1;
            terms.push(self.parse_term(depth)?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().expect("one term")
        } else {
            Filter::Or(terms)
        })
    }

    fn parse_term(&mut self, depth: usize) -> ScimResult<Filter> {
        let mut factors = vec![self.parse_factor(depth)?];
        while self.peek_keyword("and") {
            self.pos += 1;
            factors.push(self.parse_factor(depth)?);
        }
        Ok(if factors.len() == 1 {
            factors.pop().expect("one factor")
        } else {
            Filter::And(factors)
        })
    }

    fn parse_factor(&mut self, depth: usize) -> ScimResult<Filter> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_expr(depth + 1)?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ScimError::invalid_filter(
                        "unbalanced parentheses".to_string(),
                    )),
                }
            }
            Some(Token::Word(path_word)) => self.parse_comparison(&path_word),
            other => Err(ScimError::invalid_filter(format!(
                "expected attribute path or '(', found {other:?}"
            ))),
        }
    }

    fn parse_comparison(&mut self, path_word: &str) -> ScimResult<Filter> {
        let path = AttributePath::parse(path_word).map_err(ScimError::InvalidFilter)?;
        let op = match self.next() {
            Some(Token::Word(word)) => FilterOp::parse(&word).ok_or_else(|| {
                ScimError::invalid_filter(format!("unknown operator '{word}'"))
            })?,
            other => {
                return Err(ScimError::invalid_filter(format!(
                    "expected operator after '{path}', found {other:?}"
                )));
            }
        };
        let value = if op.takes_value() {
            match self.next() {
                Some(Token::Literal(literal)) => Some(literal),
                Some(Token::Word(word)) => Some(word),
                other => {
                    return Err(ScimError::invalid_filter(format!(
                        "operator '{}' requires a value, found {other:?}",
                        op.as_str()
                    )));
                }
            }
        } else {
            None
        };
        Ok(Filter::Compare { path, op, value })
    }
}

/// Parse a complete filter string, rejecting trailing tokens.
pub(crate) fn parse(input: &str) -> ScimResult<Filter> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ScimError::invalid_filter("empty filter".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let filter = parser.parse_expr(0)?;
    if parser.pos != parser.tokens.len() {
        return Err(ScimError::invalid_filter(
            "unexpected trailing input".to_string(),
        ));
    }
    Ok(filter)
}
