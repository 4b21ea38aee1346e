// src/expr/mod.rs

//! Boolean expressions over named children.
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or   := and ( "|" and )*
//! and  := not ( "&" not )*
//! not  := "!" not | atom
//! atom := name | "true" | "false" | "(" or ")"
//! ```
//!
//! Evaluation is three-valued (Kleene): `Unknown & False == False`,
//! `Unknown | True == True`, otherwise `Unknown` is contagious. Names
//! without a value evaluate to `Unknown`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{JobTreeError, Result};
use crate::types::LogicalValue;

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_.\-]*").expect("valid name pattern")
});

/// Turns child values into a job list's value.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        expression: &str,
        values: &HashMap<String, LogicalValue>,
    ) -> Result<LogicalValue>;
}

/// Child names an expression refers to, in order of first appearance.
pub fn referenced_names(expression: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in NAME.find_iter(expression) {
        let name = m.as_str();
        if name == "true" || name == "false" || out.iter().any(|n| n == name) {
            continue;
        }
        out.push(name.to_string());
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = expression;

    while let Some(ch) = rest.chars().next() {
        if ch.is_whitespace() {
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        let token = match ch {
            '!' => Token::Not,
            '&' => Token::And,
            '|' => Token::Or,
            '(' => Token::Open,
            ')' => Token::Close,
            _ => match NAME.find(rest) {
                Some(m) if m.start() == 0 => {
                    rest = &rest[m.end()..];
                    tokens.push(Token::Name(m.as_str().to_string()));
                    continue;
                }
                _ => {
                    return Err(JobTreeError::Expression(format!(
                        "unexpected character '{ch}' in '{expression}'"
                    )));
                }
            },
        };
        tokens.push(token);
        rest = &rest[ch.len_utf8()..];
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    values: &'a HashMap<String, LogicalValue>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or(&mut self) -> Result<LogicalValue> {
        let mut acc = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            acc = or(acc, self.and()?);
        }
        Ok(acc)
    }

    fn and(&mut self) -> Result<LogicalValue> {
        let mut acc = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            acc = and(acc, self.not()?);
        }
        Ok(acc)
    }

    fn not(&mut self) -> Result<LogicalValue> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(not(self.not()?));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<LogicalValue> {
        let token = self.peek().cloned();
        self.pos += 1;
        match token {
            Some(Token::Name(name)) => Ok(match name.as_str() {
                "true" => LogicalValue::True,
                "false" => LogicalValue::False,
                _ => self.values.get(&name).copied().unwrap_or_default(),
            }),
            Some(Token::Open) => {
                let inner = self.or()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(JobTreeError::Expression("missing ')'".into()));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(t) => Err(JobTreeError::Expression(format!("unexpected token {t:?}"))),
            None => Err(JobTreeError::Expression("unexpected end of expression".into())),
        }
    }
}

fn and(a: LogicalValue, b: LogicalValue) -> LogicalValue {
    use LogicalValue::*;
    match (a, b) {
        (False, _) | (_, False) => False,
        (True, True) => True,
        _ => Unknown,
    }
}

fn or(a: LogicalValue, b: LogicalValue) -> LogicalValue {
    use LogicalValue::*;
    match (a, b) {
        (True, _) | (_, True) => True,
        (False, False) => False,
        _ => Unknown,
    }
}

fn not(a: LogicalValue) -> LogicalValue {
    match a {
        LogicalValue::True => LogicalValue::False,
        LogicalValue::False => LogicalValue::True,
        LogicalValue::Unknown => LogicalValue::Unknown,
    }
}

/// Default evaluator: `!`, `&`, `|`, parentheses, Kleene logic.
#[derive(Debug, Default, Clone, Copy)]
pub struct KleeneEvaluator;

impl KleeneEvaluator {
    /// Parse `expression` without evaluating it.
    pub fn check(&self, expression: &str) -> Result<()> {
        self.evaluate(expression, &HashMap::new()).map(|_| ())
    }
}

impl ExpressionEvaluator for KleeneEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        values: &HashMap<String, LogicalValue>,
    ) -> Result<LogicalValue> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            values,
        };
        let value = parser.or()?;
        if parser.pos != tokens.len() {
            return Err(JobTreeError::Expression(format!(
                "trailing input in '{expression}'"
            )));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LogicalValue::*;

    fn eval(expr: &str, values: &[(&str, LogicalValue)]) -> LogicalValue {
        let map = values.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        KleeneEvaluator.evaluate(expr, &map).unwrap()
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(eval("a | b & c", &[("a", True), ("b", False), ("c", False)]), True);
        assert_eq!(eval("(a | b) & c", &[("a", True), ("b", False), ("c", False)]), False);
        assert_eq!(eval("!a & b", &[("a", False), ("b", True)]), True);
    }

    #[test]
    fn unknown_follows_kleene_rules() {
        assert_eq!(eval("a & b", &[("a", Unknown), ("b", False)]), False);
        assert_eq!(eval("a | b", &[("a", Unknown), ("b", True)]), True);
        assert_eq!(eval("a & b", &[("a", Unknown), ("b", True)]), Unknown);
        assert_eq!(eval("!missing", &[]), Unknown);
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(KleeneEvaluator.check("a &").is_err());
        assert!(KleeneEvaluator.check("(a | b").is_err());
        assert!(KleeneEvaluator.check("a b").is_err());
        assert!(KleeneEvaluator.check("a + b").is_err());
    }

    #[test]
    fn referenced_names_skip_literals_and_duplicates() {
        assert_eq!(referenced_names("a & (b | !a) & true"), vec!["a", "b"]);
        assert_eq!(referenced_names("disk-check & net.up"), vec!["disk-check", "net.up"]);
    }
}
