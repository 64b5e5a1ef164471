//! Recursive-descent parser for query patterns.
//!
//! ```text
//! pattern   := root suffix*
//! root      := name | '@' role (('+' | '-') int)? | uri
//! suffix    := '/' relation | '(' cond (',' cond)* ')' | '[' int ']'
//! cond      := field ('=' | '!=') value
//! value     := name | int | '-' int | "quoted" | uri
//! uri       := scheme:rest | <anything>
//! ```

use super::ParseError;
use super::lexer::{Spanned, Token, tokenize};
use crate::Uri;
use crate::primitives::MAX_PATTERN_LENGTH;
use std::fmt;

// =============================================================================
// AST
// =============================================================================

/// A parsed pattern: a root and the steps folded over it, left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub root: Root,
    pub steps: Vec<Step>,
}

/// Where evaluation starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Root {
    /// Every entity of a type (or collection alias), in creation order.
    Collection(String),
    /// The focused entity for a role, optionally moved along the role's
    /// axis (`@frame+1` = one step toward the caller).
    Anchor { role: String, offset: i64 },
    /// One explicit entity.
    Uri(Uri),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `/name`
    Relation(String),
    /// `(a=b, c!=d)`, AND-combined.
    Filter(Vec<Condition>),
    /// `[n]`, 0-based.
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// `field op value`; the value is compared textually against the
/// property (see [`Value::matches_text`](crate::Value::matches_text)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    pub value: String,
}

impl Pattern {
    /// Parse a pattern.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        if source.len() > MAX_PATTERN_LENGTH {
            return Err(ParseError::too_long(source.len(), MAX_PATTERN_LENGTH));
        }
        let tokens = tokenize(source)
            .map_err(|(offset, found)| ParseError::invalid_character(offset, &found))?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            end: source.len(),
        };
        let root = parser.root()?;
        let mut steps = Vec::new();
        while !parser.at_end() {
            steps.push(parser.step()?);
        }
        Ok(Self { root, steps })
    }

    /// Whether evaluation yields at most one entity rather than a list.
    ///
    /// True when the last index step comes after the last relation step,
    /// or when there is no relation step and the root is an anchor or URI.
    pub fn is_single(&self) -> bool {
        let mut single = !matches!(self.root, Root::Collection(_));
        for step in &self.steps {
            match step {
                Step::Relation(_) => single = false,
                Step::Index(_) => single = true,
                Step::Filter(_) => {}
            }
        }
        single
    }
}

// =============================================================================
// PARSER
// =============================================================================

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    /// Offset reported for errors at end of input.
    end: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Spanned> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(spanned) => {
                ParseError::unexpected(spanned.offset, Some(&spanned.token.to_string()), expected)
            }
            None => ParseError::unexpected(self.end, None, expected),
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ParseError> {
        match self.peek() {
            Some(spanned) if spanned.token == *expected => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(what)),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().map(|s| &s.token) {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            _ => Err(self.error(what)),
        }
    }

    fn int(&mut self, what: &str) -> Result<u64, ParseError> {
        match self.peek().map(|s| &s.token) {
            Some(Token::Int(n)) => {
                self.pos += 1;
                Ok(*n)
            }
            _ => Err(self.error(what)),
        }
    }

    fn root(&mut self) -> Result<Root, ParseError> {
        let Some(spanned) = self.peek() else {
            return Err(self.error("type name, '@role' or URI"));
        };
        match &spanned.token {
            Token::Ident(name) => {
                self.pos += 1;
                Ok(Root::Collection(name.clone()))
            }
            Token::BareUri(uri) | Token::BracketUri(uri) => {
                self.pos += 1;
                Ok(Root::Uri(Uri::new(uri.as_str())))
            }
            Token::At => {
                self.pos += 1;
                let role = self.ident("role name after '@'")?;
                let offset = self.anchor_offset()?;
                Ok(Root::Anchor { role, offset })
            }
            _ => Err(self.error("type name, '@role' or URI")),
        }
    }

    fn anchor_offset(&mut self) -> Result<i64, ParseError> {
        let negative = match self.peek().map(|s| &s.token) {
            Some(Token::Plus) => false,
            Some(Token::Minus) => true,
            _ => return Ok(0),
        };
        self.pos += 1;
        let at = self.peek().map_or(self.end, |s| s.offset);
        let magnitude = self.int("offset after sign")?;
        let magnitude = i64::try_from(magnitude)
            .map_err(|_| ParseError::unexpected(at, Some(&magnitude.to_string()), "offset in range"))?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    fn step(&mut self) -> Result<Step, ParseError> {
        let Some(spanned) = self.advance() else {
            return Err(self.error("'/', '(' or '['"));
        };
        match spanned.token {
            Token::Slash => Ok(Step::Relation(self.ident("relation name after '/'")?)),
            Token::LParen => {
                let mut conditions = vec![self.condition()?];
                loop {
                    match self.peek().map(|s| &s.token) {
                        Some(Token::Comma) => {
                            self.pos += 1;
                            conditions.push(self.condition()?);
                        }
                        _ => break,
                    }
                }
                self.expect(&Token::RParen, "',' or ')'")?;
                Ok(Step::Filter(conditions))
            }
            Token::LBracket => {
                let at = self.peek().map_or(self.end, |s| s.offset);
                let n = self.int("index")?;
                let n = usize::try_from(n)
                    .map_err(|_| ParseError::unexpected(at, Some(&n.to_string()), "index in range"))?;
                self.expect(&Token::RBracket, "']'")?;
                Ok(Step::Index(n))
            }
            _ => {
                self.pos -= 1;
                Err(self.error("'/', '(' or '['"))
            }
        }
    }

    fn condition(&mut self) -> Result<Condition, ParseError> {
        let field = self.ident("field name")?;
        let op = match self.peek().map(|s| &s.token) {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            _ => return Err(self.error("'=' or '!='")),
        };
        self.pos += 1;
        let value = self.value()?;
        Ok(Condition { field, op, value })
    }

    fn value(&mut self) -> Result<String, ParseError> {
        let Some(spanned) = self.peek() else {
            return Err(self.error("value"));
        };
        let text = match &spanned.token {
            Token::Ident(s) | Token::Str(s) | Token::BareUri(s) | Token::BracketUri(s) => s.clone(),
            Token::Int(n) => n.to_string(),
            Token::Minus => {
                self.pos += 1;
                return Ok(format!("-{}", self.int("digits after '-'")?));
            }
            _ => return Err(self.error("value")),
        };
        self.pos += 1;
        Ok(text)
    }
}

// =============================================================================
// CANONICAL FORM
// =============================================================================

fn is_plain_word(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_plain_int(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_bare_uri(s: &str) -> bool {
    let Some((scheme, rest)) = s.split_once(':') else {
        return false;
    };
    let mut scheme_chars = scheme.chars();
    scheme_chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme_chars.all(|c| c.is_ascii_alphanumeric())
        && !rest.is_empty()
        && !rest
            .chars()
            .any(|c| c.is_whitespace() || "/()[],=!@<>".contains(c))
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Root::Collection(name) => f.write_str(name)?,
            Root::Anchor { role, offset } => {
                write!(f, "@{role}")?;
                if *offset > 0 {
                    write!(f, "+{offset}")?;
                } else if *offset < 0 {
                    write!(f, "{offset}")?;
                }
            }
            Root::Uri(uri) if is_bare_uri(uri.as_str()) => write!(f, "{uri}")?,
            Root::Uri(uri) => write!(f, "<{uri}>")?,
        }
        for step in &self.steps {
            match step {
                Step::Relation(name) => write!(f, "/{name}")?,
                Step::Index(n) => write!(f, "[{n}]")?,
                Step::Filter(conditions) => {
                    f.write_str("(")?;
                    for (i, cond) in conditions.iter().enumerate() {
                        if i > 0 {
                            f.write_str(",")?;
                        }
                        let op = match cond.op {
                            CompareOp::Eq => "=",
                            CompareOp::Ne => "!=",
                        };
                        write!(f, "{}{op}", cond.field)?;
                        if is_plain_word(&cond.value) || is_plain_int(&cond.value) {
                            f.write_str(&cond.value)?;
                        } else {
                            f.write_str("\"")?;
                            for c in cond.value.chars() {
                                if c == '"' || c == '\\' {
                                    f.write_str("\\")?;
                                }
                                write!(f, "{c}")?;
                            }
                            f.write_str("\"")?;
                        }
                    }
                    f.write_str(")")?;
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ParseErrorKind;

    fn parse(source: &str) -> Pattern {
        Pattern::parse(source).expect("parse")
    }

    #[test]
    fn collection_with_filter() {
        let p = parse("sessions(state=stopped)");
        assert_eq!(p.root, Root::Collection("sessions".into()));
        assert_eq!(
            p.steps,
            vec![Step::Filter(vec![Condition {
                field: "state".into(),
                op: CompareOp::Eq,
                value: "stopped".into(),
            }])]
        );
        assert!(!p.is_single());
    }

    #[test]
    fn anchors_with_offsets() {
        assert_eq!(
            parse("@frame+1").root,
            Root::Anchor { role: "frame".into(), offset: 1 }
        );
        assert_eq!(
            parse("@frame-2").root,
            Root::Anchor { role: "frame".into(), offset: -2 }
        );
        assert!(parse("@frame").is_single());
        assert!(!parse("@session/threads").is_single());
        assert!(parse("@session/threads[0]").is_single());
        assert!(parse("sessions[0](state=stopped)").is_single());
    }

    #[test]
    fn chained_steps() {
        let p = parse("@session/threads(state=stopped, name!=\"main loop\")[0]/frames");
        assert_eq!(p.steps.len(), 4);
        assert!(matches!(&p.steps[1], Step::Filter(c) if c.len() == 2 && c[1].op == CompareOp::Ne));
        assert_eq!(p.steps[2], Step::Index(0));
    }

    #[test]
    fn uri_roots() {
        assert_eq!(parse("session:1").root, Root::Uri(Uri::new("session:1")));
        assert_eq!(
            parse("<file:///tmp/a.py>/breakpoints").root,
            Root::Uri(Uri::new("file:///tmp/a.py"))
        );
    }

    #[test]
    fn canonical_display() {
        for (source, canonical) in [
            ("sessions ( state = stopped )", "sessions(state=stopped)"),
            ("@frame+1/scopes", "@frame+1/scopes"),
            ("@frame-1", "@frame-1"),
            ("<file:///tmp/a.py>", "<file:///tmp/a.py>"),
            ("<session:1>", "session:1"),
            ("threads(name=\"main loop\",id=-3)[2]", "threads(name=\"main loop\",id=-3)[2]"),
        ] {
            assert_eq!(parse(source).to_string(), canonical);
            assert_eq!(parse(canonical), parse(source));
        }
    }

    #[test]
    fn errors_name_the_offending_token() {
        let err = Pattern::parse("sessions(state=)").expect_err("missing value");
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
        assert_eq!(err.offset, 15);
        assert_eq!(err.found.as_deref(), Some(")"));

        let err = Pattern::parse("@").expect_err("missing role");
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);

        let err = Pattern::parse("sessions/").expect_err("missing relation");
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);

        let err = Pattern::parse("sessions]").expect_err("stray bracket");
        assert_eq!(err.offset, 8);

        let err = Pattern::parse("sessions[x]").expect_err("bad index");
        assert_eq!(err.found.as_deref(), Some("x"));

        let err = Pattern::parse("").expect_err("empty");
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);
    }

    #[test]
    fn overlong_patterns_are_rejected() {
        let source = "a".repeat(MAX_PATTERN_LENGTH + 1);
        let err = Pattern::parse(&source).expect_err("too long");
        assert_eq!(err.kind, ParseErrorKind::TooLong);
    }
}
