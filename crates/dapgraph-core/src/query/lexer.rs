//! Tokens of the query pattern language, via logos.

use logos::{Lexer, Logos};
use std::fmt;

/// Query pattern token.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token("=")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("@")]
    At,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,

    /// Unsigned decimal integer.
    #[regex("[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(u64),

    /// Type names, relation names, roles, field names and bare values.
    #[regex("[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    /// Double-quoted value; `\"` and `\\` escape.
    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    Str(String),

    /// `<anything-without-spaces>`
    #[regex(r"<[^<>\s]+>", |lex| trim_delimiters(lex.slice()))]
    BracketUri(String),

    /// `scheme:rest`, with no separators in `rest`.
    #[regex(r"[A-Za-z][A-Za-z0-9]*:[^\s/()\[\],=!@<>]+", |lex| lex.slice().to_string())]
    BareUri(String),
}

fn trim_delimiters(slice: &str) -> String {
    let mut chars = slice.chars();
    chars.next();
    chars.next_back();
    chars.as_str().to_string()
}

fn unquote(lex: &mut Lexer<Token>) -> String {
    let inner = trim_delimiters(lex.slice());
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slash => f.write_str("/"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::LBracket => f.write_str("["),
            Self::RBracket => f.write_str("]"),
            Self::Comma => f.write_str(","),
            Self::Eq => f.write_str("="),
            Self::Ne => f.write_str("!="),
            Self::At => f.write_str("@"),
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Ident(s) | Self::BareUri(s) => f.write_str(s),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::BracketUri(s) => write!(f, "<{s}>"),
        }
    }
}

/// A token with its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Tokenize a pattern; the error carries the offending offset and text.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, (usize, String)> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push(Spanned {
                token,
                offset: span.start,
            }),
            Err(()) => {
                let found = source.get(span.clone()).unwrap_or_default().to_string();
                return Err((span.start, found));
            }
        }
    }
    Ok(tokens)
}
