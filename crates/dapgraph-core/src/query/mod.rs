//! # Query Language
//!
//! Compact path/filter patterns over the store:
//!
//! | Pattern | Meaning |
//! |---------|---------|
//! | `sessions` | every session, creation order |
//! | `sessions(state=stopped)` | filtered list |
//! | `sessions[0]` | first session, or nothing |
//! | `@frame` | focused frame |
//! | `@frame+1` | caller of the focused frame |
//! | `@session/threads` | threads of the focused session |
//! | `<file:///a.py>/breakpoints` | breakpoints on a source |
//!
//! Parsing ([`Pattern::parse`]) is separate from evaluation
//! ([`Resolver`]). An unknown relation name yields an empty result, not
//! an error.

mod error;
mod lexer;
mod parser;
mod resolver;

pub use error::{ParseError, ParseErrorKind};
pub use lexer::Token;
pub use parser::{CompareOp, Condition, Pattern, Root, Step};
pub use resolver::{Resolution, Resolver};
