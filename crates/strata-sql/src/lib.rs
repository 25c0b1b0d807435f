//! SQL generation for the relational backend.
//!
//! Patterns use pg-promise style placeholders: `$N` binds a value, `$N:name`
//! an identifier and `$N:raw` a raw SQL fragment. [`prepare`] writes
//! identifiers and fragments into the statement text and turns values into
//! positional parameters.

mod emitter;
pub use emitter::Emitter;

pub mod compile;
pub use compile::{compile_aggregate, compile_update, compile_where, Aggregate, Assignments, Where};

mod format;
pub use format::{placeholders, prepare};

pub mod functions;

pub mod ident;

pub mod regex;

pub mod stmt;
pub use stmt::Statement;

mod ty;
pub use ty::column_type;
