//! Structured judgments and the response parser.
//!
//! Generated text is untrusted: it is decoded, normalized for the active
//! mode, validated against `schemas/judgment.schema.json` and only then
//! deserialized into a [`Judgment`].

mod parser;
mod schema;

pub use parser::{strip_code_fences, FormatError, Judgment};
pub use schema::{is_valid_judgment, validate_judgment_schema};
