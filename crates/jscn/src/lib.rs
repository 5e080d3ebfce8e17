pub mod error;
pub mod lower;
mod schema;
pub mod syntax;

pub use error::{JscnError, ParseDiagnostic, Result};
pub use lower::{lower_schema, SCHEMA_URI};
pub use schema::{Definitions, Schema};
pub use syntax::parser::{
    parse_definitions, parse_definitions_diagnostic, parse_schema, parse_schema_diagnostic,
};
