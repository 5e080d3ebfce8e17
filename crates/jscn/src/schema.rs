//! Compiled schema values and the combinators over them.
//!
//! `Schema` and `Definitions` are immutable; every combinator builds a new
//! value. Merging detects conflicting bindings eagerly, while unresolved
//! references are only detected when `jsonschema` is requested, so a schema
//! may legitimately stay incomplete until later `|` steps supply its
//! definitions.

use std::ops::{BitAnd, BitOr};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{JscnError, Result};
use crate::lower::lower_schema;
use crate::syntax::ast::{SchemaAst, Type};
use crate::syntax::parser::{parse_definitions, parse_schema};

/// A parsed JSCN schema: a root type plus its definition table.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    root: Type,
    defs: IndexMap<String, Type>,
}

/// A bare definition table, combinable into schemas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Definitions {
    defs: IndexMap<String, Type>,
}

impl From<SchemaAst> for Schema {
    fn from(ast: SchemaAst) -> Self {
        Self {
            root: ast.root,
            defs: ast.defs,
        }
    }
}

impl Schema {
    pub fn parse(source: &str) -> Result<Self> {
        parse_schema(source).map(Schema::from)
    }

    pub fn root(&self) -> &Type {
        &self.root
    }

    pub fn definitions(&self) -> &IndexMap<String, Type> {
        &self.defs
    }

    /// Lower into a draft-07 document. Pure: repeated calls yield equal
    /// values.
    pub fn jsonschema(&self) -> Result<Value> {
        lower_schema(&self.root, &self.defs)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(self.jsonschema()?.to_string())
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(format!("{:#}", self.jsonschema()?))
    }

    /// `anyOf` of the two roots over the merged definition tables.
    pub fn union(self, other: Schema) -> Result<Schema> {
        let defs = merge_defs(self.defs, other.defs)?;
        Ok(Schema {
            root: Type::AnyOf(vec![self.root, other.root]),
            defs,
        })
    }

    /// `allOf` of the two roots over the merged definition tables.
    pub fn intersect(self, other: Schema) -> Result<Schema> {
        let defs = merge_defs(self.defs, other.defs)?;
        Ok(Schema {
            root: Type::AllOf(vec![self.root, other.root]),
            defs,
        })
    }

    /// Keep the root, merge in more definitions.
    pub fn with_definitions(self, other: Definitions) -> Result<Schema> {
        let defs = merge_defs(self.defs, other.defs)?;
        Ok(Schema {
            root: self.root,
            defs,
        })
    }
}

impl Definitions {
    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self {
            defs: parse_definitions(source)?,
        })
    }

    pub fn definitions(&self) -> &IndexMap<String, Type> {
        &self.defs
    }

    pub fn merge(self, other: Definitions) -> Result<Definitions> {
        Ok(Definitions {
            defs: merge_defs(self.defs, other.defs)?,
        })
    }
}

/// Left side first, then right-side names not already present. A name bound
/// on both sides must be bound to structurally equal types.
fn merge_defs(
    left: IndexMap<String, Type>,
    right: IndexMap<String, Type>,
) -> Result<IndexMap<String, Type>> {
    let mut merged = left;
    for (name, ty) in right {
        match merged.get(&name) {
            Some(existing) if *existing != ty => {
                return Err(JscnError::DefinitionConflict(name));
            }
            Some(_) => {}
            None => {
                merged.insert(name, ty);
            }
        }
    }
    debug!(definitions = merged.len(), "merged definition tables");
    Ok(merged)
}

impl BitOr for Schema {
    type Output = Result<Schema>;

    fn bitor(self, rhs: Schema) -> Self::Output {
        self.union(rhs)
    }
}

impl BitAnd for Schema {
    type Output = Result<Schema>;

    fn bitand(self, rhs: Schema) -> Self::Output {
        self.intersect(rhs)
    }
}

impl BitOr<Definitions> for Schema {
    type Output = Result<Schema>;

    fn bitor(self, rhs: Definitions) -> Self::Output {
        self.with_definitions(rhs)
    }
}

impl BitAnd<Definitions> for Schema {
    type Output = Result<Schema>;

    fn bitand(self, rhs: Definitions) -> Self::Output {
        self.with_definitions(rhs)
    }
}

impl BitOr<Schema> for Definitions {
    type Output = Result<Schema>;

    fn bitor(self, rhs: Schema) -> Self::Output {
        rhs.with_definitions(self)
    }
}

impl BitAnd<Schema> for Definitions {
    type Output = Result<Schema>;

    fn bitand(self, rhs: Schema) -> Self::Output {
        rhs.with_definitions(self)
    }
}

impl BitOr for Definitions {
    type Output = Result<Definitions>;

    fn bitor(self, rhs: Definitions) -> Self::Output {
        self.merge(rhs)
    }
}

impl BitAnd for Definitions {
    type Output = Result<Definitions>;

    fn bitand(self, rhs: Definitions) -> Self::Output {
        self.merge(rhs)
    }
}
