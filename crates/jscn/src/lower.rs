//! Lowering of parsed JSCN types into JSON Schema draft-07 fragments.
//!
//! Key order in the emitted maps is insertion order and therefore stable
//! across runs; `definitions` contains only entries transitively referenced
//! from the root.

use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{JscnError, Result};
use crate::syntax::ast::{
    Cardinal, Keyword, NameConstraint, ObjectProperty, RepeatMode, Restriction, Type,
};

pub const SCHEMA_URI: &str = "http://json-schema.org/draft-07/schema#";

/// Lower a root type against its definition table into a complete
/// draft-07 document.
pub fn lower_schema(root: &Type, defs: &IndexMap<String, Type>) -> Result<Value> {
    let mut ctx = Lowering {
        defs,
        reached: IndexSet::new(),
    };
    let root_value = ctx.lower(root)?;

    // Reachability is transitive: lowering a definition body may mark
    // further definitions, so iterate to a fixpoint.
    let mut lowered: IndexMap<String, Value> = IndexMap::new();
    loop {
        let pending: Vec<String> = ctx
            .reached
            .iter()
            .filter(|name| !lowered.contains_key(name.as_str()))
            .cloned()
            .collect();
        if pending.is_empty() {
            break;
        }
        for name in pending {
            if let Some(body) = defs.get(&name) {
                let value = ctx.lower(body)?;
                lowered.insert(name, value);
            }
        }
    }
    debug!(
        referenced = lowered.len(),
        declared = defs.len(),
        "lowered schema"
    );

    let mut top = Map::new();
    top.insert("$schema".to_string(), json!(SCHEMA_URI));
    match root_value {
        Value::Object(fields) => {
            for (key, value) in fields {
                top.insert(key, value);
            }
        }
        // A root `forbidden` lowers to the boolean `false` schema, which has
        // no key-value splice; `"not": {}` is its draft-07 object spelling.
        _ => {
            top.insert("not".to_string(), json!({}));
        }
    }
    if !lowered.is_empty() {
        let mut emitted = Map::new();
        for name in defs.keys() {
            if let Some(value) = lowered.swap_remove(name) {
                emitted.insert(name.clone(), value);
            }
        }
        top.insert("definitions".to_string(), Value::Object(emitted));
    }
    Ok(Value::Object(top))
}

struct Lowering<'a> {
    defs: &'a IndexMap<String, Type>,
    reached: IndexSet<String>,
}

impl Lowering<'_> {
    fn lower(&mut self, ty: &Type) -> Result<Value> {
        match ty {
            Type::Literal(value) => Ok(json!({ "const": value })),
            Type::Enum(values) => Ok(json!({ "enum": values })),
            Type::Keyword(kw) => Ok(match kw.type_name() {
                Some(name) => json!({ "type": name }),
                None => Value::Bool(false),
            }),
            Type::Regex(pattern) => Ok(json!({ "type": "string", "pattern": pattern })),
            Type::Format(format) => Ok(json!({ "type": "string", "format": format })),
            Type::StringCard(card) => {
                let mut out = Map::new();
                out.insert("type".to_string(), json!("string"));
                if let Some(min) = card.min {
                    out.insert("minLength".to_string(), json!(min));
                }
                if let Some(max) = card.max {
                    out.insert("maxLength".to_string(), json!(max));
                }
                Ok(Value::Object(out))
            }
            Type::IntegerCard { card, multiple_of } => {
                Ok(self.lower_numeric("integer", card, *multiple_of))
            }
            Type::NumberCard { card, multiple_of } => {
                Ok(self.lower_numeric("number", card, *multiple_of))
            }
            Type::Ref(name) => {
                if !self.defs.contains_key(name) {
                    return Err(JscnError::UnresolvedReference(name.clone()));
                }
                self.reached.insert(name.clone());
                Ok(json!({ "$ref": format!("#/definitions/{}", name) }))
            }
            Type::Not(inner) => Ok(json!({ "not": self.lower(inner)? })),
            Type::AllOf(members) => {
                let lowered: Vec<Value> = members
                    .iter()
                    .map(|m| self.lower(m))
                    .collect::<Result<_>>()?;
                Ok(json!({ "allOf": lowered }))
            }
            Type::AnyOf(members) => {
                // Combinators can assemble an all-literal union that the
                // parser never saw as one chain; it still lowers as an enum.
                if members.iter().all(|m| matches!(m, Type::Literal(_))) {
                    let values: Vec<&Value> = members
                        .iter()
                        .filter_map(|m| match m {
                            Type::Literal(v) => Some(v),
                            _ => None,
                        })
                        .collect();
                    return Ok(json!({ "enum": values }));
                }
                let lowered: Vec<Value> = members
                    .iter()
                    .map(|m| self.lower(m))
                    .collect::<Result<_>>()?;
                Ok(json!({ "anyOf": lowered }))
            }
            Type::Conditional {
                branches,
                otherwise,
            } => self.lower_conditional(branches, otherwise.as_deref()),
            Type::Object {
                properties,
                restriction,
                card,
            } => self.lower_object(properties, restriction, card),
            Type::Array {
                prefix,
                tail,
                only,
                unique,
                card,
            } => self.lower_array(prefix, tail, *only, *unique, card),
        }
    }

    fn lower_numeric(&self, type_name: &str, card: &Cardinal, multiple_of: Option<u64>) -> Value {
        let mut out = Map::new();
        out.insert("type".to_string(), json!(type_name));
        if let Some(min) = card.min {
            out.insert("minimum".to_string(), json!(min));
        }
        if let Some(max) = card.max {
            out.insert("maximum".to_string(), json!(max));
        }
        if let Some(k) = multiple_of {
            out.insert("multipleOf".to_string(), json!(k));
        }
        Value::Object(out)
    }

    /// `elif` chains nest right-associatively inside the preceding `else`.
    fn lower_conditional(
        &mut self,
        branches: &[(Type, Type)],
        otherwise: Option<&Type>,
    ) -> Result<Value> {
        let Some((cond, then)) = branches.first() else {
            return match otherwise {
                Some(els) => self.lower(els),
                None => Ok(Value::Object(Map::new())),
            };
        };
        let mut out = Map::new();
        out.insert("if".to_string(), self.lower(cond)?);
        out.insert("then".to_string(), self.lower(then)?);
        if branches.len() > 1 {
            out.insert(
                "else".to_string(),
                self.lower_conditional(&branches[1..], otherwise)?,
            );
        } else if let Some(els) = otherwise {
            out.insert("else".to_string(), self.lower(els)?);
        }
        Ok(Value::Object(out))
    }

    fn lower_object(
        &mut self,
        properties: &[ObjectProperty],
        restriction: &Restriction,
        card: &Cardinal,
    ) -> Result<Value> {
        let mut out = Map::new();
        out.insert("type".to_string(), json!("object"));
        if !properties.is_empty() {
            let mut props = Map::new();
            for prop in properties {
                props.insert(prop.key.clone(), self.lower(&prop.value)?);
            }
            out.insert("properties".to_string(), Value::Object(props));
        }
        let required: Vec<Value> = properties
            .iter()
            .filter(|p| !p.optional && p.value != Type::Keyword(Keyword::Forbidden))
            .map(|p| Value::String(p.key.clone()))
            .collect();
        if !required.is_empty() {
            out.insert("required".to_string(), Value::Array(required));
        }
        match restriction {
            Restriction::None => {}
            Restriction::OnlyListed => {
                out.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            Restriction::OnlyNames(nc) => {
                out.insert("propertyNames".to_string(), self.lower_name_constraint(nc)?);
            }
            Restriction::OnlyKv { names, value } => {
                if let Some(nc) = names {
                    out.insert("propertyNames".to_string(), self.lower_name_constraint(nc)?);
                }
                out.insert("additionalProperties".to_string(), self.lower(value)?);
            }
        }
        if let Some(min) = card.min {
            out.insert("minProperties".to_string(), json!(min));
        }
        if let Some(max) = card.max {
            out.insert("maxProperties".to_string(), json!(max));
        }
        Ok(Value::Object(out))
    }

    fn lower_name_constraint(&mut self, nc: &NameConstraint) -> Result<Value> {
        match nc {
            NameConstraint::Regex(pattern) => {
                Ok(json!({ "type": "string", "pattern": pattern }))
            }
            NameConstraint::Ref(name) => {
                if !self.defs.contains_key(name) {
                    return Err(JscnError::UnresolvedReference(name.clone()));
                }
                self.reached.insert(name.clone());
                Ok(json!({ "$ref": format!("#/definitions/{}", name) }))
            }
        }
    }

    fn lower_array(
        &mut self,
        prefix: &[Type],
        tail: &RepeatMode,
        only: bool,
        unique: bool,
        card: &Cardinal,
    ) -> Result<Value> {
        let k = prefix.len() as u64;
        let mut out = Map::new();
        out.insert("type".to_string(), json!("array"));

        let (min_items, max_items) = match tail {
            // The tuple length is implicit via `items`; a min bound at or
            // under the tuple length is redundant.
            RepeatMode::Closed => (card.min.filter(|m| k == 0 || *m > k), card.max),
            RepeatMode::ZeroOrMore(_) => (card.min, card.max),
            RepeatMode::OneOrMore(_) => {
                let forced = k + 1;
                (Some(card.min.map_or(forced, |m| m.max(forced))), card.max)
            }
        };
        if let Some(min) = min_items {
            out.insert("minItems".to_string(), json!(min));
        }
        if let Some(max) = max_items {
            out.insert("maxItems".to_string(), json!(max));
        }

        match tail {
            RepeatMode::Closed => {
                if k >= 1 {
                    out.insert("items".to_string(), self.lower_tuple(prefix)?);
                    if only {
                        out.insert("additionalItems".to_string(), Value::Bool(false));
                    }
                }
            }
            RepeatMode::ZeroOrMore(item) | RepeatMode::OneOrMore(item) => {
                if k == 0 {
                    out.insert("items".to_string(), self.lower(item)?);
                } else {
                    out.insert("items".to_string(), self.lower_tuple(prefix)?);
                    out.insert("additionalItems".to_string(), self.lower(item)?);
                }
            }
        }
        if unique {
            out.insert("uniqueItems".to_string(), Value::Bool(true));
        }
        Ok(Value::Object(out))
    }

    fn lower_tuple(&mut self, prefix: &[Type]) -> Result<Value> {
        let lowered: Vec<Value> = prefix
            .iter()
            .map(|t| self.lower(t))
            .collect::<Result<_>>()?;
        Ok(Value::Array(lowered))
    }
}
