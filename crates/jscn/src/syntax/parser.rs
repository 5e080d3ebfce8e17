use std::collections::HashSet;

use indexmap::IndexMap;
use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest_derive::Parser;
use serde_json::Value;

use crate::error::{JscnError, ParseDiagnostic, Result};

use super::ast::*;

#[derive(Parser)]
#[grammar = "syntax/jscn.pest"]
struct JscnParser;

pub fn parse_schema(input: &str) -> Result<SchemaAst> {
    let mut pairs = JscnParser::parse(Rule::schema_entry, input).map_err(pest_error_to_jscn)?;
    let entry = pairs.next().unwrap();
    let schema = entry.into_inner().next().unwrap();
    build_schema(schema)
}

pub fn parse_schema_diagnostic(input: &str) -> std::result::Result<SchemaAst, ParseDiagnostic> {
    parse_schema(input).map_err(jscn_error_to_diagnostic)
}

pub fn parse_definitions(input: &str) -> Result<IndexMap<String, Type>> {
    let mut pairs = JscnParser::parse(Rule::definitions_entry, input).map_err(pest_error_to_jscn)?;
    let entry = pairs.next().unwrap();
    let defs = entry.into_inner().next().unwrap();
    build_definitions(defs)
}

pub fn parse_definitions_diagnostic(
    input: &str,
) -> std::result::Result<IndexMap<String, Type>, ParseDiagnostic> {
    parse_definitions(input).map_err(jscn_error_to_diagnostic)
}

fn pest_error_to_jscn(err: pest::error::Error<Rule>) -> JscnError {
    let offset = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let expected = match &err.variant {
        pest::error::ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
            let names: Vec<String> = positives.iter().map(|rule| format!("{:?}", rule)).collect();
            format!("expected one of {}", names.join(", "))
        }
        variant => variant.message().into_owned(),
    };
    JscnError::Parse { offset, expected }
}

fn jscn_error_to_diagnostic(err: JscnError) -> ParseDiagnostic {
    ParseDiagnostic::new(err.to_string(), err.offset())
}

fn build_schema(pair: Pair<Rule>) -> Result<SchemaAst> {
    let mut root = None;
    let mut defs = IndexMap::new();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::type_expr => root = Some(build_type(item)?),
            Rule::definitions => defs = build_definitions(item)?,
            _ => {}
        }
    }
    Ok(SchemaAst {
        root: root.unwrap(),
        defs,
    })
}

fn build_definitions(pair: Pair<Rule>) -> Result<IndexMap<String, Type>> {
    let mut defs: IndexMap<String, Type> = IndexMap::new();
    for item in pair.into_inner() {
        if let Rule::definition = item.as_rule() {
            let mut inner = item.into_inner();
            let name = inner.next().unwrap().as_str().to_string();
            let ty = build_type(inner.next().unwrap())?;
            match defs.get(&name) {
                Some(existing) if *existing != ty => {
                    return Err(JscnError::DefinitionConflict(name));
                }
                Some(_) => {}
                None => {
                    defs.insert(name, ty);
                }
            }
        }
    }
    Ok(defs)
}

fn build_type(pair: Pair<Rule>) -> Result<Type> {
    match pair.as_rule() {
        Rule::type_expr => build_or_chain(pair),
        Rule::and_expr => build_and_chain(pair),
        Rule::negation => {
            let inner = pair
                .into_inner()
                .find(|p| p.as_rule() != Rule::kw_not)
                .unwrap();
            Ok(Type::Not(Box::new(build_type(inner)?)))
        }
        Rule::parens => build_type(pair.into_inner().next().unwrap()),
        Rule::conditional => build_conditional(pair),
        Rule::string_type => {
            match pair.into_inner().find(|p| p.as_rule() == Rule::cardinal) {
                Some(card) => Ok(Type::StringCard(build_cardinal(card)?)),
                None => Ok(Type::Keyword(Keyword::Str)),
            }
        }
        Rule::integer_type => build_numeric(pair, Keyword::Integer),
        Rule::number_type => build_numeric(pair, Keyword::Number),
        Rule::keyword_type => {
            let kw = pair.into_inner().next().unwrap();
            match kw.as_rule() {
                Rule::kw_boolean => Ok(Type::Keyword(Keyword::Boolean)),
                Rule::kw_null => Ok(Type::Keyword(Keyword::Null)),
                Rule::kw_object => Ok(Type::Keyword(Keyword::Object)),
                Rule::kw_array => Ok(Type::Keyword(Keyword::Array)),
                Rule::kw_forbidden => Ok(Type::Keyword(Keyword::Forbidden)),
                other => Err(unexpected_rule(other, &kw)),
            }
        }
        Rule::constant => {
            let offset = pair.as_span().start();
            let text = pair.as_str();
            let value: Value =
                serde_json::from_str(&text[1..text.len() - 1]).map_err(|e| JscnError::Lex {
                    offset,
                    message: format!("back-quoted content is not valid JSON: {}", e),
                })?;
            Ok(Type::Literal(value))
        }
        Rule::bare_string => {
            let value = Value::String(decode_json_string(&pair)?);
            Ok(Type::Literal(value))
        }
        Rule::regex_string => Ok(Type::Regex(raw_string_body(&pair))),
        Rule::format_string => Ok(Type::Format(raw_string_body(&pair))),
        Rule::reference => {
            let id = pair.into_inner().next().unwrap();
            Ok(Type::Ref(id.as_str().to_string()))
        }
        Rule::object_type => build_object(pair),
        Rule::array_type => build_array(pair),
        other => Err(unexpected_rule(other, &pair)),
    }
}

fn unexpected_rule(rule: Rule, pair: &Pair<Rule>) -> JscnError {
    JscnError::Parse {
        offset: pair.as_span().start(),
        expected: format!("unexpected rule: {:?}", rule),
    }
}

fn build_or_chain(pair: Pair<Rule>) -> Result<Type> {
    let mut children = Vec::new();
    for item in pair.into_inner() {
        children.push(build_type(item)?);
    }
    if children.len() == 1 {
        return Ok(children.pop().unwrap());
    }
    // Flatten nested unions before the all-literal check, so
    // (`1` | `2`) | `3` still folds into a single enum.
    let mut flat = Vec::new();
    for child in children {
        match child {
            Type::AnyOf(inner) => flat.extend(inner),
            Type::Enum(values) => flat.extend(values.into_iter().map(Type::Literal)),
            other => flat.push(other),
        }
    }
    Ok(fold_union(flat))
}

/// Build a union, folding an all-literal member list into an enum.
pub(crate) fn fold_union(members: Vec<Type>) -> Type {
    if members.iter().all(|t| matches!(t, Type::Literal(_))) {
        let values = members
            .into_iter()
            .filter_map(|t| match t {
                Type::Literal(v) => Some(v),
                _ => None,
            })
            .collect();
        Type::Enum(values)
    } else {
        Type::AnyOf(members)
    }
}

fn build_and_chain(pair: Pair<Rule>) -> Result<Type> {
    let mut children = Vec::new();
    for item in pair.into_inner() {
        children.push(build_type(item)?);
    }
    if children.len() == 1 {
        return Ok(children.pop().unwrap());
    }
    let mut flat = Vec::new();
    for child in children {
        match child {
            Type::AllOf(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    Ok(Type::AllOf(flat))
}

fn build_numeric(pair: Pair<Rule>, kw: Keyword) -> Result<Type> {
    let mut card = None;
    let mut multiple_of = None;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::cardinal => card = Some(build_cardinal(item)?),
            Rule::divisor => {
                let int_pair = item.into_inner().next().unwrap();
                multiple_of = Some(parse_int(&int_pair)?);
            }
            _ => {}
        }
    }
    if card.is_none() && multiple_of.is_none() {
        return Ok(Type::Keyword(kw));
    }
    let card = card.unwrap_or_default();
    Ok(match kw {
        Keyword::Integer => Type::IntegerCard { card, multiple_of },
        _ => Type::NumberCard { card, multiple_of },
    })
}

fn build_conditional(pair: Pair<Rule>) -> Result<Type> {
    let mut branches = Vec::new();
    let mut otherwise = None;
    let mut pending_cond = None;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::type_expr => {
                let built = build_type(item)?;
                match pending_cond.take() {
                    None => pending_cond = Some(built),
                    Some(cond) => branches.push((cond, built)),
                }
            }
            Rule::elif_clause => {
                let mut parts = item
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::type_expr);
                let cond = build_type(parts.next().unwrap())?;
                let then = build_type(parts.next().unwrap())?;
                branches.push((cond, then));
            }
            Rule::else_clause => {
                let body = item
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::type_expr)
                    .unwrap();
                otherwise = Some(Box::new(build_type(body)?));
            }
            _ => {}
        }
    }
    Ok(Type::Conditional {
        branches,
        otherwise,
    })
}

fn build_object(pair: Pair<Rule>) -> Result<Type> {
    let mut restriction = Restriction::None;
    let mut properties: Vec<ObjectProperty> = Vec::new();
    let mut card = Cardinal::unbounded();
    let mut seen: HashSet<String> = HashSet::new();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::obj_restriction => restriction = build_restriction(item)?,
            Rule::obj_prop => {
                let offset = item.as_span().start();
                let prop = build_prop(item)?;
                if !seen.insert(prop.key.clone()) {
                    return Err(JscnError::DuplicateProperty {
                        key: prop.key,
                        offset,
                    });
                }
                properties.push(prop);
            }
            Rule::cardinal => card = build_cardinal(item)?,
            _ => {}
        }
    }
    Ok(Type::Object {
        properties,
        restriction,
        card,
    })
}

fn build_prop(pair: Pair<Rule>) -> Result<ObjectProperty> {
    let mut key = None;
    let mut optional = false;
    let mut value = None;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::prop_key => {
                let inner = item.into_inner().next().unwrap();
                key = Some(match inner.as_rule() {
                    Rule::ident => inner.as_str().to_string(),
                    _ => decode_json_string(&inner)?,
                });
            }
            Rule::optional_flag => optional = true,
            Rule::type_expr => value = Some(build_type(item)?),
            _ => {}
        }
    }
    Ok(ObjectProperty {
        key: key.unwrap(),
        optional,
        value: value.unwrap(),
    })
}

fn build_restriction(pair: Pair<Rule>) -> Result<Restriction> {
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::restr_named => {
                let nc = item.into_inner().next().unwrap();
                return Ok(Restriction::OnlyNames(build_name_constraint(nc)?));
            }
            Rule::restr_typed => {
                let mut names = None;
                let mut value = None;
                for part in item.into_inner() {
                    match part.as_rule() {
                        Rule::name_constraint => names = Some(build_name_constraint(part)?),
                        Rule::type_expr => value = Some(build_type(part)?),
                        _ => {}
                    }
                }
                return Ok(Restriction::OnlyKv {
                    names,
                    value: Box::new(value.unwrap()),
                });
            }
            _ => {}
        }
    }
    Ok(Restriction::OnlyListed)
}

fn build_name_constraint(pair: Pair<Rule>) -> Result<NameConstraint> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::regex_string => Ok(NameConstraint::Regex(raw_string_body(&inner))),
        Rule::reference => {
            let id = inner.into_inner().next().unwrap();
            Ok(NameConstraint::Ref(id.as_str().to_string()))
        }
        other => Err(unexpected_rule(other, &inner)),
    }
}

fn build_array(pair: Pair<Rule>) -> Result<Type> {
    let offset = pair.as_span().start();
    let mut only = false;
    let mut unique = false;
    let mut items = Vec::new();
    let mut suffix: Option<String> = None;
    let mut card = Cardinal::unbounded();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::kw_only => only = true,
            Rule::kw_unique => unique = true,
            Rule::type_expr => items.push(build_type(item)?),
            Rule::repeat_suffix => suffix = Some(item.as_str().to_string()),
            Rule::cardinal => card = build_cardinal(item)?,
            _ => {}
        }
    }
    let tail = match suffix.as_deref() {
        None => RepeatMode::Closed,
        Some(s) => {
            if only {
                return Err(JscnError::Parse {
                    offset,
                    expected: format!("`only` cannot be combined with a trailing `{}`", s),
                });
            }
            let last = Box::new(items.pop().unwrap());
            if s == "*" {
                RepeatMode::ZeroOrMore(last)
            } else {
                RepeatMode::OneOrMore(last)
            }
        }
    };
    if matches!(tail, RepeatMode::Closed) && !items.is_empty() {
        if let Some(max) = card.max {
            if (max as usize) < items.len() {
                return Err(JscnError::InvalidCardinal {
                    offset,
                    message: format!(
                        "{} fixed items cannot fit under a maximum of {}",
                        items.len(),
                        max
                    ),
                });
            }
        }
    }
    Ok(Type::Array {
        prefix: items,
        tail,
        only,
        unique,
        card,
    })
}

fn build_cardinal(pair: Pair<Rule>) -> Result<Cardinal> {
    let offset = pair.as_span().start();
    let mut bounds = Vec::new();
    for item in pair.into_inner() {
        if let Rule::card_bound = item.as_rule() {
            let bound = item.into_inner().next().unwrap();
            match bound.as_rule() {
                Rule::int => bounds.push(Some(parse_int(&bound)?)),
                _ => bounds.push(None),
            }
        }
    }
    let card = match bounds.as_slice() {
        [Some(n)] => Cardinal::exact(*n),
        [min, max] => Cardinal {
            min: *min,
            max: *max,
        },
        _ => Cardinal::unbounded(),
    };
    if card.is_unbounded() {
        return Err(JscnError::InvalidCardinal {
            offset,
            message: "at least one side must be bounded".to_string(),
        });
    }
    if let (Some(min), Some(max)) = (card.min, card.max) {
        if min > max {
            return Err(JscnError::InvalidCardinal {
                offset,
                message: format!("lower bound {} exceeds upper bound {}", min, max),
            });
        }
    }
    Ok(card)
}

fn parse_int(pair: &Pair<Rule>) -> Result<u64> {
    let text = pair.as_str();
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| JscnError::Lex {
        offset: pair.as_span().start(),
        message: format!("integer literal out of range: {}", e),
    })
}

/// Strip the prefix letter and quotes of an `r"..."` / `f"..."` token,
/// keeping the interior verbatim.
fn raw_string_body(pair: &Pair<Rule>) -> String {
    let text = pair.as_str();
    text[2..text.len() - 1].to_string()
}

fn decode_json_string(pair: &Pair<Rule>) -> Result<String> {
    match serde_json::from_str::<Value>(pair.as_str()) {
        Ok(Value::String(s)) => Ok(s),
        _ => Err(JscnError::Lex {
            offset: pair.as_span().start(),
            message: "invalid string literal".to_string(),
        }),
    }
}
