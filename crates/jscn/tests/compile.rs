use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};

use jscn::{Definitions, JscnError, Schema, SCHEMA_URI};

fn compile(src: &str) -> Value {
    Schema::parse(src)
        .expect("source must parse")
        .jsonschema()
        .expect("schema must lower")
}

fn compiled_validator(schema: &Value) -> JSONSchema {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .expect("emitted document must be a valid draft-07 schema")
}

/// Collect every `"$ref"` target in the document.
fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                if key == "$ref" {
                    if let Value::String(target) = inner {
                        out.push(target.clone());
                    }
                }
                collect_refs(inner, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        _ => {}
    }
}

fn assert_ref_integrity(doc: &Value) {
    let mut refs = Vec::new();
    collect_refs(doc, &mut refs);
    let empty = serde_json::Map::new();
    let defs = doc
        .get("definitions")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    for target in &refs {
        let name = target
            .strip_prefix("#/definitions/")
            .unwrap_or_else(|| panic!("unexpected ref shape: {}", target));
        assert!(defs.contains_key(name), "unresolved {} in output", target);
    }
    for name in defs.keys() {
        let target = format!("#/definitions/{}", name);
        assert!(
            refs.contains(&target),
            "definition {} is not referenced anywhere",
            name
        );
    }
}

#[test]
fn scenario_boolean() {
    let doc = compile("boolean");
    assert_eq!(
        doc.to_string(),
        json!({ "$schema": SCHEMA_URI, "type": "boolean" }).to_string()
    );
    compiled_validator(&doc);
}

#[test]
fn scenario_homogeneous_array() {
    let doc = compile("[integer*]");
    assert_eq!(doc["type"], "array");
    assert_eq!(doc["items"], json!({ "type": "integer" }));
    let validator = compiled_validator(&doc);
    assert!(validator.is_valid(&json!([1, 2, 3])));
    assert!(validator.is_valid(&json!([])));
    assert!(!validator.is_valid(&json!([1, "two"])));
}

#[test]
fn scenario_tuple_with_typed_tail() {
    let doc = compile("[integer, boolean+]{4}");
    assert_eq!(doc["minItems"], 4);
    assert_eq!(doc["maxItems"], 4);
    assert_eq!(doc["items"], json!([{ "type": "integer" }]));
    assert_eq!(doc["additionalItems"], json!({ "type": "boolean" }));
    let validator = compiled_validator(&doc);
    assert!(validator.is_valid(&json!([7, true, false, true])));
    assert!(!validator.is_valid(&json!([7, true])));
    assert!(!validator.is_valid(&json!([7, true, false, 9])));
}

#[test]
fn scenario_enum_shortcut() {
    let doc = compile("`1` | `2`");
    assert_eq!(doc["enum"], json!([1, 2]));
    assert!(doc.get("anyOf").is_none());
    let validator = compiled_validator(&doc);
    assert!(validator.is_valid(&json!(1)));
    assert!(!validator.is_valid(&json!(3)));
}

#[test]
fn scenario_only_with_named_constraints() {
    let doc = compile(r#"{only <id>: <byte>} where id = r"[a-z]+" and byte = integer{0, 0xff}"#);
    assert_eq!(doc["propertyNames"], json!({ "$ref": "#/definitions/id" }));
    assert_eq!(
        doc["additionalProperties"],
        json!({ "$ref": "#/definitions/byte" })
    );
    assert_eq!(
        doc["definitions"],
        json!({
            "id": { "type": "string", "pattern": "[a-z]+" },
            "byte": { "type": "integer", "minimum": 0, "maximum": 255 },
        })
    );
    assert_ref_integrity(&doc);
    let validator = compiled_validator(&doc);
    assert!(validator.is_valid(&json!({ "abc": 200 })));
    assert!(!validator.is_valid(&json!({ "ABC": 200 })));
    assert!(!validator.is_valid(&json!({ "abc": 300 })));
}

#[test]
fn scenario_conditional_postcode() {
    let doc = compile(
        r#"if {country: "USA"} then {postcode: r"\d{5}(-\d{4})?"} else {postcode: string}"#,
    );
    assert_eq!(doc["if"]["properties"]["country"], json!({ "const": "USA" }));
    assert_eq!(
        doc["then"]["properties"]["postcode"],
        json!({ "type": "string", "pattern": r"\d{5}(-\d{4})?" })
    );
    assert_eq!(
        doc["else"]["properties"]["postcode"],
        json!({ "type": "string" })
    );
    let validator = compiled_validator(&doc);
    assert!(validator.is_valid(&json!({ "country": "USA", "postcode": "94105" })));
    assert!(!validator.is_valid(&json!({ "country": "USA", "postcode": "not-a-zip" })));
    assert!(validator.is_valid(&json!({ "country": "France", "postcode": "75011" })));
}

#[test]
fn unresolved_reference_is_reported() {
    let schema = Schema::parse("<missing>").unwrap();
    assert!(matches!(
        schema.jsonschema().unwrap_err(),
        JscnError::UnresolvedReference(ref name) if name == "missing"
    ));
}

#[test]
fn inverted_cardinal_is_reported() {
    assert!(matches!(
        Schema::parse("integer{5, 3}").unwrap_err(),
        JscnError::InvalidCardinal { .. }
    ));
}

#[test]
fn conflicting_merge_is_reported() {
    let a = Schema::parse("<x> where x = integer").unwrap();
    let b = Schema::parse("<x> where x = number").unwrap();
    assert!(matches!(
        (a | b).unwrap_err(),
        JscnError::DefinitionConflict(ref name) if name == "x"
    ));
}

#[test]
fn disjoint_unions_keep_both_definition_sets() {
    let a = Schema::parse("<x> where x = integer").unwrap();
    let b = Schema::parse("<y> where y = string").unwrap();
    let union = (a.clone() | b.clone()).unwrap();
    assert_eq!(
        union.definitions().keys().collect::<Vec<_>>(),
        vec!["x", "y"]
    );
    let intersection = (a & b).unwrap();
    assert_eq!(
        intersection.definitions().keys().collect::<Vec<_>>(),
        vec!["x", "y"]
    );
}

#[test]
fn pruning_keeps_only_reachable_definitions() {
    let doc = compile(
        "{prop: <used_1>} \
         where used_1 = [<used_2>+] \
         and unused_1 = [<unused_2>+] \
         and used_2 = integer \
         and unused_2 = string",
    );
    let defs = doc["definitions"].as_object().unwrap();
    assert_eq!(defs.keys().collect::<Vec<_>>(), vec!["used_1", "used_2"]);
    assert_ref_integrity(&doc);
}

#[test]
fn definitions_supplied_incrementally() {
    let s = Schema::parse("{prop: <used_1>}").unwrap();
    let s = (s | Definitions::parse("used_1 = [<used_2>+]").unwrap()).unwrap();
    let s = (s | Definitions::parse("unused_1 = [<unused_2>+]").unwrap()).unwrap();
    let s = (s | Definitions::parse("used_2 = integer").unwrap()).unwrap();
    let s = (s | Definitions::parse("unused_2 = string").unwrap()).unwrap();
    let doc = s.jsonschema().unwrap();
    let defs = doc["definitions"].as_object().unwrap();
    assert_eq!(defs.keys().collect::<Vec<_>>(), vec!["used_1", "used_2"]);
}

#[test]
fn reparse_yields_equal_schema() {
    let src = r#"
        { kind: `"aircraft"`, mission?: string } | {
            kind: `"mission"`,
            name: string,
            fleet: {only <id>: string},
        } where id = r"[a-z]+"
    "#;
    assert_eq!(Schema::parse(src).unwrap(), Schema::parse(src).unwrap());
}

#[test]
fn output_is_byte_stable() {
    let src = r#"{only <plid>: <aircraft>}
        where plid = r"[A-Z0-9]{4}"
        and aircraft = {
            color?: string,
            status?: `"online"` | `"offline"`  # operational state
        }"#;
    let schema = Schema::parse(src).unwrap();
    assert_eq!(
        schema.to_json_string().unwrap(),
        schema.to_json_string().unwrap()
    );
    let doc = schema.jsonschema().unwrap();
    assert_ref_integrity(&doc);
    compiled_validator(&doc);
}

#[test]
fn emitted_documents_compile_as_draft7() {
    let sources = [
        "boolean",
        "string{1, 80}",
        "integer/4 & integer{0, 0xff}",
        "not null",
        "[only unique integer, string]{_, 5}",
        "{only r\"[a-z]+\" }{1, 10}",
        "if {t: `true`} then {v: number} elif {t: `false`} then {v: string} else null",
        "<node> where node = { value: integer, next?: <node> }",
    ];
    for src in sources {
        let doc = compile(src);
        compiled_validator(&doc);
        assert_ref_integrity(&doc);
        assert_eq!(doc["$schema"], json!(SCHEMA_URI));
    }
}

#[test]
fn recursive_definition_lowers_once() {
    let doc = compile("<node> where node = { value: integer, next?: <node> }");
    let defs = doc["definitions"].as_object().unwrap();
    assert_eq!(defs.keys().collect::<Vec<_>>(), vec!["node"]);
    let validator = compiled_validator(&doc);
    assert!(validator.is_valid(&json!({ "value": 1, "next": { "value": 2 } })));
    assert!(!validator.is_valid(&json!({ "value": 1, "next": { "value": "x" } })));
}
