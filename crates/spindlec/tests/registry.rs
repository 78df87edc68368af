mod support;

use serde_json::json;
use spindle_contracts::REGISTRY_SCHEMA_VERSION;
use spindlec::opcodes::Op;
use spindlec::wire::{DecodeLimits, Referrer};
use spindlec::{CompileErrorKind, CompileTimeResolver, Registry};

use support::{compile, doc, program, truthy, walk};

fn load(doc: serde_json::Value) -> Result<Registry, spindlec::CompileError> {
    Registry::from_json(doc.to_string().as_bytes(), &DecodeLimits::default())
}

fn referrer() -> Referrer {
    Referrer {
        module_name: Some("app/templates/index.hbs".to_string()),
        id: "index".to_string(),
    }
}

#[test]
fn registry_document_feeds_every_lookup() {
    let registry = load(json!({
        "schema_version": REGISTRY_SCHEMA_VERSION,
        "helpers": { "t": 1 },
        "modifiers": { "on": 2 },
        "partials": { "-nav": 3 },
        "components": {
            "x-card": {
                "handle": 4,
                "capabilities": { "createInstance": true },
                "layout": {
                    "id": "x-card",
                    "block": { "statements": [[2, "card"]], "symbols": [], "hasEval": false, "upvars": [] }
                }
            }
        }
    }))
    .expect("loads");

    assert_eq!(registry.lookup_helper("t", &referrer()), Some(1));
    assert_eq!(registry.lookup_modifier("on", &referrer()), Some(2));
    assert_eq!(registry.lookup_partial("-nav", &referrer()), Some(3));
    assert_eq!(registry.lookup_helper("on", &referrer()), None);

    let card = registry.lookup_component("x-card", &referrer()).expect("component");
    assert_eq!(card.handle, 4);
    assert!(card.capabilities().create_instance);
    assert!(!card.capabilities().prepare_args);
    assert!(card.compilable.is_some());
    assert_eq!(registry.resolve(4).as_deref(), Some("x-card"));

    let mut program = program(registry);
    let result = compile(&mut program, doc(json!([[8, "x-card", null, null, null]]), &[], &[]));
    assert!(result.is_ok(), "{:?}", result.errors);
    let path = walk(&program, result.handle, &mut truthy);
    assert_eq!(path.texts, ["card"]);
    assert_eq!(path.count(Op::CreateComponent), 1);
    assert_eq!(path.count(Op::DidRenderLayout), 1);
}

#[test]
fn modifiers_from_the_registry_are_invoked() {
    let registry = load(json!({ "modifiers": { "on": 2 } })).expect("loads");
    let mut program = program(registry);
    let result = compile(
        &mut program,
        doc(
            json!([[10, "button"], [4, [38, 0], ["click"], null], [12], [13]]),
            &[],
            &["on"],
        ),
    );
    assert!(result.is_ok(), "{:?}", result.errors);
    let rows = support::rows(&program, result.handle);
    assert_eq!(support::find(&rows, Op::Modifier).operands[0].raw(), Some(2));
}

#[test]
fn unknown_modifier_is_recorded() {
    let mut program = program(Registry::new());
    let result = compile(
        &mut program,
        doc(json!([[10, "div"], [4, [38, 0], null, null], [12], [13]]), &[], &["nope"]),
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].problem, "Unexpected Modifier nope");
    assert_eq!(result.errors[0].ptr.as_deref(), Some("/block/statements/1"));
}

#[test]
fn layout_errors_point_into_the_registry_document() {
    let err = load(json!({
        "components": {
            "ui/x-card": { "handle": 4, "layout": { "id": "x", "block": {} } }
        }
    }))
    .expect_err("layout has no statements");
    assert_eq!(err.kind, CompileErrorKind::Decode);
    assert_eq!(err.message, "missing required field: statements");
    assert_eq!(err.ptr.as_deref(), Some("/components/ui~1x-card/layout/block"));
}

#[test]
fn foreign_schema_version_is_rejected() {
    let err = load(json!({ "schema_version": "spindle.registry@9" })).expect_err("mismatch");
    assert_eq!(err.kind, CompileErrorKind::Decode);
    assert_eq!(err.ptr.as_deref(), Some("/schema_version"));
}

#[test]
fn unknown_fields_are_rejected() {
    let err = load(json!({ "helper": { "t": 1 } })).expect_err("typo");
    assert_eq!(err.kind, CompileErrorKind::Decode);
    assert!(err.message.starts_with("invalid registry JSON:"), "{}", err.message);
}

#[test]
fn handles_collide_across_kinds() {
    let err = load(json!({ "helpers": { "t": 1 }, "partials": { "-nav": 1 } })).expect_err("shared");
    assert_eq!(err.kind, CompileErrorKind::Registration);
    assert_eq!(err.message, r#"handle 1 for partial "-nav" is already used by helper "t""#);
}
