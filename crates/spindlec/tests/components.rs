mod support;

use serde_json::{json, Value};
use spindlec::disasm::Decoded;
use spindlec::opcodes::Op;
use spindlec::template::SymbolTable;
use spindlec::{CompileMode, ComponentEntry, Handle, Registry};

use support::{compile, doc, falsy, find, ops, program, program_in, rows, template, truthy, walk};

fn card_layout() -> Value {
    doc(json!([[2, "card"]]), &["@title"], &[])
}

fn in_module(module_name: &str, statements: Value) -> Value {
    json!({
        "id": module_name,
        "moduleName": module_name,
        "block": {
            "statements": statements,
            "symbols": [],
            "hasEval": false,
            "upvars": [],
        }
    })
}

fn invoked_handles(program: &spindlec::Program, handle: Handle) -> Vec<u32> {
    rows(program, handle)
        .iter()
        .filter(|row| row.op == Op::InvokeStatic)
        .filter_map(|row| match row.operands.first() {
            Some(Decoded::Handle { value }) => Some(*value),
            _ => None,
        })
        .collect()
}

#[test]
fn component_with_known_layout_is_invoked_statically() {
    let mut registry = Registry::new();
    registry
        .add_component("x-card", ComponentEntry::new(20).with_layout(template(card_layout())))
        .expect("component");
    let mut program = program(registry);
    let result = compile(
        &mut program,
        doc(json!([[8, "x-card", null, [["@title"], ["Hi"]], null]]), &[], &[]),
    );
    assert!(result.is_ok(), "{:?}", result.errors);

    let rows = rows(&program, result.handle);
    assert_eq!(find(&rows, Op::PushComponentDefinition).operands[0].raw(), Some(20));
    assert!(rows.iter().all(|row| row.op != Op::PrepareArgs));
    // The layout got a handle of its own past the stdlib routines.
    let layout = invoked_handles(&program, result.handle);
    assert_eq!(layout.len(), 1);
    assert!(layout[0] > program.stdlib().cautious_append.0);

    let path = walk(&program, result.handle, &mut truthy);
    assert_eq!(path.texts, ["card"]);
    assert_eq!(path.count(Op::RootScope), 1);
    // `@title` and `self`.
    assert_eq!(path.count(Op::SetVariable), 2);
}

#[test]
fn component_layout_is_compiled_once() {
    let mut registry = Registry::new();
    registry
        .add_component("x-card", ComponentEntry::new(20).with_layout(template(card_layout())))
        .expect("component");
    let mut program = program(registry);
    let result = compile(
        &mut program,
        doc(
            json!([[8, "x-card", null, null, null], [8, "x-card", null, null, null]]),
            &[],
            &[],
        ),
    );
    assert!(result.is_ok(), "{:?}", result.errors);
    let layouts = invoked_handles(&program, result.handle);
    assert_eq!(layouts.len(), 2);
    assert_eq!(layouts[0], layouts[1]);
}

#[test]
fn component_without_layout_is_resolved_at_runtime() {
    let mut registry = Registry::new();
    registry.add_component("x-late", ComponentEntry::new(30)).expect("component");
    let mut program = program(registry.clone());
    let result = compile(&mut program, doc(json!([[8, "x-late", null, null, null]]), &[], &[]));
    assert!(result.is_ok(), "{:?}", result.errors);
    let ops = ops(&program, result.handle);
    assert!(ops.contains(&Op::PrepareArgs));
    assert!(ops.contains(&Op::GetAotComponentLayout));
    assert!(ops.contains(&Op::InvokeComponentLayout));

    let mut jit = program_in(registry, CompileMode::Jit);
    let result = compile(&mut jit, doc(json!([[8, "x-late", null, null, null]]), &[], &[]));
    let ops = support::ops(&jit, result.handle);
    assert!(ops.contains(&Op::GetJitComponentLayout));
    assert!(!ops.contains(&Op::GetAotComponentLayout));
}

#[test]
fn unknown_component_is_recorded() {
    let mut program = program(Registry::new());
    let result = compile(&mut program, doc(json!([[8, "x-none", null, null, null]]), &[], &[]));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].problem, "Compile Error: Cannot find component x-none");
}

#[test]
fn component_names_resolve_next_to_the_referrer_first() {
    let mut registry = Registry::new();
    registry.add_component("x-outer/x-inner", ComponentEntry::new(7)).expect("local");
    registry.add_component("x-inner", ComponentEntry::new(8)).expect("global");
    let mut program = program(registry);

    let statement = json!([[8, "x-inner", null, null, null]]);
    let local = compile(&mut program, in_module("app/components/x-outer.hbs", statement.clone()));
    let rows = rows(&program, local.handle);
    assert_eq!(find(&rows, Op::PushComponentDefinition).operands[0].raw(), Some(7));

    let global = compile(&mut program, in_module("app/templates/index.hbs", statement));
    let rows = support::rows(&program, global.handle);
    assert_eq!(find(&rows, Op::PushComponentDefinition).operands[0].raw(), Some(8));
}

#[test]
fn wrapped_layout_generates_its_element_only_with_a_tag_name() {
    let mut registry = Registry::new();
    registry
        .add_component("x-wrapped", ComponentEntry::new(40).with_layout(template(card_layout())).wrapped())
        .expect("component");
    assert!(registry
        .component("x-wrapped")
        .and_then(|entry| entry.capabilities)
        .is_some_and(|caps| caps.wrapped));

    let mut program = program(registry);
    let result = compile(&mut program, doc(json!([[8, "x-wrapped", null, null, null]]), &[], &[]));
    assert!(result.is_ok(), "{:?}", result.errors);

    let tagged = walk(&program, result.handle, &mut truthy);
    assert_eq!(tagged.texts, ["card"]);
    assert_eq!(tagged.count(Op::OpenDynamicElement), 1);
    assert_eq!(tagged.count(Op::InvokeYield), 1);
    assert_eq!(tagged.count(Op::CloseElement), 1);

    let tagless = walk(&program, result.handle, &mut falsy);
    assert_eq!(tagless.texts, ["card"]);
    assert_eq!(tagless.count(Op::OpenDynamicElement), 0);
    assert_eq!(tagless.count(Op::CloseElement), 0);
}

#[test]
fn dynamic_component_is_skipped_when_falsy() {
    let mut program = program(Registry::new());
    let result = compile(&mut program, doc(json!([[8, [32, 1], null, null, null]]), &["comp"], &[]));
    assert!(result.is_ok(), "{:?}", result.errors);

    let rendered = walk(&program, result.handle, &mut truthy);
    assert_eq!(rendered.count(Op::ResolveDynamicComponent), 1);
    assert_eq!(rendered.count(Op::CreateComponent), 1);

    let skipped = walk(&program, result.handle, &mut falsy);
    assert_eq!(skipped.count(Op::ResolveDynamicComponent), 0);
    assert_eq!(skipped.count(Op::Exit), 1);
}

#[test]
fn component_helper_with_a_known_layout_is_static() {
    let mut registry = Registry::new();
    registry
        .add_component("x-card", ComponentEntry::new(20).with_layout(template(card_layout())))
        .expect("component");
    let mut program = program(registry);
    let result = compile(
        &mut program,
        doc(
            json!([[6, [37, 0], ["x-card"], [["title"], ["Hi"]], null]]),
            &[],
            &["component"],
        ),
    );
    assert!(result.is_ok(), "{:?}", result.errors);
    let path = walk(&program, result.handle, &mut truthy);
    assert_eq!(path.texts, ["card"]);
    assert_eq!(path.count(Op::ResolveDynamicComponent), 0);
}

#[test]
fn partial_view_resolves_free_names_locally() {
    let mut program = program(Registry::new());
    let partial = template(json!({
        "id": "p",
        "moduleName": "templates/-greeting",
        "block": {
            "statements": [[1, [34, 0]]],
            "symbols": ["name"],
            "hasEval": true,
            "upvars": ["greeting"],
        }
    }));
    let definition = program.compile_partial(&partial).expect("partial");
    assert!(definition.errors.is_empty(), "{:?}", definition.errors);
    assert_eq!(
        definition.symbol_table,
        SymbolTable::Program {
            symbols: vec!["name".to_string()],
            has_eval: true
        }
    );

    let rows = rows(&program, definition.handle);
    let local = find(&rows, Op::ResolveMaybeLocal);
    assert!(matches!(
        &local.operands[0],
        Decoded::Constant { value, .. } if value == "\"greeting\""
    ));
}

#[test]
fn each_view_compiles_its_own_nested_blocks() {
    let mut program = program(Registry::new());
    let greeting = template(json!({
        "id": "greeting",
        "moduleName": "templates/-greeting",
        "block": {
            "statements": [[
                6,
                [37, 0],
                [[32, 0, ["cond"]]],
                null,
                [["default"], [{ "statements": [[1, [34, 1]]], "parameters": [] }]]
            ]],
            "symbols": [],
            "hasEval": true,
            "upvars": ["if", "greeting"],
        }
    }));

    let layout = program.compile(&greeting).expect("layout");
    assert!(layout.is_ok(), "{:?}", layout.errors);
    let after_layout = program.heap().handle_count();
    let layout_path = walk(&program, layout.handle, &mut truthy);
    assert_eq!(layout_path.count(Op::ResolveMaybeLocal), 0);
    // `this.cond` and the `this.greeting` fallback.
    assert_eq!(layout_path.count(Op::GetProperty), 2);

    let partial = program.compile_partial(&greeting).expect("partial");
    assert!(partial.errors.is_empty(), "{:?}", partial.errors);
    // The partial body and its `if` block are both new.
    assert_eq!(program.heap().handle_count(), after_layout + 2);
    let partial_path = walk(&program, partial.handle, &mut truthy);
    assert_eq!(partial_path.count(Op::ResolveMaybeLocal), 1);
    assert_eq!(partial_path.count(Op::GetProperty), 1);

    // The layout's block is untouched by the partial compile.
    let layout_again = walk(&program, layout.handle, &mut truthy);
    assert_eq!(layout_again.count(Op::ResolveMaybeLocal), 0);
}

#[test]
fn dynamic_component_always_passes_its_attrs_block() {
    let mut program = program(Registry::new());
    let before = program.heap().handle_count();
    let result = compile(&mut program, doc(json!([[8, [32, 1], null, null, null]]), &["comp"], &[]));
    assert!(result.is_ok(), "{:?}", result.errors);
    // The template plus its empty attrs block.
    assert_eq!(program.heap().handle_count(), before + 2);

    let ops = ops(&program, result.handle);
    assert_eq!(ops.iter().filter(|op| **op == Op::PushSymbolTable).count(), 1);
    assert_eq!(ops.iter().filter(|op| **op == Op::PushBlockScope).count(), 1);
}
