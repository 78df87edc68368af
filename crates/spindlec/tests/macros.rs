mod support;

use serde_json::json;
use spindlec::actions::{op1, Action};
use spindlec::macros::{BlockCall, Inline, InlineCall, MacroContext};
use spindlec::opcodes::Op;
use spindlec::{CompileError, CompileErrorKind, CompileOptions, Macros, NullResolver, Program};

use support::{doc, template, truthy, walk};

fn shout(call: &BlockCall, _: &MacroContext<'_>) -> Result<Action, CompileError> {
    Ok(op1(Op::Text, call.name.to_uppercase().as_str()))
}

fn whisper(call: &InlineCall, _: &MacroContext<'_>) -> Result<Inline, CompileError> {
    Ok(Inline::Handled(op1(Op::Text, call.name.to_lowercase().as_str())))
}

fn block_doc(name: &str) -> serde_json::Value {
    doc(json!([[6, [37, 0], null, null, null]]), &[], &[name])
}

#[test]
fn custom_block_macro_expands_in_place() {
    let mut macros = Macros::new();
    macros.add_block("shout", shout).expect("fresh name");
    let mut program = Program::with_macros(NullResolver, CompileOptions::default(), macros).expect("program");
    let result = program.compile(&template(block_doc("shout"))).expect("compiles");
    assert!(result.is_ok(), "{:?}", result.errors);
    assert_eq!(walk(&program, result.handle, &mut truthy).texts, ["SHOUT"]);
}

#[test]
fn custom_inline_macro_replaces_the_append() {
    let mut macros = Macros::new();
    macros.add_inline("Quiet", whisper).expect("fresh name");
    let mut program = Program::with_macros(NullResolver, CompileOptions::default(), macros).expect("program");
    let result = program
        .compile(&template(doc(json!([[1, [34, 0]]]), &[], &["Quiet"])))
        .expect("compiles");
    let path = walk(&program, result.handle, &mut truthy);
    assert_eq!(path.texts, ["quiet"]);
    assert!(path.skipped_calls.is_empty());
}

#[test]
fn builtin_names_cannot_be_added_twice() {
    let mut macros = Macros::new();
    assert!(macros.has_block("each"));
    assert!(macros.has_inline("component"));
    let err = macros.add_block("if", shout).expect_err("taken");
    assert_eq!(err.kind, CompileErrorKind::Registration);
    assert_eq!(err.message, r#"block macro "if" is already registered"#);
}

#[test]
fn replaced_builtin_wins() {
    let mut program = support::program(NullResolver);
    program.macros_mut().replace_block("if", shout);
    let result = program
        .compile(&template(block_doc("if")))
        .expect("no arity check any more");
    assert_eq!(walk(&program, result.handle, &mut truthy).texts, ["IF"]);
}

#[test]
fn missing_block_fallback_can_be_swapped() {
    let mut program = support::program(NullResolver);
    program.macros_mut().set_missing_block(shout);
    let result = program.compile(&template(block_doc("frob"))).expect("compiles");
    assert!(result.is_ok(), "{:?}", result.errors);
    assert_eq!(walk(&program, result.handle, &mut truthy).texts, ["FROB"]);
}

#[test]
fn empty_table_has_no_fallback() {
    let mut program =
        Program::with_macros(NullResolver, CompileOptions::default(), Macros::empty()).expect("program");
    let err = program.compile(&template(block_doc("frob"))).expect_err("nothing installed");
    assert_eq!(err.kind, CompileErrorKind::Syntax);
    assert_eq!(
        err.message,
        r#"no block macro named "frob" and no fallback is installed"#
    );
    assert_eq!(err.ptr.as_deref(), Some("/block/statements/0"));

    // Inline names with no fallback just append.
    let result = program
        .compile(&template(doc(json!([[1, [35, 0]]]), &[], &["x"])))
        .expect("compiles");
    let path = walk(&program, result.handle, &mut truthy);
    assert_eq!(path.skipped_calls, [program.stdlib().cautious_append]);
}

#[test]
fn with_dynamic_vars_binds_the_hash() {
    let mut program = support::program(NullResolver);
    let result = program
        .compile(&template(doc(
            json!([[
                6,
                [37, 0],
                null,
                [["outletState"], ["o"]],
                [["default"], [[[2, "in"]]]]
            ]]),
            &[],
            &["-with-dynamic-vars"],
        )))
        .expect("compiles");
    let path = walk(&program, result.handle, &mut truthy);
    assert_eq!(path.texts, ["in"]);
    assert_eq!(path.count(Op::PushDynamicScope), 1);
    assert_eq!(path.count(Op::BindDynamicScope), 1);
    assert_eq!(path.count(Op::PopDynamicScope), 1);
}
