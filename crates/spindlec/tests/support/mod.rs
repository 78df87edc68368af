#![allow(dead_code)]

use std::rc::Rc;

use serde_json::Value;
use spindlec::constants::Constant;
use spindlec::disasm::{disassemble, Decoded, Row};
use spindlec::opcodes::Op;
use spindlec::{
    CompileMode, CompileOptions, CompileResult, CompileTimeResolver, Handle, Program, Template,
};

const STEP_LIMIT: usize = 10_000;

pub fn program(resolver: impl CompileTimeResolver + 'static) -> Program {
    program_in(resolver, CompileMode::Aot)
}

pub fn program_in(resolver: impl CompileTimeResolver + 'static, mode: CompileMode) -> Program {
    let options = CompileOptions {
        mode,
        ..CompileOptions::default()
    };
    Program::new(resolver, options).expect("program")
}

pub fn template(doc: Value) -> Rc<Template> {
    Template::from_value(&doc).expect("template decodes")
}

/// A template document with the given statements, symbols and upvars.
pub fn doc(statements: Value, symbols: &[&str], upvars: &[&str]) -> Value {
    serde_json::json!({
        "id": "test",
        "moduleName": "templates/test",
        "block": {
            "statements": statements,
            "symbols": symbols,
            "hasEval": false,
            "upvars": upvars,
        }
    })
}

pub fn compile(program: &mut Program, doc: Value) -> CompileResult {
    program.compile(&template(doc)).expect("compiles")
}

pub fn rows(program: &Program, handle: Handle) -> Vec<Row> {
    disassemble(program, handle).expect("disassembles")
}

pub fn ops(program: &Program, handle: Handle) -> Vec<Op> {
    rows(program, handle).into_iter().map(|row| row.op).collect()
}

/// What one path through the heap did.
#[derive(Debug, Default)]
pub struct Trace {
    pub executed: Vec<Op>,
    pub texts: Vec<String>,
    /// Stdlib routines and other handles that were invoked but not entered.
    pub skipped_calls: Vec<Handle>,
}

impl Trace {
    pub fn count(&self, op: Op) -> usize {
        self.executed.iter().filter(|o| **o == op).count()
    }
}

/// Walks the instructions of `handle` the way the VM would, entering blocks invoked
/// through `InvokeStatic` or a pushed immediate handle plus `InvokeVirtual`.
///
/// `take` is asked at every conditional jump (`JumpIf`, `JumpUnless`, `JumpEq`,
/// `Iterate`) whether the jump is taken. Stdlib routines are not entered unless
/// `handle` is one of them.
pub fn walk(program: &Program, handle: Handle, take: &mut dyn FnMut(&Row) -> bool) -> Trace {
    let mut trace = Trace::default();
    walk_into(program, handle, take, &mut trace);
    trace
}

fn walk_into(program: &Program, handle: Handle, take: &mut dyn FnMut(&Row) -> bool, trace: &mut Trace) {
    let rows = rows(program, handle);
    let at = |offset: usize| {
        rows.iter()
            .position(|row| row.offset == offset)
            .unwrap_or_else(|| panic!("no instruction at offset {offset} in {handle:?}"))
    };
    let stdlib = program.stdlib();
    let is_stdlib = |h: Handle| h == stdlib.main || h == stdlib.trusting_append || h == stdlib.cautious_append;

    let mut pc = 0;
    let mut ra: Option<usize> = None;
    let mut frames: Vec<Option<usize>> = Vec::new();
    let mut pushed_block: Option<Handle> = None;

    for _ in 0..STEP_LIMIT {
        let row = &rows[pc];
        trace.executed.push(row.op);
        let mut next = pc + 1;
        match row.op {
            Op::Text => trace.texts.push(row.text().expect("text operand").to_string()),
            // Yielded blocks are not entered, but the frame the VM pushes for them is
            // popped by the instructions that follow.
            Op::PushFrame | Op::InvokeYield => frames.push(ra),
            Op::PopFrame => ra = frames.pop().expect("balanced frames"),
            Op::ReturnTo => ra = row.jump_target(),
            Op::Return => match ra {
                Some(target) => next = at(target),
                None => return,
            },
            Op::Jump => next = at(row.jump_target().expect("target")),
            Op::JumpIf | Op::JumpUnless | Op::JumpEq | Op::Iterate => {
                if take(row) {
                    next = at(row.jump_target().expect("target"));
                }
            }
            Op::Primitive => {
                pushed_block = match row.operands.first() {
                    Some(Decoded::Immediate { value }) => Some(Handle(*value as u32)),
                    _ => None,
                };
            }
            Op::InvokeVirtual => {
                if let Some(block) = pushed_block.take() {
                    walk_into(program, block, take, trace);
                }
            }
            Op::InvokeStatic => {
                if let Some(Decoded::Handle { value }) = row.operands.first() {
                    let callee = Handle(*value);
                    if is_stdlib(callee) {
                        trace.skipped_calls.push(callee);
                    } else {
                        walk_into(program, callee, take, trace);
                    }
                }
            }
            _ => {}
        }
        pc = next;
    }
    panic!("walk of {handle:?} did not finish within {STEP_LIMIT} steps");
}

/// Takes every `JumpUnless`, so conditionals render their inverse branch.
pub fn falsy(row: &Row) -> bool {
    row.op == Op::JumpUnless
}

/// Takes no jump at all.
pub fn truthy(_: &Row) -> bool {
    false
}

/// Comparison operand of a `JumpEq`.
pub fn jump_eq_value(row: &Row) -> i32 {
    match row.operands.get(1) {
        Some(decoded) => decoded.raw().expect("raw comparison"),
        None => panic!("JumpEq without a comparison operand"),
    }
}

/// The first instruction with `op`.
pub fn find(rows: &[Row], op: Op) -> &Row {
    rows.iter()
        .find(|row| row.op == op)
        .unwrap_or_else(|| panic!("no {op} in {rows:#?}"))
}

/// The compilable ids pushed as `Constant` operands in just-in-time mode.
pub fn constant_compilables(program: &Program, handle: Handle) -> Vec<u32> {
    rows(program, handle)
        .iter()
        .filter(|row| row.op == Op::Constant)
        .filter_map(|row| match row.operands.first() {
            Some(Decoded::Constant { index, .. }) => match program.constants().get(*index) {
                Some(Constant::Compilable(id)) => Some(*id),
                _ => None,
            },
            _ => None,
        })
        .collect()
}
