//! Opcode sequence builders shared by the statement compilers, the macros and the
//! standard library.

use crate::actions::{
    expr, label, label_ref, op, op0, op1, str_array, Action, ArgsSpec, BlockRef, BuilderOp,
    CompileAction, Operand, Resolution,
};
use crate::constants::is_small_int;
use crate::opcodes::{Op, Register};
use crate::stdlib::StdlibEntry;
use crate::wire::{Expr, Hash, Primitive};

/// Pushes a primitive, using an immediate operand for small integers.
pub fn push_primitive(value: Primitive) -> Action {
    let operand = match value {
        Primitive::Number(n) if is_small_int(n) => Operand::Immediate(n as i32),
        other => Operand::Primitive(other),
    };
    op(Op::Primitive, vec![operand])
}

pub fn push_primitive_reference(value: Primitive) -> Action {
    Action::Seq(vec![push_primitive(value), op0(Op::PrimitiveReference)])
}

pub fn dup(register: Register, offset: u32) -> Action {
    op(Op::Dup, vec![register.into(), offset.into()])
}

/// Invokes a helper by its resolved handle and leaves the result in `$v0`.
pub fn call(handle: u32, params: Option<Vec<Expr>>, hash: Option<Hash>) -> Action {
    Action::Seq(vec![
        op0(Op::PushFrame),
        Action::Resolve(Resolution::SimpleArgs {
            params,
            hash,
            at_names: false,
        }),
        op1(Op::Helper, handle),
        op0(Op::PopFrame),
        op1(Op::Fetch, Register::V0),
    ])
}

/// Evaluates `block` with `names` bound in a fresh dynamic scope, taking the values off
/// the stack.
pub fn dynamic_scope(names: &[String], block: Action) -> Action {
    Action::Seq(vec![
        op0(Op::PushDynamicScope),
        op1(Op::BindDynamicScope, str_array(names)),
        block,
        op0(Op::PopDynamicScope),
    ])
}

pub fn yield_block(to: u32, params: Option<Vec<Expr>>) -> Action {
    Action::Seq(vec![
        Action::Resolve(Resolution::SimpleArgs {
            params,
            hash: None,
            at_names: true,
        }),
        op1(Op::GetBlock, to),
        op0(Op::JitSpreadBlock),
        Action::Builder(BuilderOp::JitCompileBlock),
        op0(Op::InvokeYield),
        op0(Op::PopScope),
        op0(Op::PopFrame),
    ])
}

pub fn push_symbol_table(block: Option<&BlockRef>) -> Action {
    match block {
        Some(block) => {
            let table = serde_json::to_value(block.symbol_table()).unwrap_or_default();
            op(Op::PushSymbolTable, vec![Operand::Serializable(table)])
        }
        None => push_primitive(Primitive::Null),
    }
}

pub fn push_yieldable_block(block: Option<&BlockRef>) -> Action {
    Action::Seq(vec![
        push_symbol_table(block),
        op0(Op::PushBlockScope),
        Action::Compile(CompileAction::PushCompilable(block.cloned())),
    ])
}

pub fn invoke_static_block(block: Option<&BlockRef>) -> Action {
    Action::Seq(vec![
        op0(Op::PushFrame),
        Action::Compile(CompileAction::PushCompilable(block.cloned())),
        Action::Builder(BuilderOp::JitCompileBlock),
        op0(Op::InvokeVirtual),
        op0(Op::PopFrame),
    ])
}

/// Invokes `block`, binding up to `caller_count` stack entries to its parameters.
pub fn invoke_static_block_with_stack(block: Option<&BlockRef>, caller_count: u32) -> Action {
    let Some(block) = block else {
        return invoke_static_block(None);
    };
    let parameters = block.parameters();
    let count = caller_count.min(parameters.len() as u32);
    if count == 0 {
        return invoke_static_block(Some(block));
    }

    let mut out = vec![op0(Op::PushFrame), op0(Op::ChildScope)];
    for i in 0..count {
        out.push(dup(Register::Fp, caller_count - i));
        out.push(op1(Op::SetVariable, parameters[i as usize]));
    }
    out.push(Action::Compile(CompileAction::PushCompilable(Some(block.clone()))));
    out.push(Action::Builder(BuilderOp::JitCompileBlock));
    out.push(op0(Op::InvokeVirtual));
    out.push(op0(Op::PopScope));
    out.push(op0(Op::PopFrame));
    Action::Seq(out)
}

/// Positional arguments, returning how many stack slots they occupy.
pub fn compile_positional(params: Option<&[Expr]>) -> (u32, Action) {
    match params {
        None => (0, Action::None),
        Some(params) => (
            params.len() as u32,
            Action::Seq(params.iter().map(expr).collect()),
        ),
    }
}

pub fn compile_simple_args(params: Option<&[Expr]>, hash: Option<&Hash>, at_names: bool) -> Action {
    let (count, positional) = compile_positional(params);
    let mut out = vec![positional];
    let mut flags = count << 4;
    if at_names {
        flags |= 0b1000;
    }
    let mut names: &[String] = &[];
    if let Some(hash) = hash {
        names = &hash.names;
        out.extend(hash.values.iter().map(expr));
    }
    out.push(op(
        Op::PushArgs,
        vec![str_array(names), Operand::StrArray(Vec::new()), flags.into()],
    ));
    Action::Seq(out)
}

/// Full arguments: yieldable blocks, positional values, then named values.
pub fn compile_args(spec: &ArgsSpec) -> Action {
    let block_names = spec.blocks.names();
    let mut out: Vec<Action> = block_names
        .iter()
        .map(|name| push_yieldable_block(spec.blocks.get(name)))
        .collect();

    let (count, positional) = compile_positional(spec.params.as_deref());
    out.push(positional);
    let mut flags = count << 4;
    if spec.at_names {
        flags |= 0b1000;
    }
    flags |= 0b111;

    let mut names: &[String] = &[];
    if let Some(hash) = &spec.hash {
        names = &hash.names;
        out.extend(hash.values.iter().map(expr));
    }
    out.push(op(
        Op::PushArgs,
        vec![str_array(names), str_array(&block_names), flags.into()],
    ));
    Action::Seq(out)
}

/// A region that is re-executed from `Enter` when anything it asserted on changes.
///
/// `args` pushes `count` stack entries that are restored before each replay. `body` may
/// finish early by jumping to `FINALLY`.
pub fn replayable(count: u32, args: Action, body: Action) -> Action {
    Action::Seq(vec![
        Action::Builder(BuilderOp::StartLabels),
        op0(Op::PushFrame),
        op1(Op::ReturnTo, label_ref("ENDINITIAL")),
        args,
        op1(Op::Enter, count),
        body,
        label("FINALLY"),
        op0(Op::Exit),
        op0(Op::Return),
        label("ENDINITIAL"),
        op0(Op::PopFrame),
        Action::Builder(BuilderOp::StopLabels),
    ])
}

pub fn replayable_if(count: u32, args: Action, if_true: Action, if_false: Option<Action>) -> Action {
    let mut body = vec![
        op1(Op::JumpUnless, label_ref("ELSE")),
        if_true,
        op1(Op::Jump, label_ref("FINALLY")),
        label("ELSE"),
    ];
    if let Some(if_false) = if_false {
        body.push(if_false);
    }
    replayable(count, args, Action::Seq(body))
}

/// Multi-way dispatch on a reified `u32` at the top of the stack.
///
/// Clauses are emitted in reverse registration order, so the first clause sits right
/// before `END` and the earliest registered match takes the fewest instructions.
#[derive(Debug, Default)]
pub struct SwitchCases {
    clauses: Vec<(u32, Action)>,
}

impl SwitchCases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, value: u32, body: Action) -> Self {
        self.clauses.push((value, body));
        self
    }

    pub fn build(self) -> Action {
        let mut out = vec![
            op1(Op::Enter, 2u32),
            op0(Op::AssertSame),
            op0(Op::ReifyU32),
            Action::Builder(BuilderOp::StartLabels),
        ];
        let last = self.clauses.len().saturating_sub(1);
        for (i, (value, _)) in self.clauses.iter().enumerate().take(last) {
            out.push(op(
                Op::JumpEq,
                vec![label_ref(&clause_label(i)), (*value).into()],
            ));
        }
        for (i, (_, body)) in self.clauses.into_iter().enumerate().rev() {
            out.push(label(&clause_label(i)));
            out.push(op1(Op::Pop, 2u32));
            out.push(body);
            if i != 0 {
                out.push(op1(Op::Jump, label_ref("END")));
            }
        }
        out.push(label("END"));
        out.push(Action::Builder(BuilderOp::StopLabels));
        out.push(op0(Op::Exit));
        Action::Seq(out)
    }
}

fn clause_label(index: usize) -> String {
    format!("CLAUSE{index}")
}

/// Saves `register` around `block`.
pub fn with_saved_register(register: Register, block: Action) -> Action {
    Action::Seq(vec![op1(Op::Fetch, register), block, op1(Op::Load, register)])
}

pub fn invoke_stdlib(entry: StdlibEntry, value: &Expr) -> Action {
    Action::Seq(vec![
        op0(Op::PushFrame),
        expr(value),
        op(Op::InvokeStatic, vec![Operand::Stdlib(entry)]),
        op0(Op::PopFrame),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Instr;

    fn flatten(action: &Action, out: &mut Vec<String>) {
        match action {
            Action::Op(Instr { op, .. }) => out.push(op.name().to_string()),
            Action::Builder(BuilderOp::Label(name)) => out.push(format!("{name}:")),
            Action::Seq(items) => items.iter().for_each(|a| flatten(a, out)),
            _ => {}
        }
    }

    #[test]
    fn switch_cases_place_first_clause_last_without_jump() {
        let action = SwitchCases::new()
            .when(1, op0(Op::AppendText))
            .when(0, op0(Op::AppendNode))
            .build();
        let mut names = Vec::new();
        flatten(&action, &mut names);
        assert_eq!(
            names,
            [
                "Enter", "AssertSame", "ReifyU32", "JumpEq", "CLAUSE1:", "Pop", "AppendNode",
                "Jump", "CLAUSE0:", "Pop", "AppendText", "END:", "Exit"
            ]
        );
    }

    #[test]
    fn positional_args_count_slots() {
        let params = vec![Expr::Literal(Primitive::Number(1.0)), Expr::Undefined];
        let (count, _) = compile_positional(Some(&params));
        assert_eq!(count, 2);
        assert!(compile_positional(None).1.is_none());
    }
}
