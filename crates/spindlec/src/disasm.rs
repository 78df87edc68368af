//! Decodes committed heap ranges back into readable instructions.

use std::fmt;

use serde::Serialize;

use crate::constants::{decode_immediate, Constant};
use crate::error::CompileError;
use crate::heap::Handle;
use crate::opcodes::{Op, ARG_SHIFT, OPERAND_LEN_MASK, TYPE_MASK};
use crate::program::Program;
use crate::template::CompilableId;

/// One decoded operand word.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Decoded {
    Raw { value: i32 },
    Immediate { value: i32 },
    Constant { index: u32, value: String },
    /// Absolute offset within the handle's range.
    Label { target: usize },
    Handle { value: u32 },
}

impl Decoded {
    pub fn raw(&self) -> Option<i32> {
        match self {
            Decoded::Raw { value } | Decoded::Immediate { value } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Raw { value } => write!(f, "{value}"),
            Decoded::Immediate { value } => write!(f, "#{value}"),
            Decoded::Constant { index, value } => write!(f, "c{index}={value}"),
            Decoded::Label { target } => write!(f, "@{target}"),
            Decoded::Handle { value } => write!(f, "h{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub offset: usize,
    #[serde(skip)]
    pub op: Op,
    pub name: &'static str,
    pub operands: Vec<Decoded>,
}

impl Row {
    /// Where control goes when this instruction jumps.
    pub fn jump_target(&self) -> Option<usize> {
        self.operands.iter().find_map(|operand| match operand {
            Decoded::Label { target } => Some(*target),
            _ => None,
        })
    }

    /// Text of a `Text` instruction.
    pub fn text(&self) -> Option<&str> {
        match (self.op, self.operands.first()) {
            (Op::Text, Some(Decoded::Constant { value, .. })) => {
                value.strip_prefix('"').and_then(|v| v.strip_suffix('"'))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5}  {}", self.offset, self.name)?;
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Raw,
    Const,
    /// A pool index where `0` stands for an absent value.
    OptConst,
    Label,
    Handle,
    /// Small integers inline, anything else in the pool.
    Primitive,
}

fn operand_kinds(op: Op) -> &'static [Kind] {
    use Kind::*;
    match op {
        Op::Jump | Op::JumpIf | Op::JumpUnless | Op::ReturnTo | Op::EnterList | Op::Iterate => &[Label],
        Op::JumpEq => &[Label, Raw],
        Op::Text
        | Op::Comment
        | Op::OpenElement
        | Op::GetProperty
        | Op::ResolveMaybeLocal
        | Op::Constant
        | Op::BindDynamicScope
        | Op::PushSymbolTable
        | Op::CurryComponent => &[Const],
        Op::StaticAttr | Op::StaticComponentAttr => &[Const, Const, OptConst],
        Op::DynamicAttr | Op::ComponentAttr => &[Const, Raw, OptConst],
        Op::PushArgs => &[Const, Const, Raw],
        Op::InvokePartial => &[Const, Const, Const],
        Op::Debugger => &[Const, Const],
        Op::Primitive => &[Primitive],
        Op::InvokeStatic => &[Handle],
        _ => &[],
    }
}

fn describe(program: &Program, index: u32) -> String {
    match program.constants().get(index) {
        Some(Constant::Compilable(id)) => match program.compilable_handle(CompilableId(*id)) {
            Some(handle) => format!("compilable({id})->h{}", handle.0),
            None => format!("compilable({id})"),
        },
        _ => program.constants().describe(index),
    }
}

pub fn disassemble(program: &Program, handle: Handle) -> Result<Vec<Row>, CompileError> {
    let words = program
        .heap()
        .instructions(handle)
        .ok_or_else(|| CompileError::internal(format!("unknown handle {}", handle.0)))?;

    let mut rows = Vec::new();
    let mut at = 0;
    while at < words.len() {
        let header = words[at];
        let code = (header & TYPE_MASK) as u8;
        let op = Op::from_u8(code)
            .ok_or_else(|| CompileError::internal(format!("unknown opcode {code} at offset {at}")))?;
        let count = ((header & OPERAND_LEN_MASK) >> ARG_SHIFT) as usize;
        let operand_words = words.get(at + 1..at + 1 + count).ok_or_else(|| {
            CompileError::internal(format!("{op} at offset {at} runs past the end of h{}", handle.0))
        })?;

        let kinds = operand_kinds(op);
        let operands = operand_words
            .iter()
            .enumerate()
            .map(|(index, &word)| match kinds.get(index).copied().unwrap_or(Kind::Raw) {
                Kind::Raw => Decoded::Raw { value: word },
                Kind::Label => Decoded::Label {
                    target: (at as i64 + index as i64 + word as i64).max(0) as usize,
                },
                Kind::Handle => Decoded::Handle { value: word as u32 },
                Kind::Const => Decoded::Constant {
                    index: word as u32,
                    value: describe(program, word as u32),
                },
                Kind::OptConst if word == 0 => Decoded::Raw { value: 0 },
                Kind::OptConst => Decoded::Constant {
                    index: word as u32,
                    value: describe(program, word as u32),
                },
                Kind::Primitive if word < 0 => Decoded::Immediate {
                    value: decode_immediate(word),
                },
                Kind::Primitive => Decoded::Constant {
                    index: word as u32,
                    value: describe(program, word as u32),
                },
            })
            .collect();

        rows.push(Row {
            offset: at,
            op,
            name: op.name(),
            operands,
        });
        at += 1 + count;
    }
    Ok(rows)
}

/// Every committed handle with a short label: stdlib routines by name, the rest by number.
pub fn handles(program: &Program) -> Vec<(Handle, String)> {
    let stdlib = program.stdlib();
    (0..program.heap().handle_count() as u32)
        .map(Handle)
        .map(|handle| {
            let label = crate::stdlib::ENTRIES
                .iter()
                .find(|entry| stdlib.get(**entry) == handle)
                .map(|entry| format!("stdlib:{}", entry.name()))
                .unwrap_or_else(|| format!("h{}", handle.0));
            (handle, label)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::CompileOptions;
    use crate::resolver::NullResolver;

    #[test]
    fn stdlib_main_decodes_cleanly() {
        let program = Program::new(NullResolver, CompileOptions::default()).expect("program");
        let rows = disassemble(&program, program.stdlib().main).expect("rows");
        assert_eq!(rows.last().map(|r| r.op), Some(Op::Return));
        assert!(rows.iter().any(|r| r.op == Op::Main));

        let labels: Vec<String> = handles(&program).into_iter().map(|(_, label)| label).collect();
        assert_eq!(
            labels,
            ["stdlib:main", "stdlib:trusting-append", "stdlib:cautious-append"]
        );
    }
}
