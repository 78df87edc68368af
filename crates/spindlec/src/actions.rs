//! The intermediate form produced by the statement, expression and macro compilers.
//!
//! An [`Action`] tree is flattened by the lowering pass: raw instructions go to the
//! encoder, builder ops touch encoder state (labels, mode-dependent opcodes), and
//! resolution/compile actions are expanded into further actions until only raw
//! instructions remain.

use std::rc::Rc;

use crate::error::EncoderError;
use crate::heap::HandleEncoding;
use crate::opcodes::{Op, Register};
use crate::stdlib::StdlibEntry;
use crate::template::{CompilableId, SymbolTable, TemplateMeta, TemplateRef};
use crate::wire::{BlockInvocation, Expr, FreeContext, Hash, Primitive, Referrer, WireBlock, WireBlocks};

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
    StrArray(Vec<String>),
    Serializable(serde_json::Value),
    Immediate(i32),
    Primitive(Primitive),
    TemplateMeta(Referrer),
    Array(Vec<u32>),
    /// Opaque pool entry naming a block the runtime compiles on demand.
    Other(CompilableId),
    Stdlib(StdlibEntry),
    Label(String),
    /// A compiled handle that may only be known after the whole program is compiled.
    Handle(CompilableId, HandleEncoding),
}

impl From<Register> for Operand {
    fn from(register: Register) -> Self {
        Operand::Int(register as i64)
    }
}

impl From<u32> for Operand {
    fn from(value: u32) -> Self {
        Operand::Int(value as i64)
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Bool(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Str(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub op: Op,
    pub operands: Vec<Operand>,
}

/// Structural operations on the encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum BuilderOp {
    Label(String),
    StartLabels,
    StopLabels,
    JitCompileBlock,
    SetBlock(u32),
    GetComponentLayout(Register),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    Helper,
    Modifier,
}

impl ResolveKind {
    pub fn label(self) -> &'static str {
        match self {
            ResolveKind::Helper => "Helper",
            ResolveKind::Modifier => "Modifier",
        }
    }
}

/// Needs a name lookup against the compile-time resolver or the template's upvars.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Expr(Expr),
    SimpleArgs {
        params: Option<Vec<Expr>>,
        hash: Option<Hash>,
        at_names: bool,
    },
    IfResolved {
        kind: ResolveKind,
        name: String,
        params: Option<Vec<Expr>>,
        hash: Option<Hash>,
    },
    ResolveFree(u32),
    ResolveContextualFree {
        slot: u32,
        context: FreeContext,
    },
}

/// Needs further compilation: macro expansion, static invocation, component lookup.
#[derive(Debug, Clone)]
pub enum CompileAction {
    CompileBlock(BlockInvocation),
    CompileInline {
        value: Expr,
        if_unhandled: Box<Action>,
    },
    InvokeStatic(BlockRef),
    PushCompilable(Option<BlockRef>),
    Args(ArgsSpec),
    IfResolvedComponent {
        name: String,
        attrs: Rc<WireBlock>,
        hash: Option<Hash>,
        blocks: Option<WireBlocks>,
    },
}

#[derive(Debug, Clone)]
pub enum Action {
    Op(Instr),
    Builder(BuilderOp),
    Resolve(Resolution),
    Compile(CompileAction),
    Error(EncoderError),
    Seq(Vec<Action>),
    None,
}

impl Action {
    pub fn is_none(&self) -> bool {
        matches!(self, Action::None)
    }
}

impl From<Vec<Action>> for Action {
    fn from(actions: Vec<Action>) -> Self {
        Action::Seq(actions)
    }
}

pub fn op(op: Op, operands: Vec<Operand>) -> Action {
    Action::Op(Instr { op, operands })
}

pub fn op0(code: Op) -> Action {
    op(code, Vec::new())
}

pub fn op1(code: Op, a: impl Into<Operand>) -> Action {
    op(code, vec![a.into()])
}

pub fn label(name: &str) -> Action {
    Action::Builder(BuilderOp::Label(name.to_string()))
}

pub fn label_ref(name: &str) -> Operand {
    Operand::Label(name.to_string())
}

pub fn expr(e: &Expr) -> Action {
    Action::Resolve(Resolution::Expr(e.clone()))
}

pub fn error(problem: impl Into<String>) -> Action {
    Action::Error(EncoderError::new(problem))
}

pub fn str_array(values: &[String]) -> Operand {
    Operand::StrArray(values.to_vec())
}

/// Something that can be compiled to its own handle and pushed or invoked.
#[derive(Debug, Clone)]
pub enum BlockRef {
    Block {
        block: Rc<WireBlock>,
        meta: Rc<TemplateMeta>,
    },
    Template(TemplateRef),
}

impl BlockRef {
    pub fn block(block: &Rc<WireBlock>, meta: &Rc<TemplateMeta>) -> Self {
        BlockRef::Block {
            block: Rc::clone(block),
            meta: Rc::clone(meta),
        }
    }

    pub fn symbol_table(&self) -> SymbolTable {
        match self {
            BlockRef::Block { block, .. } => SymbolTable::Block {
                parameters: block.parameters.clone(),
            },
            BlockRef::Template(template) => template.symbol_table(),
        }
    }

    pub fn parameters(&self) -> &[u32] {
        match self {
            BlockRef::Block { block, .. } => &block.parameters,
            BlockRef::Template(_) => &[],
        }
    }
}

/// Named blocks passed to an invocation. `None` means no block list was given at all,
/// which differs from an empty list.
#[derive(Debug, Clone, Default)]
pub struct NamedBlocks {
    entries: Option<Vec<(String, Option<BlockRef>)>>,
}

impl NamedBlocks {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_wire(blocks: Option<&WireBlocks>, meta: &Rc<TemplateMeta>) -> Self {
        let Some(blocks) = blocks else {
            return Self::empty();
        };
        let entries = blocks
            .names
            .iter()
            .zip(&blocks.blocks)
            .map(|(name, block)| (name.clone(), Some(BlockRef::block(block, meta))))
            .collect();
        Self {
            entries: Some(entries),
        }
    }

    pub fn from_entries(entries: Vec<(String, Option<BlockRef>)>) -> Self {
        Self {
            entries: Some(entries),
        }
    }

    pub fn get(&self, name: &str) -> Option<&BlockRef> {
        self.entries
            .as_ref()?
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, block)| block.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries
            .as_ref()
            .is_some_and(|entries| entries.iter().any(|(n, _)| n == name))
    }

    /// A copy with `name` bound to `block`, replacing any previous binding.
    pub fn with(&self, name: &str, block: Option<BlockRef>) -> Self {
        let mut entries = self.entries.clone().unwrap_or_default();
        match entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = block,
            None => entries.push((name.to_string(), block)),
        }
        Self {
            entries: Some(entries),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .as_ref()
            .map(|entries| entries.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_any(&self) -> bool {
        self.entries.is_some()
    }

    /// Whether at least one name is bound to an actual block.
    pub fn any_supplied(&self) -> bool {
        self.entries
            .as_ref()
            .is_some_and(|entries| entries.iter().any(|(_, block)| block.is_some()))
    }
}

/// Full argument list for component invocations.
#[derive(Debug, Clone)]
pub struct ArgsSpec {
    pub params: Option<Vec<Expr>>,
    pub hash: Option<Hash>,
    pub blocks: NamedBlocks,
    pub at_names: bool,
}
