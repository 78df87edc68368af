use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde::Serialize;

use crate::actions::{Action, BlockRef};
use crate::components::wrapped_component;
use crate::constants::Constants;
use crate::encoder::Committed;
use crate::error::{CompileError, EncoderError};
use crate::heap::{Handle, Heap};
use crate::lowering::Lowering;
use crate::macros::Macros;
use crate::resolver::CompileTimeResolver;
use crate::stdlib::{self, Stdlib};
use crate::template::{CompilableId, SymbolTable, Template, TemplateMeta, TemplateRef, TemplateView};
use crate::wire::{DecodeLimits, WireBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileMode {
    /// Every reachable block is compiled up front; handles are patched into the heap.
    #[default]
    Aot,
    /// Blocks are pushed as constants and compiled when the runtime first needs them.
    Jit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub mode: CompileMode,
    pub max_template_bytes: usize,
    pub max_nesting_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        let limits = DecodeLimits::default();
        Self {
            mode: CompileMode::default(),
            max_template_bytes: limits.max_template_bytes,
            max_nesting_depth: limits.max_nesting_depth,
        }
    }
}

impl CompileOptions {
    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_template_bytes: self.max_template_bytes,
            max_nesting_depth: self.max_nesting_depth,
        }
    }
}

/// A compiled handle plus the non-fatal errors recorded while compiling it and the
/// blocks it pulled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    pub handle: Handle,
    pub errors: Vec<EncoderError>,
}

impl CompileResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialDefinition {
    pub symbol_table: SymbolTable,
    pub handle: Handle,
    pub errors: Vec<EncoderError>,
}

#[derive(Debug, Clone)]
enum Source {
    Block {
        block: Rc<WireBlock>,
        meta: Rc<TemplateMeta>,
    },
    View(TemplateRef),
}

#[derive(Debug, Clone)]
enum State {
    Pending { queued: bool },
    /// Self-references see this and wait for the deferred patch.
    Compiling,
    Compiled(Committed),
}

#[derive(Debug)]
struct Slot {
    source: Source,
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    /// A nested block is compiled once per meta, so each view of a template lowers
    /// its own copy.
    Block(usize, usize),
    View(usize, TemplateView),
}

/// Everything that has been handed a [`CompilableId`], compiled or not.
#[derive(Debug, Default)]
pub(crate) struct Compilables {
    slots: Vec<Slot>,
    by_key: HashMap<Key, CompilableId>,
    queue: VecDeque<CompilableId>,
}

impl Compilables {
    /// The id for `block`, assigning one on first sight. Ahead-of-time compilation
    /// queues it for the current compile.
    pub fn register(&mut self, block: &BlockRef, mode: CompileMode) -> CompilableId {
        let (key, source) = match block {
            BlockRef::Block { block, meta } => (
                Key::Block(Rc::as_ptr(block) as usize, Rc::as_ptr(meta) as usize),
                Source::Block {
                    block: Rc::clone(block),
                    meta: Rc::clone(meta),
                },
            ),
            BlockRef::Template(view) => {
                let (ptr, view_kind) = view.key();
                (Key::View(ptr, view_kind), Source::View(view.clone()))
            }
        };
        let id = match self.by_key.get(&key) {
            Some(&id) => id,
            None => {
                let id = CompilableId(self.slots.len() as u32);
                self.slots.push(Slot {
                    source,
                    state: State::Pending { queued: false },
                });
                self.by_key.insert(key, id);
                id
            }
        };
        if mode == CompileMode::Aot {
            self.enqueue(id);
        }
        id
    }

    fn enqueue(&mut self, id: CompilableId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            if let State::Pending { queued: false } = slot.state {
                slot.state = State::Pending { queued: true };
                self.queue.push_back(id);
            }
        }
    }

    pub fn handle(&self, id: CompilableId) -> Option<Handle> {
        match &self.slots.get(id.0 as usize)?.state {
            State::Compiled(committed) => Some(committed.handle),
            State::Pending { .. } | State::Compiling => None,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn symbol_table(&self, id: CompilableId) -> Option<SymbolTable> {
        Some(match &self.slots.get(id.0 as usize)?.source {
            Source::Block { block, .. } => SymbolTable::Block {
                parameters: block.parameters.clone(),
            },
            Source::View(view) => view.symbol_table(),
        })
    }
}

/// A compilation context: constant pool, instruction heap, resolver, macros and the
/// standard library, shared by every template compiled into it.
pub struct Program {
    options: CompileOptions,
    resolver: Box<dyn CompileTimeResolver>,
    macros: Macros,
    constants: Constants,
    heap: Heap,
    compilables: Compilables,
    stdlib: Stdlib,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("options", &self.options)
            .field("macros", &self.macros)
            .field("constants", &self.constants.len())
            .field("heap", &self.heap.size())
            .field("compilables", &self.compilables.len())
            .field("stdlib", &self.stdlib)
            .finish()
    }
}

impl Program {
    pub fn new(
        resolver: impl CompileTimeResolver + 'static,
        options: CompileOptions,
    ) -> Result<Self, CompileError> {
        Self::with_macros(resolver, options, Macros::new())
    }

    pub fn with_macros(
        resolver: impl CompileTimeResolver + 'static,
        options: CompileOptions,
        macros: Macros,
    ) -> Result<Self, CompileError> {
        let resolver: Box<dyn CompileTimeResolver> = Box::new(resolver);
        let mut constants = Constants::new();
        let mut heap = Heap::new();
        let mut compilables = Compilables::default();

        let meta = Rc::new(stdlib::meta());
        let no_macros = Macros::empty();
        let mut handles = Vec::with_capacity(stdlib::ENTRIES.len());
        for entry in stdlib::ENTRIES {
            let mut lowering = Lowering::new(
                &mut constants,
                &mut compilables,
                resolver.as_ref(),
                &no_macros,
                options.mode,
                Rc::clone(&meta),
            );
            lowering.concat(stdlib::routine(entry))?;
            let committed = lowering.commit(&mut heap)?;
            if !committed.errors.is_empty() {
                return Err(CompileError::internal(format!(
                    "Unexpected errors compiling std: {}",
                    committed.errors[0]
                )));
            }
            log::debug!("stdlib: {} -> {:?}", entry.name(), committed.handle);
            handles.push(committed.handle);
        }
        let stdlib = Stdlib {
            main: handles[0],
            trusting_append: handles[1],
            cautious_append: handles[2],
        };

        Ok(Self {
            options,
            resolver,
            macros,
            constants,
            heap,
            compilables,
            stdlib,
        })
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn mode(&self) -> CompileMode {
        self.options.mode
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn stdlib(&self) -> &Stdlib {
        &self.stdlib
    }

    pub fn resolver(&self) -> &dyn CompileTimeResolver {
        self.resolver.as_ref()
    }

    pub fn macros_mut(&mut self) -> &mut Macros {
        &mut self.macros
    }

    /// Decodes template JSON under this program's limits.
    pub fn load(&self, bytes: &[u8]) -> Result<Rc<Template>, CompileError> {
        Ok(Template::from_json(bytes, &self.options.decode_limits())?)
    }

    pub fn compile(&mut self, template: &Rc<Template>) -> Result<CompileResult, CompileError> {
        self.compile_view(template.as_layout())
    }

    pub fn compile_wrapped_layout(&mut self, template: &Rc<Template>) -> Result<CompileResult, CompileError> {
        self.compile_view(template.as_wrapped_layout())
    }

    pub fn compile_partial(&mut self, template: &Rc<Template>) -> Result<PartialDefinition, CompileError> {
        let view = template.as_partial();
        let symbol_table = view.symbol_table();
        let result = self.compile_view(view)?;
        Ok(PartialDefinition {
            symbol_table,
            handle: result.handle,
            errors: result.errors,
        })
    }

    pub fn compile_view(&mut self, view: TemplateRef) -> Result<CompileResult, CompileError> {
        let id = self.compilables.register(&BlockRef::Template(view), self.options.mode);
        self.compile_block(id)
    }

    /// Compiles a registered compilable. Just-in-time runtimes call this for the
    /// `Constant` operands they meet; ahead of time it also drains every block the
    /// compilable reaches.
    pub fn compile_block(&mut self, id: CompilableId) -> Result<CompileResult, CompileError> {
        let (first, _) = self.compile_slot(id)?;
        let mut errors = first.errors.clone();

        while let Some(next) = self.compilables.queue.pop_front() {
            let (committed, fresh) = self.compile_slot(next)?;
            if fresh {
                errors.extend(committed.errors);
            }
        }

        let compilables = &self.compilables;
        let patched = self.heap.patch_deferred(|id| compilables.handle(id));
        self.heap.patch_stdlib(&self.stdlib);
        log::debug!(
            "compiled {id:?} -> {:?}: {patched} deferred handle(s) patched, {} pending",
            first.handle,
            self.heap.pending_deferred()
        );
        Ok(CompileResult {
            handle: first.handle,
            errors,
        })
    }

    pub fn compilable_handle(&self, id: CompilableId) -> Option<Handle> {
        self.compilables.handle(id)
    }

    pub fn compilable_symbol_table(&self, id: CompilableId) -> Option<SymbolTable> {
        self.compilables.symbol_table(id)
    }

    pub fn compilable_count(&self) -> usize {
        self.compilables.len()
    }

    /// Compiles one slot, or returns its cached result. The flag is true when the
    /// slot was compiled by this call.
    fn compile_slot(&mut self, id: CompilableId) -> Result<(Committed, bool), CompileError> {
        let index = id.0 as usize;
        let slot = self
            .compilables
            .slots
            .get(index)
            .ok_or_else(|| CompileError::internal(format!("unknown compilable {}", id.0)))?;
        let source = match &slot.state {
            State::Compiled(committed) => return Ok((committed.clone(), false)),
            State::Compiling => {
                return Err(CompileError::internal(format!(
                    "compilable {} is already being compiled",
                    id.0
                )))
            }
            State::Pending { .. } => slot.source.clone(),
        };
        self.compilables.slots[index].state = State::Compiling;

        match self.lower(source) {
            Ok(committed) => {
                log::debug!(
                    "compilable {} -> {:?} ({} error(s))",
                    id.0,
                    committed.handle,
                    committed.errors.len()
                );
                self.compilables.slots[index].state = State::Compiled(committed.clone());
                Ok((committed, true))
            }
            Err(err) => {
                // A later reference may queue it again.
                self.compilables.slots[index].state = State::Pending { queued: false };
                Err(err)
            }
        }
    }

    fn lower(&mut self, source: Source) -> Result<Committed, CompileError> {
        let (meta, body) = match source {
            Source::Block { block, meta } => (meta, Body::Statements(block)),
            Source::View(view) => {
                let meta = Rc::new(view.template.meta(view.view));
                match view.view {
                    TemplateView::WrappedLayout => {
                        let body = BlockRef::block(&view.template.body_block(), &meta);
                        let action = wrapped_component(body, view.attrs_block_number());
                        (meta, Body::Action(action))
                    }
                    TemplateView::Layout | TemplateView::Partial => {
                        (meta, Body::Statements(view.template.body_block()))
                    }
                }
            }
        };

        let mut lowering = Lowering::new(
            &mut self.constants,
            &mut self.compilables,
            self.resolver.as_ref(),
            &self.macros,
            self.options.mode,
            meta,
        );
        match body {
            Body::Statements(block) => lowering.statements(&block.statements)?,
            Body::Action(action) => lowering.concat(action)?,
        }
        lowering.commit(&mut self.heap)
    }
}

enum Body {
    Statements(Rc<WireBlock>),
    Action(Action),
}
