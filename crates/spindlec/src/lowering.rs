//! Flattens [`Action`] trees into the encoder, performing name resolution, macro
//! expansion and compilable registration along the way.

use std::rc::Rc;

use crate::actions::{
    error, op, op0, op1, Action, BlockRef, BuilderOp, CompileAction, NamedBlocks, Operand,
    ResolveKind, Resolution,
};
use crate::builder::{call, compile_args, compile_simple_args, push_primitive};
use crate::components::{invoke_component, invoke_static_component, ComponentInvocation, StaticInvocation};
use crate::constants::Constants;
use crate::encoder::{Committed, Encoder};
use crate::error::CompileError;
use crate::expressions::{compile_expr, expect_string, Named};
use crate::heap::{HandleEncoding, Heap};
use crate::macros::{BlockCall, Inline, MacroContext, Macros};
use crate::opcodes::Op;
use crate::program::{Compilables, CompileMode};
use crate::resolver::CompileTimeResolver;
use crate::statements::compile_statement;
use crate::template::TemplateMeta;
use crate::wire::{FreeContext, Primitive, Statement};

pub(crate) struct Lowering<'p> {
    pub constants: &'p mut Constants,
    pub compilables: &'p mut Compilables,
    pub resolver: &'p dyn CompileTimeResolver,
    pub macros: &'p Macros,
    pub mode: CompileMode,
    meta: Rc<TemplateMeta>,
    encoder: Encoder,
    /// Pointer of the statement being lowered, attached to every recorded error.
    ptr: String,
}

impl<'p> Lowering<'p> {
    pub fn new(
        constants: &'p mut Constants,
        compilables: &'p mut Compilables,
        resolver: &'p dyn CompileTimeResolver,
        macros: &'p Macros,
        mode: CompileMode,
        meta: Rc<TemplateMeta>,
    ) -> Self {
        Self {
            constants,
            compilables,
            resolver,
            macros,
            mode,
            meta,
            encoder: Encoder::new(),
            ptr: String::new(),
        }
    }

    pub fn statements(&mut self, statements: &[Statement]) -> Result<(), CompileError> {
        let meta = Rc::clone(&self.meta);
        for statement in statements {
            self.ptr.clone_from(&statement.ptr);
            let action = compile_statement(statement, &meta)?;
            self.concat(action).map_err(|e| e.at(&statement.ptr))?;
        }
        Ok(())
    }

    pub fn commit(self, heap: &mut Heap) -> Result<Committed, CompileError> {
        self.encoder.commit(heap, self.meta.size)
    }

    pub fn concat(&mut self, action: Action) -> Result<(), CompileError> {
        match action {
            Action::None => Ok(()),
            Action::Seq(items) => {
                for item in items {
                    self.concat(item)?;
                }
                Ok(())
            }
            Action::Op(instr) => self.encoder.push(self.constants, &instr),
            Action::Builder(builder) => self.builder(builder),
            Action::Resolve(resolution) => self.resolve(resolution),
            Action::Compile(compile) => self.compile(compile),
            Action::Error(mut problem) => {
                if problem.ptr.is_none() && !self.ptr.is_empty() {
                    problem.ptr = Some(self.ptr.clone());
                }
                log::debug!("recorded compile error: {problem}");
                self.encoder.error(problem);
                Ok(())
            }
        }
    }

    fn builder(&mut self, builder: BuilderOp) -> Result<(), CompileError> {
        match builder {
            BuilderOp::Label(name) => self.encoder.label(&name),
            BuilderOp::StartLabels => {
                self.encoder.start_labels();
                Ok(())
            }
            BuilderOp::StopLabels => self.encoder.stop_labels(),
            BuilderOp::JitCompileBlock => match self.mode {
                CompileMode::Jit => self.concat(op0(Op::CompileBlock)),
                CompileMode::Aot => Ok(()),
            },
            BuilderOp::SetBlock(symbol) => {
                let code = match self.mode {
                    CompileMode::Aot => Op::SetAotBlock,
                    CompileMode::Jit => Op::SetJitBlock,
                };
                self.concat(op1(code, symbol))
            }
            BuilderOp::GetComponentLayout(register) => {
                let code = match self.mode {
                    CompileMode::Aot => Op::GetAotComponentLayout,
                    CompileMode::Jit => Op::GetJitComponentLayout,
                };
                self.concat(op1(code, register))
            }
        }
    }

    fn resolve(&mut self, resolution: Resolution) -> Result<(), CompileError> {
        let action = match resolution {
            Resolution::Expr(value) => compile_expr(&value, &self.meta)?,
            Resolution::SimpleArgs {
                params,
                hash,
                at_names,
            } => compile_simple_args(params.as_deref(), hash.as_ref(), at_names),
            Resolution::IfResolved {
                kind,
                name,
                params,
                hash,
            } => {
                let referrer = &self.meta.referrer;
                let handle = match kind {
                    ResolveKind::Helper => self.resolver.lookup_helper(&name, referrer),
                    ResolveKind::Modifier => self.resolver.lookup_modifier(&name, referrer),
                };
                match (kind, handle) {
                    (_, None) => error(format!("Unexpected {} {name}", kind.label())),
                    (ResolveKind::Helper, Some(handle)) => call(handle, params, hash),
                    (ResolveKind::Modifier, Some(handle)) => Action::Seq(vec![
                        op0(Op::PushFrame),
                        Action::Resolve(Resolution::SimpleArgs {
                            params,
                            hash,
                            at_names: false,
                        }),
                        op1(Op::Modifier, handle),
                        op0(Op::PopFrame),
                    ]),
                }
            }
            Resolution::ResolveFree(slot) => {
                return Err(CompileError::unsupported(format!(
                    "free variable {slot} has no evaluation context; only contextual free variables can be resolved"
                )))
            }
            Resolution::ResolveContextualFree { slot, context } => {
                self.contextual_free(slot, context)?
            }
        };
        self.concat(action)
    }

    fn contextual_free(&self, slot: u32, context: FreeContext) -> Result<Action, CompileError> {
        let name = self
            .meta
            .upvar(slot)
            .ok_or_else(|| CompileError::syntax(format!("free variable {slot} is not in the template's upvars")))?
            .to_string();

        if self.meta.as_partial {
            return Ok(op1(Op::ResolveMaybeLocal, Operand::Str(name)));
        }

        let this_fallback = |name: String| {
            Action::Seq(vec![
                op1(Op::GetVariable, 0u32),
                op1(Op::GetProperty, Operand::Str(name)),
            ])
        };
        match context {
            FreeContext::Expression => Ok(this_fallback(name)),
            FreeContext::AppendSingleId => {
                match self.resolver.lookup_helper(&name, &self.meta.referrer) {
                    Some(handle) => Ok(call(handle, None, None)),
                    None => Ok(this_fallback(name)),
                }
            }
            other => Err(CompileError::unsupported(format!(
                "unimplemented: Can't evaluate expression in context {}",
                other as u8
            ))),
        }
    }

    fn compile(&mut self, compile: CompileAction) -> Result<(), CompileError> {
        let meta = Rc::clone(&self.meta);
        let action = match compile {
            CompileAction::CompileBlock(invocation) => {
                let blocks = NamedBlocks::from_wire(invocation.blocks.as_ref(), &meta);
                match expect_string(&invocation.head, &meta, "Expected block head to be a string")? {
                    Named::Error(action) => action,
                    Named::Name(name) => {
                        let call = BlockCall {
                            name,
                            params: invocation.params.unwrap_or_default(),
                            hash: invocation.hash,
                            blocks,
                        };
                        let cx = MacroContext {
                            resolver: self.resolver,
                            meta: &meta,
                        };
                        self.macros.compile_block(&call, &cx)?
                    }
                }
            }
            CompileAction::CompileInline {
                value,
                if_unhandled,
            } => {
                let cx = MacroContext {
                    resolver: self.resolver,
                    meta: &meta,
                };
                match self.macros.compile_inline(&value, &cx)? {
                    Inline::Handled(action) => action,
                    Inline::Unhandled => *if_unhandled,
                }
            }
            CompileAction::InvokeStatic(block) => {
                let id = self.compilables.register(&block, self.mode);
                match self.mode {
                    CompileMode::Aot => op(
                        Op::InvokeStatic,
                        vec![Operand::Handle(id, HandleEncoding::Raw)],
                    ),
                    CompileMode::Jit => Action::Seq(vec![
                        op1(Op::Constant, Operand::Other(id)),
                        op0(Op::CompileBlock),
                        op0(Op::InvokeVirtual),
                    ]),
                }
            }
            CompileAction::PushCompilable(None) => push_primitive(Primitive::Null),
            CompileAction::PushCompilable(Some(block)) => {
                let id = self.compilables.register(&block, self.mode);
                match self.mode {
                    CompileMode::Aot => op(
                        Op::Primitive,
                        vec![Operand::Handle(id, HandleEncoding::Immediate)],
                    ),
                    CompileMode::Jit => op1(Op::Constant, Operand::Other(id)),
                }
            }
            CompileAction::Args(spec) => compile_args(&spec),
            CompileAction::IfResolvedComponent {
                name,
                attrs,
                hash,
                blocks,
            } => match self.resolver.lookup_component(&name, &meta.referrer) {
                None => error(format!("Compile Error: Cannot find component {name}")),
                Some(component) => {
                    let capabilities = component.capabilities();
                    let attrs = Some(BlockRef::block(&attrs, &meta));
                    let blocks = NamedBlocks::from_wire(blocks.as_ref(), &meta);
                    let invocation = match component.compilable {
                        Some(layout) => invoke_static_component(StaticInvocation {
                            capabilities,
                            layout,
                            attrs,
                            params: None,
                            hash,
                            blocks,
                        }),
                        None => invoke_component(ComponentInvocation {
                            capabilities: Some(capabilities),
                            attrs,
                            params: None,
                            hash,
                            at_names: true,
                            blocks,
                            layout: None,
                        }),
                    };
                    Action::Seq(vec![
                        op1(Op::PushComponentDefinition, component.handle),
                        invocation,
                    ])
                }
            },
        };
        self.concat(action)
    }
}
