//! Component invocation sequences.
//!
//! Every shape saves `$s0` around the invocation, because the component state lives in
//! it for the duration of the call.

use crate::actions::{
    expr, label, label_ref, op, op0, op1, Action, ArgsSpec, BlockRef, BuilderOp, CompileAction,
    NamedBlocks, Operand, Resolution,
};
use crate::builder::{
    dup, invoke_static_block, push_symbol_table, push_yieldable_block, replayable, with_saved_register,
    yield_block,
};
use crate::opcodes::{Op, Register};
use crate::resolver::{Capabilities, ComponentLookup, CompileTimeResolver};
use crate::template::{SymbolTable, TemplateMeta, TemplateRef, ATTRS_BLOCK};
use crate::wire::{Expr, Hash, Referrer};

/// A component whose layout is known at compile time.
#[derive(Debug, Clone)]
pub struct StaticInvocation {
    pub capabilities: Capabilities,
    pub layout: TemplateRef,
    pub attrs: Option<BlockRef>,
    pub params: Option<Vec<Expr>>,
    pub hash: Option<Hash>,
    pub blocks: NamedBlocks,
}

/// A component invoked through runtime argument preparation.
#[derive(Debug, Clone)]
pub struct ComponentInvocation {
    /// `None` when the component is only known at runtime.
    pub capabilities: Option<Capabilities>,
    pub attrs: Option<BlockRef>,
    pub params: Option<Vec<Expr>>,
    pub hash: Option<Hash>,
    pub at_names: bool,
    pub blocks: NamedBlocks,
    pub layout: Option<TemplateRef>,
}

/// A component definition computed at runtime.
#[derive(Debug, Clone)]
pub struct DynamicInvocation {
    pub definition: Expr,
    pub attrs: Option<BlockRef>,
    pub params: Option<Vec<Expr>>,
    pub hash: Option<Hash>,
    pub at_names: bool,
    pub blocks: NamedBlocks,
}

pub fn invoke_static_component(invocation: StaticInvocation) -> Action {
    let StaticInvocation {
        capabilities,
        layout,
        attrs,
        params,
        hash,
        blocks,
    } = invocation;
    let table = layout.symbol_table();
    let has_eval = matches!(table, SymbolTable::Program { has_eval: true, .. });
    if has_eval || capabilities.prepare_args {
        return invoke_component(ComponentInvocation {
            capabilities: Some(capabilities),
            attrs,
            params,
            hash,
            at_names: true,
            blocks,
            layout: Some(layout),
        });
    }

    let symbols = table.symbols();
    let mut out = vec![
        op1(Op::Fetch, Register::S0),
        dup(Register::Sp, 1),
        op1(Op::Load, Register::S0),
    ];

    if capabilities.create_args {
        out.push(op0(Op::PushFrame));
        out.push(Action::Resolve(Resolution::SimpleArgs {
            params,
            hash: hash.clone(),
            at_names: true,
        }));
    }

    out.push(op0(Op::BeginComponentTransaction));

    if capabilities.dynamic_scope {
        out.push(op0(Op::PushDynamicScope));
    }

    if capabilities.create_instance {
        out.push(op(
            Op::CreateComponent,
            vec![blocks.has("default").into(), Register::S0.into()],
        ));
    }

    if capabilities.create_args {
        out.push(op0(Op::PopFrame));
    }

    out.push(op0(Op::PushFrame));
    out.push(op1(Op::RegisterComponentDestructor, Register::S0));

    let mut bindings: Vec<(u32, bool)> = Vec::new();
    out.push(op1(Op::GetComponentSelf, Register::S0));
    bindings.push((0, false));

    for (i, symbol) in symbols.iter().enumerate() {
        let slot = i as u32 + 1;
        if let Some(block_name) = symbol.strip_prefix('&') {
            let caller_block = if symbol == ATTRS_BLOCK {
                attrs.as_ref()
            } else {
                blocks.get(block_name)
            };
            out.push(push_yieldable_block(caller_block));
            bindings.push((slot, true));
        } else if symbol.starts_with('@') {
            let Some(hash) = &hash else {
                continue;
            };
            if let Some(index) = hash.names.iter().position(|name| name == symbol) {
                out.push(expr(&hash.values[index]));
                bindings.push((slot, false));
            }
        }
    }

    out.push(op(
        Op::RootScope,
        vec![
            (symbols.len() as u32 + 1).into(),
            blocks.any_supplied().into(),
        ],
    ));

    for (symbol, is_block) in bindings.into_iter().rev() {
        if is_block {
            out.push(Action::Builder(BuilderOp::SetBlock(symbol)));
        } else {
            out.push(op1(Op::SetVariable, symbol));
        }
    }

    out.push(Action::Compile(CompileAction::InvokeStatic(BlockRef::Template(layout))));

    if capabilities.create_instance {
        out.push(op1(Op::DidRenderLayout, Register::S0));
    }

    out.push(op0(Op::PopFrame));
    out.push(op0(Op::PopScope));

    if capabilities.dynamic_scope {
        out.push(op0(Op::PopDynamicScope));
    }

    out.push(op0(Op::CommitComponentTransaction));
    out.push(op1(Op::Load, Register::S0));
    Action::Seq(out)
}

pub fn invoke_component(invocation: ComponentInvocation) -> Action {
    let ComponentInvocation {
        capabilities,
        attrs,
        params,
        hash,
        at_names,
        blocks,
        layout,
    } = invocation;
    let bindable_at_names = match capabilities {
        None => true,
        Some(capabilities) => {
            capabilities.prepare_args || hash.as_ref().is_some_and(|h| !h.names.is_empty())
        }
    };
    let blocks = blocks.with("attrs", attrs);
    let has_default = blocks.has("default");

    let mut populate = match layout {
        Some(layout) => {
            let layout = BlockRef::Template(layout);
            vec![
                push_symbol_table(Some(&layout)),
                Action::Compile(CompileAction::PushCompilable(Some(layout))),
                Action::Builder(BuilderOp::JitCompileBlock),
            ]
        }
        None => vec![Action::Builder(BuilderOp::GetComponentLayout(Register::S0))],
    };
    populate.push(op1(Op::PopulateLayout, Register::S0));

    Action::Seq(vec![
        op1(Op::Fetch, Register::S0),
        dup(Register::Sp, 1),
        op1(Op::Load, Register::S0),
        op0(Op::PushFrame),
        Action::Compile(CompileAction::Args(ArgsSpec {
            params,
            hash,
            blocks,
            at_names,
        })),
        op1(Op::PrepareArgs, Register::S0),
        invoke_prepared_component(has_default, true, bindable_at_names, Some(Action::Seq(populate))),
        op1(Op::Load, Register::S0),
    ])
}

/// Instantiates a component whose arguments are already on the stack and runs its layout.
pub fn invoke_prepared_component(
    has_block: bool,
    bindable_blocks: bool,
    bindable_at_names: bool,
    populate_layout: Option<Action>,
) -> Action {
    let mut out = vec![
        op0(Op::BeginComponentTransaction),
        op0(Op::PushDynamicScope),
        op(Op::CreateComponent, vec![has_block.into(), Register::S0.into()]),
    ];
    // After CreateComponent, so the manager may choose the layout.
    if let Some(populate) = populate_layout {
        out.push(populate);
    }
    out.push(op1(Op::RegisterComponentDestructor, Register::S0));
    out.push(op1(Op::GetComponentSelf, Register::S0));
    out.push(op1(Op::VirtualRootScope, Register::S0));
    out.push(op1(Op::SetVariable, 0u32));
    out.push(op1(Op::SetupForEval, Register::S0));
    if bindable_at_names {
        out.push(op1(Op::SetNamedVariables, Register::S0));
    }
    if bindable_blocks {
        out.push(op1(Op::SetBlocks, Register::S0));
    }
    out.push(op1(Op::Pop, 1u32));
    out.push(op1(Op::InvokeComponentLayout, Register::S0));
    out.push(op1(Op::DidRenderLayout, Register::S0));
    out.push(op0(Op::PopFrame));
    out.push(op0(Op::PopScope));
    out.push(op0(Op::PopDynamicScope));
    out.push(op0(Op::CommitComponentTransaction));
    Action::Seq(out)
}

/// Skips everything when the definition is falsy; replays when it changes.
pub fn invoke_dynamic_component(meta: &TemplateMeta, invocation: DynamicInvocation) -> Action {
    let DynamicInvocation {
        definition,
        attrs,
        params,
        hash,
        at_names,
        blocks,
    } = invocation;
    replayable(
        2,
        Action::Seq(vec![expr(&definition), dup(Register::Sp, 0)]),
        Action::Seq(vec![
            op1(Op::JumpUnless, label_ref("ELSE")),
            op1(
                Op::ResolveDynamicComponent,
                Operand::TemplateMeta(meta.referrer.clone()),
            ),
            op0(Op::PushDynamicComponentInstance),
            invoke_component(ComponentInvocation {
                capabilities: None,
                attrs,
                params,
                hash,
                at_names,
                blocks,
                layout: None,
            }),
            label("ELSE"),
        ]),
    )
}

/// Layout body for components that generate their own wrapping element at runtime.
pub fn wrapped_component(body: BlockRef, attrs_block_number: u32) -> Action {
    Action::Seq(vec![
        Action::Builder(BuilderOp::StartLabels),
        with_saved_register(
            Register::S1,
            Action::Seq(vec![
                op1(Op::GetComponentTagName, Register::S0),
                op0(Op::PrimitiveReference),
                dup(Register::Sp, 0),
            ]),
        ),
        op1(Op::JumpUnless, label_ref("BODY")),
        op1(Op::Fetch, Register::S1),
        op0(Op::PutComponentOperations),
        op0(Op::OpenDynamicElement),
        op1(Op::DidCreateElement, Register::S0),
        yield_block(attrs_block_number, Some(Vec::new())),
        op0(Op::FlushElement),
        label("BODY"),
        invoke_static_block(Some(&body)),
        op1(Op::Fetch, Register::S1),
        op1(Op::JumpUnless, label_ref("END")),
        op0(Op::CloseElement),
        label("END"),
        op1(Op::Load, Register::S1),
        Action::Builder(BuilderOp::StopLabels),
    ])
}

/// Invokes a resolved component, statically when its layout is known.
pub fn static_component(
    component: &ComponentLookup,
    params: Option<Vec<Expr>>,
    hash: Option<Hash>,
    blocks: NamedBlocks,
) -> Action {
    let capabilities = component.capabilities();
    let invocation = match &component.compilable {
        Some(layout) => invoke_static_component(StaticInvocation {
            capabilities,
            layout: layout.clone(),
            attrs: None,
            params,
            hash,
            blocks,
        }),
        None => invoke_component(ComponentInvocation {
            capabilities: Some(capabilities),
            attrs: None,
            params,
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

/// The `component` helper with a literal name: only handled when the layout is known.
pub fn static_component_helper(
    resolver: &dyn CompileTimeResolver,
    meta: &TemplateMeta,
    tag: &str,
    hash: Option<&Hash>,
    template: Option<BlockRef>,
) -> Option<Action> {
    let component = resolver.lookup_component(tag, &meta.referrer)?;
    let layout = component.compilable.clone()?;
    let blocks = NamedBlocks::from_entries(vec![("default".to_string(), template)]);
    Some(Action::Seq(vec![
        op1(Op::PushComponentDefinition, component.handle),
        invoke_static_component(StaticInvocation {
            capabilities: component.capabilities(),
            layout,
            attrs: None,
            params: None,
            hash: hash_to_args(hash),
            blocks,
        }),
    ]))
}

/// Renders a component value found by the append routine: no arguments, no blocks.
pub fn invoke_bare_component() -> Action {
    Action::Seq(vec![
        op1(Op::Fetch, Register::S0),
        dup(Register::Sp, 1),
        op1(Op::Load, Register::S0),
        op0(Op::PushFrame),
        op0(Op::PushEmptyArgs),
        op1(Op::PrepareArgs, Register::S0),
        invoke_prepared_component(
            false,
            false,
            true,
            Some(Action::Seq(vec![
                Action::Builder(BuilderOp::GetComponentLayout(Register::S0)),
                op1(Op::PopulateLayout, Register::S0),
            ])),
        ),
        op1(Op::Load, Register::S0),
    ])
}

/// Captures arguments into a curried component value left in `$v0`.
pub fn curry_component(
    definition: &Expr,
    params: Vec<Expr>,
    hash: Option<Hash>,
    at_names: bool,
    referrer: &Referrer,
) -> Action {
    Action::Seq(vec![
        op0(Op::PushFrame),
        Action::Resolve(Resolution::SimpleArgs {
            params: Some(params),
            hash,
            at_names,
        }),
        op0(Op::CaptureArgs),
        expr(definition),
        op1(Op::CurryComponent, Operand::TemplateMeta(referrer.clone())),
        op0(Op::PopFrame),
        op1(Op::Fetch, Register::V0),
    ])
}

/// Prefixes named arguments with `@` so they bind to the layout's argument symbols.
pub fn hash_to_args(hash: Option<&Hash>) -> Option<Hash> {
    hash.map(|hash| Hash {
        names: hash
            .names
            .iter()
            .map(|name| {
                if name.starts_with('@') {
                    name.clone()
                } else {
                    format!("@{name}")
                }
            })
            .collect(),
        values: hash.values.clone(),
    })
}
