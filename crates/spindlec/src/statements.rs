use std::rc::Rc;

use crate::actions::{
    expr, op, op0, op1, str_array, Action, BlockRef, CompileAction, NamedBlocks, Operand, ResolveKind,
    Resolution,
};
use crate::builder::{dup, invoke_stdlib, replayable_if, yield_block};
use crate::components::{invoke_dynamic_component, DynamicInvocation};
use crate::error::CompileError;
use crate::expressions::{expect_string, Named};
use crate::opcodes::{Op, Register};
use crate::stdlib::StdlibEntry;
use crate::template::TemplateMeta;
use crate::wire::{ComponentTag, Expr, Primitive, Statement, StatementKind};

pub fn compile_statement(statement: &Statement, meta: &Rc<TemplateMeta>) -> Result<Action, CompileError> {
    compile_kind(&statement.kind, meta).map_err(|e| e.at(&statement.ptr))
}

fn compile_kind(kind: &StatementKind, meta: &Rc<TemplateMeta>) -> Result<Action, CompileError> {
    Ok(match kind {
        StatementKind::Comment(text) => op1(Op::Comment, Operand::Str(text.clone())),
        StatementKind::FlushElement => op0(Op::FlushElement),
        StatementKind::CloseElement => op0(Op::CloseElement),

        StatementKind::OpenElement { tag, splat } => {
            let open = op1(Op::OpenElement, Operand::Str(tag.clone()));
            if *splat {
                Action::Seq(vec![op0(Op::PutComponentOperations), open])
            } else {
                open
            }
        }

        StatementKind::StaticAttr {
            name,
            value,
            namespace,
            component,
        } => {
            let code = if *component {
                Op::StaticComponentAttr
            } else {
                Op::StaticAttr
            };
            op(
                code,
                vec![
                    Operand::Str(name.clone()),
                    Operand::Str(value.clone()),
                    namespace_operand(namespace),
                ],
            )
        }

        StatementKind::DynamicAttr {
            name,
            value,
            namespace,
            trusting,
            component,
        } => {
            let code = if *component {
                Op::ComponentAttr
            } else {
                Op::DynamicAttr
            };
            Action::Seq(vec![
                expr(value),
                op(
                    code,
                    vec![
                        Operand::Str(name.clone()),
                        (*trusting).into(),
                        namespace_operand(namespace),
                    ],
                ),
            ])
        }

        StatementKind::Modifier { head, params, hash } => {
            match expect_string(head, meta, "Expected modifier head to be a string")? {
                Named::Error(action) => action,
                Named::Name(name) => Action::Resolve(Resolution::IfResolved {
                    kind: ResolveKind::Modifier,
                    name,
                    params: params.clone(),
                    hash: hash.clone(),
                }),
            }
        }

        StatementKind::Append {
            value,
            trusting: false,
        } => Action::Compile(CompileAction::CompileInline {
            value: value.clone(),
            if_unhandled: Box::new(invoke_stdlib(StdlibEntry::CautiousAppend, value)),
        }),

        // Triple curlies never reach the inline macros.
        StatementKind::Append {
            value,
            trusting: true,
        } => match value {
            Expr::Literal(Primitive::String(text)) => op1(Op::Text, Operand::Str(text.clone())),
            other => invoke_stdlib(StdlibEntry::TrustingAppend, other),
        },

        StatementKind::Block(invocation) => Action::Compile(CompileAction::CompileBlock(invocation.clone())),

        StatementKind::Component {
            tag: ComponentTag::Static(name),
            attrs,
            hash,
            blocks,
        } => Action::Compile(CompileAction::IfResolvedComponent {
            name: name.clone(),
            attrs: Rc::clone(attrs),
            hash: hash.clone(),
            blocks: blocks.clone(),
        }),

        StatementKind::Component {
            tag: ComponentTag::Dynamic(definition),
            attrs,
            hash,
            blocks,
        } => invoke_dynamic_component(
            meta,
            DynamicInvocation {
                definition: definition.clone(),
                attrs: Some(BlockRef::block(attrs, meta)),
                params: None,
                hash: hash.clone(),
                at_names: true,
                blocks: NamedBlocks::from_wire(blocks.as_ref(), meta),
            },
        ),

        StatementKind::Yield { to, params } => yield_block(*to, params.clone()),
        StatementKind::AttrSplat { to } => yield_block(*to, Some(Vec::new())),

        StatementKind::Partial { name, eval_info } => {
            let Some(symbols) = &meta.eval_symbols else {
                return Err(CompileError::syntax(
                    "partials require a template compiled with eval symbols",
                ));
            };
            replayable_if(
                2,
                Action::Seq(vec![expr(name), dup(Register::Sp, 0)]),
                Action::Seq(vec![
                    op(
                        Op::InvokePartial,
                        vec![
                            Operand::TemplateMeta(meta.referrer.clone()),
                            str_array(symbols),
                            Operand::Array(eval_info.clone()),
                        ],
                    ),
                    op0(Op::PopScope),
                    op0(Op::PopFrame),
                ]),
                None,
            )
        }

        StatementKind::Debugger { eval_info } => {
            let symbols = meta.eval_symbols.as_deref().unwrap_or_default();
            op(
                Op::Debugger,
                vec![str_array(symbols), Operand::Array(eval_info.clone())],
            )
        }
    })
}

fn namespace_operand(namespace: &Option<String>) -> Operand {
    match namespace {
        Some(ns) => Operand::Str(ns.clone()),
        None => Operand::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Instr;
    use crate::wire::Referrer;

    fn meta(eval_symbols: Option<Vec<String>>) -> Rc<TemplateMeta> {
        Rc::new(TemplateMeta {
            as_partial: false,
            eval_symbols,
            upvars: Some(Vec::new()),
            referrer: Referrer {
                module_name: None,
                id: "t".to_string(),
            },
            size: 0,
        })
    }

    fn statement(kind: StatementKind) -> Statement {
        Statement {
            ptr: "/block/statements/3".to_string(),
            kind,
        }
    }

    #[test]
    fn trusting_text_append_is_a_text_op() {
        let action = compile_statement(
            &statement(StatementKind::Append {
                value: Expr::Literal(Primitive::String("hi".to_string())),
                trusting: true,
            }),
            &meta(None),
        )
        .expect("compiled");
        let Action::Op(Instr { op, operands }) = action else {
            panic!("expected a single op");
        };
        assert_eq!(op, Op::Text);
        assert_eq!(operands, vec![Operand::Str("hi".to_string())]);
    }

    #[test]
    fn partial_without_eval_symbols_fails_at_statement() {
        let err = compile_statement(
            &statement(StatementKind::Partial {
                name: Expr::Literal(Primitive::String("p".to_string())),
                eval_info: Vec::new(),
            }),
            &meta(None),
        )
        .expect_err("no eval");
        assert_eq!(err.ptr.as_deref(), Some("/block/statements/3"));
    }
}
