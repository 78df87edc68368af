use crate::actions::{error, expr, op0, op1, Action, BuilderOp, Operand, ResolveKind, Resolution};
use crate::builder::push_primitive_reference;
use crate::components::curry_component;
use crate::error::CompileError;
use crate::opcodes::Op;
use crate::template::TemplateMeta;
use crate::wire::{Expr, GetSource, Primitive};

/// The result of requiring a free-variable name from an expression.
#[derive(Debug)]
pub enum Named {
    Name(String),
    /// Recorded, non-fatal: the template has no free variables at all.
    Error(Action),
}

pub fn compile_expr(value: &Expr, meta: &TemplateMeta) -> Result<Action, CompileError> {
    Ok(match value {
        Expr::Literal(primitive) => push_primitive_reference(primitive.clone()),
        Expr::Undefined => push_primitive_reference(Primitive::Undefined),
        Expr::Concat(parts) => {
            let mut out: Vec<Action> = parts.iter().map(expr).collect();
            out.push(op1(Op::Concat, parts.len() as u32));
            Action::Seq(out)
        }
        Expr::Call { head, params, hash } => {
            if is_component(head, meta) {
                let Some((definition, rest)) = params.as_deref().and_then(<[Expr]>::split_first) else {
                    return Ok(error("component helper requires at least one argument"));
                };
                return Ok(curry_component(
                    definition,
                    rest.to_vec(),
                    hash.clone(),
                    false,
                    &meta.referrer,
                ));
            }
            match expect_string(head, meta, "Expected call head to be a string")? {
                Named::Error(action) => action,
                Named::Name(name) => Action::Resolve(Resolution::IfResolved {
                    kind: ResolveKind::Helper,
                    name,
                    params: params.clone(),
                    hash: hash.clone(),
                }),
            }
        }
        Expr::Get { source, slot, path } => {
            let head = match source {
                GetSource::Symbol => op1(Op::GetVariable, *slot),
                GetSource::Free => Action::Resolve(Resolution::ResolveFree(*slot)),
                GetSource::Contextual(context) => Action::Resolve(Resolution::ResolveContextualFree {
                    slot: *slot,
                    context: *context,
                }),
            };
            with_path(head, path)
        }
        Expr::HasBlock(block) => Action::Seq(vec![expr(block), op0(Op::HasBlock)]),
        Expr::HasBlockParams(block) => Action::Seq(vec![
            expr(block),
            op0(Op::JitSpreadBlock),
            Action::Builder(BuilderOp::JitCompileBlock),
            op0(Op::HasBlockParams),
        ]),
    })
}

pub fn with_path(head: Action, path: &[String]) -> Action {
    if path.is_empty() {
        return head;
    }
    let mut out = vec![head];
    out.extend(
        path.iter()
            .map(|segment| op1(Op::GetProperty, Operand::Str(segment.clone()))),
    );
    Action::Seq(out)
}

/// A contextual free variable bound to the `component` keyword.
pub fn is_component(value: &Expr, meta: &TemplateMeta) -> bool {
    match value {
        Expr::Get {
            source: GetSource::Contextual(_),
            slot,
            ..
        } => meta.upvar(*slot) == Some("component"),
        _ => false,
    }
}

/// Requires `value` to be a free variable with no path, returning its name.
pub fn expect_string(value: &Expr, meta: &TemplateMeta, desc: &str) -> Result<Named, CompileError> {
    let Some(upvars) = &meta.upvars else {
        return Ok(Named::Error(error(format!(
            "{desc}, but there were no free variables in the template"
        ))));
    };
    match value.simple_free_name(upvars) {
        Some(name) => Ok(Named::Name(name.to_string())),
        None => Err(CompileError::syntax(format!("{desc}, got {value}"))),
    }
}
