//! Block and inline macros: named expansions for `{{#name}}` blocks and `{{name}}`
//! appends, with a fallback for names nothing is registered under.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::actions::{error, expr, label, label_ref, op0, op1, Action, NamedBlocks};
use crate::builder::{
    compile_positional, dup, dynamic_scope, invoke_static_block, invoke_static_block_with_stack,
    push_primitive_reference, replayable, replayable_if,
};
use crate::components::{
    hash_to_args, invoke_dynamic_component, static_component, static_component_helper,
    DynamicInvocation,
};
use crate::error::{CompileError, CompileErrorKind};
use crate::expressions::{expect_string, Named};
use crate::opcodes::{Op, Register};
use crate::resolver::CompileTimeResolver;
use crate::template::TemplateMeta;
use crate::wire::{Expr, Hash, Primitive};

/// What a macro sees of the template being compiled.
pub struct MacroContext<'a> {
    pub resolver: &'a dyn CompileTimeResolver,
    pub meta: &'a Rc<TemplateMeta>,
}

/// A `{{#name params hash}}...{{/name}}` invocation.
#[derive(Debug, Clone)]
pub struct BlockCall {
    pub name: String,
    pub params: Vec<Expr>,
    pub hash: Option<Hash>,
    pub blocks: NamedBlocks,
}

/// An append whose value is `{{name}}` or `{{name params hash}}`.
#[derive(Debug, Clone)]
pub struct InlineCall {
    pub name: String,
    pub params: Option<Vec<Expr>>,
    pub hash: Option<Hash>,
}

#[derive(Debug)]
pub enum Inline {
    Handled(Action),
    /// The append falls back to the cautious append routine.
    Unhandled,
}

pub trait BlockMacro {
    fn expand(&self, call: &BlockCall, cx: &MacroContext<'_>) -> Result<Action, CompileError>;
}

pub trait InlineMacro {
    fn expand(&self, call: &InlineCall, cx: &MacroContext<'_>) -> Result<Inline, CompileError>;
}

impl<F> BlockMacro for F
where
    F: Fn(&BlockCall, &MacroContext<'_>) -> Result<Action, CompileError>,
{
    fn expand(&self, call: &BlockCall, cx: &MacroContext<'_>) -> Result<Action, CompileError> {
        self(call, cx)
    }
}

impl<F> InlineMacro for F
where
    F: Fn(&InlineCall, &MacroContext<'_>) -> Result<Inline, CompileError>,
{
    fn expand(&self, call: &InlineCall, cx: &MacroContext<'_>) -> Result<Inline, CompileError> {
        self(call, cx)
    }
}

/// Name-indexed table of one macro kind.
struct Table<M: ?Sized> {
    names: HashMap<String, usize>,
    funcs: Vec<Box<M>>,
    missing: Option<Box<M>>,
}

impl<M: ?Sized> Table<M> {
    fn new() -> Self {
        Self {
            names: HashMap::new(),
            funcs: Vec::new(),
            missing: None,
        }
    }

    fn add(&mut self, kind: &str, name: &str, func: Box<M>) -> Result<(), CompileError> {
        if self.names.contains_key(name) {
            return Err(CompileError::new(
                CompileErrorKind::Registration,
                format!("{kind} macro {name:?} is already registered"),
            ));
        }
        self.replace(name, func);
        Ok(())
    }

    fn replace(&mut self, name: &str, func: Box<M>) {
        match self.names.get(name) {
            Some(&index) => self.funcs[index] = func,
            None => {
                self.funcs.push(func);
                self.names.insert(name.to_string(), self.funcs.len() - 1);
            }
        }
    }

    fn get(&self, name: &str) -> Option<&M> {
        self.names.get(name).map(|&index| &*self.funcs[index])
    }
}

pub struct Macros {
    blocks: Table<dyn BlockMacro>,
    inlines: Table<dyn InlineMacro>,
}

impl fmt::Debug for Macros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut blocks: Vec<&String> = self.blocks.names.keys().collect();
        let mut inlines: Vec<&String> = self.inlines.names.keys().collect();
        blocks.sort();
        inlines.sort();
        f.debug_struct("Macros")
            .field("blocks", &blocks)
            .field("inlines", &inlines)
            .finish()
    }
}

impl Default for Macros {
    fn default() -> Self {
        Self::new()
    }
}

impl Macros {
    /// The built-in macros plus the default fallbacks.
    pub fn new() -> Self {
        let mut macros = Self::empty();
        macros.blocks.replace("if", Box::new(if_block));
        macros.blocks.replace("unless", Box::new(unless_block));
        macros.blocks.replace("with", Box::new(with_block));
        macros.blocks.replace("let", Box::new(let_block));
        macros.blocks.replace("each", Box::new(each_block));
        macros.blocks.replace("in-element", Box::new(in_element_block));
        macros
            .blocks
            .replace("-with-dynamic-vars", Box::new(with_dynamic_vars_block));
        macros.blocks.replace("component", Box::new(component_block));
        macros.inlines.replace("component", Box::new(component_inline));
        macros.blocks.missing = Some(Box::new(missing_block));
        macros.inlines.missing = Some(Box::new(missing_inline));
        macros
    }

    /// No macros and no fallbacks.
    pub fn empty() -> Self {
        Self {
            blocks: Table::new(),
            inlines: Table::new(),
        }
    }

    pub fn add_block(&mut self, name: &str, func: impl BlockMacro + 'static) -> Result<(), CompileError> {
        self.blocks.add("block", name, Box::new(func))
    }

    pub fn add_inline(&mut self, name: &str, func: impl InlineMacro + 'static) -> Result<(), CompileError> {
        self.inlines.add("inline", name, Box::new(func))
    }

    pub fn replace_block(&mut self, name: &str, func: impl BlockMacro + 'static) {
        self.blocks.replace(name, Box::new(func));
    }

    pub fn replace_inline(&mut self, name: &str, func: impl InlineMacro + 'static) {
        self.inlines.replace(name, Box::new(func));
    }

    pub fn set_missing_block(&mut self, func: impl BlockMacro + 'static) {
        self.blocks.missing = Some(Box::new(func));
    }

    pub fn set_missing_inline(&mut self, func: impl InlineMacro + 'static) {
        self.inlines.missing = Some(Box::new(func));
    }

    pub fn has_block(&self, name: &str) -> bool {
        self.blocks.names.contains_key(name)
    }

    pub fn has_inline(&self, name: &str) -> bool {
        self.inlines.names.contains_key(name)
    }

    pub fn compile_block(&self, call: &BlockCall, cx: &MacroContext<'_>) -> Result<Action, CompileError> {
        if let Some(func) = self.blocks.get(&call.name) {
            return func.expand(call, cx);
        }
        match &self.blocks.missing {
            Some(missing) => missing.expand(call, cx),
            None => Err(CompileError::syntax(format!(
                "no block macro named {:?} and no fallback is installed",
                call.name
            ))),
        }
    }

    /// Triages an append value into a macro call, if it has the shape of one.
    pub fn compile_inline(&self, value: &Expr, cx: &MacroContext<'_>) -> Result<Inline, CompileError> {
        let call = match value {
            Expr::Call { head, params, hash } => {
                match expect_string(head, cx.meta, "Expected head of call to be a string")? {
                    Named::Error(action) => return Ok(Inline::Handled(action)),
                    Named::Name(name) => InlineCall {
                        name,
                        params: params.clone(),
                        hash: hash.clone(),
                    },
                }
            }
            Expr::Get { .. } => {
                let Some(name) = cx
                    .meta
                    .upvars
                    .as_deref()
                    .and_then(|upvars| value.simple_free_name(upvars))
                else {
                    return Ok(Inline::Unhandled);
                };
                InlineCall {
                    name: name.to_string(),
                    params: None,
                    hash: None,
                }
            }
            _ => return Ok(Inline::Unhandled),
        };

        if let Some(func) = self.inlines.get(&call.name) {
            return func.expand(&call, cx);
        }
        match &self.inlines.missing {
            Some(missing) => missing.expand(&call, cx),
            None => Ok(Inline::Unhandled),
        }
    }
}

fn single_param<'c>(call: &'c BlockCall) -> Result<&'c Expr, CompileError> {
    match call.params.as_slice() {
        [only] => Ok(only),
        _ => Err(CompileError::syntax(format!(
            "SYNTAX ERROR: #{} requires a single argument",
            call.name
        ))),
    }
}

fn invoke_named(blocks: &NamedBlocks, name: &str) -> Option<Action> {
    blocks
        .has(name)
        .then(|| invoke_static_block(blocks.get(name)))
}

fn if_block(call: &BlockCall, _cx: &MacroContext<'_>) -> Result<Action, CompileError> {
    let condition = single_param(call)?;
    Ok(replayable_if(
        1,
        Action::Seq(vec![expr(condition), op0(Op::ToBoolean)]),
        invoke_static_block(call.blocks.get("default")),
        invoke_named(&call.blocks, "else"),
    ))
}

fn unless_block(call: &BlockCall, _cx: &MacroContext<'_>) -> Result<Action, CompileError> {
    let condition = single_param(call)?;
    Ok(replayable_if(
        1,
        Action::Seq(vec![expr(condition), op0(Op::ToBoolean)]),
        invoke_named(&call.blocks, "else").unwrap_or(Action::None),
        Some(invoke_static_block(call.blocks.get("default"))),
    ))
}

fn with_block(call: &BlockCall, _cx: &MacroContext<'_>) -> Result<Action, CompileError> {
    let value = single_param(call)?;
    Ok(replayable_if(
        2,
        Action::Seq(vec![expr(value), dup(Register::Sp, 0), op0(Op::ToBoolean)]),
        invoke_static_block_with_stack(call.blocks.get("default"), 1),
        invoke_named(&call.blocks, "else"),
    ))
}

// Nothing to replay: `let` always renders its block.
fn let_block(call: &BlockCall, _cx: &MacroContext<'_>) -> Result<Action, CompileError> {
    if call.params.is_empty() {
        return Err(CompileError::syntax("let requires arguments"));
    }
    let (count, positional) = compile_positional(Some(&call.params));
    Ok(Action::Seq(vec![
        positional,
        invoke_static_block_with_stack(call.blocks.get("default"), count),
    ]))
}

fn each_block(call: &BlockCall, _cx: &MacroContext<'_>) -> Result<Action, CompileError> {
    let iterable = single_param(call)?;
    let key = call.hash.as_ref().and_then(|hash| {
        hash.names
            .iter()
            .position(|name| name == "key")
            .map(|index| &hash.values[index])
    });
    let args = Action::Seq(vec![
        match key {
            Some(key) => expr(key),
            None => push_primitive_reference(Primitive::Null),
        },
        expr(iterable),
    ]);

    let mut body = vec![
        op0(Op::PutIterator),
        op1(Op::JumpUnless, label_ref("ELSE")),
        op0(Op::PushFrame),
        dup(Register::Fp, 1),
        op1(Op::ReturnTo, label_ref("ITER")),
        op1(Op::EnterList, label_ref("BODY")),
        label("ITER"),
        op1(Op::Iterate, label_ref("BREAK")),
        label("BODY"),
        invoke_static_block_with_stack(call.blocks.get("default"), 2),
        op1(Op::Pop, 2u32),
        op1(Op::Jump, label_ref("FINALLY")),
        label("BREAK"),
        op0(Op::ExitList),
        op0(Op::PopFrame),
        op1(Op::Jump, label_ref("FINALLY")),
        label("ELSE"),
    ];
    if let Some(otherwise) = invoke_named(&call.blocks, "else") {
        body.push(otherwise);
    }
    Ok(replayable(2, args, Action::Seq(body)))
}

fn in_element_block(call: &BlockCall, _cx: &MacroContext<'_>) -> Result<Action, CompileError> {
    let destination = single_param(call)?;
    let mut guid = None;
    let mut insert_before = None;
    if let Some(hash) = &call.hash {
        for (name, value) in hash.names.iter().zip(&hash.values) {
            match name.as_str() {
                "guid" => guid = Some(value),
                "insertBefore" => insert_before = Some(value),
                other => {
                    return Err(CompileError::syntax(format!(
                        "SYNTAX ERROR: #in-element does not take a `{other}` option"
                    )))
                }
            }
        }
    }
    let option = |value: Option<&Expr>| match value {
        Some(value) => expr(value),
        None => push_primitive_reference(Primitive::Undefined),
    };
    Ok(replayable_if(
        4,
        Action::Seq(vec![
            option(guid),
            option(insert_before),
            expr(destination),
            dup(Register::Sp, 0),
        ]),
        Action::Seq(vec![
            op0(Op::PushRemoteElement),
            invoke_static_block(call.blocks.get("default")),
            op0(Op::PopRemoteElement),
        ]),
        None,
    ))
}

fn with_dynamic_vars_block(call: &BlockCall, _cx: &MacroContext<'_>) -> Result<Action, CompileError> {
    let body = invoke_static_block(call.blocks.get("default"));
    let Some(hash) = &call.hash else {
        return Ok(body);
    };
    let (_, values) = compile_positional(Some(&hash.values));
    Ok(Action::Seq(vec![values, dynamic_scope(&hash.names, body)]))
}

fn component_block(call: &BlockCall, cx: &MacroContext<'_>) -> Result<Action, CompileError> {
    let Some((definition, rest)) = call.params.split_first() else {
        return Ok(error("component helper requires at least one argument"));
    };
    if let Expr::Literal(Primitive::String(tag)) = definition {
        let handled = static_component_helper(
            cx.resolver,
            cx.meta,
            tag,
            call.hash.as_ref(),
            call.blocks.get("default").cloned(),
        );
        if let Some(action) = handled {
            return Ok(action);
        }
    }
    Ok(invoke_dynamic_component(
        cx.meta,
        DynamicInvocation {
            definition: definition.clone(),
            attrs: None,
            params: Some(rest.to_vec()),
            hash: call.hash.clone(),
            at_names: false,
            blocks: call.blocks.clone(),
        },
    ))
}

fn component_inline(call: &InlineCall, cx: &MacroContext<'_>) -> Result<Inline, CompileError> {
    let Some((definition, rest)) = call.params.as_deref().and_then(<[Expr]>::split_first) else {
        return Ok(Inline::Handled(error(
            "component helper requires at least one argument",
        )));
    };
    if let Expr::Literal(Primitive::String(tag)) = definition {
        if let Some(action) = static_component_helper(cx.resolver, cx.meta, tag, call.hash.as_ref(), None) {
            return Ok(Inline::Handled(action));
        }
    }
    Ok(Inline::Handled(invoke_dynamic_component(
        cx.meta,
        DynamicInvocation {
            definition: definition.clone(),
            attrs: None,
            params: Some(rest.to_vec()),
            hash: call.hash.clone(),
            at_names: false,
            blocks: NamedBlocks::empty(),
        },
    )))
}

/// Unregistered block names are components, or an error.
fn missing_block(call: &BlockCall, cx: &MacroContext<'_>) -> Result<Action, CompileError> {
    let name = &call.name;
    if let Some(component) = cx.resolver.lookup_component(name, &cx.meta.referrer) {
        return Ok(static_component(
            &component,
            Some(call.params.clone()),
            hash_to_args(call.hash.as_ref()),
            call.blocks.clone(),
        ));
    }
    if cx.resolver.lookup_helper(name, &cx.meta.referrer).is_some() {
        return Ok(error(format!(
            "Helpers may not be used in the block form, for example {{{{#{name}}}}}{{{{/{name}}}}}. \
             Please use a component, or alternatively use the helper in combination with a \
             built-in helper, for example {{{{#if ({name})}}}}{{{{/if}}}}."
        )));
    }
    Ok(error(format!(
        "A component or helper named \"{name}\" could not be found"
    )))
}

/// Unregistered inline names render a component when one resolves.
fn missing_inline(call: &InlineCall, cx: &MacroContext<'_>) -> Result<Inline, CompileError> {
    match cx.resolver.lookup_component(&call.name, &cx.meta.referrer) {
        Some(component) => Ok(Inline::Handled(static_component(
            &component,
            Some(call.params.clone().unwrap_or_default()),
            hash_to_args(call.hash.as_ref()),
            NamedBlocks::empty(),
        ))),
        None => Ok(Inline::Unhandled),
    }
}
