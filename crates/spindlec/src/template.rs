use std::rc::Rc;

use serde::Serialize;

use crate::wire::{self, DecodeLimits, Referrer, SerializedBlock, SerializedTemplate, WireBlock, WireError};

/// Symbol reserved for the caller's splatted attributes in wrapped layouts.
pub const ATTRS_BLOCK: &str = "&attrs";

/// Provisional index of something compilable, assigned before its body is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CompilableId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SymbolTable {
    Program {
        symbols: Vec<String>,
        #[serde(rename = "hasEval")]
        has_eval: bool,
    },
    Block {
        parameters: Vec<u32>,
    },
}

impl SymbolTable {
    pub fn symbols(&self) -> &[String] {
        match self {
            SymbolTable::Program { symbols, .. } => symbols,
            SymbolTable::Block { .. } => &[],
        }
    }

    pub fn parameters(&self) -> &[u32] {
        match self {
            SymbolTable::Program { .. } => &[],
            SymbolTable::Block { parameters } => parameters,
        }
    }
}

/// Per-template facts every statement and expression compiler consults.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMeta {
    pub as_partial: bool,
    /// The template's symbols, present only when it may evaluate partials.
    pub eval_symbols: Option<Vec<String>>,
    pub upvars: Option<Vec<String>>,
    pub referrer: Referrer,
    pub size: usize,
}

impl TemplateMeta {
    pub fn upvar(&self, slot: u32) -> Option<&str> {
        self.upvars.as_ref()?.get(slot as usize).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateView {
    Layout,
    Partial,
    WrappedLayout,
}

#[derive(Debug, PartialEq)]
pub struct Template {
    id: String,
    module_name: Option<String>,
    block: SerializedBlock,
}

impl Template {
    pub fn new(serialized: SerializedTemplate) -> Rc<Template> {
        Rc::new(Template {
            id: serialized.id,
            module_name: serialized.module_name,
            block: serialized.block,
        })
    }

    pub fn from_json(bytes: &[u8], limits: &DecodeLimits) -> Result<Rc<Template>, WireError> {
        wire::parse_template_json(bytes, limits).map(Template::new)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Rc<Template>, WireError> {
        wire::parse_template_value(value, &DecodeLimits::default()).map(Template::new)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    pub fn block(&self) -> &SerializedBlock {
        &self.block
    }

    pub fn referrer(&self) -> Referrer {
        Referrer {
            module_name: self.module_name.clone(),
            id: self.id.clone(),
        }
    }

    pub fn as_layout(self: &Rc<Self>) -> TemplateRef {
        self.view(TemplateView::Layout)
    }

    pub fn as_partial(self: &Rc<Self>) -> TemplateRef {
        self.view(TemplateView::Partial)
    }

    pub fn as_wrapped_layout(self: &Rc<Self>) -> TemplateRef {
        self.view(TemplateView::WrappedLayout)
    }

    fn view(self: &Rc<Self>, view: TemplateView) -> TemplateRef {
        TemplateRef {
            template: Rc::clone(self),
            view,
        }
    }

    pub(crate) fn meta(self: &Rc<Self>, view: TemplateView) -> TemplateMeta {
        TemplateMeta {
            as_partial: view == TemplateView::Partial,
            eval_symbols: self.block.has_eval.then(|| self.block.symbols.clone()),
            upvars: self.block.upvars.clone(),
            referrer: self.referrer(),
            // The wrapped view's extra `&attrs` slot is not part of the committed size.
            size: self.block.symbols.len(),
        }
    }

    /// The template body as a parameterless block.
    pub(crate) fn body_block(&self) -> Rc<WireBlock> {
        Rc::new(WireBlock {
            statements: Rc::clone(&self.block.statements),
            parameters: Vec::new(),
        })
    }
}

/// A template seen through one of its compilation views.
#[derive(Debug, Clone)]
pub struct TemplateRef {
    pub template: Rc<Template>,
    pub view: TemplateView,
}

impl TemplateRef {
    pub fn symbol_table(&self) -> SymbolTable {
        let block = self.template.block();
        let mut symbols = block.symbols.clone();
        if self.view == TemplateView::WrappedLayout && !symbols.iter().any(|s| s == ATTRS_BLOCK) {
            symbols.push(ATTRS_BLOCK.to_string());
        }
        SymbolTable::Program {
            symbols,
            has_eval: block.has_eval,
        }
    }

    /// Symbol number of the attrs block in a wrapped layout.
    pub fn attrs_block_number(&self) -> u32 {
        let symbols = &self.template.block().symbols;
        match symbols.iter().position(|s| s == ATTRS_BLOCK) {
            Some(idx) => idx as u32 + 1,
            None => symbols.len() as u32 + 1,
        }
    }

    pub(crate) fn key(&self) -> (usize, TemplateView) {
        (Rc::as_ptr(&self.template) as usize, self.view)
    }
}
