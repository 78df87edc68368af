use std::fmt::Display;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{json, Value};
use spindle_contracts::{limits, TEMPLATE_SCHEMA_VERSIONS_SUPPORTED};

const INFLATE_TAG_TABLE: &[&str] = &["div", "span", "p", "a"];
const INFLATE_ATTR_TABLE: &[&str] = &["class", "id", "value", "name", "type", "style", "href"];

mod op {
    pub const APPEND: i64 = 1;
    pub const TRUSTING_APPEND: i64 = 2;
    pub const COMMENT: i64 = 3;
    pub const MODIFIER: i64 = 4;
    pub const BLOCK: i64 = 6;
    pub const COMPONENT: i64 = 8;
    pub const OPEN_ELEMENT: i64 = 10;
    pub const OPEN_ELEMENT_WITH_SPLAT: i64 = 11;
    pub const FLUSH_ELEMENT: i64 = 12;
    pub const CLOSE_ELEMENT: i64 = 13;
    pub const STATIC_ATTR: i64 = 14;
    pub const DYNAMIC_ATTR: i64 = 15;
    pub const COMPONENT_ATTR: i64 = 16;
    pub const ATTR_SPLAT: i64 = 17;
    pub const YIELD: i64 = 18;
    pub const PARTIAL: i64 = 19;
    pub const TRUSTING_DYNAMIC_ATTR: i64 = 22;
    pub const TRUSTING_COMPONENT_ATTR: i64 = 23;
    pub const STATIC_COMPONENT_ATTR: i64 = 24;
    pub const DEBUGGER: i64 = 26;

    pub const HAS_BLOCK: i64 = 27;
    pub const HAS_BLOCK_PARAMS: i64 = 28;
    pub const UNDEFINED: i64 = 29;
    pub const CALL: i64 = 30;
    pub const CONCAT: i64 = 31;
    pub const GET_SYMBOL: i64 = 32;
    pub const GET_FREE: i64 = 33;
    pub const GET_CONTEXTUAL_FREE_START: i64 = 34;
    pub const GET_CONTEXTUAL_FREE_END: i64 = 39;
}

/// A literal operand as it appears in a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// Where a free variable is being evaluated; decides how it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeContext {
    AppendSingleId = 0,
    Expression = 1,
    CallHead = 2,
    BlockHead = 3,
    ModifierHead = 4,
    ComponentHead = 5,
}

impl FreeContext {
    fn from_opcode(opcode: i64) -> Option<Self> {
        match opcode - op::GET_CONTEXTUAL_FREE_START {
            0 => Some(FreeContext::AppendSingleId),
            1 => Some(FreeContext::Expression),
            2 => Some(FreeContext::CallHead),
            3 => Some(FreeContext::BlockHead),
            4 => Some(FreeContext::ModifierHead),
            5 => Some(FreeContext::ComponentHead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetSource {
    Symbol,
    Free,
    Contextual(FreeContext),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Primitive),
    Undefined,
    HasBlock(Box<Expr>),
    HasBlockParams(Box<Expr>),
    Call {
        head: Box<Expr>,
        params: Option<Vec<Expr>>,
        hash: Option<Hash>,
    },
    Concat(Vec<Expr>),
    Get {
        source: GetSource,
        slot: u32,
        path: Vec<String>,
    },
}

impl Expr {
    pub fn is_get(&self) -> bool {
        matches!(self, Expr::Get { .. })
    }

    /// The expression in its serialized array form.
    pub fn to_wire(&self) -> Value {
        match self {
            Expr::Literal(Primitive::Undefined) | Expr::Undefined => json!([op::UNDEFINED]),
            Expr::Literal(Primitive::Null) => Value::Null,
            Expr::Literal(Primitive::Bool(b)) => Value::Bool(*b),
            Expr::Literal(Primitive::Number(n)) => json!(n),
            Expr::Literal(Primitive::String(s)) => Value::String(s.clone()),
            Expr::HasBlock(inner) => json!([op::HAS_BLOCK, inner.to_wire()]),
            Expr::HasBlockParams(inner) => json!([op::HAS_BLOCK_PARAMS, inner.to_wire()]),
            Expr::Call { head, params, hash } => json!([
                op::CALL,
                head.to_wire(),
                params
                    .as_ref()
                    .map(|ps| Value::Array(ps.iter().map(Expr::to_wire).collect()))
                    .unwrap_or(Value::Null),
                hash.as_ref()
                    .map(|h| json!([h.names, h.values.iter().map(Expr::to_wire).collect::<Vec<_>>()]))
                    .unwrap_or(Value::Null),
            ]),
            Expr::Concat(parts) => {
                json!([op::CONCAT, parts.iter().map(Expr::to_wire).collect::<Vec<_>>()])
            }
            Expr::Get { source, slot, path } => {
                let opcode = match source {
                    GetSource::Symbol => op::GET_SYMBOL,
                    GetSource::Free => op::GET_FREE,
                    GetSource::Contextual(context) => op::GET_CONTEXTUAL_FREE_START + *context as i64,
                };
                if path.is_empty() {
                    json!([opcode, slot])
                } else {
                    json!([opcode, slot, path])
                }
            }
        }
    }

    /// The upvar name of a free-variable read with no property path.
    pub fn simple_free_name<'m>(&self, upvars: &'m [String]) -> Option<&'m str> {
        match self {
            Expr::Get {
                source: GetSource::Free | GetSource::Contextual(_),
                slot,
                path,
            } if path.is_empty() => upvars.get(*slot as usize).map(String::as_str),
            _ => None,
        }
    }
}

/// Named arguments, kept as parallel name/value lists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hash {
    pub names: Vec<String>,
    pub values: Vec<Expr>,
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// JSON pointer of the statement in the decoded document.
    pub ptr: String,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Append {
        value: Expr,
        trusting: bool,
    },
    Comment(String),
    Modifier {
        head: Expr,
        params: Option<Vec<Expr>>,
        hash: Option<Hash>,
    },
    Block(BlockInvocation),
    Component {
        tag: ComponentTag,
        attrs: Rc<WireBlock>,
        hash: Option<Hash>,
        blocks: Option<WireBlocks>,
    },
    OpenElement {
        tag: String,
        splat: bool,
    },
    FlushElement,
    CloseElement,
    StaticAttr {
        name: String,
        value: String,
        namespace: Option<String>,
        component: bool,
    },
    DynamicAttr {
        name: String,
        value: Expr,
        namespace: Option<String>,
        trusting: bool,
        component: bool,
    },
    Yield {
        to: u32,
        params: Option<Vec<Expr>>,
    },
    AttrSplat {
        to: u32,
    },
    Partial {
        name: Expr,
        eval_info: Vec<u32>,
    },
    Debugger {
        eval_info: Vec<u32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockInvocation {
    pub head: Expr,
    pub params: Option<Vec<Expr>>,
    pub hash: Option<Hash>,
    pub blocks: Option<WireBlocks>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentTag {
    Static(String),
    Dynamic(Expr),
}

/// A nested block: its statements plus the symbol slots its block params bind to.
#[derive(Debug, Clone, PartialEq)]
pub struct WireBlock {
    pub statements: Rc<[Statement]>,
    pub parameters: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireBlocks {
    pub names: Vec<String>,
    pub blocks: Vec<Rc<WireBlock>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerializedBlock {
    pub statements: Rc<[Statement]>,
    pub symbols: Vec<String>,
    pub has_eval: bool,
    pub upvars: Option<Vec<String>>,
}

/// Identifies the template a compiled instruction came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Referrer {
    #[serde(rename = "moduleName")]
    pub module_name: Option<String>,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerializedTemplate {
    pub id: String,
    pub module_name: Option<String>,
    pub block: SerializedBlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_template_bytes: usize,
    pub max_nesting_depth: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_template_bytes: limits::max_template_bytes(),
            max_nesting_depth: limits::max_nesting_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireError {
    pub message: String,
    pub ptr: String,
}

impl WireError {
    fn new(message: impl Into<String>, ptr: &str) -> Self {
        Self {
            message: message.into(),
            ptr: ptr.to_string(),
        }
    }
}

impl std::error::Error for WireError {}

impl Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.ptr)
    }
}

pub fn parse_template_json(
    bytes: &[u8],
    limits: &DecodeLimits,
) -> Result<SerializedTemplate, WireError> {
    if bytes.len() > limits.max_template_bytes {
        return Err(WireError::new(
            format!(
                "template is {} bytes, over the {} byte limit",
                bytes.len(),
                limits.max_template_bytes
            ),
            "",
        ));
    }
    let doc: Value =
        serde_json::from_slice(bytes).map_err(|e| WireError::new(e.to_string(), ""))?;
    parse_template_value(&doc, limits)
}

pub fn parse_template_value(
    root: &Value,
    limits: &DecodeLimits,
) -> Result<SerializedTemplate, WireError> {
    let obj = root
        .as_object()
        .ok_or_else(|| WireError::new("template root must be an object", ""))?;

    if let Some(version) = obj.get("schema_version") {
        let version = version
            .as_str()
            .ok_or_else(|| WireError::new("schema_version must be a string", "/schema_version"))?;
        if !TEMPLATE_SCHEMA_VERSIONS_SUPPORTED.contains(&version) {
            return Err(WireError::new(
                format!(
                    "unsupported schema_version: got {version:?} (supported: {})",
                    TEMPLATE_SCHEMA_VERSIONS_SUPPORTED.join(", ")
                ),
                "/schema_version",
            ));
        }
    }

    let id = optional_string(obj, "/id", "id")?;
    let module_name = optional_string(obj, "/moduleName", "moduleName")?;

    let block_v = obj
        .get("block")
        .ok_or_else(|| WireError::new("missing required field: block", ""))?;
    let parsed_block;
    let block_v = match block_v {
        Value::String(raw) => {
            parsed_block = serde_json::from_str::<Value>(raw).map_err(|e| {
                WireError::new(format!("block is not valid JSON: {e}"), "/block")
            })?;
            &parsed_block
        }
        other => other,
    };

    let block = Decoder::new(limits).serialized_block(block_v, "/block")?;
    let id = id.unwrap_or_else(|| content_id(block_v));
    Ok(SerializedTemplate {
        id,
        module_name,
        block,
    })
}

/// Stable id derived from the block contents.
pub fn content_id(block: &Value) -> String {
    let canonical = serde_json::to_string(block).unwrap_or_default();
    let digest = blake3::hash(canonical.as_bytes());
    let bytes = digest.as_bytes();
    format!(
        "tpl-{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

pub fn inflate_tag_name(value: &Value, ptr: &str) -> Result<String, WireError> {
    inflate(value, INFLATE_TAG_TABLE, ptr, "tag name")
}

pub fn inflate_attr_name(value: &Value, ptr: &str) -> Result<String, WireError> {
    inflate(value, INFLATE_ATTR_TABLE, ptr, "attribute name")
}

fn inflate(value: &Value, table: &[&str], ptr: &str, what: &str) -> Result<String, WireError> {
    if let Some(s) = value.as_str() {
        return Ok(s.to_string());
    }
    value
        .as_u64()
        .and_then(|idx| table.get(idx as usize))
        .map(|s| s.to_string())
        .ok_or_else(|| WireError::new(format!("{what} must be a string or a known table index"), ptr))
}

struct Decoder {
    max_depth: usize,
}

impl Decoder {
    fn new(limits: &DecodeLimits) -> Self {
        Self {
            max_depth: limits.max_nesting_depth,
        }
    }

    fn check_depth(&self, depth: usize, ptr: &str) -> Result<(), WireError> {
        if depth > self.max_depth {
            return Err(WireError::new(
                format!("nesting depth exceeds the limit of {}", self.max_depth),
                ptr,
            ));
        }
        Ok(())
    }

    fn serialized_block(&self, v: &Value, ptr: &str) -> Result<SerializedBlock, WireError> {
        let obj = v
            .as_object()
            .ok_or_else(|| WireError::new("block must be an object", ptr))?;
        let statements_v = obj
            .get("statements")
            .ok_or_else(|| WireError::new("missing required field: statements", ptr))?;
        let statements = self.statements(statements_v, &format!("{ptr}/statements"), 0)?;
        let symbols = parse_string_array(obj, &format!("{ptr}/symbols"), "symbols")?;
        let has_eval = match obj.get("hasEval") {
            None | Some(Value::Null) => false,
            Some(v) => v
                .as_bool()
                .ok_or_else(|| WireError::new("hasEval must be a boolean", &format!("{ptr}/hasEval")))?,
        };
        let upvars = match obj.get("upvars") {
            None | Some(Value::Null) => None,
            Some(_) => Some(parse_string_array(obj, &format!("{ptr}/upvars"), "upvars")?),
        };
        Ok(SerializedBlock {
            statements,
            symbols,
            has_eval,
            upvars,
        })
    }

    fn statements(&self, v: &Value, ptr: &str, depth: usize) -> Result<Rc<[Statement]>, WireError> {
        self.check_depth(depth, ptr)?;
        let items = v
            .as_array()
            .ok_or_else(|| WireError::new("statements must be an array", ptr))?;
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            out.push(self.statement(item, &format!("{ptr}/{idx}"), depth + 1)?);
        }
        Ok(out.into())
    }

    fn statement(&self, v: &Value, ptr: &str, depth: usize) -> Result<Statement, WireError> {
        let items = v
            .as_array()
            .ok_or_else(|| WireError::new("statement must be an array", ptr))?;
        let opcode = items
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| WireError::new("statement must start with a numeric opcode", ptr))?;
        let at = |idx: usize| format!("{ptr}/{idx}");
        let arg = |idx: usize| items.get(idx).unwrap_or(&Value::Null);

        let kind = match opcode {
            op::APPEND | op::TRUSTING_APPEND => StatementKind::Append {
                value: self.expr(arg(1), &at(1), depth)?,
                trusting: opcode == op::TRUSTING_APPEND,
            },
            op::COMMENT => StatementKind::Comment(required_str(arg(1), &at(1), "comment")?),
            op::MODIFIER => StatementKind::Modifier {
                head: self.expr(arg(1), &at(1), depth)?,
                params: self.params(arg(2), &at(2), depth)?,
                hash: self.hash(arg(3), &at(3), depth)?,
            },
            op::BLOCK => StatementKind::Block(BlockInvocation {
                head: self.expr(arg(1), &at(1), depth)?,
                params: self.params(arg(2), &at(2), depth)?,
                hash: self.hash(arg(3), &at(3), depth)?,
                blocks: self.blocks(arg(4), &at(4), depth)?,
            }),
            op::COMPONENT => {
                let tag = match arg(1) {
                    Value::String(name) => ComponentTag::Static(name.clone()),
                    other => ComponentTag::Dynamic(self.expr(other, &at(1), depth)?),
                };
                let attrs = match arg(2) {
                    Value::Null => Vec::new().into(),
                    other => self.statements(other, &at(2), depth)?,
                };
                StatementKind::Component {
                    tag,
                    attrs: Rc::new(WireBlock {
                        statements: attrs,
                        parameters: Vec::new(),
                    }),
                    hash: self.hash(arg(3), &at(3), depth)?,
                    blocks: self.blocks(arg(4), &at(4), depth)?,
                }
            }
            op::OPEN_ELEMENT | op::OPEN_ELEMENT_WITH_SPLAT => StatementKind::OpenElement {
                tag: inflate_tag_name(arg(1), &at(1))?,
                splat: opcode == op::OPEN_ELEMENT_WITH_SPLAT,
            },
            op::FLUSH_ELEMENT => StatementKind::FlushElement,
            op::CLOSE_ELEMENT => StatementKind::CloseElement,
            op::STATIC_ATTR | op::STATIC_COMPONENT_ATTR => StatementKind::StaticAttr {
                name: inflate_attr_name(arg(1), &at(1))?,
                value: required_str(arg(2), &at(2), "attribute value")?,
                namespace: optional_str(arg(3), &at(3), "namespace")?,
                component: opcode == op::STATIC_COMPONENT_ATTR,
            },
            op::DYNAMIC_ATTR
            | op::TRUSTING_DYNAMIC_ATTR
            | op::COMPONENT_ATTR
            | op::TRUSTING_COMPONENT_ATTR => StatementKind::DynamicAttr {
                name: inflate_attr_name(arg(1), &at(1))?,
                value: self.expr(arg(2), &at(2), depth)?,
                namespace: optional_str(arg(3), &at(3), "namespace")?,
                trusting: matches!(opcode, op::TRUSTING_DYNAMIC_ATTR | op::TRUSTING_COMPONENT_ATTR),
                component: matches!(opcode, op::COMPONENT_ATTR | op::TRUSTING_COMPONENT_ATTR),
            },
            op::YIELD => StatementKind::Yield {
                to: required_u32(arg(1), &at(1), "yield target")?,
                params: self.params(arg(2), &at(2), depth)?,
            },
            op::ATTR_SPLAT => StatementKind::AttrSplat {
                to: required_u32(arg(1), &at(1), "splat target")?,
            },
            op::PARTIAL => StatementKind::Partial {
                name: self.expr(arg(1), &at(1), depth)?,
                eval_info: u32_array(arg(2), &at(2), "evalInfo")?,
            },
            op::DEBUGGER => StatementKind::Debugger {
                eval_info: u32_array(arg(1), &at(1), "evalInfo")?,
            },
            other => {
                return Err(WireError::new(
                    format!("unknown statement opcode {other}"),
                    &at(0),
                ))
            }
        };
        Ok(Statement {
            ptr: ptr.to_string(),
            kind,
        })
    }

    fn expr(&self, v: &Value, ptr: &str, depth: usize) -> Result<Expr, WireError> {
        self.check_depth(depth, ptr)?;
        let items = match v {
            Value::Null => return Ok(Expr::Literal(Primitive::Null)),
            Value::Bool(b) => return Ok(Expr::Literal(Primitive::Bool(*b))),
            Value::Number(n) => {
                let n = n
                    .as_f64()
                    .ok_or_else(|| WireError::new("number literal is out of range", ptr))?;
                return Ok(Expr::Literal(Primitive::Number(n)));
            }
            Value::String(s) => return Ok(Expr::Literal(Primitive::String(s.clone()))),
            Value::Object(_) => {
                return Err(WireError::new("expression must be an array or a primitive", ptr))
            }
            Value::Array(items) => items,
        };
        let opcode = items
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| WireError::new("expression must start with a numeric opcode", ptr))?;
        let at = |idx: usize| format!("{ptr}/{idx}");
        let arg = |idx: usize| items.get(idx).unwrap_or(&Value::Null);
        let depth = depth + 1;

        Ok(match opcode {
            op::UNDEFINED => Expr::Undefined,
            op::HAS_BLOCK => Expr::HasBlock(Box::new(self.expr(arg(1), &at(1), depth)?)),
            op::HAS_BLOCK_PARAMS => Expr::HasBlockParams(Box::new(self.expr(arg(1), &at(1), depth)?)),
            op::CALL => Expr::Call {
                head: Box::new(self.expr(arg(1), &at(1), depth)?),
                params: self.params(arg(2), &at(2), depth)?,
                hash: self.hash(arg(3), &at(3), depth)?,
            },
            op::CONCAT => {
                let parts = arg(1)
                    .as_array()
                    .ok_or_else(|| WireError::new("concat parts must be an array", &at(1)))?;
                let mut out = Vec::with_capacity(parts.len());
                for (idx, part) in parts.iter().enumerate() {
                    out.push(self.expr(part, &format!("{ptr}/1/{idx}"), depth)?);
                }
                Expr::Concat(out)
            }
            op::GET_SYMBOL | op::GET_FREE | op::GET_CONTEXTUAL_FREE_START..=op::GET_CONTEXTUAL_FREE_END => {
                let source = match opcode {
                    op::GET_SYMBOL => GetSource::Symbol,
                    op::GET_FREE => GetSource::Free,
                    other => match FreeContext::from_opcode(other) {
                        Some(context) => GetSource::Contextual(context),
                        None => return Err(WireError::new("unknown free variable context", &at(0))),
                    },
                };
                let path = match items.get(2) {
                    None | Some(Value::Null) => Vec::new(),
                    Some(v) => string_values(v, &at(2), "path")?,
                };
                Expr::Get {
                    source,
                    slot: required_u32(arg(1), &at(1), "variable slot")?,
                    path,
                }
            }
            other => {
                return Err(WireError::new(
                    format!("unknown expression opcode {other}"),
                    &at(0),
                ))
            }
        })
    }

    fn params(&self, v: &Value, ptr: &str, depth: usize) -> Result<Option<Vec<Expr>>, WireError> {
        match v {
            Value::Null => Ok(None),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    out.push(self.expr(item, &format!("{ptr}/{idx}"), depth + 1)?);
                }
                Ok(Some(out))
            }
            _ => Err(WireError::new("params must be an array or null", ptr)),
        }
    }

    fn hash(&self, v: &Value, ptr: &str, depth: usize) -> Result<Option<Hash>, WireError> {
        let pair = match v {
            Value::Null => return Ok(None),
            Value::Array(pair) if pair.len() == 2 => pair,
            _ => return Err(WireError::new("hash must be a [names, values] pair or null", ptr)),
        };
        let names = string_values(&pair[0], &format!("{ptr}/0"), "hash names")?;
        let values_v = pair[1]
            .as_array()
            .ok_or_else(|| WireError::new("hash values must be an array", &format!("{ptr}/1")))?;
        if names.len() != values_v.len() {
            return Err(WireError::new("hash names and values differ in length", ptr));
        }
        let mut values = Vec::with_capacity(values_v.len());
        for (idx, item) in values_v.iter().enumerate() {
            values.push(self.expr(item, &format!("{ptr}/1/{idx}"), depth + 1)?);
        }
        Ok(Some(Hash { names, values }))
    }

    fn blocks(&self, v: &Value, ptr: &str, depth: usize) -> Result<Option<WireBlocks>, WireError> {
        let pair = match v {
            Value::Null => return Ok(None),
            Value::Array(pair) if pair.len() == 2 => pair,
            _ => return Err(WireError::new("blocks must be a [names, blocks] pair or null", ptr)),
        };
        let names = string_values(&pair[0], &format!("{ptr}/0"), "block names")?;
        let blocks_v = pair[1]
            .as_array()
            .ok_or_else(|| WireError::new("blocks must be an array", &format!("{ptr}/1")))?;
        if names.len() != blocks_v.len() {
            return Err(WireError::new("block names and blocks differ in length", ptr));
        }
        let mut blocks = Vec::with_capacity(blocks_v.len());
        for (idx, item) in blocks_v.iter().enumerate() {
            let bptr = format!("{ptr}/1/{idx}");
            blocks.push(Rc::new(self.block(item, &bptr, depth + 1)?));
        }
        Ok(Some(WireBlocks { names, blocks }))
    }

    fn block(&self, v: &Value, ptr: &str, depth: usize) -> Result<WireBlock, WireError> {
        match v {
            Value::Array(_) => Ok(WireBlock {
                statements: self.statements(v, ptr, depth)?,
                parameters: Vec::new(),
            }),
            Value::Object(obj) => {
                let statements_v = obj
                    .get("statements")
                    .ok_or_else(|| WireError::new("missing required field: statements", ptr))?;
                let parameters = match obj.get("parameters") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(v) => u32_array(v, &format!("{ptr}/parameters"), "parameters")?,
                };
                Ok(WireBlock {
                    statements: self.statements(statements_v, &format!("{ptr}/statements"), depth)?,
                    parameters,
                })
            }
            _ => Err(WireError::new("block must be an object or a statement array", ptr)),
        }
    }
}

fn required_str(v: &Value, ptr: &str, what: &str) -> Result<String, WireError> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| WireError::new(format!("{what} must be a string"), ptr))
}

fn optional_str(v: &Value, ptr: &str, what: &str) -> Result<Option<String>, WireError> {
    match v {
        Value::Null => Ok(None),
        other => required_str(other, ptr, what).map(Some),
    }
}

fn required_u32(v: &Value, ptr: &str, what: &str) -> Result<u32, WireError> {
    v.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| WireError::new(format!("{what} must be a non-negative integer"), ptr))
}

fn u32_array(v: &Value, ptr: &str, what: &str) -> Result<Vec<u32>, WireError> {
    let items = match v {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(WireError::new(format!("{what} must be an array"), ptr)),
    };
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| required_u32(item, &format!("{ptr}/{idx}"), what))
        .collect()
}

fn string_values(v: &Value, ptr: &str, what: &str) -> Result<Vec<String>, WireError> {
    let items = v
        .as_array()
        .ok_or_else(|| WireError::new(format!("{what} must be an array"), ptr))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| WireError::new(format!("{what}[{idx}] must be a string"), &format!("{ptr}/{idx}")))
        })
        .collect()
}

fn optional_string(
    obj: &serde_json::Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<Option<String>, WireError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| WireError::new(format!("{key} must be a string"), ptr)),
    }
}

fn parse_string_array(
    obj: &serde_json::Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<Vec<String>, WireError> {
    let v = obj.get(key).ok_or_else(|| {
        WireError::new(
            format!("missing required field: {key}"),
            ptr.rsplit_once('/').map(|(p, _)| p).unwrap_or(""),
        )
    })?;
    string_values(v, ptr, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(block: Value) -> Result<SerializedTemplate, WireError> {
        parse_template_value(&json!({ "id": "t", "block": block }), &DecodeLimits::default())
    }

    #[test]
    fn statement_pointers_follow_nesting() {
        let t = decode(json!({
            "statements": [
                [10, 0],
                [6, [37, 0], [[32, 1]], null, [["default"], [{ "statements": [[2, "x"]], "parameters": [] }]]]
            ],
            "symbols": ["cond"],
            "hasEval": false,
            "upvars": ["if"]
        }))
        .expect("decode");
        assert_eq!(t.block.statements[0].ptr, "/block/statements/0");
        let StatementKind::OpenElement { tag, splat } = &t.block.statements[0].kind else {
            panic!("expected open element");
        };
        assert_eq!((tag.as_str(), *splat), ("div", false));
        let StatementKind::Block(block) = &t.block.statements[1].kind else {
            panic!("expected block");
        };
        let inner = &block.blocks.as_ref().expect("blocks").blocks[0];
        assert_eq!(inner.statements[0].ptr, "/block/statements/1/4/1/0/statements/0");
    }

    #[test]
    fn unknown_opcode_reports_pointer() {
        let err = decode(json!({ "statements": [[99]], "symbols": [] })).expect_err("bad opcode");
        assert_eq!(err.ptr, "/block/statements/0/0");
        assert_eq!(err.to_string(), "unknown statement opcode 99 at /block/statements/0/0");
    }

    #[test]
    fn string_block_is_parsed_and_id_is_derived_from_content() {
        let block = json!({ "statements": [[2, "hi"]], "symbols": [], "hasEval": false, "upvars": null });
        let a = parse_template_value(
            &json!({ "block": block.to_string() }),
            &DecodeLimits::default(),
        )
        .expect("decode");
        let b = parse_template_value(&json!({ "block": block }), &DecodeLimits::default())
            .expect("decode");
        assert!(a.id.starts_with("tpl-"));
        assert_eq!(a.id.len(), "tpl-".len() + 8);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn nesting_limit_is_enforced() {
        let limits = DecodeLimits {
            max_template_bytes: 1 << 20,
            max_nesting_depth: 3,
        };
        let deep = json!([31, [[31, [[31, [[31, ["x"]]]]]]]]);
        let err = parse_template_value(
            &json!({ "block": { "statements": [[1, deep]], "symbols": [] } }),
            &limits,
        )
        .expect_err("too deep");
        assert!(err.message.contains("nesting depth"));
    }
}
