//! Compiles serialized templates into opcode programs for a stack-based rendering VM.

pub mod actions;
pub mod builder;
pub mod components;
pub mod constants;
pub mod diagnostics;
pub mod disasm;
pub mod encoder;
pub mod error;
pub mod expressions;
pub mod heap;
pub mod macros;
pub mod opcodes;
pub mod program;
pub mod registry;
pub mod render_tree;
pub mod resolver;
pub mod statements;
pub mod stdlib;
pub mod template;
pub mod wire;

mod lowering;

pub use error::{CompileError, CompileErrorKind, EncoderError};
pub use heap::Handle;
pub use macros::Macros;
pub use program::{CompileMode, CompileOptions, CompileResult, PartialDefinition, Program};
pub use registry::{ComponentEntry, Registry};
pub use resolver::{Capabilities, ComponentLookup, CompileTimeResolver, NullResolver};
pub use template::{CompilableId, SymbolTable, Template, TemplateRef};
