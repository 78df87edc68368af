use std::fmt::Display;

use serde::Serialize;

use crate::wire::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// The template uses a construct incorrectly (bad macro arity, bad option).
    Syntax,
    Unsupported,
    Decode,
    Registration,
    Internal,
}

/// A hard failure: compilation of the template stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub ptr: Option<String>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            ptr: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Syntax, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Unsupported, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Internal, message)
    }

    /// Attaches a location unless a more precise one is already set.
    pub fn at(mut self, ptr: &str) -> Self {
        if self.ptr.is_none() {
            self.ptr = Some(ptr.to_string());
        }
        self
    }

    /// Re-roots the location under `prefix`, for documents embedded in another one.
    pub fn at_prefix(mut self, prefix: &str) -> Self {
        self.ptr = Some(format!("{prefix}{}", self.ptr.as_deref().unwrap_or("")));
        self
    }
}

impl std::error::Error for CompileError {}

impl Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ptr {
            Some(ptr) => write!(f, "{} at {}", self.message, ptr),
            None => f.write_str(&self.message),
        }
    }
}

impl From<WireError> for CompileError {
    fn from(err: WireError) -> Self {
        Self {
            kind: CompileErrorKind::Decode,
            message: err.message,
            ptr: Some(err.ptr),
        }
    }
}

/// A recorded, non-fatal problem. The encoder emits a placeholder instruction in its
/// place and compilation carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderError {
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<String>,
}

impl EncoderError {
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problem: problem.into(),
            ptr: None,
        }
    }
}

impl Display for EncoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ptr {
            Some(ptr) => write!(f, "{} at {}", self.problem, ptr),
            None => f.write_str(&self.problem),
        }
    }
}
