use serde::{Deserialize, Serialize};
use spindle_contracts::DIAG_SCHEMA_VERSION;

use crate::error::{CompileError, CompileErrorKind, EncoderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Decode,
    Resolve,
    Lower,
    Encode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Location {
    /// JSON pointer into the serialized template (or registry).
    Template { ptr: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<Location>,
}

impl Diagnostic {
    fn new(code: &str, severity: Severity, stage: Stage, message: String, ptr: Option<&str>) -> Self {
        Self {
            code: code.to_string(),
            severity,
            stage,
            message,
            loc: ptr.map(|ptr| Location::Template {
                ptr: ptr.to_string(),
            }),
        }
    }

    /// A recorded problem that still produced a handle.
    pub fn recorded(error: &EncoderError) -> Self {
        Self::new(
            "SPC_RECORDED",
            Severity::Error,
            Stage::Lower,
            error.problem.clone(),
            error.ptr.as_deref(),
        )
    }

    pub fn compile_error(error: &CompileError) -> Self {
        let (code, stage) = match error.kind {
            CompileErrorKind::Decode => ("SPC_DECODE", Stage::Decode),
            CompileErrorKind::Registration => ("SPC_REGISTRATION", Stage::Resolve),
            CompileErrorKind::Syntax => ("SPC_SYNTAX", Stage::Lower),
            CompileErrorKind::Unsupported => ("SPC_UNSUPPORTED", Stage::Lower),
            CompileErrorKind::Internal => ("SPC_INTERNAL", Stage::Encode),
        };
        Self::new(code, Severity::Error, stage, error.message.clone(), error.ptr.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub schema_version: String,
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn ok() -> Self {
        Self {
            schema_version: DIAG_SCHEMA_VERSION.to_string(),
            ok: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, mut diagnostics: Vec<Diagnostic>) -> Self {
        let ptr = |d: &Diagnostic| match &d.loc {
            Some(Location::Template { ptr }) => ptr.clone(),
            None => String::new(),
        };
        diagnostics.sort_by(|a, b| {
            ptr(a)
                .cmp(&ptr(b))
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
        self.ok = diagnostics.iter().all(|d| d.severity != Severity::Error);
        self.diagnostics = diagnostics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_sorts_by_location_and_tracks_ok() {
        let late = Diagnostic::recorded(&EncoderError {
            problem: "Unexpected Helper missing".to_string(),
            ptr: Some("/block/statements/4".to_string()),
        });
        let early = Diagnostic::compile_error(&CompileError::syntax("bad").at("/block/statements/1"));
        let report = Report::ok().with_diagnostics(vec![late, early]);
        assert!(!report.ok);
        assert_eq!(report.diagnostics[0].code, "SPC_SYNTAX");
        assert_eq!(report.diagnostics[1].stage, Stage::Lower);

        let json = serde_json::to_value(&report.diagnostics[1]).expect("json");
        assert_eq!(json["loc"]["kind"], "template");
        assert_eq!(json["loc"]["ptr"], "/block/statements/4");
        let keys: Vec<&str> = json.as_object().expect("object").keys().map(String::as_str).collect();
        assert_eq!(keys, ["code", "loc", "message", "severity", "stage"]);
        assert!(Report::ok().with_diagnostics(Vec::new()).ok);
    }
}
