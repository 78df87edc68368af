use std::collections::HashMap;

use crate::tag::TagId;

/// Host hooks for the write-after-read guard.
pub trait TransactionEnv {
    /// Called when a consumed tag is written in assert mode. Returning `Err` turns the
    /// write into a [`crate::TagError::ConsumedInTransaction`].
    fn assert(&mut self, message: &str) -> Result<(), String> {
        Err(message.to_string())
    }

    /// Called instead of `assert` while mutations are being deprecated.
    fn deprecate(&mut self, message: &str) {
        log::warn!("{message}");
    }

    fn debug_message(&self, target: Option<&str>, key: Option<&str>) -> String {
        default_debug_message(target, key)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransactionEnv;

impl TransactionEnv for DefaultTransactionEnv {}

pub fn default_debug_message(target: Option<&str>, key: Option<&str>) -> String {
    let target = target.unwrap_or("(an unknown tag)");
    let dirty = match key {
        Some(key) => format!("`{key}` on `{target}`"),
        None => format!("`{target}`"),
    };
    format!(
        "You attempted to update {dirty}, but it had already been used previously in the same computation.  Attempting to update a value after using it in a computation can cause logical errors, infinite revalidation bugs, and performance issues, and is not supported."
    )
}

/// Consumption record for the currently open autotracking transaction.
#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    consumed: Option<HashMap<TagId, String>>,
    deprecate: bool,
    deprecate_by_default: bool,
    /// Most recent context last.
    contexts: Vec<String>,
}

pub(crate) struct TransactionScope {
    started: bool,
    previous_deprecate: bool,
    pushed_context: bool,
}

impl TransactionState {
    pub(crate) fn new(deprecate_by_default: bool) -> Self {
        Self {
            consumed: None,
            deprecate: false,
            deprecate_by_default,
            contexts: Vec::new(),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.consumed.is_some()
    }

    pub(crate) fn enter(&mut self, context: Option<&str>) -> TransactionScope {
        let previous_deprecate = self.deprecate;
        self.deprecate = self.deprecate_by_default;
        let started = self.consumed.is_none();
        if started {
            self.consumed = Some(HashMap::new());
        }
        let pushed_context = match context {
            Some(context) if !context.is_empty() => {
                self.contexts.push(context.to_string());
                true
            }
            _ => false,
        };
        TransactionScope {
            started,
            previous_deprecate,
            pushed_context,
        }
    }

    pub(crate) fn exit(&mut self, scope: TransactionScope) {
        if scope.pushed_context {
            self.contexts.pop();
        }
        self.deprecate = scope.previous_deprecate;
        if scope.started {
            self.consumed = None;
        }
    }

    pub(crate) fn set_deprecate(&mut self, deprecate: bool) -> bool {
        std::mem::replace(&mut self.deprecate, deprecate)
    }

    pub(crate) fn deprecating(&self) -> bool {
        self.deprecate
    }

    /// Marks `tag` as read; returns false if it was already marked or no transaction is open.
    pub(crate) fn mark(&mut self, tag: TagId) -> bool {
        let context = self.render_context();
        match &mut self.consumed {
            Some(consumed) if !consumed.contains_key(&tag) => {
                consumed.insert(tag, context);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn consumed_context(&self, tag: TagId) -> Option<&str> {
        self.consumed.as_ref()?.get(&tag).map(String::as_str)
    }

    fn render_context(&self) -> String {
        self.contexts
            .iter()
            .rev()
            .map(|context| {
                let indented = context
                    .lines()
                    .map(|line| format!("  {line}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                indented.replacen(' ', "-", 1)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub(crate) fn consumed_message(
    env: &dyn TransactionEnv,
    context: &str,
    target: Option<&str>,
    key: Option<&str>,
) -> String {
    let mut parts = vec![env.debug_message(target, key)];
    if !context.is_empty() {
        parts.push(format!(
            "`{}` was first used:\n\n{context}",
            key.unwrap_or("(unknown key)")
        ));
    }
    parts.join("\n\n")
}
