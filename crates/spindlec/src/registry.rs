//! A table-backed [`CompileTimeResolver`].
//!
//! Hosts that know their helpers, modifiers, components and partials up front can
//! describe them in a registry document instead of implementing the resolver trait.
//! Components may carry their layout template, which lets the compiler take the static
//! invocation path.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;
use spindle_contracts::REGISTRY_SCHEMA_VERSION;

use crate::error::{CompileError, CompileErrorKind};
use crate::resolver::{Capabilities, ComponentLookup, CompileTimeResolver};
use crate::template::Template;
use crate::wire::{self, DecodeLimits, Referrer};

#[derive(Debug, Clone)]
pub struct ComponentEntry {
    pub handle: u32,
    pub capabilities: Option<Capabilities>,
    pub layout: Option<Rc<Template>>,
    /// The layout is compiled as a wrapped layout that generates its own element.
    pub wrapped: bool,
}

impl ComponentEntry {
    pub fn new(handle: u32) -> Self {
        Self {
            handle,
            capabilities: None,
            layout: None,
            wrapped: false,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn with_layout(mut self, layout: Rc<Template>) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn wrapped(mut self) -> Self {
        self.wrapped = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Helper,
    Modifier,
    Component,
    Partial,
}

impl Kind {
    fn label(self) -> &'static str {
        match self {
            Kind::Helper => "helper",
            Kind::Modifier => "modifier",
            Kind::Component => "component",
            Kind::Partial => "partial",
        }
    }
}

/// Handles are unique across every kind so that [`CompileTimeResolver::resolve`] is
/// unambiguous.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    helpers: BTreeMap<String, u32>,
    modifiers: BTreeMap<String, u32>,
    partials: BTreeMap<String, u32>,
    components: BTreeMap<String, ComponentEntry>,
    by_handle: BTreeMap<u32, (Kind, String)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryDoc {
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(default)]
    helpers: BTreeMap<String, u32>,
    #[serde(default)]
    modifiers: BTreeMap<String, u32>,
    #[serde(default)]
    components: BTreeMap<String, ComponentDoc>,
    #[serde(default)]
    partials: BTreeMap<String, u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ComponentDoc {
    handle: u32,
    #[serde(default)]
    capabilities: Option<Capabilities>,
    #[serde(default)]
    layout: Option<Value>,
    #[serde(default)]
    wrapped: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8], limits: &DecodeLimits) -> Result<Self, CompileError> {
        let doc: RegistryDoc = serde_json::from_slice(bytes).map_err(|err| {
            CompileError::new(CompileErrorKind::Decode, format!("invalid registry JSON: {err}")).at("")
        })?;
        if let Some(version) = &doc.schema_version {
            if version != REGISTRY_SCHEMA_VERSION {
                return Err(CompileError::new(
                    CompileErrorKind::Decode,
                    format!("registry schema_version mismatch: expected {REGISTRY_SCHEMA_VERSION:?} got {version:?}"),
                )
                .at("/schema_version"));
            }
        }

        let mut registry = Registry::new();
        for (name, handle) in doc.helpers {
            registry.add_helper(&name, handle)?;
        }
        for (name, handle) in doc.modifiers {
            registry.add_modifier(&name, handle)?;
        }
        for (name, component) in doc.components {
            let mut entry = ComponentEntry::new(component.handle);
            entry.capabilities = component.capabilities;
            entry.wrapped = component.wrapped;
            if let Some(layout) = &component.layout {
                let template = wire::parse_template_value(layout, limits).map_err(|err| {
                    CompileError::from(err).at_prefix(&format!("/components/{}/layout", escape_ptr(&name)))
                })?;
                entry.layout = Some(Template::new(template));
            }
            registry.add_component(&name, entry)?;
        }
        for (name, handle) in doc.partials {
            registry.add_partial(&name, handle)?;
        }
        log::debug!(
            "registry: {} helper(s), {} modifier(s), {} component(s), {} partial(s)",
            registry.helpers.len(),
            registry.modifiers.len(),
            registry.components.len(),
            registry.partials.len()
        );
        Ok(registry)
    }

    pub fn add_helper(&mut self, name: &str, handle: u32) -> Result<(), CompileError> {
        self.claim(Kind::Helper, name, handle)?;
        self.helpers.insert(name.to_string(), handle);
        Ok(())
    }

    pub fn add_modifier(&mut self, name: &str, handle: u32) -> Result<(), CompileError> {
        self.claim(Kind::Modifier, name, handle)?;
        self.modifiers.insert(name.to_string(), handle);
        Ok(())
    }

    pub fn add_partial(&mut self, name: &str, handle: u32) -> Result<(), CompileError> {
        self.claim(Kind::Partial, name, handle)?;
        self.partials.insert(name.to_string(), handle);
        Ok(())
    }

    pub fn add_component(&mut self, name: &str, mut entry: ComponentEntry) -> Result<(), CompileError> {
        self.claim(Kind::Component, name, entry.handle)?;
        if entry.wrapped {
            let mut capabilities = entry.capabilities.unwrap_or(Capabilities::MINIMAL);
            capabilities.wrapped = true;
            entry.capabilities = Some(capabilities);
        }
        self.components.insert(name.to_string(), entry);
        Ok(())
    }

    pub fn component(&self, name: &str) -> Option<&ComponentEntry> {
        self.components.get(name)
    }

    fn claim(&mut self, kind: Kind, name: &str, handle: u32) -> Result<(), CompileError> {
        let taken = match kind {
            Kind::Helper => self.helpers.contains_key(name),
            Kind::Modifier => self.modifiers.contains_key(name),
            Kind::Component => self.components.contains_key(name),
            Kind::Partial => self.partials.contains_key(name),
        };
        if taken {
            return Err(CompileError::new(
                CompileErrorKind::Registration,
                format!("{} {name:?} is already registered", kind.label()),
            ));
        }
        if let Some((other_kind, other)) = self.by_handle.get(&handle) {
            return Err(CompileError::new(
                CompileErrorKind::Registration,
                format!(
                    "handle {handle} for {} {name:?} is already used by {} {other:?}",
                    kind.label(),
                    other_kind.label()
                ),
            ));
        }
        self.by_handle.insert(handle, (kind, name.to_string()));
        Ok(())
    }

    /// Tries the referrer-local name first, then the global one.
    fn lookup<'a, T>(
        table: &'a BTreeMap<String, T>,
        name: &str,
        referrer: &Referrer,
    ) -> Option<&'a T> {
        if let Some(scope) = local_scope(referrer) {
            if let Some(found) = table.get(&format!("{scope}/{name}")) {
                return Some(found);
            }
        }
        table.get(name)
    }
}

/// `app/components/x-outer.hbs` scopes names under `x-outer`.
fn local_scope(referrer: &Referrer) -> Option<&str> {
    let module = referrer.module_name.as_deref()?;
    let (_, tail) = module.rsplit_once("components/")?;
    let tail = tail.strip_suffix(".hbs").unwrap_or(tail);
    (!tail.is_empty()).then_some(tail)
}

fn escape_ptr(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

impl CompileTimeResolver for Registry {
    fn lookup_helper(&self, name: &str, referrer: &Referrer) -> Option<u32> {
        Self::lookup(&self.helpers, name, referrer).copied()
    }

    fn lookup_modifier(&self, name: &str, referrer: &Referrer) -> Option<u32> {
        Self::lookup(&self.modifiers, name, referrer).copied()
    }

    fn lookup_component(&self, name: &str, referrer: &Referrer) -> Option<ComponentLookup> {
        let entry = Self::lookup(&self.components, name, referrer)?;
        Some(ComponentLookup {
            handle: entry.handle,
            capabilities: entry.capabilities,
            compilable: entry.layout.as_ref().map(|layout| {
                if entry.wrapped {
                    layout.as_wrapped_layout()
                } else {
                    layout.as_layout()
                }
            }),
        })
    }

    fn lookup_partial(&self, name: &str, referrer: &Referrer) -> Option<u32> {
        Self::lookup(&self.partials, name, referrer).copied()
    }

    fn resolve(&self, handle: u32) -> Option<String> {
        self.by_handle.get(&handle).map(|(_, name)| name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn referrer(module_name: Option<&str>) -> Referrer {
        Referrer {
            module_name: module_name.map(str::to_string),
            id: "t".to_string(),
        }
    }

    #[test]
    fn local_scope_strips_prefix_and_extension() {
        assert_eq!(local_scope(&referrer(Some("app/components/x-outer.hbs"))), Some("x-outer"));
        assert_eq!(local_scope(&referrer(Some("components/x-outer"))), Some("x-outer"));
        assert_eq!(local_scope(&referrer(Some("templates/application"))), None);
        assert_eq!(local_scope(&referrer(None)), None);
    }

    #[test]
    fn handles_are_unique_across_kinds() {
        let mut registry = Registry::new();
        registry.add_helper("concat", 1).expect("helper");
        let err = registry.add_modifier("on", 1).expect_err("shared handle");
        assert_eq!(err.kind, CompileErrorKind::Registration);
        assert_eq!(err.message, r#"handle 1 for modifier "on" is already used by helper "concat""#);

        let err = registry.add_helper("concat", 2).expect_err("duplicate");
        assert_eq!(err.message, r#"helper "concat" is already registered"#);
        assert_eq!(registry.resolve(1).as_deref(), Some("concat"));
    }
}
