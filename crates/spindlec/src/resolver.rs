use serde::{Deserialize, Serialize};

use crate::template::TemplateRef;
use crate::wire::Referrer;

/// Component manager feature flags that select the invocation code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    pub dynamic_layout: bool,
    pub dynamic_tag: bool,
    pub prepare_args: bool,
    pub create_args: bool,
    pub attribute_hook: bool,
    pub element_hook: bool,
    pub dynamic_scope: bool,
    pub create_caller: bool,
    pub update_hook: bool,
    pub create_instance: bool,
    pub wrapped: bool,
    pub will_destroy: bool,
}

impl Capabilities {
    pub const MINIMAL: Capabilities = Capabilities {
        dynamic_layout: false,
        dynamic_tag: false,
        prepare_args: false,
        create_args: false,
        attribute_hook: false,
        element_hook: false,
        dynamic_scope: false,
        create_caller: false,
        update_hook: false,
        create_instance: false,
        wrapped: false,
        will_destroy: false,
    };

    pub const DEFAULT: Capabilities = Capabilities {
        dynamic_layout: true,
        dynamic_tag: true,
        prepare_args: true,
        create_args: true,
        attribute_hook: false,
        element_hook: false,
        dynamic_scope: true,
        create_caller: false,
        update_hook: true,
        create_instance: true,
        wrapped: false,
        will_destroy: false,
    };
}

/// A component found by name.
#[derive(Debug, Clone)]
pub struct ComponentLookup {
    pub handle: u32,
    pub capabilities: Option<Capabilities>,
    /// The layout, when it is known at compile time.
    pub compilable: Option<TemplateRef>,
}

impl ComponentLookup {
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities.unwrap_or(Capabilities::MINIMAL)
    }
}

/// Name lookups the compiler performs against the host.
pub trait CompileTimeResolver {
    fn lookup_helper(&self, name: &str, referrer: &Referrer) -> Option<u32>;

    fn lookup_modifier(&self, name: &str, referrer: &Referrer) -> Option<u32>;

    fn lookup_component(&self, name: &str, referrer: &Referrer) -> Option<ComponentLookup>;

    fn lookup_partial(&self, name: &str, referrer: &Referrer) -> Option<u32>;

    /// Debug-only reverse lookup of a handle handed out above.
    fn resolve(&self, _handle: u32) -> Option<String> {
        None
    }
}

/// Resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl CompileTimeResolver for NullResolver {
    fn lookup_helper(&self, _name: &str, _referrer: &Referrer) -> Option<u32> {
        None
    }

    fn lookup_modifier(&self, _name: &str, _referrer: &Referrer) -> Option<u32> {
        None
    }

    fn lookup_component(&self, _name: &str, _referrer: &Referrer) -> Option<ComponentLookup> {
        None
    }

    fn lookup_partial(&self, _name: &str, _referrer: &Referrer) -> Option<u32> {
        None
    }
}
