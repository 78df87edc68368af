//! Shared routines compiled once per program, ahead of any template.

use serde::Serialize;

use crate::actions::{op0, op1, Action};
use crate::builder::SwitchCases;
use crate::components::{invoke_bare_component, invoke_prepared_component};
use crate::heap::Handle;
use crate::opcodes::{ContentType, Op, Register};
use crate::template::TemplateMeta;
use crate::wire::Referrer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StdlibEntry {
    Main,
    TrustingAppend,
    CautiousAppend,
}

impl StdlibEntry {
    pub fn name(self) -> &'static str {
        match self {
            StdlibEntry::Main => "main",
            StdlibEntry::TrustingAppend => "trusting-append",
            StdlibEntry::CautiousAppend => "cautious-append",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stdlib {
    pub main: Handle,
    pub trusting_append: Handle,
    pub cautious_append: Handle,
}

impl Stdlib {
    pub fn get(&self, entry: StdlibEntry) -> Handle {
        match entry {
            StdlibEntry::Main => self.main,
            StdlibEntry::TrustingAppend => self.trusting_append,
            StdlibEntry::CautiousAppend => self.cautious_append,
        }
    }
}

/// Build order; handles are assigned in this order.
pub const ENTRIES: [StdlibEntry; 3] = [
    StdlibEntry::Main,
    StdlibEntry::TrustingAppend,
    StdlibEntry::CautiousAppend,
];

pub fn routine(entry: StdlibEntry) -> Action {
    match entry {
        StdlibEntry::Main => main_routine(),
        StdlibEntry::TrustingAppend => append_routine(true),
        StdlibEntry::CautiousAppend => append_routine(false),
    }
}

/// Entry point for a top-level component render.
fn main_routine() -> Action {
    Action::Seq(vec![
        op1(Op::Main, Register::S0),
        invoke_prepared_component(false, false, true, None),
    ])
}

/// Triages an appended value by its runtime content type.
fn append_routine(trusting: bool) -> Action {
    let string = if trusting {
        Action::Seq(vec![op0(Op::AssertSame), op0(Op::AppendHTML)])
    } else {
        op0(Op::AppendText)
    };
    Action::Seq(vec![
        op0(Op::ContentType),
        SwitchCases::new()
            .when(ContentType::String as u32, string)
            .when(
                ContentType::Component as u32,
                Action::Seq(vec![
                    op0(Op::PushCurriedComponent),
                    op0(Op::PushDynamicComponentInstance),
                    invoke_bare_component(),
                ]),
            )
            .when(
                ContentType::SafeString as u32,
                Action::Seq(vec![op0(Op::AssertSame), op0(Op::AppendSafeHTML)]),
            )
            .when(
                ContentType::Fragment as u32,
                Action::Seq(vec![op0(Op::AssertSame), op0(Op::AppendDocumentFragment)]),
            )
            .when(
                ContentType::Node as u32,
                Action::Seq(vec![op0(Op::AssertSame), op0(Op::AppendNode)]),
            )
            .build(),
    ])
}

/// Metadata the routines compile under: no symbols, no upvars.
pub fn meta() -> TemplateMeta {
    TemplateMeta {
        as_partial: false,
        eval_symbols: None,
        upvars: Some(Vec::new()),
        referrer: Referrer {
            module_name: None,
            id: "stdlib".to_string(),
        },
        size: 0,
    }
}
