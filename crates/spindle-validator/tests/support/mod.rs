#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use spindle_validator::{TransactionEnv, Validator, ValidatorConfig};

pub fn checked_validator() -> Validator {
    Validator::with_config(ValidatorConfig {
        assertions: true,
        deprecate_mutations: false,
    })
}

pub fn unchecked_validator() -> Validator {
    Validator::with_config(ValidatorConfig {
        assertions: false,
        deprecate_mutations: false,
    })
}

/// Transaction environment that records deprecations instead of logging them.
#[derive(Clone, Default)]
pub struct RecordingEnv {
    pub deprecations: Rc<RefCell<Vec<String>>>,
}

impl TransactionEnv for RecordingEnv {
    fn deprecate(&mut self, message: &str) {
        self.deprecations.borrow_mut().push(message.to_string());
    }
}
