use std::collections::HashMap;

use serde::Serialize;

use crate::wire::{Primitive, Referrer};

const SIGN_BIT: i32 = !(1 << 29);
pub const MAX_INT: i32 = (1 << 29) - 1;
pub const MIN_INT: i32 = -(1 << 29);

pub const FALSE_HANDLE: u32 = 0;
pub const TRUE_HANDLE: u32 = 1;
pub const NULL_HANDLE: u32 = 2;
pub const UNDEFINED_HANDLE: u32 = 3;

/// Whether `n` fits an immediate operand.
pub fn is_small_int(n: f64) -> bool {
    n.fract() == 0.0 && n <= MAX_INT as f64 && n >= MIN_INT as f64
}

/// Packs a small integer so that it can never be mistaken for a pool index.
pub fn encode_immediate(n: i32) -> i32 {
    if n < 0 {
        n & SIGN_BIT
    } else {
        !n
    }
}

pub fn decode_immediate(word: i32) -> i32 {
    if word > SIGN_BIT {
        !word
    } else {
        word | !SIGN_BIT
    }
}

/// A value interned in the constant pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Constant {
    Bool(bool),
    Null,
    Undefined,
    Number(f64),
    String(String),
    /// Pool handles of the elements, in order.
    Handles(Vec<u32>),
    Numbers(Vec<u32>),
    TemplateMeta(Referrer),
    Compilable(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Bool(bool),
    Null,
    Undefined,
    Number(u64),
    String(String),
    Handles(Vec<u32>),
    Numbers(Vec<u32>),
    TemplateMeta(Referrer),
    Compilable(u32),
}

impl Key {
    fn of(value: &Constant) -> Key {
        match value {
            Constant::Bool(b) => Key::Bool(*b),
            Constant::Null => Key::Null,
            Constant::Undefined => Key::Undefined,
            Constant::Number(n) => Key::Number(n.to_bits()),
            Constant::String(s) => Key::String(s.clone()),
            Constant::Handles(h) => Key::Handles(h.clone()),
            Constant::Numbers(n) => Key::Numbers(n.clone()),
            Constant::TemplateMeta(r) => Key::TemplateMeta(r.clone()),
            Constant::Compilable(id) => Key::Compilable(*id),
        }
    }
}

/// Append-only, deduplicating constant pool shared by every template in a program.
#[derive(Debug)]
pub struct Constants {
    values: Vec<Constant>,
    index: HashMap<Key, u32>,
}

impl Default for Constants {
    fn default() -> Self {
        Self::new()
    }
}

impl Constants {
    pub fn new() -> Self {
        let mut pool = Self {
            values: Vec::new(),
            index: HashMap::new(),
        };
        for well_known in [
            Constant::Bool(false),
            Constant::Bool(true),
            Constant::Null,
            Constant::Undefined,
        ] {
            pool.value(well_known);
        }
        pool
    }

    pub fn value(&mut self, value: Constant) -> u32 {
        let key = Key::of(&value);
        if let Some(handle) = self.index.get(&key) {
            return *handle;
        }
        let handle = self.values.len() as u32;
        self.values.push(value);
        self.index.insert(key, handle);
        handle
    }

    pub fn string(&mut self, value: &str) -> u32 {
        self.value(Constant::String(value.to_string()))
    }

    pub fn primitive(&mut self, value: &Primitive) -> u32 {
        self.value(match value {
            Primitive::Undefined => Constant::Undefined,
            Primitive::Null => Constant::Null,
            Primitive::Bool(b) => Constant::Bool(*b),
            Primitive::Number(n) => Constant::Number(*n),
            Primitive::String(s) => Constant::String(s.clone()),
        })
    }

    pub fn array(&mut self, values: &[String]) -> u32 {
        let handles = values.iter().map(|v| self.string(v)).collect();
        self.value(Constant::Handles(handles))
    }

    pub fn serializable(&mut self, value: &serde_json::Value) -> u32 {
        let text = serde_json::to_string(value).unwrap_or_default();
        self.value(Constant::String(text))
    }

    pub fn get(&self, handle: u32) -> Option<&Constant> {
        self.values.get(handle as usize)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Human-readable rendering of a pool entry, used by the disassembler.
    pub fn describe(&self, handle: u32) -> String {
        match self.get(handle) {
            None => format!("<bad constant {handle}>"),
            Some(Constant::Bool(b)) => b.to_string(),
            Some(Constant::Null) => "null".to_string(),
            Some(Constant::Undefined) => "undefined".to_string(),
            Some(Constant::Number(n)) => n.to_string(),
            Some(Constant::String(s)) => format!("{s:?}"),
            Some(Constant::Handles(items)) => {
                let parts: Vec<String> = items.iter().map(|h| self.describe(*h)).collect();
                format!("[{}]", parts.join(", "))
            }
            Some(Constant::Numbers(items)) => format!("{items:?}"),
            Some(Constant::TemplateMeta(referrer)) => format!(
                "meta({})",
                referrer.module_name.as_deref().unwrap_or(referrer.id.as_str())
            ),
            Some(Constant::Compilable(id)) => format!("compilable({id})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediates_round_trip_and_stay_negative() {
        for n in [0, 1, 17, MAX_INT, -1, -42, MIN_INT] {
            let word = encode_immediate(n);
            assert!(word < 0, "{n} encoded as {word}");
            assert_eq!(decode_immediate(word), n);
        }
        assert!(is_small_int(12.0));
        assert!(!is_small_int(0.5));
        assert!(!is_small_int((MAX_INT as f64) + 1.0));
    }

    #[test]
    fn pool_is_seeded_and_deduplicated() {
        let mut pool = Constants::new();
        assert_eq!(pool.primitive(&Primitive::Bool(false)), FALSE_HANDLE);
        assert_eq!(pool.primitive(&Primitive::Bool(true)), TRUE_HANDLE);
        assert_eq!(pool.primitive(&Primitive::Null), NULL_HANDLE);
        assert_eq!(pool.primitive(&Primitive::Undefined), UNDEFINED_HANDLE);

        let a = pool.string("a");
        assert_eq!(pool.string("a"), a);
        let arr = pool.array(&["a".to_string(), "b".to_string()]);
        assert_eq!(pool.array(&["a".to_string(), "b".to_string()]), arr);
        assert_eq!(pool.describe(arr), "[\"a\", \"b\"]");
    }
}
