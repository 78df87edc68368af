use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::constants::encode_immediate;
use crate::stdlib::{Stdlib, StdlibEntry};
use crate::template::CompilableId;

/// Opaque reference to a committed instruction range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

/// How a compilable's handle is written once it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleEncoding {
    Raw,
    Immediate,
}

/// A word produced by the encoder, possibly waiting on a handle that does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word {
    Value(i32),
    Deferred {
        id: CompilableId,
        encoding: HandleEncoding,
    },
    Stdlib(StdlibEntry),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HandleEntry {
    pub offset: usize,
    pub len: usize,
    pub scope_size: usize,
}

const PLACEHOLDER: i32 = -1;

/// The shared, append-only instruction heap.
#[derive(Debug, Default)]
pub struct Heap {
    words: Vec<i32>,
    table: Vec<HandleEntry>,
    deferred: Vec<(usize, CompilableId, HandleEncoding)>,
    stdlib_refs: Vec<(usize, StdlibEntry)>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&mut self, buffer: &[Word], scope_size: usize) -> Handle {
        let offset = self.words.len();
        for word in buffer {
            let at = self.words.len();
            match *word {
                Word::Value(v) => self.words.push(v),
                Word::Deferred { id, encoding } => {
                    self.deferred.push((at, id, encoding));
                    self.words.push(PLACEHOLDER);
                }
                Word::Stdlib(entry) => {
                    self.stdlib_refs.push((at, entry));
                    self.words.push(PLACEHOLDER);
                }
            }
        }
        let handle = Handle(self.table.len() as u32);
        self.table.push(HandleEntry {
            offset,
            len: buffer.len(),
            scope_size,
        });
        log::trace!("heap: committed {handle:?} at {offset} ({} words)", buffer.len());
        handle
    }

    /// Writes every deferred handle that `lookup` can now answer; the rest stay pending.
    pub fn patch_deferred(&mut self, lookup: impl Fn(CompilableId) -> Option<Handle>) -> usize {
        let mut patched = 0;
        let words = &mut self.words;
        self.deferred.retain(|(at, id, encoding)| match lookup(*id) {
            Some(handle) => {
                words[*at] = match encoding {
                    HandleEncoding::Raw => handle.0 as i32,
                    HandleEncoding::Immediate => encode_immediate(handle.0 as i32),
                };
                patched += 1;
                false
            }
            None => true,
        });
        patched
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    pub fn patch_stdlib(&mut self, stdlib: &Stdlib) {
        for (at, entry) in self.stdlib_refs.drain(..) {
            self.words[at] = stdlib.get(entry).0 as i32;
        }
    }

    pub fn entry(&self, handle: Handle) -> Option<HandleEntry> {
        self.table.get(handle.0 as usize).copied()
    }

    pub fn instructions(&self, handle: Handle) -> Option<&[i32]> {
        let entry = self.entry(handle)?;
        self.words.get(entry.offset..entry.offset + entry.len)
    }

    pub fn handle_count(&self) -> usize {
        self.table.len()
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }

    pub fn words(&self) -> &[i32] {
        &self.words
    }

    /// sha256 over the little-endian heap words.
    pub fn digest_hex(&self) -> String {
        let mut h = Sha256::new();
        for word in &self.words {
            h.update(word.to_le_bytes());
        }
        let digest = h.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for b in digest {
            out.push_str(&format!("{:02x}", b));
        }
        out
    }
}
