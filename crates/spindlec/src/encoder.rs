use std::collections::HashMap;

use crate::actions::{Instr, Operand};
use crate::constants::{encode_immediate, Constant, Constants};
use crate::error::{CompileError, EncoderError};
use crate::heap::{Handle, Heap, Word};
use crate::opcodes::{instruction_header, Op, MAX_OPERAND};

const MAX_OPERANDS: usize = 3;

#[derive(Debug, Default)]
struct LabelScope {
    labels: HashMap<String, usize>,
    /// Operand slots waiting on a label, keyed by `header offset + operand index`.
    targets: Vec<(usize, String)>,
}

/// Encodes one compilation unit into a word buffer, then commits it to the heap.
#[derive(Debug, Default)]
pub struct Encoder {
    buffer: Vec<Word>,
    labels: Vec<LabelScope>,
    errors: Vec<EncoderError>,
}

/// A committed unit: its handle plus any recorded, non-fatal errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub handle: Handle,
    pub errors: Vec<EncoderError>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn errors(&self) -> &[EncoderError] {
        &self.errors
    }

    pub fn push(&mut self, constants: &mut Constants, instr: &Instr) -> Result<(), CompileError> {
        if instr.operands.len() > MAX_OPERANDS {
            return Err(CompileError::internal(format!(
                "{} takes at most {MAX_OPERANDS} operands, got {}",
                instr.op,
                instr.operands.len()
            )));
        }
        let header_offset = self.buffer.len();
        let mut words = Vec::with_capacity(instr.operands.len());
        for (index, operand) in instr.operands.iter().enumerate() {
            words.push(self.operand(constants, header_offset + index, operand)?);
        }
        self.buffer
            .push(Word::Value(instruction_header(instr.op, instr.operands.len())));
        self.buffer.extend(words);
        Ok(())
    }

    fn operand(
        &mut self,
        constants: &mut Constants,
        at: usize,
        operand: &Operand,
    ) -> Result<Word, CompileError> {
        let value = match operand {
            Operand::Int(n) => {
                if *n > MAX_OPERAND as i64 || *n < i32::MIN as i64 {
                    return Err(CompileError::internal(format!(
                        "Operand over 16-bits. Got {n}."
                    )));
                }
                *n as i32
            }
            Operand::Bool(b) => i32::from(*b),
            Operand::Null => 0,
            Operand::Str(s) => constants.string(s) as i32,
            Operand::StrArray(values) => constants.array(values) as i32,
            Operand::Serializable(value) => constants.serializable(value) as i32,
            Operand::Immediate(n) => encode_immediate(*n),
            Operand::Primitive(p) => constants.primitive(p) as i32,
            Operand::TemplateMeta(referrer) => {
                constants.value(Constant::TemplateMeta(referrer.clone())) as i32
            }
            Operand::Array(items) => constants.value(Constant::Numbers(items.clone())) as i32,
            Operand::Other(id) => constants.value(Constant::Compilable(id.0)) as i32,
            Operand::Stdlib(entry) => return Ok(Word::Stdlib(*entry)),
            Operand::Handle(id, encoding) => {
                return Ok(Word::Deferred {
                    id: *id,
                    encoding: *encoding,
                })
            }
            Operand::Label(name) => {
                let scope = self.labels.last_mut().ok_or_else(|| {
                    CompileError::internal(format!("label {name} referenced outside a label scope"))
                })?;
                scope.targets.push((at, name.clone()));
                -1
            }
        };
        Ok(Word::Value(value))
    }

    /// Records a non-fatal error and emits a placeholder so offsets stay consistent.
    pub fn error(&mut self, error: EncoderError) {
        self.buffer
            .push(Word::Value(instruction_header(Op::Primitive, 1)));
        self.buffer.push(Word::Value(0));
        self.errors.push(error);
    }

    pub fn label(&mut self, name: &str) -> Result<(), CompileError> {
        let offset = self.buffer.len();
        let scope = self.labels.last_mut().ok_or_else(|| {
            CompileError::internal(format!("label {name} defined outside a label scope"))
        })?;
        scope.labels.insert(name.to_string(), offset);
        Ok(())
    }

    pub fn start_labels(&mut self) {
        self.labels.push(LabelScope::default());
    }

    /// Closes the innermost label scope and patches every jump into it.
    pub fn stop_labels(&mut self) -> Result<(), CompileError> {
        let scope = self
            .labels
            .pop()
            .ok_or_else(|| CompileError::internal("StopLabels without StartLabels"))?;
        for (at, name) in scope.targets {
            let target = *scope
                .labels
                .get(&name)
                .ok_or_else(|| CompileError::internal(format!("unknown label {name}")))?;
            self.buffer[at + 1] = Word::Value(target as i32 - at as i32);
        }
        Ok(())
    }

    /// Appends the final `Return` and commits the buffer.
    pub fn commit(mut self, heap: &mut Heap, scope_size: usize) -> Result<Committed, CompileError> {
        if !self.labels.is_empty() {
            return Err(CompileError::internal(format!(
                "{} label scope(s) left open at commit",
                self.labels.len()
            )));
        }
        self.buffer
            .push(Word::Value(instruction_header(Op::Return, 0)));
        let handle = heap.commit(&self.buffer, scope_size);
        Ok(Committed {
            handle,
            errors: self.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::label_ref;
    use crate::opcodes::MACHINE_MASK;

    fn instr(op: Op, operands: Vec<Operand>) -> Instr {
        Instr { op, operands }
    }

    #[test]
    fn labels_patch_relative_to_operand_slot() {
        let mut constants = Constants::new();
        let mut encoder = Encoder::new();
        encoder.start_labels();
        encoder
            .push(&mut constants, &instr(Op::Jump, vec![label_ref("END")]))
            .expect("jump");
        encoder
            .push(&mut constants, &instr(Op::Pop, vec![Operand::Int(1)]))
            .expect("pop");
        encoder.label("END").expect("label");
        encoder.stop_labels().expect("patch");

        let mut heap = Heap::new();
        let committed = encoder.commit(&mut heap, 0).expect("commit");
        let words = heap.instructions(committed.handle).expect("words");
        // Jump header at 0, operand at 1, label at 4: stored as 4 - 0.
        assert_eq!(words[1], 4);
        assert_eq!(words[4], Op::Return as i32 | MACHINE_MASK);
    }

    #[test]
    fn oversized_operand_is_rejected() {
        let mut constants = Constants::new();
        let mut encoder = Encoder::new();
        let err = encoder
            .push(&mut constants, &instr(Op::Pop, vec![Operand::Int(0x1_0000)]))
            .expect_err("too big");
        assert_eq!(err.message, "Operand over 16-bits. Got 65536.");
    }

    #[test]
    fn unknown_label_is_an_internal_error() {
        let mut constants = Constants::new();
        let mut encoder = Encoder::new();
        encoder.start_labels();
        encoder
            .push(&mut constants, &instr(Op::Jump, vec![label_ref("NOWHERE")]))
            .expect("jump");
        let err = encoder.stop_labels().expect_err("missing label");
        assert!(err.message.contains("NOWHERE"));
    }

    #[test]
    fn recorded_errors_emit_a_placeholder() {
        let mut encoder = Encoder::new();
        encoder.error(EncoderError::new("nope"));
        assert_eq!(encoder.size(), 2);
        let mut heap = Heap::new();
        let committed = encoder.commit(&mut heap, 0).expect("commit");
        assert_eq!(committed.errors, vec![EncoderError::new("nope")]);
    }
}
