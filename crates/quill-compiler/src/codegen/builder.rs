//! Method and script assembly.
//!
//! `MethodBuilder` collects the instructions of one method with symbolic
//! labels. `ScriptBuilder` lays the finished methods out back to back and
//! runs the link step that turns every pending operand into a concrete
//! signed offset. Long jump forms are used throughout so instruction
//! widths never change during linking.

use quill_core::{CompilerError, Span};
use rustc_hash::FxHashMap;

use crate::codegen::instruction::{Instruction, Label, MethodId, Operand};
use crate::codegen::opcode::OpCode;

/// Emits instructions for one method body.
pub struct MethodBuilder {
    instructions: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    span: Span,
}

impl MethodBuilder {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            labels: Vec::new(),
            span: Span::default(),
        }
    }

    /// Set the span attached to subsequently emitted instructions.
    pub fn at(&mut self, span: Span) -> &mut Self {
        self.span = span;
        self
    }

    /// Create a label that is not yet placed.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Place `label` at the next emitted instruction.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.instructions.len());
    }

    pub fn emit(&mut self, op: OpCode) {
        self.push(op, Operand::None);
    }

    pub fn emit_byte(&mut self, op: OpCode, byte: u8) {
        self.push(op, Operand::Byte(byte));
    }

    pub fn emit_pair(&mut self, op: OpCode, a: u8, b: u8) {
        self.push(op, Operand::Pair(a, b));
    }

    pub fn emit_u16(&mut self, op: OpCode, value: u16) {
        self.push(op, Operand::U16(value));
    }

    pub fn emit_data(&mut self, op: OpCode, data: Vec<u8>) {
        self.push(op, Operand::Data(data));
    }

    /// Emit a jump to a label, always in the long form.
    pub fn emit_jump(&mut self, op: OpCode, target: Label) {
        debug_assert_eq!(op.operand_len(), 4, "jumps must use the long form");
        self.push(op, Operand::Pending(target));
    }

    /// Emit a `CALL_L` to another method, patched at link time.
    pub fn emit_call(&mut self, target: MethodId) {
        self.push(OpCode::CallL, Operand::PendingCall(target));
    }

    /// Push an integer using the smallest encoding.
    pub fn emit_push_int(&mut self, value: i128) {
        match value {
            -1 => self.emit(OpCode::PushM1),
            0..=16 => {
                let raw = u8::from(OpCode::Push0) + value as u8;
                self.push(OpCode::try_from(raw).unwrap(), Operand::None);
            }
            _ if i8::try_from(value).is_ok() => {
                self.push(OpCode::PushInt8, Operand::Byte(value as u8))
            }
            _ if i16::try_from(value).is_ok() => self.push(
                OpCode::PushInt16,
                Operand::Data((value as i16).to_le_bytes().to_vec()),
            ),
            _ if i32::try_from(value).is_ok() => self.push(
                OpCode::PushInt32,
                Operand::Data((value as i32).to_le_bytes().to_vec()),
            ),
            _ if i64::try_from(value).is_ok() => self.push(
                OpCode::PushInt64,
                Operand::Data((value as i64).to_le_bytes().to_vec()),
            ),
            _ => self.push(
                OpCode::PushInt128,
                Operand::Data(value.to_le_bytes().to_vec()),
            ),
        }
    }

    /// Push raw bytes using the narrowest `PUSHDATA` prefix.
    pub fn emit_push_data(&mut self, data: Vec<u8>) {
        let op = match data.len() {
            0..=0xFF => OpCode::PushData1,
            0x100..=0xFFFF => OpCode::PushData2,
            _ => OpCode::PushData4,
        };
        self.push(op, Operand::Data(data));
    }

    pub fn emit_push_bool(&mut self, value: bool) {
        self.emit(if value { OpCode::PushTrue } else { OpCode::PushFalse });
    }

    /// Load or store through a slot family, preferring the direct forms.
    ///
    /// Slot counts are validated at frame entry, so every index fits in
    /// the one-byte operand.
    pub fn emit_slot(&mut self, base: OpCode, index: u32) {
        debug_assert!(index <= u32::from(u8::MAX));
        match OpCode::direct_slot(base, index) {
            Some(direct) => self.emit(direct),
            None => self.emit_byte(base, index as u8),
        }
    }

    pub fn last_op(&self) -> Option<OpCode> {
        self.instructions.last().map(|i| i.op)
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    fn push(&mut self, op: OpCode, operand: Operand) {
        self.instructions.push(Instruction::new(op, operand, self.span));
    }

    fn finish(self) -> (Vec<Instruction>, Vec<Option<usize>>) {
        (self.instructions, self.labels)
    }
}

/// One method laid out in the final script.
struct LaidOutMethod {
    instructions: Vec<Instruction>,
    /// Byte offset of each instruction within the whole script.
    offsets: Vec<usize>,
    /// Label -> script byte offset.
    label_offsets: Vec<usize>,
    start: usize,
}

/// Maps instruction byte offsets to source spans, for the debug file.
pub type SpanMap = Vec<(usize, Span)>;

/// Assembles whole scripts out of finished method bodies.
pub struct ScriptBuilder {
    methods: Vec<LaidOutMethod>,
    starts: FxHashMap<MethodId, usize>,
    cursor: usize,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
            starts: FxHashMap::default(),
            cursor: 0,
        }
    }

    /// Append a finished method and return its start offset.
    pub fn add_method(&mut self, id: MethodId, builder: MethodBuilder) -> Result<usize, CompilerError> {
        let (instructions, labels) = builder.finish();
        let start = self.cursor;
        let mut offsets = Vec::with_capacity(instructions.len());
        for ins in &instructions {
            offsets.push(self.cursor);
            self.cursor += ins.encoded_len();
        }
        let mut label_offsets = Vec::with_capacity(labels.len());
        for (idx, placement) in labels.iter().enumerate() {
            let at = placement.ok_or_else(|| CompilerError::InternalError {
                cause: format!("label {idx} never bound"),
            })?;
            // A label may sit one past the last instruction (method end).
            label_offsets.push(if at == instructions.len() {
                self.cursor
            } else {
                offsets[at]
            });
        }
        self.methods.push(LaidOutMethod {
            instructions,
            offsets,
            label_offsets,
            start,
        });
        self.starts.insert(id, start);
        Ok(start)
    }

    /// Resolve every pending operand and emit the final byte stream.
    pub fn link(mut self) -> Result<(Vec<u8>, SpanMap), CompilerError> {
        for method in &mut self.methods {
            for (idx, ins) in method.instructions.iter_mut().enumerate() {
                let here = method.offsets[idx];
                match &ins.operand {
                    Operand::Pending(label) => {
                        let target = method.label_offsets[label.0];
                        let rel = target as i64 - here as i64;
                        ins.operand = Operand::Data((rel as i32).to_le_bytes().to_vec());
                    }
                    Operand::PendingCall(id) => {
                        let target =
                            *self.starts.get(id).ok_or_else(|| CompilerError::InternalError {
                                cause: format!("call to unlaid method {id:?}"),
                            })?;
                        let rel = target as i64 - here as i64;
                        ins.operand = Operand::Data((rel as i32).to_le_bytes().to_vec());
                    }
                    _ => {}
                }
            }
        }
        let mut script = Vec::with_capacity(self.cursor);
        let mut spans = SpanMap::new();
        for method in &self.methods {
            for (idx, ins) in method.instructions.iter().enumerate() {
                debug_assert!(!matches!(
                    ins.operand,
                    Operand::Pending(_) | Operand::PendingCall(_)
                ));
                spans.push((method.offsets[idx], ins.span));
                ins.encode(&mut script);
            }
            debug_assert!(
                method.instructions.is_empty() || script.len() > method.start
            );
        }
        debug_assert_eq!(script.len(), self.cursor);
        Ok((script, spans))
    }

    pub fn offset_of(&self, id: MethodId) -> Option<usize> {
        self.starts.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jump_resolves_to_positive_offset() {
        let mut m = MethodBuilder::new();
        let end = m.new_label();
        m.emit_jump(OpCode::JmpL, end);
        m.emit(OpCode::Nop);
        m.bind(end);
        m.emit(OpCode::Ret);

        let mut sb = ScriptBuilder::new();
        sb.add_method(MethodId(0), m).unwrap();
        let (script, _) = sb.link().unwrap();
        // JMP_L +6 skips itself and the NOP.
        assert_eq!(script, vec![0x23, 6, 0, 0, 0, 0x21, 0x40]);
    }

    #[test]
    fn backward_jump_is_negative() {
        let mut m = MethodBuilder::new();
        let top = m.new_label();
        m.bind(top);
        m.emit(OpCode::Nop);
        m.emit_jump(OpCode::JmpL, top);

        let mut sb = ScriptBuilder::new();
        sb.add_method(MethodId(0), m).unwrap();
        let (script, _) = sb.link().unwrap();
        assert_eq!(&script[..2], &[0x21, 0x23]);
        assert_eq!(i32::from_le_bytes(script[2..6].try_into().unwrap()), -1);
    }

    #[test]
    fn cross_method_call_targets_method_start() {
        let mut caller = MethodBuilder::new();
        caller.emit_call(MethodId(1));
        caller.emit(OpCode::Ret);
        let mut callee = MethodBuilder::new();
        callee.emit(OpCode::Ret);

        let mut sb = ScriptBuilder::new();
        sb.add_method(MethodId(0), caller).unwrap();
        let callee_start = sb.add_method(MethodId(1), callee).unwrap();
        assert_eq!(callee_start, 6);
        let (script, _) = sb.link().unwrap();
        assert_eq!(script[0], 0x35);
        assert_eq!(i32::from_le_bytes(script[1..5].try_into().unwrap()), 6);
    }

    #[test]
    fn unbound_label_is_an_internal_error() {
        let mut m = MethodBuilder::new();
        let dangling = m.new_label();
        m.emit_jump(OpCode::JmpL, dangling);
        let mut sb = ScriptBuilder::new();
        assert!(sb.add_method(MethodId(0), m).is_err());
    }

    #[test]
    fn small_int_encodings() {
        let mut m = MethodBuilder::new();
        m.emit_push_int(-1);
        m.emit_push_int(0);
        m.emit_push_int(16);
        m.emit_push_int(17);
        m.emit_push_int(300);
        let mut sb = ScriptBuilder::new();
        sb.add_method(MethodId(0), m).unwrap();
        let (script, _) = sb.link().unwrap();
        assert_eq!(script, vec![0x0F, 0x10, 0x20, 0x00, 17, 0x01, 0x2C, 0x01]);
    }
}
