//! Instructions with symbolic operands.
//!
//! Jump targets and cross-method calls are not resolvable while a method
//! body is being emitted, so they are carried as pending operands and
//! patched in a dedicated link step once every offset is known.

use quill_core::Span;

use crate::codegen::opcode::OpCode;

/// A jump target local to one method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub usize);

/// Identifies an emitted method for call patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub usize);

/// Operand attached to an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Single raw byte (slot index, type code, small int).
    Byte(u8),
    /// Two raw bytes, already in emission order.
    Pair(u8, u8),
    /// Little-endian u16 (method token index).
    U16(u16),
    /// Inline payload. Length prefixes for `PUSHDATA*` are added at
    /// encoding time, everything else is emitted verbatim.
    Data(Vec<u8>),
    /// Jump or call whose 4-byte offset is not yet known.
    Pending(Label),
    /// Call into another method, patched after layout.
    PendingCall(MethodId),
}

/// One instruction, annotated with the source span it came from.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: OpCode,
    pub operand: Operand,
    pub span: Span,
}

impl Instruction {
    pub fn new(op: OpCode, operand: Operand, span: Span) -> Self {
        Self { op, operand, span }
    }

    /// Encoded size in bytes, valid for resolved and pending operands
    /// alike since every pending form encodes to a 4-byte offset.
    pub fn encoded_len(&self) -> usize {
        match &self.operand {
            Operand::None => 1,
            Operand::Byte(_) => 2,
            Operand::Pair(..) => 3,
            Operand::U16(_) => 3,
            Operand::Pending(_) | Operand::PendingCall(_) => 5,
            Operand::Data(bytes) => match self.op {
                OpCode::PushData1 => 2 + bytes.len(),
                OpCode::PushData2 => 3 + bytes.len(),
                OpCode::PushData4 => 5 + bytes.len(),
                _ => 1 + bytes.len(),
            },
        }
    }

    /// Append the encoded form to `out`. Pending operands must have been
    /// patched before this is called.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.op.into());
        match &self.operand {
            Operand::None => {}
            Operand::Byte(b) => out.push(*b),
            Operand::Pair(a, b) => {
                out.push(*a);
                out.push(*b);
            }
            Operand::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Operand::Data(bytes) => {
                match self.op {
                    OpCode::PushData1 => out.push(bytes.len() as u8),
                    OpCode::PushData2 => {
                        out.extend_from_slice(&(bytes.len() as u16).to_le_bytes())
                    }
                    OpCode::PushData4 => {
                        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes())
                    }
                    _ => {}
                }
                out.extend_from_slice(bytes);
            }
            Operand::Pending(label) => {
                unreachable!("unresolved jump to {label:?} at encode time")
            }
            Operand::PendingCall(id) => {
                unreachable!("unresolved call to {id:?} at encode time")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_len_matches_encode() {
        let cases = vec![
            Instruction::new(OpCode::Ret, Operand::None, Span::default()),
            Instruction::new(OpCode::LdLoc, Operand::Byte(9), Span::default()),
            Instruction::new(OpCode::InitSlot, Operand::Pair(3, 2), Span::default()),
            Instruction::new(OpCode::CallT, Operand::U16(1), Span::default()),
            Instruction::new(
                OpCode::PushData1,
                Operand::Data(b"hello".to_vec()),
                Span::default(),
            ),
            Instruction::new(
                OpCode::Syscall,
                Operand::Data(vec![0xDE, 0xAD, 0xBE, 0xEF]),
                Span::default(),
            ),
        ];
        for ins in cases {
            let mut out = Vec::new();
            ins.encode(&mut out);
            assert_eq!(out.len(), ins.encoded_len(), "{:?}", ins.op);
        }
    }

    #[test]
    fn pushdata_prefix_is_length() {
        let ins = Instruction::new(
            OpCode::PushData1,
            Operand::Data(vec![1, 2, 3]),
            Span::default(),
        );
        let mut out = Vec::new();
        ins.encode(&mut out);
        assert_eq!(out, vec![0x0C, 3, 1, 2, 3]);
    }

    #[test]
    fn pending_operands_report_long_width() {
        let ins = Instruction::new(
            OpCode::JmpL,
            Operand::Pending(Label(0)),
            Span::default(),
        );
        assert_eq!(ins.encoded_len(), 5);
    }
}
