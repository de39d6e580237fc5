//! Operation codes of the target stack VM.
//!
//! The instruction set is fixed and given; this module only has to emit
//! and describe it correctly. Byte values are part of the loader's binary
//! contract and must not change.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// VM type codes used as the `CONVERT`/`ISTYPE` operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum StackItemType {
    Boolean = 0x20,
    Integer = 0x21,
    ByteString = 0x28,
    Buffer = 0x30,
    Array = 0x40,
    Struct = 0x41,
    Map = 0x48,
}

/// Bytecode operation codes.
///
/// The VM is a stack machine; most operations pop operands from the
/// evaluation stack and push results back. Operand bytes follow inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    // =========================================================================
    // Constants
    // =========================================================================
    /// Push a 1-byte signed integer.
    PushInt8 = 0x00,
    /// Push a 2-byte signed integer (little-endian).
    PushInt16 = 0x01,
    /// Push a 4-byte signed integer.
    PushInt32 = 0x02,
    /// Push an 8-byte signed integer.
    PushInt64 = 0x03,
    /// Push a 16-byte signed integer.
    PushInt128 = 0x04,
    /// Push a 32-byte signed integer.
    PushInt256 = 0x05,
    /// Push boolean true.
    PushTrue = 0x08,
    /// Push boolean false.
    PushFalse = 0x09,
    /// Push the null item.
    PushNull = 0x0B,
    /// Push data with a 1-byte length prefix.
    PushData1 = 0x0C,
    /// Push data with a 2-byte length prefix.
    PushData2 = 0x0D,
    /// Push data with a 4-byte length prefix.
    PushData4 = 0x0E,
    /// Push the integer -1.
    PushM1 = 0x0F,
    /// Push the integer 0.
    Push0 = 0x10,
    Push1 = 0x11,
    Push2 = 0x12,
    Push3 = 0x13,
    Push4 = 0x14,
    Push5 = 0x15,
    Push6 = 0x16,
    Push7 = 0x17,
    Push8 = 0x18,
    Push9 = 0x19,
    Push10 = 0x1A,
    Push11 = 0x1B,
    Push12 = 0x1C,
    Push13 = 0x1D,
    Push14 = 0x1E,
    Push15 = 0x1F,
    /// Push the integer 16.
    Push16 = 0x20,

    // =========================================================================
    // Control flow
    // =========================================================================
    Nop = 0x21,
    /// Unconditional jump, 1-byte signed offset.
    Jmp = 0x22,
    /// Unconditional jump, 4-byte signed offset.
    JmpL = 0x23,
    JmpIf = 0x24,
    JmpIfL = 0x25,
    JmpIfNot = 0x26,
    JmpIfNotL = 0x27,
    JmpEq = 0x28,
    JmpEqL = 0x29,
    JmpNe = 0x2A,
    JmpNeL = 0x2B,
    JmpGt = 0x2C,
    JmpGtL = 0x2D,
    JmpGe = 0x2E,
    JmpGeL = 0x2F,
    JmpLt = 0x30,
    JmpLtL = 0x31,
    JmpLe = 0x32,
    JmpLeL = 0x33,
    /// Call, 1-byte signed offset.
    Call = 0x34,
    /// Call, 4-byte signed offset.
    CallL = 0x35,
    /// Call through a method token (2-byte token index).
    CallT = 0x37,
    /// Abort execution, unrecoverable.
    Abort = 0x38,
    /// Pop a value; fault if it is false.
    Assert = 0x39,
    /// Pop a value and throw it as an exception.
    Throw = 0x3A,
    /// Return from the current method.
    Ret = 0x40,
    /// Invoke an interop service (4-byte id).
    Syscall = 0x41,

    // =========================================================================
    // Stack
    // =========================================================================
    Depth = 0x43,
    Drop = 0x45,
    Nip = 0x46,
    Clear = 0x49,
    Dup = 0x4A,
    Over = 0x4B,
    /// Pop n, then copy the item n back to the top.
    Pick = 0x4D,
    Tuck = 0x4E,
    Swap = 0x50,
    Rot = 0x51,
    /// Pop n, then move the item n back to the top.
    Roll = 0x52,
    Reverse3 = 0x53,
    Reverse4 = 0x54,
    ReverseN = 0x55,

    // =========================================================================
    // Slots
    // =========================================================================
    /// Initialize the static-slot array (1-byte count).
    InitSSlot = 0x56,
    /// Initialize local/argument slots (1-byte locals, 1-byte args).
    InitSlot = 0x57,
    LdSFld0 = 0x58,
    LdSFld1 = 0x59,
    LdSFld2 = 0x5A,
    LdSFld3 = 0x5B,
    LdSFld4 = 0x5C,
    LdSFld5 = 0x5D,
    LdSFld6 = 0x5E,
    /// Load static field (1-byte index).
    LdSFld = 0x5F,
    StSFld0 = 0x60,
    StSFld1 = 0x61,
    StSFld2 = 0x62,
    StSFld3 = 0x63,
    StSFld4 = 0x64,
    StSFld5 = 0x65,
    StSFld6 = 0x66,
    /// Store static field (1-byte index).
    StSFld = 0x67,
    LdLoc0 = 0x68,
    LdLoc1 = 0x69,
    LdLoc2 = 0x6A,
    LdLoc3 = 0x6B,
    LdLoc4 = 0x6C,
    LdLoc5 = 0x6D,
    LdLoc6 = 0x6E,
    /// Load local variable (1-byte slot).
    LdLoc = 0x6F,
    StLoc0 = 0x70,
    StLoc1 = 0x71,
    StLoc2 = 0x72,
    StLoc3 = 0x73,
    StLoc4 = 0x74,
    StLoc5 = 0x75,
    StLoc6 = 0x76,
    /// Store local variable (1-byte slot).
    StLoc = 0x77,
    LdArg0 = 0x78,
    LdArg1 = 0x79,
    LdArg2 = 0x7A,
    LdArg3 = 0x7B,
    LdArg4 = 0x7C,
    LdArg5 = 0x7D,
    LdArg6 = 0x7E,
    /// Load argument (1-byte slot).
    LdArg = 0x7F,
    StArg0 = 0x80,
    StArg1 = 0x81,
    StArg2 = 0x82,
    StArg3 = 0x83,
    StArg4 = 0x84,
    StArg5 = 0x85,
    StArg6 = 0x86,
    /// Store argument (1-byte slot).
    StArg = 0x87,

    // =========================================================================
    // Splice
    // =========================================================================
    NewBuffer = 0x88,
    MemCpy = 0x89,
    /// Concatenate two byte strings.
    Cat = 0x8B,
    /// Extract a substring (buffer, index, count).
    SubStr = 0x8C,
    Left = 0x8D,
    Right = 0x8E,

    // =========================================================================
    // Bitwise logic
    // =========================================================================
    Invert = 0x90,
    And = 0x91,
    Or = 0x92,
    Xor = 0x93,
    /// Byte-wise equality.
    Equal = 0x97,
    NotEqual = 0x98,

    // =========================================================================
    // Arithmetic
    // =========================================================================
    Sign = 0x99,
    Abs = 0x9A,
    Negate = 0x9B,
    Inc = 0x9C,
    Dec = 0x9D,
    Add = 0x9E,
    Sub = 0x9F,
    Mul = 0xA0,
    Div = 0xA1,
    Mod = 0xA2,
    Pow = 0xA3,
    Sqrt = 0xA4,
    Shl = 0xA8,
    Shr = 0xA9,
    /// Boolean negation.
    Not = 0xAA,
    BoolAnd = 0xAB,
    BoolOr = 0xAC,
    /// Non-zero test.
    Nz = 0xB1,
    NumEqual = 0xB3,
    NumNotEqual = 0xB4,
    Lt = 0xB5,
    Le = 0xB6,
    Gt = 0xB7,
    Ge = 0xB8,
    Min = 0xB9,
    Max = 0xBA,
    Within = 0xBB,

    // =========================================================================
    // Compound types
    // =========================================================================
    /// Pop count then items into a new map (key/value pairs).
    PackMap = 0xBE,
    PackStruct = 0xBF,
    /// Pop count then items into a new array.
    Pack = 0xC0,
    Unpack = 0xC1,
    NewArray0 = 0xC2,
    /// Pop count, push an array of nulls.
    NewArray = 0xC3,
    NewStruct0 = 0xC5,
    NewStruct = 0xC6,
    NewMap = 0xC8,
    /// Item count of a collection or byte string.
    Size = 0xCA,
    /// Whether a map holds a key.
    HasKey = 0xCB,
    Keys = 0xCC,
    Values = 0xCD,
    /// Load an element (collection, index).
    PickItem = 0xCE,
    Append = 0xCF,
    /// Store an element (collection, index, value).
    SetItem = 0xD0,
    ReverseItems = 0xD1,
    Remove = 0xD2,
    ClearItems = 0xD3,

    // =========================================================================
    // Types
    // =========================================================================
    IsNull = 0xD8,
    IsType = 0xD9,
    /// Convert the top item to another stack-item type (1-byte type code).
    Convert = 0xDB,
}

impl OpCode {
    /// Fixed operand width in bytes. `PushData1/2/4` carry a variable
    /// payload on top of the returned prefix width.
    pub fn operand_len(self) -> usize {
        use OpCode::*;
        match self {
            PushInt8 | Jmp | JmpIf | JmpIfNot | JmpEq | JmpNe | JmpGt | JmpGe | JmpLt | JmpLe
            | Call | InitSSlot | LdSFld | StSFld | LdLoc | StLoc | LdArg | StArg | IsType
            | Convert | PushData1 => 1,
            PushInt16 | InitSlot | CallT | PushData2 => 2,
            PushInt32 | JmpL | JmpIfL | JmpIfNotL | JmpEqL | JmpNeL | JmpGtL | JmpGeL | JmpLtL
            | JmpLeL | CallL | Syscall | PushData4 => 4,
            PushInt64 => 8,
            PushInt128 => 16,
            PushInt256 => 32,
            _ => 0,
        }
    }

    /// The direct-slot opcode for index 0..=6, or `None` when the
    /// 1-byte-operand form is needed.
    pub fn direct_slot(base: OpCode, index: u32) -> Option<OpCode> {
        if index > 6 {
            return None;
        }
        let raw: u8 = base.into();
        OpCode::try_from(raw - 7 + index as u8).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_values_are_loader_compatible() {
        assert_eq!(u8::from(OpCode::PushInt8), 0x00);
        assert_eq!(u8::from(OpCode::Push0), 0x10);
        assert_eq!(u8::from(OpCode::Ret), 0x40);
        assert_eq!(u8::from(OpCode::Syscall), 0x41);
        assert_eq!(u8::from(OpCode::InitSlot), 0x57);
        assert_eq!(u8::from(OpCode::Pack), 0xC0);
        assert_eq!(u8::from(OpCode::Convert), 0xDB);
    }

    #[test]
    fn round_trip_from_byte() {
        assert_eq!(OpCode::try_from(0x9E), Ok(OpCode::Add));
        assert!(OpCode::try_from(0xFFu8).is_err());
    }

    #[test]
    fn direct_slot_lookup() {
        assert_eq!(
            OpCode::direct_slot(OpCode::LdLoc, 0),
            Some(OpCode::LdLoc0)
        );
        assert_eq!(
            OpCode::direct_slot(OpCode::StSFld, 6),
            Some(OpCode::StSFld6)
        );
        assert_eq!(OpCode::direct_slot(OpCode::LdArg, 7), None);
    }

    #[test]
    fn operand_lengths() {
        assert_eq!(OpCode::JmpL.operand_len(), 4);
        assert_eq!(OpCode::InitSlot.operand_len(), 2);
        assert_eq!(OpCode::Add.operand_len(), 0);
        assert_eq!(OpCode::PushInt128.operand_len(), 16);
    }
}
