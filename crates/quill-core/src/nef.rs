//! The NEF executable container.
//!
//! Layout, bit-exact for the target VM's loader:
//!
//! ```text
//! magic      u32 LE        "NEF3"
//! compiler   64 bytes      UTF-8, zero padded
//! source     var string    origin URL, may be empty
//! reserve    u8            0
//! tokens     var int + n * method token
//! reserve    u16 LE        0
//! script     var bytes
//! checksum   u32 LE        first 4 bytes of double SHA-256 of the above
//! ```
//!
//! The checksum is recomputed on deserialization and must match.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// `NEF3` in little-endian byte order.
pub const MAGIC: u32 = 0x3346_454E;

/// Fixed width of the compiler-name field.
pub const COMPILER_FIELD_SIZE: usize = 64;

/// Maximum script size the loader accepts.
pub const MAX_SCRIPT_LENGTH: usize = 512 * 1024;

/// Errors raised while reading or writing a container.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NefError {
    #[error("invalid magic: expected {MAGIC:#x}, found {found:#x}")]
    InvalidMagic { found: u32 },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("unexpected end of data while reading {context}")]
    Truncated { context: &'static str },

    #[error("compiler name exceeds {COMPILER_FIELD_SIZE} bytes")]
    CompilerNameTooLong,

    #[error("script is empty or exceeds {MAX_SCRIPT_LENGTH} bytes")]
    BadScriptLength,

    #[error("field {context} is not valid UTF-8")]
    InvalidUtf8 { context: &'static str },

    #[error("reserved field holds a non-zero value")]
    ReservedNotZero,
}

/// A reference to a native/interop method callable through `CALLT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodToken {
    /// Script hash of the called contract.
    pub hash: [u8; 20],
    /// Method name.
    pub method: String,
    /// Declared parameter count.
    pub params_count: u16,
    /// Whether the method pushes a return value.
    pub has_return: bool,
    /// Call flags forwarded to the VM.
    pub call_flags: u8,
}

/// A parsed or to-be-written NEF container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NefFile {
    /// Compiler name and version, at most 64 bytes.
    pub compiler: String,
    /// Source URL; empty when unset.
    pub source: String,
    /// External call tokens referenced by `CALLT` sites.
    pub tokens: Vec<MethodToken>,
    /// The bytecode.
    pub script: Vec<u8>,
}

impl NefFile {
    /// Build a container around a compiled script.
    pub fn new(compiler: impl Into<String>, script: Vec<u8>, tokens: Vec<MethodToken>) -> Self {
        Self {
            compiler: compiler.into(),
            source: String::new(),
            tokens,
            script,
        }
    }

    /// Serialize to bytes, appending the computed checksum.
    pub fn serialize(&self) -> Result<Vec<u8>, NefError> {
        if self.compiler.len() > COMPILER_FIELD_SIZE {
            return Err(NefError::CompilerNameTooLong);
        }
        if self.script.is_empty() || self.script.len() > MAX_SCRIPT_LENGTH {
            return Err(NefError::BadScriptLength);
        }

        let mut w = Vec::with_capacity(self.script.len() + 128);
        w.extend_from_slice(&MAGIC.to_le_bytes());

        let mut compiler = [0u8; COMPILER_FIELD_SIZE];
        compiler[..self.compiler.len()].copy_from_slice(self.compiler.as_bytes());
        w.extend_from_slice(&compiler);

        write_var_bytes(&mut w, self.source.as_bytes());
        w.push(0); // reserved

        write_var_int(&mut w, self.tokens.len() as u64);
        for token in &self.tokens {
            w.extend_from_slice(&token.hash);
            write_var_bytes(&mut w, token.method.as_bytes());
            w.extend_from_slice(&token.params_count.to_le_bytes());
            w.push(token.has_return as u8);
            w.push(token.call_flags);
        }
        w.extend_from_slice(&0u16.to_le_bytes()); // reserved

        write_var_bytes(&mut w, &self.script);

        let checksum = compute_checksum(&w);
        w.extend_from_slice(&checksum.to_le_bytes());
        Ok(w)
    }

    /// Parse a container, validating magic and checksum.
    pub fn deserialize(data: &[u8]) -> Result<NefFile, NefError> {
        let mut r = Reader::new(data);

        let magic = r.read_u32("magic")?;
        if magic != MAGIC {
            return Err(NefError::InvalidMagic { found: magic });
        }

        let compiler_raw = r.read_exact(COMPILER_FIELD_SIZE, "compiler")?;
        let end = compiler_raw
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMPILER_FIELD_SIZE);
        let compiler = std::str::from_utf8(&compiler_raw[..end])
            .map_err(|_| NefError::InvalidUtf8 { context: "compiler" })?
            .to_string();

        let source_raw = r.read_var_bytes("source")?;
        let source = String::from_utf8(source_raw)
            .map_err(|_| NefError::InvalidUtf8 { context: "source" })?;

        if r.read_u8("reserved")? != 0 {
            return Err(NefError::ReservedNotZero);
        }

        let token_count = r.read_var_int("tokens")? as usize;
        // A serialized token takes at least 25 bytes, so an honest count
        // never exceeds the remaining input.
        if token_count > r.remaining() / 25 {
            return Err(NefError::Truncated { context: "tokens" });
        }
        let mut tokens = Vec::with_capacity(token_count);
        for _ in 0..token_count {
            let hash_raw = r.read_exact(20, "token hash")?;
            let mut hash = [0u8; 20];
            hash.copy_from_slice(hash_raw);
            let method = String::from_utf8(r.read_var_bytes("token method")?)
                .map_err(|_| NefError::InvalidUtf8 { context: "token method" })?;
            let params_count = r.read_u16("token params")?;
            let has_return = r.read_u8("token return")? != 0;
            let call_flags = r.read_u8("token flags")?;
            tokens.push(MethodToken {
                hash,
                method,
                params_count,
                has_return,
                call_flags,
            });
        }

        if r.read_u16("reserved")? != 0 {
            return Err(NefError::ReservedNotZero);
        }

        let script = r.read_var_bytes("script")?;
        if script.is_empty() || script.len() > MAX_SCRIPT_LENGTH {
            return Err(NefError::BadScriptLength);
        }

        let body_len = r.position();
        let stored = r.read_u32("checksum")?;
        let computed = compute_checksum(&data[..body_len]);
        if stored != computed {
            return Err(NefError::ChecksumMismatch { stored, computed });
        }

        Ok(NefFile {
            compiler,
            source,
            tokens,
            script,
        })
    }
}

/// First 4 bytes of double SHA-256, as a little-endian u32.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    u32::from_le_bytes([second[0], second[1], second[2], second[3]])
}

fn write_var_int(out: &mut Vec<u8>, value: u64) {
    if value < 0xFD {
        out.push(value as u8);
    } else if value <= 0xFFFF {
        out.push(0xFD);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xFFFF_FFFF {
        out.push(0xFE);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xFF);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_var_int(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_exact(&mut self, len: usize, context: &'static str) -> Result<&'a [u8], NefError> {
        if len > self.remaining() {
            return Err(NefError::Truncated { context });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self, context: &'static str) -> Result<u8, NefError> {
        Ok(self.read_exact(1, context)?[0])
    }

    fn read_u16(&mut self, context: &'static str) -> Result<u16, NefError> {
        let raw = self.read_exact(2, context)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn read_u32(&mut self, context: &'static str) -> Result<u32, NefError> {
        let raw = self.read_exact(4, context)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_var_int(&mut self, context: &'static str) -> Result<u64, NefError> {
        let prefix = self.read_u8(context)?;
        Ok(match prefix {
            0xFD => self.read_u16(context)? as u64,
            0xFE => self.read_u32(context)? as u64,
            0xFF => {
                let raw = self.read_exact(8, context)?;
                u64::from_le_bytes([
                    raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
                ])
            }
            small => small as u64,
        })
    }

    fn read_var_bytes(&mut self, context: &'static str) -> Result<Vec<u8>, NefError> {
        let len = self.read_var_int(context)? as usize;
        Ok(self.read_exact(len, context)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NefFile {
        NefFile {
            compiler: "quill 0.1.0".to_string(),
            source: String::new(),
            tokens: vec![MethodToken {
                hash: [0xAB; 20],
                method: "transfer".to_string(),
                params_count: 4,
                has_return: true,
                call_flags: 0x0F,
            }],
            script: vec![0x10, 0x40],
        }
    }

    #[test]
    fn round_trip() {
        let nef = sample();
        let bytes = nef.serialize().unwrap();
        let parsed = NefFile::deserialize(&bytes).unwrap();
        assert_eq!(parsed, nef);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bytes = sample().serialize().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            NefFile::deserialize(&bytes),
            Err(NefError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_script_is_rejected() {
        let nef = sample();
        let mut bytes = nef.serialize().unwrap();
        // Flip a script byte; the stored checksum no longer matches.
        let script_byte = bytes.len() - 6;
        bytes[script_byte] ^= 0x01;
        assert!(matches!(
            NefFile::deserialize(&bytes),
            Err(NefError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = sample().serialize().unwrap();
        bytes[0] = 0x00;
        assert!(matches!(
            NefFile::deserialize(&bytes),
            Err(NefError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn empty_script_is_rejected() {
        let nef = NefFile::new("quill", Vec::new(), Vec::new());
        assert_eq!(nef.serialize(), Err(NefError::BadScriptLength));
    }

    #[test]
    fn oversized_compiler_name_is_rejected() {
        let nef = NefFile::new("x".repeat(65), vec![0x40], Vec::new());
        assert_eq!(nef.serialize(), Err(NefError::CompilerNameTooLong));
    }

    #[test]
    fn serialization_is_deterministic() {
        let a = sample().serialize().unwrap();
        let b = sample().serialize().unwrap();
        assert_eq!(a, b);
    }
}
