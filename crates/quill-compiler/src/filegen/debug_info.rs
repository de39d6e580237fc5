//! The optional debug archive.
//!
//! A gzip-compressed JSON document mapping emitted bytecode ranges back
//! to source positions and slot names. Written next to the NEF only when
//! the caller asks for it; deployment never depends on it.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use quill_core::CompilerError;
use serde::{Deserialize, Serialize};

use crate::codegen::GeneratedScript;
use crate::context::CompilationContext;

/// One `offset:line:col` bytecode-to-source mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePoint {
    pub offset: usize,
    pub line: u32,
    pub col: u32,
}

/// Debug entry for one emitted method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugMethodInfo {
    pub name: String,
    /// Inclusive start of the method's bytecode range.
    pub start: usize,
    /// Exclusive end of the method's bytecode range.
    pub end: usize,
    /// `name,type` pairs in argument-slot order.
    pub params: Vec<String>,
    /// `name,type` pairs in local-slot order.
    pub variables: Vec<String>,
    #[serde(rename = "return")]
    pub return_type: String,
    #[serde(rename = "sequence-points")]
    pub sequence_points: Vec<SequencePoint>,
}

/// The whole debug document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Source files referenced by the methods; index 0 is the entry file.
    pub documents: Vec<String>,
    pub methods: Vec<DebugMethodInfo>,
}

impl DebugInfo {
    /// Assemble the document from the generator's span map.
    pub fn build(ctx: &CompilationContext, generated: &GeneratedScript) -> DebugInfo {
        let methods = generated
            .debug_methods
            .iter()
            .map(|m| DebugMethodInfo {
                name: m.name.clone(),
                start: m.start,
                end: m.end,
                params: m
                    .params
                    .iter()
                    .map(|(name, ty)| format!("{name},{ty}"))
                    .collect(),
                variables: m
                    .locals
                    .iter()
                    .map(|(name, ty)| format!("{name},{ty}"))
                    .collect(),
                return_type: m.return_type.clone(),
                sequence_points: generated
                    .spans
                    .iter()
                    .filter(|(offset, _)| *offset >= m.start && *offset < m.end)
                    .map(|(offset, span)| SequencePoint {
                        offset: *offset,
                        line: span.line,
                        col: span.col,
                    })
                    .collect(),
            })
            .collect();
        DebugInfo {
            documents: vec![ctx.entry_file.display().to_string()],
            methods,
        }
    }

    /// Serialize and gzip-compress for the `.nefdbgnfo` side-car.
    pub fn to_archive(&self) -> Result<Vec<u8>, CompilerError> {
        let json = serde_json::to_vec(self).map_err(|e| CompilerError::InternalError {
            cause: format!("debug info serialization: {e}"),
        })?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .and_then(|_| encoder.finish())
            .map_err(|e| CompilerError::InternalError {
                cause: format!("debug info compression: {e}"),
            })
    }

    /// Read back a compressed archive, for tooling and tests.
    pub fn from_archive(data: &[u8]) -> Result<DebugInfo, CompilerError> {
        let mut decoder = GzDecoder::new(data);
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(|e| CompilerError::InternalError {
                cause: format!("debug info decompression: {e}"),
            })?;
        serde_json::from_slice(&json).map_err(|e| CompilerError::InternalError {
            cause: format!("debug info parse: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Span;
    use rustc_hash::FxHashMap;
    use std::path::PathBuf;

    use crate::codegen::DebugMethod;

    fn sample() -> DebugInfo {
        let ctx = CompilationContext::new(
            PathBuf::from("/virtual/token.ql"),
            PathBuf::from("/virtual"),
            FxHashMap::default(),
            false,
        );
        let generated = GeneratedScript {
            script: vec![0x10, 0x40, 0x11, 0x40],
            methods: Vec::new(),
            tokens: Vec::new(),
            spans: vec![
                (0, Span::new(2, 5, 1)),
                (1, Span::new(2, 5, 1)),
                (2, Span::new(5, 5, 1)),
                (3, Span::new(5, 5, 1)),
            ],
            debug_methods: vec![
                DebugMethod {
                    name: "first".to_string(),
                    start: 0,
                    end: 2,
                    params: vec![("a".to_string(), "int".to_string())],
                    locals: Vec::new(),
                    return_type: "int".to_string(),
                },
                DebugMethod {
                    name: "second".to_string(),
                    start: 2,
                    end: 4,
                    params: Vec::new(),
                    locals: vec![("x".to_string(), "str".to_string())],
                    return_type: "None".to_string(),
                },
            ],
        };
        DebugInfo::build(&ctx, &generated)
    }

    #[test]
    fn sequence_points_split_by_method_range() {
        let info = sample();
        assert_eq!(info.methods.len(), 2);
        assert_eq!(info.methods[0].sequence_points.len(), 2);
        assert_eq!(info.methods[1].sequence_points.len(), 2);
        assert_eq!(info.methods[0].sequence_points[0].line, 2);
        assert_eq!(info.methods[1].sequence_points[0].offset, 2);
        assert_eq!(info.methods[0].params, vec!["a,int".to_string()]);
        assert_eq!(info.methods[1].variables, vec!["x,str".to_string()]);
    }

    #[test]
    fn archive_round_trips_through_gzip() {
        let info = sample();
        let bytes = info.to_archive().unwrap();
        // Gzip magic.
        assert_eq!(&bytes[..2], &[0x1F, 0x8B]);
        let back = DebugInfo::from_archive(&bytes).unwrap();
        assert_eq!(back, info);
    }
}
