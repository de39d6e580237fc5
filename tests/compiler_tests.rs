//! End-to-end runs of the façade over the committed fixture contracts.

use std::fs;
use std::path::{Path, PathBuf};

use quill::{Compilation, Compiler, CompilerError, DebugInfo, NefError, NefFile, NotLoadedError};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn compile(name: &str) -> Compilation {
    Compiler::compile(&fixture(name), None, &[], false)
        .unwrap_or_else(|failure| panic!("{name} should compile:\n{}", failure.diagnostics))
}

#[test]
fn token_contract_produces_deployable_artifacts() {
    let compilation = compile("token.ql");
    let manifest = &compilation.artifacts.manifest;

    assert_eq!(manifest.name, "token");
    assert_eq!(manifest.supportedstandards, vec!["NEP-17"]);

    // Only entry points reach the ABI; helpers and the metadata
    // function stay internal.
    let names: Vec<&str> = manifest
        .abi
        .methods
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "symbol",
            "decimals",
            "totalSupply",
            "balanceOf",
            "transfer",
            "_deploy"
        ]
    );
    let safe: Vec<bool> = manifest.abi.methods.iter().map(|m| m.safe).collect();
    assert_eq!(safe, vec![true, true, true, true, false, false]);

    assert_eq!(manifest.abi.events.len(), 1);
    assert_eq!(manifest.abi.events[0].name, "Transfer");
    assert_eq!(manifest.abi.events[0].parameters.len(), 3);
    assert_eq!(manifest.abi.events[0].parameters[0].param_type, "Hash160");

    assert!(!compilation.artifacts.nef.script.is_empty());
    assert!(compilation.artifacts.nef.compiler.starts_with("quill v"));
}

#[test]
fn repeated_permission_declarations_merge_into_one_wildcard() {
    let compilation = compile("token.ql");
    let json: serde_json::Value =
        serde_json::from_str(&compilation.artifacts.manifest.to_json().unwrap()).unwrap();
    assert_eq!(
        json["permissions"],
        serde_json::json!([{"contract": "*", "methods": "*"}])
    );
    assert_eq!(json["extra"]["Author"], "quill developers");
    assert_eq!(json["extra"]["Email"], "dev@example.org");
}

#[test]
fn compilation_is_byte_for_byte_deterministic() {
    let first = compile("token.ql");
    let second = compile("token.ql");
    assert_eq!(
        first.artifacts.nef.serialize().unwrap(),
        second.artifacts.nef.serialize().unwrap()
    );
    assert_eq!(
        first.artifacts.manifest.to_json().unwrap(),
        second.artifacts.manifest.to_json().unwrap()
    );
}

#[test]
fn saved_artifacts_round_trip_through_deserialize() {
    let out = std::env::temp_dir().join(format!("quill-it-{}", std::process::id()));
    fs::create_dir_all(&out).unwrap();

    let saved = Compiler::compile_and_save(&fixture("token.ql"), &out, true, &[], false)
        .unwrap_or_else(|failure| panic!("token should compile:\n{}", failure.diagnostics));
    assert_eq!(saved.nef.file_name().unwrap(), "token.nef");
    assert_eq!(saved.manifest.file_name().unwrap(), "token.manifest.json");

    let bytes = fs::read(&saved.nef).unwrap();
    let parsed = NefFile::deserialize(&bytes).unwrap();
    assert_eq!(parsed, saved.compilation.artifacts.nef);

    let debug_path = saved.debug.expect("debug archive requested");
    let archive = fs::read(&debug_path).unwrap();
    assert_eq!(&archive[..2], &[0x1F, 0x8B]);
    let info = DebugInfo::from_archive(&archive).unwrap();
    assert!(info.methods.iter().any(|m| m.name == "transfer"));
}

#[test]
fn corrupted_container_fails_the_checksum() {
    let compilation = compile("token.ql");
    let mut bytes = compilation.artifacts.nef.serialize().unwrap();
    // Flip a script byte, leaving the stored checksum untouched.
    let index = bytes.len() - 8;
    bytes[index] ^= 0xFF;
    assert!(NefFile::deserialize(&bytes).is_err());
}

#[test]
fn a_length_prefix_past_the_input_is_reported_as_truncated() {
    // Magic, a zeroed compiler field, then a source string claiming to
    // be u64::MAX bytes long.
    let mut bytes = b"NEF3".to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    bytes.push(0xFF);
    bytes.extend_from_slice(&u64::MAX.to_le_bytes());
    assert!(matches!(
        NefFile::deserialize(&bytes),
        Err(NefError::Truncated { .. })
    ));
}

#[test]
fn an_inflated_token_count_is_reported_as_truncated() {
    let mut bytes = b"NEF3".to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    bytes.push(0x00); // empty source
    bytes.push(0x00); // reserved
    bytes.push(0xFE);
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    assert!(matches!(
        NefFile::deserialize(&bytes),
        Err(NefError::Truncated { .. })
    ));
}

#[test]
fn a_frame_overflowing_the_slot_limit_is_rejected() {
    let mut source = String::from("@public\ndef bloated() -> int:\n");
    for i in 0..300 {
        source.push_str(&format!("    v{i} = {i}\n"));
    }
    source.push_str("    return v299\n");

    let dir = std::env::temp_dir().join(format!("quill-slots-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let entry = dir.join("bloated.ql");
    fs::write(&entry, source).unwrap();

    let failure = Compiler::compile(&entry, None, &[], false).unwrap_err();
    assert_eq!(failure.error, NotLoadedError::CodegenFailure);
    assert!(failure.diagnostics.errors().iter().any(|e| matches!(
        &e.item,
        CompilerError::TooManySlots { count, .. } if *count == 300
    )));
}

#[test]
fn nef_checksum_is_a_double_sha256_prefix() {
    use sha2::{Digest, Sha256};

    let bytes = compile("token.ql").artifacts.nef.serialize().unwrap();
    let body = &bytes[..bytes.len() - 4];
    let digest = Sha256::digest(Sha256::digest(body));
    assert_eq!(&bytes[bytes.len() - 4..], &digest[..4]);
}

#[test]
fn a_contract_without_entry_points_is_refused() {
    let failure = Compiler::compile(&fixture("no_entry.ql"), None, &[], false).unwrap_err();
    assert_eq!(failure.error, NotLoadedError::EmptyScript);
}

#[test]
fn declared_standard_is_checked_for_completeness() {
    let failure = Compiler::compile(&fixture("missing_transfer.ql"), None, &[], false).unwrap_err();
    assert_eq!(failure.error, NotLoadedError::AnalysisFailure);
    assert!(failure.diagnostics.errors().iter().any(|e| matches!(
        &e.item,
        CompilerError::MissingStandardDefinition { standard, member, .. }
            if standard == "NEP-17" && member == "transfer"
    )));
}

#[test]
fn circular_imports_are_reported() {
    let failure = Compiler::compile(&fixture("cycle_a.ql"), None, &[], false).unwrap_err();
    assert_eq!(failure.error, NotLoadedError::AnalysisFailure);
    assert!(failure.diagnostics.errors().iter().any(|e| matches!(
        &e.item,
        CompilerError::CircularImport { file, .. } if file == "cycle_a.ql"
    )));
}

#[test]
fn a_local_reassigned_across_types_still_compiles() {
    let compilation = compile("any_slot.ql");
    assert!(!compilation.artifacts.nef.script.is_empty());
}

#[test]
fn best_effort_analysis_reports_every_error() {
    let failure = Compiler::compile(&fixture("errors.ql"), None, &[], false).unwrap_err();
    let errors = failure.diagnostics.errors();
    assert!(errors
        .iter()
        .any(|e| matches!(e.item, CompilerError::MismatchedTypes { .. })));
    assert!(errors
        .iter()
        .any(|e| matches!(e.item, CompilerError::UnresolvedReference { .. })));
    assert!(errors
        .iter()
        .any(|e| matches!(e.item, CompilerError::DuplicatedIdentifier { .. })));
}

#[test]
fn fail_fast_stops_at_the_first_error() {
    let failure = Compiler::compile(&fixture("errors.ql"), None, &[], true).unwrap_err();
    assert_eq!(failure.diagnostics.errors().len(), 1);
}

#[test]
fn compile_time_environment_folds_into_the_script() {
    let env = [("network".to_string(), "testnet".to_string())];
    let compilation = Compiler::compile(&fixture("config.ql"), None, &env, false)
        .unwrap_or_else(|failure| panic!("config should compile:\n{}", failure.diagnostics));
    let script = &compilation.artifacts.nef.script;
    assert!(script.windows(7).any(|w| w == b"testnet"));
}

#[test]
fn a_missing_entry_file_is_an_io_failure() {
    let failure =
        Compiler::compile(Path::new("/nonexistent/contract.ql"), None, &[], false).unwrap_err();
    assert!(matches!(failure.error, NotLoadedError::Io(_)));
}
