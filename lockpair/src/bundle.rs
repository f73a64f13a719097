#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use lockpair_core::SharedStateFacts;
use lockpair_ir::Program;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("bundle error: {message}")]
#[diagnostic(code(lockpair::bundle), help("a bundle is a JSON object with `program` and `facts`"))]
pub struct BundleError {
    pub message: String,
}

/// The unit of input: a program plus the shared-state facts computed for it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub program: Program,
    #[serde(default)]
    pub facts: SharedStateFacts,
}

pub fn read_bundle(path: &Path) -> Result<Bundle, BundleError> {
    let raw = fs::read_to_string(path).map_err(|e| BundleError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    serde_json::from_str(&raw).map_err(|e| BundleError {
        message: format!("failed to parse {}: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockpair_core::{EntryPointPair, Lock};
    use lockpair_ir::{GlobalVar, Type};

    #[test]
    fn reads_what_was_written() {
        let mut program = Program::new();
        program.add_decl(GlobalVar::new("dev_lock", Type::Ref));
        let bundle = Bundle {
            program,
            facts: SharedStateFacts {
                locks: vec![Lock::new("dev_lock")],
                pairs: vec![EntryPointPair::new("probe", "remove")],
                ..SharedStateFacts::default()
            },
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dev.json");
        fs::write(&path, serde_json::to_string_pretty(&bundle).expect("json")).expect("write");

        assert_eq!(read_bundle(&path).expect("read"), bundle);
    }

    #[test]
    fn facts_default_when_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dev.json");
        fs::write(&path, r#"{"program": {"decls": []}}"#).expect("write");
        let bundle = read_bundle(&path).expect("read");
        assert!(bundle.facts.pairs.is_empty());
    }

    #[test]
    fn malformed_json_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{").expect("write");
        let err = read_bundle(&path).unwrap_err();
        assert!(err.message.contains("broken.json"));
    }
}
