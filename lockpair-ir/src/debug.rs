#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{AttrValue, Attributes, Cmd};

/// Attribute key of the raw debug carriers emitted by the front end.
pub const SOURCELOC: &str = "sourceloc";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: String,
    /// 1-based line number
    pub line: i64,
    /// 1-based column number
    pub column: i64,
}

impl SourceLoc {
    pub fn new(file: impl Into<String>, line: i64, column: i64) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Reads a `{:sourceloc "file", line, column}` attribute. Anything else
    /// (missing key, wrong arity, non-integer position) yields `None`.
    pub fn from_attrs(attrs: &Attributes) -> Option<Self> {
        let [file, line, column] = attrs.get(SOURCELOC)? else {
            return None;
        };
        let file = match file {
            AttrValue::Str(s) => s.clone(),
            _ => return None,
        };
        let (AttrValue::Int(line), AttrValue::Int(column)) = (line, column) else {
            return None;
        };
        Some(Self::new(file, *line, *column))
    }

    /// The raw carrier: `assume {:sourceloc "file", line, column} true;`.
    pub fn carrier(&self) -> Cmd {
        Cmd::marker(Attributes::new().with(
            SOURCELOC,
            vec![
                AttrValue::Str(self.file.clone()),
                AttrValue::Int(self.line),
                AttrValue::Int(self.column),
            ],
        ))
    }

    /// Line/column attributes placed on instrumented calls.
    pub fn position_attrs(&self) -> Attributes {
        Attributes::new()
            .with("line", vec![AttrValue::Int(self.line)])
            .with("column", vec![AttrValue::Int(self.column)])
    }
}

/// True for `assume` commands whose leading attribute is a source location carrier.
pub fn is_sourceloc_carrier(cmd: &Cmd) -> bool {
    matches!(cmd.kind, crate::CmdKind::Assume(_)) && cmd.attrs.first_key() == Some(SOURCELOC)
}
