#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use lockpair_ir::IrError;
use miette::Diagnostic;
use thiserror::Error;

/// Pipeline-ordering and input-contract violations. Any of these aborts the
/// construction of the unit being built.
#[derive(Debug, Error, Diagnostic)]
pub enum InstrumentError {
    #[error("entry point '{name}' has no implementation")]
    #[diagnostic(code(lockpair::missing_entry_point))]
    MissingEntryPoint { name: String },

    #[error("procedure '{name}' is not declared")]
    #[diagnostic(code(lockpair::unknown_procedure))]
    UnknownProcedure { name: String },

    #[error("lock '{lock}' is not declared in the program")]
    #[diagnostic(code(lockpair::unknown_lock))]
    UnknownLock { lock: String },

    #[error("entry point '{entry_point}' touches memory region '{region}' which was not declared for it")]
    #[diagnostic(code(lockpair::unknown_region))]
    UnknownRegion { entry_point: String, region: String },

    #[error("call to '{callee}' in '{procedure}' has no lock argument")]
    #[diagnostic(code(lockpair::malformed_lock_call))]
    MalformedLockCall { procedure: String, callee: String },

    #[error("entry point '{entry_point}' has not been through {stage} yet")]
    #[diagnostic(
        code(lockpair::not_instrumented),
        help("run lockset tracking and access instrumentation before pairing")
    )]
    NotInstrumented {
        entry_point: String,
        stage: &'static str,
    },

    #[error("entry point '{entry_point}' already went through {stage}")]
    #[diagnostic(code(lockpair::already_instrumented))]
    AlreadyInstrumented {
        entry_point: String,
        stage: &'static str,
    },

    #[error("call to '{callee}' in block '{block}' of '{unit}' has no preceding source location")]
    #[diagnostic(code(lockpair::missing_source_location))]
    MissingSourceLocation {
        unit: String,
        block: String,
        callee: String,
    },

    #[error("'{unit}' is not a paired analysis unit")]
    #[diagnostic(code(lockpair::not_paired))]
    NotPaired { unit: String },

    #[error("cannot remove '{name}': it is still referenced by '{unit}'")]
    #[diagnostic(code(lockpair::still_referenced))]
    StillReferenced { name: String, unit: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ir(#[from] IrError),
}
