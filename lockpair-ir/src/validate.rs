#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::collections::BTreeSet;

use miette::Diagnostic;
use thiserror::Error;

use crate::{Cmd, CmdKind, Decl, Expr, Implementation, Procedure, Program, Terminator};

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
#[error("invalid program: {message}")]
#[diagnostic(code(lockpair::ir))]
pub struct IrError {
    pub message: String,
}

impl IrError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Structural well-formedness: every reference a declaration makes resolves
/// to something the program declares.
pub fn validate_program(program: &Program) -> Result<(), IrError> {
    let mut seen_vars: BTreeSet<&str> = BTreeSet::new();
    let mut seen_procs: BTreeSet<&str> = BTreeSet::new();
    let mut seen_impls: BTreeSet<&str> = BTreeSet::new();
    for d in &program.decls {
        let fresh = match d {
            Decl::Global(_) | Decl::Constant(_) => seen_vars.insert(d.name()),
            Decl::Procedure(_) => seen_procs.insert(d.name()),
            Decl::Implementation(_) => seen_impls.insert(d.name()),
        };
        if !fresh {
            return Err(IrError::new(format!("duplicate declaration '{}'", d.name())));
        }
    }

    for p in program.procedures() {
        validate_procedure(program, p)?;
    }
    for i in program.implementations() {
        validate_implementation(program, i)?;
    }
    Ok(())
}

fn validate_procedure(program: &Program, p: &Procedure) -> Result<(), IrError> {
    for m in &p.modifies {
        if program.global(m).is_none() {
            return Err(IrError::new(format!(
                "procedure '{}' modifies undeclared global '{m}'",
                p.name
            )));
        }
    }
    let is_param = |n: &str| p.params.iter().chain(&p.returns).any(|v| v.name == n);
    for e in p.requires.iter().chain(&p.ensures) {
        check_expr(program, e, &is_param, &p.name)?;
    }
    Ok(())
}

fn validate_implementation(program: &Program, i: &Implementation) -> Result<(), IrError> {
    let Some(proc) = program.procedure(&i.name) else {
        return Err(IrError::new(format!(
            "implementation '{}' has no procedure declaration",
            i.name
        )));
    };
    if proc.params.len() != i.params.len() {
        return Err(IrError::new(format!(
            "implementation '{}' has {} parameters but its procedure declares {}",
            i.name,
            i.params.len(),
            proc.params.len()
        )));
    }
    if i.blocks.is_empty() {
        return Err(IrError::new(format!("implementation '{}' has no blocks", i.name)));
    }

    let mut labels: BTreeSet<&str> = BTreeSet::new();
    for b in &i.blocks {
        if !labels.insert(&b.label) {
            return Err(IrError::new(format!(
                "implementation '{}' has duplicate block label '{}'",
                i.name, b.label
            )));
        }
    }

    let is_local = |n: &str| i.is_local(n);
    for b in &i.blocks {
        for c in &b.cmds {
            validate_cmd(program, i, c, &is_local)?;
        }
        if let Terminator::Goto(targets) = &b.term {
            for t in targets {
                if !labels.contains(t.as_str()) {
                    return Err(IrError::new(format!(
                        "implementation '{}' block '{}' jumps to missing block '{t}'",
                        i.name, b.label
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_cmd(
    program: &Program,
    i: &Implementation,
    c: &Cmd,
    is_local: &impl Fn(&str) -> bool,
) -> Result<(), IrError> {
    if let CmdKind::Call { callee, args, .. } = &c.kind {
        let Some(target) = program.procedure(callee) else {
            return Err(IrError::new(format!(
                "implementation '{}' calls undeclared procedure '{callee}'",
                i.name
            )));
        };
        if target.params.len() != args.len() {
            return Err(IrError::new(format!(
                "implementation '{}' calls '{callee}' with {} arguments, expected {}",
                i.name,
                args.len(),
                target.params.len()
            )));
        }
    }

    let mut missing: Option<String> = None;
    c.for_each_ident(&mut |n| {
        if missing.is_none() && !is_local(n) && !program.has_global_symbol(n) {
            missing = Some(n.to_string());
        }
    });
    match missing {
        Some(n) => Err(IrError::new(format!(
            "implementation '{}' references undeclared name '{n}'",
            i.name
        ))),
        None => Ok(()),
    }
}

fn check_expr(
    program: &Program,
    e: &Expr,
    is_param: &impl Fn(&str) -> bool,
    owner: &str,
) -> Result<(), IrError> {
    let mut missing: Option<String> = None;
    e.for_each_ident(&mut |n| {
        if missing.is_none() && !is_param(n) && !program.has_global_symbol(n) {
            missing = Some(n.to_string());
        }
    });
    match missing {
        Some(n) => Err(IrError::new(format!(
            "contract of '{owner}' references undeclared name '{n}'"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Block, GlobalVar, Type, Variable};

    fn with_body(cmds: Vec<Cmd>) -> Program {
        let mut p = Program::new();
        p.add_decl(GlobalVar::new("g", Type::Bool));
        p.add_decl(Procedure::new("f", vec![Variable::new("x", Type::Int)]));
        p.add_decl(Implementation::new(
            "f",
            vec![Variable::new("x", Type::Int)],
            vec![Block::new("entry", cmds, Terminator::Return)],
        ));
        p
    }

    #[test]
    fn accepts_resolved_references() {
        let p = with_body(vec![Cmd::assume(Expr::and(Expr::ident("g"), Expr::ident("x")))]);
        assert_eq!(validate_program(&p), Ok(()));
    }

    #[test]
    fn rejects_dangling_call() {
        let p = with_body(vec![Cmd::call("gone", Vec::new())]);
        let err = validate_program(&p).unwrap_err();
        assert!(err.message.contains("undeclared procedure 'gone'"), "{err}");
    }

    #[test]
    fn rejects_undeclared_identifier() {
        let p = with_body(vec![Cmd::assume(Expr::ident("h"))]);
        let err = validate_program(&p).unwrap_err();
        assert!(err.message.contains("'h'"), "{err}");
    }

    #[test]
    fn rejects_modifies_of_unknown_global() {
        let mut p = with_body(Vec::new());
        if let Some(proc) = p.procedure_mut("f") {
            proc.add_modifies("nope");
        }
        assert!(validate_program(&p).is_err());
    }
}
