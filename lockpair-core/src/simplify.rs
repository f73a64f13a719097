#![forbid(unsafe_code)]

use lockpair_ir::{AssignLhs, CmdKind, Expr, Implementation};
use tracing::{debug, info};

use crate::AnalysisContext;

const EXCEPTION_FLAG: &str = "$exn";

/// Front-end noise removal run before instrumentation.
pub struct ProgramSimplifier<'a> {
    ac: &'a mut AnalysisContext,
}

impl<'a> ProgramSimplifier<'a> {
    pub fn new(ac: &'a mut AnalysisContext) -> Self {
        Self { ac }
    }

    /// Returns the number of commands removed.
    pub fn run(self) -> usize {
        let ignored = &self.ac.options.ignored_calls;
        let mut removed = 0;
        for imp in self.ac.program.implementations_mut() {
            let n = simplify_implementation(imp, ignored);
            if n > 0 {
                debug!(implementation = %imp.name, removed = n, "simplified");
            }
            removed += n;
        }
        info!(removed, "program simplification done");
        removed
    }
}

fn simplify_implementation(imp: &mut Implementation, ignored: &[String]) -> usize {
    let mut removed = 0;
    for block in imp.blocks.iter_mut() {
        let before = block.cmds.len();
        block.cmds.retain(|c| match &c.kind {
            CmdKind::Assume(Expr::Bool(true)) => !c.attrs.is_empty(),
            CmdKind::Call { callee, .. } => !ignored.iter().any(|i| i == callee),
            CmdKind::Assign { lhs, .. } => {
                !matches!(lhs.as_slice(), [AssignLhs::Simple(name)] if name == EXCEPTION_FLAG)
            }
            _ => true,
        });
        removed += before - block.cmds.len();
    }

    let mut still_used = false;
    for cmd in imp.cmds() {
        cmd.for_each_ident(&mut |n| still_used |= n == EXCEPTION_FLAG);
    }
    if !still_used {
        imp.locals.retain(|v| v.name != EXCEPTION_FLAG);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PipelineOptions, SharedStateFacts};
    use lockpair_ir::{
        AttrValue, Attributes, Block, Cmd, Procedure, Program, Terminator, Type, Variable,
        validate_program,
    };

    fn program(cmds: Vec<Cmd>) -> AnalysisContext {
        let mut p = Program::new();
        p.add_decl(Procedure::new("boogie_si_record_int", vec![Variable::new("i", Type::Int)]));
        p.add_decl(Procedure::new("f", Vec::new()));
        let mut imp = Implementation::new("f", Vec::new(), vec![Block::new("entry", cmds, Terminator::Return)]);
        imp.locals = vec![Variable::new("$exn", Type::Bool), Variable::new("x", Type::Int)];
        p.add_decl(imp);
        AnalysisContext::new(p, SharedStateFacts::default(), PipelineOptions::default())
    }

    #[test]
    fn removes_front_end_noise() {
        let keep = Cmd::marker(Attributes::new().with("sourceloc", vec![AttrValue::Str("a.c".into())]));
        let assign = Cmd::assign(AssignLhs::Simple("x".into()), Expr::Int(1));
        let mut ac = program(vec![
            Cmd::assume(Expr::Bool(true)),
            keep.clone(),
            Cmd::call("boogie_si_record_int", vec![Expr::ident("x")]),
            Cmd::assign(AssignLhs::Simple("$exn".into()), Expr::Bool(false)),
            assign.clone(),
        ]);
        let removed = ProgramSimplifier::new(&mut ac).run();
        assert_eq!(removed, 3);

        let imp = ac.program.implementation("f").unwrap();
        assert_eq!(imp.blocks[0].cmds, vec![keep, assign]);
        assert!(!imp.is_local("$exn"));
        assert_eq!(validate_program(&ac.program), Ok(()));
    }

    #[test]
    fn exception_local_kept_while_read() {
        let mut ac = program(vec![
            Cmd::assign(AssignLhs::Simple("$exn".into()), Expr::Bool(false)),
            Cmd::assume(Expr::ident("$exn")),
        ]);
        ProgramSimplifier::new(&mut ac).run();
        assert!(ac.program.implementation("f").unwrap().is_local("$exn"));
    }
}
