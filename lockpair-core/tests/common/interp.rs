//! A tiny evaluator for instrumented straight-line code. Only the pieces the
//! instrumentation produces are modelled: boolean globals, lock identities,
//! `if-then-else` and calls into generated routines. Map stores are skipped.

use std::collections::BTreeMap;

use lockpair_ir::{AssignLhs, BinOp, CmdKind, Expr, Program, Terminator};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    /// A global that is not tracked as state, such as a lock.
    Sym(String),
}

#[derive(Clone, Debug, Default)]
pub struct Machine {
    pub globals: BTreeMap<String, bool>,
}

impl Machine {
    pub fn with_globals<'a>(names: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        Self {
            globals: names.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.globals.get(name).copied()
    }

    /// Runs `procedure` from its first block, calling `observe` after every
    /// top-level command.
    pub fn run(
        &mut self,
        program: &Program,
        procedure: &str,
        observe: &mut impl FnMut(&Machine),
    ) -> Result<(), String> {
        let observe: &mut dyn FnMut(&Machine) = observe;
        self.exec(program, procedure, BTreeMap::new(), Some(observe))
    }

    fn exec(
        &mut self,
        program: &Program,
        procedure: &str,
        mut locals: BTreeMap<String, Value>,
        mut observe: Option<&mut dyn FnMut(&Machine)>,
    ) -> Result<(), String> {
        let imp = program
            .implementation(procedure)
            .ok_or_else(|| format!("no implementation for `{procedure}`"))?;
        let mut block = imp.blocks.first().ok_or("empty implementation")?;

        loop {
            for cmd in &block.cmds {
                match &cmd.kind {
                    CmdKind::Assign { lhs, rhs } => {
                        let values: Vec<Value> = rhs
                            .iter()
                            .map(|e| self.eval(e, &locals))
                            .collect::<Result<_, _>>()?;
                        for (l, v) in lhs.iter().zip(values) {
                            let AssignLhs::Simple(name) = l else { continue };
                            match (self.globals.contains_key(name), v) {
                                (true, Value::Bool(b)) => {
                                    self.globals.insert(name.clone(), b);
                                }
                                (true, other) => return Err(format!("`{name}` := {other:?}")),
                                (false, v) => {
                                    locals.insert(name.clone(), v);
                                }
                            }
                        }
                    }
                    CmdKind::Call { callee, args, .. } => {
                        if let Some(callee_imp) = program.implementation(callee) {
                            let mut frame = BTreeMap::new();
                            for (p, a) in callee_imp.params.iter().zip(args) {
                                frame.insert(p.name.clone(), self.eval(a, &locals)?);
                            }
                            self.exec(program, callee, frame, None)?;
                        }
                    }
                    CmdKind::Assert(e) => {
                        if self.eval(e, &locals)? == Value::Bool(false) {
                            return Err(format!("assertion failed in `{procedure}`"));
                        }
                    }
                    CmdKind::Assume(_) | CmdKind::Havoc(_) => {}
                }
                if let Some(f) = observe.as_deref_mut() {
                    f(self);
                }
            }
            match &block.term {
                Terminator::Return => return Ok(()),
                Terminator::Goto(targets) => {
                    let target = targets.first().ok_or("goto without target")?;
                    block = imp
                        .block(target)
                        .ok_or_else(|| format!("no block `{target}`"))?;
                }
            }
        }
    }

    fn eval(&self, e: &Expr, locals: &BTreeMap<String, Value>) -> Result<Value, String> {
        Ok(match e {
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::Ident(n) => match (locals.get(n), self.globals.get(n)) {
                (Some(v), _) => v.clone(),
                (None, Some(b)) => Value::Bool(*b),
                (None, None) => Value::Sym(n.clone()),
            },
            Expr::Not(inner) => Value::Bool(!self.truth(inner, locals)?),
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::And => Value::Bool(self.truth(lhs, locals)? && self.truth(rhs, locals)?),
                BinOp::Or => Value::Bool(self.truth(lhs, locals)? || self.truth(rhs, locals)?),
                BinOp::Imp => Value::Bool(!self.truth(lhs, locals)? || self.truth(rhs, locals)?),
                BinOp::Eq => Value::Bool(self.eval(lhs, locals)? == self.eval(rhs, locals)?),
                BinOp::Ne => Value::Bool(self.eval(lhs, locals)? != self.eval(rhs, locals)?),
                other => return Err(format!("unsupported operator {other:?}")),
            },
            Expr::Ite { cond, then, els } => {
                if self.truth(cond, locals)? {
                    self.eval(then, locals)?
                } else {
                    self.eval(els, locals)?
                }
            }
            Expr::Select { .. } => Value::Int(0),
        })
    }

    fn truth(&self, e: &Expr, locals: &BTreeMap<String, Value>) -> Result<bool, String> {
        match self.eval(e, locals)? {
            Value::Bool(b) => Ok(b),
            other => Err(format!("expected a boolean, got {other:?}")),
        }
    }
}
