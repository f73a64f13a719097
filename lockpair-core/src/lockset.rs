#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use lockpair_ir::{
    AssignLhs, AttrValue, Attributes, Block, Cmd, CmdKind, Expr, Hook, Implementation, Procedure,
    Role, Terminator, Type, Variable,
};
use tracing::{debug, info};

use crate::context::InstrumentationRegion;
use crate::{AnalysisContext, InstrumentError, names};

/// Lockset bookkeeping for one entry point.
///
/// Privatizes the helpers the entry point reaches, allocates its current and
/// recorded lockset flags, synthesizes the inlined update routine and rewrites
/// every lock primitive call in the region into a call to that routine.
pub struct LocksetTracker<'a> {
    ac: &'a mut AnalysisContext,
    entry_point: String,
}

impl<'a> LocksetTracker<'a> {
    pub fn new(ac: &'a mut AnalysisContext, entry_point: impl Into<String>) -> Self {
        Self {
            ac,
            entry_point: entry_point.into(),
        }
    }

    pub fn run(mut self) -> Result<(), InstrumentError> {
        let ep = self.entry_point.clone();
        if self
            .ac
            .instrumentation_region(&ep)
            .is_some_and(|r| r.lockset_done)
        {
            return Err(InstrumentError::AlreadyInstrumented {
                entry_point: ep,
                stage: "lockset tracking",
            });
        }
        if self.ac.program.implementation(&ep).is_none() {
            return Err(InstrumentError::MissingEntryPoint { name: ep });
        }
        self.check_declarations()?;

        let procedures = self.privatize_helpers()?;
        self.ac.insert_instrumentation_region(InstrumentationRegion {
            entry_point: ep.clone(),
            procedures: procedures.clone(),
            lockset_done: false,
            access_done: false,
        });

        let locks: Vec<String> = self.ac.facts.locks.iter().map(|l| l.name.clone()).collect();
        let regions: Vec<String> = self.ac.facts.regions_of(&ep).map(str::to_string).collect();
        for lock in &locks {
            self.ac.ensure_current_lockset(&ep, lock);
            for region in &regions {
                self.ac.ensure_memory_lockset(&ep, lock, region);
            }
        }

        self.add_update_routine();
        let mut rewritten = 0;
        for name in &procedures {
            rewritten += self.rewrite_lock_calls(name)?;
        }
        self.update_contracts(&procedures)?;

        if let Some(region) = self.ac.instrumentation_region_mut(&ep) {
            region.lockset_done = true;
        }
        info!(
            entry_point = %ep,
            locks = locks.len(),
            helpers = procedures.len() - 1,
            rewritten,
            "lockset tracking done"
        );
        Ok(())
    }

    fn check_declarations(&self) -> Result<(), InstrumentError> {
        for lock in &self.ac.facts.locks {
            if !self.ac.program.has_global_symbol(&lock.name) {
                return Err(InstrumentError::UnknownLock {
                    lock: lock.name.clone(),
                });
            }
        }
        for region in self.ac.facts.regions_of(&self.entry_point) {
            if !self.ac.facts.is_region(region) || self.ac.program.global(region).is_none() {
                return Err(InstrumentError::UnknownRegion {
                    entry_point: self.entry_point.clone(),
                    region: region.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Clones every helper reachable from the entry point as `<helper>$<ep>`
    /// and points the region's calls at the clones. Returns the region's
    /// procedures, entry point first.
    fn privatize_helpers(&mut self) -> Result<Vec<String>, InstrumentError> {
        let ep = self.entry_point.clone();
        let mut procedures = vec![ep.clone()];
        let mut private: BTreeMap<String, String> = BTreeMap::new();
        let mut worklist = vec![ep.clone()];

        while let Some(current) = worklist.pop() {
            let callees = self
                .ac
                .program
                .implementation(&current)
                .map(Implementation::callees)
                .unwrap_or_default();
            for callee in callees {
                if callee == ep
                    || private.contains_key(&callee)
                    || self.ac.options.is_lock_call(&callee)
                    || self.ac.options.is_unlock_call(&callee)
                {
                    continue;
                }
                let Some(imp) = self.ac.program.implementation(&callee).cloned() else {
                    continue;
                };
                let Some(proc) = self.ac.program.procedure(&callee).cloned() else {
                    return Err(InstrumentError::UnknownProcedure { name: callee });
                };

                let name = names::privatized(&callee, &ep);
                self.ac.program.add_decl(Procedure { name: name.clone(), ..proc });
                self.ac.program.add_decl(Implementation { name: name.clone(), ..imp });
                debug!(helper = %callee, private = %name, "privatized helper");

                private.insert(callee, name.clone());
                procedures.push(name.clone());
                worklist.push(name);
            }
        }

        for name in &procedures {
            let Some(imp) = self.ac.program.implementation_mut(name) else {
                continue;
            };
            for cmd in imp.cmds_mut() {
                if let CmdKind::Call { callee, .. } = &mut cmd.kind {
                    if let Some(target) = private.get(callee.as_str()) {
                        *callee = target.clone();
                    }
                }
            }
        }
        Ok(procedures)
    }

    /// `_UPDATE_CLS_$<ep>(lock, isLocked)`: every current-lockset flag whose
    /// lock matches takes the new state, the others keep theirs.
    fn add_update_routine(&mut self) {
        let ep = &self.entry_point;
        let name = names::update_routine(ep);
        if self.ac.program.procedure(&name).is_some() {
            return;
        }
        let params = vec![
            Variable::new("lock", self.ac.lock_type()),
            Variable::new("isLocked", Type::Bool),
        ];
        let cls = self.ac.current_locksets(ep);

        let cmds = cls
            .iter()
            .map(|v| {
                Cmd::assign(
                    AssignLhs::Simple(v.name.clone()),
                    Expr::ite(
                        Expr::eq(Expr::ident("lock"), Expr::ident(v.lock.clone())),
                        Expr::ident("isLocked"),
                        Expr::ident(v.name.clone()),
                    ),
                )
            })
            .collect();

        let inline = Attributes::new().with("inline", vec![AttrValue::Int(1)]);
        let mut proc = Procedure::new(name.clone(), params.clone());
        proc.attrs = inline.clone();
        for v in &cls {
            proc.add_modifies(v.name.clone());
        }
        let mut imp = Implementation::new(
            name.clone(),
            params,
            vec![Block::new("_UPDATE", cmds, Terminator::Return)],
        );
        imp.attrs = inline;

        self.ac.program.add_decl(proc);
        self.ac.program.add_decl(imp);
        debug!(routine = %name, "added lockset update routine");
    }

    fn rewrite_lock_calls(&mut self, procedure: &str) -> Result<usize, InstrumentError> {
        let update = names::update_routine(&self.entry_point);
        let options = &self.ac.options;
        let Some(imp) = self.ac.program.implementation_mut(procedure) else {
            return Ok(0);
        };

        let mut rewritten = 0;
        for cmd in imp.cmds_mut() {
            let CmdKind::Call { callee, args, .. } = &cmd.kind else {
                continue;
            };
            let acquire = if options.is_lock_call(callee) {
                true
            } else if options.is_unlock_call(callee) {
                false
            } else {
                continue;
            };
            let Some(lock) = args.first().cloned() else {
                return Err(InstrumentError::MalformedLockCall {
                    procedure: procedure.to_string(),
                    callee: callee.clone(),
                });
            };
            cmd.kind = CmdKind::Call {
                callee: update.clone(),
                args: vec![lock, Expr::Bool(acquire)],
                outs: Vec::new(),
                hook: Some(Hook::UpdateLockset),
                role: Role::Original,
            };
            rewritten += 1;
        }
        if rewritten > 0 {
            debug!(procedure, rewritten, "rewrote lock primitive calls");
        }
        Ok(rewritten)
    }

    /// Every region procedure may change the current lockset; procedures
    /// that reach a region also carry its recorded locksets. The entry point
    /// starts and ends with no lock held and starts with full recorded locksets.
    fn update_contracts(&mut self, procedures: &[String]) -> Result<(), InstrumentError> {
        let ep = self.entry_point.clone();
        let accessed = self.ac.accessed_regions(&ep)?;
        let cls = self.ac.current_locksets(&ep);

        for name in procedures {
            let touched: Vec<String> = accessed
                .get(name)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();
            let ls: Vec<String> = touched
                .iter()
                .flat_map(|r| self.ac.memory_locksets(&ep, r))
                .map(|v| v.name)
                .collect();
            let Some(proc) = self.ac.program.procedure_mut(name) else {
                return Err(InstrumentError::UnknownProcedure { name: name.clone() });
            };
            for v in &cls {
                proc.add_modifies(v.name.clone());
            }
            for v in ls {
                proc.add_modifies(v);
            }
        }

        let all_ls = self.ac.all_memory_locksets(&ep);
        let Some(entry) = self.ac.program.procedure_mut(&ep) else {
            return Err(InstrumentError::UnknownProcedure { name: ep });
        };
        for v in &cls {
            entry.add_requires(Expr::not(Expr::ident(v.name.clone())));
            entry.add_ensures(Expr::not(Expr::ident(v.name.clone())));
        }
        for v in all_ls {
            entry.add_requires(Expr::ident(v.name));
        }
        Ok(())
    }
}
