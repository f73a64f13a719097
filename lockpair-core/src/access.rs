#![forbid(unsafe_code)]

use lockpair_ir::{
    AccessKind, AssignLhs, AttrValue, Attributes, Block, Cmd, CmdKind, Expr, Hook, Implementation,
    Procedure, Terminator, Variable,
};
use tracing::{debug, info};

use crate::{AnalysisContext, InstrumentError, SharedStateFacts, names};

/// A raw load or store of a memory region found in a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAccess {
    pub kind: AccessKind,
    pub region: String,
    pub index: Expr,
}

/// Region accesses performed by an assignment, loads before stores.
/// Any other command performs none.
pub fn raw_accesses(cmd: &Cmd, facts: &SharedStateFacts) -> Vec<RawAccess> {
    let CmdKind::Assign { lhs, rhs } = &cmd.kind else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for e in rhs {
        collect_loads(e, facts, &mut out);
    }
    for l in lhs {
        if let AssignLhs::Map { map, index } = l {
            collect_loads(index, facts, &mut out);
            if facts.is_region(map) {
                out.push(RawAccess {
                    kind: AccessKind::Write,
                    region: map.clone(),
                    index: index.clone(),
                });
            }
        }
    }
    out
}

fn collect_loads(e: &Expr, facts: &SharedStateFacts, out: &mut Vec<RawAccess>) {
    match e {
        Expr::Bool(_) | Expr::Int(_) | Expr::Ident(_) => {}
        Expr::Not(inner) => collect_loads(inner, facts, out),
        Expr::Binary { lhs, rhs, .. } => {
            collect_loads(lhs, facts, out);
            collect_loads(rhs, facts, out);
        }
        Expr::Select { map, index } => {
            collect_loads(index, facts, out);
            match map.as_ident() {
                Some(region) if facts.is_region(region) => out.push(RawAccess {
                    kind: AccessKind::Read,
                    region: region.to_string(),
                    index: (**index).clone(),
                }),
                _ => collect_loads(map, facts, out),
            }
        }
        Expr::Ite { cond, then, els } => {
            collect_loads(cond, facts, out);
            collect_loads(then, facts, out);
            collect_loads(els, facts, out);
        }
    }
}

/// Access interception for one lockset-tracked entry point.
pub struct AccessInstrumenter<'a> {
    ac: &'a mut AnalysisContext,
    entry_point: String,
}

impl<'a> AccessInstrumenter<'a> {
    pub fn new(ac: &'a mut AnalysisContext, entry_point: impl Into<String>) -> Self {
        Self {
            ac,
            entry_point: entry_point.into(),
        }
    }

    /// Returns the number of access calls inserted.
    pub fn run(mut self) -> Result<usize, InstrumentError> {
        let ep = self.entry_point.clone();
        let Some(region) = self.ac.instrumentation_region(&ep) else {
            return Err(InstrumentError::NotInstrumented {
                entry_point: ep,
                stage: "lockset tracking",
            });
        };
        if !region.lockset_done {
            return Err(InstrumentError::NotInstrumented {
                entry_point: ep,
                stage: "lockset tracking",
            });
        }
        if region.access_done {
            return Err(InstrumentError::AlreadyInstrumented {
                entry_point: ep,
                stage: "access instrumentation",
            });
        }
        let procedures = region.procedures.clone();

        let regions: Vec<String> = self.ac.facts.regions_of(&ep).map(str::to_string).collect();
        for r in &regions {
            self.ac.ensure_access_flag(&ep, r);
            for kind in AccessKind::ALL {
                self.add_access_routine(kind, r);
            }
        }

        let accessed = self.ac.accessed_regions(&ep)?;
        let mut inserted = 0;
        for name in &procedures {
            inserted += self.instrument_body(name);
        }

        for name in &procedures {
            let mut touched: Vec<String> = Vec::new();
            for r in accessed.get(name).into_iter().flatten() {
                if let Some(flag) = self.ac.access_flag(&ep, r) {
                    touched.push(flag.to_string());
                }
                touched.extend(self.ac.memory_locksets(&ep, r).into_iter().map(|v| v.name));
            }
            let Some(proc) = self.ac.program.procedure_mut(name) else {
                return Err(InstrumentError::UnknownProcedure { name: name.clone() });
            };
            for v in touched {
                proc.add_modifies(v);
            }
        }

        let flags: Vec<String> = regions
            .iter()
            .filter_map(|r| self.ac.access_flag(&ep, r).map(str::to_string))
            .collect();
        let Some(entry) = self.ac.program.procedure_mut(&ep) else {
            return Err(InstrumentError::UnknownProcedure { name: ep });
        };
        for flag in flags {
            entry.add_requires(Expr::not(Expr::ident(flag)));
        }

        if let Some(region) = self.ac.instrumentation_region_mut(&ep) {
            region.access_done = true;
        }
        info!(entry_point = %ep, regions = regions.len(), inserted, "access instrumentation done");
        Ok(inserted)
    }

    /// `_<KIND>_LS_<region>_$<ep>(ptr)`: narrows every recorded lockset of the
    /// region by the matching current lockset; a write also raises the
    /// region's access flag. A region no lock protects gets no narrowing.
    fn add_access_routine(&mut self, kind: AccessKind, region: &str) {
        let ep = &self.entry_point;
        let name = names::access_routine(kind, region, ep);
        if self.ac.program.procedure(&name).is_some() {
            return;
        }
        let params = vec![Variable::new("ptr", self.ac.region_index_type(region))];

        let mut modifies = Vec::new();
        let mut cmds = Vec::new();
        for ls in self.ac.memory_locksets(ep, region) {
            let cls = names::current_lockset(&ls.lock, ep);
            cmds.push(Cmd::assign(
                AssignLhs::Simple(ls.name.clone()),
                Expr::and(Expr::ident(cls), Expr::ident(ls.name.clone())),
            ));
            modifies.push(ls.name);
        }
        if kind == AccessKind::Write {
            if let Some(flag) = self.ac.access_flag(ep, region) {
                cmds.push(Cmd::assign(AssignLhs::Simple(flag.to_string()), Expr::Bool(true)));
                modifies.push(flag.to_string());
            }
        }

        let inline = Attributes::new().with("inline", vec![AttrValue::Int(1)]);
        let mut proc = Procedure::new(name.clone(), params.clone());
        proc.attrs = inline.clone();
        for m in modifies {
            proc.add_modifies(m);
        }
        let mut imp = Implementation::new(
            name.clone(),
            params,
            vec![Block::new(format!("_{}", kind.tag()), cmds, Terminator::Return)],
        );
        imp.attrs = inline;

        self.ac.program.add_decl(proc);
        self.ac.program.add_decl(imp);
        debug!(routine = %name, "added access routine");
    }

    /// One forward pass per block: each intercepted command is followed by
    /// its access calls, so commands after it keep their relative order.
    fn instrument_body(&mut self, procedure: &str) -> usize {
        let ep = &self.entry_point;
        let facts = &self.ac.facts;
        let Some(imp) = self.ac.program.implementation_mut(procedure) else {
            return 0;
        };

        let mut inserted = 0;
        for block in imp.blocks.iter_mut() {
            let old = std::mem::take(&mut block.cmds);
            let mut cmds = Vec::with_capacity(old.len());
            for cmd in old {
                let accesses = raw_accesses(&cmd, facts);
                cmds.push(cmd);
                for a in accesses {
                    let callee = names::access_routine(a.kind, &a.region, ep);
                    cmds.push(Cmd::hooked_call(
                        callee,
                        vec![a.index],
                        Hook::Access {
                            kind: a.kind,
                            region: a.region,
                        },
                    ));
                    inserted += 1;
                }
            }
            block.cmds = cmds;
        }
        if inserted > 0 {
            debug!(procedure, inserted, "intercepted region accesses");
        }
        inserted
    }
}
