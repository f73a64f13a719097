#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use lockpair_ir::{
    AccessKind, AttrValue, Attributes, Block, Cmd, CmdKind, Expr, Hook, Implementation, Procedure,
    Program, Role, Terminator, Variable,
};
use tracing::{debug, info, warn};

use crate::context::{LocksetAnalysisRegion, RoleCopy};
use crate::{AnalysisContext, EntryPointPair, InstrumentError, names};

/// Label of the block closing every paired unit.
pub const CHECKS_LABEL: &str = "$checks";

/// One role copy of an entry point, ready to be spliced into a unit.
struct EntryCopy {
    copy: RoleCopy,
    params: Vec<Variable>,
    returns: Vec<Variable>,
    locals: Vec<Variable>,
    blocks: Vec<Block>,
    requires: Vec<Expr>,
    ensures: Vec<Expr>,
    modifies: Vec<String>,
}

/// Composes instrumented entry points into two-execution units
/// `check_<logger>_<checker>` and retires the originals afterwards.
pub struct PairReducer<'a> {
    ac: &'a mut AnalysisContext,
}

impl<'a> PairReducer<'a> {
    pub fn new(ac: &'a mut AnalysisContext) -> Self {
        Self { ac }
    }

    /// Builds one unit per distinct pair and returns the unit names.
    pub fn run(mut self) -> Result<Vec<String>, InstrumentError> {
        let pairs = self.ac.facts.unique_pairs();
        let mut units = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            for ep in [pair.logger(), pair.checker()] {
                self.require_instrumented(ep)?;
                if self.ac.options.is_init(ep) {
                    warn!(entry_point = ep, "init entry point is paired; its original is retained");
                }
            }
            if let Some(existing) = self.existing_unit(pair) {
                warn!(unit = %existing, "pair already has a unit, skipping");
                continue;
            }
            let unit = self.free_unit_name(pair);
            self.build_unit(pair, &unit)?;
            units.push(unit);
        }
        let removed = self.prune()?;
        info!(units = units.len(), removed, "pairwise reduction done");
        Ok(units)
    }

    fn require_instrumented(&self, ep: &str) -> Result<(), InstrumentError> {
        let region = self.ac.instrumentation_region(ep);
        if !region.is_some_and(|r| r.lockset_done) {
            return Err(InstrumentError::NotInstrumented {
                entry_point: ep.to_string(),
                stage: "lockset tracking",
            });
        }
        if !region.is_some_and(|r| r.access_done) {
            return Err(InstrumentError::NotInstrumented {
                entry_point: ep.to_string(),
                stage: "access instrumentation",
            });
        }
        Ok(())
    }

    fn existing_unit(&self, pair: &EntryPointPair) -> Option<String> {
        self.ac
            .analysis_regions()
            .iter()
            .find(|r| {
                r.logger.entry_point == pair.logger()
                    && r.checkers.iter().any(|c| c.entry_point == pair.checker())
            })
            .map(|r| r.name.clone())
    }

    /// `check_<a>_<b>` unless some declaration already owns that name, in
    /// which case the first free `check_<a>_<b>$<n>`.
    fn free_unit_name(&self, pair: &EntryPointPair) -> String {
        let (a, b) = (pair.logger(), pair.checker());
        let taken = |n: &str| {
            self.ac.program.procedure(n).is_some()
                || self.ac.program.implementation(n).is_some()
                || self.ac.program.has_global_symbol(n)
        };
        let base = names::pair_unit(a, b);
        if !taken(&base) {
            return base;
        }
        let mut n = 1;
        while taken(&names::numbered_pair_unit(a, b, n)) {
            n += 1;
        }
        let unit = names::numbered_pair_unit(a, b, n);
        debug!(unit = %unit, clashes_with = %base, "unit name disambiguated");
        unit
    }

    fn build_unit(&mut self, pair: &EntryPointPair, unit: &str) -> Result<(), InstrumentError> {
        let (a, b) = (pair.logger(), pair.checker());
        let unit = unit.to_string();

        let checker_header = self
            .ac
            .program
            .implementation(b)
            .and_then(|i| i.blocks.first())
            .map(|blk| names::copied_label(b, Role::Checker, &blk.label))
            .ok_or_else(|| InstrumentError::MissingEntryPoint { name: b.to_string() })?;

        let logger = self.copy_entry(a, Role::Logger, &checker_header)?;
        let checker = self.copy_entry(b, Role::Checker, CHECKS_LABEL)?;
        let checks = self.checks_block(pair);

        let params: Vec<Variable> = logger.params.iter().chain(&checker.params).cloned().collect();
        let returns: Vec<Variable> = logger.returns.iter().chain(&checker.returns).cloned().collect();

        let mut proc = Procedure::new(unit.clone(), params.clone());
        proc.returns = returns.clone();
        for e in logger.requires.iter().chain(&checker.requires) {
            proc.add_requires(e.clone());
        }
        for e in logger.ensures.iter().chain(&checker.ensures) {
            proc.add_ensures(e.clone());
        }
        for m in logger.modifies.iter().chain(&checker.modifies) {
            proc.add_modifies(m.clone());
        }

        let mut blocks = logger.blocks;
        blocks.extend(checker.blocks);
        blocks.push(checks);
        let mut imp = Implementation::new(unit.clone(), params, blocks);
        imp.returns = returns;
        imp.locals = logger.locals.into_iter().chain(checker.locals).collect();

        self.ac.program.add_decl(proc);
        self.ac.program.add_decl(imp);
        self.ac.push_analysis_region(LocksetAnalysisRegion {
            name: unit.clone(),
            logger: logger.copy,
            checkers: vec![checker.copy],
            checks_label: CHECKS_LABEL.to_string(),
        });
        debug!(unit = %unit, "built paired unit");
        Ok(())
    }

    /// Copies the entry point's body under `role`: labels and locals get the
    /// role's prefix or suffix, returns jump to `exit`, and calls to synthesized
    /// routines or privatized helpers go to the role's variant.
    fn copy_entry(&mut self, ep: &str, role: Role, exit: &str) -> Result<EntryCopy, InstrumentError> {
        let Some(imp) = self.ac.program.implementation(ep).cloned() else {
            return Err(InstrumentError::MissingEntryPoint { name: ep.to_string() });
        };
        let Some(proc) = self.ac.program.procedure(ep).cloned() else {
            return Err(InstrumentError::UnknownProcedure { name: ep.to_string() });
        };
        // The entry point itself is split too, so a recursive call lands on
        // its instrumented body rather than the original about to be pruned.
        let helpers: BTreeSet<String> = self
            .ac
            .instrumentation_region(ep)
            .map(|r| r.procedures.iter().cloned().collect())
            .unwrap_or_default();

        let local_names: BTreeSet<String> = imp
            .params
            .iter()
            .chain(&imp.returns)
            .chain(&imp.locals)
            .map(|v| v.name.clone())
            .collect();
        let rename = |n: &str| local_names.contains(n).then(|| names::copied_local(n, role));
        let renamed = |vars: &[Variable]| -> Vec<Variable> {
            vars.iter()
                .map(|v| Variable::new(names::copied_local(&v.name, role), v.ty.clone()))
                .collect()
        };

        // Contracts name the procedure's formals, which may differ from the
        // implementation's.
        let formals: BTreeMap<String, String> = proc
            .params
            .iter()
            .zip(&imp.params)
            .chain(proc.returns.iter().zip(&imp.returns))
            .map(|(p, i)| (p.name.clone(), names::copied_local(&i.name, role)))
            .collect();
        let rename_formal = |n: &str| formals.get(n).cloned();
        let contract = |exprs: &[Expr]| -> Vec<Expr> {
            exprs
                .iter()
                .map(|e| {
                    let mut e = e.clone();
                    e.rename_idents(&rename_formal);
                    e
                })
                .collect()
        };

        let mut labels = Vec::with_capacity(imp.blocks.len());
        let mut blocks = Vec::with_capacity(imp.blocks.len());
        for block in &imp.blocks {
            let label = names::copied_label(ep, role, &block.label);
            let mut cmds = block.cmds.clone();
            for cmd in cmds.iter_mut() {
                cmd.rename_idents(&rename);
                self.split_call(cmd, role, &helpers)?;
            }
            let term = match &block.term {
                Terminator::Return => Terminator::Goto(vec![exit.to_string()]),
                Terminator::Goto(targets) => Terminator::Goto(
                    targets
                        .iter()
                        .map(|t| names::copied_label(ep, role, t))
                        .collect(),
                ),
            };
            labels.push(label.clone());
            blocks.push(Block::new(label, cmds, term));
        }

        let split_helpers = helpers
            .iter()
            .map(|h| names::role_variant(h, role))
            .filter(|v| self.ac.program.implementation(v).is_some())
            .collect();

        Ok(EntryCopy {
            copy: RoleCopy {
                entry_point: ep.to_string(),
                role,
                labels,
                helpers: split_helpers,
            },
            params: renamed(&imp.params),
            returns: renamed(&imp.returns),
            locals: renamed(&imp.locals),
            blocks,
            requires: contract(&proc.requires),
            ensures: contract(&proc.ensures),
            modifies: proc.modifies.clone(),
        })
    }

    fn split_call(
        &mut self,
        cmd: &mut Cmd,
        role: Role,
        helpers: &BTreeSet<String>,
    ) -> Result<(), InstrumentError> {
        let CmdKind::Call {
            callee,
            hook,
            role: call_role,
            ..
        } = &mut cmd.kind
        else {
            return Ok(());
        };
        if hook.is_none() && !helpers.contains(callee.as_str()) {
            return Ok(());
        }
        let variant = self.ensure_variant(callee, role, helpers)?;
        *callee = variant;
        *call_role = role;
        Ok(())
    }

    /// The `$log`/`$check` sibling of a routine, cloned on first request.
    /// The procedure is declared before its body is split so recursive
    /// helpers find it and stop.
    fn ensure_variant(
        &mut self,
        name: &str,
        role: Role,
        helpers: &BTreeSet<String>,
    ) -> Result<String, InstrumentError> {
        let variant = names::role_variant(name, role);
        if self.ac.program.procedure(&variant).is_some() {
            return Ok(variant);
        }
        let Some(proc) = self.ac.program.procedure(name).cloned() else {
            return Err(InstrumentError::UnknownProcedure {
                name: name.to_string(),
            });
        };
        let mut proc = Procedure {
            name: variant.clone(),
            role,
            ..proc
        };
        if self.ac.instrumentation_region(name).is_some() {
            // A recursive call may hold locks, so the entry boundary
            // contract does not apply to the split copy.
            let boundary = self.boundary_flags(name);
            let outside = |e: &Expr| {
                let mut hit = false;
                e.for_each_ident(&mut |n| hit |= boundary.contains(n));
                !hit
            };
            proc.requires.retain(|e| outside(e));
            proc.ensures.retain(|e| outside(e));
        }
        self.ac.program.add_decl(proc);

        if let Some(imp) = self.ac.program.implementation(name).cloned() {
            let mut imp = Implementation {
                name: variant.clone(),
                role,
                ..imp
            };
            for block in imp.blocks.iter_mut() {
                for cmd in block.cmds.iter_mut() {
                    self.split_call(cmd, role, helpers)?;
                }
            }
            self.ac.program.add_decl(imp);
        }
        debug!(routine = name, variant = %variant, "split routine by role");
        Ok(variant)
    }

    /// Lockset flags the tracker pins in an entry point's contract.
    fn boundary_flags(&self, ep: &str) -> BTreeSet<String> {
        self.ac
            .current_locksets(ep)
            .into_iter()
            .chain(self.ac.all_memory_locksets(ep))
            .map(|v| v.name)
            .collect()
    }

    /// Race assertions for every region both entry points touch, then the
    /// lock-release check unless only races are checked.
    fn checks_block(&mut self, pair: &EntryPointPair) -> Block {
        let (a, b) = (pair.logger(), pair.checker());
        let mut cmds = Vec::new();

        let shared: Vec<String> = self
            .ac
            .facts
            .regions_of(a)
            .filter(|r| self.ac.facts.touches(b, r))
            .map(str::to_string)
            .collect();
        for region in shared {
            let (Some(wa), Some(wb)) = (self.ac.access_flag(a, &region), self.ac.access_flag(b, &region))
            else {
                continue;
            };
            let premise = if pair.is_self_pair() {
                Expr::ident(wa)
            } else {
                Expr::or(Expr::ident(wa), Expr::ident(wb))
            };
            let theirs = self.ac.memory_locksets(b, &region);
            let protected = self
                .ac
                .memory_locksets(a, &region)
                .into_iter()
                .filter_map(|mine| {
                    if pair.is_self_pair() {
                        return Some(Expr::ident(mine.name));
                    }
                    theirs
                        .iter()
                        .find(|t| t.lock == mine.lock)
                        .map(|t| Expr::and(Expr::ident(mine.name.clone()), Expr::ident(t.name.clone())))
                })
                .collect::<Vec<_>>();

            let mut assert = Cmd::assert(Expr::imp(premise, Expr::disj(protected)));
            assert.attrs.set("resource", vec![AttrValue::from(region.as_str())]);
            cmds.push(assert);
        }

        if !self.ac.options.only_race_checking {
            let check = self.add_release_check(pair);
            cmds.push(Cmd::hooked_call(check, Vec::new(), Hook::CheckLocksReleased));
        }
        Block::new(CHECKS_LABEL, cmds, Terminator::Return)
    }

    /// `_CHECK_ALL_LOCKS_HAVE_BEEN_RELEASED_$<a>_$<b>`: asserts that neither
    /// execution still holds a lock.
    fn add_release_check(&mut self, pair: &EntryPointPair) -> String {
        let name = names::locks_released_check(pair.logger(), pair.checker());
        if self.ac.program.procedure(&name).is_some() {
            return name;
        }
        let mut cls = self.ac.current_locksets(pair.logger());
        if !pair.is_self_pair() {
            cls.extend(self.ac.current_locksets(pair.checker()));
        }
        let cmds = cls
            .into_iter()
            .map(|v| Cmd::assert(Expr::not(Expr::ident(v.name))))
            .collect();

        let inline = Attributes::new().with("inline", vec![AttrValue::Int(1)]);
        let mut proc = Procedure::new(name.clone(), Vec::new());
        proc.attrs = inline.clone();
        let mut imp = Implementation::new(
            name.clone(),
            Vec::new(),
            vec![Block::new("_CHECK", cmds, Terminator::Return)],
        );
        imp.attrs = inline;
        self.ac.program.add_decl(proc);
        self.ac.program.add_decl(imp);
        name
    }

    /// Removes the pre-pairing definitions of every paired entry point
    /// except the init entry point: the entry point itself, its privatized
    /// helpers and its synthesized routines. Anything still reachable from a
    /// surviving implementation stays.
    fn prune(&mut self) -> Result<usize, InstrumentError> {
        let units: BTreeSet<String> = self
            .ac
            .analysis_regions()
            .iter()
            .map(|r| r.name.clone())
            .collect();

        let mut doomed: BTreeSet<String> = BTreeSet::new();
        for ep in self.ac.facts.paired_entry_points() {
            if self.ac.options.is_init(&ep) {
                continue;
            }
            if let Some(region) = self.ac.instrumentation_region(&ep) {
                doomed.extend(region.helpers().iter().cloned());
            }
            doomed.insert(names::update_routine(&ep));
            for region in self.ac.facts.regions_of(&ep) {
                for kind in AccessKind::ALL {
                    doomed.insert(names::access_routine(kind, region, &ep));
                }
            }
            doomed.insert(ep);
        }

        for name in &doomed {
            if let Some(unit) = self
                .ac
                .program
                .callers_of(name)
                .into_iter()
                .find(|c| units.contains(c))
            {
                return Err(InstrumentError::StillReferenced {
                    name: name.clone(),
                    unit,
                });
            }
        }

        let live = reachable_from_survivors(&self.ac.program, &doomed);
        let mut removed = 0;
        for name in &doomed {
            if live.contains(name) {
                debug!(name = %name, "kept: still called by a surviving implementation");
                continue;
            }
            let proc = self.ac.program.remove_procedure(name);
            let imp = self.ac.program.remove_implementation(name);
            if proc.is_some() || imp.is_some() {
                removed += 1;
            }
            if !mentions_ident(&self.ac.program, name) {
                self.ac.program.remove_constant(name);
            }
        }
        Ok(removed)
    }
}

fn reachable_from_survivors(program: &Program, doomed: &BTreeSet<String>) -> BTreeSet<String> {
    let mut live = BTreeSet::new();
    let mut stack: Vec<String> = program
        .implementation_names()
        .into_iter()
        .filter(|n| !doomed.contains(n))
        .collect();
    while let Some(name) = stack.pop() {
        let Some(imp) = program.implementation(&name) else {
            continue;
        };
        for callee in imp.callees() {
            if doomed.contains(&callee) && live.insert(callee.clone()) {
                stack.push(callee);
            }
        }
    }
    live
}

fn mentions_ident(program: &Program, name: &str) -> bool {
    let mut found = false;
    for imp in program.implementations() {
        for cmd in imp.cmds() {
            cmd.for_each_ident(&mut |n| found |= n == name);
        }
    }
    for proc in program.procedures() {
        for e in proc.requires.iter().chain(&proc.ensures) {
            e.for_each_ident(&mut |n| found |= n == name);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccessInstrumenter, Lock, LocksetTracker, MemoryRegion, PipelineOptions, SharedStateFacts};
    use lockpair_ir::{AssignLhs, Constant, GlobalVar, Type, validate_program};

    fn entry(name: &str, body: Vec<Cmd>) -> (Procedure, Implementation) {
        let params = vec![Variable::new("p", Type::Ref)];
        let proc = Procedure::new(name, params.clone());
        let mut imp = Implementation::new(
            name,
            params,
            vec![
                Block::new("bb0", body, Terminator::Goto(vec!["bb1".into()])),
                Block::new("bb1", Vec::new(), Terminator::Return),
            ],
        );
        imp.locals.push(Variable::new("x", Type::Int));
        (proc, imp)
    }

    fn instrumented(pairs: Vec<EntryPointPair>, options: PipelineOptions) -> AnalysisContext {
        let mut p = Program::new();
        p.add_decl(GlobalVar::new("dev_lock", Type::Ref));
        p.add_decl(GlobalVar::new(
            "dev_state",
            Type::Map {
                key: Box::new(Type::Ref),
                value: Box::new(Type::Int),
            },
        ));
        p.add_decl(Procedure::new("mutex_lock", vec![Variable::new("l", Type::Ref)]));
        p.add_decl(Procedure::new("mutex_unlock", vec![Variable::new("l", Type::Ref)]));
        p.add_decl(Constant::new("remove", Type::Int));
        let store = Cmd::assign(
            AssignLhs::Map {
                map: "dev_state".into(),
                index: Expr::ident("p"),
            },
            Expr::Int(1),
        );
        for name in ["probe", "remove"] {
            let (proc, imp) = entry(
                name,
                vec![
                    Cmd::call("mutex_lock", vec![Expr::ident("dev_lock")]),
                    store.clone(),
                    Cmd::call("mutex_unlock", vec![Expr::ident("dev_lock")]),
                ],
            );
            p.add_decl(proc);
            p.add_decl(imp);
        }

        let mut facts = SharedStateFacts {
            locks: vec![Lock::new("dev_lock")],
            regions: vec![MemoryRegion::new("dev_state")],
            pairs,
            ..SharedStateFacts::default()
        };
        for ep in ["probe", "remove"] {
            facts
                .accesses
                .insert(ep.into(), ["dev_state".to_string()].into_iter().collect());
        }
        let mut ac = AnalysisContext::new(p, facts, options);
        for ep in ac.facts.paired_entry_points() {
            LocksetTracker::new(&mut ac, ep.clone()).run().expect("tracker");
            AccessInstrumenter::new(&mut ac, ep).run().expect("access");
        }
        ac
    }

    #[test]
    fn self_pair_splits_roles_per_copy() {
        let mut ac = instrumented(vec![EntryPointPair::new("probe", "probe")], PipelineOptions::default());
        let units = PairReducer::new(&mut ac).run().expect("pair");
        assert_eq!(units, vec!["check_probe_probe".to_string()]);

        let region = ac.analysis_region("check_probe_probe").unwrap();
        assert_eq!(region.logger.role, Role::Logger);
        assert_eq!(region.checkers.len(), 1);
        assert_eq!(region.logger.header(), Some("probe$log$bb0"));
        assert_eq!(region.checkers[0].header(), Some("probe$check$bb0"));

        let imp = ac.program.implementation("check_probe_probe").unwrap();
        for block in &imp.blocks {
            for cmd in &block.cmds {
                let Some(callee) = cmd.callee() else { continue };
                if block.label.starts_with("probe$log$") {
                    assert!(callee.ends_with("$log"), "{callee} in {}", block.label);
                } else if block.label.starts_with("probe$check$") {
                    assert!(callee.ends_with("$check"), "{callee} in {}", block.label);
                }
            }
        }
        assert_eq!(validate_program(&ac.program), Ok(()));
    }

    #[test]
    fn returns_chain_logger_into_checker_into_checks() {
        let mut ac = instrumented(vec![EntryPointPair::new("probe", "remove")], PipelineOptions::default());
        PairReducer::new(&mut ac).run().expect("pair");

        let imp = ac.program.implementation("check_probe_remove").unwrap();
        let labels: Vec<&str> = imp.blocks.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["probe$log$bb0", "probe$log$bb1", "remove$check$bb0", "remove$check$bb1", "$checks"]
        );
        assert_eq!(imp.blocks[1].term, Terminator::Goto(vec!["remove$check$bb0".into()]));
        assert_eq!(imp.blocks[3].term, Terminator::Goto(vec!["$checks".into()]));
        assert_eq!(
            imp.params.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            vec!["p$log", "p$check"]
        );
        assert!(imp.is_local("x$log") && imp.is_local("x$check"));
    }

    #[test]
    fn checks_block_asserts_race_freedom_and_release() {
        let mut ac = instrumented(vec![EntryPointPair::new("probe", "remove")], PipelineOptions::default());
        PairReducer::new(&mut ac).run().expect("pair");

        let imp = ac.program.implementation("check_probe_remove").unwrap();
        let checks = imp.block(CHECKS_LABEL).unwrap();
        assert_eq!(
            checks.cmds[0].kind,
            CmdKind::Assert(Expr::imp(
                Expr::or(Expr::ident("WRITTEN_dev_state_$probe"), Expr::ident("WRITTEN_dev_state_$remove")),
                Expr::and(
                    Expr::ident("dev_lock_in_LS_dev_state_$probe"),
                    Expr::ident("dev_lock_in_LS_dev_state_$remove"),
                ),
            ))
        );
        assert_eq!(
            checks.cmds[1].callee(),
            Some("_CHECK_ALL_LOCKS_HAVE_BEEN_RELEASED_$probe_$remove")
        );
        assert_eq!(checks.cmds[1].hook(), Some(&Hook::CheckLocksReleased));
    }

    #[test]
    fn race_only_mode_skips_release_check() {
        let options = PipelineOptions {
            only_race_checking: true,
            ..PipelineOptions::default()
        };
        let mut ac = instrumented(vec![EntryPointPair::new("probe", "remove")], options);
        PairReducer::new(&mut ac).run().expect("pair");
        assert!(ac.program.procedure("_CHECK_ALL_LOCKS_HAVE_BEEN_RELEASED_$probe_$remove").is_none());
    }

    #[test]
    fn originals_are_pruned_and_variants_reused() {
        let mut ac = instrumented(
            vec![
                EntryPointPair::new("probe", "probe"),
                EntryPointPair::new("probe", "remove"),
                EntryPointPair::new("remove", "remove"),
            ],
            PipelineOptions::default(),
        );
        PairReducer::new(&mut ac).run().expect("pair");

        for gone in ["probe", "remove", "_UPDATE_CLS_$probe", "_WRITE_LS_dev_state_$remove"] {
            assert!(ac.program.procedure(gone).is_none(), "{gone} survived");
            assert!(ac.program.implementation(gone).is_none(), "{gone} survived");
        }
        assert!(ac.program.constant("remove").is_none());
        let logs = ac
            .program
            .procedures()
            .filter(|p| p.name == "_UPDATE_CLS_$probe$log")
            .count();
        assert_eq!(logs, 1);
        assert_eq!(validate_program(&ac.program), Ok(()));
    }

    #[test]
    fn init_entry_point_is_retained() {
        let options = PipelineOptions {
            init_entry_point: Some("probe".into()),
            ..PipelineOptions::default()
        };
        let mut ac = instrumented(vec![EntryPointPair::new("probe", "remove")], options);
        PairReducer::new(&mut ac).run().expect("pair");
        assert!(ac.program.implementation("probe").is_some());
        assert!(ac.program.implementation("_UPDATE_CLS_$probe").is_some());
        assert!(ac.program.implementation("remove").is_none());
    }

    #[test]
    fn pairing_before_instrumentation_fails() {
        let mut ac = instrumented(Vec::new(), PipelineOptions::default());
        ac.facts.pairs.push(EntryPointPair::new("probe", "remove"));
        let err = PairReducer::new(&mut ac).run().unwrap_err();
        assert!(matches!(err, InstrumentError::NotInstrumented { entry_point, .. } if entry_point == "probe"));
    }
}
