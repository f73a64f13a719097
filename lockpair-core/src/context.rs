#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use lockpair_ir::{AttrValue, Attributes, GlobalVar, Program, Role, Type};
use tracing::debug;

use crate::access::raw_accesses;
use crate::{InstrumentError, PipelineOptions, SharedStateFacts, names};

/// A boolean state variable tracking one lock, either in the current
/// lockset (`region == None`) or in the recorded lockset of a region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocksetVar {
    pub name: String,
    pub lock: String,
    pub region: Option<String>,
}

/// The procedures instrumented on behalf of one entry point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstrumentationRegion {
    pub entry_point: String,
    /// The entry point first, then its privatized helpers.
    pub procedures: Vec<String>,
    pub lockset_done: bool,
    pub access_done: bool,
}

impl InstrumentationRegion {
    pub fn helpers(&self) -> &[String] {
        self.procedures.get(1..).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.procedures.iter().any(|p| p == name)
    }
}

/// One entry point's copy inside a paired unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleCopy {
    pub entry_point: String,
    pub role: Role,
    /// Copied block labels; the first one is the copy's header.
    pub labels: Vec<String>,
    /// Role-split helper routines reachable from this copy.
    pub helpers: Vec<String>,
}

impl RoleCopy {
    pub fn header(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }
}

/// A two-execution verification unit: one logger copy followed by the checker copies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocksetAnalysisRegion {
    pub name: String,
    pub logger: RoleCopy,
    pub checkers: Vec<RoleCopy>,
    /// Final block holding the race assertions and the lock-release check.
    pub checks_label: String,
}

impl LocksetAnalysisRegion {
    pub fn copies(&self) -> impl Iterator<Item = &RoleCopy> {
        std::iter::once(&self.logger).chain(self.checkers.iter())
    }
}

/// The program under transformation plus everything the passes learn about it.
///
/// Generated state variables are registered here keyed by what they track, so
/// asking for the same one twice hands back the existing declaration.
#[derive(Clone, Debug)]
pub struct AnalysisContext {
    pub program: Program,
    pub facts: SharedStateFacts,
    pub options: PipelineOptions,
    current_locksets: BTreeMap<(String, String), LocksetVar>,
    memory_locksets: BTreeMap<(String, String, String), LocksetVar>,
    access_flags: BTreeMap<(String, String), String>,
    regions: BTreeMap<String, InstrumentationRegion>,
    analysis_regions: Vec<LocksetAnalysisRegion>,
}

impl AnalysisContext {
    pub fn new(program: Program, facts: SharedStateFacts, options: PipelineOptions) -> Self {
        Self {
            program,
            facts,
            options,
            current_locksets: BTreeMap::new(),
            memory_locksets: BTreeMap::new(),
            access_flags: BTreeMap::new(),
            regions: BTreeMap::new(),
            analysis_regions: Vec::new(),
        }
    }

    pub fn ensure_current_lockset(&mut self, entry_point: &str, lock: &str) -> LocksetVar {
        let key = (entry_point.to_string(), lock.to_string());
        if let Some(existing) = self.current_locksets.get(&key) {
            return existing.clone();
        }
        let var = LocksetVar {
            name: names::current_lockset(lock, entry_point),
            lock: lock.to_string(),
            region: None,
        };
        self.declare_flag(&var.name, "current_lockset");
        self.current_locksets.insert(key, var.clone());
        var
    }

    pub fn ensure_memory_lockset(&mut self, entry_point: &str, lock: &str, region: &str) -> LocksetVar {
        let key = (entry_point.to_string(), lock.to_string(), region.to_string());
        if let Some(existing) = self.memory_locksets.get(&key) {
            return existing.clone();
        }
        let var = LocksetVar {
            name: names::memory_lockset(lock, region, entry_point),
            lock: lock.to_string(),
            region: Some(region.to_string()),
        };
        self.declare_flag(&var.name, "lockset");
        self.memory_locksets.insert(key, var.clone());
        var
    }

    pub fn ensure_access_flag(&mut self, entry_point: &str, region: &str) -> String {
        let key = (entry_point.to_string(), region.to_string());
        if let Some(existing) = self.access_flags.get(&key) {
            return existing.clone();
        }
        let name = names::access_flag(region, entry_point);
        self.declare_flag(&name, "access_checking");
        self.access_flags.insert(key, name.clone());
        name
    }

    fn declare_flag(&mut self, name: &str, tag: &str) {
        let mut g = GlobalVar::new(name, Type::Bool);
        g.attrs = Attributes::new().with(tag, Vec::<AttrValue>::new());
        self.program.add_decl(g);
        debug!(var = name, tag, "declared instrumentation variable");
    }

    /// Current-lockset variables of the entry point, in lock order.
    pub fn current_locksets(&self, entry_point: &str) -> Vec<LocksetVar> {
        self.facts
            .locks
            .iter()
            .filter_map(|l| {
                self.current_locksets
                    .get(&(entry_point.to_string(), l.name.clone()))
                    .cloned()
            })
            .collect()
    }

    /// Recorded-lockset variables of one region of the entry point, in lock order.
    pub fn memory_locksets(&self, entry_point: &str, region: &str) -> Vec<LocksetVar> {
        self.facts
            .locks
            .iter()
            .filter_map(|l| {
                self.memory_locksets
                    .get(&(entry_point.to_string(), l.name.clone(), region.to_string()))
                    .cloned()
            })
            .collect()
    }

    /// Every recorded-lockset variable of the entry point, region by region.
    pub fn all_memory_locksets(&self, entry_point: &str) -> Vec<LocksetVar> {
        self.facts
            .regions_of(entry_point)
            .flat_map(|r| self.memory_locksets(entry_point, r))
            .collect()
    }

    pub fn access_flag(&self, entry_point: &str, region: &str) -> Option<&str> {
        self.access_flags
            .get(&(entry_point.to_string(), region.to_string()))
            .map(String::as_str)
    }

    pub fn instrumentation_region(&self, entry_point: &str) -> Option<&InstrumentationRegion> {
        self.regions.get(entry_point)
    }

    pub fn instrumentation_region_mut(&mut self, entry_point: &str) -> Option<&mut InstrumentationRegion> {
        self.regions.get_mut(entry_point)
    }

    pub(crate) fn insert_instrumentation_region(&mut self, region: InstrumentationRegion) {
        self.regions.insert(region.entry_point.clone(), region);
    }

    pub fn analysis_regions(&self) -> &[LocksetAnalysisRegion] {
        &self.analysis_regions
    }

    pub fn analysis_region(&self, name: &str) -> Option<&LocksetAnalysisRegion> {
        self.analysis_regions.iter().find(|r| r.name == name)
    }

    pub(crate) fn push_analysis_region(&mut self, region: LocksetAnalysisRegion) {
        self.analysis_regions.push(region);
    }

    /// Type of the lock declarations; `ref` when no lock is declared with a type.
    pub fn lock_type(&self) -> Type {
        self.facts
            .locks
            .iter()
            .find_map(|l| {
                self.program
                    .global(&l.name)
                    .map(|g| g.ty.clone())
                    .or_else(|| self.program.constant(&l.name).map(|c| c.ty.clone()))
            })
            .unwrap_or(Type::Ref)
    }

    /// Index type of a region's map.
    pub fn region_index_type(&self, region: &str) -> Type {
        match self.program.global(region).map(|g| &g.ty) {
            Some(Type::Map { key, .. }) => (**key).clone(),
            _ => Type::Ref,
        }
    }

    /// Regions each procedure of the entry point's instrumentation region
    /// touches, directly or through the helpers it calls.
    pub fn accessed_regions(
        &self,
        entry_point: &str,
    ) -> Result<BTreeMap<String, BTreeSet<String>>, InstrumentError> {
        let Some(region) = self.regions.get(entry_point) else {
            return Err(InstrumentError::NotInstrumented {
                entry_point: entry_point.to_string(),
                stage: "lockset tracking",
            });
        };

        let mut touched: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut calls: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for name in &region.procedures {
            let Some(imp) = self.program.implementation(name) else {
                continue;
            };
            let mut direct = BTreeSet::new();
            for cmd in imp.cmds() {
                for access in raw_accesses(cmd, &self.facts) {
                    if !self.facts.touches(entry_point, &access.region) {
                        return Err(InstrumentError::UnknownRegion {
                            entry_point: entry_point.to_string(),
                            region: access.region,
                        });
                    }
                    direct.insert(access.region);
                }
            }
            touched.insert(name.clone(), direct);
            calls.insert(
                name.clone(),
                imp.callees()
                    .into_iter()
                    .filter(|c| region.contains(c))
                    .collect(),
            );
        }

        loop {
            let mut changed = false;
            for (caller, callees) in &calls {
                let mut acc = touched.get(caller).cloned().unwrap_or_default();
                let before = acc.len();
                for callee in callees {
                    if let Some(set) = touched.get(callee) {
                        acc.extend(set.iter().cloned());
                    }
                }
                if acc.len() != before {
                    touched.insert(caller.clone(), acc);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        Ok(touched)
    }
}
