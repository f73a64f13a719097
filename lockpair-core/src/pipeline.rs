#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use lockpair_ir::validate_program;
use tracing::{debug, info};

use crate::{
    AccessInstrumenter, AnalysisContext, InstrumentError, LocksetTracker, PairGuesses, PairReducer,
    ProgramSimplifier, SummaryGuesser, TraceAnnotator,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassTiming {
    pub pass: &'static str,
    pub elapsed: Duration,
}

/// What a pipeline run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub simplified: usize,
    pub entry_points: Vec<String>,
    pub access_calls: usize,
    pub units: Vec<String>,
    pub markers: usize,
    pub guesses: usize,
    pub timings: Vec<PassTiming>,
}

/// Runs every pass once, in order: simplification, per entry point lockset
/// tracking and access instrumentation, pairing, trace annotation and, when
/// enabled, summary guessing. The first failure aborts the run.
pub struct Pipeline<'a> {
    ac: &'a mut AnalysisContext,
    report: PipelineReport,
}

impl<'a> Pipeline<'a> {
    pub fn new(ac: &'a mut AnalysisContext) -> Self {
        Self {
            ac,
            report: PipelineReport::default(),
        }
    }

    pub fn run(mut self) -> Result<PipelineReport, InstrumentError> {
        if self.ac.options.validate_each_pass {
            validate_program(&self.ac.program)?;
        }

        if self.ac.options.simplify {
            self.report.simplified = self.timed("simplify", |ac| Ok(ProgramSimplifier::new(ac).run()))?;
        }

        let entry_points = self.ac.facts.paired_entry_points();
        self.timed("lockset", |ac| {
            for ep in &entry_points {
                LocksetTracker::new(ac, ep.clone()).run()?;
            }
            Ok(())
        })?;
        self.report.access_calls = self.timed("access", |ac| {
            let mut inserted = 0;
            for ep in &entry_points {
                inserted += AccessInstrumenter::new(ac, ep.clone()).run()?;
            }
            Ok(inserted)
        })?;
        self.report.entry_points = entry_points;

        self.report.units = self.timed("pair", |ac| PairReducer::new(ac).run())?;
        self.report.markers = self.timed("trace", |ac| TraceAnnotator::new(ac).run_all())?;

        if self.ac.options.summaries {
            self.report.guesses = self.timed("summary", summarize)?;
        }

        info!(
            entry_points = self.report.entry_points.len(),
            units = self.report.units.len(),
            access_calls = self.report.access_calls,
            "pipeline finished"
        );
        Ok(self.report)
    }

    fn timed<T>(
        &mut self,
        pass: &'static str,
        f: impl FnOnce(&mut AnalysisContext) -> Result<T, InstrumentError>,
    ) -> Result<T, InstrumentError> {
        let start = Instant::now();
        let out = f(&mut *self.ac)?;
        let elapsed = start.elapsed();
        if self.ac.options.measure_pass_time {
            info!(pass, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "pass timing");
        }
        self.report.timings.push(PassTiming { pass, elapsed });
        if self.ac.options.validate_each_pass {
            validate_program(&self.ac.program)?;
        }
        Ok(out)
    }
}

/// Candidate lockset summaries on the role-split helpers of every unit.
/// Entry conditions on the current lockset share guesses; exit conditions
/// get their own.
fn summarize(ac: &mut AnalysisContext) -> Result<usize, InstrumentError> {
    let regions = ac.analysis_regions().to_vec();
    let mut done: BTreeSet<String> = BTreeSet::new();
    let mut total = 0;

    for region in &regions {
        let mut guesser = SummaryGuesser::new(PairGuesses::new(
            region.logger.entry_point.clone(),
            region
                .checkers
                .first()
                .map(|c| c.entry_point.clone())
                .unwrap_or_default(),
        ));
        for copy in region.copies() {
            let cls: Vec<String> = ac
                .current_locksets(&copy.entry_point)
                .into_iter()
                .map(|v| v.name)
                .collect();
            let ls: Vec<String> = ac
                .all_memory_locksets(&copy.entry_point)
                .into_iter()
                .map(|v| v.name)
                .collect();

            for helper in &copy.helpers {
                if !done.insert(helper.clone()) {
                    continue;
                }
                let modified: Vec<String> = match ac.program.procedure(helper) {
                    Some(p) => ls.iter().filter(|v| p.modifies.contains(v)).cloned().collect(),
                    None => Vec::new(),
                };
                guesser.instrument_requires(&mut ac.program, helper, &cls, true, true)?;
                guesser.instrument_requires(&mut ac.program, helper, &cls, false, true)?;
                guesser.instrument_ensures(&mut ac.program, helper, &cls, true, false)?;
                guesser.instrument_ensures(&mut ac.program, helper, &cls, false, false)?;
                guesser.instrument_ensures(&mut ac.program, helper, &modified, false, false)?;
            }
        }
        let declared = guesser.finalize(&mut ac.program);
        debug!(unit = %region.name, declared, "summary candidates added");
        total += declared;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntryPointPair, Lock, MemoryRegion, PipelineOptions, SharedStateFacts};
    use lockpair_ir::{
        AssignLhs, Block, Cmd, Expr, Implementation, Procedure, Program, SourceLoc, Terminator, Type,
        Variable, GlobalVar,
    };

    fn ctx(options: PipelineOptions) -> AnalysisContext {
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

        let param = vec![Variable::new("p", Type::Ref)];
        p.add_decl(Procedure::new("touch", param.clone()));
        p.add_decl(Implementation::new(
            "touch",
            param.clone(),
            vec![Block::new(
                "entry",
                vec![
                    SourceLoc::new("dev.c", 7, 5).carrier(),
                    Cmd::assign(
                        AssignLhs::Map {
                            map: "dev_state".into(),
                            index: Expr::ident("p"),
                        },
                        Expr::Int(0),
                    ),
                ],
                Terminator::Return,
            )],
        ));
        p.add_decl(Procedure::new("probe", param.clone()));
        p.add_decl(Implementation::new(
            "probe",
            param,
            vec![Block::new(
                "entry",
                vec![
                    SourceLoc::new("dev.c", 20, 3).carrier(),
                    Cmd::call("mutex_lock", vec![Expr::ident("dev_lock")]),
                    Cmd::assume(Expr::Bool(true)),
                    Cmd::call("touch", vec![Expr::ident("p")]),
                    SourceLoc::new("dev.c", 22, 3).carrier(),
                    Cmd::call("mutex_unlock", vec![Expr::ident("dev_lock")]),
                ],
                Terminator::Return,
            )],
        ));

        let mut facts = SharedStateFacts {
            locks: vec![Lock::new("dev_lock")],
            regions: vec![MemoryRegion::new("dev_state")],
            pairs: vec![EntryPointPair::new("probe", "probe")],
            ..SharedStateFacts::default()
        };
        facts
            .accesses
            .insert("probe".into(), ["dev_state".to_string()].into_iter().collect());
        AnalysisContext::new(p, facts, options)
    }

    #[test]
    fn runs_every_pass_in_order() {
        let mut ac = ctx(PipelineOptions::default());
        let report = Pipeline::new(&mut ac).run().expect("pipeline");

        let passes: Vec<&str> = report.timings.iter().map(|t| t.pass).collect();
        assert_eq!(passes, vec!["simplify", "lockset", "access", "pair", "trace"]);
        assert_eq!(report.simplified, 1);
        assert_eq!(report.units, vec!["check_probe_probe".to_string()]);
        assert_eq!(report.entry_points, vec!["probe".to_string()]);
        // Only the helper's store is intercepted.
        assert_eq!(report.access_calls, 1);
        assert!(ac.program.implementation("touch$probe$log").is_some());
        assert!(ac.program.implementation("touch$probe$check").is_some());
    }

    #[test]
    fn summaries_attach_guesses_to_split_helpers() {
        let options = PipelineOptions {
            summaries: true,
            ..PipelineOptions::default()
        };
        let mut ac = ctx(options);
        let report = Pipeline::new(&mut ac).run().expect("pipeline");
        assert!(report.guesses > 0);

        let helper = ac.program.procedure("touch$probe$log").unwrap();
        assert_eq!(helper.requires.len(), 2);
        // cls true, cls false, ls false
        assert_eq!(helper.ensures.len(), 3);
        assert!(
            ac.program
                .constants()
                .all(|c| c.attrs.contains("existential"))
        );
    }

    #[test]
    fn failure_aborts_the_run() {
        let mut ac = ctx(PipelineOptions::default());
        ac.facts.pairs.push(EntryPointPair::new("probe", "missing"));
        let err = Pipeline::new(&mut ac).run().unwrap_err();
        assert!(matches!(err, InstrumentError::MissingEntryPoint { name } if name == "missing"));
    }
}
