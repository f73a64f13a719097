#![forbid(unsafe_code)]

use lockpair_ir::{
    AttrValue, Attributes, Block, Cmd, CmdKind, Hook, Program, Role, SourceLoc,
    is_sourceloc_carrier,
};
use tracing::{debug, info};

use crate::context::RoleCopy;
use crate::{AnalysisContext, InstrumentError};

#[derive(Default)]
struct Counters {
    log: usize,
    check: usize,
    update: usize,
}

/// Counterexample metadata for paired units: copies source positions onto
/// instrumented calls, then places named capture-state markers around them.
pub struct TraceAnnotator<'a> {
    ac: &'a mut AnalysisContext,
}

impl<'a> TraceAnnotator<'a> {
    pub fn new(ac: &'a mut AnalysisContext) -> Self {
        Self { ac }
    }

    /// Annotates one paired unit and the role-split helpers its copies
    /// call, then strips their source location carriers. Helpers shared
    /// with an already annotated unit are left alone. Returns the number of
    /// capture-state markers inserted.
    pub fn run(&mut self, unit: &str) -> Result<usize, InstrumentError> {
        let Some(region) = self.ac.analysis_region(unit).cloned() else {
            return Err(InstrumentError::NotPaired {
                unit: unit.to_string(),
            });
        };
        let Some(imp) = self.ac.program.implementation_mut(unit) else {
            return Err(InstrumentError::NotPaired {
                unit: unit.to_string(),
            });
        };

        for block in imp.blocks.iter_mut() {
            propagate_locations(unit, block)?;
        }

        let mut markers = 0;
        for copy in region.copies() {
            let state = match copy.role {
                Role::Logger => "logger_header_state",
                _ => "checker_header_state",
            };
            if let Some(header) = copy.header().and_then(|h| imp.block_mut(h)) {
                header.cmds.insert(0, capture_state(Attributes::new(), state));
                markers += 1;
            }
        }

        let mut counters = Counters::default();
        for block in imp.blocks.iter_mut() {
            let copy = region
                .copies()
                .find(|c| c.labels.iter().any(|l| *l == block.label));
            markers += insert_capture_states(copy, block, &mut counters);
        }
        let mut stripped = strip_block_carriers(&mut imp.blocks);

        for copy in region.copies() {
            for helper in &copy.helpers {
                let Some(imp) = self.ac.program.implementation_mut(helper) else {
                    continue;
                };
                if imp.cmds().any(|c| c.attrs.contains("captureState")) {
                    continue;
                }
                for block in imp.blocks.iter_mut() {
                    propagate_locations(helper, block)?;
                }
                for block in imp.blocks.iter_mut() {
                    markers += insert_capture_states(Some(copy), block, &mut counters);
                }
                stripped += strip_block_carriers(&mut imp.blocks);
            }
        }

        info!(unit, markers, stripped, "trace annotation done");
        Ok(markers)
    }

    /// Annotates every paired unit, then removes the carriers left anywhere
    /// else in the program.
    pub fn run_all(mut self) -> Result<usize, InstrumentError> {
        let units: Vec<String> = self
            .ac
            .analysis_regions()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        let mut markers = 0;
        for unit in &units {
            markers += self.run(unit)?;
        }
        let stripped = strip_source_locations(&mut self.ac.program);
        debug!(stripped, "removed remaining source location carriers");
        Ok(markers)
    }
}

/// Copies the nearest preceding source position onto every lockset update
/// and access call of the block.
fn propagate_locations(unit: &str, block: &mut Block) -> Result<(), InstrumentError> {
    for i in 0..block.cmds.len() {
        let Some(Hook::UpdateLockset | Hook::Access { .. }) = block.cmds[i].hook() else {
            continue;
        };
        let loc = block.cmds[..i]
            .iter()
            .rev()
            .find(|c| is_sourceloc_carrier(c))
            .and_then(|c| SourceLoc::from_attrs(&c.attrs));
        let Some(loc) = loc else {
            return Err(InstrumentError::MissingSourceLocation {
                unit: unit.to_string(),
                block: block.label.clone(),
                callee: block.cmds[i].callee().unwrap_or_default().to_string(),
            });
        };
        let call = &mut block.cmds[i];
        for a in loc.position_attrs().iter() {
            call.attrs.set(a.key.clone(), a.params.clone());
        }
    }
    Ok(())
}

/// Places capture-state markers around the block's hooked calls. Calls
/// outside any copy, such as the release check, get no entry point.
fn insert_capture_states(copy: Option<&RoleCopy>, block: &mut Block, counters: &mut Counters) -> usize {
    let old = std::mem::take(&mut block.cmds);
    let mut cmds = Vec::with_capacity(old.len());
    let mut markers = 0;

    for cmd in old {
        let CmdKind::Call {
            args,
            hook: Some(hook),
            role,
            ..
        } = &cmd.kind
        else {
            cmds.push(cmd);
            continue;
        };
        let role = match copy {
            Some(c) if !role.is_split() => c.role,
            _ => *role,
        };
        let entry_point = copy.map(|c| c.entry_point.as_str()).unwrap_or_default();

        match hook {
            Hook::Access {
                kind,
                region: resource,
            } => {
                let state = if role == Role::Logger {
                    counters.log += 1;
                    format!("log_state_{}", counters.log - 1)
                } else {
                    counters.check += 1;
                    format!("check_state_{}", counters.check - 1)
                };
                let attrs = position(&cmd.attrs)
                    .with("access", vec![kind.attr().into()])
                    .with("entryPoint", vec![entry_point.into()]);
                let marker = with_resource(capture_state(attrs, &state), resource.as_str().into());
                if role == Role::Logger {
                    cmds.push(cmd);
                    cmds.push(marker);
                } else {
                    cmds.push(marker);
                    cmds.push(cmd);
                }
            }
            Hook::UpdateLockset => {
                let state = format!("update_cls_state_{}", counters.update);
                counters.update += 1;
                let attrs = position(&cmd.attrs).with("entryPoint", vec![entry_point.into()]);
                let mut marker = capture_state(attrs, &state);
                if let Some(lock) = args.first() {
                    marker = with_resource(marker, AttrValue::Expr(lock.clone()));
                }
                cmds.push(cmd);
                cmds.push(marker);
            }
            Hook::CheckLocksReleased => {
                cmds.push(capture_state(Attributes::new(), "check_deadlock_state"));
                cmds.push(cmd);
            }
        }
        markers += 1;
    }
    block.cmds = cmds;
    markers
}

/// `column` then `line` of an annotated call; `-1` when a position is absent.
fn position(attrs: &Attributes) -> Attributes {
    Attributes::new()
        .with("column", vec![AttrValue::Int(attrs.int("column").unwrap_or(-1))])
        .with("line", vec![AttrValue::Int(attrs.int("line").unwrap_or(-1))])
}

fn capture_state(mut attrs: Attributes, state: &str) -> Cmd {
    attrs.set("captureState", vec![AttrValue::from(state)]);
    Cmd::marker(attrs)
}

fn with_resource(mut marker: Cmd, value: AttrValue) -> Cmd {
    marker.attrs.set("resource", vec![value]);
    marker
}

fn strip_block_carriers(blocks: &mut [Block]) -> usize {
    let mut removed = 0;
    for block in blocks {
        let before = block.cmds.len();
        block.cmds.retain(|c| !is_sourceloc_carrier(c));
        removed += before - block.cmds.len();
    }
    removed
}

/// Removes every source location carrier from every implementation.
pub fn strip_source_locations(program: &mut Program) -> usize {
    program
        .implementations_mut()
        .map(|imp| strip_block_carriers(&mut imp.blocks))
        .sum()
}
