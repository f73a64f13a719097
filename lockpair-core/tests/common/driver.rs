//! Small driver-shaped programs: lock globals, map-typed memory regions,
//! bodiless lock primitives and entry points taking one pointer.

use lockpair_core::{
    AnalysisContext, EntryPointPair, Lock, MemoryRegion, PipelineOptions, SharedStateFacts,
};
use lockpair_ir::{
    AssignLhs, Block, Cmd, Expr, GlobalVar, Implementation, Procedure, Program, SourceLoc,
    Terminator, Type, Variable,
};

pub fn region_type() -> Type {
    Type::Map {
        key: Box::new(Type::Ref),
        value: Box::new(Type::Int),
    }
}

pub fn loc(line: i64) -> Cmd {
    SourceLoc::new("drivers/dev.c", line, 5).carrier()
}

pub fn lock(name: &str) -> Cmd {
    Cmd::call("mutex_lock", vec![Expr::ident(name)])
}

pub fn unlock(name: &str) -> Cmd {
    Cmd::call("mutex_unlock", vec![Expr::ident(name)])
}

pub fn store(region: &str) -> Cmd {
    Cmd::assign(
        AssignLhs::Map {
            map: region.to_string(),
            index: Expr::ident("p"),
        },
        Expr::Int(1),
    )
}

pub fn load(region: &str) -> Cmd {
    Cmd::assign(
        AssignLhs::Simple("x".to_string()),
        Expr::select(Expr::ident(region), Expr::ident("p")),
    )
}

pub fn base_program(locks: &[&str], regions: &[&str]) -> Program {
    let mut p = Program::new();
    for l in locks {
        p.add_decl(GlobalVar::new(*l, Type::Ref));
    }
    for r in regions {
        p.add_decl(GlobalVar::new(*r, region_type()));
    }
    p.add_decl(Procedure::new("mutex_lock", vec![Variable::new("l", Type::Ref)]));
    p.add_decl(Procedure::new("mutex_unlock", vec![Variable::new("l", Type::Ref)]));
    p
}

/// Adds `name(p: ref)` with a local `x: int` and a single straight-line block.
pub fn add_routine(p: &mut Program, name: &str, cmds: Vec<Cmd>) {
    let params = vec![Variable::new("p", Type::Ref)];
    p.add_decl(Procedure::new(name, params.clone()));
    let mut imp = Implementation::new(name, params, vec![Block::new("bb0", cmds, Terminator::Return)]);
    imp.locals.push(Variable::new("x", Type::Int));
    p.add_decl(imp);
}

pub fn facts(
    locks: &[&str],
    regions: &[&str],
    accesses: &[(&str, &[&str])],
    pairs: &[(&str, &str)],
) -> SharedStateFacts {
    SharedStateFacts {
        locks: locks.iter().map(|l| Lock::new(*l)).collect(),
        regions: regions.iter().map(|r| MemoryRegion::new(*r)).collect(),
        accesses: accesses
            .iter()
            .map(|(ep, rs)| (ep.to_string(), rs.iter().map(|r| r.to_string()).collect()))
            .collect(),
        pairs: pairs
            .iter()
            .map(|(a, b)| EntryPointPair::new(*a, *b))
            .collect(),
    }
}

/// `probe` writes `dev_state` under `dev_lock`; `remove` reads it under the
/// lock and then calls `flush`, which writes it.
pub fn dev_driver(pairs: &[(&str, &str)], options: PipelineOptions) -> AnalysisContext {
    let mut p = base_program(&["dev_lock"], &["dev_state"]);
    add_routine(&mut p, "flush", vec![loc(40), store("dev_state")]);
    add_routine(
        &mut p,
        "probe",
        vec![
            loc(10),
            lock("dev_lock"),
            loc(11),
            store("dev_state"),
            loc(12),
            unlock("dev_lock"),
        ],
    );
    add_routine(
        &mut p,
        "remove",
        vec![
            loc(20),
            lock("dev_lock"),
            loc(21),
            load("dev_state"),
            loc(22),
            Cmd::call("flush", vec![Expr::ident("p")]),
            loc(23),
            unlock("dev_lock"),
        ],
    );
    let facts = facts(
        &["dev_lock"],
        &["dev_state"],
        &[("probe", &["dev_state"]), ("remove", &["dev_state"])],
        pairs,
    );
    AnalysisContext::new(p, facts, options)
}

pub const ALL_PAIRS: &[(&str, &str)] = &[("probe", "probe"), ("probe", "remove"), ("remove", "remove")];
