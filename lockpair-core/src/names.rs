//! Names of generated declarations. Downstream tooling matches on these, so
//! they must not change.

use lockpair_ir::{AccessKind, Role};

pub fn current_lockset(lock: &str, entry_point: &str) -> String {
    format!("{lock}_in_CLS_${entry_point}")
}

pub fn memory_lockset(lock: &str, region: &str, entry_point: &str) -> String {
    format!("{lock}_in_LS_{region}_${entry_point}")
}

pub fn update_routine(entry_point: &str) -> String {
    format!("_UPDATE_CLS_${entry_point}")
}

pub fn access_routine(kind: AccessKind, region: &str, entry_point: &str) -> String {
    format!("_{}_LS_{region}_${entry_point}", kind.tag())
}

pub fn access_flag(region: &str, entry_point: &str) -> String {
    format!("WRITTEN_{region}_${entry_point}")
}

pub fn privatized(helper: &str, entry_point: &str) -> String {
    format!("{helper}${entry_point}")
}

pub fn role_variant(name: &str, role: Role) -> String {
    format!("{name}{}", role.suffix())
}

pub fn pair_unit(logger: &str, checker: &str) -> String {
    format!("check_{logger}_{checker}")
}

/// `check_<a>_<b>$<n>`, for when `check_<a>_<b>` is already taken by a
/// different pair whose names join to the same string.
pub fn numbered_pair_unit(logger: &str, checker: &str, n: usize) -> String {
    format!("{}${n}", pair_unit(logger, checker))
}

pub fn locks_released_check(logger: &str, checker: &str) -> String {
    format!("_CHECK_ALL_LOCKS_HAVE_BEEN_RELEASED_${logger}_${checker}")
}

/// Label of a block copied into a paired unit.
pub fn copied_label(entry_point: &str, role: Role, label: &str) -> String {
    format!("{entry_point}{}${label}", role.suffix())
}

/// Local or parameter renamed inside a paired unit.
pub fn copied_local(name: &str, role: Role) -> String {
    format!("{name}{}", role.suffix())
}
