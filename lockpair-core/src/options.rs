#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Knobs for a pipeline run. Every field has a default so a partial
/// `[pipeline]` table is enough.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOptions {
    /// Calls treated as lock acquisition; the first argument names the lock.
    pub lock_functions: Vec<String>,
    /// Calls treated as lock release.
    pub unlock_functions: Vec<String>,
    /// Entry point kept even when no pair references it.
    pub init_entry_point: Option<String>,
    /// Skip the lock-release check wiring at the end of each paired unit.
    pub only_race_checking: bool,
    /// Attach existential guess contracts to role-split helpers.
    pub summaries: bool,
    pub simplify: bool,
    /// Recording routines dropped by the simplifier.
    pub ignored_calls: Vec<String>,
    pub validate_each_pass: bool,
    pub measure_pass_time: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            lock_functions: vec!["mutex_lock".to_string()],
            unlock_functions: vec!["mutex_unlock".to_string()],
            init_entry_point: None,
            only_race_checking: false,
            summaries: false,
            simplify: true,
            ignored_calls: vec!["boogie_si_record_int".to_string()],
            validate_each_pass: true,
            measure_pass_time: false,
        }
    }
}

impl PipelineOptions {
    pub fn is_lock_call(&self, callee: &str) -> bool {
        self.lock_functions.iter().any(|f| f == callee)
    }

    pub fn is_unlock_call(&self, callee: &str) -> bool {
        self.unlock_functions.iter().any(|f| f == callee)
    }

    pub fn is_init(&self, entry_point: &str) -> bool {
        self.init_entry_point.as_deref() == Some(entry_point)
    }
}
