#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use lockpair_ir::{AttrValue, Constant, Expr, Program, Type};
use tracing::debug;

use crate::InstrumentError;

/// What a guess stands for: one lockset variable held at one polarity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuessKey {
    pub var: String,
    pub polarity: bool,
}

/// Produces fresh guess names. Each summary flavor scopes its names
/// differently, so the strategy is supplied by the caller.
pub trait GuessMinter {
    fn mint(&mut self, key: &GuessKey) -> String;
}

/// Guesses scoped to a single entry point: `_b$<ep>$<n>`.
#[derive(Clone, Debug)]
pub struct EntryPointGuesses {
    entry_point: String,
    next: usize,
}

impl EntryPointGuesses {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            next: 0,
        }
    }
}

impl GuessMinter for EntryPointGuesses {
    fn mint(&mut self, _key: &GuessKey) -> String {
        let name = format!("_b${}${}", self.entry_point, self.next);
        self.next += 1;
        name
    }
}

/// Guesses scoped to a logger/checker pair: `_b$<logger>$<checker>$<n>`.
#[derive(Clone, Debug)]
pub struct PairGuesses {
    logger: String,
    checker: String,
    next: usize,
}

impl PairGuesses {
    pub fn new(logger: impl Into<String>, checker: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
            checker: checker.into(),
            next: 0,
        }
    }
}

impl GuessMinter for PairGuesses {
    fn mint(&mut self, _key: &GuessKey) -> String {
        let name = format!("_b${}${}${}", self.logger, self.checker, self.next);
        self.next += 1;
        name
    }
}

/// Attaches `guess ==> v` / `guess ==> !v` candidate contracts and keeps
/// the existential constants they need.
///
/// With `reuse`, every request for the same variable and polarity shares one
/// guess; without it each request mints a fresh one and leaves the shared
/// cache alone.
pub struct SummaryGuesser<M: GuessMinter> {
    minter: M,
    shared: BTreeMap<GuessKey, String>,
    minted: Vec<String>,
}

impl<M: GuessMinter> SummaryGuesser<M> {
    pub fn new(minter: M) -> Self {
        Self {
            minter,
            shared: BTreeMap::new(),
            minted: Vec::new(),
        }
    }

    pub fn guess_for(&mut self, var: &str, polarity: bool, reuse: bool) -> String {
        let key = GuessKey {
            var: var.to_string(),
            polarity,
        };
        if reuse {
            if let Some(existing) = self.shared.get(&key) {
                return existing.clone();
            }
        }
        let guess = self.minter.mint(&key);
        self.minted.push(guess.clone());
        if reuse {
            self.shared.insert(key, guess.clone());
        }
        guess
    }

    pub fn instrument_requires(
        &mut self,
        program: &mut Program,
        procedure: &str,
        vars: &[String],
        polarity: bool,
        reuse: bool,
    ) -> Result<Vec<String>, InstrumentError> {
        self.attach(program, procedure, vars, polarity, reuse, false)
    }

    pub fn instrument_ensures(
        &mut self,
        program: &mut Program,
        procedure: &str,
        vars: &[String],
        polarity: bool,
        reuse: bool,
    ) -> Result<Vec<String>, InstrumentError> {
        self.attach(program, procedure, vars, polarity, reuse, true)
    }

    fn attach(
        &mut self,
        program: &mut Program,
        procedure: &str,
        vars: &[String],
        polarity: bool,
        reuse: bool,
        ensures: bool,
    ) -> Result<Vec<String>, InstrumentError> {
        if program.procedure(procedure).is_none() {
            return Err(InstrumentError::UnknownProcedure {
                name: procedure.to_string(),
            });
        }
        let contracts = self.candidates(vars, polarity, reuse);
        let mut guesses = Vec::with_capacity(contracts.len());
        if let Some(proc) = program.procedure_mut(procedure) {
            for (guess, expr) in contracts {
                if ensures {
                    proc.ensures.push(expr);
                } else {
                    proc.requires.push(expr);
                }
                guesses.push(guess);
            }
        }
        Ok(guesses)
    }

    fn candidates(&mut self, vars: &[String], polarity: bool, reuse: bool) -> Vec<(String, Expr)> {
        vars.iter()
            .map(|v| {
                let guess = self.guess_for(v, polarity, reuse);
                let target = if polarity {
                    Expr::ident(v.clone())
                } else {
                    Expr::not(Expr::ident(v.clone()))
                };
                let expr = Expr::imp(Expr::ident(guess.clone()), target);
                (guess, expr)
            })
            .collect()
    }

    pub fn minted(&self) -> &[String] {
        &self.minted
    }

    /// Declares every minted guess as an existential boolean constant.
    /// Consumes the guesser so the declarations are emitted once.
    pub fn finalize(self, program: &mut Program) -> usize {
        let mut declared = 0;
        for name in self.minted {
            if program.constant(&name).is_some() {
                continue;
            }
            let mut c = Constant::new(name.clone(), Type::Bool);
            c.attrs.set("existential", vec![AttrValue::Bool(true)]);
            program.add_decl(c);
            declared += 1;
            debug!(guess = %name, "declared existential guess");
        }
        declared
    }
}
