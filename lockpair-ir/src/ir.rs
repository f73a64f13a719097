#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Attributes;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Int,
    Ref,
    Map { key: Box<Type>, value: Box<Type> },
}

/// Which copy of a paired entry point a declaration or call site belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Original,
    Logger,
    Checker,
}

impl Role {
    pub fn suffix(self) -> &'static str {
        match self {
            Role::Original => "",
            Role::Logger => "$log",
            Role::Checker => "$check",
        }
    }

    pub fn is_split(self) -> bool {
        self != Role::Original
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub const ALL: [AccessKind; 2] = [AccessKind::Write, AccessKind::Read];

    /// Upper-case tag used in routine names.
    pub fn tag(self) -> &'static str {
        match self {
            AccessKind::Read => "READ",
            AccessKind::Write => "WRITE",
        }
    }

    /// Lower-case tag used in capture-state attributes.
    pub fn attr(self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
        }
    }
}

/// Marks a call to a routine synthesized by the instrumentation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hook {
    UpdateLockset,
    Access { kind: AccessKind, region: String },
    CheckLocksReleased,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    And,
    Or,
    Imp,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    Add,
    Sub,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Imp => "==>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    Ident(String),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Map read `map[index]`.
    Select { map: Box<Expr>, index: Box<Expr> },
    Ite {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn not(e: Expr) -> Self {
        Expr::Not(Box::new(e))
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::And, lhs, rhs)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Or, lhs, rhs)
    }

    pub fn imp(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Imp, lhs, rhs)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Eq, lhs, rhs)
    }

    pub fn select(map: Expr, index: Expr) -> Self {
        Expr::Select {
            map: Box::new(map),
            index: Box::new(index),
        }
    }

    pub fn ite(cond: Expr, then: Expr, els: Expr) -> Self {
        Expr::Ite {
            cond: Box::new(cond),
            then: Box::new(then),
            els: Box::new(els),
        }
    }

    /// Left-nested disjunction; `false` when empty.
    pub fn disj(items: impl IntoIterator<Item = Expr>) -> Self {
        items
            .into_iter()
            .reduce(Expr::or)
            .unwrap_or(Expr::Bool(false))
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn for_each_ident(&self, f: &mut impl FnMut(&str)) {
        match self {
            Expr::Bool(_) | Expr::Int(_) => {}
            Expr::Ident(name) => f(name),
            Expr::Not(e) => e.for_each_ident(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_ident(f);
                rhs.for_each_ident(f);
            }
            Expr::Select { map, index } => {
                map.for_each_ident(f);
                index.for_each_ident(f);
            }
            Expr::Ite { cond, then, els } => {
                cond.for_each_ident(f);
                then.for_each_ident(f);
                els.for_each_ident(f);
            }
        }
    }

    pub fn rename_idents(&mut self, rename: &impl Fn(&str) -> Option<String>) {
        match self {
            Expr::Bool(_) | Expr::Int(_) => {}
            Expr::Ident(name) => {
                if let Some(new) = rename(name) {
                    *name = new;
                }
            }
            Expr::Not(e) => e.rename_idents(rename),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.rename_idents(rename);
                rhs.rename_idents(rename);
            }
            Expr::Select { map, index } => {
                map.rename_idents(rename);
                index.rename_idents(rename);
            }
            Expr::Ite { cond, then, els } => {
                cond.rename_idents(rename);
                then.rename_idents(rename);
                els.rename_idents(rename);
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignLhs {
    Simple(String),
    /// Map store `map[index] := ...`.
    Map { map: String, index: Expr },
}

impl AssignLhs {
    pub fn name(&self) -> &str {
        match self {
            AssignLhs::Simple(name) => name,
            AssignLhs::Map { map, .. } => map,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmdKind {
    Assign {
        lhs: Vec<AssignLhs>,
        rhs: Vec<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
        #[serde(default)]
        outs: Vec<String>,
        #[serde(default)]
        hook: Option<Hook>,
        #[serde(default)]
        role: Role,
    },
    Assume(Expr),
    Assert(Expr),
    Havoc(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cmd {
    pub kind: CmdKind,
    #[serde(default)]
    pub attrs: Attributes,
}

impl Cmd {
    pub fn new(kind: CmdKind) -> Self {
        Self {
            kind,
            attrs: Attributes::new(),
        }
    }

    pub fn assign(lhs: AssignLhs, rhs: Expr) -> Self {
        Self::new(CmdKind::Assign {
            lhs: vec![lhs],
            rhs: vec![rhs],
        })
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(CmdKind::Call {
            callee: callee.into(),
            args,
            outs: Vec::new(),
            hook: None,
            role: Role::Original,
        })
    }

    pub fn hooked_call(callee: impl Into<String>, args: Vec<Expr>, hook: Hook) -> Self {
        Self::new(CmdKind::Call {
            callee: callee.into(),
            args,
            outs: Vec::new(),
            hook: Some(hook),
            role: Role::Original,
        })
    }

    pub fn assume(expr: Expr) -> Self {
        Self::new(CmdKind::Assume(expr))
    }

    pub fn assert(expr: Expr) -> Self {
        Self::new(CmdKind::Assert(expr))
    }

    /// `assume true` carrying only attributes.
    pub fn marker(attrs: Attributes) -> Self {
        Self {
            kind: CmdKind::Assume(Expr::Bool(true)),
            attrs,
        }
    }

    pub fn callee(&self) -> Option<&str> {
        match &self.kind {
            CmdKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }

    pub fn hook(&self) -> Option<&Hook> {
        match &self.kind {
            CmdKind::Call { hook, .. } => hook.as_ref(),
            _ => None,
        }
    }

    pub fn for_each_ident(&self, f: &mut impl FnMut(&str)) {
        match &self.kind {
            CmdKind::Assign { lhs, rhs } => {
                for l in lhs {
                    f(l.name());
                    if let AssignLhs::Map { index, .. } = l {
                        index.for_each_ident(f);
                    }
                }
                for r in rhs {
                    r.for_each_ident(f);
                }
            }
            CmdKind::Call { args, outs, .. } => {
                for a in args {
                    a.for_each_ident(f);
                }
                for o in outs {
                    f(o);
                }
            }
            CmdKind::Assume(e) | CmdKind::Assert(e) => e.for_each_ident(f),
            CmdKind::Havoc(names) => {
                for n in names {
                    f(n);
                }
            }
        }
    }

    pub fn rename_idents(&mut self, rename: &impl Fn(&str) -> Option<String>) {
        match &mut self.kind {
            CmdKind::Assign { lhs, rhs } => {
                for l in lhs.iter_mut() {
                    match l {
                        AssignLhs::Simple(name) => {
                            if let Some(new) = rename(name) {
                                *name = new;
                            }
                        }
                        AssignLhs::Map { map, index } => {
                            if let Some(new) = rename(map) {
                                *map = new;
                            }
                            index.rename_idents(rename);
                        }
                    }
                }
                for r in rhs.iter_mut() {
                    r.rename_idents(rename);
                }
            }
            CmdKind::Call { args, outs, .. } => {
                for a in args.iter_mut() {
                    a.rename_idents(rename);
                }
                for o in outs.iter_mut() {
                    if let Some(new) = rename(o) {
                        *o = new;
                    }
                }
            }
            CmdKind::Assume(e) | CmdKind::Assert(e) => e.rename_idents(rename),
            CmdKind::Havoc(names) => {
                for n in names.iter_mut() {
                    if let Some(new) = rename(n) {
                        *n = new;
                    }
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminator {
    Return,
    Goto(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub label: String,
    pub cmds: Vec<Cmd>,
    pub term: Terminator,
}

impl Block {
    pub fn new(label: impl Into<String>, cmds: Vec<Cmd>, term: Terminator) -> Self {
        Self {
            label: label.into(),
            cmds,
            term,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVar {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub attrs: Attributes,
}

impl GlobalVar {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            attrs: Attributes::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub attrs: Attributes,
}

impl Constant {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            unique: false,
            attrs: Attributes::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Variable>,
    #[serde(default)]
    pub returns: Vec<Variable>,
    #[serde(default)]
    pub requires: Vec<Expr>,
    #[serde(default)]
    pub ensures: Vec<Expr>,
    #[serde(default)]
    pub modifies: Vec<String>,
    #[serde(default)]
    pub attrs: Attributes,
    #[serde(default)]
    pub role: Role,
}

impl Procedure {
    pub fn new(name: impl Into<String>, params: Vec<Variable>) -> Self {
        Self {
            name: name.into(),
            params,
            returns: Vec::new(),
            requires: Vec::new(),
            ensures: Vec::new(),
            modifies: Vec::new(),
            attrs: Attributes::new(),
            role: Role::Original,
        }
    }

    pub fn add_modifies(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.modifies.contains(&name) {
            self.modifies.push(name);
        }
    }

    pub fn add_requires(&mut self, expr: Expr) {
        if !self.requires.contains(&expr) {
            self.requires.push(expr);
        }
    }

    pub fn add_ensures(&mut self, expr: Expr) {
        if !self.ensures.contains(&expr) {
            self.ensures.push(expr);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Variable>,
    #[serde(default)]
    pub returns: Vec<Variable>,
    #[serde(default)]
    pub locals: Vec<Variable>,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub attrs: Attributes,
    #[serde(default)]
    pub role: Role,
}

impl Implementation {
    pub fn new(name: impl Into<String>, params: Vec<Variable>, blocks: Vec<Block>) -> Self {
        Self {
            name: name.into(),
            params,
            returns: Vec::new(),
            locals: Vec::new(),
            blocks,
            attrs: Attributes::new(),
            role: Role::Original,
        }
    }

    pub fn block(&self, label: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.label == label)
    }

    pub fn block_mut(&mut self, label: &str) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.label == label)
    }

    pub fn cmds(&self) -> impl Iterator<Item = &Cmd> {
        self.blocks.iter().flat_map(|b| b.cmds.iter())
    }

    pub fn cmds_mut(&mut self) -> impl Iterator<Item = &mut Cmd> {
        self.blocks.iter_mut().flat_map(|b| b.cmds.iter_mut())
    }

    /// Names of every procedure called from this body, deduplicated.
    pub fn callees(&self) -> BTreeSet<String> {
        self.cmds()
            .filter_map(|c| c.callee().map(str::to_string))
            .collect()
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.params
            .iter()
            .chain(&self.returns)
            .chain(&self.locals)
            .any(|v| v.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decl {
    Global(GlobalVar),
    Constant(Constant),
    Procedure(Procedure),
    Implementation(Implementation),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Global(g) => &g.name,
            Decl::Constant(c) => &c.name,
            Decl::Procedure(p) => &p.name,
            Decl::Implementation(i) => &i.name,
        }
    }
}

impl From<GlobalVar> for Decl {
    fn from(g: GlobalVar) -> Self {
        Decl::Global(g)
    }
}

impl From<Constant> for Decl {
    fn from(c: Constant) -> Self {
        Decl::Constant(c)
    }
}

impl From<Procedure> for Decl {
    fn from(p: Procedure) -> Self {
        Decl::Procedure(p)
    }
}

impl From<Implementation> for Decl {
    fn from(i: Implementation) -> Self {
        Decl::Implementation(i)
    }
}

/// The program under transformation: an ordered list of top-level declarations.
///
/// Lookups return `None` for unknown names so passes can probe for optional
/// artifacts. Removal keeps the relative order of everything else.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

impl Program {
    pub fn new() -> Self {
        Self { decls: Vec::new() }
    }

    pub fn add_decl(&mut self, decl: impl Into<Decl>) {
        self.decls.push(decl.into());
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVar> {
        self.decls.iter().find_map(|d| match d {
            Decl::Global(g) if g.name == name => Some(g),
            _ => None,
        })
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.decls.iter().find_map(|d| match d {
            Decl::Constant(c) if c.name == name => Some(c),
            _ => None,
        })
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.decls.iter().find_map(|d| match d {
            Decl::Procedure(p) if p.name == name => Some(p),
            _ => None,
        })
    }

    pub fn procedure_mut(&mut self, name: &str) -> Option<&mut Procedure> {
        self.decls.iter_mut().find_map(|d| match d {
            Decl::Procedure(p) if p.name == name => Some(p),
            _ => None,
        })
    }

    pub fn implementation(&self, name: &str) -> Option<&Implementation> {
        self.decls.iter().find_map(|d| match d {
            Decl::Implementation(i) if i.name == name => Some(i),
            _ => None,
        })
    }

    pub fn implementation_mut(&mut self, name: &str) -> Option<&mut Implementation> {
        self.decls.iter_mut().find_map(|d| match d {
            Decl::Implementation(i) if i.name == name => Some(i),
            _ => None,
        })
    }

    /// A global variable or constant with this name exists.
    pub fn has_global_symbol(&self, name: &str) -> bool {
        self.global(name).is_some() || self.constant(name).is_some()
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalVar> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Global(g) => Some(g),
            _ => None,
        })
    }

    pub fn constants(&self) -> impl Iterator<Item = &Constant> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Constant(c) => Some(c),
            _ => None,
        })
    }

    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Procedure(p) => Some(p),
            _ => None,
        })
    }

    pub fn implementations(&self) -> impl Iterator<Item = &Implementation> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Implementation(i) => Some(i),
            _ => None,
        })
    }

    pub fn implementations_mut(&mut self) -> impl Iterator<Item = &mut Implementation> {
        self.decls.iter_mut().filter_map(|d| match d {
            Decl::Implementation(i) => Some(i),
            _ => None,
        })
    }

    pub fn implementation_names(&self) -> Vec<String> {
        self.implementations().map(|i| i.name.clone()).collect()
    }

    pub fn remove_procedure(&mut self, name: &str) -> Option<Procedure> {
        let idx = self
            .decls
            .iter()
            .position(|d| matches!(d, Decl::Procedure(p) if p.name == name))?;
        match self.decls.remove(idx) {
            Decl::Procedure(p) => Some(p),
            _ => None,
        }
    }

    pub fn remove_implementation(&mut self, name: &str) -> Option<Implementation> {
        let idx = self
            .decls
            .iter()
            .position(|d| matches!(d, Decl::Implementation(i) if i.name == name))?;
        match self.decls.remove(idx) {
            Decl::Implementation(i) => Some(i),
            _ => None,
        }
    }

    pub fn remove_constant(&mut self, name: &str) -> Option<Constant> {
        let idx = self
            .decls
            .iter()
            .position(|d| matches!(d, Decl::Constant(c) if c.name == name))?;
        match self.decls.remove(idx) {
            Decl::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Every implementation whose body calls `callee`.
    pub fn callers_of(&self, callee: &str) -> Vec<String> {
        self.implementations()
            .filter(|i| i.cmds().any(|c| c.callee() == Some(callee)))
            .map(|i| i.name.clone())
            .collect()
    }
}
