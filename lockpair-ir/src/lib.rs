#![forbid(unsafe_code)]

pub mod ir;

pub mod attrs;
pub mod debug;
pub mod emit;
pub mod validate;

pub use ir::*;
pub use attrs::*;
pub use debug::*;
pub use emit::*;
pub use validate::*;
