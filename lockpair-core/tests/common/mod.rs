#![allow(dead_code)]

pub mod driver;
pub mod interp;
