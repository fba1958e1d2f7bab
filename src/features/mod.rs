//! Conveniences layered over resolution results: cookie persistence and
//! ready-to-paste download tool command lines.

pub mod commands;
pub mod storage;
