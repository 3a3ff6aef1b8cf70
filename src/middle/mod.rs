//! Semantic analysis and the optimizer. Names are resolved to symbols and
//! checked against their types before the syntax tree is lowered to a flat
//! three address IR, which is then optimized in place.

pub mod ir;
pub mod optimization;
pub mod resolve;
pub mod scope;
pub mod ty;
pub mod type_check;
