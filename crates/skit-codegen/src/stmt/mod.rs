//! Statement resolution and lowering.
//!
//! Statements are void-typed nodes in the same tree as expressions; the
//! submodules here mirror the expression layout, one per statement family.

pub mod block;
pub mod branch;
pub mod jump;
pub mod loops;
pub mod return_stmt;
pub mod switch;
pub mod var_def;
