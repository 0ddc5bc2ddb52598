//! Compiler pipeline modules, in dependency order: tokens → lexer →
//! parser → surface AST → resolver → functional IR → type checker →
//! affine kernel → polyhedral model → translator → scheduler/sizer/
//! generator → backend.

pub mod affine;
pub mod ast;
pub mod emit;
pub mod fir;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod poly;
pub mod printer;
pub mod resolve;
pub mod tokens;
pub mod typecheck;
