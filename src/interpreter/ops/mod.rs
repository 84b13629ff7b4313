pub mod access;
pub mod assign;
pub mod binary;
pub mod math;
pub mod unary;

// Most of these are `impl Interpreter` blocks
