//! Cleaning pipeline and validation predicates bound per-field in a
//! rule's `ValidationMap`, including `rhai`-sandboxed script-expression
//! predicates.

mod cleaning;
mod predicates;
mod script;
mod validate;

pub use cleaning::clean;
pub use script::evaluate as evaluate_script;
pub use validate::validate;
