//! Command implementations.
//!
//! Each command loads an [`EvalContext`], wires the ports and hands off to
//! the library modules; printing to stdout happens only here.
mod check;
mod context;
mod init;
mod inspect;
mod run;

pub(crate) use check::run_check;
pub(crate) use context::EvalContext;
pub(crate) use init::run_init;
pub(crate) use inspect::run_inspect;
pub(crate) use run::{run_baseline, run_eval};
