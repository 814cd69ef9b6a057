//! Agent CLI driver: prompt staging, invocation, exit classification.

pub mod driver;
pub mod exit;
pub mod shell;

pub use driver::{PROMPT_FILE, run_generation};
pub use exit::{CliFailure, classify_exit};
pub use shell::{export_preamble, quote};
