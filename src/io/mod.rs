//! I/O for persisted artifacts.
//!
//! Per-sample field files (initial condition, observation, mask,
//! recovered estimates) and the aggregate results table, all in a plain
//! text format with `#` headers. A missing or malformed artifact is
//! fatal to that sample's evaluation step, not to the whole run.

mod field_file;
mod results;

pub use field_file::{
    read_stack_file, read_state_file, write_stack_file, write_state_file, FieldFileError,
};
pub use results::{read_results, write_results};
