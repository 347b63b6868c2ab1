//! Helpers used by the benchmark runner.
//!
//! - **`matrix_market`**: parses coordinate Matrix Market files into a `faer` sparse
//!   matrix, the usual source of large sparse test operators.
//!
//! - **`perf`**: peak resident set size on Linux and a wall-clock timing helper.

pub mod matrix_market;
pub mod perf;
