//! Agent process lifecycle.
//!
//! ## Module Map
//!
//! | Module   | Responsibility                                              |
//! |----------|-------------------------------------------------------------|
//! | `runner` | `ProcessRunner`, `ProcessSpec`, `RunningProcess` event loop |
//! | `output` | `Transcript`: per-stream and interleaved UTF-8 capture      |
//! | `result` | `ExecutionResult`, `TerminalState`                          |
//! | `group`  | Process-group kill                                          |

pub mod group;
pub mod output;
pub mod result;
pub mod runner;

pub use output::{OutputChunk, StreamKind, Transcript};
pub use result::{ExecutionResult, TerminalState};
pub use runner::{ProcessEvent, ProcessRunner, ProcessSpec, RunningProcess, StdinMode};
