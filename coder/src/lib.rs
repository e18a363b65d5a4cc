//! Iterative LLM code-editing agent.
//!
//! Each turn sends the task, the previous turn's summary and everything learned
//! so far to a chat model, then applies the response. The architecture keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (response parsing, fuzzy patching,
//!   context accumulation, turn state). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (filesystem, model API, shell commands,
//!   prompts, config) behind traits so tests can script them.
//!
//! Orchestration modules ([`turn`], [`looping`]) compose the two into the
//! agent loop driven by the `coder` binary.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod turn;
