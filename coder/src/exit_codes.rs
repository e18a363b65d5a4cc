//! Stable exit codes for the `coder` CLI.

/// The model signalled completion.
pub const OK: i32 = 0;
/// Invalid config or arguments, a model error, or an unparseable response.
pub const FAILED: i32 = 1;
/// The turn budget ran out before the model signalled completion.
pub const EXHAUSTED: i32 = 2;
