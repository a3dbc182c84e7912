//! Stable exit codes for harness CLI commands.

/// Command succeeded and every test passed.
pub const OK: i32 = 0;
/// Invalid suite/arguments or an internal error.
pub const INVALID: i32 = 1;
/// Suite ran to completion but at least one test failed.
pub const TESTS_FAILED: i32 = 2;
/// Refused to start: recursion depth ceiling exceeded.
pub const DEPTH_EXCEEDED: i32 = 3;
