// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for tessera runs.
///
/// Consumers are expected to treat any value other than [`OK`](Self::OK) as a failure.
pub enum TesseraExitCode {}

impl TesseraExitCode {
    /// Every test passed, or no tests were required to run.
    pub const OK: i32 = 0;

    /// One or more tests or test files failed.
    ///
    /// Unknown/unexpected failures also result in this exit code.
    pub const TEST_RUN_FAILED: i32 = 1;
}
