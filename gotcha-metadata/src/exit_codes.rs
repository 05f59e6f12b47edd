// Documented exit codes for `gotcha` failures.
//
// `gotcha` runs may fail for a variety of reasons. This structure documents the
// exit codes that occur in expected-failure cases. Unknown/unexpected failures
// always result in exit code 1, matching the "tests failed" code, since by the
// time an unexpected error reaches the top level no distinction can usefully be
// drawn between it and a real test failure.
pub enum GotchaExitCode {}

impl GotchaExitCode {
    /// The stream closed cleanly, the child exited 0, and no test failed.
    pub const OK: i32 = 0;

    /// At least one test failed, or the parse produced failures.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// The child toolchain could not be spawned at all (not a test failure).
    pub const SPAWN_FAILED: i32 = 2;

    /// The user cancelled the run (Ctrl-C / Esc / `q`), per POSIX convention
    /// for SIGINT.
    pub const CANCELLED: i32 = 130;
}
