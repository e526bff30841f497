//! Process exit codes of the runner.
//! A job failing at step N exits with `STEP_FAILURE_BASE + N`.

use hhrun_core::domain::report::JobStep;

pub const SUCCESS: i32 = 0;
pub const CONFIG_ERROR: i32 = 2; // Bad configuration, arguments or job file
pub const STEP_FAILURE_BASE: i32 = 10;

pub fn for_step(step: JobStep) -> i32 {
    STEP_FAILURE_BASE + i32::from(step.number())
}
