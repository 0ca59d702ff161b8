//! Exit code constants of the `dockyard` process.
//!
//! Constants are prefixed with the phase they're valid for. When an image's foreground process
//! ran, its own exit code is used instead.

pub const GENERIC_SUCCESS: i32 = 0;
pub const GENERIC_UNSPECIFIED_ERROR: i32 = 1;

pub const BUILD_FAILED: i32 = 10;

pub const LAUNCH_INVALID_CONFIG: i32 = 20;
pub const LAUNCH_BIND_ERROR: i32 = 21;
pub const LAUNCH_ENTRY_POINT_LOAD_ERROR: i32 = 22;
