//! Shared numeric limits and protocol constants.

/// Maximum number of axes in a single joint group.
pub const MAX_AXES_PER_GROUP: usize = 8;

/// Default maximum number of joint groups a controller instance exposes.
pub const MAX_GROUPS_DEFAULT: usize = 4;

/// Default maximum number of concurrently connected clients.
pub const MAX_CONNECTIONS_DEFAULT: usize = 4;

/// Default increment queue capacity per group (Q).
pub const QUEUE_CAPACITY_DEFAULT: usize = 200;

/// Default interpolation period, in milliseconds.
pub const INTERPOLATION_PERIOD_MS_DEFAULT: u32 = 4;

/// Default queue-lock acquisition timeout, in milliseconds.
pub const Q_LOCK_TIMEOUT_MS_DEFAULT: u64 = 100;

/// Default bound on polling for servo-on / trajectory-mode-ready confirmation, in milliseconds.
pub const MOTION_START_TIMEOUT_MS_DEFAULT: u64 = 10_000;

/// Default period between motion-ready poll attempts, in milliseconds.
pub const MOTION_START_CHECK_PERIOD_MS_DEFAULT: u64 = 100;

/// Default bound on polling for queues to drain during stop-motion, in milliseconds.
pub const MOTION_STOP_TIMEOUT_MS_DEFAULT: u64 = 5_000;

/// Number of servo-power retry attempts before giving up (FR per §4.E).
pub const SERVO_POWER_RETRY_ATTEMPTS: u32 = 5;

/// Reported application version string, echoed by GET_VERSION.
pub const APPLICATION_VERSION: &str = "motion-server-1.0.0";

/// Maximum encoded length of the version string in a GET_VERSION_REPLY body.
pub const VERSION_MAX_LEN: usize = 24;

/// I/O address of the "inc-move-done" status bit raised by `stop-traj-mode`.
pub const INC_MOVE_DONE_IO_ADDR: i32 = 1;

/// I/O address of the "motion-server-connected" status bit raised on accept
/// and cleared once the last connection drops (§4.G).
pub const MOTION_SERVER_CONNECTED_IO_ADDR: i32 = 2;

static_assertions::const_assert!(MAX_AXES_PER_GROUP <= 64);
