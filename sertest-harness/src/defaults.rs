use std::time::Duration;

/// Environment variable naming the daemon executable to run.
pub const DAEMON_EXEC_ENV: &str = "SER2NET_EXEC";
pub const DEFAULT_DAEMON_EXEC: &str = "ser2net";

/// Fixed flags: run in foreground, debug, then the config file path.
pub const DAEMON_FLAGS: [&str; 2] = ["-r", "-d"];
pub const DAEMON_CONFIG_FLAG: &str = "-c";

/// Line the daemon prints on stdout once it is serving.
pub const READY_LINE: &[u8] = b"Ready\n";
pub const READY_TIMEOUT: Duration = Duration::from_millis(2000);

pub const DAEMON_HANDLER_NAME: &str = "ser2net daemon";

/// Maximum bytes handed to one endpoint write.
pub const DEFAULT_CHUNK_SIZE: usize = 10240;

/// Read buffer for endpoints allocated by the transfer helpers and the daemon.
pub const DEFAULT_BUFSIZE: usize = 1024;

pub const TERMINATE_ROUNDS: u32 = 10;
/// Leading rounds that send SIGKILL before the schedule falls back to SIGTERM.
pub const TERMINATE_KILL_ROUNDS: u32 = 5;
pub const TERMINATE_ROUND_TIMEOUT: Duration = Duration::from_secs(5);

pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(1000);
pub const SIMUL_TRANSFER_TIMEOUT: Duration = Duration::from_millis(10000);
pub const CLOSE_TIMEOUT: Duration = Duration::from_millis(1000);
