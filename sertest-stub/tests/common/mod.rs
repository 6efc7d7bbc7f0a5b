#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;

use sertest_harness::{init_tracing, DaemonOptions, IoContext, TerminationSchedule};
use std::time::Duration;

pub fn stub_exe() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("ser2net-stub").to_path_buf()
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

pub fn tcp_spec(port: u16) -> String {
    format!("tcp,127.0.0.1,{port}")
}

/// One accepter bridged to the daemon's stdio.
pub fn stdio_config(port: u16) -> String {
    format!(
        "connections:\n  - name: stdio-bridge\n    accepter: {}\n    peer: stdio\n",
        tcp_spec(port)
    )
}

/// Two accepters whose clients are spliced together.
pub fn pair_config(left: u16, right: u16) -> String {
    format!(
        "connections:\n  - name: pair\n    accepter: {}\n    peer: {}\n",
        tcp_spec(left),
        tcp_spec(right)
    )
}

pub fn stub_options() -> DaemonOptions {
    DaemonOptions::default()
        .executable(stub_exe())
        .schedule(TerminationSchedule {
            rounds: 4,
            kill_rounds: 2,
            round_timeout: Duration::from_secs(2),
        })
}

pub fn context() -> IoContext {
    init_tracing();
    IoContext::new().expect("io context")
}

/// `true` while a process with `pid` exists (zombies included).
pub fn process_exists(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}
