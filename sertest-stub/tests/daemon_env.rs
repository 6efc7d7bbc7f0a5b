//! `SER2NET_EXEC` lookup. Kept in its own test binary: it is the only test
//! that mutates the process environment, and nothing else runs beside it.

mod common;

use std::path::PathBuf;

use sertest_harness::{Daemon, DaemonOptions};

use common::{context, free_port, stdio_config, stub_exe};

#[test]
fn executable_comes_from_the_environment() {
    std::env::set_var("SER2NET_EXEC", "");
    assert_eq!(DaemonOptions::from_env().executable, PathBuf::from("ser2net"));

    std::env::set_var("SER2NET_EXEC", stub_exe());
    let options = DaemonOptions::from_env();
    std::env::remove_var("SER2NET_EXEC");
    assert_eq!(options.executable, stub_exe());

    let ctx = context();
    let mut daemon =
        Daemon::start_with(&ctx, &stdio_config(free_port()), options).expect("daemon");
    daemon.terminate().expect("terminate");
    assert!(!daemon.is_running());
}
