//! Daemon start/ready/terminate against the stub binary.

mod common;

use std::time::{Duration, Instant};

use sertest_harness::{Daemon, HarnessError, Signal};
use sertest_io::EndpointError;

use common::{context, free_port, process_exists, stdio_config, stub_options};

#[test]
fn start_observes_ready_and_terminate_reaps() {
    let ctx = context();
    let started = Instant::now();
    let mut daemon =
        Daemon::start_with(&ctx, &stdio_config(free_port()), stub_options()).expect("daemon");
    assert!(started.elapsed() < Duration::from_millis(2000));

    let pid = daemon.pid();
    assert!(daemon.is_running());
    assert!(process_exists(pid));
    let config_path = daemon.config_path().to_path_buf();
    assert!(config_path.exists());

    daemon.terminate().expect("terminate");
    assert!(!daemon.is_running());
    assert!(!process_exists(pid), "pid {pid} still exists after terminate");

    // Second call performs no signalling and succeeds.
    daemon.terminate().expect("second terminate");

    drop(daemon);
    assert!(!config_path.exists(), "config file removed with the daemon");
}

#[test]
fn silent_daemon_is_a_setup_timeout() {
    let ctx = context();
    let options = stub_options().extra_args("--no-ready");
    let started = Instant::now();
    let err = Daemon::start_with(&ctx, &stdio_config(free_port()), options).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, HarnessError::SetupTimeout { .. }), "got: {err}");
    assert!(elapsed >= Duration::from_millis(1900), "gave up early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(4000), "took too long: {elapsed:?}");
}

#[test]
fn daemon_exiting_before_ready_is_a_read_fault() {
    let ctx = context();
    let err = Daemon::start_with(&ctx, "connections: not-a-list\n", stub_options()).unwrap_err();
    match err {
        HarnessError::Read { ref name, ref source } => {
            assert_eq!(name, "ser2net daemon");
            assert!(matches!(source, EndpointError::RemoteClosed), "got: {source}");
        }
        other => panic!("expected read fault, got {other}"),
    }
}

#[test]
fn sigterm_stops_the_daemon_cleanly() {
    let ctx = context();
    let mut daemon =
        Daemon::start_with(&ctx, &stdio_config(free_port()), stub_options()).expect("daemon");

    daemon.signal(Signal::SIGTERM).expect("deliver SIGTERM");
    let status = daemon
        .process()
        .wait_timeout(Duration::from_secs(5))
        .expect("wait")
        .expect("daemon exits on SIGTERM");
    assert!(status.success(), "exit status: {status}");

    let err = daemon.signal(Signal::SIGTERM).unwrap_err();
    assert!(
        matches!(err, HarnessError::Endpoint(EndpointError::ProcessExited { .. })),
        "got: {err}"
    );
    daemon.terminate().expect("terminate after exit");
}

#[test]
fn dropping_a_running_daemon_terminates_it() {
    let ctx = context();
    let daemon =
        Daemon::start_with(&ctx, &stdio_config(free_port()), stub_options()).expect("daemon");
    let pid = daemon.pid();
    drop(daemon);
    assert!(!process_exists(pid));
}
