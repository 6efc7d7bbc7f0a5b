//! Two-endpoint transfers through the stub daemon.

mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sertest_harness::defaults::{SIMUL_TRANSFER_TIMEOUT, TRANSFER_TIMEOUT};
use sertest_harness::{check_transfer, check_transfer_simul, DaemonSession, HarnessError};

use common::{context, free_port, pair_config, stdio_config, stub_options, tcp_spec};

fn random_payload(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

fn tcp_pair_session(ctx: &sertest_harness::IoContext) -> DaemonSession {
    let (left, right) = (free_port(), free_port());
    DaemonSession::start(
        ctx,
        stub_options(),
        &pair_config(left, right),
        Some(&tcp_spec(left)),
        &tcp_spec(right),
    )
    .expect("session")
}

fn stdio_session(ctx: &sertest_harness::IoContext) -> DaemonSession {
    let port = free_port();
    DaemonSession::start(ctx, stub_options(), &stdio_config(port), None, &tcp_spec(port))
        .expect("session")
}

#[test]
fn hello_world_between_tcp_endpoints() {
    let ctx = context();
    let session = tcp_pair_session(&ctx);

    check_transfer(session.io1(), session.io2(), b"hello world", TRANSFER_TIMEOUT)
        .expect("io1 -> io2");
    check_transfer(session.io2(), session.io1(), b"hello world", TRANSFER_TIMEOUT)
        .expect("io2 -> io1");

    session.finish().expect("finish");
}

#[test]
fn hello_world_through_daemon_stdio() {
    let ctx = context();
    let session = stdio_session(&ctx);
    assert!(!session.io1().ignore_input(), "stdio is compared while in use");

    check_transfer(session.io2(), session.io1(), b"hello world", TRANSFER_TIMEOUT)
        .expect("tcp -> stdio");
    check_transfer(session.io1(), session.io2(), b"hello world", TRANSFER_TIMEOUT)
        .expect("stdio -> tcp");

    let pid = session.daemon().pid();
    session.finish().expect("finish");
    assert!(!common::process_exists(pid));
}

#[test]
fn simultaneous_random_transfer_both_ways() {
    let ctx = context();
    let data = random_payload(0x5e2_0e7, 1000);

    let session = tcp_pair_session(&ctx);
    check_transfer_simul(session.io1(), session.io2(), &data, SIMUL_TRANSFER_TIMEOUT)
        .expect("tcp pair");
    session.finish().expect("finish tcp pair");

    let session = stdio_session(&ctx);
    check_transfer_simul(session.io1(), session.io2(), &data, SIMUL_TRANSFER_TIMEOUT)
        .expect("stdio bridge");
    session.finish().expect("finish stdio bridge");
}

#[test]
fn large_transfer_spans_many_chunks() {
    let ctx = context();
    let data = random_payload(7, 100_000);
    let session = tcp_pair_session(&ctx);
    session.io1().set_chunk_size(4096);

    check_transfer(session.io1(), session.io2(), &data, SIMUL_TRANSFER_TIMEOUT)
        .expect("large transfer");
    session.finish().expect("finish");
}

#[test]
fn corrupted_expectation_reports_exact_offset() {
    let ctx = context();
    let data = random_payload(42, 1000);
    let mut expected = data.clone();
    expected[417] ^= 0x5a;

    let session = tcp_pair_session(&ctx);
    session.io2().set_compare(expected, true).expect("arm compare");
    session.io1().set_write_data(data.clone(), true).expect("arm write");

    let wrote = session.io1().wait_timeout(TRANSFER_TIMEOUT).expect("write");
    assert!(!wrote.timed_out());

    let err = session.io2().wait_timeout(TRANSFER_TIMEOUT).unwrap_err();
    match err {
        HarnessError::Compare {
            offset,
            expected: want,
            actual,
            ..
        } => {
            assert_eq!(offset, 417);
            assert_eq!(actual, data[417]);
            assert_eq!(want, data[417] ^ 0x5a);
        }
        other => panic!("expected compare fault, got {other}"),
    }
    assert!(!session.io2().is_armed());

    session.finish().expect("finish after fault");
}
