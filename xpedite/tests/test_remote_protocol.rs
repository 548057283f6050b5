//! Remote control protocol over the framed TCP transport.
//!
//! One framework per process, so attach, contention, and disconnect
//! cleanup run as a single scenario.

use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;
use xpedite::transport::{read_frame, write_frame, STATUS_ERROR, STATUS_OK};
use xpedite::{ProbeKey, ProfileInfo};

fn control_port(app_info: &std::path::Path) -> u16 {
    let text = std::fs::read_to_string(app_info).expect("app info missing");
    text.lines()
        .find_map(|line| line.strip_prefix("port: "))
        .and_then(|p| p.parse().ok())
        .expect("port line missing")
}

fn request(stream: &mut TcpStream, text: &str) -> (u8, String) {
    write_frame(stream, text.as_bytes()).unwrap();
    let payload = read_frame(stream).unwrap();
    (payload[0], String::from_utf8_lossy(&payload[1..]).into_owned())
}

/// Retry until the runtime grants the remote session (it answers busy
/// while a local session is winding down).
fn await_remote_turn(stream: &mut TcpStream) {
    for _ in 0..200 {
        let (status, _) = request(stream, "Ping");
        if status == STATUS_OK {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("remote session never granted");
}

#[test]
fn test_remote_attach_contention_and_cleanup() {
    let _ = env_logger::builder().is_test(true).try_init();

    let remote_probe = xpedite::probes::registry().register("remote_a.rs", 10, "");
    let local_probe = xpedite::probes::registry().register("remote_local.rs", 5, "");

    let dir = tempfile::tempdir().unwrap();
    let app_info = dir.path().join("app.info");
    assert!(xpedite::initialize_with(&app_info, "127.0.0.1", false));

    let port = control_port(&app_info);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();

    // ── basic request round trips ───────────────────────────────────────
    assert_eq!(request(&mut stream, "Ping"), (STATUS_OK, String::new()));

    let (status, tsc_hz) = request(&mut stream, "TscHz");
    assert_eq!(status, STATUS_OK);
    assert!(tsc_hz.parse::<u64>().unwrap() > 0);

    let (status, probe_list) = request(&mut stream, "ListProbes");
    assert_eq!(status, STATUS_OK);
    assert!(probe_list.contains("remote_a.rs,10,,0"));

    let (status, error) = request(&mut stream, "Bogus");
    assert_eq!(status, STATUS_ERROR);
    assert!(error.contains("Bogus"));

    // zero-length frame parses as an empty request
    write_frame(&mut stream, b"").unwrap();
    let payload = read_frame(&mut stream).unwrap();
    assert_eq!(payload[0], STATUS_ERROR);

    // ── contention: a local session holds the runtime ───────────────────
    let info = ProfileInfo::new(vec![ProbeKey::new("remote_local.rs", 5, "")], 1024);
    let guard = xpedite::profile(&info);
    assert!(guard.is_alive(), "local profile failed: {}", guard.errors());
    assert!(local_probe.is_enabled());

    let (status, error) = request(
        &mut stream,
        "BeginProfile --pollInterval 1 --samplesFilePattern /tmp/x.%.bin --samplesDataCapacity 1024",
    );
    assert_eq!(status, STATUS_ERROR);
    assert!(error.contains("active"));
    assert!(local_probe.is_enabled(), "local session must be unaffected");

    drop(guard);
    assert!(!local_probe.is_enabled());

    // ── disconnect cleans up ────────────────────────────────────────────
    await_remote_turn(&mut stream);

    let (status, _) = request(&mut stream, "ActivateProbe --file remote_a.rs --line 10");
    assert_eq!(status, STATUS_OK);
    assert!(remote_probe.is_enabled());

    drop(stream); // abrupt close, no EndProfile

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while remote_probe.is_enabled() {
        assert!(
            std::time::Instant::now() < deadline,
            "disconnect must disable session probes within a poll interval"
        );
        std::thread::sleep(Duration::from_millis(5));
    }

    // the runtime is dormant again and accepts a fresh profiler
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    assert_eq!(request(&mut stream, "Ping"), (STATUS_OK, String::new()));

    // framing corruption ends the connection
    let mut raw = Vec::new();
    raw.extend_from_slice(&u32::MAX.to_le_bytes());
    std::io::Write::write_all(&mut stream, &raw).unwrap();
    let mut sink = Vec::new();
    let closed = stream.read_to_end(&mut sink);
    assert!(
        matches!(closed, Ok(0) | Err(_)),
        "server must close a corrupt connection"
    );

    assert!(xpedite::halt());
}
