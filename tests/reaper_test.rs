// Integration test for the SIGCHLD reaper
//
// Lives in its own test binary: the reaper collects *every* child of the
// process, which would race with any other test that waits on a child.

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use simbridge::server::Reaper;

#[test]
fn test_reaper_collects_abandoned_children() {
    let reaper = Reaper::install().expect("Failed to install reaper");
    let before = reaper.reclaimed();

    let pids: Vec<u32> = (0..5)
        .map(|_| {
            Command::new("true")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .spawn()
                .expect("Failed to spawn `true`")
                .id()
        })
        .collect();

    let start = Instant::now();
    while reaper.reclaimed() < before + pids.len() && start.elapsed() < Duration::from_secs(10) {
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(reaper.reclaimed(), before + pids.len());

    // Nothing left to collect, and none of them lingers as a zombie.
    assert_eq!(reaper.reap_now(), 0);
    #[cfg(target_os = "linux")]
    for pid in &pids {
        assert!(
            !std::path::Path::new(&format!("/proc/{pid}")).exists(),
            "pid {pid} still in the process table"
        );
    }

    reaper.shutdown();
}
