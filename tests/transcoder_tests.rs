//! Process supervision with stand-in programs in place of ffmpeg
#![cfg(unix)]

use azaan_relay::config::TranscoderConfig;
use azaan_relay::{FfmpegTranscoder, RelayError, Transcoder, VenueId};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

// A script still open for writing in a concurrently forked child fails to exec
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

fn config(program: &str, stop_grace_ms: u64) -> TranscoderConfig {
    TranscoderConfig {
        program: program.to_string(),
        write_timeout_ms: 500,
        stop_grace_ms,
        ..TranscoderConfig::default()
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Wait for a script to report that its traps are installed
async fn wait_ready(marker: &Path) {
    for _ in 0..500 {
        if marker.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never became ready", marker.display());
}

/// Scripts live under the target dir; the system temp dir may be mounted noexec
fn workdir() -> TempDir {
    TempDir::new_in(env!("CARGO_TARGET_TMPDIR")).unwrap()
}

async fn start(
    program: &str,
    output_dir: &Path,
) -> azaan_relay::error::Result<azaan_relay::ProcessHandle> {
    start_with_grace(program, output_dir, 200).await
}

async fn start_with_grace(
    program: &str,
    output_dir: &Path,
    stop_grace_ms: u64,
) -> azaan_relay::error::Result<azaan_relay::ProcessHandle> {
    let transcoder = FfmpegTranscoder::new(config(program, stop_grace_ms));
    let venue = VenueId::parse("42").unwrap();
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    transcoder.start(&venue, output_dir).await
}

#[tokio::test]
async fn test_missing_program_is_spawn_error() {
    let tmp = workdir();

    let err = start("/nonexistent/azaan-ffmpeg", tmp.path()).await.unwrap_err();
    assert!(matches!(err, RelayError::Spawn(_)));
}

#[tokio::test]
async fn test_unexpected_exit_is_observed() {
    let tmp = workdir();
    let program = script(tmp.path(), "crash.sh", "exit 3");

    let handle = start(program.to_str().unwrap(), tmp.path()).await.unwrap();
    let mut exit = handle.exit_signal();

    let report = tokio::time::timeout(Duration::from_secs(5), exit.wait())
        .await
        .expect("exit was not reported");
    assert_eq!(report.code, Some(3));
    assert!(!report.forced);
    assert!(handle.has_exited());
}

#[tokio::test]
async fn test_stop_closes_input_and_waits_for_clean_exit() {
    let tmp = workdir();
    let sink = tmp.path().join("received.pcm");
    let ready = tmp.path().join("sink.ready");
    let program = script(
        tmp.path(),
        "sink.sh",
        // Only end of input may finish this one
        &format!(
            "trap '' INT\ntouch '{}'\ncat > '{}'",
            ready.display(),
            sink.display()
        ),
    );

    let mut handle = start(program.to_str().unwrap(), tmp.path()).await.unwrap();
    wait_ready(&ready).await;
    handle.write(&[1u8; 320]).await.unwrap();
    handle.write(&[2u8; 320]).await.unwrap();

    let report = handle.stop().await.expect("exit not confirmed");
    assert!(report.success(), "{}", report);

    let received = std::fs::read(&sink).unwrap();
    assert_eq!(received.len(), 640);
    assert!(received[..320].iter().all(|b| *b == 1));
    assert!(received[320..].iter().all(|b| *b == 2));

    // Already stopped
    assert_eq!(handle.stop().await, Some(report));
    assert!(matches!(
        handle.write(&[0u8; 4]).await,
        Err(RelayError::BrokenPipe)
    ));
}

#[tokio::test]
async fn test_stop_interrupts_before_grace_runs_out() {
    let tmp = workdir();
    let ready = tmp.path().join("interruptible.ready");
    // Never reads its input, exits cleanly on SIGINT
    let program = script(
        tmp.path(),
        "interruptible.sh",
        &format!(
            "trap 'exit 0' INT\ntouch '{}'\nwhile :; do sleep 0.1; done",
            ready.display()
        ),
    );

    let mut handle = start_with_grace(program.to_str().unwrap(), tmp.path(), 3000)
        .await
        .unwrap();
    wait_ready(&ready).await;

    let started = std::time::Instant::now();
    let report = handle.stop().await.expect("exit not confirmed");

    assert!(!report.forced, "{}", report);
    assert_eq!(report.code, Some(0));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_stop_kills_process_ignoring_eof_and_interrupt() {
    let tmp = workdir();
    let ready = tmp.path().join("stubborn.ready");
    let program = script(
        tmp.path(),
        "stubborn.sh",
        &format!("trap '' INT\ntouch '{}'\nexec sleep 30", ready.display()),
    );

    let mut handle = start(program.to_str().unwrap(), tmp.path()).await.unwrap();
    wait_ready(&ready).await;

    let report = tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("stop was not bounded")
        .expect("exit not confirmed");
    assert!(report.forced);
    assert!(!report.success());
}
