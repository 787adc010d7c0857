//! Single-flight behaviour of the coordinator entry points.

mod common;

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{fixture, ingest, recognition_config, TestEngine};
use picseek::db::RecordStatus;
use picseek::{Coordinator, RunOutcome};

#[test]
fn overlapping_recognition_runs_coalesce() {
    let fx = fixture();
    let id = ingest(&fx.index, 1, None);

    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);

    let engine = Arc::new(TestEngine::new(move |_| {
        started_tx.lock().unwrap().send(()).unwrap();
        release_rx.lock().unwrap().recv_timeout(Duration::from_secs(10)).unwrap();
        Ok("银行回单".to_string())
    }));
    let coordinator = Arc::new(Coordinator::new(
        fx.index.clone(),
        engine.clone(),
        recognition_config(5, 3),
    ));

    let running = {
        let coordinator = coordinator.clone();
        thread::spawn(move || coordinator.run_recognition_batch())
    };

    started_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(coordinator.recognition_running());

    assert!(coordinator.run_recognition_batch().unwrap().is_coalesced());
    assert!(coordinator.drain_recognition().unwrap().is_coalesced());

    // A different kind of run is not held up.
    assert!(!coordinator.run_archive_check().unwrap().is_coalesced());

    release_tx.send(()).unwrap();
    match running.join().unwrap().unwrap() {
        RunOutcome::Completed(report) => assert_eq!(report.recognized, 1),
        RunOutcome::Coalesced => panic!("first run should have completed"),
    }

    assert!(!coordinator.recognition_running());
    assert_eq!(engine.calls(), 1);
    assert_eq!(engine.acquired(), engine.released());
    assert_eq!(fx.index.get(id).unwrap().status, RecordStatus::Recognized);
}

#[test]
fn flight_is_released_after_failure() {
    let fx = fixture();
    ingest(&fx.index, 1, None);

    let engine = Arc::new(TestEngine::constant("对账单"));
    engine.unavailable.store(true, std::sync::atomic::Ordering::SeqCst);
    let coordinator = Coordinator::new(fx.index.clone(), engine.clone(), recognition_config(5, 3));

    assert!(coordinator.run_recognition_batch().is_err());
    assert!(!coordinator.recognition_running());

    engine.unavailable.store(false, std::sync::atomic::Ordering::SeqCst);
    match coordinator.drain_recognition().unwrap() {
        RunOutcome::Completed(report) => {
            assert_eq!(report.batches, 1);
            assert_eq!(report.totals.recognized, 1);
        }
        RunOutcome::Coalesced => panic!("nothing else was running"),
    }
}

#[test]
fn separate_coordinators_share_the_flight() {
    let fx = fixture();
    let id = ingest(&fx.index, 1, None);

    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);

    let engine = Arc::new(TestEngine::new(move |_| {
        started_tx.lock().unwrap().send(()).unwrap();
        release_rx.lock().unwrap().recv_timeout(Duration::from_secs(10)).unwrap();
        Ok(String::new())
    }));
    // As with the CLI next to the daemon: each has its own coordinator.
    let daemon = Arc::new(Coordinator::new(
        fx.index.clone(),
        engine.clone(),
        recognition_config(5, 3),
    ));
    let cli = Coordinator::new(fx.index.clone(), engine.clone(), recognition_config(5, 3));

    let running = {
        let daemon = daemon.clone();
        thread::spawn(move || daemon.drain_recognition())
    };
    started_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    assert!(!cli.recognition_running());
    assert!(cli.run_recognition_batch().unwrap().is_coalesced());
    assert!(cli.drain_recognition().unwrap().is_coalesced());

    release_tx.send(()).unwrap();
    assert!(!running.join().unwrap().unwrap().is_coalesced());

    // One empty result counted once.
    assert_eq!(engine.calls(), 1);
    assert_eq!(fx.index.get(id).unwrap().failure_count, 1);

    // Free again once the other side is done.
    release_tx.send(()).unwrap();
    assert!(!cli.run_recognition_batch().unwrap().is_coalesced());
    assert_eq!(fx.index.get(id).unwrap().failure_count, 2);
}
