use lab_bench::{
    load_series, parse_period, CancellationToken, PlaceholderSupply, RecordBound, RecorderState,
    SamplingRecorder,
};
use std::{
    path::Path,
    process::{Command, Output},
    thread,
    time::Duration,
};
use tempfile::tempdir;

fn recorder(token: CancellationToken) -> SamplingRecorder<PlaceholderSupply> {
    SamplingRecorder::new(PlaceholderSupply::new(1.0, 0.1), token)
}

#[test]
fn half_second_period_for_two_seconds_gives_four_or_five_samples() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run1.dat");
    let period = parse_period("0.5").unwrap();
    let bound: RecordBound = "2.0".parse().unwrap();

    let series = recorder(CancellationToken::new())
        .record(&path, period, bound)
        .unwrap();

    assert!(
        (4..=5).contains(&series.len()),
        "unexpected sample count {}",
        series.len()
    );
    let span = *series.elapsed_seconds().last().unwrap();
    assert!(span <= 2.0 + 0.5 + 0.1, "span {span} too long");

    let loaded = load_series(&path).unwrap();
    assert_eq!(loaded.len(), series.len());
    assert_eq!(loaded.file_name, path.display().to_string());
    assert_eq!(loaded.version, series.version);
}

#[test]
fn bounded_runs_terminate_with_non_decreasing_timestamps() {
    for period_ms in [0, 7, 25] {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bounded.json");
        let bound = Duration::from_millis(150);
        let period = Duration::from_millis(period_ms);

        let series = recorder(CancellationToken::new())
            .record(&path, period, RecordBound::Bounded(bound))
            .unwrap();

        assert!(!series.is_empty());
        assert!(series.values.windows(2).all(|w| w[0].time <= w[1].time));
        let span = *series.elapsed_seconds().last().unwrap();
        let slack = (bound + period + Duration::from_millis(100)).as_secs_f64();
        assert!(span <= slack, "period {period_ms} ms: span {span} > {slack}");
    }
}

#[test]
fn unbounded_run_only_stops_when_cancelled() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("unbounded.json");
    let token = CancellationToken::new();
    let remote = token.clone();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        remote.cancel();
    });

    let duration: RecordBound = "0".parse().unwrap();
    assert_eq!(duration, RecordBound::Unbounded);

    let mut recorder = recorder(token);
    let series = recorder
        .record(&path, Duration::from_millis(20), duration)
        .unwrap();
    canceller.join().unwrap();

    assert_eq!(recorder.state(), RecorderState::Done);
    // Roughly 300 ms / 20 ms worth of samples; the run did not end on its own
    assert!(series.len() >= 5, "only {} samples", series.len());
    assert_eq!(load_series(&path).unwrap(), series);
}

fn run_record_iv(dir: &Path, args: [&str; 3]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tenma-psu"))
        .current_dir(dir)
        .arg("--record_iv")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn malformed_duration_fails_before_destination_exists() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never.json");

    let output = run_record_iv(dir.path(), [path.to_str().unwrap(), "0.1", "abc"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown duration abc"));
    assert!(!path.exists());
}

#[test]
fn malformed_period_fails_before_destination_exists() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never.json");

    let output = run_record_iv(dir.path(), [path.to_str().unwrap(), "fast", "1"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid period fast"));
    assert!(!path.exists());
}
