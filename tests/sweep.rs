use std::fs;
use std::io::{self, Error, ErrorKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use thorium::devices::{Oscilloscope, PowerSupply};
use thorium::sweep::{NEUTRAL_OUTPUT, RAMP_DOWN, RAMP_UP};
use thorium::waveform::TIMEBASE_QUERY;
use thorium::{DaqError, DaqRunner, EventLogScope, StopSignal, SweepConfig, SweepReport, SweepState};

const WAVEFORM_QUERY: &str = "C1:INSPECT? SIMPLE;C3:INSPECT? SIMPLE;";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Status,
    Enable(bool),
    SetOutput(String),
    CloseSupply,
    Query(String),
    CloseScope,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

fn record(log: &CallLog, call: Call) {
    log.lock().unwrap().push(call);
}

struct MockSupply {
    log: CallLog,
    on: bool,
    // Polls that report a ramp after every set_output
    ramp_polls: usize,
    pending: usize,
    target: Option<String>,
    stuck_ramping_up: bool,
    stuck_ramping_down: bool,
}

impl MockSupply {
    fn new(log: &CallLog) -> Self {
        MockSupply { log: log.clone(), on: false, ramp_polls: 2, pending: 0, target: None, stuck_ramping_up: false, stuck_ramping_down: false }
    }
}

impl PowerSupply for MockSupply {
    fn status(&mut self, _channel: &str) -> io::Result<String> {
        record(&self.log, Call::Status);
        let base = if self.on { "ON" } else { "OFF" };
        let ramping_down = self.target.as_deref() == Some(NEUTRAL_OUTPUT);
        let stuck = self.target.is_some()
            && (if ramping_down { self.stuck_ramping_down } else { self.stuck_ramping_up });

        if self.pending > 0 || stuck {
            self.pending = self.pending.saturating_sub(1);
            let word = if ramping_down { "RAMP DOWN" } else { "RAMP UP" };
            return Ok(format!("{} {}", base, word));
        }
        Ok(base.to_owned())
    }

    fn enable(&mut self, _channel: &str, on: bool) -> io::Result<()> {
        record(&self.log, Call::Enable(on));
        self.on = on;
        Ok(())
    }

    fn set_output(&mut self, _channel: &str, value: &str) -> io::Result<()> {
        record(&self.log, Call::SetOutput(value.to_owned()));
        self.target = Some(value.to_owned());
        self.pending = self.ramp_polls;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        record(&self.log, Call::CloseSupply);
        Ok(())
    }
}

struct MockScope {
    log: CallLog,
    dt: &'static str,
    served: usize,
    stop_after: Option<(StopSignal, usize)>,
    fail_after: Option<usize>,
    close_fails: bool,
}

impl MockScope {
    fn new(log: &CallLog) -> Self {
        MockScope { log: log.clone(), dt: "1.0000e-09", served: 0, stop_after: None, fail_after: None, close_fails: false }
    }
}

impl Oscilloscope for MockScope {
    fn query(&mut self, command: &str) -> io::Result<String> {
        record(&self.log, Call::Query(command.to_owned()));
        if command == TIMEBASE_QUERY {
            return Ok(format!("C2:INSP \"HORIZ_INTERVAL     : {}         \"\n", self.dt));
        }
        if self.fail_after == Some(self.served) {
            return Err(Error::new(ErrorKind::TimedOut, "I/O timeout"));
        }

        let k = self.served;
        self.served += 1;
        if let Some((stop, n)) = &self.stop_after {
            if self.served == *n {
                stop.post();
            }
        }
        Ok(format!("C1:INSP \"\r\n  {k}.5  {k}.25\r\n\"\r\nC3:INSP \"\r\n  -1.5\r\n\"\r\n", k = k))
    }

    fn close(&mut self) -> io::Result<()> {
        record(&self.log, Call::CloseScope);
        if self.close_fails {
            return Err(Error::new(ErrorKind::BrokenPipe, "link already gone"));
        }
        Ok(())
    }
}

fn config(dir: &TempDir, volts: &[&str], events: u32) -> SweepConfig {
    let prefix = dir.path().join("run");
    let mut cfg = SweepConfig::new(
        volts.iter().map(|v| v.to_string()).collect(),
        [true, false, true, false],
        events,
        prefix.to_str().unwrap(),
        "0",
    );
    cfg.settle_delay = Duration::ZERO;
    cfg.poll_interval = Duration::ZERO;
    cfg.ramp_timeout = Duration::from_secs(5);
    cfg
}

fn run(cfg: SweepConfig, supply: MockSupply, scope: MockScope, stop: StopSignal) -> Result<SweepReport, DaqError> {
    let runner = DaqRunner::new(cfg, supply, scope, stop);
    assert_eq!(runner.state(), SweepState::Init);
    runner.run()
}

fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

fn set_points(log: &CallLog) -> Vec<String> {
    calls(log)
        .into_iter()
        .filter_map(|c| match c {
            Call::SetOutput(v) => Some(v),
            _ => None,
        })
        .collect()
}

fn waveform_queries(log: &CallLog) -> usize {
    calls(log).iter().filter(|c| **c == Call::Query(WAVEFORM_QUERY.to_owned())).count()
}

fn dumped(dir: &TempDir, volt: &str) -> String {
    fs::read_to_string(dir.path().join(format!("run_{}V", volt))).unwrap()
}

fn headers(text: &str) -> Vec<&str> {
    text.lines().filter(|l| l.contains(";CH")).collect()
}

fn assert_closed_once_in_order(log: &CallLog) {
    let calls = calls(log);
    let closes: Vec<&Call> = calls.iter().filter(|c| matches!(c, Call::CloseScope | Call::CloseSupply)).collect();
    assert_eq!(closes, vec![&Call::CloseScope, &Call::CloseSupply]);
    assert_eq!(&calls[calls.len() - 2..], &[Call::CloseScope, Call::CloseSupply]);
}

#[test]
fn full_sweep_visits_every_set_point() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();

    let report = run(config(&dir, &["100", "200"], 3), MockSupply::new(&log), MockScope::new(&log), StopSignal::new()).unwrap();

    let calls = calls(&log);
    assert_eq!(&calls[..3], &[Call::Status, Call::Enable(true), Call::SetOutput("100".into())]);
    assert_eq!(set_points(&log), vec!["100", "200", NEUTRAL_OUTPUT]);
    assert_eq!(waveform_queries(&log), 6);
    assert_closed_once_in_order(&log);

    assert_eq!(report.steps.len(), 2);
    assert!(report.steps.iter().all(|s| s.events == 3));
    assert!(!report.stopped_early);
    assert_eq!(report.dt, 1e-9);
    assert_eq!(report.steps[1].path, dir.path().join("run_200V"));
}

#[test]
fn timebase_is_queried_before_each_capture() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();

    run(config(&dir, &["100", "200"], 1), MockSupply::new(&log), MockScope::new(&log), StopSignal::new()).unwrap();

    let queries: Vec<Call> = calls(&log).into_iter().filter(|c| matches!(c, Call::Query(_))).collect();
    let tb = Call::Query(TIMEBASE_QUERY.to_owned());
    let wf = Call::Query(WAVEFORM_QUERY.to_owned());
    assert_eq!(queries, vec![tb.clone(), wf.clone(), tb, wf]);
}

#[test]
fn output_already_on_is_not_enabled_again() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let mut supply = MockSupply::new(&log);
    supply.on = true;

    run(config(&dir, &["50"], 1), supply, MockScope::new(&log), StopSignal::new()).unwrap();

    assert!(!calls(&log).iter().any(|c| matches!(c, Call::Enable(_))));
}

#[test]
fn per_step_dump_holds_only_that_step() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();

    run(config(&dir, &["100", "200"], 3), MockSupply::new(&log), MockScope::new(&log), StopSignal::new()).unwrap();

    let expected = vec!["0;CH1", "0;CH3", "1;CH1", "1;CH3", "2;CH1", "2;CH3"];
    assert_eq!(headers(&dumped(&dir, "100")), expected);
    assert_eq!(headers(&dumped(&dir, "200")), expected);

    // The fourth waveform served is the first of the second step
    assert!(dumped(&dir, "200").starts_with("0;CH1\n0.0,3.5\n1e-9,3.25\n\n\n0;CH3\n0.0,-1.5\n\n\n1;CH1\n"));
}

#[test]
fn cumulative_dump_rewrites_everything_so_far() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let mut cfg = config(&dir, &["10", "20"], 2);
    cfg.event_log = EventLogScope::Cumulative;

    let report = run(cfg, MockSupply::new(&log), MockScope::new(&log), StopSignal::new()).unwrap();

    assert_eq!(headers(&dumped(&dir, "10")), vec!["0;CH1", "0;CH3", "1;CH1", "1;CH3"]);
    let second = dumped(&dir, "20");
    assert_eq!(headers(&second).len(), 8);
    assert_eq!(headers(&second).last(), Some(&"3;CH3"));
    assert!(second.starts_with("0;CH1\n0.0,0.5\n"));
    assert_eq!(report.steps.iter().map(|s| s.events).collect::<Vec<_>>(), vec![2, 2]);
}

#[test]
fn stop_before_sweep_skips_every_step_but_still_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let stop = StopSignal::new();
    stop.post();

    let report = run(config(&dir, &["100", "200"], 3), MockSupply::new(&log), MockScope::new(&log), stop).unwrap();

    assert!(report.steps.is_empty());
    assert!(report.stopped_early);
    assert_eq!(set_points(&log), vec![NEUTRAL_OUTPUT]);
    assert!(!calls(&log).iter().any(|c| matches!(c, Call::Query(_))));
    assert_closed_once_in_order(&log);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn stop_mid_capture_dumps_partial_step_then_ends() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let stop = StopSignal::new();
    let mut scope = MockScope::new(&log);
    scope.stop_after = Some((stop.clone(), 2));

    let report = run(config(&dir, &["100", "200", "300"], 5), MockSupply::new(&log), scope, stop).unwrap();

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].events, 2);
    assert!(report.stopped_early);
    assert_eq!(waveform_queries(&log), 2);
    assert_eq!(set_points(&log), vec!["100", NEUTRAL_OUTPUT]);
    assert_eq!(headers(&dumped(&dir, "100")), vec!["0;CH1", "0;CH3", "1;CH1", "1;CH3"]);
    assert!(!dir.path().join("run_200V").exists());
    assert_closed_once_in_order(&log);
}

#[test]
fn empty_sweep_still_shuts_down_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();

    let report = run(config(&dir, &[], 3), MockSupply::new(&log), MockScope::new(&log), StopSignal::new()).unwrap();

    assert!(report.steps.is_empty());
    assert!(!report.stopped_early);
    assert_eq!(report.dt, 0.0);
    assert_eq!(set_points(&log), vec![NEUTRAL_OUTPUT]);
    assert_closed_once_in_order(&log);
}

#[test]
fn stuck_ramp_times_out_and_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let mut cfg = config(&dir, &["100", "200"], 3);
    cfg.ramp_timeout = Duration::from_millis(20);
    cfg.poll_interval = Duration::from_millis(1);
    let mut supply = MockSupply::new(&log);
    supply.stuck_ramping_up = true;

    let res = run(cfg, supply, MockScope::new(&log), StopSignal::new());

    match res {
        Err(DaqError::HardwareTimeout { condition, .. }) => assert_eq!(condition, RAMP_UP),
        other => panic!("expected a hardware timeout, got {:?}", other),
    }
    assert_eq!(set_points(&log), vec!["100", NEUTRAL_OUTPUT]);
    assert!(!calls(&log).iter().any(|c| matches!(c, Call::Query(_))));
    assert_closed_once_in_order(&log);
}

#[test]
fn scope_failure_aborts_run_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let mut scope = MockScope::new(&log);
    scope.fail_after = Some(1);

    let res = run(config(&dir, &["100", "200"], 3), MockSupply::new(&log), scope, StopSignal::new());

    match res {
        Err(DaqError::Io(e)) => assert_eq!(e.kind(), ErrorKind::TimedOut),
        other => panic!("expected an I/O error, got {:?}", other),
    }
    assert_eq!(set_points(&log), vec!["100", NEUTRAL_OUTPUT]);
    assert!(!dir.path().join("run_100V").exists());
    assert_closed_once_in_order(&log);
}

#[test]
fn unreadable_timebase_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let mut scope = MockScope::new(&log);
    scope.dt = "n/a";

    let res = run(config(&dir, &["100"], 3), MockSupply::new(&log), scope, StopSignal::new());

    assert!(matches!(res, Err(DaqError::Timebase { .. })));
    assert_eq!(waveform_queries(&log), 0);
    assert_closed_once_in_order(&log);
}

#[test]
fn no_active_channels_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let mut cfg = config(&dir, &["100"], 3);
    cfg.active_channels = [false; 4];

    let res = run(cfg, MockSupply::new(&log), MockScope::new(&log), StopSignal::new());

    assert!(matches!(res, Err(DaqError::Config(_))));
    assert_eq!(set_points(&log), vec![NEUTRAL_OUTPUT]);
    assert_closed_once_in_order(&log);
}

#[test]
fn failed_scope_close_is_returned_after_supply_closes() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let mut scope = MockScope::new(&log);
    scope.close_fails = true;

    let res = run(config(&dir, &["100"], 2), MockSupply::new(&log), scope, StopSignal::new());

    match res {
        Err(DaqError::Io(e)) => assert_eq!(e.kind(), ErrorKind::BrokenPipe),
        other => panic!("expected the close error, got {:?}", other),
    }
    assert_eq!(headers(&dumped(&dir, "100")).len(), 4);
    assert_closed_once_in_order(&log);
}

#[test]
fn ramp_up_timeout_wins_over_ramp_down_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let mut cfg = config(&dir, &["100"], 1);
    cfg.ramp_timeout = Duration::from_millis(20);
    cfg.poll_interval = Duration::from_millis(1);
    let mut supply = MockSupply::new(&log);
    supply.stuck_ramping_up = true;
    supply.stuck_ramping_down = true;

    let res = run(cfg, supply, MockScope::new(&log), StopSignal::new());

    match res {
        Err(DaqError::HardwareTimeout { condition, .. }) => {
            assert_eq!(condition, RAMP_UP);
            assert_ne!(condition, RAMP_DOWN);
        }
        other => panic!("expected the ramp-up timeout, got {:?}", other),
    }
    assert_eq!(set_points(&log), vec!["100", NEUTRAL_OUTPUT]);
    assert_closed_once_in_order(&log);
}

#[test]
fn stuck_ramp_down_alone_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::default();
    let mut cfg = config(&dir, &["100"], 1);
    cfg.ramp_timeout = Duration::from_millis(20);
    cfg.poll_interval = Duration::from_millis(1);
    let mut supply = MockSupply::new(&log);
    supply.stuck_ramping_down = true;

    let res = run(cfg, supply, MockScope::new(&log), StopSignal::new());

    match res {
        Err(DaqError::HardwareTimeout { condition, .. }) => assert_eq!(condition, RAMP_DOWN),
        other => panic!("expected the ramp-down timeout, got {:?}", other),
    }
    assert!(dir.path().join("run_100V").exists());
    assert_closed_once_in_order(&log);
}
