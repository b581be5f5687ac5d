// Stepping and continue semantics.

mod mock_backend;

use std::sync::Arc;
use std::time::Duration;

use mock_backend::MockBackend;
use stepwire::runner::StartError;
use stepwire::{ContinueOutcome, RunState, Runner, StepOutcome, StopReason};
use stepwire_protocol::BackendEvent;
use tokio::sync::watch;

async fn started(mock: MockBackend) -> (Runner, Arc<MockBackend>) {
	let mock = Arc::new(mock);
	let mut runner = Runner::new(mock.clone());
	runner.start("/work/prog.txt", None, true).await.unwrap();
	(runner, mock)
}

#[tokio::test]
async fn start_loads_then_starts() {
	let (mock, mut events) = MockBackend::new(3);
	let (runner, mock) = started(mock).await;

	assert_eq!(mock.commands(), vec!["loadSource", "start"]);
	assert_eq!(runner.state(), RunState::Stopped);
	assert_eq!(events.try_recv().unwrap(), BackendEvent::StopOnEntry);
}

#[tokio::test]
async fn start_surfaces_backend_error() {
	let (mock, _events) = MockBackend::new(3);
	let mock = Arc::new(mock.with_load_error("unexpected token"));
	let mut runner = Runner::new(mock.clone());

	let err = runner.start("/work/prog.txt", None, false).await.unwrap_err();

	assert_eq!(err, StartError::Rejected("unexpected token".into()));
	assert_eq!(runner.state(), RunState::Terminated);
	assert_eq!(mock.commands(), vec!["loadSource"]);
}

#[tokio::test]
async fn n_lines_give_n_minus_one_stops_then_end() {
	const LINES: u32 = 5;
	let (mock, _events) = MockBackend::new(LINES);
	let (mut runner, mock) = started(mock).await;

	let mut outcomes = Vec::new();
	loop {
		let outcome = runner.step().await;
		let ended = outcome.is_ended();
		outcomes.push(outcome);
		if ended {
			break;
		}
	}

	let stops = outcomes.iter().filter(|o| !o.is_ended()).count();
	assert_eq!(stops as u32, LINES - 1);
	assert_eq!(outcomes.last(), Some(&StepOutcome::Ended));
	assert_eq!(runner.state(), RunState::Terminated);

	// Nothing reaches the backend after the end.
	assert_eq!(runner.step().await, StepOutcome::Ended);
	assert_eq!(mock.steps(), LINES);
}

#[tokio::test]
async fn continue_takes_as_many_steps_as_stepping() {
	const LINES: u32 = 7;

	let (stepping, _e1) = MockBackend::new(LINES);
	let (mut runner, stepping) = started(stepping).await;
	while !runner.step().await.is_ended() {}

	let (continuing, _e2) = MockBackend::new(LINES);
	let (mut runner, continuing) = started(continuing).await;
	let (_cancel_tx, mut cancel) = watch::channel(false);
	let outcome = runner.continue_until(&mut cancel, |o| o).await;

	assert_eq!(outcome, ContinueOutcome::Ended);
	assert_eq!(continuing.steps(), stepping.steps());
	assert_eq!(runner.steps(), u64::from(LINES));
}

#[tokio::test]
async fn continue_stops_on_backend_breakpoint() {
	let (mock, _events) = MockBackend::new(10);
	let mock = Arc::new(mock);
	let mut runner = Runner::new(mock.clone());
	runner.start("/work/prog.txt", None, true).await.unwrap();
	stepwire::BreakpointManager::new(mock.clone()).set_all(&[3]).await;

	let (_cancel_tx, mut cancel) = watch::channel(false);
	let outcome = runner.continue_until(&mut cancel, |o| o).await;

	assert_eq!(outcome, ContinueOutcome::Stopped(StopReason::Breakpoint));
	assert_eq!(mock.steps(), 3);
	assert_eq!(runner.state(), RunState::Stopped);
}

#[tokio::test]
async fn observer_can_end_the_loop() {
	let (mock, _events) = MockBackend::new(100);
	let (mut runner, mock) = started(mock).await;

	let (_cancel_tx, mut cancel) = watch::channel(false);
	let mut seen = 0;
	let outcome = runner
		.continue_until(&mut cancel, |o| {
			seen += 1;
			if seen == 4 { StepOutcome::Ended } else { o }
		})
		.await;

	assert_eq!(outcome, ContinueOutcome::Ended);
	assert_eq!(mock.steps(), 4);
}

#[tokio::test]
async fn cancel_interrupts_in_flight_step() {
	let (mock, _events) = MockBackend::new(0);
	let (mut runner, mock) = started(mock.endless(Duration::from_secs(30))).await;

	let (cancel_tx, mut cancel) = watch::channel(false);
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		cancel_tx.send_replace(true);
	});

	let outcome = tokio::time::timeout(Duration::from_secs(5), runner.continue_until(&mut cancel, |o| o))
		.await
		.unwrap();

	assert_eq!(outcome, ContinueOutcome::Interrupted);
	assert_eq!(mock.steps(), 1);
}
