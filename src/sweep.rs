// Init -> EnablingOutput -> { SettingVoltage -> Ramping -> Acquiring -> Dumping }* -> RampingDown -> Closed

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::{EventLogScope, SweepConfig};
use crate::devices::{Oscilloscope, PowerSupply};
use crate::error::{DaqError, DaqResult};
use crate::output;
use crate::stop::StopSignal;
use crate::waveform::{self, Event};

pub const OUTPUT_ON: &str = "ON";
pub const RAMP_UP: &str = "RAMP UP";
pub const RAMP_DOWN: &str = "RAMP DOWN";
pub const NEUTRAL_OUTPUT: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
	Init,
	EnablingOutput,
	SettingVoltage,
	Ramping,
	Acquiring,
	Dumping,
	RampingDown,
	Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
	pub voltage: String,
	pub events: usize,
	pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
	pub steps: Vec<StepReport>,
	pub stopped_early: bool,
	// Last step's timebase, 0 if no step ran
	pub dt: f64,
}

// Polls status until it no longer mentions condition
pub fn wait_while<P: PowerSupply>(
	supply: &mut P,
	channel: &str,
	condition: &str,
	timeout: Duration,
	interval: Duration,
) -> DaqResult<Duration> {
	let start = Instant::now();
	loop {
		let status = supply.status(channel)?;
		if !status.contains(condition) {
			return Ok(start.elapsed());
		}

		let waited = start.elapsed();
		if waited >= timeout {
			return Err(DaqError::HardwareTimeout { condition: condition.to_owned(), waited });
		}
		thread::sleep(interval);
	}
}

pub struct DaqRunner<P: PowerSupply, S: Oscilloscope> {
	config: SweepConfig,
	supply: P,
	scope: S,
	stop: StopSignal,
	events: Vec<Event>,
	dt: f64,
	state: SweepState,
}

impl<P: PowerSupply, S: Oscilloscope> DaqRunner<P, S> {
	pub fn new(config: SweepConfig, supply: P, scope: S, stop: StopSignal) -> Self {
		DaqRunner {
			config,
			supply,
			scope,
			stop,
			events: vec![],
			dt: 0.0,
			state: SweepState::Init,
		}
	}

	pub fn state(&self) -> SweepState {
		self.state
	}

	fn transition(&mut self, next: SweepState) {
		debug!("{:?} -> {:?}", self.state, next);
		self.state = next;
	}

	// Shutdown always runs. The first error is returned, later ones are only logged
	pub fn run(mut self) -> DaqResult<SweepReport> {
		let mut report = SweepReport::default();

		let swept = self.sweep(&mut report);
		if let Err(e) = &swept {
			error!("Sweep aborted: {}", e);
		}
		let shut = self.shutdown();

		report.dt = self.dt;
		swept.and(shut).map(|_| report)
	}

	fn sweep(&mut self, report: &mut SweepReport) -> DaqResult<()> {
		if self.config.num_events > 0 && !self.config.active_channels.iter().any(|c| *c) {
			return Err(DaqError::Config("no scope channels are active".into()));
		}

		self.transition(SweepState::EnablingOutput);
		let status = self.supply.status(&self.config.supply_channel)?;
		if !status.contains(OUTPUT_ON) {
			info!("Enabling output on supply channel {}", self.config.supply_channel);
			self.supply.enable(&self.config.supply_channel, true)?;
		}

		for volt in self.config.volts.clone() {
			if self.stop.is_posted() {
				info!("Stop requested, skipping set point {} V and any after it", volt);
				report.stopped_early = true;
				break;
			}

			let step = self.step(&volt)?;
			if step.events < self.config.num_events as usize {
				report.stopped_early = true;
			}
			report.steps.push(step);
		}
		Ok(())
	}

	fn step(&mut self, volt: &str) -> DaqResult<StepReport> {
		self.transition(SweepState::SettingVoltage);
		info!("Setting supply channel {} to {} V", self.config.supply_channel, volt);
		self.supply.set_output(&self.config.supply_channel, volt)?;
		thread::sleep(self.config.settle_delay);

		self.transition(SweepState::Ramping);
		let ramped = wait_while(
			&mut self.supply,
			&self.config.supply_channel,
			RAMP_UP,
			self.config.ramp_timeout,
			self.config.poll_interval,
		)?;
		debug!("Ramp to {} V finished after {:?}", volt, ramped);

		self.transition(SweepState::Acquiring);
		let response = self.scope.query(waveform::TIMEBASE_QUERY)?;
		self.dt = waveform::parse_timebase(&response)?;
		info!("dt: {}", self.dt);

		if self.config.event_log == EventLogScope::PerStep {
			self.events.clear();
		}
		let captured = self.acquire()?;

		self.transition(SweepState::Dumping);
		let path = output::dump_events(&self.config.output_prefix, volt, &self.events)?;

		Ok(StepReport { voltage: volt.to_owned(), events: captured, path })
	}

	fn acquire(&mut self) -> DaqResult<usize> {
		let command = waveform::inspect_command(&self.config.active_channels);
		let wanted = self.config.num_events as usize;

		for n in 0..wanted {
			if self.stop.is_posted() {
				info!("STOPPING DAQ after {} of {} events", n, wanted);
				return Ok(n);
			}

			let raw = self.scope.query(&command)?;
			let event = waveform::parse_waveforms(&raw, self.dt);
			if event.is_empty() {
				warn!("Event {} carried no channel data", n);
			}
			self.events.push(event);
		}
		Ok(wanted)
	}

	fn shutdown(&mut self) -> DaqResult<()> {
		self.transition(SweepState::RampingDown);
		let mut first: Option<DaqError> = None;
		let mut note = |e: DaqError| {
			warn!("Shutdown: {}", e);
			if first.is_none() {
				first = Some(e);
			}
		};

		match self.supply.set_output(&self.config.supply_channel, NEUTRAL_OUTPUT) {
			Ok(()) => {
				info!("Acquisition complete, ramping down");
				if let Err(e) = wait_while(
					&mut self.supply,
					&self.config.supply_channel,
					RAMP_DOWN,
					self.config.ramp_timeout,
					self.config.poll_interval,
				) {
					note(e);
				}
			}
			Err(e) => note(e.into()),
		}

		if let Err(e) = self.scope.close() {
			note(e.into());
		}
		if let Err(e) = self.supply.close() {
			note(e.into());
		}

		self.transition(SweepState::Closed);
		match first {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}
