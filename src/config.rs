// Run configuration: one TOML table per instrument plus [daq]. Set points are kept as text,
// so array entries must be strings or integers.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::devices::caen;
use crate::error::{DaqError, DaqResult};
use crate::waveform::MAX_CHANNELS;

// Does each step's dump hold only its own events or everything so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLogScope {
	PerStep,
	Cumulative,
}

impl Default for EventLogScope {
	fn default() -> Self {
		EventLogScope::PerStep
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
	pub volts: Vec<String>,
	pub active_channels: [bool; MAX_CHANNELS],
	pub num_events: u32,
	pub output_prefix: String,
	pub supply_channel: String,
	pub settle_delay: Duration,
	pub poll_interval: Duration,
	pub ramp_timeout: Duration,
	pub event_log: EventLogScope,
}

impl SweepConfig {
	pub fn new(
		volts: Vec<String>,
		active_channels: [bool; MAX_CHANNELS],
		num_events: u32,
		output_prefix: &str,
		supply_channel: &str,
	) -> Self {
		SweepConfig {
			volts,
			active_channels,
			num_events,
			output_prefix: output_prefix.to_owned(),
			supply_channel: supply_channel.to_owned(),
			settle_delay: Duration::from_secs_f64(default_settle_secs()),
			poll_interval: Duration::from_millis(default_poll_interval_ms()),
			ramp_timeout: Duration::from_secs_f64(default_ramp_timeout_secs()),
			event_log: EventLogScope::default(),
		}
	}
}

fn default_settle_secs() -> f64 { 5.0 }
fn default_poll_interval_ms() -> u64 { 100 }
fn default_ramp_timeout_secs() -> f64 { 600.0 }
fn default_monitor_delay_secs() -> f64 { 10.0 }
fn default_io_timeout_ms() -> u64 { 10_000 }
fn default_caen_port() -> u16 { caen::DEFAULT_PORT }

// Set points and channel names may be written as integers or as strings. Floats are refused,
// TOML would not keep their spelling.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
	Int(i64),
	Text(String),
}

impl Scalar {
	fn into_text(self) -> String {
		match self {
			Scalar::Int(i) => i.to_string(),
			Scalar::Text(s) => s.trim().to_owned(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum VoltList {
	Csv(String),
	List(Vec<Scalar>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeSection {
	pub ip: String,
	pub read_ch1: bool,
	pub read_ch2: bool,
	pub read_ch3: bool,
	pub read_ch4: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupplySection {
	pub ip: String,
	#[serde(default = "default_caen_port")]
	pub port: u16,
	#[serde(default)]
	pub board: u8,
	volts: VoltList,
	step_channel: Scalar,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaqSection {
	pub events: u32,
	#[serde(default = "default_settle_secs")]
	pub settle_secs: f64,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_ramp_timeout_secs")]
	pub ramp_timeout_secs: f64,
	#[serde(default = "default_monitor_delay_secs")]
	pub monitor_delay_secs: f64,
	#[serde(default)]
	pub event_log: EventLogScope,
	#[serde(default = "default_io_timeout_ms")]
	pub io_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
	pub lecroy: ScopeSection,
	pub caen: SupplySection,
	pub daq: DaqSection,
}

fn seconds(name: &str, secs: f64) -> DaqResult<Duration> {
	Duration::try_from_secs_f64(secs)
		.map_err(|_| DaqError::Config(format!("{} must be a non-negative number of seconds, got {}", name, secs)))
}

impl RunConfig {
	pub fn load<P: AsRef<Path>>(path: P) -> DaqResult<Self> {
		let text = fs::read_to_string(path)?;
		Self::from_toml(&text)
	}

	pub fn from_toml(text: &str) -> DaqResult<Self> {
		let cfg: RunConfig = toml::from_str(text)?;
		cfg.validate()?;
		Ok(cfg)
	}

	fn validate(&self) -> DaqResult<()> {
		if self.lecroy.ip.trim().is_empty() {
			return Err(DaqError::Config("lecroy.ip is empty".into()));
		}
		if self.caen.ip.trim().is_empty() {
			return Err(DaqError::Config("caen.ip is empty".into()));
		}
		if self.step_channel().is_empty() {
			return Err(DaqError::Config("caen.step_channel is empty".into()));
		}
		if self.volts().iter().any(|v| v.is_empty()) {
			return Err(DaqError::Config("caen.volts contains an empty set point".into()));
		}
		seconds("daq.settle_secs", self.daq.settle_secs)?;
		seconds("daq.ramp_timeout_secs", self.daq.ramp_timeout_secs)?;
		self.monitor_delay()?;
		Ok(())
	}

	pub fn volts(&self) -> Vec<String> {
		match &self.caen.volts {
			VoltList::Csv(s) if s.trim().is_empty() => vec![],
			VoltList::Csv(s) => s.split(',').map(|v| v.trim().to_owned()).collect(),
			VoltList::List(l) => l.iter().cloned().map(Scalar::into_text).collect(),
		}
	}

	pub fn step_channel(&self) -> String {
		self.caen.step_channel.clone().into_text()
	}

	pub fn active_channels(&self) -> [bool; MAX_CHANNELS] {
		[self.lecroy.read_ch1, self.lecroy.read_ch2, self.lecroy.read_ch3, self.lecroy.read_ch4]
	}

	pub fn monitor_delay(&self) -> DaqResult<Duration> {
		seconds("daq.monitor_delay_secs", self.daq.monitor_delay_secs)
	}

	pub fn io_timeout(&self) -> Duration {
		Duration::from_millis(self.daq.io_timeout_ms)
	}

	pub fn sweep_config(&self, output_prefix: &str) -> DaqResult<SweepConfig> {
		Ok(SweepConfig {
			volts: self.volts(),
			active_channels: self.active_channels(),
			num_events: self.daq.events,
			output_prefix: output_prefix.to_owned(),
			supply_channel: self.step_channel(),
			settle_delay: seconds("daq.settle_secs", self.daq.settle_secs)?,
			poll_interval: Duration::from_millis(self.daq.poll_interval_ms),
			ramp_timeout: seconds("daq.ramp_timeout_secs", self.daq.ramp_timeout_secs)?,
			event_log: self.daq.event_log,
		})
	}
}
