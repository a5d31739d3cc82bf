// Scope INSPECT? replies -> per-channel samples. Each region opens with a marker like C3:INSP,
// sample times are dt * index within the region

use log::{debug, warn};

use crate::error::{DaqError, DaqResult};

pub const MAX_CHANNELS: usize = 4;

pub const TIMEBASE_QUERY: &str = "C2:INSPECT? HORIZ_INTERVAL";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
	pub time: f64,
	pub voltage: f64,
}

pub type ChannelWaveform = Vec<Sample>;

// Slot i holds physical channel i + 1
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
	channels: [Option<ChannelWaveform>; MAX_CHANNELS],
}

impl Event {
	pub fn from_channels(channels: [Option<ChannelWaveform>; MAX_CHANNELS]) -> Self {
		Event { channels }
	}

	pub fn channel(&self, idx: usize) -> Option<&ChannelWaveform> {
		self.channels.get(idx).and_then(|c| c.as_ref())
	}

	pub fn channels(&self) -> &[Option<ChannelWaveform>; MAX_CHANNELS] {
		&self.channels
	}

	pub fn is_empty(&self) -> bool {
		self.channels.iter().all(|c| c.is_none())
	}
}

pub fn inspect_command(active: &[bool; MAX_CHANNELS]) -> String {
	active
		.iter()
		.enumerate()
		.filter(|(_, on)| **on)
		.map(|(idx, _)| format!("C{}:INSPECT? SIMPLE;", idx + 1))
		.collect()
}

// C2:INSP "HORIZ_INTERVAL     : 2.0000e-10         "
pub fn parse_timebase(response: &str) -> DaqResult<f64> {
	response
		.split(':')
		.nth(2)
		.and_then(|field| field.split_whitespace().next())
		.and_then(|token| token.trim_matches('"').parse::<f64>().ok())
		.ok_or_else(|| DaqError::Timebase { response: response.to_owned() })
}

fn is_channel_marker(token: &str) -> bool {
	token.contains(':')
}

// "C3:INSP" -> 2. Markers without a usable channel number map to None.
fn channel_index(marker: &str) -> Option<usize> {
	let digits: String = marker.chars().filter(|c| c.is_ascii_digit()).collect();
	match digits.parse::<usize>() {
		Ok(n) if (1..=MAX_CHANNELS).contains(&n) => Some(n - 1),
		_ => None,
	}
}

fn finalize(event: &mut Event, channel: Option<usize>, waveform: &mut ChannelWaveform) {
	let samples = std::mem::take(waveform);
	if let Some(idx) = channel {
		debug!("CH{}: {} samples", idx + 1, samples.len());
		event.channels[idx] = Some(samples);
	}
}

// Non-numeric tokens are skipped. Samples outside a valid channel region are dropped, and a
// repeated channel keeps its last region.
pub fn parse_waveforms(raw: &str, dt: f64) -> Event {
	let mut event = Event::default();
	let mut channel: Option<usize> = None;
	let mut waveform: ChannelWaveform = vec![];

	for token in raw.lines().flat_map(str::split_whitespace) {
		if is_channel_marker(token) {
			finalize(&mut event, channel, &mut waveform);
			channel = channel_index(token);
			if channel.is_none() {
				warn!("Ignoring data under unrecognised channel marker {:?}", token);
			}
		} else if let Ok(voltage) = token.parse::<f64>() {
			let time = dt * waveform.len() as f64;
			waveform.push(Sample { time, voltage });
		}
	}
	finalize(&mut event, channel, &mut waveform);

	event
}
