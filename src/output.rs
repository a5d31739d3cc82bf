// One text file per voltage step: "<event>;CH<n>", then "time,voltage" lines, then a blank pair

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{DaqError, DaqResult};
use crate::waveform::Event;

pub fn output_path(prefix: &str, voltage: &str) -> PathBuf {
	PathBuf::from(format!("{}_{}V", prefix, voltage))
}

// Channels that are absent or hold no samples are left out
pub fn write_events<W: Write>(w: &mut W, events: &[Event]) -> io::Result<()> {
	for (event_num, event) in events.iter().enumerate() {
		for (channel_num, channel) in event.channels().iter().enumerate() {
			let samples = match channel {
				Some(s) if !s.is_empty() => s,
				_ => continue,
			};
			writeln!(w, "{};CH{}", event_num, channel_num + 1)?;
			for s in samples {
				writeln!(w, "{:?},{:?}", s.time, s.voltage)?;
			}
			write!(w, "\n\n")?;
		}
	}
	Ok(())
}

pub fn dump_events(prefix: &str, voltage: &str, events: &[Event]) -> DaqResult<PathBuf> {
	let path = output_path(prefix, voltage);
	info!("Dumping {} events to {}", events.len(), path.display());

	write_file(&path, events).map_err(|source| DaqError::OutputWrite { path: path.clone(), source })?;
	Ok(path)
}

fn write_file(path: &Path, events: &[Event]) -> io::Result<()> {
	let mut w = BufWriter::new(File::create(path)?);
	write_events(&mut w, events)?;
	w.flush()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::waveform::Sample;

	fn event(slot: usize, samples: Vec<Sample>) -> Event {
		let mut channels: [Option<Vec<Sample>>; 4] = Default::default();
		channels[slot] = Some(samples);
		Event::from_channels(channels)
	}

	fn render(events: &[Event]) -> String {
		let mut buf = Vec::new();
		write_events(&mut buf, events).unwrap();
		String::from_utf8(buf).unwrap()
	}

	#[test]
	fn single_event_block_is_exact() {
		let ev = event(0, vec![
			Sample { time: 0.0, voltage: 1.5 },
			Sample { time: 1e-9, voltage: 1.6 },
		]);
		assert_eq!(render(&[ev]), "0;CH1\n0.0,1.5\n1e-9,1.6\n\n\n");
	}

	#[test]
	fn absent_and_empty_channels_are_omitted() {
		let mut channels: [Option<Vec<Sample>>; 4] = Default::default();
		channels[1] = Some(vec![]);
		channels[3] = Some(vec![Sample { time: 0.0, voltage: -2.0 }]);
		let out = render(&[Event::default(), Event::from_channels(channels)]);
		assert_eq!(out, "1;CH4\n0.0,-2.0\n\n\n");
	}

	#[test]
	fn path_keeps_voltage_label_verbatim() {
		assert_eq!(output_path("run7", "1500.5"), PathBuf::from("run7_1500.5V"));
	}

	#[test]
	fn dump_truncates_previous_content() {
		let dir = tempfile::tempdir().unwrap();
		let prefix = dir.path().join("out");
		let prefix = prefix.to_str().unwrap();

		let two = vec![
			event(0, vec![Sample { time: 0.0, voltage: 1.0 }]),
			event(0, vec![Sample { time: 0.0, voltage: 2.0 }]),
		];
		dump_events(prefix, "100", &two).unwrap();
		let path = dump_events(prefix, "100", &two[..1]).unwrap();

		assert_eq!(std::fs::read_to_string(path).unwrap(), "0;CH1\n0.0,1.0\n\n\n");
	}

	#[test]
	fn unwritable_path_is_typed_error() {
		let dir = tempfile::tempdir().unwrap();
		let prefix = dir.path().join("missing").join("out");
		let res = dump_events(prefix.to_str().unwrap(), "5", &[]);
		assert!(matches!(res, Err(DaqError::OutputWrite { .. })));
	}
}
