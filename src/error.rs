use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type DaqResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("Instrument error: {0}")]
	Instrument(String),

	#[error("Unable to read a timebase interval from scope response {response:?}")]
	Timebase { response: String },

	#[error("Hardware timeout: still '{condition}' after {waited:?}")]
	HardwareTimeout { condition: String, waited: Duration },

	#[error("Failed to write output file {}: {source}", path.display())]
	OutputWrite {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("Unable to parse configuration file: {0}")]
	ConfigParse(#[from] toml::de::Error),
}
