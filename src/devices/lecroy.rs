use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;

use crate::vxi11::CoreClient;
use super::Oscilloscope;

lazy_static! {
	static ref IDN_RE: Regex = Regex::new("([^,]+),([^,]+),([^,]+),([^,\\s]+)").unwrap();
}

pub const DEVICE_NAME:&str = "inst0";

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

pub fn parse_idn(resp:&str) -> io::Result<Identity> {
	let caps = IDN_RE.captures(resp.trim()).ok_or_else(|| err("Unrecognised *IDN? response"))?;
	let field = |i:usize| caps.get(i).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();
	Ok(Identity{ manufacturer: field(1), model: field(2), serial_num: field(3), fw_version: field(4) })
}

fn decode(bytes:Vec<u8>) -> io::Result<String> {
	String::from_utf8(bytes).map_err(|_| err("Unable to parse response as UTF-8"))
}

/// LeCroy WaveRunner/WavePro family scope reached over VXI-11.
pub struct LeCroy {
	core: CoreClient,
	pub identity: Identity,
}

impl LeCroy {

	pub fn new(host:&str, io_timeout:Duration) -> io::Result<Self> {
		let mut core = CoreClient::new(host, io_timeout)?;
		core.create_link(DEVICE_NAME)?;

		let identity = parse_idn(&decode(core.ask(b"*IDN?")?)?)?;
		if !identity.manufacturer.to_uppercase().contains("LECROY") {
			return Err(err("Successfully connected to a device but it doesn't appear to be a LeCroy scope"));
		}
		info!("Connected to {} {} (serial {}, firmware {}) at {}",
			identity.manufacturer, identity.model, identity.serial_num, identity.fw_version, host);

		Ok(Self{ core, identity })
	}

}

impl Oscilloscope for LeCroy {

	fn query(&mut self, command:&str) -> io::Result<String> {
		debug!("scope <- {}", command);
		decode(self.core.ask(command.as_bytes())?)
	}

	fn close(&mut self) -> io::Result<()> {
		if self.core.link().is_none() { return Ok(()); }
		self.core.destroy_link()
	}

}

impl Drop for LeCroy {

	fn drop(&mut self) {
		if self.core.link().is_some() {
			if let Err(e) = self.core.destroy_link() {
				warn!("Unable to destroy link for LeCroy scope: {}", e);
			}
		}
	}

}
