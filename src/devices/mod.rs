// The sweep only needs a handful of request/response calls from each instrument, so those are
// expressed as traits here and the concrete drivers live in their own modules

use std::io;

pub mod caen;
pub mod lecroy;

pub trait PowerSupply {
	/// Human readable status words for `channel`, e.g. "ON RAMP UP".
	fn status(&mut self, channel:&str) -> io::Result<String>;
	fn enable(&mut self, channel:&str, on:bool) -> io::Result<()>;
	/// `value` is passed to the instrument as given, without unit conversion.
	fn set_output(&mut self, channel:&str, value:&str) -> io::Result<()>;
	fn close(&mut self) -> io::Result<()>;
}

pub trait Oscilloscope {
	fn query(&mut self, command:&str) -> io::Result<String>;
	fn close(&mut self) -> io::Result<()>;
}
