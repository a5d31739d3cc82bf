// CAEN desktop/NIM high voltage supplies (DT14xx, N14xx) speak a line oriented ASCII protocol:
//
//   $BD:00,CMD:MON,CH:0,PAR:STAT\r\n   ->   #BD:00,CMD:OK,VAL:3\r\n
//   $BD:00,CMD:SET,CH:0,PAR:VSET,VAL:150\r\n   ->   #BD:00,CMD:OK\r\n
//
// A rejected request names the offending field instead, e.g. #BD:00,PAR:ERR

use std::io::{self, BufRead, BufReader, Error, ErrorKind, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;

use super::PowerSupply;

lazy_static! {
	static ref RESP_RE: Regex = Regex::new("^#BD:(\\d+),(CMD|CH|PAR|VAL|LOC):(OK|ERR)(?:,VAL:(.*))?$").unwrap();
}

pub const DEFAULT_PORT:u16 = 1470;

// Bits of the STAT word, in order, and the words used to report them
pub const STATUS_BITS:[(u32, &str); 13] = [
	(1 << 1,  "RAMP UP"),
	(1 << 2,  "RAMP DOWN"),
	(1 << 3,  "OVER CURRENT"),
	(1 << 4,  "OVER VOLTAGE"),
	(1 << 5,  "UNDER VOLTAGE"),
	(1 << 6,  "MAXV"),
	(1 << 7,  "TRIP"),
	(1 << 8,  "OVER POWER"),
	(1 << 9,  "OVER TEMPERATURE"),
	(1 << 10, "DISABLED"),
	(1 << 11, "KILL"),
	(1 << 12, "INTERLOCK"),
	(1 << 13, "NOCAL"),
];
pub const STATUS_ON:u32 = 1;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub fn format_command(board:u8, cmd:&str, channel:&str, par:&str, val:Option<&str>) -> String {
	match val {
		Some(v) => format!("$BD:{:02},CMD:{},CH:{},PAR:{},VAL:{}\r\n", board, cmd, channel, par, v),
		None    => format!("$BD:{:02},CMD:{},CH:{},PAR:{}\r\n", board, cmd, channel, par),
	}
}

/// Returns the VAL field of a successful reply, if there is one.
pub fn parse_response(line:&str) -> io::Result<Option<String>> {
	let caps = RESP_RE.captures(line.trim()).ok_or_else(|| err("Malformed reply from CAEN supply"))?;

	match (caps.get(2).map(|m| m.as_str()), caps.get(3).map(|m| m.as_str())) {
		(Some("CMD"), Some("OK")) => Ok(caps.get(4).map(|m| m.as_str().to_owned())),
		(Some("LOC"), _)          => Err(err("CAEN supply is in local mode")),
		(Some(field), _)          => Err(Error::new(ErrorKind::InvalidInput, format!("CAEN supply rejected the {} field", field))),
		_                         => Err(err("Malformed reply from CAEN supply")),
	}
}

pub fn decode_status(stat:u32) -> String {
	let mut words:Vec<&str> = vec![if stat & STATUS_ON != 0 { "ON" } else { "OFF" }];
	words.extend(STATUS_BITS.iter().filter(|(bit, _)| stat & bit != 0).map(|(_, name)| *name));
	words.join(" ")
}

pub struct Caen {
	reader: BufReader<TcpStream>,
	writer: TcpStream,
	board: u8,
	open: bool,
}

impl Caen {

	pub fn new(host:&str, port:u16, board:u8, io_timeout:Duration) -> io::Result<Self> {
		let writer = TcpStream::connect((host, port))?;
		writer.set_read_timeout(Some(io_timeout))?;
		writer.set_nodelay(true)?;
		let reader = BufReader::new(writer.try_clone()?);

		info!("Connected to CAEN supply board {} at {}:{}", board, host, port);
		Ok(Self{ reader, writer, board, open: true })
	}

	fn transact(&mut self, cmd:&str, channel:&str, par:&str, val:Option<&str>) -> io::Result<Option<String>> {
		if !self.open { return Err(err("CAEN connection already closed")); }

		let line = format_command(self.board, cmd, channel, par, val);
		debug!("caen <- {}", line.trim_end());
		self.writer.write_all(line.as_bytes())?;

		let mut reply = String::new();
		if self.reader.read_line(&mut reply)? == 0 {
			return Err(Error::new(ErrorKind::UnexpectedEof, "CAEN supply closed the connection"));
		}
		debug!("caen -> {}", reply.trim_end());
		parse_response(&reply)
	}

	pub fn read_param(&mut self, channel:&str, par:&str) -> io::Result<String> {
		self.transact("MON", channel, par, None)?.ok_or_else(|| err("CAEN reply carried no value"))
	}

}

impl PowerSupply for Caen {

	fn status(&mut self, channel:&str) -> io::Result<String> {
		let raw = self.read_param(channel, "STAT")?;
		let stat = raw.trim().parse::<u32>().map_err(|_| err("Unable to parse STAT as an integer"))?;
		Ok(decode_status(stat))
	}

	fn enable(&mut self, channel:&str, on:bool) -> io::Result<()> {
		self.transact("SET", channel, if on { "ON" } else { "OFF" }, None).map(|_| ())
	}

	fn set_output(&mut self, channel:&str, value:&str) -> io::Result<()> {
		self.transact("SET", channel, "VSET", Some(value)).map(|_| ())
	}

	fn close(&mut self) -> io::Result<()> {
		if !self.open { return Ok(()); }
		self.open = false;
		self.writer.shutdown(Shutdown::Both)
	}

}

impl Drop for Caen {

	fn drop(&mut self) {
		if let Err(e) = self.close() {
			warn!("Unable to close CAEN connection: {}", e);
		}
	}

}
