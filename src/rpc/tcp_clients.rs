use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::debug;

use crate::xdr::{Packer, Unpacker};
use super::LAST_FRAGMENT;
use super::xdr_pack::CallHeader;
use super::xdr_unpack::unpack_replyheader;

pub struct TcpClient {
	stream: TcpStream,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: Packer,
	pub unpacker: Unpacker,
}

// Record marking: each fragment is prefixed by a u32 length with the top bit flagging the last fragment
pub fn write_record<W:Write>(w:&mut W, data:&[u8]) -> io::Result<()> {
	let mut send_bytes:Vec<u8> = Vec::with_capacity(data.len() + 4);
	send_bytes.write_u32::<BigEndian>(data.len() as u32 | LAST_FRAGMENT)?;
	send_bytes.extend_from_slice(data);
	w.write_all(&send_bytes)?;
	w.flush()
}

pub fn read_record<R:Read>(r:&mut R) -> io::Result<Vec<u8>> {
	let mut record:Vec<u8> = vec![];
	loop {
		let x:u32 = r.read_u32::<BigEndian>()?;
		let n = (x & !LAST_FRAGMENT) as usize;

		let mut frag = vec![0u8; n];
		r.read_exact(&mut frag)?;
		record.append(&mut frag);

		if x & LAST_FRAGMENT != 0 { return Ok(record); }
	}
}

impl TcpClient {

	pub fn connect<A:ToSocketAddrs>(addr:A, prog:u32, vers:u32, timeout:Option<Duration>) -> io::Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_read_timeout(timeout)?;
		stream.set_nodelay(true)?;
		Ok(Self{ stream, prog, vers, lastxid: 0, packer: Packer::new(), unpacker: Unpacker::new() })
	}

	// Resets the packer with a fresh call header; procedure arguments get packed after this
	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		CallHeader::no_auth(self.lastxid, self.prog, self.vers, prc).pack(&mut self.packer)
	}

	// Sends whatever is in the packer and leaves the matching reply body in the unpacker
	pub fn do_call(&mut self) -> io::Result<()> {
		write_record(&mut self.stream, self.packer.as_bytes())?;

		loop {
			let reply = read_record(&mut self.stream)?;
			self.unpacker.reset(&reply);

			let xid = unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			} else if xid < self.lastxid {
				// Stale reply to an earlier call that timed out on our side
				debug!("Discarding stale RPC reply xid={} (waiting for {})", xid, self.lastxid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::Other, "Received a reply for a call that hasn't been made"));
			}
		}
	}

}
