
use std::io::{self, Error, ErrorKind};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub struct Packer {
	buff:Vec<u8>
}

// Reads from the front of a reply without copying the buffer around, so `pos` only ever moves forward
pub struct Unpacker {
	buff:Vec<u8>,
	pos:usize,
}

impl Packer {

	pub fn new() -> Self { Packer{ buff: Vec::new() } }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn as_bytes(&self) -> &[u8] { &self.buff }

	// These only ever add multiples of four bytes, so alignment is preserved
	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }
	pub fn pack_enum(&mut self, x:i32) -> io::Result<()> { self.pack_i32(x) }

	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> { self.pack_i32(if b { 1 } else { 0 }) }

	pub fn pack_variable_len_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		self.pack_u32(data.len() as u32)?;
		self.buff.extend_from_slice(data);
		while self.buff.len() % 4 != 0 { self.buff.push(0); }
		Ok(())
	}

	pub fn pack_string(&mut self, s:&str) -> io::Result<()> {
		if !s.is_ascii() { return Err(err("XDR strings must be ASCII")); }
		self.pack_variable_len_opaque(s.as_bytes())
	}

}

impl Default for Packer {
	fn default() -> Self { Self::new() }
}

impl Unpacker {

	pub fn new() -> Self { Unpacker{ buff: Vec::new(), pos: 0 } }

	pub fn reset(&mut self, data:&[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn remaining(&self) -> usize { self.buff.len() - self.pos }
	pub fn all_data_consumed(&self) -> bool { self.remaining() == 0 }

	fn take(&mut self, n:usize) -> io::Result<&[u8]> {
		if n > self.remaining() {
			return Err(Error::new(ErrorKind::UnexpectedEof, "Tried to read past the end of the XDR buffer"));
		}
		let start = self.pos;
		self.pos += n;
		Ok(&self.buff[start..self.pos])
	}

	pub fn unpack_u32(&mut self) -> io::Result<u32> { Ok(BigEndian::read_u32(self.take(4)?)) }
	pub fn unpack_i32(&mut self) -> io::Result<i32> { Ok(BigEndian::read_i32(self.take(4)?)) }

	// The set of legal values depends on the caller, so at this level an enum is just an i32
	pub fn unpack_enum(&mut self) -> io::Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> io::Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			_ => Err(err("Expected 0 or 1 for an XDR bool")),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> io::Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		let padded = (n + 3) / 4 * 4;
		if padded > self.remaining() {
			return Err(Error::new(ErrorKind::UnexpectedEof, "Opaque length runs past the end of the XDR buffer"));
		}
		let ans = self.take(padded)?[..n].to_vec();
		Ok(ans)
	}

}

impl Default for Unpacker {
	fn default() -> Self { Self::new() }
}
