use std::io;

use crate::xdr::Packer;
use crate::rpc::{CALL, RPCVERSION};

pub const AUTH_NONE_FLAVOR:i32 = 0;

#[derive(Debug, Clone, Copy)]
pub struct Auth<'a> {
	pub flavor: i32,
	pub body: &'a [u8],
}

// Instruments never ask for anything but AUTH_NONE
pub const AUTH_NONE:Auth<'static> = Auth{ flavor: AUTH_NONE_FLAVOR, body: &[] };

impl<'a> Auth<'a> {
	pub fn pack(&self, packer:&mut Packer) -> io::Result<()> {
		packer.pack_enum(self.flavor)?;
		packer.pack_variable_len_opaque(self.body)
	}
}

#[derive(Debug, Clone, Copy)]
pub struct CallHeader<'a> {
	pub xid: u32,
	pub prog: u32,
	pub vers: u32,
	pub prc: u32,
	pub cred: Auth<'a>,
	pub verf: Auth<'a>,
}

impl CallHeader<'static> {
	pub fn no_auth(xid:u32, prog:u32, vers:u32, prc:u32) -> Self {
		CallHeader{ xid, prog, vers, prc, cred: AUTH_NONE, verf: AUTH_NONE }
	}
}

impl<'a> CallHeader<'a> {
	pub fn pack(&self, packer:&mut Packer) -> io::Result<()> {
		packer.pack_u32(self.xid)?;
		packer.pack_enum(CALL)?;
		packer.pack_u32(RPCVERSION)?;
		for x in [self.prog, self.vers, self.prc].iter() { packer.pack_u32(*x)?; }
		self.cred.pack(packer)?;
		self.verf.pack(packer)
	}
}
