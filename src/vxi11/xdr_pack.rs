use std::io;

use crate::xdr::Packer;

// Argument structures of the device core procedures, in the order the VXI-11 standard lays them out

pub struct CreateLinkParms<'a> {
	pub client_id: i32,
	pub lock_device: bool,
	pub lock_timeout_ms: u32,
	pub device: &'a str,
}

pub struct DeviceWriteParms<'a> {
	pub link: i32,
	pub io_timeout_ms: u32,
	pub lock_timeout_ms: u32,
	pub flags: i32,
	pub data: &'a [u8],
}

pub struct DeviceReadParms {
	pub link: i32,
	pub request_size: u32,
	pub io_timeout_ms: u32,
	pub lock_timeout_ms: u32,
	pub flags: i32,
	pub term_char: i32,
}

impl<'a> CreateLinkParms<'a> {
	pub fn pack(&self, packer:&mut Packer) -> io::Result<()> {
		packer.pack_i32(self.client_id)?;
		packer.pack_bool(self.lock_device)?;
		packer.pack_u32(self.lock_timeout_ms)?;
		packer.pack_string(self.device)
	}
}

impl<'a> DeviceWriteParms<'a> {
	pub fn pack(&self, packer:&mut Packer) -> io::Result<()> {
		packer.pack_i32(self.link)?;
		packer.pack_u32(self.io_timeout_ms)?;
		packer.pack_u32(self.lock_timeout_ms)?;
		packer.pack_i32(self.flags)?;
		packer.pack_variable_len_opaque(self.data)
	}
}

impl DeviceReadParms {
	pub fn pack(&self, packer:&mut Packer) -> io::Result<()> {
		packer.pack_i32(self.link)?;
		packer.pack_u32(self.request_size)?;
		packer.pack_u32(self.io_timeout_ms)?;
		packer.pack_u32(self.lock_timeout_ms)?;
		packer.pack_i32(self.flags)?;
		packer.pack_i32(self.term_char)
	}
}
