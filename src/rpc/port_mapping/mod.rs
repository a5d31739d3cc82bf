
pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use super::IPPROTO_TCP;
use crate::xdr::Packer;
use super::tcp_clients::TcpClient;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Protocol {
	TCP,
}

impl Protocol {
	pub fn to_u32(&self) -> u32 { match self {
		Protocol::TCP => IPPROTO_TCP,
	}}
}

#[derive(Debug)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub protocol: Protocol,
	pub port: u32,
}

impl Mapping {
	pub fn pack(&self, packer:&mut Packer) -> io::Result<()> {
		packer.pack_u32(self.program)?;
		packer.pack_u32(self.version)?;
		packer.pack_u32(self.protocol.to_u32())?;
		packer.pack_u32(self.port)
	}
}

pub struct TcpPortMapperClient {
	tcp_client: TcpClient,
}

impl TcpPortMapperClient {

	pub fn new(host:&str, timeout:Option<Duration>) -> io::Result<Self> {
		let tcp_client = TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS, timeout)?;
		Ok(Self{ tcp_client })
	}

	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u16> {
		self.tcp_client.start_call(PMAPPROC_GETPORT)?;
		m.pack(&mut self.tcp_client.packer)?;
		self.tcp_client.do_call()?;

		let port:u32 = self.tcp_client.unpacker.unpack_u32()?;

		if !self.tcp_client.unpacker.all_data_consumed() {
			return Err(Error::new(ErrorKind::Other, "Data unexpectedly left over after unpacking port"));
		}
		match port {
			0 => Err(Error::new(ErrorKind::NotFound, "Program is not registered with the port mapper")),
			p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::Other, "Port mapper returned an out-of-range port")),
			p => Ok(p as u16),
		}
	}

}
