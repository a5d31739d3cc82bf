// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_LOCK_TIMEOUT_MS:u32 = 10000;

pub const OPERATION_FLAGS_END_ONLY:i32 = 8;

// Reason bits in a device_read response
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use log::debug;

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;

pub mod xdr_pack;

use xdr_pack::{CreateLinkParms, DeviceReadParms, DeviceWriteParms};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

// Translates the Device_ErrorCode values from the VXI-11 standard
pub fn device_error(code:i32) -> io::Error {
    match code {
        1  => err("Syntax error"),
        3  => err("Device not accessible"),
        4  => err("Invalid link identifier"),
        5  => err("Parameter error"),
        6  => err("Channel not established"),
        8  => err("Operation not supported"),
        9  => err("Out of resources"),
        11 => err("Device locked by another link"),
        12 => err("No lock held by this link"),
        15 => Error::new(ErrorKind::TimedOut, "I/O timeout"),
        17 => err("I/O error"),
        21 => err("Invalid address"),
        23 => err("Abort"),
        29 => err("Channel already established"),
        _  => err("Unknown device error"),
    }
}

pub struct CoreClient {
    client: TcpClient,
    opt_link: Option<Link>,
    io_timeout_ms: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub link_id: i32,
    pub abort_port: u32,
    pub max_recv_size: u32,
}

impl CoreClient {

    fn get_link(&self) -> io::Result<i32> {
        match self.opt_link {
            Some(Link{ link_id, .. }) => Ok(link_id),
            None => Err(err("No link")),
        }
    }

    pub fn new(host:&str, io_timeout:Duration) -> io::Result<Self> {
        // Socket timeout sits above the instrument's own I/O timeout
        let socket_timeout = Some(io_timeout + Duration::from_secs(2));

        let mut pmap_client = TcpPortMapperClient::new(host, socket_timeout)?;
        let mapping = Mapping {
            program: DEVICE_CORE_PROG,
            version: DEVICE_CORE_VERS,
            protocol: Protocol::TCP,
            port: 0,
        };
        let port = pmap_client.get_port(&mapping)?;
        debug!("VXI-11 core channel for {} is on port {}", host, port);

        let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, socket_timeout)?;
        let io_timeout_ms = io_timeout.as_millis().min(u32::MAX as u128) as u32;

        Ok(CoreClient{ client, opt_link: None, io_timeout_ms })
    }

    pub fn link(&self) -> Option<Link> { self.opt_link }

    pub fn create_link(&mut self, device:&str) -> io::Result<()> {
        if self.opt_link.is_some() {
            return Err(err("Already connected to a link"));
        }

        self.client.start_call(CREATE_LINK)?;
        CreateLinkParms{ client_id: CLIENT_ID, lock_device: false, lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS, device }
            .pack(&mut self.client.packer)?;
        self.client.do_call()?;

        let error:i32         = self.client.unpacker.unpack_i32()?;
        let link_id:i32       = self.client.unpacker.unpack_i32()?;
        let abort_port:u32    = self.client.unpacker.unpack_u32()?;
        let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

        if error != 0 { return Err(device_error(error)); }

        self.opt_link = Some(Link{ link_id, abort_port, max_recv_size });
        Ok(())
    }

    pub fn ask(&mut self, data:&[u8]) -> io::Result<Vec<u8>> {
        self.write(data)?;
        self.read()
    }

    pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
        let link_id:i32 = self.get_link()?;

        self.client.start_call(DEVICE_WRITE)?;
        DeviceWriteParms{
            link: link_id,
            io_timeout_ms: self.io_timeout_ms,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            flags: OPERATION_FLAGS_END_ONLY,
            data,
        }.pack(&mut self.client.packer)?;
        self.client.do_call()?;

        let error:i32 = self.client.unpacker.unpack_i32()?;
        let size:u32  = self.client.unpacker.unpack_u32()?;

        if error != 0 { return Err(device_error(error)); }
        if size as usize != data.len() {
            return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
        }
        Ok(())
    }

    // Keeps issuing device_read until the instrument flags END, since long waveform replies arrive in pieces
    pub fn read(&mut self) -> io::Result<Vec<u8>> {
        let link_id:i32 = self.get_link()?;
        let mut ans:Vec<u8> = vec![];

        loop {
            self.client.start_call(DEVICE_READ)?;
            DeviceReadParms{
                link: link_id,
                request_size: u32::MAX,
                io_timeout_ms: self.io_timeout_ms,
                lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
                flags: 0,
                term_char: 0,
            }.pack(&mut self.client.packer)?;
            self.client.do_call()?;

            let error:i32  = self.client.unpacker.unpack_i32()?;
            let reason:i32 = self.client.unpacker.unpack_i32()?;
            let mut data   = self.client.unpacker.unpack_variable_len_opaque()?;

            if error != 0 { return Err(device_error(error)); }
            ans.append(&mut data);

            if reason & (REASON_END | REASON_CHR) != 0 { return Ok(ans); }
        }
    }

    pub fn destroy_link(&mut self) -> io::Result<()> {
        let link_id:i32 = self.get_link()?;

        self.client.start_call(DESTROY_LINK)?;
        self.client.packer.pack_i32(link_id)?;
        self.client.do_call()?;

        // The link is gone from our side either way
        self.opt_link = None;

        match self.client.unpacker.unpack_i32()? {
            0 => Ok(()),
            e => Err(device_error(e)),
        }
    }

}
