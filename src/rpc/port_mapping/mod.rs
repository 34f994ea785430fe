pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_NULL:u32    = 0;     // (void) -> void
pub const PMAPPROC_SET:u32     = 1;     // (mapping) -> bool
pub const PMAPPROC_UNSET:u32   = 2;     // (mapping) -> bool
pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int
pub const PMAPPROC_DUMP:u32    = 4;     // (void) -> pmaplist
pub const PMAPPROC_CALLIT:u32  = 5;     // (call_args) -> call_result

use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

use super::{IPPROTO_TCP, IPPROTO_UDP};
use super::xdr_pack;
use super::tcp_clients::TcpClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	TCP,
	UDP,
}

impl Protocol {
	pub fn to_u32(self) -> u32 { match self {
		Protocol::TCP => IPPROTO_TCP,
		Protocol::UDP => IPPROTO_UDP,
	}}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub protocol: Protocol,
	pub port: u32,				// XDR encodes it as a u32 even though only 16 bits are meaningful
}

pub struct TcpPortMapperClient {
	pub host: String,
	tcp_client: TcpClient,
}

impl TcpPortMapperClient {

	/// `port` is PMAP_PORT unless the portmapper listens somewhere else
	pub fn with_port(host:&str, port:u16, timeout:Option<Duration>) -> Result<Self> {
		let tcp_client = TcpClient::connect((host, port), PMAP_PROG, PMAP_VERS, timeout)?;
		Ok(Self{ host: host.to_owned(), tcp_client })
	}

	pub fn get_port(&mut self, m:&Mapping) -> Result<u16> {
		self.tcp_client.start_call(PMAPPROC_GETPORT)?;
		xdr_pack::pack_mapping(&mut self.tcp_client.packer, m.program, m.version, m.protocol.to_u32(), m.port)?;
		self.tcp_client.do_call()?;

		let ans:u32 = self.tcp_client.unpacker.unpack_u32()?;
		if !self.tcp_client.unpacker.all_data_consumed() {
			return Err(Error::Rpc("Data unexpectedly left over in unpacker after unpacking port"));
		}

		debug!("Portmapper on {} maps program {:#x} v{} to port {}", self.host, m.program, m.version, ans);
		match ans {
			0 => Err(Error::Rpc("Program is not registered with the portmapper")),
			p if p > u16::MAX as u32 => Err(Error::Rpc("Portmapper returned an out-of-range port")),
			p => Ok(p as u16),
		}
	}

}
