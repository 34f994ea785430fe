use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::trace;

use crate::error::{Error, Result};
use crate::xdr;
use super::{xdr_pack, xdr_unpack, LAST_FRAGMENT};

/// Writes `data` as a single-fragment record
pub fn write_record<W: Write>(w:&mut W, data:&[u8]) -> Result<()> {
	let mut send_bytes:Vec<u8> = Vec::with_capacity(data.len() + 4);
	send_bytes.write_u32::<BigEndian>(data.len() as u32 | LAST_FRAGMENT)?;
	send_bytes.extend_from_slice(data);
	w.write_all(&send_bytes)?;
	Ok(())
}

/// Reads fragments until the one flagged as last and returns the reassembled record
pub fn read_record<R: Read>(r:&mut R) -> Result<Vec<u8>> {
	let mut record:Vec<u8> = vec![];
	let mut last:bool = false;
	while !last {
		let x:u32 = r.read_u32::<BigEndian>()?;
		last = (x & LAST_FRAGMENT) != 0;

		let n = (x & !LAST_FRAGMENT) as usize;
		let start = record.len();
		record.resize(start + n, 0);
		r.read_exact(&mut record[start..])?;
	}
	Ok(record)
}

pub struct TcpClient {
	stream: TcpStream,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
}

impl TcpClient {

	pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32, timeout: Option<Duration>) -> Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_read_timeout(timeout)?;
		stream.set_write_timeout(timeout)?;
		stream.set_nodelay(true)?;
		Ok(Self{ stream, prog, vers, lastxid: 0, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() })
	}

	pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
		self.stream.set_read_timeout(timeout)?;
		self.stream.set_write_timeout(timeout)?;
		Ok(())
	}

	/// Bumps the xid and packs the call header; arguments are packed next, then `do_call`
	pub fn start_call(&mut self, prc: u32) -> Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	/// Sends the packed call and leaves the reply body, past its header, in the unpacker
	pub fn do_call(&mut self) -> Result<()> {
		trace!("RPC call xid={} prog={:#x} ({} bytes)", self.lastxid, self.prog, self.packer.get_buf().len());
		write_record(&mut self.stream, self.packer.get_buf())?;

		loop {
			let reply = read_record(&mut self.stream)?;

			// Load the response into the unpacker and make sure the xid matches
			self.unpacker.reset(&reply);

			let (xid, _) = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			} else if xid < self.lastxid {
				// Reply to an earlier call that we already gave up on
				trace!("Skipping stale reply xid={}", xid);
				continue;
			} else {
				return Err(Error::Rpc("Received a reply for a call that hasn't been made yet"));
			}
		}
	}

}
