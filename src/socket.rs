// Raw SCPI over TCP (VISA `TCPIP::host::port::SOCKET`), newline terminated

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};
use crate::scpi::{block_payload, Transport};

pub const DEFAULT_SCPI_PORT: u16 = 5025;

pub struct SocketClient {
	reader: BufReader<TcpStream>,
	timeout: Duration,
}

impl SocketClient {

	pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_nodelay(true)?;
		stream.set_read_timeout(Some(timeout))?;
		stream.set_write_timeout(Some(timeout))?;
		debug!("Connected raw SCPI socket to {}", stream.peer_addr()?);
		Ok(Self{ reader: BufReader::new(stream), timeout })
	}

	fn read_line_into(&mut self, buf: &mut Vec<u8>) -> Result<()> {
		let n = self.reader.read_until(b'\n', buf)?;
		if n == 0 {
			return Err(Error::Instrument("Connection closed by the instrument".to_owned()));
		}
		Ok(())
	}

}

impl Transport for SocketClient {

	fn write(&mut self, data: &[u8]) -> Result<()> {
		let stream = self.reader.get_mut();
		stream.write_all(data)?;
		if !data.ends_with(b"\n") {
			stream.write_all(b"\n")?;
		}
		Ok(())
	}

	// Block data may itself contain newlines, so a response starting with '#<n>' is read by length
	fn read(&mut self) -> Result<Vec<u8>> {
		let mut ans: Vec<u8> = vec![];

		let mut head = [0u8; 2];
		self.reader.read_exact(&mut head[..1])?;
		ans.push(head[0]);
		if head[0] != b'#' {
			if head[0] != b'\n' {
				self.read_line_into(&mut ans)?;
			}
			return Ok(ans);
		}

		self.reader.read_exact(&mut head[1..])?;
		ans.push(head[1]);
		let digits = match head[1] {
			b'0' => {
				self.read_line_into(&mut ans)?;
				return Ok(ans);
			},
			d if d.is_ascii_digit() => (d - b'0') as usize,
			_ => return Err(Error::parse(&String::from_utf8_lossy(&ans), "missing block length digit")),
		};

		let start = ans.len();
		ans.resize(start + digits, 0);
		self.reader.read_exact(&mut ans[start..])?;

		let len: usize = std::str::from_utf8(&ans[start..]).ok()
			.and_then(|s| s.parse().ok())
			.ok_or_else(|| Error::parse(&String::from_utf8_lossy(&ans), "block length is not a number"))?;

		let start = ans.len();
		ans.resize(start + len, 0);
		self.reader.read_exact(&mut ans[start..])?;

		// Trailing terminator after the block
		self.read_line_into(&mut ans)?;

		block_payload(&ans)?;
		Ok(ans)
	}

	fn timeout(&self) -> Duration { self.timeout }

	fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
		let stream = self.reader.get_ref();
		stream.set_read_timeout(Some(timeout))?;
		stream.set_write_timeout(Some(timeout))?;
		self.timeout = timeout;
		Ok(())
	}

	fn close(&mut self) -> Result<()> {
		match self.reader.get_ref().shutdown(Shutdown::Both) {
			Ok(()) => Ok(()),
			// Already gone from the other side
			Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

}
