use std::io::Write;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{Error, Result};

#[derive(Default)]
pub struct Packer {
	buff: Vec<u8>,
}

#[derive(Default)]
pub struct Unpacker {
	buff: Vec<u8>,
	pos: usize,
}

fn padding(n: usize) -> usize { (4 - n % 4) % 4 }

impl Packer {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn get_buf(&self) -> &[u8] { &self.buff }

	// Packing methods that can only add multiples of four bytes, so if we started off with the correct
	// padding, we'll end up with the correct padding
	pub fn pack_u32(&mut self, x: u32) -> Result<()> { Ok(self.buff.write_u32::<BigEndian>(x)?) }
	pub fn pack_i32(&mut self, x: i32) -> Result<()> { Ok(self.buff.write_i32::<BigEndian>(x)?) }

	pub fn pack_bool(&mut self, b: bool) -> Result<()> { self.pack_i32(b as i32) }

	pub fn pack_enum(&mut self, x: i32) -> Result<()> { self.pack_i32(x) }

	pub fn pack_variable_len_opaque(&mut self, data: &[u8]) -> Result<()> {
		self.pack_u32(data.len() as u32)?;
		self.buff.write_all(data)?;
		self.buff.extend(std::iter::repeat(0).take(padding(data.len())));
		Ok(())
	}

	pub fn pack_string(&mut self, s: &str) -> Result<()> {
		if !s.is_ascii() { return Err(Error::Xdr("XDR strings must be ASCII")); }
		self.pack_variable_len_opaque(s.as_bytes())
	}

}

impl Unpacker {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self, data: &[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn remaining(&self) -> usize { self.buff.len() - self.pos }

	pub fn all_data_consumed(&self) -> bool { self.remaining() == 0 }

	fn take(&mut self, n: usize) -> Result<&[u8]> {
		if n > self.remaining() {
			return Err(Error::Xdr("Tried to read past the end of the buffer"));
		}
		let start = self.pos;
		self.pos += n;
		Ok(&self.buff[start..self.pos])
	}

	pub fn unpack_u32(&mut self) -> Result<u32> { self.take(4).map(BigEndian::read_u32) }
	pub fn unpack_i32(&mut self) -> Result<i32> { self.take(4).map(BigEndian::read_i32) }

	// An enum is just an i32 with a restricted set of values.  We can't check that this value is in the restricted set at this
	// level because it depends on the application, so for our purposes here, an enum is the same as an i32
	pub fn unpack_enum(&mut self) -> Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			_ => Err(Error::Xdr("Expected 0 or 1 for a boolean")),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		let ans = self.take(n)?.to_vec();
		self.take(padding(n))?;
		Ok(ans)
	}

	pub fn unpack_string(&mut self) -> Result<String> {
		String::from_utf8(self.unpack_variable_len_opaque()?).map_err(|_| Error::Xdr("String is not valid UTF-8"))
	}

}
