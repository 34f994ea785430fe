use crate::error::{Error, Result};
use crate::xdr::Unpacker;
use crate::rpc::{CALL, REPLY, RPCVERSION, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR, MSG_ACCEPTED, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS, SYSTEM_ERR, SUCCESS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
	pub flavor: i32,
	pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHeader {
	pub xid: u32,
	pub prog: u32,
	pub vers: u32,
	pub prc: u32,
	pub cred: Auth,
	pub verf: Auth,
}

pub fn unpack_auth(unpacker:&mut Unpacker) -> Result<Auth> {
	let flavor:i32    = unpacker.unpack_enum()?;
	let body:Vec<u8>  = unpacker.unpack_variable_len_opaque()?;
	Ok(Auth{ flavor, body })
}

/// Returns the xid and verifier of an accepted, successful reply.  Every other outcome is an error
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> Result<(u32, Auth)> {
	let xid:u32 = unpacker.unpack_u32()?;

	if unpacker.unpack_enum()? != REPLY { return Err(Error::Rpc("Expected REPLY message type")); }

	match unpacker.unpack_enum()? {
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => {
					unpacker.unpack_u32()?;	// low version
					unpacker.unpack_u32()?;	// high version
					Err(Error::Rpc("Message denied due to RPC_MISMATCH"))
				},
				AUTH_ERROR => {
					unpacker.unpack_u32()?;	// auth_stat detail
					Err(Error::Rpc("Message denied due to AUTH_ERROR"))
				},
				_ => Err(Error::Rpc("Message denied for an unknown reason")),
			};
		},
		MSG_ACCEPTED => { },
		_ => return Err(Error::Rpc("Neither MSG_DENIED nor MSG_ACCEPTED")),
	}

	let verf = unpack_auth(unpacker)?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok((xid, verf)),
		PROG_UNAVAIL  => Err(Error::Rpc("Program unavailable")),
		PROG_MISMATCH => {
			unpacker.unpack_u32()?;
			unpacker.unpack_u32()?;
			Err(Error::Rpc("Program version mismatch"))
		},
		PROC_UNAVAIL  => Err(Error::Rpc("Procedure unavailable")),
		GARBAGE_ARGS  => Err(Error::Rpc("Server could not decode the arguments")),
		SYSTEM_ERR    => Err(Error::Rpc("System error on the server")),
		_             => Err(Error::Rpc("Call failed for an unknown reason")),
	}
}

pub fn unpack_callheader(unpacker:&mut Unpacker) -> Result<CallHeader> {
	let xid:u32 = unpacker.unpack_u32()?;
	if unpacker.unpack_enum()? != CALL { return Err(Error::Rpc("Expected CALL message type")); }
	if unpacker.unpack_u32()? != RPCVERSION { return Err(Error::Rpc("Unsupported RPC version")); }

	let prog = unpacker.unpack_u32()?;
	let vers = unpacker.unpack_u32()?;
	let prc  = unpacker.unpack_u32()?;
	let cred = unpack_auth(unpacker)?;
	let verf = unpack_auth(unpacker)?;

	Ok(CallHeader{ xid, prog, vers, prc, cred, verf })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rpc::xdr_pack::{pack_callheader_no_auth, pack_replyheader};
	use crate::xdr::Packer;

	#[test]
	fn call_header_survives_the_wire() {
		let mut p = Packer::new();
		pack_callheader_no_auth(&mut p, 42, 0x0607af, 1, 11).unwrap();

		let mut u = Unpacker::new();
		u.reset(p.get_buf());
		let hdr = unpack_callheader(&mut u).unwrap();
		assert_eq!((hdr.xid, hdr.prog, hdr.vers, hdr.prc), (42, 0x0607af, 1, 11));
		assert_eq!(hdr.cred, Auth{ flavor: 0, body: vec![] });
		assert!(u.all_data_consumed());
	}

	#[test]
	fn accepted_reply_yields_xid() {
		let mut p = Packer::new();
		pack_replyheader(&mut p, 7, SUCCESS).unwrap();
		p.pack_u32(1234).unwrap();

		let mut u = Unpacker::new();
		u.reset(p.get_buf());
		let (xid, _) = unpack_replyheader(&mut u).unwrap();
		assert_eq!(xid, 7);
		assert_eq!(u.unpack_u32().unwrap(), 1234);
	}

	#[test]
	fn failed_accept_stat_is_an_error() {
		let mut p = Packer::new();
		pack_replyheader(&mut p, 7, PROC_UNAVAIL).unwrap();

		let mut u = Unpacker::new();
		u.reset(p.get_buf());
		assert!(matches!(unpack_replyheader(&mut u), Err(Error::Rpc("Procedure unavailable"))));
	}

	#[test]
	fn denied_reply_is_an_error() {
		let mut p = Packer::new();
		p.pack_u32(9).unwrap();
		p.pack_enum(REPLY).unwrap();
		p.pack_enum(MSG_DENIED).unwrap();
		p.pack_enum(AUTH_ERROR).unwrap();
		p.pack_u32(1).unwrap();

		let mut u = Unpacker::new();
		u.reset(p.get_buf());
		assert!(unpack_replyheader(&mut u).is_err());
	}
}
