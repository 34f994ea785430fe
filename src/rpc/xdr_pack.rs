use crate::error::Result;
use crate::xdr::Packer;
use crate::rpc::{AUTH_NONE, CALL, RPCVERSION, REPLY, MSG_ACCEPTED};

pub fn pack_auth(packer:&mut Packer, flavor:i32, stuff:&[u8]) -> Result<()> {
	packer.pack_enum(flavor)?;
	packer.pack_variable_len_opaque(stuff)
}

pub fn pack_callheader(packer:&mut Packer, xid:u32, prog:u32, vers:u32, prc:u32, cred:(i32, &[u8]), verf:(i32, &[u8])) -> Result<()> {
	packer.pack_u32(xid)?;
	packer.pack_enum(CALL)?;
	packer.pack_u32(RPCVERSION)?;
	packer.pack_u32(prog)?;
	packer.pack_u32(vers)?;
	packer.pack_u32(prc)?;
	pack_auth(packer, cred.0, cred.1)?;
	pack_auth(packer, verf.0, verf.1)
}

pub fn pack_callheader_no_auth(packer:&mut Packer, xid:u32, prog:u32, vers:u32, prc:u32) -> Result<()> {
	pack_callheader(packer, xid, prog, vers, prc, (AUTH_NONE, &[]), (AUTH_NONE, &[]))
}

// Server side, used by the loopback instrument in the integration tests.  `accept_stat` is SUCCESS
// for a normal reply or one of the PROG_*/PROC_*/GARBAGE_ARGS codes
pub fn pack_replyheader(packer:&mut Packer, xid:u32, accept_stat:i32) -> Result<()> {
	packer.pack_u32(xid)?;
	packer.pack_enum(REPLY)?;
	packer.pack_enum(MSG_ACCEPTED)?;
	pack_auth(packer, AUTH_NONE, &[])?;
	packer.pack_enum(accept_stat)
}

pub fn pack_mapping(packer:&mut Packer, prog:u32, vers:u32, prot:u32, port:u32) -> Result<()> {
	packer.pack_u32(prog)?;
	packer.pack_u32(vers)?;
	packer.pack_u32(prot)?;
	packer.pack_u32(port)
}
