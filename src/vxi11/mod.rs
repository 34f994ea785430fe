// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DEVICE_READSTB:u32    = 13;
pub const DEVICE_TRIGGER:u32    = 14;
pub const DEVICE_CLEAR:u32      = 15;
pub const DEVICE_REMOTE:u32     = 16;
pub const DEVICE_LOCAL:u32      = 17;
pub const DEVICE_LOCK:u32       = 18;
pub const DEVICE_UNLOCK:u32     = 19;
pub const DEVICE_ENABLE_SRQ:u32 = 20;
pub const DEVICE_DOCMD:u32      = 22;
pub const DESTROY_LINK:u32      = 23;
pub const CREATE_INTR_CHAN:u32  = 25;
pub const DESTROY_INTR_CHAN:u32 = 26;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_LOCK_TIMEOUT:u32 = 10000;
pub const DEFAULT_IO_TIMEOUT:u32 = 10000;
pub const DEFAULT_DEVICE_NAME:&str = "inst0";

// Largest read we ask for in one DEVICE_READ; longer responses arrive over several calls
pub const READ_REQUEST_SIZE:u32 = 1 << 20;

pub const OPERATION_FLAGS_END_ONLY:i32 = 8;

// Bits of the reason field in a DEVICE_READ reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

use std::time::Duration;

use log::{debug, trace};

use crate::error::{check_device_error, Error, Result};
use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;
use crate::scpi::Transport;

pub mod xdr_pack;

pub struct CoreClient {
    client: TcpClient,
    opt_link: Option<Link>,
    io_timeout_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub link_id: i32,
    pub abort_port: u32,
    pub max_recv_size: u32,
}

fn duration_ms(timeout:Duration) -> u32 {
    timeout.as_millis().min(u32::MAX as u128) as u32
}

impl CoreClient {

    fn get_link(&self) -> Result<Link> {
        self.opt_link.ok_or(Error::Link("No link"))
    }

    pub fn with_portmapper(host:&str, pmap_port:u16, timeout:Duration) -> Result<Self> {

        // Find the port to use for the core program
        let mut pmap_client = TcpPortMapperClient::with_port(host, pmap_port, Some(timeout))?;

        let mapping = Mapping {
            program: DEVICE_CORE_PROG,
            version: DEVICE_CORE_VERS,
            protocol: Protocol::TCP,
            port: 0,
        };

        let port = pmap_client.get_port(&mapping)?;

        // The socket timeout has to outlast the io_timeout the device is given, or we'd give up
        // on replies that are still legitimately on their way
        let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, Some(timeout * 2))?;

        Ok(CoreClient { client, opt_link: None, io_timeout_ms: duration_ms(timeout) })
    }

    pub fn link(&self) -> Option<Link> { self.opt_link }

    pub fn set_timeout(&mut self, timeout:Duration) -> Result<()> {
        self.io_timeout_ms = duration_ms(timeout);
        self.client.set_timeout(Some(timeout * 2))
    }

    pub fn create_link(&mut self, device:&str) -> Result<Link> {
        if self.opt_link.is_some() {
            return Err(Error::Link("Already connected to a link"));
        }

        self.client.start_call(CREATE_LINK)?;
        xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, DEFAULT_LOCK_TIMEOUT, device)?;
        self.client.do_call()?;

        let error:i32         = self.client.unpacker.unpack_i32()?;
        let link_id:i32       = self.client.unpacker.unpack_i32()?;
        let abort_port:u32    = self.client.unpacker.unpack_u32()?;
        let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

        check_device_error(error)?;

        let link = Link{ link_id, abort_port, max_recv_size };
        debug!("Created VXI-11 link {:?} to device '{}'", link, device);
        self.opt_link = Some(link);
        Ok(link)
    }

    pub fn ask(&mut self, data:&[u8]) -> Result<Vec<u8>> {
        self.write(data)?;
        self.read()
    }

    pub fn write(&mut self, data:&[u8]) -> Result<()> {
        let link = self.get_link()?;

        // Devices must accept at least 1024 bytes per write
        let chunk_size = (link.max_recv_size.max(1024)) as usize;
        let mut chunks = data.chunks(chunk_size).peekable();

        // An empty message still has to go out once so the END flag reaches the device
        if chunks.peek().is_none() {
            return self.write_chunk(link.link_id, &[], true);
        }

        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            self.write_chunk(link.link_id, chunk, last)?;
        }
        Ok(())
    }

    fn write_chunk(&mut self, link_id:i32, chunk:&[u8], last:bool) -> Result<()> {
        let flags = if last { OPERATION_FLAGS_END_ONLY } else { 0 };

        self.client.start_call(DEVICE_WRITE)?;
        xdr_pack::pack_device_write_parms(&mut self.client.packer, link_id, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, flags, chunk)?;
        self.client.do_call()?;

        let error:i32 = self.client.unpacker.unpack_i32()?;
        let size:u32  = self.client.unpacker.unpack_u32()?;
        check_device_error(error)?;

        if size as usize != chunk.len() {
            return Err(Error::Link("Number of bytes in confirmation doesn't match number of bytes sent"));
        }
        trace!("Wrote {} bytes to link {}", size, link_id);
        Ok(())
    }

    /// Reads one complete response, issuing DEVICE_READ until the device flags END
    pub fn read(&mut self) -> Result<Vec<u8>> {
        let link = self.get_link()?;
        let mut ans:Vec<u8> = vec![];

        loop {
            self.client.start_call(DEVICE_READ)?;
            xdr_pack::pack_device_read_parms(&mut self.client.packer, link.link_id, READ_REQUEST_SIZE, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, 0, 0)?;
            self.client.do_call()?;

            let error:i32    = self.client.unpacker.unpack_i32()?;
            let reason:i32   = self.client.unpacker.unpack_i32()?;
            let mut data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;
            check_device_error(error)?;

            if reason & !(REASON_REQCNT | REASON_CHR | REASON_END) != 0 {
                return Err(Error::Link("Reserved bits set in read reason"));
            }

            trace!("Read {} bytes from link {} (reason={})", data.len(), link.link_id, reason);

            if reason & REASON_END != 0 {
                ans.append(&mut data);
                return Ok(ans);
            }
            if reason == 0 {
                return Err(Error::Link("Expected one of three reason bits to be set"));
            }
            // Asking again would get the same nothing back
            if data.is_empty() {
                return Err(Error::Link("Device returned an empty chunk without END"));
            }
            ans.append(&mut data);
        }
    }

    pub fn read_stb(&mut self) -> Result<u8> {
        let link = self.get_link()?;

        self.client.start_call(DEVICE_READSTB)?;
        xdr_pack::pack_device_generic_parms(&mut self.client.packer, link.link_id, 0, DEFAULT_LOCK_TIMEOUT, self.io_timeout_ms)?;
        self.client.do_call()?;

        let error:i32 = self.client.unpacker.unpack_i32()?;
        let stb:u32   = self.client.unpacker.unpack_u32()?;
        check_device_error(error)?;
        Ok(stb as u8)
    }

    pub fn clear(&mut self) -> Result<()> {
        let link = self.get_link()?;

        self.client.start_call(DEVICE_CLEAR)?;
        xdr_pack::pack_device_generic_parms(&mut self.client.packer, link.link_id, 0, DEFAULT_LOCK_TIMEOUT, self.io_timeout_ms)?;
        self.client.do_call()?;

        check_device_error(self.client.unpacker.unpack_i32()?)
    }

    pub fn destroy_link(&mut self) -> Result<()> {
        let link = self.opt_link.take().ok_or(Error::Link("No link to destroy"))?;

        self.client.start_call(DESTROY_LINK)?;
        xdr_pack::pack_device_link(&mut self.client.packer, link.link_id)?;
        self.client.do_call()?;

        check_device_error(self.client.unpacker.unpack_i32()?)?;
        debug!("Destroyed VXI-11 link {}", link.link_id);
        Ok(())
    }

}

impl Transport for CoreClient {
    fn write(&mut self, data:&[u8]) -> Result<()> { CoreClient::write(self, data) }
    fn read(&mut self) -> Result<Vec<u8>> { CoreClient::read(self) }
    fn timeout(&self) -> Duration { Duration::from_millis(self.io_timeout_ms as u64) }
    fn set_timeout(&mut self, timeout:Duration) -> Result<()> { CoreClient::set_timeout(self, timeout) }
    fn clear(&mut self) -> Result<()> { CoreClient::clear(self) }

    fn close(&mut self) -> Result<()> {
        if self.opt_link.is_some() { self.destroy_link() } else { Ok(()) }
    }
}
