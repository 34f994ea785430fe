//! VISA resource addresses and opening a session for one.
//!
//! Only the LAN resource classes are backed by a transport here:
//! `TCPIP::host::INSTR` goes through VXI-11 and `TCPIP::host::port::SOCKET`
//! through a raw socket. USB and GPIB addresses parse, so a configuration
//! naming one gets a clear error rather than a syntax complaint.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::info;

use crate::error::{Error, Result};
use crate::rpc::port_mapping::PMAP_PORT;
use crate::scpi::Transport;
use crate::socket::SocketClient;
use crate::vxi11::{CoreClient, DEFAULT_DEVICE_NAME};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAddress {
    /// `TCPIP[board]::host[::device][::INSTR]`
    Vxi11 { board: u16, host: String, device: String },
    /// `TCPIP[board]::host::port::SOCKET`
    Socket { board: u16, host: String, port: u16 },
    /// `USB[board]::vendor::product::serial[::interface][::INSTR]`
    Usb { board: u16, vendor_id: u16, product_id: u16, serial: String, interface: Option<u16> },
    /// `GPIB[board]::primary[::secondary][::INSTR]`
    Gpib { board: u16, primary: u8, secondary: Option<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub timeout: Duration,
    pub portmapper_port: u16,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions { timeout: Duration::from_secs(10), portmapper_port: PMAP_PORT }
    }
}

fn split_interface(token: &str) -> Option<(String, u16)> {
    let upper = token.to_ascii_uppercase();
    let digits_at = upper.find(|c: char| c.is_ascii_digit()).unwrap_or(upper.len());
    let (kind, board) = upper.split_at(digits_at);
    let board = if board.is_empty() { 0 } else { board.parse().ok()? };
    Some((kind.to_owned(), board))
}

fn parse_int<T: TryFrom<u64>>(s: &str) -> Option<T> {
    let s = s.trim();
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None      => s.parse::<u64>().ok()?,
    };
    T::try_from(value).ok()
}

impl FromStr for ResourceAddress {
    type Err = Error;

    fn from_str(resource: &str) -> Result<Self> {
        let bad = |reason: &'static str| Error::Resource { resource: resource.to_owned(), reason };

        let mut parts: Vec<&str> = resource.trim().split("::").collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(bad("expected at least an interface and an address"));
        }

        let (kind, board) = split_interface(parts[0]).ok_or_else(|| bad("invalid board number"))?;

        let class = parts.last().map(|p| p.to_ascii_uppercase()).unwrap_or_default();
        let is_socket = class == "SOCKET";
        if class == "INSTR" || is_socket {
            parts.pop();
        }
        let fields = &parts[1..];

        match kind.as_str() {
            "TCPIP" if is_socket => {
                if fields.len() != 2 { return Err(bad("SOCKET resources need a host and a port")); }
                let port = parse_int::<u16>(fields[1]).ok_or_else(|| bad("invalid port"))?;
                Ok(ResourceAddress::Socket { board, host: fields[0].to_owned(), port })
            },
            "TCPIP" => {
                match fields {
                    [host] => Ok(ResourceAddress::Vxi11 { board, host: (*host).to_owned(), device: DEFAULT_DEVICE_NAME.to_owned() }),
                    [host, device] => Ok(ResourceAddress::Vxi11 { board, host: (*host).to_owned(), device: (*device).to_owned() }),
                    _ => Err(bad("TCPIP INSTR resources take a host and an optional device name")),
                }
            },
            "USB" if !is_socket => {
                if fields.len() != 3 && fields.len() != 4 {
                    return Err(bad("USB resources need vendor id, product id and serial number"));
                }
                let vendor_id = parse_int::<u16>(fields[0]).ok_or_else(|| bad("invalid vendor id"))?;
                let product_id = parse_int::<u16>(fields[1]).ok_or_else(|| bad("invalid product id"))?;
                let interface = match fields.get(3) {
                    Some(s) => Some(parse_int::<u16>(s).ok_or_else(|| bad("invalid interface number"))?),
                    None => None,
                };
                Ok(ResourceAddress::Usb { board, vendor_id, product_id, serial: fields[2].to_owned(), interface })
            },
            "GPIB" if !is_socket => {
                let primary = fields.first().and_then(|s| parse_int::<u8>(s)).filter(|p| *p <= 30)
                    .ok_or_else(|| bad("invalid primary address"))?;
                let secondary = match fields {
                    [_] => None,
                    [_, s] => Some(parse_int::<u8>(s).ok_or_else(|| bad("invalid secondary address"))?),
                    _ => return Err(bad("too many GPIB address fields")),
                };
                Ok(ResourceAddress::Gpib { board, primary, secondary })
            },
            _ => Err(bad("unknown interface type")),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceAddress::Vxi11 { board, host, device } => write!(f, "TCPIP{}::{}::{}::INSTR", board, host, device),
            ResourceAddress::Socket { board, host, port } => write!(f, "TCPIP{}::{}::{}::SOCKET", board, host, port),
            ResourceAddress::Usb { board, vendor_id, product_id, serial, interface } => {
                write!(f, "USB{}::0x{:04X}::0x{:04X}::{}", board, vendor_id, product_id, serial)?;
                if let Some(i) = interface { write!(f, "::{}", i)?; }
                write!(f, "::INSTR")
            },
            ResourceAddress::Gpib { board, primary, secondary } => {
                write!(f, "GPIB{}::{}", board, primary)?;
                if let Some(s) = secondary { write!(f, "::{}", s)?; }
                write!(f, "::INSTR")
            },
        }
    }
}

impl ResourceAddress {

    /// Connects to the resource and returns a transport ready for SCPI traffic
    pub fn open(&self, opts: &SessionOptions) -> Result<Box<dyn Transport>> {
        match self {
            ResourceAddress::Vxi11 { host, device, .. } => {
                let mut core = CoreClient::with_portmapper(host, opts.portmapper_port, opts.timeout)?;
                core.create_link(device)?;
                info!("Opened VXI-11 session to {}", self);
                Ok(Box::new(core))
            },
            ResourceAddress::Socket { host, port, .. } => {
                let client = SocketClient::connect((host.as_str(), *port), opts.timeout)?;
                info!("Opened socket session to {}", self);
                Ok(Box::new(client))
            },
            ResourceAddress::Usb { .. } | ResourceAddress::Gpib { .. } => Err(Error::Unsupported(format!(
                "{} (only TCPIP INSTR and SOCKET resources can be opened)", self
            ))),
        }
    }

}
