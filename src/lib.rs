
// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// Plain SCPI over a TCP socket, for instruments addressed as TCPIP::host::port::SOCKET
pub mod socket;

// Command/query layer shared by every transport
pub mod scpi;

// VISA resource strings and opening a transport for one
pub mod visa;

// Module for instruments driven through the SCPI layer
pub mod devices;

pub mod waveform;
pub mod export;
pub mod config;
pub mod capture;

pub mod error;
pub use error::{Error, Result};
