// SCPI session layer: the command/query helpers every driver in `devices` is written against

use std::str;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use lazy_static::lazy_static;
use log::{debug, trace, warn};
use regex::{Captures, Regex};
use serde::Serialize;

use crate::error::{Error, Result};

lazy_static! {
    static ref IDN_RE: Regex      = Regex::new("^([^,]+),([^,]+),([^,]+),([^,\\s]+)").unwrap();
    static ref SYST_ERR_RE: Regex = Regex::new("^([+-]?\\d+)\\s*,\\s*\"?([^\"]*)\"?").unwrap();
}

// Upper bound on how many entries we pull out of the error queue after one command
const MAX_ERROR_QUEUE_READS: usize = 32;

/// A byte pipe to an instrument.  One `write` is one message; one `read` returns one complete response
pub trait Transport {
    fn write(&mut self, data: &[u8]) -> Result<()>;
    fn read(&mut self) -> Result<Vec<u8>>;
    fn timeout(&self) -> Duration;
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;
    fn close(&mut self) -> Result<()>;

    /// Device clear, where the transport has one
    fn clear(&mut self) -> Result<()> { Ok(()) }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> { (**self).write(data) }
    fn read(&mut self) -> Result<Vec<u8>> { (**self).read() }
    fn timeout(&self) -> Duration { (**self).timeout() }
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> { (**self).set_timeout(timeout) }
    fn close(&mut self) -> Result<()> { (**self).close() }
    fn clear(&mut self) -> Result<()> { (**self).clear() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial_num: String,
    pub fw_version: String,
}

impl Identity {
    pub fn parse(idn: &str) -> Result<Self> {
        let caps: Captures = IDN_RE.captures(idn.trim()).ok_or_else(|| Error::parse(idn, "not an *IDN? response"))?;
        let field = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();
        Ok(Identity {
            manufacturer: field(1),
            model: field(2),
            serial_num: field(3),
            fw_version: field(4),
        })
    }
}

/// Locates the payload of an IEEE 488.2 block (`#<n><len><data>` or `#0<data>\n`).
/// Returns the payload range within `bytes`
pub fn block_payload(bytes: &[u8]) -> Result<std::ops::Range<usize>> {
    let text = || String::from_utf8_lossy(&bytes[..bytes.len().min(16)]).into_owned();

    if bytes.first() != Some(&b'#') {
        return Err(Error::parse(&text(), "block data must start with '#'"));
    }
    let digits = match bytes.get(1) {
        Some(d) if d.is_ascii_digit() => (d - b'0') as usize,
        _ => return Err(Error::parse(&text(), "missing block length digit")),
    };

    // Indefinite length: runs to the terminating newline
    if digits == 0 {
        let end = if bytes.ends_with(b"\n") { bytes.len() - 1 } else { bytes.len() };
        return Ok(2..end.max(2));
    }

    let len_field = bytes.get(2..2 + digits).ok_or_else(|| Error::parse(&text(), "truncated block header"))?;
    let len: usize = str::from_utf8(len_field).ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::parse(&text(), "block length is not a number"))?;

    let start = 2 + digits;
    if bytes.len() < start + len {
        return Err(Error::parse(&text(), "block is shorter than its header claims"));
    }
    Ok(start..start + len)
}

/// Comma-separated ASCII numbers, as returned with `FORM ASC`
pub fn parse_ascii_floats(response: &str) -> Result<Vec<f64>> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }
    trimmed
        .split(',')
        .map(|s| s.trim().parse::<f64>().map_err(|_| Error::parse(s, "not a floating point number")))
        .collect()
}

/// Binary block of little-endian f32, as returned with `FORM REAL,32`
pub fn parse_binary_floats(bytes: &[u8]) -> Result<Vec<f64>> {
    let payload = &bytes[block_payload(bytes)?];
    if payload.len() % 4 != 0 {
        return Err(Error::parse(&String::from_utf8_lossy(&bytes[..2]), "binary block is not a whole number of f32 values"));
    }
    Ok(payload.chunks_exact(4).map(|c| LittleEndian::read_f32(c) as f64).collect())
}

fn trim_response(raw: &[u8]) -> Result<String> {
    str::from_utf8(raw)
        .map(|s| s.trim_end_matches(|c| c == '\n' || c == '\r').to_owned())
        .map_err(|_| Error::Instrument("Unable to parse response as UTF-8".to_owned()))
}

/// An open SCPI session over some transport
pub struct Instrument<T: Transport> {
    transport: T,
    status_checking: bool,
    closed: bool,
}

impl<T: Transport> Instrument<T> {

    pub fn new(transport: T) -> Self {
        Instrument { transport, status_checking: false, closed: false }
    }

    pub fn transport(&self) -> &T { &self.transport }

    /// With status checking on, every command is followed by draining `SYST:ERR?`
    pub fn set_status_checking(&mut self, enabled: bool) { self.status_checking = enabled; }

    pub fn status_checking(&self) -> bool { self.status_checking }

    pub fn timeout(&self) -> Duration { self.transport.timeout() }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> { self.transport.set_timeout(timeout) }

    fn send(&mut self, cmd: &str) -> Result<()> {
        debug!("-> {}", cmd);
        let mut msg = Vec::with_capacity(cmd.len() + 1);
        msg.extend_from_slice(cmd.as_bytes());
        msg.push(b'\n');
        self.transport.write(&msg)
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let raw = self.transport.read()?;
        if raw.len() > 80 {
            debug!("<- {} bytes", raw.len());
        } else {
            debug!("<- {}", String::from_utf8_lossy(&raw).trim_end());
        }
        Ok(raw)
    }

    pub fn write_str(&mut self, cmd: &str) -> Result<()> {
        self.send(cmd)?;
        self.check_status()
    }

    pub fn query(&mut self, cmd: &str) -> Result<String> {
        self.send(cmd)?;
        let raw = self.receive()?;
        self.check_status()?;
        trim_response(&raw)
    }

    pub fn query_f64(&mut self, cmd: &str) -> Result<f64> {
        let res = self.query(cmd)?;
        res.trim().parse::<f64>().map_err(|_| Error::parse(&res, "not a floating point number"))
    }

    /// `*OPC?`: blocks until every pending operation has finished
    pub fn query_opc(&mut self) -> Result<()> {
        let res = self.query("*OPC?")?;
        if res.trim() == "1" { Ok(()) } else { Err(Error::parse(&res, "expected 1 from *OPC?")) }
    }

    /// Sends `cmd;*OPC?` and waits up to `timeout_ms` for the completion reply
    pub fn write_str_with_opc(&mut self, cmd: &str, timeout_ms: u64) -> Result<()> {
        let previous = self.transport.timeout();
        let requested = Duration::from_millis(timeout_ms);
        if requested != previous {
            self.transport.set_timeout(requested)?;
        }

        let result = self.query(&format!("{};*OPC?", cmd));
        let restored = if requested != previous { self.transport.set_timeout(previous) } else { Ok(()) };

        // A failed query is the error worth reporting, even if the timeout couldn't be put back
        let res = match (result, restored) {
            (Ok(res), restored) => {
                restored?;
                res
            },
            (Err(e), Err(restore_err)) => {
                warn!("Unable to restore timeout of {:?}: {}", previous, restore_err);
                return Err(e);
            },
            (Err(e), Ok(())) => return Err(e),
        };
        if res.trim() == "1" { Ok(()) } else { Err(Error::parse(&res, "expected 1 from *OPC?")) }
    }

    /// Float data in either `FORM ASC` or `FORM REAL,32`, whichever the instrument answers with
    pub fn query_bin_or_ascii_float_list(&mut self, cmd: &str) -> Result<Vec<f64>> {
        self.send(cmd)?;
        let raw = self.receive()?;
        self.check_status()?;

        if raw.first() == Some(&b'#') {
            parse_binary_floats(&raw)
        } else {
            parse_ascii_floats(&trim_response(&raw)?)
        }
    }

    pub fn idn(&mut self) -> Result<Identity> {
        let res = self.query("*IDN?")?;
        Identity::parse(&res)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.write_str("*RST")?;
        self.query_opc()
    }

    pub fn clear_status(&mut self) -> Result<()> {
        self.write_str("*CLS")
    }

    pub fn device_clear(&mut self) -> Result<()> {
        self.transport.clear()
    }

    /// Drains the error queue.  Fails with every reported error if there were any
    pub fn check_status(&mut self) -> Result<()> {
        if !self.status_checking {
            return Ok(());
        }

        let mut errors: Vec<String> = vec![];
        for _ in 0..MAX_ERROR_QUEUE_READS {
            self.send("SYST:ERR?")?;
            let res = trim_response(&self.receive()?)?;
            let caps = SYST_ERR_RE.captures(res.trim()).ok_or_else(|| Error::parse(&res, "not a SYST:ERR? response"))?;

            let code: i32 = caps.get(1).map(|m| m.as_str()).unwrap_or("").parse()
                .map_err(|_| Error::parse(&res, "error code is not an integer"))?;
            if code == 0 {
                break;
            }
            let msg = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            errors.push(format!("{},\"{}\"", code, msg));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Instrument(format!("Instrument reported: {}", errors.join("; "))))
        }
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        trace!("Closing instrument session");
        self.transport.close()
    }
}

impl<T: Transport> Drop for Instrument<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Unable to close instrument session: {}", e);
        }
    }
}
