use std::fmt;
use std::str::FromStr;

use log::info;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::scpi::{Identity, Instrument, Transport};
use crate::waveform::Waveform;

pub const CHANNEL_COUNT:u8 = 4;
pub const DEFAULT_SINGLE_TIMEOUT_MS:u64 = 3000;

pub struct MXO<T: Transport> {
	inst: Instrument<T>,
	pub identity: Option<Identity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coupling {
	#[serde(rename = "DC")]  Dc,		// DC 50 Ohm
	#[serde(rename = "DCL")] DcLimit,	// DC 1 MOhm
	#[serde(rename = "ACL")] AcLimit,	// AC 1 MOhm
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
	#[serde(rename = "AUTO")] Auto,
	#[serde(rename = "NORM")] Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSlope {
	#[serde(rename = "POS")]  Positive,
	#[serde(rename = "NEG")]  Negative,
	#[serde(rename = "EITH")] Either,
}

macro_rules! scpi_keyword {
	($ty:ident { $($variant:ident => $kw:expr),+ $(,)? }) => {
		impl $ty {
			pub fn keyword(self) -> &'static str { match self { $($ty::$variant => $kw),+ } }
		}

		impl fmt::Display for $ty {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.keyword()) }
		}

		impl FromStr for $ty {
			type Err = Error;
			fn from_str(s: &str) -> Result<Self> {
				let upper = s.trim().to_ascii_uppercase();
				$( if upper == $kw { return Ok($ty::$variant); } )+
				Err(Error::parse(s, concat!("unrecognized ", stringify!($ty))))
			}
		}
	};
}

scpi_keyword!(Coupling { Dc => "DC", DcLimit => "DCL", AcLimit => "ACL" });
scpi_keyword!(TriggerMode { Auto => "AUTO", Normal => "NORM" });
scpi_keyword!(TriggerSlope { Positive => "POS", Negative => "NEG", Either => "EITH" });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSetup {
	pub number: u8,
	/// Full vertical range in volts (10 divisions)
	pub range_v: f64,
	pub offset_v: f64,
	pub coupling: Coupling,
	pub enabled: bool,
}

impl Default for ChannelSetup {
	fn default() -> Self {
		ChannelSetup{ number: 1, range_v: 8.0, offset_v: 0.0, coupling: Coupling::AcLimit, enabled: true }
	}
}

/// Edge trigger on one of the analog channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSetup {
	pub mode: TriggerMode,
	pub slope: TriggerSlope,
	pub source: u8,
	pub level_v: f64,
}

impl Default for TriggerSetup {
	fn default() -> Self {
		TriggerSetup{ mode: TriggerMode::Auto, slope: TriggerSlope::Positive, source: 1, level_v: 0.0 }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSetup {
	/// Horizontal range in seconds
	pub acquisition_time_s: f64,
	pub channel: ChannelSetup,
	pub trigger: TriggerSetup,
}

impl Default for AcquisitionSetup {
	fn default() -> Self {
		AcquisitionSetup{ acquisition_time_s: 120e-3, channel: ChannelSetup::default(), trigger: TriggerSetup::default() }
	}
}

#[derive(Debug, Serialize)]
pub struct State {
	pub identity: Option<Identity>,
	pub acquisition_time_s: f64,
	pub trigger_mode: TriggerMode,
	pub trigger_source: String,
	pub channel: ChannelState,
}

#[derive(Debug, Serialize)]
pub struct ChannelState {
	pub number: u8,
	pub range_v: f64,
	pub offset_v: f64,
	pub coupling: Coupling,
	pub enabled: bool,
}

pub fn chan_ok(n:u8) -> Result<()> {
	if n == 0 || n > CHANNEL_COUNT { Err(Error::Instrument(format!("MXO channel must be 1 to {}, got {}", CHANNEL_COUNT, n))) }
	else { Ok(()) }
}

fn parse_on_off(res:&str) -> Result<bool> {
	match res.trim().to_ascii_uppercase().as_str() {
		"1" | "ON"  => Ok(true),
		"0" | "OFF" => Ok(false),
		_           => Err(Error::parse(res, "expected ON/OFF")),
	}
}

impl<T: Transport> MXO<T> {

	pub fn new(inst:Instrument<T>) -> Self {
		MXO{ inst, identity: None }
	}

	/// Asks `*IDN?` and refuses anything that isn't an R&S MXO
	pub fn identify(&mut self) -> Result<&Identity> {
		let id = self.inst.idn()?;
		if !id.manufacturer.to_ascii_uppercase().contains("ROHDE") || !id.model.to_ascii_uppercase().starts_with("MXO") {
			return Err(Error::Instrument(format!(
				"Connected to a {} {} but expected a Rohde&Schwarz MXO", id.manufacturer, id.model
			)));
		}
		info!("Connected to {} {} (serial {}, firmware {})", id.manufacturer, id.model, id.serial_num, id.fw_version);
		Ok(self.identity.insert(id))
	}

	pub fn instrument(&mut self) -> &mut Instrument<T> { &mut self.inst }

	// Horizontal
	pub fn set_acquisition_time(&mut self, seconds:f64) -> Result<()> {
		self.inst.write_str(&format!("TIM:ACQT {}", seconds))
	}

	pub fn get_acquisition_time(&mut self) -> Result<f64> { self.inst.query_f64("TIM:ACQT?") }

	// Vertical
	pub fn set_channel_range(&mut self, chan_num:u8, volts:f64) -> Result<()> {
		chan_ok(chan_num)?;
		self.inst.write_str(&format!("CHAN{}:RANG {}", chan_num, volts))
	}

	pub fn set_channel_offset(&mut self, chan_num:u8, volts:f64) -> Result<()> {
		chan_ok(chan_num)?;
		self.inst.write_str(&format!("CHAN{}:OFFS {}", chan_num, volts))
	}

	pub fn set_channel_coupling(&mut self, chan_num:u8, coupling:Coupling) -> Result<()> {
		chan_ok(chan_num)?;
		self.inst.write_str(&format!("CHAN{}:COUP {}", chan_num, coupling))
	}

	pub fn set_channel_enabled(&mut self, chan_num:u8, enabled:bool) -> Result<()> {
		chan_ok(chan_num)?;
		self.inst.write_str(&format!("CHAN{}:STAT {}", chan_num, if enabled {"ON"} else {"OFF"}))
	}

	pub fn get_channel_state(&mut self, chan_num:u8) -> Result<ChannelState> {
		chan_ok(chan_num)?;

		let range_v  = self.inst.query_f64(&format!("CHAN{}:RANG?", chan_num))?;
		let offset_v = self.inst.query_f64(&format!("CHAN{}:OFFS?", chan_num))?;
		let coupling = self.inst.query(&format!("CHAN{}:COUP?", chan_num))?.parse::<Coupling>()?;
		let enabled  = parse_on_off(&self.inst.query(&format!("CHAN{}:STAT?", chan_num))?)?;

		Ok(ChannelState{ number: chan_num, range_v, offset_v, coupling, enabled })
	}

	// Trigger
	pub fn set_trigger_mode(&mut self, mode:TriggerMode) -> Result<()> {
		self.inst.write_str(&format!("TRIG:A:MODE {}", mode))
	}

	pub fn get_trigger_mode(&mut self) -> Result<TriggerMode> {
		self.inst.query("TRIG:A:MODE?")?.parse()
	}

	pub fn set_trigger_edge(&mut self, slope:TriggerSlope) -> Result<()> {
		self.inst.write_str(&format!("TRIG:A:TYPE EDGE;:TRIG:A:EDGE:SLOP {}", slope))
	}

	pub fn set_trigger_source(&mut self, chan_num:u8) -> Result<()> {
		chan_ok(chan_num)?;
		self.inst.write_str(&format!("TRIG:A:SOUR CH{}", chan_num))
	}

	/// Trigger levels are kept per source channel
	pub fn set_trigger_level(&mut self, chan_num:u8, volts:f64) -> Result<()> {
		chan_ok(chan_num)?;
		self.inst.write_str(&format!("TRIG:A:LEV{} {}", chan_num, volts))
	}

	/// Sends the whole setup in a fixed order and waits for the instrument to settle
	pub fn configure(&mut self, setup:&AcquisitionSetup) -> Result<()> {
		let ch = setup.channel.number;
		chan_ok(ch)?;
		chan_ok(setup.trigger.source)?;

		self.set_acquisition_time(setup.acquisition_time_s)?;
		self.set_channel_range(ch, setup.channel.range_v)?;
		self.set_channel_offset(ch, setup.channel.offset_v)?;
		self.set_channel_coupling(ch, setup.channel.coupling)?;
		self.set_channel_enabled(ch, setup.channel.enabled)?;

		self.set_trigger_mode(setup.trigger.mode)?;
		self.set_trigger_edge(setup.trigger.slope)?;
		self.set_trigger_source(setup.trigger.source)?;
		self.set_trigger_level(setup.trigger.source, setup.trigger.level_v)?;

		self.inst.query_opc()
	}

	/// One acquisition, returning once it has completed or `timeout_ms` has run out
	pub fn single(&mut self, timeout_ms:u64) -> Result<()> {
		self.inst.write_str_with_opc("SINGle", timeout_ms)
	}

	pub fn get_x_increment(&mut self, chan_num:u8) -> Result<f64> {
		chan_ok(chan_num)?;
		self.inst.query_f64(&format!("CHAN{}:DATA:XINC?", chan_num))
	}

	pub fn get_x_origin(&mut self, chan_num:u8) -> Result<f64> {
		chan_ok(chan_num)?;
		self.inst.query_f64(&format!("CHAN{}:DATA:XOR?", chan_num))
	}

	pub fn transfer_waveform_raw(&mut self, chan_num:u8) -> Result<Vec<f64>> {
		chan_ok(chan_num)?;
		self.inst.query_bin_or_ascii_float_list(&format!("FORM ASC;:CHAN{}:DATA?", chan_num))
	}

	/// Samples of the last acquisition together with their timebase
	pub fn transfer_waveform(&mut self, chan_num:u8) -> Result<Waveform> {
		let voltages = self.transfer_waveform_raw(chan_num)?;
		let x_increment = self.get_x_increment(chan_num)?;
		let x_origin = self.get_x_origin(chan_num)?;

		info!("Transferred {} samples from CH{} (x_increment={:e} s, x_origin={:e} s)", voltages.len(), chan_num, x_increment, x_origin);
		Ok(Waveform::new(voltages, x_increment, x_origin))
	}

	pub fn get_full_state(&mut self, chan_num:u8) -> Result<State> {
		let acquisition_time_s = self.get_acquisition_time()?;
		let trigger_mode = self.get_trigger_mode()?;
		let trigger_source = self.inst.query("TRIG:A:SOUR?")?.trim().to_owned();
		let channel = self.get_channel_state(chan_num)?;

		Ok(State{ identity: self.identity.clone(), acquisition_time_s, trigger_mode, trigger_source, channel })
	}

	pub fn close(&mut self) -> Result<()> { self.inst.close() }

}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scpi::mock::MockTransport;

	fn mxo(mock:MockTransport) -> MXO<MockTransport> { MXO::new(Instrument::new(mock)) }

	#[test]
	fn default_setup_sends_the_documented_sequence() {
		let mut dev = mxo(MockTransport::new());
		dev.configure(&AcquisitionSetup::default()).unwrap();

		assert_eq!(dev.instrument().transport().written, vec![
			"TIM:ACQT 0.12",
			"CHAN1:RANG 8",
			"CHAN1:OFFS 0",
			"CHAN1:COUP ACL",
			"CHAN1:STAT ON",
			"TRIG:A:MODE AUTO",
			"TRIG:A:TYPE EDGE;:TRIG:A:EDGE:SLOP POS",
			"TRIG:A:SOUR CH1",
			"TRIG:A:LEV1 0",
			"*OPC?",
		]);
	}

	#[test]
	fn channel_numbers_are_checked() {
		let mut dev = mxo(MockTransport::new());
		assert!(dev.set_channel_range(0, 1.0).is_err());
		assert!(dev.set_channel_range(5, 1.0).is_err());

		let mut setup = AcquisitionSetup::default();
		setup.trigger.source = 7;
		assert!(dev.configure(&setup).is_err());
		assert!(dev.instrument().transport().written.is_empty());
	}

	#[test]
	fn waveform_carries_timebase() {
		let mock = MockTransport::new()
			.reply("FORM ASC;:CHAN2:DATA?", b"0.1,0.2,-0.3\n")
			.reply("CHAN2:DATA:XINC?", b"1E-6\n")
			.reply("CHAN2:DATA:XOR?", b"-6E-2\n");
		let mut dev = mxo(mock);

		let wf = dev.transfer_waveform(2).unwrap();
		assert_eq!(wf.voltages, vec![0.1, 0.2, -0.3]);
		assert_eq!(wf.x_increment, 1e-6);
		assert_eq!(wf.x_origin, -6e-2);
	}

	#[test]
	fn single_waits_on_opc() {
		let mut dev = mxo(MockTransport::new());
		dev.single(DEFAULT_SINGLE_TIMEOUT_MS).unwrap();
		assert_eq!(dev.instrument().transport().written, vec!["SINGle;*OPC?"]);
	}

	#[test]
	fn identify_rejects_other_instruments() {
		let mock = MockTransport::new()
			.reply("*IDN?", b"Siglent Technologies,SDS1202X-E,SDS1ECDD2R0000,1.3.27\n");
		assert!(mxo(mock).identify().is_err());

		let mock = MockTransport::new()
			.reply("*IDN?", b"Rohde&Schwarz,MXO4,1335.5050k04/111986,1.3.2.0\n");
		let mut dev = mxo(mock);
		assert_eq!(dev.identify().unwrap().model, "MXO4");
	}

	#[test]
	fn state_is_read_back() {
		let mock = MockTransport::new()
			.reply("TIM:ACQT?", b"1.2E-1\n")
			.reply("TRIG:A:MODE?", b"AUTO\n")
			.reply("TRIG:A:SOUR?", b"CH1\n")
			.reply("CHAN1:RANG?", b"8\n")
			.reply("CHAN1:OFFS?", b"0\n")
			.reply("CHAN1:COUP?", b"ACL\n")
			.reply("CHAN1:STAT?", b"1\n");
		let mut dev = mxo(mock);

		let state = dev.get_full_state(1).unwrap();
		assert_eq!(state.acquisition_time_s, 0.12);
		assert_eq!(state.trigger_mode, TriggerMode::Auto);
		assert_eq!(state.channel.coupling, Coupling::AcLimit);
		assert!(state.channel.enabled);
	}

	#[test]
	fn keywords_parse_case_insensitively() {
		assert_eq!("norm".parse::<TriggerMode>().unwrap(), TriggerMode::Normal);
		assert_eq!("EITH".parse::<TriggerSlope>().unwrap(), TriggerSlope::Either);
		assert_eq!("DCL".parse::<Coupling>().unwrap(), Coupling::DcLimit);
		assert!("GND".parse::<Coupling>().is_err());
	}
}
