// The whole bench procedure: connect, configure, single shot, transfer, save

use std::path::PathBuf;

use log::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::devices::mxo::MXO;
use crate::error::Result;
use crate::export::{self, PlotStyle};
use crate::scpi::{Instrument, Transport};
use crate::visa::ResourceAddress;
use crate::waveform::Waveform;

#[derive(Debug)]
pub struct CaptureReport {
	pub samples: usize,
	pub csv_path: PathBuf,
	pub plot_path: Option<PathBuf>,
}

/// Runs one acquisition on an already open scope and returns the transferred waveform
pub fn acquire<T: Transport>(dev: &mut MXO<T>, cfg: &CaptureConfig) -> Result<Waveform> {
	if cfg.id_query {
		dev.identify()?;
	}
	if cfg.reset {
		dev.instrument().reset()?;
	}

	dev.configure(&cfg.acquisition)?;

	if log::log_enabled!(log::Level::Debug) {
		match dev.get_full_state(cfg.acquisition.channel.number) {
			Ok(state) => debug!("Device state after configuration: {}", serde_json::to_string(&state).unwrap_or_default()),
			Err(e)    => warn!("Unable to read back device state: {}", e),
		}
	}

	info!("Starting single acquisition (timeout {} ms)", cfg.single_timeout_ms);
	dev.single(cfg.single_timeout_ms)?;

	dev.transfer_waveform(cfg.acquisition.channel.number)
}

/// Writes the CSV and, if configured, the plot.  A plot that can't be drawn only costs the plot;
/// `plot_path` in the report is then `None`
pub fn save(waveform: &Waveform, cfg: &CaptureConfig) -> Result<CaptureReport> {
	let samples = export::write_csv(&cfg.output.csv_path, waveform)?;

	let plot_path = match &cfg.output.plot_path {
		Some(path) => {
			let style = PlotStyle { width: cfg.output.plot_width, height: cfg.output.plot_height, ..PlotStyle::default() };
			match export::render_plot(path, waveform, &style) {
				Ok(()) => Some(path.clone()),
				Err(e) => {
					warn!("No plot written to '{}': {}", path.display(), e);
					None
				},
			}
		},
		None => None,
	};

	Ok(CaptureReport { samples, csv_path: cfg.output.csv_path.clone(), plot_path })
}

pub fn run(cfg: &CaptureConfig) -> Result<CaptureReport> {
	let address: ResourceAddress = cfg.resource.parse()?;
	let transport = address.open(&cfg.session_options())?;

	let mut inst = Instrument::new(transport);
	inst.set_status_checking(cfg.status_checking);
	let mut dev = MXO::new(inst);

	let acquired = acquire(&mut dev, cfg);

	// The session is closed before any data is written, whether or not the acquisition worked
	let closed = dev.close();
	let waveform = acquired?;
	closed?;

	save(&waveform, cfg)
}
