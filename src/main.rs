use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, LevelFilter};

use mxo_capture::capture;
use mxo_capture::config::CaptureConfig;

/// Configure an MXO oscilloscope, take a single acquisition and save the trace
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
	/// TOML file with the capture settings
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// VISA resource address, e.g. TCPIP0::192.168.2.2::INSTR
	#[arg(short, long)]
	resource: Option<String>,

	/// Analog channel to acquire (also used as trigger source)
	#[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
	channel: Option<u8>,

	/// Where to write the CSV
	#[arg(long)]
	csv: Option<PathBuf>,

	/// Where to write the SVG plot
	#[arg(long, conflicts_with = "no_plot")]
	plot: Option<PathBuf>,

	/// Skip rendering the plot
	#[arg(long)]
	no_plot: bool,

	/// I/O timeout in milliseconds
	#[arg(long)]
	timeout_ms: Option<u64>,

	/// Drain the instrument error queue after every command
	#[arg(long)]
	status_checking: bool,

	/// More log output (-v info, -vv debug, -vvv trace)
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,
}

impl Cli {
	fn into_config(self) -> mxo_capture::Result<CaptureConfig> {
		let mut cfg = match &self.config {
			Some(path) => CaptureConfig::load(path)?,
			None       => CaptureConfig::default(),
		};

		if let Some(resource) = self.resource { cfg.resource = resource; }
		if let Some(ch) = self.channel {
			cfg.acquisition.channel.number = ch;
			cfg.acquisition.trigger.source = ch;
		}
		if let Some(csv) = self.csv { cfg.output.csv_path = csv; }
		if self.plot.is_some() { cfg.output.plot_path = self.plot; }
		if self.no_plot { cfg.output.plot_path = None; }
		if let Some(ms) = self.timeout_ms { cfg.timeout_ms = ms; }
		if self.status_checking { cfg.status_checking = true; }

		Ok(cfg)
	}
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	let level = match cli.verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	env_logger::Builder::new()
		.filter_level(level)
		.parse_default_env()
		.init();

	let result = cli.into_config().and_then(|cfg| capture::run(&cfg));
	match result {
		Ok(report) => {
			println!("Waveform data saved to '{}'", report.csv_path.display());
			if let Some(plot) = report.plot_path {
				println!("Plot saved to '{}'", plot.display());
			}
			ExitCode::SUCCESS
		},
		Err(e) => {
			error!("{}", e);
			eprintln!("Error: {}", e);
			ExitCode::FAILURE
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cli_overrides_config_defaults() {
		let cli = Cli::parse_from([
			"mxo_capture", "-r", "TCPIP::10.0.0.5::5025::SOCKET", "--channel", "3", "--no-plot", "--csv", "ch3.csv",
		]);
		let cfg = cli.into_config().unwrap();

		assert_eq!(cfg.resource, "TCPIP::10.0.0.5::5025::SOCKET");
		assert_eq!(cfg.acquisition.channel.number, 3);
		assert_eq!(cfg.acquisition.trigger.source, 3);
		assert_eq!(cfg.output.plot_path, None);
		assert_eq!(cfg.output.csv_path, PathBuf::from("ch3.csv"));
	}

	#[test]
	fn channel_out_of_range_is_rejected() {
		assert!(Cli::try_parse_from(["mxo_capture", "--channel", "9"]).is_err());
		assert!(Cli::try_parse_from(["mxo_capture", "--plot", "a.svg", "--no-plot"]).is_err());
	}
}
