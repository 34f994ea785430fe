use serde::Serialize;

/// One acquired trace: voltage samples plus the timebase needed to place them in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waveform {
	pub voltages: Vec<f64>,
	/// Seconds between consecutive samples
	pub x_increment: f64,
	/// Time of the first sample relative to the trigger, in seconds
	pub x_origin: f64,
}

impl Waveform {

	pub fn new(voltages: Vec<f64>, x_increment: f64, x_origin: f64) -> Self {
		Waveform{ voltages, x_increment, x_origin }
	}

	pub fn len(&self) -> usize { self.voltages.len() }

	pub fn is_empty(&self) -> bool { self.voltages.is_empty() }

	pub fn time_at(&self, idx: usize) -> f64 { (idx as f64) * self.x_increment + self.x_origin }

	pub fn time_axis(&self) -> Vec<f64> {
		(0..self.len()).map(|i| self.time_at(i)).collect()
	}

	/// (time, voltage) pairs in acquisition order
	pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
		self.voltages.iter().enumerate().map(move |(i, v)| (self.time_at(i), *v))
	}

	pub fn time_span(&self) -> Option<(f64, f64)> {
		if self.is_empty() { None } else { Some((self.time_at(0), self.time_at(self.len() - 1))) }
	}

	pub fn voltage_span(&self) -> Option<(f64, f64)> {
		let mut it = self.voltages.iter().copied().filter(|v| v.is_finite());
		let first = it.next()?;
		Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
	}

}
