// Persisting an acquired waveform: a two-column CSV and a rendered line plot

use std::path::Path;

use log::info;
use plotters::prelude::*;

use crate::error::{Error, Result};
use crate::waveform::Waveform;

pub const CSV_HEADER: [&str; 2] = ["Time (s)", "Voltage (V)"];

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub line_color: RGBColor,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 800,
            title: "Oscilloscope Waveform".to_owned(),
            line_color: BLUE,
        }
    }
}

/// Writes one `time,voltage` row per sample under a fixed header.  Returns the number of data rows
pub fn write_csv<P: AsRef<Path>>(path: P, waveform: &Waveform) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for (t, v) in waveform.samples() {
        writer.serialize((t, v))?;
        rows += 1;
    }
    writer.flush()?;

    info!("Wrote {} rows to '{}'", rows, path.as_ref().display());
    Ok(rows)
}

// A flat trace would give plotters an empty range to map onto
fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if (hi - lo).abs() > f64::EPSILON * hi.abs().max(lo.abs()).max(1.0) {
        (lo, hi)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

/// Renders the waveform as an SVG line chart, time on x and voltage on y
pub fn render_plot<P: AsRef<Path>>(path: P, waveform: &Waveform, style: &PlotStyle) -> Result<()> {
    let (t0, t1) = waveform.time_span().ok_or_else(|| Error::Plot("waveform has no samples".into()))?;
    let (v0, v1) = waveform.voltage_span().ok_or_else(|| Error::Plot("waveform has no finite samples".into()))?;
    let (t0, t1) = padded(t0.min(t1), t0.max(t1));
    let (v0, v1) = padded(v0, v1);
    let margin = (v1 - v0) * 0.05;

    {
        let root = SVGBackend::new(path.as_ref(), (style.width, style.height)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .caption(&style.title, ("sans-serif", 28))
            .set_label_area_size(LabelAreaPosition::Left, 80)
            .set_label_area_size(LabelAreaPosition::Bottom, 60)
            .build_cartesian_2d(t0..t1, (v0 - margin)..(v1 + margin))?;

        chart
            .configure_mesh()
            .x_desc("Time")
            .y_desc("Voltage (V)")
            .x_label_formatter(&|t| format!("{:.3e}", t))
            .light_line_style(&BLACK.mix(0.1))
            .draw()?;

        let color = style.line_color;
        chart
            .draw_series(LineSeries::new(waveform.samples().filter(|(_, v)| v.is_finite()), &color))?
            .label("waveform")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

        chart
            .configure_series_labels()
            .border_style(&BLACK.mix(0.3))
            .background_style(&WHITE.mix(0.8))
            .draw()?;

        root.present()?;
    }

    info!("Rendered plot to '{}'", path.as_ref().display());
    Ok(())
}
