use textplots::{Chart, Plot, Shape};

use crate::error::LabError;
use crate::types::{Series, Trace};

const DEFAULT_WIDTH: usize = 140;
const DEFAULT_HEIGHT: usize = 60;

/// Determine the best scale and unit prefix for a given maximum value
fn determine_scale(max_value: f64) -> (f64, &'static str) {
    if max_value >= 1.0 || max_value == 0.0 {
        (1.0, "")
    } else if max_value >= 1e-3 {
        (1e3, "m")
    } else if max_value >= 1e-6 {
        (1e6, "μ")
    } else if max_value >= 1e-9 {
        (1e9, "n")
    } else {
        (1e12, "p")
    }
}

fn value_range(values: &[f64]) -> (f64, f64) {
    let min_value = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max_value = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    (min_value, max_value)
}

fn draw(frame: &[(f32, f32)], x_max: f32, width: usize, height: usize) {
    // textplots needs a non-empty x range
    let x_max = if x_max > 0.0 { x_max } else { 1.0 };
    Chart::new(width as u32, height as u32, 0.0, x_max)
        .lineplot(&Shape::Lines(frame))
        .nice();
}

/// Plot y values against x values with automatic SI-prefix scaling of y
pub fn plot_xy(
    xs: &[f64],
    ys: &[f64],
    title: &str,
    x_label: &str,
    y_unit: &str,
    size: Option<(usize, usize)>,
) -> Result<(), LabError> {
    if ys.is_empty() {
        return Err(LabError::Plot(format!("Cannot plot empty data for {title}")));
    }
    if xs.len() != ys.len() {
        return Err(LabError::Plot(format!(
            "Length mismatch for {title}: {} x values, {} y values",
            xs.len(),
            ys.len()
        )));
    }

    let (width, height) = size.unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
    let (min_value, max_value) = value_range(ys);
    let (scale, prefix) = determine_scale(max_value.abs().max(min_value.abs()));

    let frame: Vec<(f32, f32)> = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| (x as f32, (y * scale) as f32))
        .collect();
    let x_max = xs.iter().fold(0.0_f64, |a, &b| a.max(b)) as f32;

    println!("{}", title);
    println!("X-axis: {} | Y-axis: {}{}", x_label, prefix, y_unit);
    println!(
        "Range: {} samples | Values: {:.3} to {:.3} {}{}",
        ys.len(),
        min_value * scale,
        max_value * scale,
        prefix,
        y_unit
    );
    println!("{}", "─".repeat(width));
    draw(&frame, x_max, width, height);
    println!("{} →", x_label);

    Ok(())
}

/// Plot any slice of f64 values against their index
///
/// # Examples
/// ```
/// use lab_bench::plotting::plot_values;
///
/// let data = vec![1e-12, 2e-12, 1.5e-12, 3e-12];
/// plot_values(&data, Some("Leakage current"), None, None).unwrap();
/// ```
pub fn plot_values(
    values: &[f64],
    title: Option<&str>,
    width: Option<usize>,
    height: Option<usize>,
) -> Result<(), LabError> {
    let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    let size = (
        width.unwrap_or(DEFAULT_WIDTH),
        height.unwrap_or(DEFAULT_HEIGHT),
    );
    plot_xy(
        &xs,
        values,
        title.unwrap_or("Data Plot"),
        "Sample Index",
        "units",
        Some(size),
    )
}

/// Voltage and current of a recorded series against seconds since the start
pub fn plot_series(series: &Series) -> Result<(), LabError> {
    if series.is_empty() {
        return Err(LabError::Plot(format!(
            "{} contains no samples",
            series.file_name
        )));
    }

    let times = series.elapsed_seconds();
    println!("{}: Current and Voltage", series.file_name);
    if let (Some(first), Some(last)) = (series.values.first(), series.values.last()) {
        println!("From {} to {}", first.time, last.time);
    }

    plot_xy(
        &times,
        &series.voltages(),
        "Voltage",
        "Time / s",
        "V",
        None,
    )?;
    plot_xy(
        &times,
        &series.currents(),
        "Current",
        "Time / s",
        "A",
        None,
    )
}

/// Raw counts of one capture of a trace against sample index
pub fn plot_trace(trace: &Trace, capture: usize) -> Result<(), LabError> {
    if capture >= trace.num_captures() {
        return Err(LabError::Plot(format!(
            "Capture {} requested but trace has {}",
            capture,
            trace.num_captures()
        )));
    }
    let counts: Vec<f64> = trace
        .captures
        .row(capture)
        .iter()
        .map(|&c| f64::from(c))
        .collect();
    let title = format!(
        "{} channel {} capture {} ({:.3} ms/sample)",
        trace.serial_number,
        trace.channel,
        capture,
        trace.sample_interval_s * 1e3
    );
    plot_values(&counts, Some(&title), None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Channel, Reading, Sample};
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    #[test]
    fn test_determine_scale() {
        assert_eq!(determine_scale(5.0), (1.0, ""));
        assert_eq!(determine_scale(0.0), (1.0, ""));
        assert_eq!(determine_scale(0.005), (1e3, "m"));
        assert_eq!(determine_scale(5e-6), (1e6, "μ"));
        assert_eq!(determine_scale(5e-9), (1e9, "n"));
        assert_eq!(determine_scale(5e-12), (1e12, "p"));
    }

    #[test]
    fn test_plot_values_basic() {
        let data = vec![1.0, 2.0, 3.0, 2.0, 1.0];
        assert!(plot_values(&data, Some("Test Plot"), Some(60), Some(20)).is_ok());
    }

    #[test]
    fn test_plot_empty_data() {
        let data: Vec<f64> = vec![];
        assert!(matches!(
            plot_values(&data, None, None, None),
            Err(LabError::Plot(_))
        ));
    }

    #[test]
    fn test_plot_xy_length_mismatch() {
        assert!(plot_xy(&[0.0, 1.0], &[1.0], "bad", "x", "V", None).is_err());
    }

    #[test]
    fn test_plot_series() {
        let mut series = Series::new("psu.json");
        for i in 0..5 {
            let time = Utc.timestamp_millis_opt(1_700_000_000_000 + i * 500).unwrap();
            series.push(Sample::new(time, Reading::new(12.0, 0.002 * i as f64)));
        }
        assert!(plot_series(&series).is_ok());
        assert!(plot_series(&Series::new("empty.json")).is_err());
    }

    #[test]
    fn test_plot_trace_capture_bounds() {
        let trace = Trace {
            serial_number: "SIM0001".to_string(),
            channel: Channel::A,
            sample_interval_s: 1e-3,
            captures: Array2::from_shape_fn((2, 16), |(r, c)| (r * 100 + c) as i16),
        };
        assert!(plot_trace(&trace, 1).is_ok());
        assert!(plot_trace(&trace, 2).is_err());
    }
}
