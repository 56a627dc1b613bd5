//! Oscilloscope control: device discovery, LED flashing and block-mode
//! trace capture.
//!
//! Vendor drivers sit behind [`Oscilloscope`]; [`SimulatedScope`] stands in
//! when no hardware is attached.

use log::{debug, info};
use ndarray::Array2;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::config::ScopeConfig;
use crate::error::LabError;
use crate::types::{Channel, ChannelSetup, Trace};
use crate::utils::poll_until;

/// Largest magnitude reported by the 8-bit ADC after scaling to i16
pub const MAX_ADC_COUNTS: i16 = 32512;

/// Timebase selected by the driver for a requested interval and duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    pub actual_interval: Duration,
    pub num_samples: usize,
    pub max_samples: usize,
}

pub trait Oscilloscope {
    /// Serial numbers of all attached units
    fn enumerate_units(&mut self) -> Result<Vec<String>, LabError>;
    fn open(&mut self, serial_number: &str) -> Result<(), LabError>;
    fn flash_led(&mut self, times: u32) -> Result<(), LabError>;
    fn set_channel(&mut self, channel: Channel, setup: &ChannelSetup) -> Result<(), LabError>;
    fn set_sampling_interval(
        &mut self,
        interval: Duration,
        duration: Duration,
    ) -> Result<SamplingPlan, LabError>;
    fn set_simple_trigger(&mut self, channel: Channel, threshold_v: f64) -> Result<(), LabError>;
    /// Split capture memory into `segments`, returning samples per segment
    fn memory_segments(&mut self, segments: u32) -> Result<usize, LabError>;
    fn set_no_of_captures(&mut self, captures: u32) -> Result<(), LabError>;
    fn run_block(&mut self) -> Result<(), LabError>;
    fn is_ready(&mut self) -> Result<bool, LabError>;
    /// Copy every capture into `data`, one row per capture
    fn get_data_raw_bulk(&mut self, data: &mut Array2<i16>) -> Result<(), LabError>;
}

/// In-memory scope producing a 50 Hz sine on every enabled channel
#[derive(Debug)]
pub struct SimulatedScope {
    units: Vec<String>,
    memory_samples: usize,
    signal_amplitude_v: f64,
    signal_frequency_hz: f64,
    opened: Option<String>,
    channels: HashMap<Channel, ChannelSetup>,
    plan: Option<SamplingPlan>,
    captures: u32,
    run_started: Option<Instant>,
    led_flashes: u32,
}

impl SimulatedScope {
    pub fn new(units: Vec<String>) -> Self {
        Self {
            units,
            memory_samples: 64 * 1024 * 1024,
            signal_amplitude_v: 1.0,
            signal_frequency_hz: 50.0,
            opened: None,
            channels: HashMap::new(),
            plan: None,
            captures: 1,
            run_started: None,
            led_flashes: 0,
        }
    }

    pub fn led_flashes(&self) -> u32 {
        self.led_flashes
    }

    fn require_open(&self) -> Result<&str, LabError> {
        self.opened
            .as_deref()
            .ok_or_else(|| LabError::Instrument("No device opened".to_string()))
    }

    fn block_time(&self) -> Duration {
        self.plan
            .map(|p| {
                u32::try_from(p.num_samples)
                    .ok()
                    .and_then(|n| p.actual_interval.checked_mul(n))
                    .unwrap_or(Duration::MAX)
            })
            .unwrap_or_default()
    }
}

impl Default for SimulatedScope {
    fn default() -> Self {
        Self::new(vec!["JP507/0034".to_string()])
    }
}

impl Oscilloscope for SimulatedScope {
    fn enumerate_units(&mut self) -> Result<Vec<String>, LabError> {
        Ok(self.units.clone())
    }

    fn open(&mut self, serial_number: &str) -> Result<(), LabError> {
        if !self.units.iter().any(|u| u == serial_number) {
            return Err(LabError::Instrument(format!(
                "No device with serial number {}",
                serial_number
            )));
        }
        self.opened = Some(serial_number.to_string());
        Ok(())
    }

    fn flash_led(&mut self, times: u32) -> Result<(), LabError> {
        self.require_open()?;
        self.led_flashes += times;
        Ok(())
    }

    fn set_channel(&mut self, channel: Channel, setup: &ChannelSetup) -> Result<(), LabError> {
        self.require_open()?;
        if setup.voltage_range_v <= 0.0 {
            return Err(LabError::Instrument(format!(
                "Invalid range {} V for channel {}",
                setup.voltage_range_v, channel
            )));
        }
        self.channels.insert(channel, *setup);
        Ok(())
    }

    fn set_sampling_interval(
        &mut self,
        interval: Duration,
        duration: Duration,
    ) -> Result<SamplingPlan, LabError> {
        self.require_open()?;
        if interval.is_zero() {
            return Err(LabError::Instrument("Sample interval must be non-zero".to_string()));
        }
        let actual_interval = interval;
        let num_samples =
            usize::try_from(duration.as_nanos().div_ceil(actual_interval.as_nanos()))
                .unwrap_or(usize::MAX);
        if num_samples > self.memory_samples {
            return Err(LabError::Instrument(format!(
                "{} samples requested, device holds {}",
                num_samples, self.memory_samples
            )));
        }
        let plan = SamplingPlan {
            actual_interval,
            num_samples,
            max_samples: self.memory_samples,
        };
        self.plan = Some(plan);
        Ok(plan)
    }

    fn set_simple_trigger(&mut self, channel: Channel, threshold_v: f64) -> Result<(), LabError> {
        self.require_open()?;
        if !self.channels.contains_key(&channel) {
            return Err(LabError::Instrument(format!(
                "Trigger channel {} is not enabled",
                channel
            )));
        }
        debug!("Simulated trigger on {} at {:.3} V", channel, threshold_v);
        Ok(())
    }

    fn memory_segments(&mut self, segments: u32) -> Result<usize, LabError> {
        self.require_open()?;
        if segments == 0 {
            return Err(LabError::Instrument("At least one segment required".to_string()));
        }
        Ok(self.memory_samples / segments as usize)
    }

    fn set_no_of_captures(&mut self, captures: u32) -> Result<(), LabError> {
        self.require_open()?;
        self.captures = captures;
        Ok(())
    }

    fn run_block(&mut self) -> Result<(), LabError> {
        self.require_open()?;
        if self.plan.is_none() {
            return Err(LabError::Instrument("Sampling interval not set".to_string()));
        }
        self.run_started = Some(Instant::now());
        Ok(())
    }

    fn is_ready(&mut self) -> Result<bool, LabError> {
        match self.run_started {
            Some(started) => Ok(started.elapsed() >= self.block_time()),
            None => Err(LabError::Instrument("No block capture running".to_string())),
        }
    }

    fn get_data_raw_bulk(&mut self, data: &mut Array2<i16>) -> Result<(), LabError> {
        self.require_open()?;
        let plan = self
            .plan
            .ok_or_else(|| LabError::Instrument("Sampling interval not set".to_string()))?;
        if !self.is_ready()? {
            return Err(LabError::Instrument("Capture not complete".to_string()));
        }
        if data.nrows() > self.captures as usize || data.ncols() > plan.num_samples {
            return Err(LabError::Instrument(format!(
                "Buffer {:?} exceeds {} capture(s) x {} samples",
                data.dim(),
                self.captures,
                plan.num_samples
            )));
        }

        let range_v = self
            .channels
            .values()
            .next()
            .map(|s| s.voltage_range_v)
            .unwrap_or(1.0);
        let dt = plan.actual_interval.as_secs_f64();
        for ((_, sample), value) in data.indexed_iter_mut() {
            let v = self.signal_amplitude_v
                * (2.0 * PI * self.signal_frequency_hz * sample as f64 * dt).sin();
            let counts = (v / range_v).clamp(-1.0, 1.0) * f64::from(MAX_ADC_COUNTS);
            *value = counts.round() as i16;
        }
        Ok(())
    }
}

/// Parameters of a block-mode recording
#[derive(Debug, Clone)]
pub struct TraceSettings {
    pub channel: Channel,
    pub channel_setup: ChannelSetup,
    pub trigger_threshold_v: f64,
    pub num_captures: u32,
    pub sample_rate_hz: f64,
    pub recording_duration: Duration,
}

impl TraceSettings {
    /// Interval between samples for the configured rate
    pub fn sample_interval(&self) -> Result<Duration, LabError> {
        if !(self.sample_rate_hz > 0.0 && self.sample_rate_hz.is_finite()) {
            return Err(LabError::Config(format!(
                "Sample rate must be positive and finite, got {}",
                self.sample_rate_hz
            )));
        }
        Duration::try_from_secs_f64(1.0 / self.sample_rate_hz).map_err(|_| {
            LabError::Config(format!(
                "Sample rate {} Hz gives an interval out of range",
                self.sample_rate_hz
            ))
        })
    }

    /// How long to wait for every capture to complete
    pub fn capture_timeout(&self) -> Result<Duration, LabError> {
        self.recording_duration
            .checked_mul(self.num_captures)
            .and_then(|d| d.checked_add(Duration::from_secs(5)))
            .ok_or_else(|| {
                LabError::Config(format!(
                    "{} capture(s) of {:?} exceed the longest wait",
                    self.num_captures, self.recording_duration
                ))
            })
    }
}

impl TryFrom<&ScopeConfig> for TraceSettings {
    type Error = LabError;

    fn try_from(config: &ScopeConfig) -> Result<Self, Self::Error> {
        let recording_duration = Duration::try_from_secs_f64(config.recording_duration_s)
            .map_err(|_| {
                LabError::Config(format!(
                    "Recording duration {} s is out of range",
                    config.recording_duration_s
                ))
            })?;
        Ok(Self {
            channel: config.trigger_channel,
            channel_setup: config.channel_setup,
            trigger_threshold_v: config.trigger_threshold_v,
            num_captures: config.num_captures,
            sample_rate_hz: config.sample_rate_hz,
            recording_duration,
        })
    }
}

/// Serial numbers of every attached scope, optionally printed to stdout
pub fn discover_devices<S: Oscilloscope>(
    scope: &mut S,
    print_devices: bool,
) -> Result<Vec<String>, LabError> {
    let serial_numbers = scope.enumerate_units()?;
    info!("Found {} oscilloscope(s)", serial_numbers.len());

    if print_devices {
        println!("Found PS3000 devices:");
        for s in &serial_numbers {
            println!("- {}", s);
        }
    }

    Ok(serial_numbers)
}

/// Flash the LED of the scope with `serial_number` and wait for the
/// flashing to finish (half a second per flash)
pub fn flash_led<S: Oscilloscope>(
    scope: &mut S,
    serial_number: &str,
    num_flashes: u32,
    token: &CancellationToken,
) -> Result<(), LabError> {
    scope.open(serial_number)?;
    info!("Flashing LED of {} {} times", serial_number, num_flashes);
    scope.flash_led(num_flashes)?;
    token.sleep(Duration::from_secs_f64(f64::from(num_flashes) / 2.0));
    Ok(())
}

/// Capture `settings.num_captures` triggered blocks from one channel
pub fn record_trace<S: Oscilloscope>(
    scope: &mut S,
    serial_number: &str,
    settings: &TraceSettings,
    token: &CancellationToken,
) -> Result<Trace, LabError> {
    let requested = settings.sample_interval()?;
    let timeout = settings.capture_timeout()?;

    scope.open(serial_number)?;
    scope.set_channel(settings.channel, &settings.channel_setup)?;

    let plan = scope.set_sampling_interval(requested, settings.recording_duration)?;
    info!(
        "Sampling every {:?} ({} samples, device maximum {})",
        plan.actual_interval, plan.num_samples, plan.max_samples
    );

    scope.set_simple_trigger(settings.channel, settings.trigger_threshold_v)?;

    let samples_per_segment = scope.memory_segments(settings.num_captures)?;
    debug!("{} samples per memory segment", samples_per_segment);
    if plan.num_samples > samples_per_segment {
        return Err(LabError::Instrument(format!(
            "{} samples per capture do not fit in segments of {}",
            plan.num_samples, samples_per_segment
        )));
    }
    scope.set_no_of_captures(settings.num_captures)?;

    let mut data = Array2::<i16>::zeros((settings.num_captures as usize, plan.num_samples));

    let started = Instant::now();
    scope.run_block()?;
    poll_until(
        || scope.is_ready(),
        timeout,
        Duration::from_millis(10),
        token,
    )?;
    info!("Time to get sweep: {:.3} s", started.elapsed().as_secs_f64());

    scope.get_data_raw_bulk(&mut data)?;

    let trace = Trace {
        serial_number: serial_number.to_string(),
        channel: settings.channel,
        sample_interval_s: plan.actual_interval.as_secs_f64(),
        captures: data,
    };
    if let Some(mean) = trace.mean_counts() {
        debug!("Mean of raw counts: {:.2}", mean);
    }
    Ok(trace)
}
