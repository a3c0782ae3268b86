//! MAX30100 pulse oximeter (I²C, address 0x57).
//!
//! ```text
//!  FIFO (IR, RED @ 100 Hz) ──▶ DC removal ──▶ low-pass ──▶ BeatDetector ──▶ BPM
//!                                   │                          │ beat
//!                                   └──────▶ SpO2Calculator ◀──┘
//! ```
//!
//! The FIFO holds at most 16 samples (160 ms), so [`Max30100::update`] must
//! run every loop tick.  Heart rate is the inverse of the averaged
//! inter-beat interval; SpO2 uses the ratio-of-ratios of the red and IR AC
//! components, re-estimated every few beats.

use embedded_hal::i2c::I2c;
use log::{debug, info};

use crate::app::ports::SensorError;
use crate::app::telemetry::PulseReading;

pub const ADDRESS: u8 = 0x57;

const REG_FIFO_WR_PTR: u8 = 0x02;
const REG_FIFO_DATA: u8 = 0x05;
const REG_MODE_CONFIG: u8 = 0x06;
const REG_SPO2_CONFIG: u8 = 0x07;
const REG_LED_CONFIG: u8 = 0x09;
const REG_PART_ID: u8 = 0xFF;

const PART_ID: u8 = 0x11;
const MODE_SPO2: u8 = 0x03;
/// High-resolution ADC, 100 samples/s, 1600 µs LED pulse width.
const SPO2_CONFIG: u8 = 0x40 | (0x01 << 2) | 0x03;
/// Red LED 27.1 mA, IR LED 7.6 mA.
const LED_CONFIG: u8 = (0x08 << 4) | 0x02;

const FIFO_DEPTH: usize = 16;
const SAMPLE_PERIOD_MS: u64 = 10;

// ── Signal processing ─────────────────────────────────────────

/// First-order DC removal (high-pass) filter.
#[derive(Debug, Clone, Default)]
pub struct DcRemover {
    w: f32,
    primed: bool,
}

impl DcRemover {
    const ALPHA: f32 = 0.95;

    /// Feed one raw sample, returns the AC component.
    pub fn step(&mut self, x: f32) -> f32 {
        if !self.primed {
            // Start from steady state so the first output is ~0.
            self.w = x / (1.0 - Self::ALPHA);
            self.primed = true;
        }
        let prev = self.w;
        self.w = x + Self::ALPHA * prev;
        self.w - prev
    }

    /// Current DC estimate.
    pub fn dc(&self) -> f32 {
        self.w * (1.0 - Self::ALPHA)
    }
}

/// Adaptive-threshold beat detector with a refractory period.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    threshold: f32,
    peak: f32,
    above: bool,
    last_beat_ms: Option<u64>,
    intervals: [u64; Self::AVERAGE_OVER],
    interval_count: usize,
    next_slot: usize,
    bpm: f32,
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl BeatDetector {
    const MIN_THRESHOLD: f32 = 20.0;
    const MAX_THRESHOLD: f32 = 800.0;
    /// New threshold as a fraction of the last peak.
    const PEAK_FRACTION: f32 = 0.5;
    /// Per-sample threshold decay between beats.
    const DECAY: f32 = 0.99;
    /// Minimum spacing between beats (240 bpm).
    const REFRACTORY_MS: u64 = 250;
    /// Longest interval still counted (30 bpm).
    const MAX_INTERVAL_MS: u64 = 2_000;
    /// No beat for this long invalidates the rate.
    const TIMEOUT_MS: u64 = 2_500;
    const AVERAGE_OVER: usize = 4;

    pub fn new() -> Self {
        Self {
            threshold: Self::MIN_THRESHOLD,
            peak: 0.0,
            above: false,
            last_beat_ms: None,
            intervals: [0; Self::AVERAGE_OVER],
            interval_count: 0,
            next_slot: 0,
            bpm: 0.0,
        }
    }

    /// Feed one filtered sample.  Returns `true` on a detected beat.
    pub fn add_sample(&mut self, value: f32, now_ms: u64) -> bool {
        if self
            .last_beat_ms
            .is_some_and(|t| now_ms.saturating_sub(t) > Self::TIMEOUT_MS)
        {
            *self = Self::new();
        }

        if value > self.threshold {
            self.peak = self.peak.max(value);
            if self.above {
                return false;
            }
            self.above = true;
            return self.register_beat(now_ms);
        }

        if self.above {
            self.above = false;
            self.threshold =
                (self.peak * Self::PEAK_FRACTION).clamp(Self::MIN_THRESHOLD, Self::MAX_THRESHOLD);
            self.peak = 0.0;
        } else {
            self.threshold = (self.threshold * Self::DECAY).max(Self::MIN_THRESHOLD);
        }
        false
    }

    fn register_beat(&mut self, now_ms: u64) -> bool {
        match self.last_beat_ms {
            Some(last) if now_ms.saturating_sub(last) < Self::REFRACTORY_MS => return false,
            Some(last) if now_ms - last <= Self::MAX_INTERVAL_MS => {
                self.intervals[self.next_slot] = now_ms - last;
                self.next_slot = (self.next_slot + 1) % Self::AVERAGE_OVER;
                self.interval_count = (self.interval_count + 1).min(Self::AVERAGE_OVER);
                let sum: u64 = self.intervals[..self.interval_count].iter().sum();
                self.bpm = 60_000.0 * self.interval_count as f32 / sum as f32;
            }
            _ => {}
        }
        self.last_beat_ms = Some(now_ms);
        true
    }

    /// Averaged heart rate; 0 until two beats have been seen.
    pub fn bpm(&self) -> f32 {
        self.bpm
    }
}

/// Empirical ratio-of-ratios calibration curve.
pub fn spo2_from_ratio(r: f32) -> f32 {
    (110.0 - 25.0 * r).clamp(0.0, 100.0)
}

/// Accumulates AC energy between beats and estimates SpO2.
#[derive(Debug, Clone, Default)]
pub struct SpO2Calculator {
    ir_sq: f32,
    red_sq: f32,
    ir_dc: f32,
    red_dc: f32,
    samples: u32,
    beats: u8,
    value: f32,
}

impl SpO2Calculator {
    const BEATS_PER_ESTIMATE: u8 = 3;

    pub fn update(&mut self, ir_ac: f32, red_ac: f32, ir_dc: f32, red_dc: f32, beat: bool) {
        self.ir_sq += ir_ac * ir_ac;
        self.red_sq += red_ac * red_ac;
        self.ir_dc += ir_dc;
        self.red_dc += red_dc;
        self.samples += 1;

        if !beat {
            return;
        }
        self.beats += 1;
        if self.beats < Self::BEATS_PER_ESTIMATE {
            return;
        }

        let n = self.samples as f32;
        if self.ir_sq > 0.0 && self.ir_dc > 0.0 && self.red_dc > 0.0 {
            let ir = (self.ir_sq / n).sqrt() / (self.ir_dc / n);
            let red = (self.red_sq / n).sqrt() / (self.red_dc / n);
            self.value = spo2_from_ratio(red / ir);
        }
        *self = Self {
            value: self.value,
            ..Self::default()
        };
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

// ── Driver ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Max30100 {
    ready: bool,
    ir_dc: DcRemover,
    red_dc: DcRemover,
    smoothed: f32,
    beats: BeatDetector,
    spo2: SpO2Calculator,
}

impl Max30100 {
    /// Low-pass smoothing factor for the beat signal.
    const SMOOTHING: f32 = 0.4;

    pub fn new() -> Self {
        Self::default()
    }

    /// Verify the part id and configure SpO2 mode.
    pub fn begin<I: I2c>(&mut self, bus: &mut I) -> Result<(), SensorError> {
        let mut id = [0u8; 1];
        bus.write_read(ADDRESS, &[REG_PART_ID], &mut id)
            .map_err(|_| SensorError::NotDetected)?;
        if id[0] != PART_ID {
            return Err(SensorError::NotDetected);
        }

        for (reg, value) in [
            (REG_MODE_CONFIG, MODE_SPO2),
            (REG_SPO2_CONFIG, SPO2_CONFIG),
            (REG_LED_CONFIG, LED_CONFIG),
        ] {
            bus.write(ADDRESS, &[reg, value])
                .map_err(|_| SensorError::Bus)?;
        }
        // Reset write pointer, overflow counter and read pointer.
        bus.write(ADDRESS, &[REG_FIFO_WR_PTR, 0, 0, 0])
            .map_err(|_| SensorError::Bus)?;

        self.ready = true;
        info!("MAX30100: ready (SpO2 mode, 100 Hz, IR 7.6 mA)");
        Ok(())
    }

    /// Drain the FIFO and run every sample through the pipeline.
    /// Returns the number of samples processed.
    pub fn update<I: I2c>(&mut self, bus: &mut I, now_ms: u64) -> Result<usize, SensorError> {
        if !self.ready {
            return Err(SensorError::NotDetected);
        }

        let mut ptrs = [0u8; 3];
        bus.write_read(ADDRESS, &[REG_FIFO_WR_PTR], &mut ptrs)
            .map_err(|_| SensorError::Bus)?;
        let [wr, overflow, rd] = ptrs;
        let mut count = usize::from(wr.wrapping_sub(rd) & 0x0F);
        if count == 0 && overflow > 0 {
            count = FIFO_DEPTH;
        }
        if count == 0 {
            return Ok(0);
        }

        let mut buf = [0u8; FIFO_DEPTH * 4];
        let bytes = &mut buf[..count * 4];
        bus.write_read(ADDRESS, &[REG_FIFO_DATA], bytes)
            .map_err(|_| SensorError::Bus)?;

        for (i, s) in bytes.chunks_exact(4).enumerate() {
            let ir = u16::from_be_bytes([s[0], s[1]]);
            let red = u16::from_be_bytes([s[2], s[3]]);
            let age = (count - 1 - i) as u64 * SAMPLE_PERIOD_MS;
            self.process_sample(ir, red, now_ms.saturating_sub(age));
        }
        Ok(count)
    }

    /// Run one raw sample through the pipeline.  Returns `true` on a beat.
    pub fn process_sample(&mut self, ir: u16, red: u16, at_ms: u64) -> bool {
        let ir_ac = self.ir_dc.step(f32::from(ir));
        let red_ac = self.red_dc.step(f32::from(red));

        // Blood volume pulses show up as dips in reflected IR.
        self.smoothed += Self::SMOOTHING * (-ir_ac - self.smoothed);
        let beat = self.beats.add_sample(self.smoothed, at_ms);
        self.spo2
            .update(ir_ac, red_ac, self.ir_dc.dc(), self.red_dc.dc(), beat);

        if beat {
            debug!("MAX30100: beat detected ({:.1} bpm)", self.beats.bpm());
        }
        beat
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn reading(&self) -> PulseReading {
        PulseReading {
            heart_rate: self.beats.bpm(),
            spo2: self.spo2.value(),
        }
    }
}
