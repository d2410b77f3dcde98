//! Fragment rendering through an external emulator.
//!
//! The analysis pipeline never needs audio; rendering exists to produce WAV
//! thumbnails keyed by `hashid` and the loudest-band readout used by the
//! percussion classifier. The cycle-accurate emulator itself is an external
//! collaborator behind the [`SidEmulator`] trait; the contracts the driver
//! depends on are:
//!
//! 1. the emulator accepts incremental register-level writes, and
//! 2. from a fresh `reset` the same writes produce the same samples.
//!
//! [`TestSid`] is an in-tree implementation: a deliberately simple
//! oscillator/envelope approximation that satisfies both contracts. It is
//! nowhere near bit-exact and is used only for tests and the band readout
//! fallback.

use std::path::{Path, PathBuf};

use log::debug;

use crate::chip::ChipClock;
use crate::midi::FreqBand;
use crate::ssf::Fragment;

/// Register-level interface of the external cycle-accurate emulator.
///
/// Implementations are instantiated per render job and never shared across
/// threads; the driver resets before every fragment.
pub trait SidEmulator {
    /// Return the chip to power-on state.
    fn reset(&mut self);
    /// Write one register.
    fn write(&mut self, register: u8, value: u8);
    /// Advance `cycles` φ2 cycles, appending any generated samples.
    fn clock(&mut self, cycles: u64, out: &mut Vec<i16>);
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;
}

/// Plays fragments through a [`SidEmulator`] one state-change at a time.
pub struct EmulatorDriver<E: SidEmulator> {
    emu: E,
}

impl<E: SidEmulator> EmulatorDriver<E> {
    pub fn new(emu: E) -> Self {
        Self { emu }
    }

    pub fn sample_rate(&self) -> u32 {
        self.emu.sample_rate()
    }

    /// Render one fragment to raw samples from a fresh chip reset.
    ///
    /// Each row becomes a burst of register writes; the emulator then runs
    /// until the next row's cycle. Masked (null) fields write as 0, which
    /// is what the reduction deemed them equivalent to audibly.
    pub fn render(&mut self, fragment: &Fragment) -> Vec<i16> {
        let mut samples = Vec::new();
        self.emu.reset();

        let rows = &fragment.rows;
        if rows.is_empty() {
            return samples;
        }

        // ADSR is fragment-scoped: attack/decay/sustain from the gate-on
        // row, release from the gate-off row.
        let atk = rows[0].atk1.unwrap_or(0);
        let dec = rows[0].dec1.unwrap_or(0);
        let sus = rows[0].sus1.unwrap_or(0);
        let rel = rows
            .iter()
            .find(|r| r.gate1 == Some(false))
            .and_then(|r| r.rel1)
            .unwrap_or(0);
        self.emu.write(5, (atk << 4) | dec);
        self.emu.write(6, (sus << 4) | rel);

        for (i, row) in rows.iter().enumerate() {
            let freq = row.freq1.unwrap_or(0);
            self.emu.write(0, (freq & 0xFF) as u8);
            self.emu.write(1, (freq >> 8) as u8);
            let pw = row.pwduty1.unwrap_or(0);
            self.emu.write(2, (pw & 0xFF) as u8);
            self.emu.write(3, ((pw >> 8) & 0x0F) as u8);

            let mut control = 0u8;
            for (bit, flag) in [
                row.gate1, row.sync1, row.ring1, row.test1, row.tri1, row.saw1, row.pulse1,
                row.noise1,
            ]
            .iter()
            .enumerate()
            {
                if *flag == Some(true) {
                    control |= 1 << bit;
                }
            }
            self.emu.write(4, control);

            // Modulator voice (voice 3 in the rotated view).
            let freq3 = row.freq3.unwrap_or(0);
            self.emu.write(14, (freq3 & 0xFF) as u8);
            self.emu.write(15, (freq3 >> 8) as u8);
            self.emu
                .write(18, if row.test3 == Some(true) { 0x08 } else { 0 });

            // Filter and volume.
            let coff = row.fltcoff.unwrap_or(0);
            self.emu.write(21, (coff & 0x07) as u8);
            self.emu.write(22, (coff >> 3) as u8);
            let mut route = 0u8;
            if row.flt1 == Some(true) {
                route |= 0x01;
            }
            route |= row.fltres.unwrap_or(0) << 4;
            self.emu.write(23, route);
            let mut mode_vol = row.vol.unwrap_or(15) & 0x0F;
            if row.fltlo == Some(true) {
                mode_vol |= 0x10;
            }
            if row.fltband == Some(true) {
                mode_vol |= 0x20;
            }
            if row.flthi == Some(true) {
                mode_vol |= 0x40;
            }
            self.emu.write(24, mode_vol);

            if let Some(next) = rows.get(i + 1) {
                self.emu.clock(next.clock - row.clock, &mut samples);
            }
        }

        debug!(
            "rendered fragment {:016x}: {} samples",
            fragment.hashid,
            samples.len()
        );
        samples
    }
}

/// Write a fragment rendering as a mono 16-bit WAV thumbnail named by its
/// hash id. Returns the written path.
pub fn write_wav_thumbnail(
    dir: &Path,
    hashid: u64,
    samples: &[i16],
    sample_rate: u32,
) -> Result<PathBuf, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let path = dir.join(format!("{:016x}.wav", hashid));
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(path)
}

/// Estimate the loudest frequency band of a rendering from its
/// zero-crossing rate. `None` for silent or empty buffers.
pub fn loudest_band(samples: &[i16], sample_rate: u32) -> Option<FreqBand> {
    if samples.len() < 2 || samples.iter().all(|&s| s == 0) {
        return None;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] < 0) != (w[1] < 0))
        .count();
    let seconds = samples.len() as f64 / sample_rate as f64;
    let hz = crossings as f64 / 2.0 / seconds;
    Some(if hz < 200.0 {
        FreqBand::Low
    } else if hz < 1000.0 {
        FreqBand::Mid
    } else {
        FreqBand::High
    })
}

/// Deterministic in-tree emulator approximation.
///
/// One 24-bit phase-accumulator oscillator per voice with triangle, saw,
/// pulse and noise shapes, a linear three-stage envelope on voice 1 and no
/// filter. Good enough to hear a thumbnail and to place a fragment in a
/// frequency band.
pub struct TestSid {
    clock: ChipClock,
    sample_rate: u32,
    regs: [u8; 25],
    phase: [u32; 3],
    lfsr: u32,
    env_level: f64,
    cycle_in_sample: f64,
}

impl TestSid {
    pub fn new(clock: ChipClock) -> Self {
        Self {
            clock,
            sample_rate: 44_100,
            regs: [0; 25],
            phase: [0; 3],
            lfsr: 0x7F_FFF8,
            env_level: 0.0,
            cycle_in_sample: 0.0,
        }
    }

    fn voice_freq(&self, voice: usize) -> u32 {
        let base = voice * 7;
        u32::from(self.regs[base]) | (u32::from(self.regs[base + 1]) << 8)
    }

    /// Oscillator output for voice 1 in -1.0..1.0.
    fn osc_output(&mut self) -> f64 {
        let control = self.regs[4];
        let phase = self.phase[0];
        let ramp = phase as f64 / (1u32 << 24) as f64;
        let mut acc = 0.0;
        let mut shapes = 0;
        if control & 0x10 != 0 {
            // Triangle.
            acc += 4.0 * if ramp < 0.5 { ramp } else { 1.0 - ramp } - 1.0;
            shapes += 1;
        }
        if control & 0x20 != 0 {
            acc += 2.0 * ramp - 1.0;
            shapes += 1;
        }
        if control & 0x40 != 0 {
            let pw = (u32::from(self.regs[2]) | (u32::from(self.regs[3] & 0x0F) << 8)) as f64
                / 4096.0;
            acc += if ramp < pw { 1.0 } else { -1.0 };
            shapes += 1;
        }
        if control & 0x80 != 0 {
            // Galois LFSR noise, stepped once per oscillator wrap segment.
            let bit = ((self.lfsr >> 22) ^ (self.lfsr >> 17)) & 1;
            self.lfsr = ((self.lfsr << 1) | bit) & 0x7F_FFFF;
            acc += (self.lfsr & 0xFFF) as f64 / 2048.0 - 1.0;
            shapes += 1;
        }
        if shapes == 0 { 0.0 } else { acc / shapes as f64 }
    }

    /// Step the linear envelope by `cycles`.
    fn step_envelope(&mut self, cycles: u64) {
        let gate = self.regs[4] & 0x01 != 0;
        let atk = self.regs[5] >> 4;
        let dec = self.regs[5] & 0x0F;
        let sus = (self.regs[6] >> 4) as f64 / 15.0;
        let rel = self.regs[6] & 0x0F;
        let step = cycles as f64;
        if gate {
            if self.env_level < 1.0 {
                let rise = step / self.clock.attack_cycles(atk) as f64;
                self.env_level = (self.env_level + rise).min(1.0);
            } else if self.env_level > sus {
                let fall = step / self.clock.decay_release_cycles(dec) as f64;
                self.env_level = (self.env_level - fall).max(sus);
            }
        } else if self.env_level > 0.0 {
            let fall = step / self.clock.decay_release_cycles(rel) as f64;
            self.env_level = (self.env_level - fall).max(0.0);
        }
    }
}

impl SidEmulator for TestSid {
    fn reset(&mut self) {
        self.regs = [0; 25];
        self.phase = [0; 3];
        self.lfsr = 0x7F_FFF8;
        self.env_level = 0.0;
        self.cycle_in_sample = 0.0;
    }

    fn write(&mut self, register: u8, value: u8) {
        if (register as usize) < self.regs.len() {
            self.regs[register as usize] = value;
        }
    }

    fn clock(&mut self, cycles: u64, out: &mut Vec<i16>) {
        let cycles_per_sample = self.clock.phi2_hz() as f64 / self.sample_rate as f64;
        let mut remaining = cycles;
        while remaining > 0 {
            let chunk = remaining.min(cycles_per_sample as u64 + 1);
            for voice in 0..3 {
                let increment = self.voice_freq(voice).wrapping_mul(chunk as u32);
                self.phase[voice] = (self.phase[voice].wrapping_add(increment)) & 0x00FF_FFFF;
            }
            self.step_envelope(chunk);
            self.cycle_in_sample += chunk as f64;
            while self.cycle_in_sample >= cycles_per_sample {
                self.cycle_in_sample -= cycles_per_sample;
                let test = self.regs[4] & 0x08 != 0;
                let vol = (self.regs[24] & 0x0F) as f64 / 15.0;
                let value = if test {
                    0.0
                } else {
                    self.osc_output() * self.env_level * vol
                };
                out.push((value * i16::MAX as f64 * 0.8) as i16);
            }
            remaining -= chunk;
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssf::hash;
    use crate::ssf::row::SsfRow;

    fn tone_row(clock: u64, freq: u16, gate: bool) -> SsfRow {
        SsfRow {
            clock,
            vbi_frame: 0,
            pr_frame: 0,
            freq1: Some(freq),
            pwduty1: None,
            gate1: Some(gate),
            sync1: None,
            ring1: None,
            test1: Some(false),
            tri1: Some(true),
            saw1: None,
            pulse1: None,
            noise1: None,
            atk1: Some(0),
            dec1: Some(0),
            sus1: Some(15),
            rel1: None,
            vol: Some(15),
            flt1: None,
            fltlo: None,
            fltband: None,
            flthi: None,
            fltres: None,
            fltcoff: None,
            freq3: None,
            test3: None,
        }
    }

    fn fragment(rows: Vec<SsfRow>) -> Fragment {
        let hashid_noclock = hash::hash_noclock(&rows);
        let hashid_clock = hash::hash_clock(&rows);
        Fragment {
            voice: 1,
            clock_start: 0,
            clock_duration: None,
            rate: None,
            pr_speed: 1,
            rows,
            hashid_noclock,
            hashid_clock,
            hashid: hash::combine(hashid_clock, hashid_noclock),
            padded: false,
        }
    }

    #[test]
    fn test_render_produces_samples() {
        let frag = fragment(vec![
            tone_row(0, 4096, true),
            tone_row(985_248 / 2, 4096, false),
        ]);
        let mut driver = EmulatorDriver::new(TestSid::new(ChipClock::Pal));
        let samples = driver.render(&frag);
        // Half a second at 44.1 kHz.
        assert!((samples.len() as i64 - 22_050).unsigned_abs() < 100);
        assert!(samples.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_render_is_deterministic() {
        let frag = fragment(vec![
            tone_row(0, 4096, true),
            tone_row(50_000, 4096, false),
        ]);
        let mut driver = EmulatorDriver::new(TestSid::new(ChipClock::Pal));
        let a = driver.render(&frag);
        let b = driver.render(&frag);
        assert_eq!(a, b);
    }

    #[test]
    fn test_test_bit_silences_output() {
        let mut row = tone_row(0, 4096, true);
        row.test1 = Some(true);
        let frag = fragment(vec![row, tone_row(50_000, 4096, false)]);
        let mut driver = EmulatorDriver::new(TestSid::new(ChipClock::Pal));
        let samples = driver.render(&frag);
        assert!(samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_band_readout_low_vs_high() {
        // ~55 Hz tone.
        let low = fragment(vec![
            tone_row(0, 937, true),
            tone_row(985_248 / 4, 937, false),
        ]);
        // ~2.8 kHz tone.
        let high = fragment(vec![
            tone_row(0, 48_000, true),
            tone_row(985_248 / 4, 48_000, false),
        ]);
        let mut driver = EmulatorDriver::new(TestSid::new(ChipClock::Pal));
        let low_samples = driver.render(&low);
        let high_samples = driver.render(&high);
        assert_eq!(
            loudest_band(&low_samples, driver.sample_rate()),
            Some(FreqBand::Low)
        );
        assert_eq!(
            loudest_band(&high_samples, driver.sample_rate()),
            Some(FreqBand::High)
        );
    }

    #[test]
    fn test_loudest_band_empty_or_silent() {
        assert_eq!(loudest_band(&[], 44_100), None);
        assert_eq!(loudest_band(&[0; 1000], 44_100), None);
    }

    #[test]
    fn test_wav_thumbnail_roundtrip() {
        let dir = std::env::temp_dir();
        let samples: Vec<i16> = (0..1000).map(|i| ((i % 100) * 300) as i16).collect();
        let path = write_wav_thumbnail(&dir, 0xDEAD_BEEF_0000_0001, &samples, 44_100).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().contains("deadbeef"));
        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        let read: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(read, samples);
        std::fs::remove_file(path).ok();
    }
}
