//! Resistance and capacitance metering with a constant-current source.
//!
//! Both procedures block the caller and own the analog front end for their
//! whole run. Resistance is a single V/I reading after a settle delay.
//! Capacitance charges the probe at constant current and times the ramp
//! between two voltage thresholds, so C = I·Δt / ΔV.
use crate::config::{CapacitanceConfig, Config, ResistanceConfig};
use crate::drivers::{AnalogMux, CurrentSource, Drive, MuxChannel, Polarity, Probe, ProbePins, SenseAdc};
use crate::poll::{poll_until, Timeout};
use embedded_hal::delay::DelayNs;
use fugit::MicrosDurationU32;

/// What the foreground needs from an RC meter
pub trait Meter {
    fn measure_resistance(&mut self) -> Resistance;
    fn measure_capacitance(&mut self) -> Result<Capacitance, CapacitanceError>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Resistance {
    /// Probe voltage
    pub millivolts: i32,
    /// V/I before calibration, never negative
    pub raw_ohms: f32,
    /// Calibrated value, truncated
    pub ohms: i32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capacitance {
    /// Time to charge from the start threshold to the end threshold
    pub ramp: MicrosDurationU32,
    pub microfarads: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CapacitanceError {
    /// Never reached the start threshold
    StartTimeout,
    /// Reached the start threshold but not the end threshold
    EndTimeout,
    /// Both thresholds crossed at the same poll
    NotIncreasing,
}

/// The analog front end: sense ADC, current source, mux, probe pins and a
/// delay provider.
pub struct RcMeter<A, I, M, P, D> {
    adc: A,
    source: I,
    mux: M,
    pins: P,
    delay: D,
    config: Config,
}

impl<A, I, M, P, D> RcMeter<A, I, M, P, D>
where
    A: SenseAdc,
    I: CurrentSource,
    M: AnalogMux,
    P: ProbePins,
    D: DelayNs,
{
    pub fn new(adc: A, source: I, mux: M, pins: P, delay: D, config: Config) -> Self {
        Self {
            adc,
            source,
            mux,
            pins,
            delay,
            config,
        }
    }

    /// Single reading of the resistance between the R probe and ground.
    ///
    /// There is no validity check: an open or shorted probe still gives a
    /// number, it just isn't a meaningful one.
    pub fn resistance(&mut self) -> Resistance {
        let ResistanceConfig {
            source_code,
            source_current_a,
            cal_gain,
            settle_ms,
        } = self.config.resistance;

        self.mux.select(MuxChannel::Resistance);
        self.pins.set_drive(Probe::Resistance, Drive::AnalogHiZ);
        self.source.set_polarity(Polarity::Source);
        self.source.set_code(source_code);

        self.delay.delay_ms(settle_ms);

        let counts = self.adc.read_fresh();
        let millivolts = self.adc.to_millivolts(counts);
        let raw_ohms = (millivolts as f32 / 1000.0 / source_current_a).max(0.0);
        let ohms = (raw_ohms * cal_gain) as i32;

        debug!("R: {}mV raw {} cal {}", millivolts, raw_ohms, ohms);

        Resistance {
            millivolts,
            raw_ohms,
            ohms,
        }
    }

    /// Time a constant-current charge of the C probe between the two
    /// thresholds.
    pub fn capacitance(&mut self) -> Result<Capacitance, CapacitanceError> {
        let cfg = self.config.capacitance;

        self.mux.select(MuxChannel::Capacitance);

        // Known starting point: source off, probe shorted to ground
        self.source.set_code(0);
        self.pins.set_drive(Probe::Capacitance, Drive::StrongLow);
        self.delay.delay_ms(cfg.discharge_ms);

        self.pins.set_drive(Probe::Capacitance, Drive::AnalogHiZ);
        self.delay.delay_us(cfg.release_us);

        self.source.set_polarity(Polarity::Source);
        self.source.set_code(cfg.source_code);

        let ramp = self.time_ramp(&cfg);

        self.source.set_code(0);

        let ramp = ramp?;
        let microfarads = microfarads(&cfg, ramp);
        debug!("C: ramp {}us {}uF", ramp.to_micros(), microfarads);

        Ok(Capacitance { ramp, microfarads })
    }

    /// Elapsed time between the start and end threshold crossings, both
    /// counted from when charging began
    fn time_ramp(&mut self, cfg: &CapacitanceConfig) -> Result<MicrosDurationU32, CapacitanceError> {
        let interval = MicrosDurationU32::micros(cfg.sample_us);
        let timeout = MicrosDurationU32::millis(cfg.timeout_ms);

        let Self { adc, delay, .. } = self;

        let t1 = poll_until(delay, interval, timeout, || {
            let counts = adc.latest();
            adc.to_millivolts(counts) >= cfg.start_mv
        })
        .map_err(|Timeout| CapacitanceError::StartTimeout)?;

        // Keeps polling from where the first wait stopped
        let t2 = t1
            + poll_until(delay, interval, timeout, || {
                let counts = adc.latest();
                adc.to_millivolts(counts) >= cfg.end_mv
            })
            .map_err(|Timeout| CapacitanceError::EndTimeout)?;

        if t2 <= t1 {
            return Err(CapacitanceError::NotIncreasing);
        }
        Ok(t2 - t1)
    }
}

/// C = I·Δt / ΔV, with the calibration gain, in µF
pub fn microfarads(cfg: &CapacitanceConfig, ramp: MicrosDurationU32) -> f32 {
    let seconds = ramp.to_micros() as f32 * 1e-6;
    let farads = cfg.source_current_a() * seconds / cfg.window_v();
    farads * cfg.cal_gain * 1e6
}

impl<A, I, M, P, D> Meter for RcMeter<A, I, M, P, D>
where
    A: SenseAdc,
    I: CurrentSource,
    M: AnalogMux,
    P: ProbePins,
    D: DelayNs,
{
    fn measure_resistance(&mut self) -> Resistance {
        self.resistance()
    }

    fn measure_capacitance(&mut self) -> Result<Capacitance, CapacitanceError> {
        self.capacitance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use std::rc::Rc;

    /// Shared state of a simulated bench. Time only moves when the meter
    /// asks for a delay.
    struct Bench {
        now_ns: u64,
        channel: Option<MuxChannel>,
        drive: Option<(Probe, Drive)>,
        polarity: Option<Polarity>,
        code: u8,
        charging_since_ns: Option<u64>,
        /// Probe millivolts as a function of µs spent charging
        ramp: fn(u64) -> i32,
        /// Probe millivolts while the resistance source is on
        resistance_mv: i32,
        read_at_ns: Option<u64>,
    }

    impl Bench {
        fn millivolts(&self) -> i32 {
            match self.channel {
                Some(MuxChannel::Resistance) if self.code > 0 => self.resistance_mv,
                Some(MuxChannel::Capacitance) => match self.charging_since_ns {
                    Some(t0) => (self.ramp)((self.now_ns - t0) / 1000),
                    None => 0,
                },
                _ => 0,
            }
        }
    }

    type Shared = Rc<RefCell<Bench>>;

    struct Adc(Shared);
    struct Source(Shared);
    struct Mux(Shared);
    struct Pins(Shared);
    struct Delay(Shared);

    impl SenseAdc for Adc {
        fn read_fresh(&mut self) -> u16 {
            let mut b = self.0.borrow_mut();
            b.read_at_ns = Some(b.now_ns);
            b.millivolts().max(0) as u16
        }
        fn latest(&mut self) -> u16 {
            self.0.borrow().millivolts().max(0) as u16
        }
        fn to_millivolts(&self, counts: u16) -> i32 {
            // Offset lets tests produce negative readings
            counts as i32 + self.0.borrow().resistance_mv.min(0)
        }
    }

    impl CurrentSource for Source {
        fn set_polarity(&mut self, polarity: Polarity) {
            self.0.borrow_mut().polarity = Some(polarity);
        }
        fn set_code(&mut self, code: u8) {
            let mut b = self.0.borrow_mut();
            b.code = code;
            b.charging_since_ns = if code > 0 { Some(b.now_ns) } else { None };
        }
    }

    impl AnalogMux for Mux {
        fn select(&mut self, channel: MuxChannel) {
            self.0.borrow_mut().channel = Some(channel);
        }
    }

    impl ProbePins for Pins {
        fn set_drive(&mut self, probe: Probe, drive: Drive) {
            self.0.borrow_mut().drive = Some((probe, drive));
        }
    }

    impl DelayNs for Delay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.borrow_mut().now_ns += ns as u64;
        }
    }

    fn bench(ramp: fn(u64) -> i32, resistance_mv: i32) -> (Shared, RcMeter<Adc, Source, Mux, Pins, Delay>) {
        let b = Rc::new(RefCell::new(Bench {
            now_ns: 0,
            channel: None,
            drive: None,
            polarity: None,
            code: 0,
            charging_since_ns: None,
            ramp,
            resistance_mv,
            read_at_ns: None,
        }));
        let meter = RcMeter::new(
            Adc(b.clone()),
            Source(b.clone()),
            Mux(b.clone()),
            Pins(b.clone()),
            Delay(b.clone()),
            Config::DEFAULT,
        );
        (b, meter)
    }

    fn flat(_: u64) -> i32 {
        0
    }

    // 1mV per 500µs: 2mV at 1ms, 10mV at 5ms
    fn linear(us: u64) -> i32 {
        (us / 500) as i32
    }

    fn stalls(us: u64) -> i32 {
        ((us / 500) as i32).min(5)
    }

    fn instant(_: u64) -> i32 {
        20
    }

    #[test]
    fn resistance_reading() {
        let (b, mut meter) = bench(flat, 100);
        let r = meter.resistance();
        assert_eq!(r.millivolts, 100);
        // 0.1V / 414µA = 241.5 raw, x68
        assert!((r.raw_ohms - 241.546).abs() < 0.01);
        assert_eq!(r.ohms, 16425);

        let b = b.borrow();
        assert_eq!(b.channel, Some(MuxChannel::Resistance));
        assert_eq!(b.drive, Some((Probe::Resistance, Drive::AnalogHiZ)));
        assert_eq!(b.polarity, Some(Polarity::Source));
        assert_eq!(b.code, 50);
        // Sampled after the settle delay, and only then
        assert_eq!(b.read_at_ns, Some(20_000_000));
        assert_eq!(b.now_ns, 20_000_000);
    }

    #[test]
    fn negative_resistance_reads_zero() {
        let (_b, mut meter) = bench(flat, -5);
        let r = meter.resistance();
        assert_eq!(r.millivolts, -5);
        assert_eq!(r.raw_ohms, 0.0);
        assert_eq!(r.ohms, 0);
    }

    #[test]
    fn capacitance_from_ramp_time() {
        let (b, mut meter) = bench(linear, 0);
        let c = meter.capacitance().unwrap();
        assert_eq!(c.ramp, MicrosDurationU32::micros(4000));

        // I·Δt·gain·1e6 / ΔV
        let cfg = Config::DEFAULT.capacitance;
        let expected = 12.0 * 8e-6 * 4000e-6 * cfg.cal_gain * 1e6 / 0.008;
        assert!((c.microfarads - expected).abs() < expected * 1e-4);
        assert!((c.microfarads - 0.672).abs() < 1e-4);

        let b = b.borrow();
        assert_eq!(b.code, 0, "source left on");
        assert_eq!(b.drive, Some((Probe::Capacitance, Drive::AnalogHiZ)));
        // discharge + release + 5ms of ramp
        assert_eq!(b.now_ns, (50_000 + 50 + 5_000) * 1000);
    }

    #[test]
    fn capacitance_start_timeout() {
        let (b, mut meter) = bench(flat, 0);
        assert_eq!(meter.capacitance(), Err(CapacitanceError::StartTimeout));
        let b = b.borrow();
        assert_eq!(b.code, 0, "source left on");
        assert_eq!(b.now_ns, (50_000 + 50 + 500_000) * 1000);
    }

    #[test]
    fn capacitance_end_timeout() {
        let (b, mut meter) = bench(stalls, 0);
        assert_eq!(meter.capacitance(), Err(CapacitanceError::EndTimeout));
        assert_eq!(b.borrow().code, 0, "source left on");
    }

    #[test]
    fn capacitance_needs_a_ramp() {
        let (_b, mut meter) = bench(instant, 0);
        assert_eq!(meter.capacitance(), Err(CapacitanceError::NotIncreasing));
    }

    #[test]
    fn microfarads_formula() {
        let cfg = CapacitanceConfig {
            cal_gain: 1.0,
            ..Config::DEFAULT.capacitance
        };
        // 96µA for 1ms over 8mV is 12µF
        let uf = microfarads(&cfg, MicrosDurationU32::micros(1000));
        assert!((uf - 12.0).abs() < 1e-3);
    }
}
