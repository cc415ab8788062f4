//! The cooperative foreground task.
//!
//! Each [`Foreground::service`] call does one pass: apply any complete
//! command lines, run a pending measurement, and send a latched scope frame.
//! The measurements block for their whole duration, everything else is
//! quick.
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use rtic_core::Mutex;

use crate::command::{self, Command};
use crate::drivers::{Probe, SerialPort, WaveDac, WaveOutput, WaveTimer};
use crate::measure::Meter;
use crate::report::{self, ReportLine};
use crate::scope::{Frame, SampleFrame};
use crate::synth::{WaveState, WaveformControl};
use crate::{DEFAULT_FREQUENCY_HZ, FRAME_SAMPLES};

/// One-shot measurement requests. Asking again before the first request
/// has been serviced has no further effect.
#[derive(Default)]
pub struct Requests {
    resistance: AtomicBool,
    capacitance: AtomicBool,
}

impl Requests {
    pub const fn new() -> Self {
        Self {
            resistance: AtomicBool::new(false),
            capacitance: AtomicBool::new(false),
        }
    }

    fn flag(&self, probe: Probe) -> &AtomicBool {
        match probe {
            Probe::Resistance => &self.resistance,
            Probe::Capacitance => &self.capacitance,
        }
    }

    pub fn request(&self, probe: Probe) {
        self.flag(probe).store(true, Ordering::Release);
    }

    pub fn is_pending(&self, probe: Probe) -> bool {
        self.flag(probe).load(Ordering::Acquire)
    }

    /// Clear the request, returning whether there was one
    pub fn take(&self, probe: Probe) -> bool {
        self.flag(probe).swap(false, Ordering::AcqRel)
    }
}

pub struct Foreground<'a, S, R> {
    serial: S,
    meter: R,
    line: command::LineBuffer,
    wave: WaveformControl<'a>,
    scope: &'a SampleFrame,
    requests: Requests,
    frame: Frame,
}

impl<'a, S, R> Foreground<'a, S, R>
where
    S: SerialPort,
    R: Meter,
{
    pub fn new(serial: S, meter: R, wave: WaveformControl<'a>, scope: &'a SampleFrame) -> Self {
        Self {
            serial,
            meter,
            line: command::LineBuffer::new(),
            wave,
            scope,
            requests: Requests::new(),
            frame: [0; FRAME_SAMPLES],
        }
    }

    /// Program the default frequency, park the DAC at 0 and announce
    /// ourselves on the serial port
    pub fn start<TIM, DAC, M>(&mut self, output: &mut M)
    where
        TIM: WaveTimer,
        DAC: WaveDac,
        M: Mutex<T = WaveOutput<TIM, DAC>>,
    {
        let wave = &mut self.wave;
        let setting = output.lock(|o| {
            o.dac.write(0);
            wave.set_frequency(&mut o.timer, DEFAULT_FREQUENCY_HZ)
        });
        info!("Waveform timer reload {}", setting.reload);

        self.serial.write_all(report::BANNER);
    }

    /// One pass of the foreground loop
    pub fn service<TIM, DAC, M>(&mut self, output: &mut M)
    where
        TIM: WaveTimer,
        DAC: WaveDac,
        M: Mutex<T = WaveOutput<TIM, DAC>>,
    {
        while let Some(byte) = self.serial.read_byte() {
            if let Some(line) = self.line.feed(byte) {
                for command in command::commands(&line) {
                    self.apply(command, output);
                }
            }
        }

        if self.requests.take(Probe::Resistance) {
            let r = self.meter.measure_resistance();
            info!("Resistance {} ohm", r.ohms);
            self.send(report::resistance_debug(&r));
            self.send(report::resistance(&r));
        }

        if self.requests.take(Probe::Capacitance) {
            let c = self.meter.measure_capacitance();
            match &c {
                Ok(c) => info!("Capacitance {} uF", c.microfarads),
                Err(e) => warn!("Capacitance failed: {}", e),
            }
            self.send(report::capacitance_debug(&c));
            self.send(report::capacitance(&c));
        }

        if self.scope.read_ready(&mut self.frame) {
            self.serial
                .write_all(&report::frame_header(FRAME_SAMPLES as u8));
            self.serial.write_all(&self.frame);
            self.scope.release();
        }
    }

    pub fn apply<TIM, DAC, M>(&mut self, command: Command, output: &mut M)
    where
        TIM: WaveTimer,
        DAC: WaveDac,
        M: Mutex<T = WaveOutput<TIM, DAC>>,
    {
        info!("Command {}", command);
        let wave = &mut self.wave;
        match command {
            Command::Frequency(hz) => {
                output.lock(|o| wave.set_frequency(&mut o.timer, hz));
            }
            Command::Amplitude(percent) => wave.set_amplitude(percent),
            Command::Wave(mode) => wave.set_mode(mode),
            Command::Enable(true) => wave.enable(),
            Command::Enable(false) => output.lock(|o| wave.disable(&mut o.dac)),
            Command::Measure(probe) => self.requests.request(probe),
        }
    }

    fn send(&mut self, line: Result<ReportLine, fmt::Error>) {
        match line {
            Ok(line) => self.serial.write_all(line.as_bytes()),
            Err(_) => error!("Report line did not fit"),
        }
    }

    pub fn state(&self) -> WaveState {
        self.wave.state()
    }

    pub fn requests(&self) -> &Requests {
        &self.requests
    }

    pub fn serial(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn meter(&mut self) -> &mut R {
        &mut self.meter
    }
}
