// Adapters for the analog signal path: the waveform step timer, both DAC
// channels, the two ADCs, the probe mux and the probe terminals. Each one
// wraps a stm32g4xx-hal driver and implements the matching labstation_core
// trait.
//
// Currently not very abstract: hard-codes the NUCLEO-G474RE pin map in
// hardware.rs.

use defmt::info;
use fugit::ExtU32;
use labstation_core::drivers::{
    AnalogMux, CurrentSource, Drive, MuxChannel, Polarity, Probe, ProbePins, SenseAdc, WaveDac,
    WaveTimer,
};
use stm32g4xx_hal::adc::{config, AdcClaim, ClockSource, DynamicAdc};
use stm32g4xx_hal::dac::{Dac1Ch1, Dac1Ch2, DacExt, DacOut, Enabled, M_EXT_PIN};
use stm32g4xx_hal::gpio::{gpioa, gpioc, Analog, Output, PushPull};
use stm32g4xx_hal::hal::blocking::delay::DelayUs;
use stm32g4xx_hal::hal::digital::v2::OutputPin;
use stm32g4xx_hal::hal::timer::{Cancel, CountDown};
use stm32g4xx_hal::rcc::Rcc;
use stm32g4xx_hal::stm32;
use stm32g4xx_hal::timer::{CountDownTimer, Event, Timer};

use crate::hardware::{MuxSelectOutput, PolarityOutput, ProbeCPin, ProbeRPin};

const VREF_MV: u32 = 3300;
const DAC_FULL_SCALE: u32 = 4095;

// Current source is a V-to-I stage behind DAC1_OUT2, 8uA per step
const ISRC_MV_PER_STEP: u32 = 8;

/// TIM6 paces the waveform, one update interrupt per table step.
///
/// The HAL picks prescaler and reload from a period, so the core's reload
/// value is handed over as a period of `reload + 1` ticks of the 1MHz
/// waveform clock.
pub struct StepTimer {
    timer: CountDownTimer<stm32::TIM6>,
    period_us: u32,
}

impl StepTimer {
    /// Starts paused, with the update interrupt enabled
    pub fn new(timer: Timer<stm32::TIM6>) -> Self {
        let mut timer = timer.start_count_down(1000.micros());
        timer.listen(Event::TimeOut);
        timer.cancel().ok();
        Self {
            timer,
            period_us: 1000,
        }
    }
}

impl WaveTimer for StepTimer {
    fn stop(&mut self) {
        // Err only means it was already stopped
        self.timer.cancel().ok();
    }

    fn reset_counter(&mut self) {
        // start() below clears the counter
    }

    fn set_reload(&mut self, reload: u16) {
        self.period_us = reload as u32 + 1;
    }

    fn start(&mut self) {
        self.timer.start(self.period_us.micros());
    }

    fn acknowledge(&mut self) {
        self.timer.clear_interrupt(Event::TimeOut);
    }
}

/// DAC1 channel 1, the waveform output
pub struct WaveChannel {
    dac: Dac1Ch1<M_EXT_PIN, Enabled>,
}

/// DAC1 channel 2, set point of the current source
pub struct SetPointChannel {
    dac: Dac1Ch2<M_EXT_PIN, Enabled>,
}

/// Both channels enabled, buffered onto their pins, at 0V
pub fn init_dac(
    dac: stm32::DAC1,
    pins: (gpioa::PA4<Analog>, gpioa::PA5<Analog>),
    rcc: &mut Rcc,
) -> (WaveChannel, SetPointChannel) {
    let (ch1, ch2) = dac.constrain(pins, rcc);
    let mut wave = ch1.enable();
    let mut set_point = ch2.enable();
    wave.set_value(0);
    set_point.set_value(0);
    (WaveChannel { dac: wave }, SetPointChannel { dac: set_point })
}

impl WaveDac for WaveChannel {
    fn write(&mut self, code: u8) {
        // 8-bit codes use the top of the 12-bit range
        self.dac.set_value((code as u16) << 4);
    }
}

impl SetPointChannel {
    fn write_millivolts(&mut self, mv: u32) {
        let counts = (mv * DAC_FULL_SCALE / VREF_MV).min(DAC_FULL_SCALE);
        self.dac.set_value(counts as u16);
    }
}

/// Constant current source: DAC set point plus a polarity switch
pub struct IdacSource {
    set_point: SetPointChannel,
    polarity: PolarityOutput,
}

impl IdacSource {
    pub fn new(set_point: SetPointChannel, polarity: PolarityOutput) -> Self {
        Self {
            set_point,
            polarity,
        }
    }
}

impl CurrentSource for IdacSource {
    fn set_polarity(&mut self, polarity: Polarity) {
        match polarity {
            Polarity::Source => self.polarity.set_low().unwrap(),
            Polarity::Sink => self.polarity.set_high().unwrap(),
        }
    }

    fn set_code(&mut self, code: u8) {
        self.set_point.write_millivolts(code as u32 * ISRC_MV_PER_STEP);
    }
}

pub struct ProbeMux {
    select: MuxSelectOutput,
}

impl ProbeMux {
    pub fn new(select: MuxSelectOutput) -> Self {
        Self { select }
    }
}

impl AnalogMux for ProbeMux {
    fn select(&mut self, channel: MuxChannel) {
        match channel {
            MuxChannel::Resistance => self.select.set_low().unwrap(),
            MuxChannel::Capacitance => self.select.set_high().unwrap(),
        }
    }
}

// A probe terminal is either left to the analog front end or clamped to
// ground. Changing over consumes the pin, so the slot is briefly empty.
enum Terminal<A, O> {
    HiZ(A),
    Grounded(O),
    Switching,
}

impl<A, O> Terminal<A, O> {
    fn set(&mut self, drive: Drive, ground: impl FnOnce(A) -> O, release: impl FnOnce(O) -> A) {
        *self = match (core::mem::replace(self, Terminal::Switching), drive) {
            (Terminal::HiZ(pin), Drive::StrongLow) => Terminal::Grounded(ground(pin)),
            (Terminal::Grounded(pin), Drive::AnalogHiZ) => Terminal::HiZ(release(pin)),
            (unchanged, _) => unchanged,
        };
    }
}

fn grounded<O: OutputPin>(mut pin: O) -> O
where
    O::Error: core::fmt::Debug,
{
    pin.set_low().unwrap();
    pin
}

type GroundedR = gpioc::PC0<Output<PushPull>>;
type GroundedC = gpioc::PC1<Output<PushPull>>;

/// The probe terminals on PC0 and PC1
pub struct ProbeTerminals {
    r: Terminal<ProbeRPin, GroundedR>,
    c: Terminal<ProbeCPin, GroundedC>,
}

impl ProbeTerminals {
    pub fn new(r: ProbeRPin, c: ProbeCPin) -> Self {
        Self {
            r: Terminal::HiZ(r),
            c: Terminal::HiZ(c),
        }
    }
}

impl ProbePins for ProbeTerminals {
    fn set_drive(&mut self, probe: Probe, drive: Drive) {
        // Nothing ever drives these high, so the output latch is already low
        // when the pin switches to output
        match probe {
            Probe::Resistance => self.r.set(
                drive,
                |pin| grounded(pin.into_push_pull_output()),
                |pin| pin.into_analog(),
            ),
            Probe::Capacitance => self.c.set(
                drive,
                |pin| grounded(pin.into_push_pull_output()),
                |pin| pin.into_analog(),
            ),
        }
    }
}

/// ADC1, free running with an end of conversion interrupt per sample
pub struct ScopeAdc {
    adc: DynamicAdc<stm32::ADC1>,
}

impl ScopeAdc {
    /// Reading the data register also clears the interrupt
    pub fn take_sample(&mut self) -> u16 {
        self.adc.current_sample()
    }
}

/// ADC2, free running on the RC sense node, polled
pub struct SenseAdc2 {
    adc: DynamicAdc<stm32::ADC2>,
}

impl SenseAdc for SenseAdc2 {
    fn read_fresh(&mut self) -> u16 {
        self.adc.clear_end_of_conversion_sequence_flag();
        self.adc.wait_for_conversion_sequence();
        self.adc.current_sample()
    }

    fn latest(&mut self) -> u16 {
        self.adc.current_sample()
    }

    fn to_millivolts(&self, counts: u16) -> i32 {
        self.adc.sample_to_millivolts(counts) as i32
    }
}

/// Bring up both ADCs and leave them converting.
///
/// The scope samples at 32MHz / (640.5 + 12.5) = 49 kSPS, 24.5 kSPS after
/// decimation.
pub fn init_adcs(
    adc1: stm32::ADC1,
    adc2: stm32::ADC2,
    scope_in: &gpioa::PA0<Analog>,
    sense_in: &gpioa::PA1<Analog>,
    rcc: &Rcc,
    delay: &mut impl DelayUs<u8>,
) -> (ScopeAdc, SenseAdc2) {
    // Synchronous clock HCLK/4 = 32MHz, continuous, newest result always wins
    let continuous = || {
        config::AdcConfig::default()
            .clock_mode(config::ClockMode::Synchronous_Div_4)
            .continuous(config::Continuous::Continuous)
            .overrun(config::OverrunMode::Overwrite)
    };

    let mut scope =
        adc1.claim_and_configure(ClockSource::SystemClock, rcc, continuous(), delay, false);
    scope.reset_sequence();
    scope.configure_channel(scope_in, config::Sequence::One, config::SampleTime::Cycles_640_5);
    scope.listen(config::Event::EOC);

    let mut sense =
        adc2.claim_and_configure(ClockSource::SystemClock, rcc, continuous(), delay, false);
    sense.reset_sequence();
    sense.configure_channel(sense_in, config::Sequence::One, config::SampleTime::Cycles_247_5);

    info!("ADCs running");
    (
        ScopeAdc {
            adc: scope.enable().start_conversion(),
        },
        SenseAdc2 {
            adc: sense.enable().start_conversion(),
        },
    )
}
