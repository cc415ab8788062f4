// "Board level" hardware abstractions, ie pin assignments, clocks, etc.
//
// Pin map (NUCLEO-G474RE):
//   PA0  scope input, ADC1_IN1
//   PA1  RC sense node (mux output), ADC2_IN2
//   PA2  USART2 TX (ST-LINK VCP)
//   PA3  USART2 RX (ST-LINK VCP)
//   PA4  waveform output, DAC1_OUT1
//   PA5  current source set point, DAC1_OUT2
//   PB4  analog mux select, low = R probe, high = C probe
//   PB5  current source polarity, low = source, high = sink
//   PC0  R probe terminal
//   PC1  C probe terminal

use defmt::info;
use fugit::RateExtU32;
use hal::gpio::gpiob;
use hal::gpio::gpioc;
use hal::gpio::Analog;
use hal::gpio::Output;
use hal::gpio::PushPull;
use labstation_core::config::Config;
use labstation_core::measure::RcMeter;
use stm32g4xx_hal as hal;
use stm32g4xx_hal::gpio::GpioExt;
use stm32g4xx_hal::gpio::Speed;
use stm32g4xx_hal::pwr::PwrExt;
use stm32g4xx_hal::rcc;
use stm32g4xx_hal::rcc::{PllConfig, RccExt};
use stm32g4xx_hal::stm32;
use stm32g4xx_hal::timer::Timer;

use crate::analog::{IdacSource, ProbeMux, ProbeTerminals, ScopeAdc, SenseAdc2, StepTimer, WaveChannel};
use crate::console::{Console, ConsoleRx};
use crate::delay::CycleDelay;

pub const SYSCLK_HZ: u32 = 128_000_000;

pub const CONSOLE_BAUD: u32 = 115_200;

// Type aliases for I/O pins
pub type MuxSelectOutput = gpiob::PB4<Output<PushPull>>;

pub type PolarityOutput = gpiob::PB5<Output<PushPull>>;

pub type ProbeRPin = gpioc::PC0<Analog>;

pub type ProbeCPin = gpioc::PC1<Analog>;

pub type Meter = RcMeter<SenseAdc2, IdacSource, ProbeMux, ProbeTerminals, CycleDelay>;

// Struct to encompass all the board resources, as their functions
pub struct Board {
    pub step_timer: StepTimer,
    pub wave_dac: WaveChannel,
    pub scope_adc: ScopeAdc,
    pub meter: Meter,
    pub console: Console,
    pub console_rx: ConsoleRx,
}

// Systick Based Timer
pub const MONOTONIC_FREQUENCY: u32 = 1_000;
rtic_monotonics::systick_monotonic!(Mono, MONOTONIC_FREQUENCY);

// Hardware init function
pub fn init(core: cortex_m::Peripherals, dp: stm32::Peripherals, config: &Config) -> Board {
    info!("hardware init");

    let rcc = dp.RCC.constrain();

    // Sysclock is based on PLL_R
    let pll_config = PllConfig {
        mux: rcc::PllSrc::HSE(24_u32.MHz()), // Nucleo board X3 OSC
        n: rcc::PllNMul::MUL_32,
        m: rcc::PllMDiv::DIV_3,       // f(vco) = 24MHz*32/3 = 256MHz
        r: Some(rcc::PllRDiv::DIV_2), // f(sysclock) = 256MHz/2 = 128MHz
        q: None,
        p: None,
    };

    let clock_config = rcc::Config::default()
        .pll_cfg(pll_config)
        .clock_src(rcc::SysClockSrc::PLL)
        .ahb_psc(rcc::Prescaler::NotDivided)
        .apb1_psc(rcc::Prescaler::Div2)
        .apb2_psc(rcc::Prescaler::Div2);

    let pwr = dp.PWR.constrain().freeze();
    let mut rcc = rcc.freeze(clock_config, pwr);

    // After clock configuration, the following should be true:
    // Sysclock is 128MHz
    // AHB clock is 128MHz
    // APB1 clock is 64MHz (TIM6 at 128MHz)
    // APB2 clock is 64MHz
    assert!(rcc.clocks.sys_clk.to_Hz() == SYSCLK_HZ);
    assert!(rcc.clocks.apb1_clk.to_MHz() == 64);

    Mono::start(core.SYST, rcc.clocks.sys_clk.to_Hz());

    unsafe {
        let flash = &(*stm32::FLASH::ptr());
        flash.acr.modify(|_, w| {
            w.latency().bits(0b1000) // 8 wait states
        });
    }

    let gpioa = dp.GPIOA.split(&mut rcc);
    let gpiob = dp.GPIOB.split(&mut rcc);
    let gpioc = dp.GPIOC.split(&mut rcc);

    // Analog pins. The probe terminals are switched between analog and
    // driven low at run time, see ProbeTerminals.
    let scope_in = gpioa.pa0.into_analog();
    let sense_in = gpioa.pa1.into_analog();
    let wave_out = gpioa.pa4.into_analog();
    let isrc_out = gpioa.pa5.into_analog();
    let probe_r = gpioc.pc0.into_analog();
    let probe_c = gpioc.pc1.into_analog();

    // USART2 on the ST-LINK virtual COM port
    let uart_tx = gpioa.pa2.into_alternate().set_speed(Speed::High);
    let uart_rx = gpioa.pa3.into_alternate();

    let mux_select = gpiob.pb4.into_push_pull_output();
    let polarity = gpiob.pb5.into_push_pull_output();

    let (wave_dac, set_point) = crate::analog::init_dac(dp.DAC1, (wave_out, isrc_out), &mut rcc);

    // Reload values from the core count in ticks of this clock
    assert!(config.timer_clock_hz == 1_000_000);
    let step_timer = StepTimer::new(Timer::new(dp.TIM6, &rcc.clocks));

    let mut delay = CycleDelay::new(SYSCLK_HZ);
    let (scope_adc, sense_adc) =
        crate::analog::init_adcs(dp.ADC1, dp.ADC2, &scope_in, &sense_in, &rcc, &mut delay);

    let meter = RcMeter::new(
        sense_adc,
        IdacSource::new(set_point, polarity),
        ProbeMux::new(mux_select),
        ProbeTerminals::new(probe_r, probe_c),
        delay,
        *config,
    );

    let (console, console_rx) =
        crate::console::init(dp.USART2, uart_tx, uart_rx, CONSOLE_BAUD, &mut rcc);

    Board {
        step_timer,
        wave_dac,
        scope_adc,
        meter,
        console,
        console_rx,
    }
}
