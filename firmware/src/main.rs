#![no_main]
#![no_std]

use defmt_brtt as _; // global logger

use hardware::Mono;
use labstation_core::scope::SampleFrame;
use labstation_core::synth::Synthesizer;
use panic_probe as _;

use stm32g4xx_hal as _; // memory layout

use rtic_monotonics::Monotonic;

mod analog;
mod console;
mod delay;
mod every;
mod hardware;

// Make some common type aliases for fugit Duration, Instance and Rate
// based on our firmware's 1ms tick period
type Duration = fugit::Duration<u32, 1, 1000>;
type Instant = fugit::Instant<u32, 1, 1000>;
type Rate = fugit::Rate<u32, 1, 1000>;

// Interrupt shared state. Each field has a single writer, see the core
// crate for who writes what.
static SYNTH: Synthesizer = Synthesizer::new();
static SCOPE: SampleFrame = SampleFrame::new();

#[rtic::app(
    device = stm32g4xx_hal::stm32,
    dispatchers = [USBWAKEUP]
)]
mod app {
    use crate::analog;
    use crate::console;
    use crate::every::Every;
    use crate::hardware;
    use crate::Rate;
    use crate::{SCOPE, SYNTH};
    use labstation_core::config::Config;
    use labstation_core::drivers::WaveOutput;
    use labstation_core::foreground::Foreground;
    use labstation_core::synth::WaveformControl;

    // Foreground cadence
    const SERVICE_RATE: Rate = Rate::Hz(1000);

    #[shared]
    struct Shared {
        wave: WaveOutput<analog::StepTimer, analog::WaveChannel>,
    }

    #[local]
    struct Local {
        scope_adc: analog::ScopeAdc,
        console_rx: console::ConsoleRx,
        foreground: Foreground<'static, console::Console, hardware::Meter>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        defmt::info!("init");

        let config = Config::DEFAULT;

        let hardware::Board {
            step_timer,
            wave_dac,
            scope_adc,
            meter,
            console,
            console_rx,
        } = hardware::init(cx.core, cx.device, &config);

        let control = WaveformControl::new(&SYNTH, config.timer_clock_hz);
        let foreground = Foreground::new(console, meter, control, &SCOPE);

        foreground::spawn().unwrap();

        (
            Shared {
                wave: WaveOutput {
                    timer: step_timer,
                    dac: wave_dac,
                },
            },
            Local {
                scope_adc,
                console_rx,
                foreground,
            },
        )
    }

    // One waveform step per timer update
    #[task(binds = TIM6_DACUNDER, shared = [wave], priority = 3)]
    fn wave_tick(mut cx: wave_tick::Context) {
        cx.shared
            .wave
            .lock(|wave| SYNTH.on_tick(&mut wave.timer, &mut wave.dac));
    }

    // ADC2 runs without interrupts, so this is always ADC1
    #[task(binds = ADC1_2, local = [scope_adc], priority = 2)]
    fn scope_sample(cx: scope_sample::Context) {
        SCOPE.on_sample(cx.local.scope_adc.take_sample());
    }

    #[task(binds = USART2, local = [console_rx], priority = 2)]
    fn console_irq(cx: console_irq::Context) {
        cx.local.console_rx.on_irq();
    }

    /// Commands, measurements and frame transmit. Measurements block this
    /// task for up to a second, the interrupts above keep running.
    #[task(shared = [wave], local = [foreground], priority = 1)]
    async fn foreground(cx: foreground::Context) {
        let foreground = cx.local.foreground;
        let mut wave = cx.shared.wave;

        foreground.start(&mut wave);
        defmt::info!("ready");

        let mut every = Every::new(SERVICE_RATE);
        loop {
            every.next().await;
            foreground.service(&mut wave);
        }
    }
}

// same panicking *behavior* as `panic-probe` but doesn't print a panic message
// this prevents the panic message being printed *twice* when `defmt::panic` is invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}

defmt::timestamp!("{=u32}", { Mono::now().ticks() });

/// Terminates the application and makes `probe-rs` exit with exit-code = 0
pub fn exit() -> ! {
    loop {
        cortex_m::asm::bkpt();
    }
}
