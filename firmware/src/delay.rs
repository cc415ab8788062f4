use embedded_hal::delay::DelayNs;
use stm32g4xx_hal::hal::blocking::delay::DelayUs;

/// Busy-wait delay counted in core clock cycles.
///
/// SysTick belongs to the RTIC monotonic, so the blocking measurement
/// delays spin instead. Interrupts that fire meanwhile make the delay
/// longer, never shorter.
pub struct CycleDelay {
    sysclk_hz: u32,
}

impl CycleDelay {
    pub fn new(sysclk_hz: u32) -> Self {
        Self { sysclk_hz }
    }
}

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = ns as u64 * self.sysclk_hz as u64 / 1_000_000_000;
        cortex_m::asm::delay(cycles.clamp(1, u32::MAX as u64) as u32);
    }
}

// ADC bring-up in the HAL still waits through the 0.2 delay traits
impl DelayUs<u8> for CycleDelay {
    fn delay_us(&mut self, us: u8) {
        DelayNs::delay_us(self, us as u32);
    }
}
