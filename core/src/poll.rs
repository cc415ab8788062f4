//! Bounded busy-wait polling.
use embedded_hal::delay::DelayNs;
use fugit::MicrosDurationU32;

/// The condition did not come true within the timeout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout;

/// Check `done` every `interval` until it returns true or `timeout` has
/// passed. On success returns the time waited, which is a whole number of
/// intervals counted from the call.
///
/// Time is accounted from the requested delays, not measured, so the time
/// spent in `done` itself is not included.
pub fn poll_until<D, F>(
    delay: &mut D,
    interval: MicrosDurationU32,
    timeout: MicrosDurationU32,
    mut done: F,
) -> Result<MicrosDurationU32, Timeout>
where
    D: DelayNs,
    F: FnMut() -> bool,
{
    let step = interval.to_micros().max(1);
    let limit = timeout.to_micros();
    let mut elapsed = 0u32;

    while elapsed < limit {
        if done() {
            return Ok(MicrosDurationU32::micros(elapsed));
        }
        delay.delay_us(step);
        elapsed = elapsed.saturating_add(step);
    }
    Err(Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use fugit::ExtU32;

    #[test]
    fn immediate_success_is_zero() {
        let mut delay = NoopDelay::new();
        let r = poll_until(&mut delay, 10.micros(), 500_000.micros(), || true);
        assert_eq!(r, Ok(0.micros()));
    }

    #[test]
    fn elapsed_counts_whole_intervals() {
        let mut delay = NoopDelay::new();
        let mut calls = 0;
        let r = poll_until(&mut delay, 10.micros(), 500_000.micros(), || {
            calls += 1;
            calls == 4
        });
        assert_eq!(r, Ok(30.micros()));
    }

    #[test]
    fn times_out_after_limit() {
        let mut delay = NoopDelay::new();
        let mut calls = 0u32;
        let r = poll_until(&mut delay, 10.micros(), 1_000.micros(), || {
            calls += 1;
            false
        });
        assert_eq!(r, Err(Timeout));
        // checked at 0, 10, ... 990us
        assert_eq!(calls, 100);
    }

    #[test]
    fn zero_timeout_never_checks() {
        let mut delay = NoopDelay::new();
        let r = poll_until(&mut delay, 10.micros(), 0.micros(), || true);
        assert_eq!(r, Err(Timeout));
    }
}
