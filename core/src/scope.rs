//! Oscilloscope sampler.
//!
//! Fed from the ADC conversion interrupt. Every DECIM_FACTOR-th reading is
//! squeezed to 8 bits and appended to the frame. A full frame is latched
//! (`ready`) and the interrupt stops writing until the foreground has sent
//! it and released it.
//!
//! Writers: the interrupt owns the samples, the decimation counter and the
//! cursor, and is the only one to set `ready`. The foreground only clears it.
use crate::{ADC_TO_8BIT_SHIFT, DECIM_FACTOR, FRAME_SAMPLES};
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

/// Returned by [`SampleFrame::try_append`] while a latched frame is waiting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameFull;

/// One captured frame, copied out of the sampler
pub type Frame = [u8; FRAME_SAMPLES];

pub struct SampleFrame {
    samples: [AtomicU8; FRAME_SAMPLES],
    decimation: AtomicU8,
    cursor: AtomicU16,
    ready: AtomicBool,
}

impl SampleFrame {
    pub const fn new() -> Self {
        Self {
            samples: [const { AtomicU8::new(0) }; FRAME_SAMPLES],
            decimation: AtomicU8::new(0),
            cursor: AtomicU16::new(0),
            ready: AtomicBool::new(false),
        }
    }

    /// ADC interrupt entry point, one call per conversion
    pub fn on_sample(&self, raw: u16) {
        let count = self.decimation.load(Ordering::Relaxed) + 1;
        if count < DECIM_FACTOR {
            self.decimation.store(count, Ordering::Relaxed);
            return;
        }
        self.decimation.store(0, Ordering::Relaxed);

        // Dropping the reading while a frame is latched is expected
        let _ = self.try_append((raw >> ADC_TO_8BIT_SHIFT) as u8);
    }

    /// Append one sample. Latches the frame when this fills it.
    pub fn try_append(&self, sample: u8) -> Result<(), FrameFull> {
        if self.ready.load(Ordering::Acquire) {
            return Err(FrameFull);
        }
        let cursor = self.cursor.load(Ordering::Relaxed) as usize;
        self.samples[cursor].store(sample, Ordering::Relaxed);

        let next = cursor + 1;
        if next >= FRAME_SAMPLES {
            // Contents stay put until released, the next frame starts at 0
            self.cursor.store(0, Ordering::Relaxed);
            self.ready.store(true, Ordering::Release);
        } else {
            self.cursor.store(next as u16, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Samples appended to the frame in progress
    pub fn len(&self) -> usize {
        self.cursor.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the latched frame. The frame stays latched until
    /// [`release`](Self::release).
    pub fn read_ready(&self, out: &mut Frame) -> bool {
        if !self.is_ready() {
            return false;
        }
        for (o, s) in out.iter_mut().zip(self.samples.iter()) {
            *o = s.load(Ordering::Relaxed);
        }
        true
    }

    /// Hand the buffer back to the interrupt
    pub fn release(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

impl Default for SampleFrame {
    fn default() -> Self {
        Self::new()
    }
}
