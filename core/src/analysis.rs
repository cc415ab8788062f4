//! Quick measurements on a captured scope frame, for display on the host.

/// Below this peak-to-peak, in codes, a frame counts as flat
const FLAT_P2P: u8 = 3;

/// Sample code to volts, given the voltage of code 255
pub fn to_volts(sample: u8, full_scale_v: f32) -> f32 {
    sample as f32 / 255.0 * full_scale_v
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStats {
    pub min: u8,
    pub max: u8,
}

impl FrameStats {
    /// `None` for an empty frame
    pub fn of(frame: &[u8]) -> Option<Self> {
        let min = *frame.iter().min()?;
        let max = *frame.iter().max()?;
        Some(Self { min, max })
    }

    pub fn peak_to_peak(&self) -> u8 {
        self.max - self.min
    }

    fn is_flat(&self) -> bool {
        self.peak_to_peak() < FLAT_P2P
    }

    /// Halfway between min and max
    fn threshold(&self) -> f32 {
        self.min as f32 + self.peak_to_peak() as f32 / 2.0
    }
}

/// Indices `i` where the signal goes from at-or-below the midpoint at `i`
/// to above it at `i + 1`
pub fn rising_crossings(frame: &[u8]) -> impl Iterator<Item = usize> + '_ {
    let threshold = FrameStats::of(frame)
        .filter(|stats| !stats.is_flat())
        .map(|stats| stats.threshold());

    frame
        .windows(2)
        .enumerate()
        .filter(move |(_, pair)| match threshold {
            Some(t) => pair[0] as f32 <= t && pair[1] as f32 > t,
            None => false,
        })
        .map(|(i, _)| i)
}

/// Where a triggered display should start, 0 when nothing triggers
pub fn trigger_index(frame: &[u8]) -> usize {
    rising_crossings(frame).next().unwrap_or(0)
}

/// Copy `frame` into `out` starting at the trigger point, padding with the
/// last sample if the frame runs out
pub fn align(frame: &[u8], out: &mut [u8]) {
    let Some(&last) = frame.last() else {
        return;
    };
    let start = trigger_index(frame);
    let tail = &frame[start..];
    let n = tail.len().min(out.len());
    out[..n].copy_from_slice(&tail[..n]);
    out[n..].fill(last);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimate {
    /// 0 when there are fewer than two rising edges to go on
    pub frequency_hz: f32,
    pub amplitude_vpp: f32,
}

/// Frequency from the mean spacing of rising edges, amplitude from the
/// peak-to-peak
pub fn estimate(frame: &[u8], sample_rate_hz: f32, full_scale_v: f32) -> Estimate {
    let p2p = FrameStats::of(frame).map_or(0, |s| s.peak_to_peak());
    let amplitude_vpp = to_volts(p2p, full_scale_v);

    let mut crossings = rising_crossings(frame);
    let first = crossings.next();
    let (last, periods) = crossings.fold((first, 0usize), |(_, n), i| (Some(i), n + 1));

    let frequency_hz = match (first, last) {
        (Some(first), Some(last)) if periods > 0 => {
            let mean_period = (last - first) as f32 / periods as f32;
            sample_rate_hz / mean_period
        }
        _ => 0.0,
    };

    Estimate {
        frequency_hz,
        amplitude_vpp,
    }
}
