//! Moving-average smoothing

/// Default window used for the stored filtered signal
pub const DEFAULT_WINDOW: usize = 3;

/// Simple causal moving average over `window` samples.
///
/// Output length is `signal.len() - window + 1`. A signal shorter than the
/// window (or a zero window) is returned unchanged.
pub fn smooth(signal: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || signal.len() < window {
        return signal.to_vec();
    }

    let w = window as f64;
    signal
        .windows(window)
        .map(|chunk| chunk.iter().sum::<f64>() / w)
        .collect()
}
