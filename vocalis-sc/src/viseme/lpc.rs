//! Linear prediction formant estimation

use rustfft::num_complex::Complex;

const MAX_ITERATIONS: usize = 500;
const TOLERANCE: f64 = 1e-9;

pub fn pre_emphasis(frame: &[f32], coefficient: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(frame.len());
    let mut previous = 0.0f64;
    for &sample in frame {
        let x = sample as f64;
        out.push(x - coefficient * previous);
        previous = x;
    }
    out
}

pub fn hamming(frame: &mut [f64]) {
    let n = frame.len();
    if n < 2 {
        return;
    }
    for (i, sample) in frame.iter_mut().enumerate() {
        *sample *= 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos();
    }
}

pub fn autocorrelation(frame: &[f64], max_lag: usize) -> Vec<f64> {
    (0..=max_lag)
        .map(|lag| {
            frame
                .iter()
                .zip(frame.iter().skip(lag))
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

/// Prediction polynomial `[1, a1, ..., ap]` via Levinson-Durbin.
/// `None` for a silent frame or an unstable recursion.
pub fn levinson_durbin(r: &[f64], order: usize) -> Option<Vec<f64>> {
    if r.len() <= order || r[0] <= f64::EPSILON {
        return None;
    }
    let mut a = vec![0.0f64; order + 1];
    a[0] = 1.0;
    let mut error = r[0];

    for i in 1..=order {
        let acc: f64 = (1..i).map(|j| a[j] * r[i - j]).sum();
        let k = -(r[i] + acc) / error;
        if !k.is_finite() || k.abs() >= 1.0 {
            return None;
        }
        let previous = a.clone();
        for j in 1..i {
            a[j] = previous[j] + k * previous[i - j];
        }
        a[i] = k;
        error *= 1.0 - k * k;
        if error <= 0.0 {
            return None;
        }
    }
    Some(a)
}

/// Roots of the monic polynomial `z^p + c1 z^(p-1) + ... + cp`
/// (coefficients given as `[1, c1, ..., cp]`) by Durand-Kerner iteration.
/// `None` when the iteration does not converge.
pub fn polynomial_roots(coefficients: &[f64]) -> Option<Vec<Complex<f64>>> {
    roots_within(coefficients, MAX_ITERATIONS)
}

fn roots_within(coefficients: &[f64], max_iterations: usize) -> Option<Vec<Complex<f64>>> {
    let degree = coefficients.len().checked_sub(1)?;
    if degree == 0 || coefficients[0] != 1.0 {
        return None;
    }

    let eval = |z: Complex<f64>| {
        coefficients
            .iter()
            .fold(Complex::new(0.0, 0.0), |acc, &c| acc * z + c)
    };

    // Deterministic, non-symmetric starting points
    let seed = Complex::new(0.4, 0.9);
    let mut roots: Vec<Complex<f64>> = (0..degree).map(|k| seed.powu(k as u32)).collect();

    for _ in 0..max_iterations {
        let mut max_change = 0.0f64;
        for i in 0..degree {
            let denominator = (0..degree)
                .filter(|&j| j != i)
                .fold(Complex::new(1.0, 0.0), |acc, j| acc * (roots[i] - roots[j]));
            if denominator.norm() < 1e-300 {
                return None;
            }
            let delta = eval(roots[i]) / denominator;
            roots[i] -= delta;
            max_change = max_change.max(delta.norm());
        }
        if !max_change.is_finite() {
            return None;
        }
        if max_change < TOLERANCE {
            return roots.iter().all(|r| r.re.is_finite() && r.im.is_finite()).then_some(roots);
        }
    }

    None
}

/// Formant search settings
#[derive(Debug, Clone, Copy)]
pub struct LpcSettings {
    pub order: usize,
    pub pre_emphasis: f64,
    pub min_pole_magnitude: f64,
    pub min_hz: f64,
    pub max_hz: f64,
}

/// Stable pole frequencies in the speech range, ascending
pub fn formant_frequencies(frame: &[f32], sample_rate: u32, settings: &LpcSettings) -> Option<Vec<f64>> {
    if frame.len() <= settings.order * 2 || sample_rate == 0 {
        return None;
    }
    let mut emphasized = pre_emphasis(frame, settings.pre_emphasis);
    hamming(&mut emphasized);
    let r = autocorrelation(&emphasized, settings.order);
    let a = levinson_durbin(&r, settings.order)?;
    let roots = polynomial_roots(&a)?;

    let mut frequencies: Vec<f64> = roots
        .into_iter()
        .filter(|z| z.im > 0.0 && z.norm() > settings.min_pole_magnitude)
        .map(|z| z.arg() * sample_rate as f64 / (2.0 * std::f64::consts::PI))
        .filter(|f| *f >= settings.min_hz && *f <= settings.max_hz)
        .collect();
    frequencies.sort_by(|a, b| a.total_cmp(b));
    Some(frequencies)
}

/// First two formants, if linear prediction finds them
pub fn estimate_formants(frame: &[f32], sample_rate: u32, settings: &LpcSettings) -> Option<(f64, f64)> {
    let frequencies = formant_frequencies(frame, sample_rate, settings)?;
    match frequencies.as_slice() {
        [f1, f2, ..] => Some((*f1, *f2)),
        _ => None,
    }
}
