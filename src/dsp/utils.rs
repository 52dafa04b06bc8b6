/// Floor for every division by a filtered or averaged quantity.
pub const EPS: f32 = 1e-5;

/// Single-pole IIR update: `alpha * input + (1 - alpha) * old`.
#[inline]
pub fn iir(input: f32, old: f32, alpha: f32) -> f32 {
    alpha * input + (1.0 - alpha) * old
}

/// `|x|` floored to [`EPS`], safe as a denominator.
#[inline]
pub fn floor_eps(x: f32) -> f32 {
    x.abs().max(EPS)
}

/// Normalized feedback error used by the gain and threshold loops.
#[inline]
pub fn feedback_update(goal: f32, filtered: f32) -> f32 {
    (goal - filtered) / floor_eps(filtered)
}

pub fn mean(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    x.iter().sum::<f32>() / x.len() as f32
}

/// Population variance.
pub fn variance(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    let m = mean(x);
    x.iter().map(|&v| (v - m) * (v - m)).sum::<f32>() / x.len() as f32
}

pub fn min(x: &[f32]) -> f32 {
    x.iter().copied().fold(f32::INFINITY, f32::min)
}

/// Replace NaN/Inf with zero.
#[inline]
pub fn finite_or_zero(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}
