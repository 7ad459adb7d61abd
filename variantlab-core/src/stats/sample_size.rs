//! Required visitors per variant for a two-proportion test.

use super::{normal_quantile, ConfidenceLevel, StatsError};

/// Default statistical power (probability of detecting a true effect).
pub const DEFAULT_POWER: f64 = 0.8;

/// Visitors needed in each arm to detect a relative lift of `relative_mde`
/// over `baseline_rate` at the given confidence and power.
///
/// `n = (z_{α/2}·sqrt(2·p̄(1-p̄)) + z_β·sqrt(p1(1-p1) + p2(1-p2)))² / (p2-p1)²`
/// with `p2 = p1·(1 + mde)` and `p̄ = (p1 + p2)/2`, rounded up.
pub fn required_sample_size(
    baseline_rate: f64,
    relative_mde: f64,
    level: ConfidenceLevel,
    power: f64,
) -> Result<u64, StatsError> {
    if !(baseline_rate > 0.0 && baseline_rate < 1.0) {
        return Err(StatsError::InvalidBaselineRate(baseline_rate));
    }
    if !(power > 0.0 && power < 1.0) {
        return Err(StatsError::InvalidPower(power));
    }
    let p1 = baseline_rate;
    let p2 = p1 * (1.0 + relative_mde);
    if !(relative_mde > 0.0) || !(p2 < 1.0) {
        return Err(StatsError::InvalidEffect(relative_mde));
    }

    let z_alpha = level.z_critical();
    let z_beta = normal_quantile(power);
    let p_bar = (p1 + p2) / 2.0;

    let numerator = z_alpha * (2.0 * p_bar * (1.0 - p_bar)).sqrt()
        + z_beta * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
    let n = numerator.powi(2) / (p2 - p1).powi(2);

    Ok(n.ceil() as u64)
}
