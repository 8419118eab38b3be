use std::time::Duration;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`,
/// saturating and never above `max`.
pub(crate) fn retry_delay(base: Duration, attempt: u32, max: Duration) -> Duration {
    // 2^20 already exceeds any sane schedule; clamping keeps the shift sound.
    let exponent = attempt.saturating_sub(1).min(20);
    base.saturating_mul(1 << exponent).min(max)
}
