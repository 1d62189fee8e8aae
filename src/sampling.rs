//! Statistical sampling with weighted-event accounting.
//!
//! Only a fraction of events may be transmitted; each sent event carries an
//! integer weight so downstream aggregation can recover an unbiased
//! estimate of the true event volume.

use std::sync::Arc;

use rand::Rng;

/// Per-identity sampling policy.
///
/// Resolves a sampling percentage in `0..=100` for a user/company pair.
/// The production policy is typically backed by collector-side app config;
/// the default samples everything.
pub trait SamplingPolicy: Send + Sync + 'static {
    /// Sampling percentage for the given identity. Values above 100 are
    /// clamped by the sampler.
    fn percentage(&self, user_id: Option<&str>, company_id: Option<&str>) -> u32;
}

/// Policy that samples every event (percentage 100).
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleAll;

impl SamplingPolicy for SampleAll {
    fn percentage(&self, _user_id: Option<&str>, _company_id: Option<&str>) -> u32 {
        100
    }
}

/// Policy with a single fixed percentage for all identities.
#[derive(Debug, Clone, Copy)]
pub struct FixedRate(pub u32);

impl SamplingPolicy for FixedRate {
    fn percentage(&self, _user_id: Option<&str>, _company_id: Option<&str>) -> u32 {
        self.0
    }
}

/// Outcome of one sampling draw.
///
/// `weight * (percentage / 100)` is 1 in expectation, which is what keeps
/// aggregate counts honest under partial capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingDecision {
    /// Whether the event should be sent.
    pub send: bool,
    /// Multiplier attached to the event when sent; always at least 1.
    pub weight: u32,
    /// The resolved sampling percentage, clamped to `0..=100`.
    pub percentage: u32,
    /// The uniform draw in `[0, 100)` the decision was made against.
    pub draw: u32,
}

impl SamplingDecision {
    /// Decide from an already-drawn value.
    ///
    /// Send iff `percentage > draw`: strict, so 0 never sends and 100
    /// always does (the draw never reaches 100). The weight is
    /// `floor(100 / percentage)`, or 1 in the degenerate zero case.
    pub fn from_draw(percentage: u32, draw: u32) -> Self {
        let percentage = percentage.min(100);
        let weight = if percentage == 0 { 1 } else { 100 / percentage };
        Self {
            send: percentage > draw,
            weight,
            percentage,
            draw,
        }
    }
}

/// Draws sampling decisions against a [`SamplingPolicy`].
#[derive(Clone)]
pub struct Sampler {
    policy: Arc<dyn SamplingPolicy>,
}

impl Sampler {
    /// Create a sampler over the given policy.
    pub fn new(policy: Arc<dyn SamplingPolicy>) -> Self {
        Self { policy }
    }

    /// Decide whether to send one event for the given identity.
    pub fn decide(&self, user_id: Option<&str>, company_id: Option<&str>) -> SamplingDecision {
        let percentage = self.policy.percentage(user_id, company_id);
        let draw = rand::thread_rng().gen_range(0..100);
        SamplingDecision::from_draw(percentage, draw)
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(Arc::new(SampleAll))
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_percentage_always_sends() {
        for draw in 0..100 {
            let decision = SamplingDecision::from_draw(100, draw);
            assert!(decision.send);
            assert_eq!(decision.weight, 1);
        }
    }

    #[test]
    fn test_zero_percentage_never_sends() {
        for draw in 0..100 {
            let decision = SamplingDecision::from_draw(0, draw);
            assert!(!decision.send);
            assert_eq!(decision.weight, 1);
        }
    }

    #[test]
    fn test_strict_inequality_boundary() {
        // percentage == draw does not send
        assert!(!SamplingDecision::from_draw(50, 50).send);
        assert!(SamplingDecision::from_draw(50, 49).send);
        assert!(SamplingDecision::from_draw(1, 0).send);
        assert!(!SamplingDecision::from_draw(1, 1).send);
    }

    #[test]
    fn test_weight_is_floor_of_ratio() {
        assert_eq!(SamplingDecision::from_draw(100, 0).weight, 1);
        assert_eq!(SamplingDecision::from_draw(50, 0).weight, 2);
        assert_eq!(SamplingDecision::from_draw(33, 0).weight, 3);
        assert_eq!(SamplingDecision::from_draw(7, 0).weight, 14);
        assert_eq!(SamplingDecision::from_draw(1, 0).weight, 100);
    }

    #[test]
    fn test_percentage_above_100_is_clamped() {
        let decision = SamplingDecision::from_draw(250, 99);
        assert!(decision.send);
        assert_eq!(decision.percentage, 100);
        assert_eq!(decision.weight, 1);
    }

    #[test]
    fn test_empirical_rate_converges() {
        let sampler = Sampler::new(Arc::new(FixedRate(50)));
        let trials = 20_000;
        let sent = (0..trials)
            .filter(|_| sampler.decide(None, None).send)
            .count();
        // 50% of 20k trials; bounds are wide enough to be deterministic in
        // practice (~7 standard deviations).
        assert!((9_500..=10_500).contains(&sent), "sent {sent} of {trials}");
    }

    #[test]
    fn test_default_sampler_sends_everything() {
        let sampler = Sampler::default();
        for _ in 0..100 {
            let decision = sampler.decide(Some("user"), Some("company"));
            assert!(decision.send);
            assert_eq!(decision.weight, 1);
        }
    }
}
