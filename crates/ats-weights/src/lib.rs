//! Regime and bandit weighting applied to base scores at ranking time.
//!
//! Two independent multipliers:
//! - **Regime weight**: deterministic. CHOP/PANIC hard-block entries with
//!   0.0; otherwise `1 + (w − 1) · confidence`.
//! - **Bandit weight**: Thompson sampling over the per-(regime, strategy)
//!   Beta posterior, scaled into [0.5, 1.5]. Missing posterior rows sample
//!   as neutral 1.0 at the call site.

use ats_schemas::Regime;
use rand::Rng;
use statrs::distribution::Beta;

/// Apply the regime-weight formula for a base input weight `w` and the
/// current classification confidence in [0, 1].
///
/// CHOP and PANIC return 0.0 regardless of `w`: entries are blocked there.
pub fn regime_weight(regime: Regime, confidence: f64, base_weight: f64) -> f64 {
    if regime.blocks_entries() {
        return 0.0;
    }
    let conf = confidence.clamp(0.0, 1.0);
    1.0 + (base_weight - 1.0) * conf
}

/// Default base weights per regime, used when no operator override is given.
pub fn default_base_weight(regime: Regime) -> f64 {
    match regime {
        Regime::Trend => 1.2,
        Regime::BreakoutRotation => 1.1,
        Regime::Range => 1.0,
        Regime::Chop => 0.3,
        Regime::Panic => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Thompson bandit
// ---------------------------------------------------------------------------

/// Beta posterior for one (regime, strategy) arm. Both parameters stay ≥ 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BanditPosterior {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BanditPosterior {
    fn default() -> Self {
        Self { alpha: 1.0, beta: 1.0 }
    }
}

impl BanditPosterior {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha: alpha.max(1.0), beta: beta.max(1.0) }
    }

    /// Draw `u ~ Beta(α, β)` and scale to the weight range [0.5, 1.5].
    pub fn sample_weight<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match Beta::new(self.alpha, self.beta) {
            Ok(dist) => 0.5 + rng.sample(dist),
            // Degenerate parameters cannot occur through `new`, but a raw DB
            // row could carry NaN; sample neutral instead of panicking.
            Err(_) => 1.0,
        }
    }

    /// Positive realized outcome increments α, negative increments β.
    pub fn update(&mut self, reward_positive: bool) {
        if reward_positive {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn chop_and_panic_weight_is_zero_regardless_of_base() {
        assert_eq!(regime_weight(Regime::Chop, 0.9, 1.5), 0.0);
        assert_eq!(regime_weight(Regime::Panic, 0.1, 0.2), 0.0);
    }

    #[test]
    fn regime_weight_interpolates_by_confidence() {
        // full confidence applies the base weight fully
        assert!((regime_weight(Regime::Trend, 1.0, 1.2) - 1.2).abs() < 1e-12);
        // zero confidence collapses to neutral
        assert!((regime_weight(Regime::Trend, 0.0, 1.2) - 1.0).abs() < 1e-12);
        // halfway
        assert!((regime_weight(Regime::Range, 0.5, 1.4) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn confidence_is_clamped() {
        assert!((regime_weight(Regime::Trend, 7.0, 1.2) - 1.2).abs() < 1e-12);
        assert!((regime_weight(Regime::Trend, -3.0, 1.2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sampled_weight_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(7);
        let post = BanditPosterior::new(3.0, 5.0);
        for _ in 0..1000 {
            let w = post.sample_weight(&mut rng);
            assert!((0.5..=1.5).contains(&w), "weight out of band: {w}");
        }
    }

    #[test]
    fn heavier_alpha_samples_higher_on_average() {
        let mut rng = StdRng::seed_from_u64(42);
        let winner = BanditPosterior::new(50.0, 2.0);
        let loser = BanditPosterior::new(2.0, 50.0);
        let avg = |p: &BanditPosterior, rng: &mut StdRng| {
            (0..500).map(|_| p.sample_weight(rng)).sum::<f64>() / 500.0
        };
        assert!(avg(&winner, &mut rng) > avg(&loser, &mut rng));
    }

    #[test]
    fn updates_commute_to_the_same_posterior() {
        let mut a = BanditPosterior::default();
        let mut b = BanditPosterior::default();
        // k=3 positives and m=2 negatives in two different orders
        for r in [true, true, false, true, false] {
            a.update(r);
        }
        for r in [false, false, true, true, true] {
            b.update(r);
        }
        assert_eq!(a, b);
        assert_eq!(a, BanditPosterior { alpha: 4.0, beta: 3.0 });
    }

    #[test]
    fn constructor_floors_parameters_at_one() {
        let p = BanditPosterior::new(0.2, -3.0);
        assert_eq!(p, BanditPosterior { alpha: 1.0, beta: 1.0 });
    }
}
