//! BUY / HOLD / SELL decision from sentiment trend and echo stability.
//!
//! - Falling trend on an UNSTABLE or CHAOTIC neighborhood: SELL, confidence
//!   `min(1, echo / chaotic_threshold)`.
//! - Rising trend on a STABLE neighborhood: BUY, confidence
//!   `min(1, |trend| × k)`.
//! - Anything else: HOLD, confidence `max(floor, 1 − strongest)` where
//!   `strongest` is the larger of the two strengths above.

use scbdb_core::{EntityState, SignalSettings};

use crate::types::{EchoResult, Signal, SignalRationale, StabilityClass, TradingSignal};

pub struct SignalGenerator<'a> {
    settings: &'a SignalSettings,
    chaotic_threshold: f64,
}

impl<'a> SignalGenerator<'a> {
    #[must_use]
    pub fn new(settings: &'a SignalSettings, chaotic_threshold: f64) -> Self {
        Self {
            settings,
            chaotic_threshold,
        }
    }

    fn buy_strength(&self, trend: f64) -> f64 {
        (trend.abs() * self.settings.trend_scale).min(1.0)
    }

    fn sell_strength(&self, echo_magnitude: f64) -> f64 {
        (echo_magnitude / self.chaotic_threshold).min(1.0)
    }

    /// Apply the decision rule to raw inputs.
    #[must_use]
    pub fn decide(
        &self,
        sentiment_trend: f64,
        echo_magnitude: f64,
        stability_class: StabilityClass,
    ) -> (Signal, f64) {
        let unsettled = matches!(
            stability_class,
            StabilityClass::Unstable | StabilityClass::Chaotic
        );

        if sentiment_trend < 0.0 && unsettled {
            return (Signal::Sell, self.sell_strength(echo_magnitude));
        }
        if sentiment_trend > 0.0 && stability_class == StabilityClass::Stable {
            return (Signal::Buy, self.buy_strength(sentiment_trend));
        }

        let strongest = self
            .buy_strength(sentiment_trend)
            .max(self.sell_strength(echo_magnitude));
        (
            Signal::Hold,
            (1.0 - strongest).max(self.settings.min_confidence),
        )
    }

    /// Build the signal for `entity` from its echo result.
    #[must_use]
    pub fn generate(&self, entity: &EntityState, echo: &EchoResult) -> TradingSignal {
        let (signal, confidence) = self.decide(
            entity.sentiment_trend,
            echo.echo_magnitude,
            echo.stability_class,
        );
        TradingSignal {
            entity_id: entity.entity_id.clone(),
            signal,
            confidence,
            rationale: SignalRationale {
                sentiment_trend: entity.sentiment_trend,
                echo_magnitude: echo.echo_magnitude,
                stability_class: echo.stability_class,
            },
            snapshot_version: echo.snapshot_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAOTIC: f64 = 3.5;

    fn generator(settings: &SignalSettings) -> SignalGenerator<'_> {
        SignalGenerator::new(settings, CHAOTIC)
    }

    #[test]
    fn falling_trend_unstable_sells() {
        let settings = SignalSettings::default();
        let (signal, confidence) = generator(&settings).decide(-0.2, 1.75, StabilityClass::Unstable);
        assert_eq!(signal, Signal::Sell);
        assert!((confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn falling_trend_chaotic_sells_with_capped_confidence() {
        let settings = SignalSettings::default();
        let (signal, confidence) = generator(&settings).decide(-0.01, 9.0, StabilityClass::Chaotic);
        assert_eq!(signal, Signal::Sell);
        assert!((confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rising_trend_stable_buys() {
        let settings = SignalSettings::default();
        let (signal, confidence) = generator(&settings).decide(0.1, 0.01, StabilityClass::Stable);
        assert_eq!(signal, Signal::Buy);
        assert!((confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn buy_confidence_caps_at_one() {
        let settings = SignalSettings::default();
        let (_, confidence) = generator(&settings).decide(0.9, 0.0, StabilityClass::Stable);
        assert!((confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn buy_confidence_is_monotone_in_trend() {
        let settings = SignalSettings::default();
        let generator = generator(&settings);
        let mut prev = 0.0;
        for step in 1..=100 {
            let trend = f64::from(step) * 0.005;
            let (signal, confidence) = generator.decide(trend, 0.02, StabilityClass::Stable);
            assert_eq!(signal, Signal::Buy);
            assert!(confidence >= prev, "confidence fell at trend {trend}");
            prev = confidence;
        }
    }

    #[test]
    fn falling_trend_stable_holds() {
        let settings = SignalSettings::default();
        let (signal, confidence) = generator(&settings).decide(-0.1, 0.02, StabilityClass::Stable);
        assert_eq!(signal, Signal::Hold);
        // strongest = max(0.5, 0.02 / 3.5) = 0.5
        assert!((confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rising_trend_unstable_holds() {
        let settings = SignalSettings::default();
        let (signal, confidence) = generator(&settings).decide(0.02, 2.8, StabilityClass::Unstable);
        assert_eq!(signal, Signal::Hold);
        // strongest = max(0.1, 0.8) = 0.8
        assert!((confidence - 0.2).abs() < 1e-12);
    }

    #[test]
    fn hold_confidence_never_below_floor() {
        let settings = SignalSettings::default();
        let (signal, confidence) = generator(&settings).decide(0.5, 5.0, StabilityClass::Chaotic);
        assert_eq!(signal, Signal::Hold);
        assert!((confidence - settings.min_confidence).abs() < f64::EPSILON);
    }

    #[test]
    fn flat_trend_holds() {
        let settings = SignalSettings::default();
        let (signal, confidence) = generator(&settings).decide(0.0, 0.0, StabilityClass::Stable);
        assert_eq!(signal, Signal::Hold);
        assert!((confidence - 1.0).abs() < f64::EPSILON);
    }
}
