//! Experiments, variants and their outcome counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ExperimentId, VariantId};

/// Default confidence level applied when an experiment does not set one.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Experiment lifecycle states.
///
/// `Draft → Running → {Paused, Completed}`. Transitions are owned by the
/// experiment store; this crate only reads the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

/// One arm of an experiment, including the control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub name: String,
    #[serde(default)]
    pub is_control: bool,
    /// Share of traffic in percent (0-100).
    pub traffic_percentage: f64,
    #[serde(default)]
    pub visitors: u64,
    #[serde(default)]
    pub conversions: u64,
    #[serde(default)]
    pub revenue: f64,
    /// Stored `conversions / visitors` as a fraction. Refreshed after every
    /// recorded conversion.
    #[serde(default)]
    pub conversion_rate: f64,
}

impl Variant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, traffic_percentage: f64) -> Self {
        Self {
            id: VariantId::new(id),
            name: name.into(),
            is_control: false,
            traffic_percentage,
            visitors: 0,
            conversions: 0,
            revenue: 0.0,
            conversion_rate: 0.0,
        }
    }

    pub fn control(id: impl Into<String>, name: impl Into<String>, traffic_percentage: f64) -> Self {
        Self {
            is_control: true,
            ..Self::new(id, name, traffic_percentage)
        }
    }

    /// Builder-style counter override, mostly for fixtures and tests.
    pub fn with_counts(mut self, visitors: u64, conversions: u64) -> Self {
        self.visitors = visitors;
        self.conversions = conversions;
        self.conversion_rate = observed_rate(conversions, visitors);
        self
    }

    pub fn with_revenue(mut self, revenue: f64) -> Self {
        self.revenue = revenue;
        self
    }

    /// Conversion rate computed from the live counters (fraction).
    pub fn observed_conversion_rate(&self) -> f64 {
        observed_rate(self.conversions, self.visitors)
    }

    pub fn counters(&self) -> VariantCounters {
        VariantCounters {
            visitors: self.visitors,
            conversions: self.conversions,
            revenue: self.revenue,
        }
    }

    pub fn snapshot(&self) -> VariantSnapshot {
        VariantSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            is_control: self.is_control,
            traffic_percentage: self.traffic_percentage,
        }
    }
}

/// Counter values of a variant as returned by an atomic increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantCounters {
    pub visitors: u64,
    pub conversions: u64,
    pub revenue: f64,
}

impl VariantCounters {
    pub fn conversion_rate(&self) -> f64 {
        observed_rate(self.conversions, self.visitors)
    }
}

/// Counter-free copy of a variant, denormalized into cached allocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub id: VariantId,
    pub name: String,
    pub is_control: bool,
    pub traffic_percentage: f64,
}

/// An experiment together with its ordered variants.
///
/// Variant order is the order bucket ranges are laid out in and must stay
/// stable for the lifetime of the experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    #[serde(default)]
    pub name: String,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    pub variants: Vec<Variant>,
}

fn default_confidence_level() -> f64 {
    DEFAULT_CONFIDENCE_LEVEL
}

impl Experiment {
    pub fn new(id: impl Into<String>, status: ExperimentStatus, variants: Vec<Variant>) -> Self {
        Self {
            id: ExperimentId::new(id),
            name: String::new(),
            status,
            started_at: None,
            ended_at: None,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            variants,
        }
    }

    /// Whether new visitors may be bucketed at `now`.
    ///
    /// Requires `Running` and an end time that is unset or still in the future.
    pub fn accepts_new_visitors(&self, now: DateTime<Utc>) -> bool {
        if self.status != ExperimentStatus::Running {
            return false;
        }
        match self.ended_at {
            Some(ended_at) => ended_at > now,
            None => true,
        }
    }

    /// First variant flagged as control, if any.
    pub fn control(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_control)
    }

    pub fn variant(&self, id: &VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| &v.id == id)
    }

    pub fn variant_mut(&mut self, id: &VariantId) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| &v.id == id)
    }

    pub fn total_visitors(&self) -> u64 {
        self.variants.iter().map(|v| v.visitors).sum()
    }

    pub fn total_conversions(&self) -> u64 {
        self.variants.iter().map(|v| v.conversions).sum()
    }

    pub fn total_revenue(&self) -> f64 {
        self.variants.iter().map(|v| v.revenue).sum()
    }
}

/// Conversions per visitor, capped at 1. Conversions are not tied to an
/// allocation, so duplicate events can push the raw ratio past one.
fn observed_rate(conversions: u64, visitors: u64) -> f64 {
    if visitors == 0 {
        0.0
    } else {
        (conversions as f64 / visitors as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn rate_is_capped_when_conversions_outnumber_visitors() {
        let counters = VariantCounters {
            visitors: 2,
            conversions: 3,
            revenue: 0.0,
        };
        assert_eq!(counters.conversion_rate(), 1.0);

        let variant = Variant::new("b", "B", 50.0).with_counts(2, 3);
        assert_eq!(variant.observed_conversion_rate(), 1.0);
        assert_eq!(Variant::new("c", "C", 50.0).observed_conversion_rate(), 0.0);
    }

    fn running() -> Experiment {
        Experiment::new(
            "exp-1",
            ExperimentStatus::Running,
            vec![Variant::control("a", "Control", 50.0), Variant::new("b", "Variant B", 50.0)],
        )
    }

    #[test]
    fn running_without_end_accepts_visitors() {
        assert!(running().accepts_new_visitors(Utc::now()));
    }

    #[test]
    fn paused_completed_and_draft_reject_visitors() {
        for status in [
            ExperimentStatus::Draft,
            ExperimentStatus::Paused,
            ExperimentStatus::Completed,
        ] {
            let mut exp = running();
            exp.status = status;
            assert!(!exp.accepts_new_visitors(Utc::now()), "{status:?}");
        }
    }

    #[test]
    fn past_end_time_rejects_visitors() {
        let now = Utc::now();
        let mut exp = running();
        exp.ended_at = Some(now - Duration::minutes(1));
        assert!(!exp.accepts_new_visitors(now));

        exp.ended_at = Some(now + Duration::minutes(1));
        assert!(exp.accepts_new_visitors(now));
    }

    #[test]
    fn control_lookup_and_totals() {
        let mut exp = running();
        exp.variants[0] = exp.variants[0].clone().with_counts(100, 5).with_revenue(50.0);
        exp.variants[1] = exp.variants[1].clone().with_counts(120, 9).with_revenue(70.0);

        assert_eq!(exp.control().map(|v| v.id.as_str()), Some("a"));
        assert_eq!(exp.total_visitors(), 220);
        assert_eq!(exp.total_conversions(), 14);
        assert!((exp.total_revenue() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn zero_visitors_have_zero_rate() {
        let v = Variant::new("x", "X", 10.0);
        assert_eq!(v.observed_conversion_rate(), 0.0);
        assert_eq!(v.counters().conversion_rate(), 0.0);
    }

    #[test]
    fn confidence_level_defaults_when_missing() {
        let json = r#"{
            "id": "exp-9",
            "status": "RUNNING",
            "variants": [
                {"id": "a", "name": "A", "is_control": true, "traffic_percentage": 100}
            ]
        }"#;
        let exp: Experiment = serde_json::from_str(json).unwrap();
        assert_eq!(exp.confidence_level, DEFAULT_CONFIDENCE_LEVEL);
        assert_eq!(exp.variants[0].visitors, 0);
        assert!(exp.started_at.is_none());
    }
}
