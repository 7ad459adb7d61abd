//! Results compiler: per-variant statistics, winner and recommendations.
//!
//! Read-only over current counters; safe to call in any experiment state.
//! Each non-control variant is tested against the control with the pooled
//! two-proportion z-test. The winner is the variant with the largest
//! significant positive lift. Recommendations are derived from the result
//! pattern:
//! - no traffic at all → check the experiment is live
//! - any variant below the sample floor → continue running
//! - a winner → consider rolling it out
//! - a significantly worse variant → consider stopping it
//! - everyone past the conclusive sample, no winner → consider ending

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use variantlab_core::domain::{Experiment, ExperimentId, ExperimentStatus, Variant, VariantId};
use variantlab_core::stats::{
    confidence_interval, required_sample_size, ConfidenceInterval, ConfidenceLevel,
    SampleCounts, SignificanceResult,
};

use crate::config::StatisticsConfig;
use crate::error::GatewayError;
use crate::gateway::ExperimentRepository;

// ─── Result types ────────────────────────────────────────────────────

/// Statistics for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    /// 1-based position when ordered by conversion rate, best first.
    pub rank: usize,
    pub variant_id: VariantId,
    pub name: String,
    pub is_control: bool,
    pub traffic_percentage: f64,
    pub visitors: u64,
    pub conversions: u64,
    pub revenue: f64,
    pub conversion_rate_pct: f64,
    pub revenue_per_visitor: f64,
    pub confidence_interval: ConfidenceInterval,
    /// Test against the control; `None` for the control itself or when the
    /// experiment has no control.
    pub significance: Option<SignificanceResult>,
}

/// The variant recommended for rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub variant_id: VariantId,
    pub name: String,
    pub lift: f64,
    pub p_value: f64,
}

/// Guidance derived from the result pattern. `Display` renders the
/// human-readable sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    NoTraffic,
    MissingControl,
    ContinueRunning { visitors_needed: u64 },
    RollOutWinner { variant_name: String, lift: f64 },
    StopVariant { variant_name: String, lift: f64 },
    EndNoClearWinner,
    KeepCollecting { visitors_needed: u64 },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTraffic => write!(
                f,
                "No visitors yet: confirm the experiment is running and receiving traffic"
            ),
            Self::MissingControl => write!(
                f,
                "No control variant is marked: designate one to enable significance testing"
            ),
            Self::ContinueRunning { visitors_needed } => write!(
                f,
                "Continue running the test: about {visitors_needed} more visitors per variant are needed for a reliable result"
            ),
            Self::RollOutWinner { variant_name, lift } => write!(
                f,
                "Consider rolling out winning variant '{variant_name}' ({lift:+.1}% lift over control)"
            ),
            Self::StopVariant { variant_name, lift } => write!(
                f,
                "Variant '{variant_name}' performs significantly worse than control ({lift:+.1}%): consider stopping it"
            ),
            Self::EndNoClearWinner => write!(
                f,
                "Consider ending the test: no clear winner after a large sample"
            ),
            Self::KeepCollecting { visitors_needed } => write!(
                f,
                "No significant difference yet: keep collecting data (about {visitors_needed} more visitors per variant)"
            ),
        }
    }
}

/// Compiled view of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub experiment_id: ExperimentId,
    pub name: String,
    pub status: ExperimentStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub confidence_level: ConfidenceLevel,
    pub total_visitors: u64,
    pub total_conversions: u64,
    pub total_revenue: f64,
    pub overall_conversion_rate_pct: f64,
    /// Ordered by rank.
    pub variants: Vec<VariantResult>,
    pub winner: Option<Winner>,
    pub recommendations: Vec<Recommendation>,
}

impl ExperimentResults {
    pub fn variant(&self, id: &VariantId) -> Option<&VariantResult> {
        self.variants.iter().find(|v| &v.variant_id == id)
    }

    pub fn recommendation_messages(&self) -> Vec<String> {
        self.recommendations.iter().map(ToString::to_string).collect()
    }
}

// ─── Compiler ────────────────────────────────────────────────────────

/// Loads experiments and compiles their results.
#[derive(Clone)]
pub struct ResultsCompiler {
    repository: Arc<dyn ExperimentRepository>,
    statistics: StatisticsConfig,
}

impl ResultsCompiler {
    pub fn new(repository: Arc<dyn ExperimentRepository>, statistics: StatisticsConfig) -> Self {
        Self {
            repository,
            statistics,
        }
    }

    /// `Ok(None)` when the experiment does not exist.
    pub fn get_experiment_results(
        &self,
        experiment_id: &ExperimentId,
    ) -> Result<Option<ExperimentResults>, GatewayError> {
        let experiment = self.repository.get_experiment(experiment_id)?;
        Ok(experiment.map(|exp| compile_results(&exp, &self.statistics)))
    }
}

/// Compile results for an already loaded experiment.
pub fn compile_results(experiment: &Experiment, statistics: &StatisticsConfig) -> ExperimentResults {
    let level = ConfidenceLevel::new(experiment.confidence_level).unwrap_or_else(|err| {
        warn!(
            experiment_id = %experiment.id,
            error = %err,
            "using default confidence level"
        );
        statistics.default_confidence_level
    });
    let test = statistics.significance_test(level);
    let control = experiment.control();

    let mut variants: Vec<VariantResult> = experiment
        .variants
        .iter()
        .map(|variant| {
            let significance = match control {
                Some(c) if !variant.is_control => {
                    Some(test.compare(&SampleCounts::from(c), &SampleCounts::from(variant)))
                }
                _ => None,
            };
            variant_result(variant, level, significance)
        })
        .collect();

    variants.sort_by(|a, b| b.conversion_rate_pct.total_cmp(&a.conversion_rate_pct));
    for (i, v) in variants.iter_mut().enumerate() {
        v.rank = i + 1;
    }

    let winner = find_winner(&variants);
    let total_visitors = experiment.total_visitors();
    let total_conversions = experiment.total_conversions();

    let recommendations = recommend(experiment, &variants, winner.as_ref(), level, statistics);

    ExperimentResults {
        experiment_id: experiment.id.clone(),
        name: experiment.name.clone(),
        status: experiment.status,
        started_at: experiment.started_at,
        ended_at: experiment.ended_at,
        confidence_level: level,
        total_visitors,
        total_conversions,
        total_revenue: experiment.total_revenue(),
        overall_conversion_rate_pct: SampleCounts::new(total_visitors, total_conversions).rate()
            * 100.0,
        variants,
        winner,
        recommendations,
    }
}

fn variant_result(
    variant: &Variant,
    level: ConfidenceLevel,
    significance: Option<SignificanceResult>,
) -> VariantResult {
    let counts = SampleCounts::from(variant);
    let revenue_per_visitor = if variant.visitors == 0 {
        0.0
    } else {
        variant.revenue / variant.visitors as f64
    };

    VariantResult {
        rank: 0,
        variant_id: variant.id.clone(),
        name: variant.name.clone(),
        is_control: variant.is_control,
        traffic_percentage: variant.traffic_percentage,
        visitors: variant.visitors,
        conversions: variant.conversions,
        revenue: variant.revenue,
        conversion_rate_pct: counts.rate() * 100.0,
        revenue_per_visitor,
        confidence_interval: confidence_interval(variant.conversions, variant.visitors, level),
        significance,
    }
}

fn find_winner(variants: &[VariantResult]) -> Option<Winner> {
    variants
        .iter()
        .filter_map(|v| {
            let sig = v.significance.as_ref()?;
            sig.is_positive_winner().then_some((v, sig))
        })
        .max_by(|(_, a), (_, b)| a.lift.total_cmp(&b.lift))
        .map(|(v, sig)| Winner {
            variant_id: v.variant_id.clone(),
            name: v.name.clone(),
            lift: sig.lift,
            p_value: sig.p_value,
        })
}

fn recommend(
    experiment: &Experiment,
    variants: &[VariantResult],
    winner: Option<&Winner>,
    level: ConfidenceLevel,
    statistics: &StatisticsConfig,
) -> Vec<Recommendation> {
    if experiment.total_visitors() == 0 {
        return vec![Recommendation::NoTraffic];
    }

    let mut out = Vec::new();
    let control = experiment.control();
    if control.is_none() {
        out.push(Recommendation::MissingControl);
    }

    let smallest = smallest_live_arm(variants);

    if smallest < statistics.min_sample_size {
        let baseline = control
            .map(SampleCounts::from)
            .unwrap_or_else(|| {
                SampleCounts::new(experiment.total_visitors(), experiment.total_conversions())
            })
            .rate();
        let planned = required_sample_size(
            baseline,
            statistics.minimum_detectable_effect,
            level,
            statistics.power,
        )
        .unwrap_or(statistics.min_sample_size);
        let target = planned.max(statistics.min_sample_size);
        out.push(Recommendation::ContinueRunning {
            visitors_needed: target.saturating_sub(smallest),
        });
        return out;
    }

    if let Some(w) = winner {
        out.push(Recommendation::RollOutWinner {
            variant_name: w.name.clone(),
            lift: w.lift,
        });
    }

    for v in variants {
        if let Some(sig) = &v.significance {
            if sig.is_significant_loss() {
                out.push(Recommendation::StopVariant {
                    variant_name: v.name.clone(),
                    lift: sig.lift,
                });
            }
        }
    }

    if winner.is_none() && control.is_some() {
        if smallest >= statistics.conclusive_sample_size {
            out.push(Recommendation::EndNoClearWinner);
        } else {
            out.push(Recommendation::KeepCollecting {
                visitors_needed: statistics.conclusive_sample_size - smallest,
            });
        }
    }

    out
}

/// Fewest visitors among arms still receiving traffic. A variant dialled
/// down to 0% never grows, so it cannot hold the whole experiment below the
/// sample floor. Falls back to every arm when none has traffic.
fn smallest_live_arm(variants: &[VariantResult]) -> u64 {
    variants
        .iter()
        .filter(|v| v.traffic_percentage > 0.0)
        .map(|v| v.visitors)
        .min()
        .or_else(|| variants.iter().map(|v| v.visitors).min())
        .unwrap_or(0)
}
