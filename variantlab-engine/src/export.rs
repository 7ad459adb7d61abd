//! Results export: JSON and CSV.
//!
//! - **JSON**: the full [`ExperimentResults`] including recommendations
//! - **CSV**: one row per variant, in rank order, for spreadsheets

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::results::{ExperimentResults, VariantResult};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

// ─── JSON ────────────────────────────────────────────────────────────

pub fn export_json(results: &ExperimentResults) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(results)?)
}

pub fn import_json(json: &str) -> Result<ExperimentResults, ExportError> {
    Ok(serde_json::from_str(json)?)
}

// ─── CSV ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct VariantRow<'a> {
    experiment_id: &'a str,
    rank: usize,
    variant_id: &'a str,
    name: &'a str,
    is_control: bool,
    traffic_percentage: f64,
    visitors: u64,
    conversions: u64,
    revenue: String,
    conversion_rate_pct: String,
    revenue_per_visitor: String,
    ci_lower_pct: String,
    ci_upper_pct: String,
    lift_pct: String,
    p_value: String,
    is_significant: bool,
    is_winner: bool,
}

impl<'a> VariantRow<'a> {
    fn new(results: &'a ExperimentResults, v: &'a VariantResult) -> Self {
        let is_winner = results
            .winner
            .as_ref()
            .is_some_and(|w| w.variant_id == v.variant_id);
        let (lift, p_value, significant) = match &v.significance {
            Some(sig) => (
                format!("{:.4}", sig.lift),
                format!("{:.7}", sig.p_value),
                sig.is_significant,
            ),
            None => (String::new(), String::new(), false),
        };

        Self {
            experiment_id: results.experiment_id.as_str(),
            rank: v.rank,
            variant_id: v.variant_id.as_str(),
            name: &v.name,
            is_control: v.is_control,
            traffic_percentage: v.traffic_percentage,
            visitors: v.visitors,
            conversions: v.conversions,
            revenue: format!("{:.2}", v.revenue),
            conversion_rate_pct: format!("{:.4}", v.conversion_rate_pct),
            revenue_per_visitor: format!("{:.4}", v.revenue_per_visitor),
            ci_lower_pct: format!("{:.4}", v.confidence_interval.lower),
            ci_upper_pct: format!("{:.4}", v.confidence_interval.upper),
            lift_pct: lift,
            p_value,
            is_significant: significant,
            is_winner,
        }
    }
}

/// One row per variant. Lift and p-value are empty for the control.
pub fn export_variants_csv(results: &ExperimentResults) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for v in &results.variants {
        wtr.serialize(VariantRow::new(results, v))?;
    }
    let data = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(data)?)
}

/// Write `results.json` and `variants.csv` into `dir`, creating it.
pub fn save_results(results: &ExperimentResults, dir: &Path) -> Result<(), ExportError> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join("results.json"), export_json(results)?)?;
    std::fs::write(dir.join("variants.csv"), export_variants_csv(results)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatisticsConfig;
    use crate::results::compile_results;
    use variantlab_core::domain::{Experiment, ExperimentStatus, Variant};

    fn results() -> ExperimentResults {
        let exp = Experiment::new(
            "exp-x",
            ExperimentStatus::Completed,
            vec![
                Variant::control("a", "Control", 50.0)
                    .with_counts(5000, 250)
                    .with_revenue(1250.0),
                Variant::new("b", "Green, bold", 50.0)
                    .with_counts(5000, 350)
                    .with_revenue(2000.0),
            ],
        );
        compile_results(&exp, &StatisticsConfig::default())
    }

    #[test]
    fn csv_has_header_and_one_row_per_variant_in_rank_order() {
        let csv_text = export_variants_csv(&results()).unwrap();
        let mut rdr = csv::Reader::from_reader(csv_text.as_bytes());

        let headers = rdr.headers().unwrap().clone();
        assert_eq!(&headers[0], "experiment_id");
        assert_eq!(headers.len(), 17);

        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "b");
        assert_eq!(&rows[0][3], "Green, bold");
        assert_eq!(&rows[0][16], "true");
        assert_eq!(&rows[1][2], "a");
        assert_eq!(&rows[1][13], "");
    }

    #[test]
    fn json_roundtrip() {
        let r = results();
        let json = export_json(&r).unwrap();
        assert!(json.contains("roll_out_winner"));
        let back = import_json(&json).unwrap();
        assert_eq!(back.experiment_id, r.experiment_id);
        assert_eq!(back.recommendations.len(), r.recommendations.len());
        assert_eq!(back.winner.map(|w| w.variant_id), r.winner.map(|w| w.variant_id));
        assert_eq!(back.variants.len(), 2);
    }

    #[test]
    fn save_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report");
        save_results(&results(), &out).unwrap();
        assert!(out.join("results.json").exists());
        assert!(out.join("variants.csv").exists());
    }
}
