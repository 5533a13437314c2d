//! The Outcome Aggregator — turns per-version labelled outcomes into
//! comparable net scores for promotion decisions.
//!
//! Outcome records arrive from an external feed already labelled per version;
//! this subsystem never mutates them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::version::VersionLabel;

// ─── Records ─────────────────────────────────────────────────────────────────

/// How a case turned out under a given model version.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutcomeLabel {
  Improved,
  Stable,
  Worsened,
}

/// A single labelled outcome, consumed read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
  pub record_id:   Uuid,
  pub version:     VersionLabel,
  pub outcome:     OutcomeLabel,
  pub recorded_at: DateTime<Utc>,
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Per-version outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
  pub total:    u64,
  pub improved: u64,
  pub stable:   u64,
  pub worsened: u64,
}

impl OutcomeSummary {
  /// Net score = (improved − worsened) / total. `None` when there are no
  /// cases; such versions are skipped during candidate selection.
  pub fn net_score(&self) -> Option<f64> {
    if self.total == 0 {
      return None;
    }
    Some((self.improved as f64 - self.worsened as f64) / self.total as f64)
  }
}

/// Tally `records` into per-version summaries, keyed by label.
pub fn summarize(
  records: &[OutcomeRecord],
) -> BTreeMap<VersionLabel, OutcomeSummary> {
  let mut out: BTreeMap<VersionLabel, OutcomeSummary> = BTreeMap::new();
  for record in records {
    let entry = out.entry(record.version).or_default();
    entry.total += 1;
    match record.outcome {
      OutcomeLabel::Improved => entry.improved += 1,
      OutcomeLabel::Stable => entry.stable += 1,
      OutcomeLabel::Worsened => entry.worsened += 1,
    }
  }
  out
}

/// Pick the promotion candidate from a summary.
///
/// Total order: higher net score wins; ties broken by larger case total;
/// remaining ties by greater (newer) version label. Versions with no cases
/// never win.
pub fn best_candidate(
  summary: &BTreeMap<VersionLabel, OutcomeSummary>,
) -> Option<(VersionLabel, f64)> {
  summary
    .iter()
    .filter_map(|(label, s)| s.net_score().map(|score| (*label, score, s.total)))
    .max_by(|(la, sa, ta), (lb, sb, tb)| {
      sa.total_cmp(sb).then(ta.cmp(tb)).then(la.cmp(lb))
    })
    .map(|(label, score, _)| (label, score))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(version: &str, outcome: OutcomeLabel) -> OutcomeRecord {
    OutcomeRecord {
      record_id:   Uuid::new_v4(),
      version:     version.parse().unwrap(),
      outcome,
      recorded_at: Utc::now(),
    }
  }

  fn records(version: &str, improved: u64, stable: u64, worsened: u64) -> Vec<OutcomeRecord> {
    let mut out = Vec::new();
    for _ in 0..improved {
      out.push(record(version, OutcomeLabel::Improved));
    }
    for _ in 0..stable {
      out.push(record(version, OutcomeLabel::Stable));
    }
    for _ in 0..worsened {
      out.push(record(version, OutcomeLabel::Worsened));
    }
    out
  }

  #[test]
  fn summarize_counts_per_version() {
    let mut all = records("1.0.0", 60, 30, 10);
    all.extend(records("1.1.0", 20, 5, 25));

    let summary = summarize(&all);
    assert_eq!(summary.len(), 2);

    let a = summary[&"1.0.0".parse().unwrap()];
    assert_eq!((a.total, a.improved, a.stable, a.worsened), (100, 60, 30, 10));
  }

  #[test]
  fn net_scores_match_expected() {
    // A: 100 cases, 60 improved, 10 worsened → 0.50
    // B: 50 cases, 20 improved, 25 worsened → −0.10
    let mut all = records("1.0.0", 60, 30, 10);
    all.extend(records("1.1.0", 20, 5, 25));

    let summary = summarize(&all);
    let a = summary[&"1.0.0".parse().unwrap()].net_score().unwrap();
    let b = summary[&"1.1.0".parse().unwrap()].net_score().unwrap();
    assert!((a - 0.50).abs() < f64::EPSILON);
    assert!((b + 0.10).abs() < f64::EPSILON);

    let (best, score) = best_candidate(&summary).unwrap();
    assert_eq!(best, "1.0.0".parse().unwrap());
    assert!((score - 0.50).abs() < f64::EPSILON);
  }

  #[test]
  fn empty_summary_yields_no_candidate() {
    assert!(best_candidate(&BTreeMap::new()).is_none());
  }

  #[test]
  fn zero_case_versions_are_skipped() {
    let mut summary = BTreeMap::new();
    summary.insert("1.0.0".parse().unwrap(), OutcomeSummary::default());
    assert!(best_candidate(&summary).is_none());
  }

  #[test]
  fn score_tie_breaks_on_case_total() {
    // Both score 0.5; the version with more cases wins.
    let mut all = records("1.0.0", 3, 0, 1); // 4 cases, 0.5
    all.extend(records("2.0.0", 6, 0, 2)); // 8 cases, 0.5

    let (best, _) = best_candidate(&summarize(&all)).unwrap();
    assert_eq!(best, "2.0.0".parse().unwrap());
  }

  #[test]
  fn full_tie_breaks_on_newer_label() {
    let mut all = records("1.0.0", 1, 0, 0);
    all.extend(records("1.0.1", 1, 0, 0));

    let (best, _) = best_candidate(&summarize(&all)).unwrap();
    assert_eq!(best, "1.0.1".parse().unwrap());
  }
}
