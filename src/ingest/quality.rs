//! Noise-quality labels for classification intervals.
//!
//! The quality classifier delivers one label per fixed interval of a day
//! (typically one per minute). Only the accepted label gates correlation
//! windows; the other classes explain why a stretch was rejected.
//!
//! The classification helpers reproduce the classifier's rules so that
//! labels can be generated from low-frequency RMS values when the upstream
//! stage only provides those.

use serde::{Deserialize, Serialize};

use crate::model::SECONDS_PER_DAY;

/// Intervals within this many positions of a quiet interval are marked
/// `QuietMargin`.
pub const DEFAULT_QUIET_MARGIN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityLabel {
    /// Above the maximum noise level ("a").
    Loud,
    /// Usable background ("b").
    Good,
    /// Below the minimum noise level, dead or clipped channel ("c").
    Quiet,
    /// Good but adjacent to a loud or quiet interval ("d").
    Marginal,
    /// Close to a quiet interval ("c1").
    QuietMargin,
}

impl QualityLabel {
    pub fn code(&self) -> &'static str {
        match self {
            QualityLabel::Loud => "a",
            QualityLabel::Good => "b",
            QualityLabel::Quiet => "c",
            QualityLabel::Marginal => "d",
            QualityLabel::QuietMargin => "c1",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "a" => Some(QualityLabel::Loud),
            "b" => Some(QualityLabel::Good),
            "c" => Some(QualityLabel::Quiet),
            "d" => Some(QualityLabel::Marginal),
            "c1" => Some(QualityLabel::QuietMargin),
            _ => None,
        }
    }
}

/// One day of classifier output, in time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLabels {
    pub labels: Vec<QualityLabel>,
}

impl QualityLabels {
    pub fn new(labels: Vec<QualityLabel>) -> Self {
        Self { labels }
    }

    /// `count` intervals all labelled `label`.
    pub fn uniform(label: QualityLabel, count: usize) -> Self {
        Self {
            labels: vec![label; count],
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Seconds covered by one label.
    pub fn interval_seconds(&self) -> f64 {
        SECONDS_PER_DAY / self.labels.len() as f64
    }

    /// Label in force `seconds` after midnight, `None` outside the day.
    pub fn label_at(&self, seconds: f64) -> Option<QualityLabel> {
        if self.labels.is_empty() || !(0.0..SECONDS_PER_DAY).contains(&seconds) {
            return None;
        }
        let index = (seconds / self.interval_seconds()) as usize;
        self.labels.get(index).copied()
    }

    /// True when every label touched by `[from_s, to_s]` is `accepted`.
    pub fn all_accepted(&self, from_s: f64, to_s: f64, accepted: QualityLabel) -> bool {
        if self.labels.is_empty() {
            return false;
        }
        let width = self.interval_seconds();
        let first = (from_s.max(0.0) / width) as usize;
        let last = ((to_s.min(SECONDS_PER_DAY - 1e-9)) / width) as usize;
        (first..=last.min(self.labels.len() - 1)).all(|i| self.labels[i] == accepted)
    }
}

/// Parses one label per line; blank lines are skipped.
pub fn parse_labels(text: &str) -> Option<QualityLabels> {
    let labels = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(QualityLabel::from_code)
        .collect::<Option<Vec<_>>>()?;
    Some(QualityLabels::new(labels))
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classifies one interval from its horizontal low-frequency RMS.
///
/// `min_noise` and `max_noise` are in the same units as the RMS (counts).
pub fn classify_interval(rms_lf_horizontal: f64, min_noise: f64, max_noise: f64) -> QualityLabel {
    if rms_lf_horizontal < min_noise {
        QualityLabel::Quiet
    } else if rms_lf_horizontal > max_noise {
        QualityLabel::Loud
    } else {
        QualityLabel::Good
    }
}

/// Post-processes raw interval labels.
///
/// 1. A good interval next to a loud or quiet one becomes `Marginal`
///    (neighbours are taken from the raw labels, first and last interval
///    excluded).
/// 2. Every interval within `margin` positions of a quiet interval, other
///    than quiet ones, becomes `QuietMargin`.
pub fn refine_labels(raw: &[QualityLabel], margin: usize) -> Vec<QualityLabel> {
    let is_edge = |l: QualityLabel| matches!(l, QualityLabel::Loud | QualityLabel::Quiet);

    let mut refined = raw.to_vec();
    for i in 1..raw.len().saturating_sub(1) {
        if raw[i] == QualityLabel::Good && (is_edge(raw[i - 1]) || is_edge(raw[i + 1])) {
            refined[i] = QualityLabel::Marginal;
        }
    }

    let quiet: Vec<usize> = (0..raw.len()).filter(|&i| raw[i] == QualityLabel::Quiet).collect();
    for i in quiet {
        let lo = i.saturating_sub(margin);
        let hi = (i + margin).min(refined.len() - 1);
        for label in &mut refined[lo..=hi] {
            if *label != QualityLabel::Quiet {
                *label = QualityLabel::QuietMargin;
            }
        }
    }
    refined
}

/// Classifies and refines a day of per-interval RMS values.
pub fn classify_day(rms_lf_horizontal: &[f64], min_noise: f64, max_noise: f64) -> QualityLabels {
    let raw: Vec<QualityLabel> = rms_lf_horizontal
        .iter()
        .map(|&rms| classify_interval(rms, min_noise, max_noise))
        .collect();
    QualityLabels::new(refine_labels(&raw, DEFAULT_QUIET_MARGIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use QualityLabel::*;

    #[test]
    fn test_codes_round_trip_through_parser() {
        let labels = parse_labels("a\nb\n\nc\nd\nc1\n").expect("all codes are known");
        assert_eq!(labels.labels, vec![Loud, Good, Quiet, Marginal, QuietMargin]);
        assert!(parse_labels("b\nx\n").is_none());
    }

    #[test]
    fn test_label_at_uses_interval_width() {
        let mut labels = vec![Good; 1440];
        labels[60] = Loud;
        let labels = QualityLabels::new(labels);
        assert_eq!(labels.interval_seconds(), 60.0);
        assert_eq!(labels.label_at(3_600.0), Some(Loud));
        assert_eq!(labels.label_at(3_599.0), Some(Good));
        assert_eq!(labels.label_at(-1.0), None);
        assert_eq!(labels.label_at(86_400.0), None);
    }

    #[test]
    fn test_classify_interval_bands() {
        assert_eq!(classify_interval(1.0, 5.0, 100.0), Quiet);
        assert_eq!(classify_interval(50.0, 5.0, 100.0), Good);
        assert_eq!(classify_interval(150.0, 5.0, 100.0), Loud);
    }

    #[test]
    fn test_good_next_to_loud_becomes_marginal() {
        let refined = refine_labels(&[Good, Good, Loud, Good, Good], 0);
        assert_eq!(refined, vec![Good, Marginal, Loud, Marginal, Good]);
    }

    #[test]
    fn test_quiet_interval_spreads_margin() {
        let mut raw = vec![Good; 50];
        raw[25] = Quiet;
        let refined = refine_labels(&raw, DEFAULT_QUIET_MARGIN);
        assert_eq!(refined[25], Quiet);
        assert_eq!(refined[5], QuietMargin);
        assert_eq!(refined[45], QuietMargin);
        assert_eq!(refined[4], Good);
        assert_eq!(refined[46], Good);
    }

    #[test]
    fn test_classify_day_bands_then_refines() {
        let mut rms = vec![50.0; 60];
        rms[10] = 150.0;
        rms[40] = 1.0;
        let labels = classify_day(&rms, 5.0, 100.0);

        assert_eq!(labels.labels.len(), 60);
        assert_eq!(labels.labels[10], Loud);
        assert_eq!(labels.labels[9], Marginal, "neighbours of a loud interval are marginal");
        assert_eq!(labels.labels[11], Marginal);
        assert_eq!(labels.labels[40], Quiet);
        assert_eq!(labels.labels[20], QuietMargin);
        assert_eq!(labels.labels[59], QuietMargin, "margin is clipped at the end of the day");
        assert_eq!(labels.labels[19], Good);
    }

    #[test]
    fn test_all_accepted_checks_every_touched_interval() {
        let mut labels = vec![Good; 1440];
        labels[600] = Loud;
        let labels = QualityLabels::new(labels);
        assert!(labels.all_accepted(0.0, 35_999.0, Good));
        assert!(!labels.all_accepted(35_000.0, 36_000.0, Good));
    }
}
