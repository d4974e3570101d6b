//! Relevance scoring and kept/dropped partitioning.
//!
//! Purely deterministic: the same snapshots and criteria always produce the
//! same two sequences.

use std::cmp::Ordering;

use tracing::debug;

use asinscout_shared::{DropReason, FilterCriteria, ProductSnapshot, ScoredSnapshot};

/// Result of [`filter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    /// Ranked by score, then review count, then rating (all descending).
    pub kept: Vec<ScoredSnapshot>,
    /// Input order.
    pub dropped: Vec<ScoredSnapshot>,
}

/// Normalized matching terms.
struct Terms {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Terms {
    fn from_criteria(criteria: &FilterCriteria) -> Self {
        Self {
            include: normalize(&criteria.include_terms),
            exclude: normalize(&criteria.exclude_terms),
        }
    }
}

/// Trim, lowercase, drop blanks and duplicates (first occurrence wins).
fn normalize(terms: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(terms.len());
    for term in terms {
        let term = term.trim().to_lowercase();
        if !term.is_empty() && !out.contains(&term) {
            out.push(term);
        }
    }
    out
}

/// Score every snapshot and split into kept and dropped.
pub fn filter(snapshots: &[ProductSnapshot], criteria: &FilterCriteria) -> FilterOutcome {
    let terms = Terms::from_criteria(criteria);
    let mut outcome = FilterOutcome::default();

    for snapshot in snapshots {
        let scored = evaluate(snapshot, criteria, &terms);
        if scored.kept {
            outcome.kept.push(scored);
        } else {
            debug!(asin = %scored.snapshot.asin, reasons = ?scored.drop_reasons, "dropped");
            outcome.dropped.push(scored);
        }
    }

    // `sort_by` is stable, so equal-ranked items keep input order.
    outcome.kept.sort_by(rank);
    outcome
}

fn evaluate(snapshot: &ProductSnapshot, criteria: &FilterCriteria, terms: &Terms) -> ScoredSnapshot {
    let title = snapshot.title.as_deref().map(str::to_lowercase).unwrap_or_default();

    if let Some(term) = terms.exclude.iter().find(|t| title.contains(t.as_str())) {
        return ScoredSnapshot {
            snapshot: snapshot.clone(),
            score: 0,
            kept: false,
            drop_reasons: vec![DropReason::ExcludedTerm(term.clone())],
        };
    }

    let score = terms
        .include
        .iter()
        .filter(|t| title.contains(t.as_str()))
        .count() as u32;

    let drop_reasons = threshold_failures(snapshot, criteria);

    ScoredSnapshot {
        snapshot: snapshot.clone(),
        score,
        kept: drop_reasons.is_empty(),
        drop_reasons,
    }
}

/// Price bounds only apply to known prices; rating and review minimums
/// reject unknown values.
fn threshold_failures(snapshot: &ProductSnapshot, criteria: &FilterCriteria) -> Vec<DropReason> {
    let mut reasons = Vec::new();

    if let Some(price) = snapshot.price {
        if criteria.price_min.is_some_and(|min| price < min) {
            reasons.push(DropReason::PriceBelowMin);
        }
        if criteria.price_max.is_some_and(|max| price > max) {
            reasons.push(DropReason::PriceAboveMax);
        }
    }

    if let Some(min) = criteria.rating_min {
        match snapshot.rating {
            None => reasons.push(DropReason::RatingMissing),
            Some(rating) if rating < min => reasons.push(DropReason::RatingBelowMin),
            Some(_) => {}
        }
    }

    if let Some(min) = criteria.reviews_min {
        match snapshot.reviews {
            None => reasons.push(DropReason::ReviewsMissing),
            Some(reviews) if reviews < min => reasons.push(DropReason::ReviewsBelowMin),
            Some(_) => {}
        }
    }

    reasons
}

/// Descending by score, reviews, rating. Absent values rank lowest.
fn rank(a: &ScoredSnapshot, b: &ScoredSnapshot) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.snapshot.reviews.cmp(&a.snapshot.reviews))
        .then_with(|| rating_key(b).total_cmp(&rating_key(a)))
}

fn rating_key(s: &ScoredSnapshot) -> f64 {
    s.snapshot.rating.unwrap_or(f64::NEG_INFINITY)
}
