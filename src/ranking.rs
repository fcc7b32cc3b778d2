//! Rank classifier: dense severity ranks and display buckets.
use std::cmp::Ordering;
use std::collections::HashSet;

/// Rank bucket shown on the risk map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskCategory {
    Top10,
    Top20,
    Top50,
    Top100,
    Beyond100,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 5] = [
        RiskCategory::Top10,
        RiskCategory::Top20,
        RiskCategory::Top50,
        RiskCategory::Top100,
        RiskCategory::Beyond100,
    ];

    pub fn from_rank(rank: usize) -> Self {
        match rank {
            0..=10 => RiskCategory::Top10,
            11..=20 => RiskCategory::Top20,
            21..=50 => RiskCategory::Top50,
            51..=100 => RiskCategory::Top100,
            _ => RiskCategory::Beyond100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskCategory::Top10 => "1-10",
            RiskCategory::Top20 => "11-20",
            RiskCategory::Top50 => "21-50",
            RiskCategory::Top100 => "51-100",
            RiskCategory::Beyond100 => ">100",
        }
    }

    /// Display color; darker for more severe buckets.
    pub fn color(self) -> &'static str {
        match self {
            RiskCategory::Top10 => "#8B0000",
            RiskCategory::Top20 => "#CC0000",
            RiskCategory::Top50 => "#FF4444",
            RiskCategory::Top100 => "#FF9999",
            RiskCategory::Beyond100 => "#FFCCCC",
        }
    }
}

/// Dense ranks in descending order of `scores`: the largest value is rank 1,
/// ties share a rank, and the next distinct value follows without a gap.
pub fn dense_rank_desc(scores: &[f64]) -> Vec<usize> {
    // `+ 0.0` folds -0.0 into 0.0 so sort, dedup and lookup agree.
    let normalized: Vec<f64> = scores.iter().map(|s| s + 0.0).collect();
    let mut distinct = normalized.clone();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
    normalized
        .iter()
        .map(|s| {
            distinct
                .binary_search_by(|probe| s.total_cmp(probe))
                .map_or(distinct.len(), |i| i + 1)
        })
        .collect()
}

/// Attach dense ranks and buckets to `items`, returned in rank order
/// (ties broken by `name`).
pub fn rank_by<T, S, N>(items: Vec<T>, score: S, name: N) -> Vec<(T, usize, RiskCategory)>
where
    S: Fn(&T) -> f64,
    N: Fn(&T) -> &str,
{
    let scores: Vec<f64> = items.iter().map(&score).collect();
    let ranks = dense_rank_desc(&scores);
    let mut ranked: Vec<(T, usize, RiskCategory)> = items
        .into_iter()
        .zip(ranks)
        .map(|(item, rank)| (item, rank, RiskCategory::from_rank(rank)))
        .collect();
    ranked.sort_by(|a, b| match a.1.cmp(&b.1) {
        Ordering::Equal => name(&a.0).cmp(name(&b.0)),
        other => other,
    });
    ranked
}

/// Aggregate regions, income groups and dissolved unions that must not be
/// ranked alongside countries.
#[derive(Debug, Clone)]
pub struct EntityFilter {
    excluded: HashSet<String>,
}

impl EntityFilter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_excluded(&self, country: &str) -> bool {
        self.excluded.contains(country)
    }

    pub fn retain<T, F>(&self, rows: &mut Vec<T>, country: F) -> usize
    where
        F: Fn(&T) -> &str,
    {
        let before = rows.len();
        rows.retain(|r| !self.is_excluded(country(r)));
        before - rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_excluded_entities;

    #[test]
    fn ties_share_rank_without_gaps() {
        let ranks = dense_rank_desc(&[3.0, 5.0, 5.0, 1.0, 3.0]);
        assert_eq!(ranks, vec![2, 1, 1, 3, 2]);
        assert_eq!(dense_rank_desc(&[0.0, -0.0, -1.0]), vec![1, 1, 2]);
    }

    #[test]
    fn bucket_boundaries_are_exact() {
        assert_eq!(RiskCategory::from_rank(1).label(), "1-10");
        assert_eq!(RiskCategory::from_rank(10).label(), "1-10");
        assert_eq!(RiskCategory::from_rank(11).label(), "11-20");
        assert_eq!(RiskCategory::from_rank(20).label(), "11-20");
        assert_eq!(RiskCategory::from_rank(21).label(), "21-50");
        assert_eq!(RiskCategory::from_rank(50).label(), "21-50");
        assert_eq!(RiskCategory::from_rank(51).label(), "51-100");
        assert_eq!(RiskCategory::from_rank(100).label(), "51-100");
        assert_eq!(RiskCategory::from_rank(101).label(), ">100");
    }

    #[test]
    fn colors_lighten_with_rank() {
        let colors: Vec<&str> = RiskCategory::ALL.iter().map(|c| c.color()).collect();
        assert_eq!(colors, vec!["#8B0000", "#CC0000", "#FF4444", "#FF9999", "#FFCCCC"]);
    }

    #[test]
    fn rank_by_orders_and_breaks_ties_by_name() {
        let items = vec![("b", 1.0), ("a", 2.0), ("c", 2.0)];
        let ranked = rank_by(items, |t| t.1, |t| t.0);
        let names: Vec<(&str, usize)> = ranked.iter().map(|(t, r, _)| (t.0, *r)).collect();
        assert_eq!(names, vec![("a", 1), ("c", 1), ("b", 2)]);
    }

    #[test]
    fn ranking_is_pure() {
        let scores = [0.4, -1.0, 2.5, 2.5, 0.0];
        assert_eq!(dense_rank_desc(&scores), dense_rank_desc(&scores));
    }

    #[test]
    fn filter_drops_aggregates() {
        let filter = EntityFilter::new(default_excluded_entities());
        let mut rows = vec!["World", "Chad", "Asia", "Peru"];
        let removed = filter.retain(&mut rows, |r| *r);
        assert_eq!(removed, 2);
        assert_eq!(rows, vec!["Chad", "Peru"]);
        assert!(EntityFilter::new(["Nowhere"]).is_excluded("Nowhere"));
    }
}
