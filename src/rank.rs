//! Ranking & pagination.
//!
//! Takes scored candidates and produces one stable page:
//! floor discard → optional self-exclusion → total-order sort →
//! per-author cap → cursor pagination.
//!
//! The sort is a *total* order: score desc, then `created_at` desc, then
//! id desc. Repeated calls over identical input return identical pages;
//! equal-score ties can never reorder between calls.
//!
//! The cursor is the id of the last item of the previous page. The full
//! candidate set is recomputed per call, so an item published between two
//! page requests may shift later pages; that is accepted (no snapshot
//! isolation). An unknown or expired cursor restarts from the top,
//! matching the position-scan semantics of cursor-by-id.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::score::config::RankingParams;
use crate::score::{Candidate, ScoreResult};

/// One scored candidate flowing through the ranking pipeline. `boost`
/// is the time-of-day post-multiplier already folded into `score`.
#[derive(Debug, Clone)]
pub struct RankedItem {
    pub candidate: Candidate,
    pub result: ScoreResult,
    pub boost: f32,
}

impl RankedItem {
    pub fn score(&self) -> f32 {
        self.result.score
    }
}

#[derive(Debug, Clone, Default)]
pub struct RankOptions {
    pub limit: usize,
    pub cursor: Option<String>,
    pub exclude_author: Option<String>,
}

/// Counts emitted with every ranking call for diagnostics.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RankTallies {
    pub considered: usize,
    pub below_floor: usize,
    pub self_excluded: usize,
    pub surviving_floor: usize,
    pub author_capped: usize,
    pub surviving_author_cap: usize,
    pub returned: usize,
}

/// Rank `items` and slice out one page.
///
/// Returns the page, the next cursor (`None` at the end), and tallies.
pub fn rank(
    items: Vec<RankedItem>,
    params: &RankingParams,
    opts: &RankOptions,
) -> (Vec<RankedItem>, Option<String>, RankTallies) {
    let mut tallies = RankTallies {
        considered: items.len(),
        ..Default::default()
    };

    let mut survivors: Vec<RankedItem> = Vec::with_capacity(items.len());
    for item in items {
        if let Some(excluded) = &opts.exclude_author {
            if &item.candidate.author_id == excluded {
                tallies.self_excluded += 1;
                continue;
            }
        }
        if item.score() < params.min_score_floor {
            tallies.below_floor += 1;
            continue;
        }
        survivors.push(item);
    }
    tallies.surviving_floor = survivors.len();

    survivors.sort_by(compare_ranked);

    // Per-author cap, applied in ranked order so an author keeps their
    // best-scoring items.
    let mut per_author: HashMap<String, usize> = HashMap::new();
    let mut capped: Vec<RankedItem> = Vec::with_capacity(survivors.len());
    for item in survivors {
        let count = per_author
            .entry(item.candidate.author_id.clone())
            .or_insert(0);
        if *count >= params.max_per_author {
            tallies.author_capped += 1;
            continue;
        }
        *count += 1;
        capped.push(item);
    }
    tallies.surviving_author_cap = capped.len();

    let start = match &opts.cursor {
        Some(cursor) => capped
            .iter()
            .position(|it| &it.candidate.id == cursor)
            .map(|pos| pos + 1)
            .unwrap_or(0),
        None => 0,
    };

    let end = (start + opts.limit).min(capped.len());
    let page: Vec<RankedItem> = capped[start..end].to_vec();
    tallies.returned = page.len();

    let next_cursor = if end < capped.len() {
        page.last().map(|it| it.candidate.id.clone())
    } else {
        None
    };

    (page, next_cursor, tallies)
}

/// Score desc, created_at desc, id desc. Scores are clamped in [0,1] so
/// `partial_cmp` cannot see a NaN; `Ordering::Equal` is a safe fallback.
fn compare_ranked(a: &RankedItem, b: &RankedItem) -> Ordering {
    b.score()
        .partial_cmp(&a.score())
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.candidate.created_at.cmp(&a.candidate.created_at))
        .then_with(|| b.candidate.id.cmp(&a.candidate.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{EngagementSignals, ScoreBreakdown};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, min, 0).unwrap()
    }

    fn ranked(id: &str, author: &str, score: f32, created_min: u32) -> RankedItem {
        RankedItem {
            candidate: Candidate {
                id: id.into(),
                author_id: author.into(),
                content_type: "post".into(),
                created_at: at(created_min),
                signals: EngagementSignals::default(),
                author_account_age_days: 365.0,
            },
            result: ScoreResult {
                score,
                breakdown: ScoreBreakdown {
                    recency: 0.0,
                    replies: 0.0,
                    bookmarks: 0.0,
                    reposts: 0.0,
                    likes: 0.0,
                    penalty: 1.0,
                },
                scoring_version: "default-test".into(),
            },
            boost: 1.0,
        }
    }

    fn params() -> RankingParams {
        RankingParams::default()
    }

    fn opts(limit: usize) -> RankOptions {
        RankOptions {
            limit,
            ..Default::default()
        }
    }

    #[test]
    fn sorts_by_score_then_recency_then_id() {
        let items = vec![
            ranked("a", "u1", 0.5, 10),
            ranked("b", "u2", 0.9, 5),
            ranked("c", "u3", 0.5, 20),
            ranked("d", "u4", 0.5, 20),
        ];
        let (page, _, _) = rank(items, &params(), &opts(10));
        let ids: Vec<&str> = page.iter().map(|i| i.candidate.id.as_str()).collect();
        // b wins on score; c and d tie on score and time, d wins on id.
        assert_eq!(ids, vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn floor_discards_noise() {
        let items = vec![ranked("a", "u1", 0.5, 1), ranked("b", "u2", 0.001, 2)];
        let (page, _, tallies) = rank(items, &params(), &opts(10));
        assert_eq!(page.len(), 1);
        assert_eq!(tallies.below_floor, 1);
        assert_eq!(tallies.surviving_floor, 1);
    }

    #[test]
    fn per_author_cap_holds() {
        let mut items = Vec::new();
        for i in 0..6 {
            items.push(ranked(&format!("p{i}"), "prolific", 0.9 - i as f32 * 0.01, i));
        }
        items.push(ranked("other", "quiet", 0.2, 1));

        let (page, _, tallies) = rank(items, &params(), &opts(10));
        let from_prolific = page
            .iter()
            .filter(|i| i.candidate.author_id == "prolific")
            .count();
        assert_eq!(from_prolific, params().max_per_author);
        assert_eq!(tallies.author_capped, 6 - params().max_per_author);
        // The capped author's surviving items are their best-scoring ones.
        assert_eq!(page[0].candidate.id, "p0");
    }

    #[test]
    fn cursor_resumes_after_last_item() {
        let items: Vec<RankedItem> = (0..5)
            .map(|i| ranked(&format!("i{i}"), &format!("u{i}"), 0.9 - i as f32 * 0.1, i))
            .collect();

        let (page1, cursor1, _) = rank(items.clone(), &params(), &opts(2));
        assert_eq!(page1.len(), 2);
        let cursor1 = cursor1.expect("more pages remain");
        assert_eq!(cursor1, "i1");

        let (page2, cursor2, _) = rank(
            items.clone(),
            &params(),
            &RankOptions {
                limit: 2,
                cursor: Some(cursor1),
                ..Default::default()
            },
        );
        assert_eq!(page2[0].candidate.id, "i2");
        assert_eq!(page2[1].candidate.id, "i3");

        let (page3, cursor3, _) = rank(
            items,
            &params(),
            &RankOptions {
                limit: 2,
                cursor: cursor2,
                ..Default::default()
            },
        );
        assert_eq!(page3.len(), 1);
        assert_eq!(page3[0].candidate.id, "i4");
        assert!(cursor3.is_none());
    }

    #[test]
    fn unknown_cursor_restarts_from_top() {
        let items: Vec<RankedItem> = (0..3)
            .map(|i| ranked(&format!("i{i}"), &format!("u{i}"), 0.9 - i as f32 * 0.1, i))
            .collect();
        let (page, _, _) = rank(
            items,
            &params(),
            &RankOptions {
                limit: 2,
                cursor: Some("vanished".into()),
                ..Default::default()
            },
        );
        assert_eq!(page[0].candidate.id, "i0");
    }

    #[test]
    fn excludes_requesting_author() {
        let items = vec![ranked("mine", "me", 0.9, 1), ranked("theirs", "them", 0.5, 2)];
        let (page, _, tallies) = rank(
            items,
            &params(),
            &RankOptions {
                limit: 10,
                exclude_author: Some("me".into()),
                ..Default::default()
            },
        );
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].candidate.id, "theirs");
        assert_eq!(tallies.self_excluded, 1);
    }

    #[test]
    fn empty_input_yields_empty_page_without_cursor() {
        let (page, cursor, tallies) = rank(Vec::new(), &params(), &opts(10));
        assert!(page.is_empty());
        assert!(cursor.is_none());
        assert_eq!(tallies.considered, 0);
    }
}
