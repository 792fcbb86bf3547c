//! Anti-farm filter.
//!
//! Heuristic down-weighting of suspected inauthentic engagement. Two
//! independent checks, both multiplicative, both returning a factor in
//! (0, 1]:
//! - many likes with implausibly few distinct repliers (coordinated or
//!   bot amplification leaves likes but not conversations)
//! - author account younger than the configured minimum age
//!
//! This is a gate on rank, not a ban: items are never removed here, only
//! down-ranked. The only outright discard lives in the ranking floor.

use super::config::AntiFarmParams;
use super::decay::net_likes;
use super::scoring::EngagementSignals;

/// Compute the anti-farm multiplier for one candidate.
///
/// The ratio check needs the unique-replier signal; when enrichment
/// degraded and the signal is missing, that check is skipped and only
/// the account-age check can fire.
pub fn penalty(signals: &EngagementSignals, account_age_days: f32, params: &AntiFarmParams) -> f32 {
    let mut multiplier = 1.0f32;

    let likes = net_likes(signals.upvotes, signals.downvotes);
    if let Some(unique_repliers) = signals.unique_repliers {
        if likes > params.suspicious_like_threshold {
            let ratio = unique_repliers as f32 / likes as f32;
            if ratio < params.suspicious_ratio {
                multiplier *= params.suspicious_penalty;
            }
        }
    }

    if account_age_days < params.min_account_age_days {
        multiplier *= params.new_account_multiplier;
    }

    multiplier
}
