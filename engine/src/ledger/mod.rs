//! Fairness ledger
//!
//! Tracks, per participant, how many days they have eaten and how many days
//! they have cooked. The ratio between the two decides who is the fairest
//! pick when nobody volunteers.
//!
//! # Counting rules
//!
//! - An unseen participant has eaten 0 times and cooked 0 times.
//! - When used as a divisor the eat count is floored at 1, so a brand new
//!   participant has ratio `0 / 1 = 0`.
//! - Every participant with an eat count also has a cook count (possibly 0).
//! - Cooking more days than eating is allowed (volunteers are credited even
//!   on days they would not otherwise have been counted).
//!
//! The ledger lives in process memory only. It grows by one entry per new
//! participant and is never pruned.

use sdk::types::ParticipantId;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Cumulative eat/cook counts for every participant seen so far
#[derive(Debug, Clone, Default)]
pub struct FairnessLedger {
    eat_counts: HashMap<ParticipantId, u32>,
    cook_counts: HashMap<ParticipantId, u32>,
}

/// Point-in-time view of one participant's counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub participant: ParticipantId,
    pub eaten: u32,
    pub cooked: u32,
    pub ratio: f64,
}

impl FairnessLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of days the participant has eaten (0 if unseen)
    pub fn eat_count(&self, participant: &ParticipantId) -> u32 {
        self.eat_counts.get(participant).copied().unwrap_or(0)
    }

    /// Number of days the participant has cooked (0 if unseen)
    pub fn cook_count(&self, participant: &ParticipantId) -> u32 {
        self.cook_counts.get(participant).copied().unwrap_or(0)
    }

    /// Whether the participant has a cook counter
    pub fn tracks_cook_count(&self, participant: &ParticipantId) -> bool {
        self.cook_counts.contains_key(participant)
    }

    /// Eat count used as a divisor: absent or zero counts as 1
    fn divisor(&self, participant: &ParticipantId) -> u32 {
        self.eat_counts
            .get(participant)
            .copied()
            .unwrap_or(1)
            .max(1)
    }

    /// Fairness ratio: cooked / max(eaten, 1). Lower means "owes" a turn.
    pub fn ratio(&self, participant: &ParticipantId) -> f64 {
        f64::from(self.cook_count(participant)) / f64::from(self.divisor(participant))
    }

    /// Compare two participants by fairness ratio without floating point.
    ///
    /// `a/b < c/d  <=>  a*d < c*b` for positive divisors.
    pub fn compare_fairness(&self, a: &ParticipantId, b: &ParticipantId) -> Ordering {
        let lhs = u64::from(self.cook_count(a)) * u64::from(self.divisor(b));
        let rhs = u64::from(self.cook_count(b)) * u64::from(self.divisor(a));
        lhs.cmp(&rhs)
    }

    /// Make sure the participant has a cook counter, starting at 0
    pub fn ensure_tracked(&mut self, participant: &ParticipantId) {
        self.cook_counts.entry(participant.clone()).or_insert(0);
    }

    /// Record that the participant eats today
    pub fn record_meal(&mut self, participant: &ParticipantId) {
        self.ensure_tracked(participant);
        *self.eat_counts.entry(participant.clone()).or_insert(0) += 1;
    }

    /// Take back a meal recorded earlier in the same round
    pub fn revoke_meal(&mut self, participant: &ParticipantId) {
        if let Some(count) = self.eat_counts.get_mut(participant) {
            *count = count.saturating_sub(1);
        }
    }

    /// Credit the participant with cooking today
    pub fn record_cook(&mut self, participant: &ParticipantId) {
        *self.cook_counts.entry(participant.clone()).or_insert(0) += 1;
    }

    /// Number of participants with any counter
    ///
    /// Every eater has a cook counter, so the cook map covers everyone.
    pub fn len(&self) -> usize {
        self.cook_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eat_counts.is_empty() && self.cook_counts.is_empty()
    }

    /// Every eater has a cook counter
    pub fn is_consistent(&self) -> bool {
        self.eat_counts
            .keys()
            .all(|participant| self.cook_counts.contains_key(participant))
    }

    /// All counters, lowest ratio first, ties by participant id
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut participants: Vec<&ParticipantId> = self
            .cook_counts
            .keys()
            .chain(self.eat_counts.keys())
            .collect();
        participants.sort();
        participants.dedup();
        participants.sort_by(|a, b| self.compare_fairness(a, b));

        participants
            .into_iter()
            .map(|participant| LedgerEntry {
                participant: participant.clone(),
                eaten: self.eat_count(participant),
                cooked: self.cook_count(participant),
                ratio: self.ratio(participant),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    #[test]
    fn test_new_participant_has_zero_ratio() {
        let ledger = FairnessLedger::new();
        assert_eq!(ledger.eat_count(&id("a")), 0);
        assert_eq!(ledger.cook_count(&id("a")), 0);
        assert_eq!(ledger.ratio(&id("a")), 0.0);
    }

    #[test]
    fn test_record_meal_tracks_cook_count() {
        let mut ledger = FairnessLedger::new();
        ledger.record_meal(&id("a"));
        assert_eq!(ledger.eat_count(&id("a")), 1);
        assert!(ledger.tracks_cook_count(&id("a")));
        assert_eq!(ledger.cook_count(&id("a")), 0);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_ratio_floors_divisor_at_one() {
        let mut ledger = FairnessLedger::new();
        ledger.record_cook(&id("volunteer"));
        ledger.record_cook(&id("volunteer"));
        assert_eq!(ledger.ratio(&id("volunteer")), 2.0);
    }

    #[test]
    fn test_ratio_after_meals_and_cooks() {
        let mut ledger = FairnessLedger::new();
        for _ in 0..4 {
            ledger.record_meal(&id("a"));
        }
        ledger.record_cook(&id("a"));
        assert_eq!(ledger.ratio(&id("a")), 0.25);
    }

    #[test]
    fn test_compare_fairness_matches_ratio() {
        let mut ledger = FairnessLedger::new();
        // a: 1/3, b: 1/2
        for _ in 0..3 {
            ledger.record_meal(&id("a"));
        }
        ledger.record_cook(&id("a"));
        for _ in 0..2 {
            ledger.record_meal(&id("b"));
        }
        ledger.record_cook(&id("b"));

        assert_eq!(ledger.compare_fairness(&id("a"), &id("b")), Ordering::Less);
        assert_eq!(ledger.compare_fairness(&id("b"), &id("a")), Ordering::Greater);
        assert_eq!(ledger.compare_fairness(&id("a"), &id("a")), Ordering::Equal);
    }

    #[test]
    fn test_equal_ratios_compare_equal() {
        let mut ledger = FairnessLedger::new();
        // 1/2 vs 2/4
        for _ in 0..2 {
            ledger.record_meal(&id("a"));
        }
        ledger.record_cook(&id("a"));
        for _ in 0..4 {
            ledger.record_meal(&id("b"));
        }
        ledger.record_cook(&id("b"));
        ledger.record_cook(&id("b"));
        assert_eq!(ledger.compare_fairness(&id("a"), &id("b")), Ordering::Equal);
    }

    #[test]
    fn test_revoke_meal_never_underflows() {
        let mut ledger = FairnessLedger::new();
        ledger.revoke_meal(&id("ghost"));
        assert_eq!(ledger.eat_count(&id("ghost")), 0);

        ledger.record_meal(&id("a"));
        ledger.revoke_meal(&id("a"));
        ledger.revoke_meal(&id("a"));
        assert_eq!(ledger.eat_count(&id("a")), 0);
        assert!(ledger.tracks_cook_count(&id("a")));
    }

    #[test]
    fn test_entries_sorted_by_ratio() {
        let mut ledger = FairnessLedger::new();
        ledger.record_meal(&id("b"));
        ledger.record_cook(&id("b"));
        ledger.record_meal(&id("a"));

        let entries = ledger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].participant, id("a"));
        assert_eq!(entries[1].participant, id("b"));
        assert_eq!(entries[1].ratio, 1.0);
    }
}
