//! Response classification
//!
//! Turns the raw replies and reactions collected during a round into three
//! participant lists:
//!
//! - **cannot make**: replied with text containing `0` (wants dinner, cannot cook)
//! - **can make**: replied with text containing `1` (volunteers to cook)
//! - **all participants**: everyone who replied or reacted, repliers first
//!
//! Matching is by substring, so a reply of `"10"` lands in both lists. A reply
//! matching neither (e.g. `"trekning"`) still counts as participation and
//! means "put me in the lottery".

use sdk::types::ParticipantId;
use serde::Serialize;
use std::collections::HashSet;

/// Marker for "I want dinner but cannot cook"
pub const CANNOT_COOK_MARK: char = '0';

/// Marker for "I can cook"
pub const CAN_COOK_MARK: char = '1';

/// Raw responses collected during one collection window.
///
/// Replies keep the first-seen position of each participant; a later reply
/// from the same participant replaces the earlier content in place.
#[derive(Debug, Clone, Default)]
pub struct RoundResponses {
    replies: Vec<(ParticipantId, String)>,
    reactors: Vec<ParticipantId>,
}

impl RoundResponses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a text reply. Content is trimmed; the latest reply wins.
    pub fn record_reply(&mut self, participant: ParticipantId, content: &str) {
        let content = content.trim().to_string();
        match self.replies.iter_mut().find(|(p, _)| *p == participant) {
            Some((_, existing)) => *existing = content,
            None => self.replies.push((participant, content)),
        }
    }

    /// Record a reaction with the designated emoji
    pub fn record_reaction(&mut self, participant: ParticipantId) {
        if !self.reactors.contains(&participant) {
            self.reactors.push(participant);
        }
    }

    /// Replies in first-seen order
    pub fn replies(&self) -> &[(ParticipantId, String)] {
        &self.replies
    }

    /// Reactors in first-seen order
    pub fn reactors(&self) -> &[ParticipantId] {
        &self.reactors
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty() && self.reactors.is_empty()
    }
}

/// Outcome of classifying a round's responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub cannot_make: Vec<ParticipantId>,
    pub can_make: Vec<ParticipantId>,
    pub all_participants: Vec<ParticipantId>,
}

impl Classification {
    /// Number of distinct participants
    pub fn total(&self) -> usize {
        self.all_participants.len()
    }
}

/// Partition the collected responses.
///
/// Pure: the same responses always yield the same classification.
pub fn classify(responses: &RoundResponses) -> Classification {
    let mut classification = Classification::default();
    let mut seen: HashSet<&ParticipantId> = HashSet::new();

    for (participant, content) in responses.replies() {
        if content.contains(CAN_COOK_MARK) {
            classification.can_make.push(participant.clone());
        }
        if content.contains(CANNOT_COOK_MARK) {
            classification.cannot_make.push(participant.clone());
        }
        if seen.insert(participant) {
            classification.all_participants.push(participant.clone());
        }
    }

    for participant in responses.reactors() {
        if seen.insert(participant) {
            classification.all_participants.push(participant.clone());
        }
    }

    classification
}
