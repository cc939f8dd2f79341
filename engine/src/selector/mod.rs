//! Chef selection
//!
//! Decides who cooks today and updates the fairness ledger accordingly.
//!
//! 1. Everyone taking part is recorded as eating today.
//! 2. Every volunteer is credited with cooking today.
//! 3. If anyone volunteered, all volunteers cook.
//! 4. Otherwise the lottery pool is everyone except those who cannot cook.
//!    An empty pool means nobody can cook for anyone: the meals recorded in
//!    step 1 are taken back and nobody cooks.
//! 5. Otherwise the pool member with the lowest cooked/eaten ratio cooks.
//!    Ties go to whoever was seen first.

use sdk::types::ParticipantId;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::classifier::Classification;
use crate::ledger::FairnessLedger;

/// How today's chefs were chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// One or more participants volunteered
    Volunteers,
    /// Nobody volunteered; the fairest eligible participant was picked
    Lottery,
    /// Nobody volunteered and everyone said they cannot cook
    NobodyEligible,
}

/// Result of a selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub method: SelectionMethod,
    pub chefs: Vec<ParticipantId>,
}

/// Remove duplicates (and optionally empty ids), keeping first-seen order
fn dedup_in_order(participants: &[ParticipantId], skip_empty: bool) -> Vec<ParticipantId> {
    let mut seen = HashSet::new();
    participants
        .iter()
        .filter(|p| !(skip_empty && p.is_empty()))
        .filter(|p| seen.insert(*p))
        .cloned()
        .collect()
}

/// Select today's chefs from a classification
pub fn select_chefs(ledger: &mut FairnessLedger, classification: &Classification) -> Selection {
    select(
        ledger,
        &classification.all_participants,
        &classification.cannot_make,
        &classification.can_make,
    )
}

/// Select today's chefs and update the ledger.
///
/// `all_participants` is today's guest list, `cannot_make` those who will eat
/// but cannot cook, and `can_make` the volunteers.
pub fn select(
    ledger: &mut FairnessLedger,
    all_participants: &[ParticipantId],
    cannot_make: &[ParticipantId],
    can_make: &[ParticipantId],
) -> Selection {
    let guests = dedup_in_order(all_participants, false);

    for guest in &guests {
        ledger.record_meal(guest);
    }

    let volunteers = dedup_in_order(can_make, true);
    for volunteer in &volunteers {
        info!(participant = %volunteer, "Volunteered to cook");
        ledger.record_cook(volunteer);
    }

    if !volunteers.is_empty() {
        return Selection {
            method: SelectionMethod::Volunteers,
            chefs: volunteers,
        };
    }

    info!("No volunteers, drawing a chef");

    let excluded: HashSet<&ParticipantId> = cannot_make.iter().collect();
    let mut eligible: Vec<&ParticipantId> = guests
        .iter()
        .filter(|guest| !excluded.contains(guest))
        .collect();

    if eligible.is_empty() {
        // Nobody can cook, so nobody eats either
        for guest in &guests {
            ledger.revoke_meal(guest);
        }
        debug!(guests = guests.len(), "No eligible chef, meals revoked");
        return Selection {
            method: SelectionMethod::NobodyEligible,
            chefs: Vec::new(),
        };
    }

    // Stable sort keeps first-seen order among equal ratios
    eligible.sort_by(|a, b| ledger.compare_fairness(a, b));
    let picked = eligible[0].clone();
    ledger.record_cook(&picked);
    debug!(participant = %picked, ratio = ledger.ratio(&picked), "Picked by lottery");

    Selection {
        method: SelectionMethod::Lottery,
        chefs: vec![picked],
    }
}
