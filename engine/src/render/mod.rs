//! Message rendering
//!
//! Builds every text the bot posts from [`MessagesConfig`]. Participants are
//! identified by id everywhere else; display names only enter here, through
//! the [`ParticipantDirectory`].

use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use rand::Rng;
use sdk::types::{Participant, ParticipantId};
use serde::Serialize;
use std::collections::HashMap;

use crate::config::MessagesConfig;

/// Which result message a round ends with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// Guest list, chef mentions and a dish suggestion
    Summary,
    /// Someone was picked to cook, but fewer than the required number joined
    TooFewParticipants,
    /// Nobody was able to cook
    NobodyCouldCook,
}

/// Decide which result message to post.
///
/// Test mode always posts the full summary.
pub fn result_kind(total: usize, chefs: usize, required: usize, test_mode: bool) -> ResultKind {
    if test_mode || (total >= required && chefs > 0) {
        ResultKind::Summary
    } else if chefs == 0 {
        ResultKind::NobodyCouldCook
    } else {
        ResultKind::TooFewParticipants
    }
}

/// Id to display name lookup, used only for presentation
#[derive(Debug, Clone, Default)]
pub struct ParticipantDirectory {
    names: HashMap<ParticipantId, String>,
}

impl ParticipantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember (or refresh) a participant's display name
    pub fn insert(&mut self, participant: &Participant) {
        if participant.display_name.trim().is_empty() {
            return;
        }
        self.names
            .insert(participant.id.clone(), participant.display_name.clone());
    }

    /// Display name, or the id itself if no name is known
    pub fn name<'a>(&'a self, id: &'a ParticipantId) -> &'a str {
        self.names.get(id).map(String::as_str).unwrap_or(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Renders the bot's messages
#[derive(Debug, Clone)]
pub struct Renderer {
    messages: MessagesConfig,
    dinner_ideas: Vec<String>,
}

impl Renderer {
    pub fn new(messages: MessagesConfig, dinner_ideas: Vec<String>) -> Self {
        let dinner_ideas = dinner_ideas
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            messages,
            dinner_ideas,
        }
    }

    /// The daily prompt, closing at `cutoff`
    pub fn prompt(&self, cutoff: DateTime<Local>) -> String {
        self.messages.prompt.replace("{cutoff}", &format_cutoff(cutoff))
    }

    /// The reminder for a window closing at `cutoff`
    pub fn reminder(&self, cutoff: DateTime<Local>) -> String {
        self.messages.reminder.replace("{cutoff}", &format_cutoff(cutoff))
    }

    /// Mention markup for a participant
    pub fn mention(&self, id: &ParticipantId) -> String {
        self.messages.mention.replace("{id}", id.as_str())
    }

    /// Pick a dish suggestion
    pub fn pick_dish<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.dinner_ideas
            .choose(rng)
            .map(String::as_str)
            .unwrap_or("-")
    }

    /// The full dinner summary
    pub fn summary(
        &self,
        guests: &[ParticipantId],
        chefs: &[ParticipantId],
        directory: &ParticipantDirectory,
        dish: &str,
    ) -> String {
        let guest_names: Vec<&str> = guests.iter().map(|g| directory.name(g)).collect();
        let mentions: Vec<String> = chefs.iter().map(|c| self.mention(c)).collect();

        format!(
            "{}\n- {}: {}\n- {}: {}\n- {}: {}",
            self.messages.summary_heading,
            self.messages.guests_label,
            guest_names.join(", "),
            self.messages.chefs_label,
            mentions.join(", "),
            self.messages.dish_label,
            dish
        )
    }

    /// The result message for a finished round
    pub fn result(
        &self,
        kind: ResultKind,
        guests: &[ParticipantId],
        chefs: &[ParticipantId],
        directory: &ParticipantDirectory,
    ) -> String {
        match kind {
            ResultKind::Summary => {
                let dish = self.pick_dish(&mut rand::thread_rng()).to_string();
                self.summary(guests, chefs, directory, &dish)
            }
            ResultKind::TooFewParticipants => self.messages.too_few.clone(),
            ResultKind::NobodyCouldCook => self.messages.nobody_could_cook.clone(),
        }
    }
}

fn format_cutoff(cutoff: DateTime<Local>) -> String {
    cutoff.format("%H:%M").to_string()
}
