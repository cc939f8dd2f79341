//! Round orchestration
//!
//! One round is one day's cycle: post the prompt, collect replies and
//! reactions until the window closes, classify, select chefs, post the
//! result.
//!
//! ```text
//! Idle ──trigger──▶ Collecting ──deadline──▶ Evaluating ──done/failed──▶ Idle
//! ```
//!
//! Only one round runs at a time. A trigger while a round is collecting or
//! evaluating is rejected, never queued. The phase always returns to idle
//! when the round ends, whether it completed, failed, or panicked.

use chrono::{DateTime, Local};
use sdk::errors::EngineError;
use sdk::transport::ChatTransport;
use sdk::types::{ChannelId, ChatEvent, ParticipantId, PostedMessage};
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::classifier::{classify, Classification, RoundResponses};
use crate::config::Config;
use crate::ledger::{FairnessLedger, LedgerEntry};
use crate::message_bus::{EventType, MessageBus};
use crate::render::{result_kind, ParticipantDirectory, Renderer, ResultKind};
use crate::retry::{retry, RetryPolicy};
use crate::scheduler::{until, WindowPolicy};
use crate::selector::{select_chefs, SelectionMethod};

/// Where the orchestrator is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    Collecting {
        round_id: Uuid,
        deadline: DateTime<Local>,
    },
    Evaluating {
        round_id: Uuid,
    },
}

/// How a trigger ended
#[derive(Debug)]
pub enum RoundOutcome {
    /// The round ran to completion and the result was posted
    Completed(RoundReport),
    /// Another round was in flight; nothing happened
    Rejected,
    /// The round failed part-way and was abandoned
    Abandoned { round_id: Uuid, reason: String },
}

/// Record of a completed round
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round_id: Uuid,
    pub closed_at: DateTime<Local>,
    pub participants: Vec<ParticipantId>,
    pub classification: Classification,
    pub method: SelectionMethod,
    pub chefs: Vec<ParticipantId>,
    pub kind: ResultKind,
    pub message: String,
}

/// Static settings for every round
#[derive(Debug, Clone)]
pub struct RoundSettings {
    pub channel: ChannelId,
    pub emoji: String,
    pub required_count: usize,
    pub window: WindowPolicy,
    pub retry: RetryPolicy,
    pub test_mode: bool,
    pub renderer: Renderer,
}

impl RoundSettings {
    /// Derive round settings from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let window = if config.core.test_mode {
            WindowPolicy::Fixed(std::time::Duration::from_secs(
                config.schedule.test_window_secs,
            ))
        } else {
            WindowPolicy::DailyCutoff(config.schedule.cutoff_time)
        };

        Ok(Self {
            channel: config.discord.channel()?,
            emoji: config.round.emoji.clone(),
            required_count: config.round.required_count,
            window,
            retry: RetryPolicy::from(&config.retry),
            test_mode: config.core.test_mode,
            renderer: Renderer::new(config.messages.clone(), config.round.dinner_ideas.clone()),
        })
    }
}

/// Resets the phase to idle when the round ends, however it ends
struct PhaseGuard<'a> {
    phase: &'a StdMutex<RoundPhase>,
}

impl PhaseGuard<'_> {
    fn set(&self, next: RoundPhase) {
        *lock(self.phase) = next;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *lock(self.phase) = RoundPhase::Idle;
    }
}

/// Lock a std mutex, recovering the value if a previous holder panicked
fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives rounds and owns the fairness ledger
pub struct RoundOrchestrator {
    transport: Arc<dyn ChatTransport>,
    bus: Arc<MessageBus>,
    settings: RoundSettings,
    ledger: Mutex<FairnessLedger>,
    directory: StdMutex<ParticipantDirectory>,
    phase: StdMutex<RoundPhase>,
}

impl RoundOrchestrator {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        bus: Arc<MessageBus>,
        settings: RoundSettings,
    ) -> Self {
        Self {
            transport,
            bus,
            settings,
            ledger: Mutex::new(FairnessLedger::new()),
            directory: StdMutex::new(ParticipantDirectory::new()),
            phase: StdMutex::new(RoundPhase::Idle),
        }
    }

    pub fn settings(&self) -> &RoundSettings {
        &self.settings
    }

    /// Current phase
    pub fn phase(&self) -> RoundPhase {
        *lock(&self.phase)
    }

    /// Counters for every participant seen so far, fairest pick first
    pub async fn ledger_snapshot(&self) -> Vec<LedgerEntry> {
        self.ledger.lock().await.entries()
    }

    /// Run one round now.
    ///
    /// Returns `Rejected` immediately if a round is already in flight.
    /// Failures are logged and reported as `Abandoned`; they never leave the
    /// orchestrator stuck.
    pub async fn trigger(&self) -> RoundOutcome {
        let round_id = Uuid::new_v4();
        let deadline = self.settings.window.deadline_from(Local::now());

        let Some(guard) = self.try_begin(round_id, deadline) else {
            info!("Round already in progress, trigger ignored");
            return RoundOutcome::Rejected;
        };

        let span = info_span!("round", %round_id);
        let result = self
            .run_round(round_id, deadline, &guard)
            .instrument(span)
            .await;
        drop(guard);

        match result {
            Ok(report) => {
                info!(%round_id, kind = ?report.kind, chefs = report.chefs.len(), "Round completed");
                RoundOutcome::Completed(report)
            }
            Err(e) => {
                error!(%round_id, "Round abandoned: {}", e);
                RoundOutcome::Abandoned {
                    round_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Post the reminder if a round is currently collecting.
    ///
    /// Returns whether a reminder was posted.
    pub async fn remind_if_collecting(&self) -> Result<bool, EngineError> {
        let deadline = match self.phase() {
            RoundPhase::Collecting { deadline, .. } => deadline,
            phase => {
                info!(?phase, "No round collecting, reminder skipped");
                return Ok(false);
            }
        };

        self.post_reminder(deadline).await?;
        Ok(true)
    }

    /// Post the reminder regardless of phase.
    ///
    /// The cutoff shown is the open round's deadline, or the next one.
    pub async fn send_reminder(&self) -> Result<PostedMessage, EngineError> {
        let deadline = match self.phase() {
            RoundPhase::Collecting { deadline, .. } => deadline,
            _ => self.settings.window.deadline_from(Local::now()),
        };
        self.post_reminder(deadline).await
    }

    async fn post_reminder(&self, deadline: DateTime<Local>) -> Result<PostedMessage, EngineError> {
        let text = self.settings.renderer.reminder(deadline);
        let posted = self.send(&text).await?;
        info!(message_id = %posted.id, "Reminder posted");
        Ok(posted)
    }

    fn try_begin(&self, round_id: Uuid, deadline: DateTime<Local>) -> Option<PhaseGuard<'_>> {
        let mut phase = lock(&self.phase);
        if *phase != RoundPhase::Idle {
            return None;
        }
        *phase = RoundPhase::Collecting { round_id, deadline };
        Some(PhaseGuard { phase: &self.phase })
    }

    async fn run_round(
        &self,
        round_id: Uuid,
        deadline: DateTime<Local>,
        guard: &PhaseGuard<'_>,
    ) -> Result<RoundReport, EngineError> {
        // Subscribe before posting so no early reply is missed
        let rx = self.bus.subscribe(EventType::MessageCreated).await;

        let prompt = self.send(&self.settings.renderer.prompt(deadline)).await?;
        info!(
            message_id = %prompt.id,
            deadline = %deadline.format("%Y-%m-%d %H:%M:%S"),
            "Prompt posted, collecting responses"
        );

        if let Err(e) = self.seed_reaction(&prompt).await {
            warn!("Failed to seed reaction on prompt: {}", e);
        }

        let mut responses = self.collect_replies(rx, deadline).await;

        guard.set(RoundPhase::Evaluating { round_id });
        debug!(replies = responses.replies().len(), "Window closed");

        self.collect_reactions(&prompt, &mut responses).await?;
        self.refresh_names(&responses).await;

        let classification = classify(&responses);

        let (selection, entries) = {
            let mut ledger = self.ledger.lock().await;
            let selection = select_chefs(&mut ledger, &classification);
            (selection, ledger.entries())
        };

        let kind = result_kind(
            classification.total(),
            selection.chefs.len(),
            self.settings.required_count,
            self.settings.test_mode,
        );

        let directory = lock(&self.directory).clone();
        if self.settings.test_mode {
            log_ledger(&entries, &directory, &classification, &selection.chefs);
        }

        let message = self.settings.renderer.result(
            kind,
            &classification.all_participants,
            &selection.chefs,
            &directory,
        );
        self.send(&message).await?;

        Ok(RoundReport {
            round_id,
            closed_at: deadline,
            participants: classification.all_participants.clone(),
            classification,
            method: selection.method,
            chefs: selection.chefs,
            kind,
            message,
        })
    }

    async fn send(&self, text: &str) -> Result<PostedMessage, EngineError> {
        let transport = &self.transport;
        let channel = &self.settings.channel;
        retry(self.settings.retry, "send_message", || {
            transport.send_message(channel, text)
        })
        .await
    }

    async fn seed_reaction(&self, prompt: &PostedMessage) -> Result<(), EngineError> {
        let transport = &self.transport;
        let emoji = self.settings.emoji.as_str();
        retry(self.settings.retry, "add_reaction", || {
            transport.add_reaction(&prompt.channel_id, &prompt.id, emoji)
        })
        .await
    }

    /// Consume replies until the deadline, then drop the subscription.
    ///
    /// Replies already queued when the deadline passes are still counted.
    async fn collect_replies(
        &self,
        mut rx: mpsc::Receiver<ChatEvent>,
        deadline: DateTime<Local>,
    ) -> RoundResponses {
        let mut responses = RoundResponses::new();
        let close_at = tokio::time::Instant::now() + until(deadline, Local::now());
        let closes = tokio::time::sleep_until(close_at);
        tokio::pin!(closes);

        loop {
            tokio::select! {
                biased;
                _ = &mut closes => {
                    while let Ok(event) = rx.try_recv() {
                        self.accept_reply(event, &mut responses);
                    }
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => self.accept_reply(event, &mut responses),
                    None => {
                        warn!("Message stream closed before the deadline");
                        (&mut closes).await;
                        break;
                    }
                },
            }
        }

        responses
    }

    fn accept_reply(&self, event: ChatEvent, responses: &mut RoundResponses) {
        let ChatEvent::MessageCreated {
            channel_id,
            author,
            content,
        } = event
        else {
            return;
        };
        if channel_id != self.settings.channel || author.is_bot || author.id.is_empty() {
            return;
        }
        debug!(participant = %author.id, "Reply collected");
        lock(&self.directory).insert(&author);
        responses.record_reply(author.id, &content);
    }

    async fn collect_reactions(
        &self,
        prompt: &PostedMessage,
        responses: &mut RoundResponses,
    ) -> Result<(), EngineError> {
        let transport = &self.transport;
        let policy = self.settings.retry;
        let emoji = self.settings.emoji.as_str();

        let message = retry(policy, "fetch_message", || {
            transport.fetch_message(&prompt.channel_id, &prompt.id)
        })
        .await?;

        let reactors = retry(policy, "fetch_reaction_users", || {
            transport.fetch_reaction_users(&message.channel_id, &message.id, emoji)
        })
        .await?;

        let mut directory = lock(&self.directory);
        for user in reactors
            .into_iter()
            .filter(|u| !u.is_bot && !u.id.is_empty())
        {
            directory.insert(&user);
            responses.record_reaction(user.id);
        }

        Ok(())
    }

    /// Best-effort display-name refresh for repliers
    async fn refresh_names(&self, responses: &RoundResponses) {
        let transport = &self.transport;
        let policy = self.settings.retry;

        for (id, _) in responses.replies() {
            match retry(policy, "fetch_user", || transport.fetch_user(id)).await {
                Ok(user) => {
                    lock(&self.directory).insert(&user);
                }
                Err(e) => warn!(participant = %id, "Could not refresh display name: {}", e),
            }
        }
    }
}

fn log_ledger(
    entries: &[LedgerEntry],
    directory: &ParticipantDirectory,
    classification: &Classification,
    chefs: &[ParticipantId],
) {
    for entry in entries {
        info!(
            participant = %entry.participant,
            name = directory.name(&entry.participant),
            eaten = entry.eaten,
            cooked = entry.cooked,
            ratio = entry.ratio,
            "Ledger"
        );
    }
    info!(
        cannot_make = ?classification.cannot_make,
        can_make = ?classification.can_make,
        chefs = ?chefs,
        "Round classification"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessagesConfig;
    use sdk::types::{MessageId, Participant};
    use std::time::Duration;

    struct SilentTransport;

    #[async_trait::async_trait]
    impl ChatTransport for SilentTransport {
        fn name(&self) -> &str {
            "silent"
        }

        async fn send_message(
            &self,
            channel: &ChannelId,
            text: &str,
        ) -> Result<PostedMessage, EngineError> {
            Ok(PostedMessage {
                id: MessageId::new("1"),
                channel_id: channel.clone(),
                content: text.to_string(),
            })
        }

        async fn add_reaction(
            &self,
            _channel: &ChannelId,
            _message: &MessageId,
            _emoji: &str,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn fetch_message(
            &self,
            channel: &ChannelId,
            message: &MessageId,
        ) -> Result<PostedMessage, EngineError> {
            Ok(PostedMessage {
                id: message.clone(),
                channel_id: channel.clone(),
                content: String::new(),
            })
        }

        async fn fetch_reaction_users(
            &self,
            _channel: &ChannelId,
            _message: &MessageId,
            _emoji: &str,
        ) -> Result<Vec<Participant>, EngineError> {
            Ok(Vec::new())
        }

        async fn fetch_user(&self, id: &ParticipantId) -> Result<Participant, EngineError> {
            Ok(Participant::new(id.clone(), id.as_str()))
        }
    }

    fn orchestrator() -> RoundOrchestrator {
        let settings = RoundSettings {
            channel: ChannelId::new("100"),
            emoji: "👍".to_string(),
            required_count: 2,
            window: WindowPolicy::Fixed(Duration::from_millis(50)),
            retry: RetryPolicy::none(),
            test_mode: false,
            renderer: Renderer::new(MessagesConfig::default(), vec!["Taco".to_string()]),
        };
        RoundOrchestrator::new(Arc::new(SilentTransport), Arc::new(MessageBus::new()), settings)
    }

    #[test]
    fn test_guard_resets_phase_on_drop() {
        let orchestrator = orchestrator();
        let deadline = Local::now();
        {
            let guard = orchestrator.try_begin(Uuid::new_v4(), deadline).unwrap();
            assert!(matches!(orchestrator.phase(), RoundPhase::Collecting { .. }));
            assert!(orchestrator.try_begin(Uuid::new_v4(), deadline).is_none());
            guard.set(RoundPhase::Evaluating {
                round_id: Uuid::new_v4(),
            });
            assert!(orchestrator.try_begin(Uuid::new_v4(), deadline).is_none());
        }
        assert_eq!(orchestrator.phase(), RoundPhase::Idle);
    }

    #[tokio::test]
    async fn test_empty_round_posts_nobody_could_cook() {
        let orchestrator = orchestrator();
        match orchestrator.trigger().await {
            RoundOutcome::Completed(report) => {
                assert_eq!(report.kind, ResultKind::NobodyCouldCook);
                assert!(report.participants.is_empty());
                assert_eq!(report.method, SelectionMethod::NobodyEligible);
            }
            other => panic!("expected a completed round, got {:?}", other),
        }
        assert_eq!(orchestrator.phase(), RoundPhase::Idle);
    }

    #[tokio::test]
    async fn test_queued_replies_counted_at_deadline() {
        let orchestrator = orchestrator();
        let (tx, rx) = mpsc::channel(8);
        tx.send(ChatEvent::MessageCreated {
            channel_id: ChannelId::new("100"),
            author: Participant::new("1", "Alice"),
            content: "1".to_string(),
        })
        .await
        .unwrap();

        // Deadline already passed: the timer branch wins the first poll
        let responses = orchestrator
            .collect_replies(rx, Local::now() - chrono::Duration::seconds(1))
            .await;

        assert_eq!(responses.replies().len(), 1);
        assert_eq!(responses.replies()[0].0, ParticipantId::new("1"));
    }

    #[tokio::test]
    async fn test_reminder_skipped_when_idle() {
        let orchestrator = orchestrator();
        assert!(!orchestrator.remind_if_collecting().await.unwrap());
    }
}
