//! The timer/expiry sweeper.
//!
//! One cooperative loop per process. Each pass is idempotent and tolerates
//! overlapping invocations: every mutation runs under a per-content lock or
//! a compare-and-set status flip, so a second sweeper racing the first just
//! loses the flips.
use pf_core::GameResult;
use pf_core::Settings;
use pf_database::Database;
use pf_engine::CoordinatorContext;
use pf_engine::IrEngine;
use pf_engine::RoundEngine;
use pf_ai::IrBackupOrchestrator;
use pf_ai::QfBackupOrchestrator;
use pf_records::BackronymRepository;
use pf_records::Phraseset;
use pf_records::PhrasesetRepository;
use pf_records::PhrasesetStatus;
use pf_records::RoundRepository;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;

/// What the QF vote-finalization pass decided for one phraseset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAction {
    Finalize,
    EnterClosing,
    Nothing,
}

/// Threshold cascade for QF phraseset finalization, checked in order:
/// hard vote cap, closing window, then the minimum-votes window.
pub fn vote_action(set: &Phraseset, settings: &Settings, now: SystemTime) -> VoteAction {
    match set.status {
        PhrasesetStatus::Closing => {
            let window = Duration::from_secs(settings.vote_closing_window_minutes * 60);
            match set.closing_started_at {
                Some(started) if now >= started + window => VoteAction::Finalize,
                _ => {
                    if set.vote_count >= settings.vote_max_votes {
                        VoteAction::Finalize
                    } else {
                        VoteAction::Nothing
                    }
                }
            }
        }
        PhrasesetStatus::Voting => {
            if set.vote_count >= settings.vote_max_votes {
                return VoteAction::Finalize;
            }
            if set.vote_count >= settings.vote_closing_threshold {
                return VoteAction::EnterClosing;
            }
            if set.vote_count >= settings.vote_minimum_threshold {
                let window = Duration::from_secs(settings.vote_minimum_window_minutes * 60);
                if let Some(started) = set.voting_started_at {
                    if now >= started + window {
                        return VoteAction::Finalize;
                    }
                }
            }
            VoteAction::Nothing
        }
        _ => VoteAction::Nothing,
    }
}

/// The sweep loop. Owns its own database handle; every pass borrows a
/// fresh session.
pub struct Sweeper {
    ctx: Arc<CoordinatorContext>,
    database: Database,
    engine: RoundEngine,
    ir: IrEngine,
    qf_backup: QfBackupOrchestrator,
    ir_backup: IrBackupOrchestrator,
    interval: Duration,
    last_ai_tick: Option<Instant>,
}

impl Sweeper {
    pub fn new(
        ctx: Arc<CoordinatorContext>,
        database: Database,
        qf_backup: QfBackupOrchestrator,
        ir_backup: IrBackupOrchestrator,
    ) -> Self {
        let engine = RoundEngine::new(ctx.clone());
        let ir = IrEngine::new(ctx.clone());
        Self {
            ctx,
            database,
            engine,
            ir,
            qf_backup,
            ir_backup,
            interval: Duration::from_secs(5),
            last_ai_tick: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the shutdown signal flips. Long passes finish their item;
    /// cancellation is cooperative.
    pub async fn run(mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        log::info!("[sweeper] started (every {:?})", self.interval);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(error) = self.sweep_once().await {
                        log::error!("[sweeper] pass failed: {}", error);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("[sweeper] shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One full sweep: expiry, QF finalization, IR timers, AI stall ticks.
    /// Every mutation is its own transaction, so a mid-sweep crash leaves
    /// each item either untouched or fully settled.
    pub async fn sweep_once(&mut self) -> GameResult<()> {
        let mut db = self.database.session().await?;
        let now = self.ctx.now();
        let grace = Duration::from_secs(self.ctx.settings.grace_period_seconds);

        // Pass 1: rounds past their grace-adjusted deadline.
        let deadline = now - grace;
        for round in db.expired_candidates(deadline).await? {
            let tx = db.transaction().await?;
            match self.engine.expire_round(&tx, &round).await {
                Ok(()) => tx.commit().await?,
                Err(error) => {
                    log::error!("[sweeper] expiring {} failed: {}", round.round_id, error);
                }
            }
        }

        // Pass 2: QF vote finalization thresholds.
        let mut sets = db.phrasesets_in_status(PhrasesetStatus::Voting).await?;
        sets.extend(db.phrasesets_in_status(PhrasesetStatus::Closing).await?);
        for set in sets {
            match vote_action(&set, &self.ctx.settings, now) {
                VoteAction::Finalize => {
                    let tx = db.transaction().await?;
                    match self.engine.finalize_phraseset(&tx, set.phraseset_id).await {
                        Ok(_) => tx.commit().await?,
                        Err(error) => {
                            log::error!(
                                "[sweeper] finalizing {} failed: {}",
                                set.phraseset_id,
                                error
                            );
                        }
                    }
                }
                VoteAction::EnterClosing => {
                    db.set_closing(set.phraseset_id, now).await?;
                    log::info!("[sweeper] phraseset {} entered closing", set.phraseset_id);
                }
                VoteAction::Nothing => {}
            }
        }

        // Pass 3: IR timer transitions (no closing state; straight from
        // voting to finalized when the window lapses).
        for set in db.due_voting_transitions(now).await? {
            if let Err(error) = self.ir.transition_to_voting(&db, set.set_id).await {
                log::error!("[sweeper] ir transition {} failed: {}", set.set_id, error);
            }
        }
        for set in db.due_finalizations(now).await? {
            let tx = db.transaction().await?;
            match self.ir.finalize_set(&tx, set.set_id).await {
                Ok(_) => tx.commit().await?,
                Err(error) => {
                    log::error!("[sweeper] ir finalize {} failed: {}", set.set_id, error);
                }
            }
        }

        // Pass 4: AI stall check on its own slower cadence.
        let tick = Duration::from_secs(self.ctx.settings.ai_backup_sleep_minutes * 60);
        let due = self
            .last_ai_tick
            .is_none_or(|last| last.elapsed() >= tick);
        if due {
            self.last_ai_tick = Some(Instant::now());
            if let Err(error) = self.qf_backup.run_backup_cycle().await {
                log::error!("[sweeper] qf backup cycle failed: {}", error);
            }
            if let Err(error) = self.ir_backup.run_backup_cycle().await {
                log::error!("[sweeper] ir backup cycle failed: {}", error);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::ID;

    fn set(
        status: PhrasesetStatus,
        votes: i64,
        voting_started: Option<SystemTime>,
        closing_started: Option<SystemTime>,
    ) -> Phraseset {
        Phraseset {
            phraseset_id: ID::default(),
            prompt_round_id: ID::default(),
            copy_round_1_id: ID::default(),
            copy_round_2_id: ID::default(),
            prompt_text: "prompt".into(),
            original_phrase: "a".into(),
            copy_phrase_1: "b".into(),
            copy_phrase_2: "c".into(),
            status,
            vote_count: votes,
            original_votes: 0,
            copy1_votes: 0,
            copy2_votes: 0,
            prize_pool: 200,
            created_at: SystemTime::UNIX_EPOCH,
            voting_started_at: voting_started,
            closing_started_at: closing_started,
            finalized_at: None,
        }
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn max_votes_finalizes_immediately() {
        let settings = Settings::default();
        let s = set(PhrasesetStatus::Voting, 20, Some(at(0)), None);
        assert_eq!(vote_action(&s, &settings, at(1)), VoteAction::Finalize);
    }

    #[test]
    fn closing_threshold_enters_closing() {
        let settings = Settings::default();
        let s = set(PhrasesetStatus::Voting, 5, Some(at(0)), None);
        assert_eq!(vote_action(&s, &settings, at(1)), VoteAction::EnterClosing);
    }

    #[test]
    fn closing_window_elapses_to_finalize() {
        let settings = Settings::default();
        let s = set(PhrasesetStatus::Closing, 6, Some(at(0)), Some(at(0)));
        assert_eq!(
            vote_action(&s, &settings, at(5 * 60)),
            VoteAction::Finalize
        );
        assert_eq!(
            vote_action(&s, &settings, at(5 * 60 - 1)),
            VoteAction::Nothing
        );
    }

    #[test]
    fn minimum_threshold_waits_for_its_window() {
        let settings = Settings::default();
        let s = set(PhrasesetStatus::Voting, 3, Some(at(0)), None);
        assert_eq!(vote_action(&s, &settings, at(60)), VoteAction::Nothing);
        assert_eq!(
            vote_action(&s, &settings, at(60 * 60)),
            VoteAction::Finalize
        );
    }

    #[test]
    fn below_minimum_nothing_happens() {
        let settings = Settings::default();
        let s = set(PhrasesetStatus::Voting, 2, Some(at(0)), None);
        assert_eq!(
            vote_action(&s, &settings, at(24 * 60 * 60)),
            VoteAction::Nothing
        );
    }

    #[test]
    fn finalized_sets_are_left_alone() {
        let settings = Settings::default();
        let s = set(PhrasesetStatus::Finalized, 50, Some(at(0)), None);
        assert_eq!(vote_action(&s, &settings, at(9999)), VoteAction::Nothing);
    }
}
