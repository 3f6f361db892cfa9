use crate::AiRole;
use crate::ContentCache;
use crate::get_or_create_ai_player;
use pf_core::GameResult;
use pf_core::ID;
use pf_database::Database;
use pf_engine::CoordinatorContext;
use pf_engine::IrEngine;
use pf_engine::RoundEngine;
use pf_records::BackronymRepository;
use pf_records::BackronymSet;
use pf_records::PhrasesetRepository;
use pf_records::PhrasesetStatus;
use pf_records::Player;
use pf_records::RoundRepository;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use tokio_postgres::GenericClient;

/// Tally of one backup cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackupStats {
    pub copies_submitted: usize,
    pub votes_submitted: usize,
    pub entries_generated: usize,
    pub errors: usize,
}

/// Stall-driven QF backup: completes waiting prompts with AI copies and
/// quiet phrasesets with AI votes. Each item is its own unit of work, so
/// one failure leaves the rest of the batch intact.
pub struct QfBackupOrchestrator {
    ctx: Arc<CoordinatorContext>,
    database: Database,
    cache: Arc<ContentCache>,
}

impl QfBackupOrchestrator {
    pub fn new(
        ctx: Arc<CoordinatorContext>,
        database: Database,
        cache: Arc<ContentCache>,
    ) -> Self {
        Self {
            ctx,
            database,
            cache,
        }
    }

    fn cutoff(&self) -> SystemTime {
        self.ctx.now() - Duration::from_secs(self.ctx.settings.ai_backup_delay_minutes * 60)
    }

    pub async fn run_backup_cycle(&self) -> GameResult<BackupStats> {
        let mut stats = BackupStats::default();
        let batch = self.ctx.settings.ai_backup_batch_size as i64;
        let mut db = self.database.session().await?;
        let engine = RoundEngine::new(self.ctx.clone());

        // Pass 1: prompts waiting too long for copies, FIFO. Each item is
        // its own transaction so one failure leaves the rest intact.
        let stalled = db.stalled_prompt_rounds(self.cutoff(), batch).await?;
        log::info!("[qf backup] {} stalled prompt(s)", stalled.len());
        for prompt_round in stalled {
            let tx = db.transaction().await?;
            match self.backup_copy(&tx, &engine, prompt_round.round_id).await {
                Ok(done) => {
                    tx.commit().await?;
                    if done {
                        stats.copies_submitted += 1;
                    }
                }
                Err(error) => {
                    log::error!(
                        "[qf backup] copy for {} failed: {}",
                        prompt_round.round_id,
                        error
                    );
                    stats.errors += 1;
                }
            }
        }

        // Pass 2: phrasesets short of the minimum vote threshold.
        let minimum = self.ctx.settings.vote_minimum_threshold;
        let voting = db.phrasesets_in_status(PhrasesetStatus::Voting).await?;
        let quiet: Vec<_> = voting
            .into_iter()
            .filter(|set| set.vote_count < minimum)
            .filter(|set| set.voting_started_at.is_some_and(|at| at <= self.cutoff()))
            .take(self.ctx.settings.ai_backup_batch_size)
            .collect();
        log::info!("[qf backup] {} quiet phraseset(s)", quiet.len());
        for set in quiet {
            let tx = db.transaction().await?;
            match self.backup_vote(&tx, &engine, set.phraseset_id).await {
                Ok(done) => {
                    tx.commit().await?;
                    if done {
                        stats.votes_submitted += 1;
                    }
                }
                Err(error) => {
                    log::error!(
                        "[qf backup] vote for {} failed: {}",
                        set.phraseset_id,
                        error
                    );
                    stats.errors += 1;
                }
            }
        }
        log::info!(
            "[qf backup] cycle done: {} copies, {} votes, {} error(s)",
            stats.copies_submitted,
            stats.votes_submitted,
            stats.errors
        );
        Ok(stats)
    }

    /// One AI copy on a stalled prompt. Skips prompts that already filled.
    async fn backup_copy<C: GenericClient + Sync>(
        &self,
        db: &C,
        engine: &RoundEngine,
        prompt_round_id: ID<pf_records::Round>,
    ) -> GameResult<bool> {
        let Some(prompt_round) = db.round(prompt_round_id).await? else {
            return Ok(false);
        };
        let copies = db.submitted_copies(prompt_round_id).await?;
        if copies.len() >= 2 {
            return Ok(false);
        }
        // Never the author, never an account that already copied this one.
        let mut excluded: Vec<ID<Player>> = vec![prompt_round.player_id];
        excluded.extend(copies.iter().map(|c| c.player_id));
        let ai_player = get_or_create_ai_player(
            db,
            AiRole::QfImpostor,
            &self.ctx.settings,
            &excluded,
            self.ctx.now(),
        )
        .await?;
        let round = engine
            .start_copy_round(db, &ai_player, Some(prompt_round_id), None)
            .await?;
        let phrase = self.cache.consume_impostor_phrase(db, &prompt_round).await?;
        engine
            .submit_copy(db, round.round_id, &phrase, &ai_player)
            .await?;
        log::info!(
            "[qf backup] {} copied prompt {} with {:?}",
            ai_player.username,
            prompt_round_id,
            phrase
        );
        Ok(true)
    }

    /// One AI vote on a quiet phraseset.
    async fn backup_vote<C: GenericClient + Sync>(
        &self,
        db: &C,
        engine: &RoundEngine,
        phraseset_id: ID<pf_records::Phraseset>,
    ) -> GameResult<bool> {
        let Some(set) = db.phraseset(phraseset_id).await? else {
            return Ok(false);
        };
        let mut excluded: Vec<ID<Player>> = Vec::new();
        for round_id in set.contributor_rounds() {
            if let Some(round) = db.round(round_id).await? {
                excluded.push(round.player_id);
            }
        }
        excluded.extend(db.votes_for(phraseset_id).await?.iter().map(|v| v.player_id));
        let ai_player = get_or_create_ai_player(
            db,
            AiRole::QfVoter,
            &self.ctx.settings,
            &excluded,
            self.ctx.now(),
        )
        .await?;
        let seed = u64::from_le_bytes(
            ai_player.player_id.inner().into_bytes()[..8]
                .try_into()
                .expect("uuid has 16 bytes"),
        );
        let chosen = self.cache.generate_vote_choice(&set, seed).await?;
        let (round, _set) = engine
            .start_vote_round(db, &ai_player, Some(phraseset_id), None)
            .await?;
        engine
            .submit_vote(db, round.round_id, phraseset_id, &chosen, &ai_player)
            .await?;
        log::info!(
            "[qf backup] {} voted on {} for {:?}",
            ai_player.username,
            phraseset_id,
            chosen
        );
        Ok(true)
    }
}

/// Stall-driven IR backup: fills abandoned open sets with AI entries and
/// stalled voting sets with AI votes, one fresh AI account per action so no
/// account ever double-acts on a set.
pub struct IrBackupOrchestrator {
    ctx: Arc<CoordinatorContext>,
    database: Database,
    cache: Arc<ContentCache>,
}

impl IrBackupOrchestrator {
    pub fn new(
        ctx: Arc<CoordinatorContext>,
        database: Database,
        cache: Arc<ContentCache>,
    ) -> Self {
        Self {
            ctx,
            database,
            cache,
        }
    }

    fn cutoff(&self) -> SystemTime {
        self.ctx.now() - Duration::from_secs(self.ctx.settings.ir_ai_backup_delay_minutes * 60)
    }

    pub async fn run_backup_cycle(&self) -> GameResult<BackupStats> {
        let mut stats = BackupStats::default();
        let mut db = self.database.session().await?;
        let ir = IrEngine::new(self.ctx.clone());

        let stalled_open = db.stalled_open_sets(self.cutoff()).await?;
        log::info!("[ir backup] {} stalled open set(s)", stalled_open.len());
        for set in stalled_open {
            if let Err(error) = self.fill_entries(&mut db, &ir, &set, &mut stats).await {
                log::error!("[ir backup] filling set {} failed: {}", set.set_id, error);
                stats.errors += 1;
            }
        }

        let stalled_voting = db.stalled_voting_sets(self.cutoff()).await?;
        log::info!("[ir backup] {} stalled voting set(s)", stalled_voting.len());
        for set in stalled_voting {
            if let Err(error) = self.fill_votes(&mut db, &ir, &set, &mut stats).await {
                log::error!("[ir backup] voting set {} failed: {}", set.set_id, error);
                stats.errors += 1;
            }
        }
        log::info!(
            "[ir backup] cycle done: {} entries, {} votes, {} error(s)",
            stats.entries_generated,
            stats.votes_submitted,
            stats.errors
        );
        Ok(stats)
    }

    /// Each generated entry commits on its own, so a provider failure
    /// midway leaves the set consistent and shorter, not torn.
    async fn fill_entries(
        &self,
        db: &mut tokio_postgres::Client,
        ir: &IrEngine,
        set: &BackronymSet,
        stats: &mut BackupStats,
    ) -> GameResult<()> {
        loop {
            let Some(current) = db.set(set.set_id).await? else {
                return Ok(());
            };
            if current.entry_count >= 5 {
                return Ok(());
            }
            let taken: Vec<ID<Player>> = db
                .entries(set.set_id)
                .await?
                .iter()
                .map(|e| e.player_id)
                .collect();
            let words = self.cache.generate_backronym(&current.word).await?;
            let tx = db.transaction().await?;
            let ai_player = get_or_create_ai_player(
                &tx,
                AiRole::IrPlayer,
                &self.ctx.settings,
                &taken,
                self.ctx.now(),
            )
            .await?;
            let entry = ir
                .add_entry(&tx, set.set_id, &ai_player, words, true)
                .await?;
            tx.commit().await?;
            stats.entries_generated += 1;
            log::info!("[ir backup] entry {} added to {}", entry.entry_id, set.set_id);
        }
    }

    async fn fill_votes(
        &self,
        db: &mut tokio_postgres::Client,
        ir: &IrEngine,
        set: &BackronymSet,
        stats: &mut BackupStats,
    ) -> GameResult<()> {
        let entries = db.entries(set.set_id).await?;
        if entries.len() < 5 {
            log::warn!("[ir backup] set {} has under 5 entries, skipping", set.set_id);
            return Ok(());
        }
        loop {
            let Some(current) = db.set(set.set_id).await? else {
                return Ok(());
            };
            if current.status != pf_records::SetStatus::Voting || current.vote_count >= 5 {
                return Ok(());
            }
            let voted: Vec<ID<Player>> = db
                .set_votes(set.set_id)
                .await?
                .iter()
                .map(|v| v.player_id)
                .collect();
            let texts: Vec<Vec<String>> =
                entries.iter().map(|e| e.backronym_text.clone()).collect();
            let choice = self.cache.generate_backronym_vote(&current.word, &texts).await?;
            let chosen_entry = entries[choice].entry_id;
            let tx = db.transaction().await?;
            let ai_player = get_or_create_ai_player(
                &tx,
                AiRole::IrPlayer,
                &self.ctx.settings,
                &voted,
                self.ctx.now(),
            )
            .await?;
            ir.add_vote(&tx, set.set_id, &ai_player, chosen_entry, true)
                .await?;
            tx.commit().await?;
            stats.votes_submitted += 1;
            log::info!("[ir backup] vote added to {}", set.set_id);
        }
    }
}
