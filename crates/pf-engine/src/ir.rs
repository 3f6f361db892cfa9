use crate::CoordinatorContext;
use crate::WorkMatcher;
use crate::plan_set_payout;
use pf_core::Coins;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::GameType;
use pf_core::ID;
use pf_ledger::Ledger;
use pf_records::BackronymEntry;
use pf_records::BackronymRepository;
use pf_records::BackronymSet;
use pf_records::BackronymVote;
use pf_records::ExtrasRepository;
use pf_records::IrMode;
use pf_records::Player;
use pf_records::ResultView;
use pf_records::SetStatus;
use pf_records::TransactionRepository;
use pf_records::kind;
use pf_sync::IR_ENTRY_QUEUE;
use pf_sync::IR_VOTING_QUEUE;
use pf_sync::LockName;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::GenericClient;

/// Words eligible for backronym races: 3 to 5 letters, concrete, shoutable.
const WORDS: &[&str] = &[
    "FROG", "CAT", "DOG", "MOON", "STAR", "CAKE", "FISH", "BIRD", "SNOW", "RAIN", "WOLF", "BEAR",
    "DUCK", "GOAT", "LION", "CRAB", "TOAD", "NEWT", "MOLE", "HAWK", "SWAN", "DEER", "SEAL",
    "SODA", "TACO", "SOUP", "CORN", "PLUM", "PEAR", "LIME", "MINT", "KALE", "BEAN", "RICE",
    "LAMP", "SOCK", "BOOT", "RING", "DRUM", "HARP", "KITE", "RAFT", "TENT", "FORK", "MAPS",
    "GEM", "FOG", "ICE", "SKY", "SUN", "OWL", "BEE", "ANT", "EEL", "JAM", "INK", "HAT", "BUS",
    "TRAIN", "SPOON", "CLOUD", "STORM", "PLANT", "BREAD", "CHAIR", "PIANO", "ROBOT", "TIGER",
];

/// How many votes non-participants may add per set.
const NON_PARTICIPANT_VOTE_CAP: i32 = 5;

/// IR backronym set lifecycle: creation, entries, voting, finalization.
/// Sets fill to five entries, vote to five participant votes, and settle
/// through the same ledger path as every other game.
pub struct IrEngine {
    ctx: Arc<CoordinatorContext>,
    matcher: WorkMatcher,
}

impl IrEngine {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        let matcher = WorkMatcher::new(ctx.clone());
        Self { ctx, matcher }
    }

    /// Pick a word not used by any set in the last 30 minutes.
    async fn random_word<C: GenericClient + Sync>(&self, db: &C) -> GameResult<String> {
        use rand::seq::IndexedRandom;
        let cutoff = self.ctx.now() - Duration::from_secs(30 * 60);
        for _ in 0..32 {
            let word = WORDS
                .choose(&mut rand::rng())
                .copied()
                .unwrap_or("FROG")
                .to_string();
            if !db.word_used_since(&word, cutoff).await? {
                return Ok(word);
            }
        }
        // Every word was recent; reuse is better than refusing a game.
        Ok(WORDS[0].to_string())
    }

    /// Create a fresh open set and enqueue it for entries.
    pub async fn create_set<C: GenericClient + Sync>(
        &self,
        db: &C,
        mode: IrMode,
    ) -> GameResult<BackronymSet> {
        let word = self.random_word(db).await?;
        let set = BackronymSet::new(word.clone(), mode, self.ctx.now());
        db.insert_set(&set).await?;
        db.record_word_usage(&word, set.set_id, self.ctx.now())
            .await?;
        self.ctx
            .queues
            .push(IR_ENTRY_QUEUE, set.set_id.inner())
            .await;
        log::info!("[ir] created set {} with word {}", set.set_id, word);
        Ok(set)
    }

    /// Join the most recent open set with room, or start a new one.
    pub async fn join_set<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: &Player,
        mode: IrMode,
    ) -> GameResult<BackronymSet> {
        match self.matcher.pick_backronym_set(db, player.player_id).await? {
            Some(set) => Ok(set),
            None => self.create_set(db, mode).await,
        }
    }

    /// Add a backronym entry. Humans pay the entry cost; slot claims are
    /// compare-and-update so the set can never exceed five entries.
    pub async fn add_entry<C: GenericClient + Sync>(
        &self,
        db: &C,
        set_id: ID<BackronymSet>,
        player: &Player,
        words: Vec<String>,
        is_ai: bool,
    ) -> GameResult<BackronymEntry> {
        let _guard = self.ctx.lock(LockName::content("set", set_id)).await?;
        let set = db.set(set_id).await?.ok_or(GameError::SetNotFound)?;
        if set.status != SetStatus::Open {
            return Err(GameError::SetNotOpen);
        }
        if db.has_entry(set_id, player.player_id).await? {
            return Err(GameError::AlreadySubmitted);
        }
        self.ctx
            .validator
            .validate_backronym_words(&words, &set.word)
            .await?;
        if !is_ai {
            db.debit_wallet(
                player.player_id,
                GameType::Ir,
                self.ctx.settings.ir_backronym_entry_cost,
                kind::IR_ENTRY,
                Some(set_id.inner()),
                self.ctx.now(),
            )
            .await?;
        }
        if !db.claim_entry_slot(set_id).await? {
            return Err(GameError::SetNotOpen);
        }
        let now = self.ctx.now();
        let entry = BackronymEntry {
            entry_id: ID::default(),
            set_id,
            player_id: player.player_id,
            backronym_text: words,
            is_ai,
            received_votes: 0,
            submitted_at: now,
        };
        db.insert_entry(&entry).await?;
        let voting_timer = (!is_ai && set.mode == IrMode::Rapid).then(|| {
            now + Duration::from_secs(self.ctx.settings.ir_rapid_entry_timer_minutes * 60)
        });
        let first_join = !is_ai && set.first_participant_joined_at.is_none();
        db.record_entry_effects(set_id, !is_ai, now, first_join, voting_timer)
            .await?;
        log::info!(
            "[ir] entry {} added to set {} ({}/5)",
            entry.entry_id,
            set_id,
            set.entry_count + 1
        );
        if set.entry_count + 1 >= 5 {
            self.transition_to_voting(db, set_id).await?;
        }
        Ok(entry)
    }

    /// Flip an open set into its voting window. Idempotent.
    pub async fn transition_to_voting<C: GenericClient + Sync>(
        &self,
        db: &C,
        set_id: ID<BackronymSet>,
    ) -> GameResult<bool> {
        let set = db.set(set_id).await?.ok_or(GameError::SetNotFound)?;
        let minutes = match set.mode {
            IrMode::Rapid => self.ctx.settings.ir_rapid_voting_timer_minutes,
            IrMode::Standard => self.ctx.settings.ir_standard_voting_timer_minutes,
        };
        let deadline = self.ctx.now() + Duration::from_secs(minutes * 60);
        let flipped = db.set_voting_status(set_id, deadline).await?;
        if flipped {
            self.ctx
                .queues
                .remove(IR_ENTRY_QUEUE, set_id.inner())
                .await;
            self.ctx
                .queues
                .push(IR_VOTING_QUEUE, set_id.inner())
                .await;
            log::info!("[ir] set {} entered voting", set_id);
        }
        Ok(flipped)
    }

    /// Cast a vote. Non-participant humans stake the vote cost in the same
    /// unit of work; participant votes are free and drive finalization.
    pub async fn add_vote<C: GenericClient + Sync>(
        &self,
        db: &C,
        set_id: ID<BackronymSet>,
        player: &Player,
        chosen_entry: ID<BackronymEntry>,
        is_ai: bool,
    ) -> GameResult<BackronymVote> {
        let _guard = self.ctx.lock(LockName::content("set", set_id)).await?;
        let set = db.set(set_id).await?.ok_or(GameError::SetNotFound)?;
        if set.status != SetStatus::Voting {
            return Err(GameError::SetNotVoting);
        }
        if db.has_set_vote(set_id, player.player_id).await? {
            return Err(GameError::AlreadyVoted);
        }
        let is_participant = db.has_entry(set_id, player.player_id).await?;
        // The outsider cap gates humans; AI backup votes fill past it so a
        // stalled set can still reach its quorum.
        if !is_participant && !is_ai && set.non_participant_vote_count >= NON_PARTICIPANT_VOTE_CAP {
            return Err(GameError::NoEligibleWork);
        }
        if !is_participant && !is_ai {
            db.debit_wallet(
                player.player_id,
                GameType::Ir,
                self.ctx.settings.ir_vote_cost,
                kind::IR_VOTE_ENTRY,
                Some(set_id.inner()),
                self.ctx.now(),
            )
            .await?;
        }
        let vote = BackronymVote {
            vote_id: ID::default(),
            set_id,
            player_id: player.player_id,
            chosen_entry_id: chosen_entry,
            is_participant_voter: is_participant,
            is_ai,
            created_at: self.ctx.now(),
        };
        db.insert_set_vote(&vote).await?;
        db.record_vote_effects(set_id, chosen_entry, !is_ai, is_participant, self.ctx.now())
            .await?;

        // All five creators voting finalizes immediately; outside votes are
        // welcome but never required.
        let participant_votes = db
            .set_votes(set_id)
            .await?
            .iter()
            .filter(|v| v.is_participant_voter)
            .count();
        if participant_votes >= 5 {
            self.finalize_set(db, set_id).await?;
        }
        Ok(vote)
    }

    /// Finalize a voting set and settle the pool. Idempotent: the status
    /// flip is compare-and-set, repeat calls are no-ops.
    pub async fn finalize_set<C: GenericClient + Sync>(
        &self,
        db: &C,
        set_id: ID<BackronymSet>,
    ) -> GameResult<bool> {
        if !db.set_finalized_status(set_id, self.ctx.now()).await? {
            return Ok(false);
        }
        let entries = db.entries(set_id).await?;
        let votes = db.set_votes(set_id).await?;
        let plan = plan_set_payout(&entries, &votes, &self.ctx.settings);
        db.process_payout(
            GameType::Ir,
            set_id.inner(),
            &plan.shares,
            self.ctx.now(),
        )
        .await?;
        self.ctx
            .queues
            .remove(IR_VOTING_QUEUE, set_id.inner())
            .await;
        log::info!(
            "[ir] set {} finalized (pool {}, {} share(s))",
            set_id,
            plan.pool,
            plan.shares.len()
        );
        Ok(true)
    }

    /// Record that a player has seen a finalized set's results. The first
    /// view freezes the payout amount; later reads return it unchanged.
    pub async fn view_results<C: GenericClient + Sync>(
        &self,
        db: &C,
        set_id: ID<BackronymSet>,
        player: &Player,
    ) -> GameResult<ResultView> {
        let set = db.set(set_id).await?.ok_or(GameError::SetNotFound)?;
        if set.status != SetStatus::Finalized {
            return Err(GameError::SetNotVoting);
        }
        let payout: Coins = db
            .transactions_referencing(&[set_id.inner()])
            .await?
            .iter()
            .filter(|t| t.player_id == player.player_id && t.amount > 0)
            .map(|t| t.amount + t.vault_contribution)
            .sum();
        let view = ResultView {
            view_id: ID::default(),
            player_id: player.player_id,
            kind: "backronym_set".to_string(),
            content_id: set_id.inner(),
            payout,
            first_viewed_at: self.ctx.now(),
        };
        Ok(db.get_or_create_view(&view).await?)
    }
}
