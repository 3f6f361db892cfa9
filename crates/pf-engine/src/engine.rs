use crate::CoordinatorContext;
use crate::GameRules;
use crate::WorkMatcher;
use crate::plan_phraseset_payout;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::GameType;
use pf_core::ID;
use pf_core::RoundType;
use pf_ledger::Ledger;
use pf_records::PartySession;
use pf_records::Phraseset;
use pf_records::PhrasesetRepository;
use pf_records::PhrasesetStatus;
use pf_records::Player;
use pf_records::PlayerRepository;
use pf_records::Round;
use pf_records::RoundRepository;
use pf_records::RoundStatus;
use pf_records::Vote;
use pf_records::kind;
use pf_sync::LockName;
use pf_sync::PHRASESET_QUEUE;
use pf_sync::PROMPT_QUEUE;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::GenericClient;

/// What a successful submission produced beyond the round itself.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub round: Round,
    /// Set when this copy completed a phraseset.
    pub phraseset_created: Option<ID<Phraseset>>,
    /// True when this was the first human copy on its prompt, the moment
    /// the impostor cache must be revalidated.
    pub first_copy: bool,
    /// For votes: whether the voter found the original.
    pub correct: Option<bool>,
    /// True when the round was already submitted and this call changed
    /// nothing; callers must not count it as new progress.
    pub repeated: bool,
}

impl SubmitOutcome {
    fn repeat(round: Round) -> Self {
        Self {
            round,
            phraseset_created: None,
            first_copy: false,
            correct: None,
            repeated: true,
        }
    }
}

/// QF round lifecycle. Each operation serializes on the owning player's
/// lock and performs its money movement inside the caller's unit of work.
pub struct RoundEngine {
    ctx: Arc<CoordinatorContext>,
    rules: GameRules,
    matcher: WorkMatcher,
}

impl RoundEngine {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        let rules = GameRules::qf(&ctx.settings);
        let matcher = WorkMatcher::new(ctx.clone());
        Self {
            ctx,
            rules,
            matcher,
        }
    }
    pub fn rules(&self) -> &GameRules {
        &self.rules
    }
    pub fn matcher(&self) -> &WorkMatcher {
        &self.matcher
    }

    fn compose(
        &self,
        player: ID<Player>,
        round_type: RoundType,
        cost: pf_core::Coins,
        prompt_text: String,
        prompt_round_id: Option<ID<Round>>,
    ) -> Round {
        let now = self.ctx.now();
        Round {
            round_id: ID::default(),
            player_id: player,
            game: GameType::Qf,
            round_type,
            status: RoundStatus::Active,
            cost,
            created_at: now,
            expires_at: now + self.rules.ttl(round_type),
            prompt_text,
            submitted_phrase: None,
            copy_phrase: None,
            chosen_phrase: None,
            prompt_round_id,
            phraseset_id: None,
        }
    }

    async fn guard_no_active<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: ID<Player>,
    ) -> GameResult<()> {
        match db.active_round(player, GameType::Qf).await? {
            Some(_) => Err(GameError::AlreadyInRound),
            None => Ok(()),
        }
    }

    /// Start a prompt round: debit, compose, persist.
    pub async fn start_prompt_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: &Player,
    ) -> GameResult<Round> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        self.guard_no_active(db, player.player_id).await?;

        let cap = if player.is_guest {
            self.ctx.settings.guest_max_outstanding_quips
        } else {
            self.ctx.settings.max_outstanding_quips
        };
        if db.outstanding_prompts(player.player_id).await? >= cap {
            return Err(GameError::OutstandingLimit);
        }

        let prompt_text = self.ctx.prompts.random_prompt().await?;
        let round = self.compose(
            player.player_id,
            RoundType::Prompt,
            self.rules.prompt_cost,
            prompt_text,
            None,
        );
        db.debit_wallet(
            player.player_id,
            GameType::Qf,
            round.cost,
            kind::PROMPT_ENTRY,
            Some(round.round_id.inner()),
            self.ctx.now(),
        )
        .await?;
        db.insert_round(&round).await?;
        log::info!(
            "[rounds] {} started prompt round {}",
            player.player_id,
            round.round_id
        );
        Ok(round)
    }

    /// Start a copy round against a matched (or forced) prompt round.
    pub async fn start_copy_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: &Player,
        forced_prompt: Option<ID<Round>>,
        party: Option<ID<PartySession>>,
    ) -> GameResult<Round> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        self.guard_no_active(db, player.player_id).await?;

        let prompt_round = match forced_prompt {
            Some(id) => db.round(id).await?.ok_or(GameError::RoundNotFound)?,
            None => {
                let (round, _from_queue) = self
                    .matcher
                    .pick_prompt_for_copy(db, player.player_id, party)
                    .await?;
                round
            }
        };
        if prompt_round.status != RoundStatus::Submitted {
            return Err(GameError::NoEligibleWork);
        }

        let depth = self.ctx.queues.len(PROMPT_QUEUE).await;
        let cost = self.rules.copy_cost(depth);
        let round = self.compose(
            player.player_id,
            RoundType::Copy,
            cost,
            prompt_round.prompt_text.clone(),
            Some(prompt_round.round_id),
        );
        db.debit_wallet(
            player.player_id,
            GameType::Qf,
            cost,
            kind::COPY_ENTRY,
            Some(round.round_id.inner()),
            self.ctx.now(),
        )
        .await?;
        db.insert_round(&round).await?;
        log::info!(
            "[rounds] {} started copy round {} on prompt {}",
            player.player_id,
            round.round_id,
            prompt_round.round_id
        );
        Ok(round)
    }

    /// Start a vote round against a matched (or forced) phraseset.
    pub async fn start_vote_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: &Player,
        forced_phraseset: Option<ID<Phraseset>>,
        party: Option<ID<PartySession>>,
    ) -> GameResult<(Round, Phraseset)> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        self.guard_no_active(db, player.player_id).await?;

        if player.is_guest {
            if let Some(data) = db.game_data(player.player_id, GameType::Qf).await? {
                if let Some(until) = data.vote_lockout_until {
                    if until > self.ctx.now() {
                        return Err(GameError::VoteLockout);
                    }
                }
            }
        }

        let phraseset = match forced_phraseset {
            Some(id) => db.phraseset(id).await?.ok_or(GameError::NoEligibleWork)?,
            None => {
                self.matcher
                    .pick_phraseset_for_vote(db, player.player_id, party)
                    .await?
            }
        };
        if db.has_voted_on(player.player_id, phraseset.phraseset_id).await? {
            return Err(GameError::AlreadyVoted);
        }

        let round = self.compose(
            player.player_id,
            RoundType::Vote,
            self.rules.vote_cost,
            phraseset.prompt_text.clone(),
            None,
        );
        db.debit_wallet(
            player.player_id,
            GameType::Qf,
            round.cost,
            kind::VOTE_ENTRY,
            Some(round.round_id.inner()),
            self.ctx.now(),
        )
        .await?;
        db.insert_round(&round).await?;
        Ok((round, phraseset))
    }

    async fn submittable<C: GenericClient + Sync>(
        &self,
        db: &C,
        round_id: ID<Round>,
        player: ID<Player>,
    ) -> GameResult<Result<Round, Round>> {
        let round = db.round(round_id).await?.ok_or(GameError::RoundNotFound)?;
        if round.player_id != player {
            return Err(GameError::Unauthorized);
        }
        // Repeat submits return the existing record unchanged.
        if round.status == RoundStatus::Submitted {
            return Ok(Err(round));
        }
        if round.status != RoundStatus::Active {
            return Err(GameError::RoundNotActive);
        }
        if self.ctx.now() > round.expires_at + self.rules.grace {
            return Err(GameError::RoundExpired);
        }
        Ok(Ok(round))
    }

    /// Submit a prompt phrase. On success the prompt enters the copy queue.
    pub async fn submit_prompt<C: GenericClient + Sync>(
        &self,
        db: &C,
        round_id: ID<Round>,
        phrase: &str,
        player: &Player,
    ) -> GameResult<SubmitOutcome> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        let round = match self.submittable(db, round_id, player.player_id).await? {
            Ok(round) => round,
            Err(done) => return Ok(SubmitOutcome::repeat(done)),
        };
        self.ctx
            .validator
            .validate_prompt_phrase(phrase, &round.prompt_text)
            .await?;
        db.store_prompt_submission(round_id, phrase).await?;
        self.ctx.queues.push(PROMPT_QUEUE, round_id.inner()).await;
        log::info!("[rounds] prompt {} submitted", round_id);
        let mut submitted = round;
        submitted.status = RoundStatus::Submitted;
        submitted.submitted_phrase = Some(phrase.to_string());
        Ok(SubmitOutcome {
            round: submitted,
            phraseset_created: None,
            first_copy: false,
            correct: None,
            repeated: false,
        })
    }

    /// Submit a copy phrase. The second copy on a prompt assembles the
    /// phraseset atomically and moves it into voting.
    pub async fn submit_copy<C: GenericClient + Sync>(
        &self,
        db: &C,
        round_id: ID<Round>,
        phrase: &str,
        player: &Player,
    ) -> GameResult<SubmitOutcome> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        let round = match self.submittable(db, round_id, player.player_id).await? {
            Ok(round) => round,
            Err(done) => return Ok(SubmitOutcome::repeat(done)),
        };
        let prompt_round_id = round.prompt_round_id.ok_or(GameError::RoundNotFound)?;
        let prompt_round = db
            .round(prompt_round_id)
            .await?
            .ok_or(GameError::RoundNotFound)?;
        let original = prompt_round
            .submitted_phrase
            .clone()
            .ok_or(GameError::RoundNotActive)?;
        let existing = db.submitted_copies(prompt_round_id).await?;
        let other_copy = existing.first().and_then(|r| r.copy_phrase.clone());
        self.ctx
            .validator
            .validate_copy(
                phrase,
                &original,
                other_copy.as_deref(),
                Some(&round.prompt_text),
            )
            .await?;
        db.store_copy_submission(round_id, phrase).await?;

        let mut submitted = round.clone();
        submitted.status = RoundStatus::Submitted;
        submitted.copy_phrase = Some(phrase.to_string());

        match existing.len() {
            0 => {
                // First copy: the prompt goes back into rotation for its
                // second copier.
                self.ctx
                    .queues
                    .push(PROMPT_QUEUE, prompt_round_id.inner())
                    .await;
                Ok(SubmitOutcome {
                    round: submitted,
                    phraseset_created: None,
                    first_copy: true,
                    correct: None,
                    repeated: false,
                })
            }
            _ => {
                let first = &existing[0];
                let set = self
                    .assemble_phraseset(db, &prompt_round, first, &submitted, phrase)
                    .await?;
                Ok(SubmitOutcome {
                    round: submitted,
                    phraseset_created: Some(set),
                    first_copy: false,
                    correct: None,
                    repeated: false,
                })
            }
        }
    }

    async fn assemble_phraseset<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt_round: &Round,
        copy1: &Round,
        copy2: &Round,
        copy2_phrase: &str,
    ) -> GameResult<ID<Phraseset>> {
        let now = self.ctx.now();
        let set = Phraseset {
            phraseset_id: ID::default(),
            prompt_round_id: prompt_round.round_id,
            copy_round_1_id: copy1.round_id,
            copy_round_2_id: copy2.round_id,
            prompt_text: prompt_round.prompt_text.clone(),
            original_phrase: prompt_round
                .submitted_phrase
                .clone()
                .unwrap_or_default(),
            copy_phrase_1: copy1.copy_phrase.clone().unwrap_or_default(),
            copy_phrase_2: copy2_phrase.to_string(),
            status: PhrasesetStatus::Voting,
            vote_count: 0,
            original_votes: 0,
            copy1_votes: 0,
            copy2_votes: 0,
            prize_pool: prompt_round.cost + copy1.cost + copy2.cost,
            created_at: now,
            voting_started_at: Some(now),
            closing_started_at: None,
            finalized_at: None,
        };
        db.insert_phraseset(&set).await?;
        for contributor in set.contributor_rounds() {
            db.set_phraseset(contributor, set.phraseset_id).await?;
        }
        self.ctx
            .queues
            .remove(PROMPT_QUEUE, prompt_round.round_id.inner())
            .await;
        self.ctx
            .queues
            .push(PHRASESET_QUEUE, set.phraseset_id.inner())
            .await;
        log::info!(
            "[rounds] phraseset {} assembled (pool {})",
            set.phraseset_id,
            set.prize_pool
        );
        Ok(set.phraseset_id)
    }

    /// Submit a vote: record it, grow the pool, apply correctness effects.
    pub async fn submit_vote<C: GenericClient + Sync>(
        &self,
        db: &C,
        round_id: ID<Round>,
        phraseset_id: ID<Phraseset>,
        chosen: &str,
        player: &Player,
    ) -> GameResult<SubmitOutcome> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        let round = match self.submittable(db, round_id, player.player_id).await? {
            Ok(round) => round,
            Err(done) => return Ok(SubmitOutcome::repeat(done)),
        };
        let set = db
            .phraseset(phraseset_id)
            .await?
            .ok_or(GameError::NoEligibleWork)?;
        if !matches!(
            set.status,
            PhrasesetStatus::Voting | PhrasesetStatus::Closing
        ) {
            return Err(GameError::WrongPhase(set.status.as_str().to_string()));
        }
        let slot = set
            .slot_of(chosen)
            .ok_or_else(|| GameError::InvalidPhrase("not one of the three phrases".into()))?;
        let correct = chosen == set.original_phrase;

        db.store_vote_submission(round_id, chosen, phraseset_id)
            .await?;
        let vote = Vote {
            vote_id: ID::default(),
            phraseset_id,
            round_id,
            player_id: player.player_id,
            voted_phrase: chosen.to_string(),
            correct,
            created_at: self.ctx.now(),
        };
        db.record_vote(&vote, slot).await?;
        // The voter's stake joins the pool it is judging.
        db.add_to_pool(phraseset_id, round.cost).await?;
        self.apply_vote_discipline(db, player, correct).await?;

        let mut submitted = round;
        submitted.status = RoundStatus::Submitted;
        submitted.chosen_phrase = Some(chosen.to_string());
        Ok(SubmitOutcome {
            round: submitted,
            phraseset_created: None,
            first_copy: false,
            correct: Some(correct),
            repeated: false,
        })
    }

    /// Consecutive-incorrect tracking, with guest lockout at the threshold.
    async fn apply_vote_discipline<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: &Player,
        correct: bool,
    ) -> GameResult<()> {
        if correct {
            db.reset_incorrect_votes(player.player_id, GameType::Qf)
                .await?;
            return Ok(());
        }
        let streak = db
            .bump_incorrect_votes(player.player_id, GameType::Qf)
            .await?;
        if player.is_guest && i64::from(streak) >= self.ctx.settings.guest_vote_lockout_threshold {
            let until = self.ctx.now()
                + Duration::from_secs(self.ctx.settings.guest_vote_lockout_hours * 3600);
            db.set_vote_lockout(player.player_id, GameType::Qf, until)
                .await?;
            log::info!(
                "[rounds] guest {} vote-locked after {} misses",
                player.player_id,
                streak
            );
        }
        Ok(())
    }

    /// Abandon an active round with a penalized refund.
    pub async fn abandon_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        round_id: ID<Round>,
        player: &Player,
    ) -> GameResult<Round> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        let round = db.round(round_id).await?.ok_or(GameError::RoundNotFound)?;
        if round.player_id != player.player_id {
            return Err(GameError::Unauthorized);
        }
        if round.status != RoundStatus::Active {
            return Err(GameError::RoundNotActive);
        }
        db.set_status(round_id, RoundStatus::Abandoned).await?;
        let refund = self.rules.abandon_refund(round.cost);
        if refund > 0 {
            db.credit_wallet(
                player.player_id,
                GameType::Qf,
                refund,
                kind::ABANDON_REFUND,
                Some(round_id.inner()),
                self.ctx.now(),
            )
            .await?;
        }
        self.release_work_item(&round).await;
        log::info!("[rounds] {} abandoned (refund {})", round_id, refund);
        let mut abandoned = round;
        abandoned.status = RoundStatus::Abandoned;
        Ok(abandoned)
    }

    /// Drive a round through expiry. Called by the sweeper once the
    /// grace-adjusted deadline has passed; idempotent per round.
    pub async fn expire_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        round: &Round,
    ) -> GameResult<()> {
        let _guard = self.ctx.lock(LockName::player(round.player_id)).await?;
        let Some(current) = db.round(round.round_id).await? else {
            return Ok(());
        };
        if current.status != RoundStatus::Active {
            return Ok(());
        }
        db.set_status(round.round_id, RoundStatus::Expired).await?;
        let refund = self.rules.expiry_refund(round.round_type, round.cost);
        if refund > 0 {
            db.credit_wallet(
                round.player_id,
                GameType::Qf,
                refund,
                kind::EXPIRY_REFUND,
                Some(round.round_id.inner()),
                self.ctx.now(),
            )
            .await?;
        }
        self.release_work_item(round).await;
        log::info!(
            "[rounds] {} expired ({} refund {})",
            round.round_id,
            round.round_type,
            refund
        );
        Ok(())
    }

    /// Return a consumed work item to rotation when its round dies.
    async fn release_work_item(&self, round: &Round) {
        if round.round_type == RoundType::Copy {
            if let Some(prompt) = round.prompt_round_id {
                self.ctx.queues.remove(PROMPT_QUEUE, prompt.inner()).await;
                self.ctx.queues.push(PROMPT_QUEUE, prompt.inner()).await;
            }
        }
    }

    /// Record that a player has seen a finalized phraseset's results. The
    /// first view freezes the payout amount; later reads return it
    /// unchanged.
    pub async fn view_phraseset_results<C: GenericClient + Sync>(
        &self,
        db: &C,
        phraseset_id: ID<Phraseset>,
        player: &Player,
    ) -> GameResult<pf_records::ResultView> {
        use pf_records::ExtrasRepository;
        use pf_records::TransactionRepository;
        let set = db
            .phraseset(phraseset_id)
            .await?
            .ok_or(GameError::NoEligibleWork)?;
        if set.status != PhrasesetStatus::Finalized {
            return Err(GameError::WrongPhase(set.status.as_str().to_string()));
        }
        let payout: pf_core::Coins = db
            .transactions_referencing(&[phraseset_id.inner()])
            .await?
            .iter()
            .filter(|t| t.player_id == player.player_id && t.amount > 0)
            .map(|t| t.amount + t.vault_contribution)
            .sum();
        let view = pf_records::ResultView {
            view_id: ID::default(),
            player_id: player.player_id,
            kind: "phraseset".to_string(),
            content_id: phraseset_id.inner(),
            payout,
            first_viewed_at: self.ctx.now(),
        };
        Ok(db.get_or_create_view(&view).await?)
    }

    /// Finalize a phraseset and distribute its pool. Idempotent: the status
    /// flip is a compare-and-set, so concurrent sweeps settle once.
    pub async fn finalize_phraseset<C: GenericClient + Sync>(
        &self,
        db: &C,
        phraseset_id: ID<Phraseset>,
    ) -> GameResult<bool> {
        let _guard = self
            .ctx
            .lock(LockName::content("phraseset", phraseset_id))
            .await?;
        let now = self.ctx.now();
        if !db.set_finalized(phraseset_id, now).await? {
            return Ok(false);
        }
        let set = db
            .phraseset(phraseset_id)
            .await?
            .ok_or(GameError::NoEligibleWork)?;
        let votes = db.votes_for(phraseset_id).await?;
        let mut authors = Vec::with_capacity(3);
        for round_id in set.contributor_rounds() {
            let round = db.round(round_id).await?.ok_or(GameError::RoundNotFound)?;
            authors.push(round.player_id);
        }
        let plan = plan_phraseset_payout(
            &set,
            &votes,
            [authors[0], authors[1], authors[2]],
            &self.ctx.settings,
        );
        db.process_payout(GameType::Qf, phraseset_id.inner(), &plan.shares, now)
            .await?;
        self.ctx
            .queues
            .remove(PHRASESET_QUEUE, phraseset_id.inner())
            .await;
        log::info!(
            "[rounds] phraseset {} finalized (pool {}, {} share(s))",
            phraseset_id,
            set.prize_pool,
            plan.shares.len()
        );
        Ok(true)
    }
}
