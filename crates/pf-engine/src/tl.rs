use crate::CoordinatorContext;
use pf_core::Coins;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::GameType;
use pf_core::ID;
use pf_core::Settings;
use pf_ledger::Ledger;
use pf_ledger::split_payout;
use pf_matching::Embeddings;
use pf_matching::batch_cosine;
use pf_matching::cluster_weight;
use pf_records::Player;
use pf_records::TlGuess;
use pf_records::TlRepository;
use pf_records::TlRound;
use pf_records::TlRoundStatus;
use pf_records::kind;
use pf_sync::LockName;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_postgres::GenericClient;

/// Gross payout at or under this goes entirely to the wallet; the vault
/// rake applies only above it.
const WALLET_THRESHOLD: Coins = 100;
/// Coverage at which a round auto-completes.
const COVERAGE_COMPLETE: f64 = 0.95;
/// Strikes that end a round.
const MAX_STRIKES: i32 = 3;

/// Convex payout curve: `gross = round(max · p^exponent)`, split into
/// wallet and vault. Returns (wallet, vault, gross).
pub fn tl_payout(coverage: f64, settings: &Settings) -> (Coins, Coins, Coins) {
    let p = coverage.clamp(0.0, 1.0);
    let gross = (settings.tl_max_payout as f64 * p.powf(settings.tl_payout_exponent)).round()
        as Coins;
    let gross = gross.clamp(0, settings.tl_max_payout);
    let (wallet, vault) = split_payout(gross, WALLET_THRESHOLD, settings.tl_vault_rake_percent);
    (wallet, vault, gross)
}

/// What one guess did to the round.
#[derive(Debug, Clone)]
pub struct GuessOutcome {
    pub was_match: bool,
    pub matched_answer_count: usize,
    pub matched_cluster_ids: Vec<uuid::Uuid>,
    pub strikes: i32,
    pub coverage: f64,
    pub status: TlRoundStatus,
    pub gross_payout: Option<Coins>,
}

/// TL guess rounds: snapshot at start, semantic matching per guess, convex
/// payout on completion.
pub struct TlEngine {
    ctx: Arc<CoordinatorContext>,
    embeddings: Arc<Embeddings>,
}

impl TlEngine {
    pub fn new(ctx: Arc<CoordinatorContext>, embeddings: Arc<Embeddings>) -> Self {
        Self { ctx, embeddings }
    }

    /// Start a round: freeze the snapshot, debit the entry cost.
    pub async fn start_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: &Player,
    ) -> GameResult<(TlRound, String)> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        if db.active_tl_round(player.player_id).await?.is_some() {
            return Err(GameError::AlreadyInRound);
        }
        let prompt = db
            .random_active_prompt()
            .await?
            .ok_or(GameError::NoEligibleWork)?;
        let answers = db
            .active_answers(
                prompt.prompt_id,
                self.ctx.settings.tl_active_corpus_cap as i64,
            )
            .await?;
        let snapshot_answer_ids: Vec<uuid::Uuid> =
            answers.iter().map(|a| a.answer_id.inner()).collect();
        let snapshot_cluster_ids: Vec<uuid::Uuid> = answers
            .iter()
            .filter_map(|a| a.cluster_id.map(|id| id.inner()))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let total_weight = cluster_weight(db, &snapshot_cluster_ids).await?;

        let round = TlRound {
            round_id: ID::default(),
            player_id: player.player_id,
            prompt_id: prompt.prompt_id,
            snapshot_answer_ids,
            snapshot_cluster_ids,
            snapshot_total_weight: total_weight,
            matched_clusters: Vec::new(),
            strikes: 0,
            status: TlRoundStatus::Active,
            final_coverage: None,
            gross_payout: None,
            created_at: self.ctx.now(),
            ended_at: None,
        };
        db.debit_wallet(
            player.player_id,
            GameType::Tl,
            self.ctx.settings.tl_entry_cost,
            kind::TL_ROUND_ENTRY,
            Some(round.round_id.inner()),
            self.ctx.now(),
        )
        .await?;
        db.insert_tl_round(&round).await?;
        log::info!(
            "[tl] round {} started ({} answers, weight {:.2})",
            round.round_id,
            round.snapshot_answer_ids.len(),
            total_weight
        );
        Ok((round, prompt.text))
    }

    /// Submit a guess. Validation failures and self-similar guesses cost
    /// nothing; only a clean miss against the snapshot earns a strike.
    pub async fn submit_guess<C: GenericClient + Sync>(
        &self,
        db: &C,
        round_id: ID<TlRound>,
        player: &Player,
        guess_text: &str,
    ) -> GameResult<GuessOutcome> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        let round = db
            .tl_round(round_id)
            .await?
            .ok_or(GameError::RoundNotFound)?;
        if round.player_id != player.player_id {
            return Err(GameError::Unauthorized);
        }
        if round.status != TlRoundStatus::Active {
            return Err(GameError::RoundNotActive);
        }
        let prompt = db
            .prompt(round.prompt_id)
            .await?
            .ok_or(GameError::RoundNotFound)?;

        self.ctx.validator.validate(guess_text).await?;
        self.ctx
            .validator
            .validate_prompt_phrase(guess_text, &prompt.text)
            .await?;

        let now = self.ctx.now();
        let guess_embedding = self.embeddings.embedding(db, guess_text, now).await?;

        // Reject guesses that just rephrase an earlier one.
        let prior = db.guess_texts(round_id).await?;
        if !prior.is_empty() {
            let prior_embeddings = self.embeddings.embeddings(db, &prior, now).await?;
            let max_sim = batch_cosine(&guess_embedding, &prior_embeddings)
                .into_iter()
                .fold(0.0f32, f32::max);
            if max_sim >= self.ctx.settings.tl_self_similarity_threshold {
                return Err(GameError::TooSimilar(format!(
                    "similarity {:.2} to a prior guess (max {:.2})",
                    max_sim, self.ctx.settings.tl_self_similarity_threshold
                )));
            }
        }

        // Match against the frozen snapshot.
        let snapshot = db.answers_by_ids(&round.snapshot_answer_ids).await?;
        let mut matched_answer_ids = Vec::new();
        let mut matched_cluster_ids: HashSet<uuid::Uuid> = HashSet::new();
        for answer in &snapshot {
            let sim = pf_matching::cosine(&guess_embedding, &answer.embedding);
            if sim >= self.ctx.settings.tl_match_threshold {
                matched_answer_ids.push(answer.answer_id.inner());
                if let Some(cluster) = answer.cluster_id {
                    matched_cluster_ids.insert(cluster.inner());
                }
            }
        }
        let was_match = !matched_answer_ids.is_empty();

        let mut matched_clusters: HashSet<uuid::Uuid> =
            round.matched_clusters.iter().copied().collect();
        matched_clusters.extend(matched_cluster_ids.iter().copied());
        let matched_clusters: Vec<uuid::Uuid> = matched_clusters.into_iter().collect();
        let strikes = if was_match {
            round.strikes
        } else {
            round.strikes + 1
        };
        db.update_round_progress(round_id, &matched_clusters, strikes)
            .await?;

        let guess = TlGuess {
            guess_id: ID::default(),
            round_id,
            text: guess_text.to_string(),
            embedding: guess_embedding,
            was_match,
            matched_cluster_ids: matched_cluster_ids.iter().copied().collect(),
            caused_strike: !was_match,
            created_at: now,
        };
        db.insert_guess(&guess).await?;

        let coverage = self.coverage(db, &matched_clusters, round.snapshot_total_weight).await?;
        let mut status = TlRoundStatus::Active;
        let mut gross_payout = None;
        if strikes >= MAX_STRIKES || coverage >= COVERAGE_COMPLETE {
            let gross = self
                .finalize(db, &round, &matched_clusters, coverage)
                .await?;
            status = TlRoundStatus::Completed;
            gross_payout = Some(gross);
        }
        log::info!(
            "[tl] guess on {}: match={} clusters={} strikes={} coverage={:.1}%",
            round_id,
            was_match,
            matched_cluster_ids.len(),
            strikes,
            coverage * 100.0
        );
        Ok(GuessOutcome {
            was_match,
            matched_answer_count: matched_answer_ids.len(),
            matched_cluster_ids: matched_cluster_ids.into_iter().collect(),
            strikes,
            coverage,
            status,
            gross_payout,
        })
    }

    /// Weighted coverage against the frozen snapshot total.
    async fn coverage<C: GenericClient + Sync>(
        &self,
        db: &C,
        matched_clusters: &[uuid::Uuid],
        total_weight: f64,
    ) -> GameResult<f64> {
        if total_weight <= 0.0 {
            return Ok(0.0);
        }
        let matched_weight = cluster_weight(db, matched_clusters).await?;
        Ok((matched_weight / total_weight).clamp(0.0, 1.0))
    }

    async fn finalize<C: GenericClient + Sync>(
        &self,
        db: &C,
        round: &TlRound,
        matched_clusters: &[uuid::Uuid],
        coverage: f64,
    ) -> GameResult<Coins> {
        let (wallet, vault, gross) = tl_payout(coverage, &self.ctx.settings);
        let now = self.ctx.now();
        db.finalize_tl_round(round.round_id, coverage, gross, now)
            .await?;
        if wallet > 0 {
            db.credit_wallet(
                round.player_id,
                GameType::Tl,
                wallet,
                kind::TL_PAYOUT_WALLET,
                Some(round.round_id.inner()),
                now,
            )
            .await?;
        }
        if vault > 0 {
            db.credit_vault(
                round.player_id,
                GameType::Tl,
                vault,
                kind::TL_PAYOUT_VAULT,
                Some(round.round_id.inner()),
                now,
            )
            .await?;
        }
        // Snapshot answers were shown; matched ones earned their keep.
        db.increment_shows(&round.snapshot_answer_ids).await?;
        if !matched_clusters.is_empty() {
            db.increment_contributed(&round.snapshot_answer_ids, matched_clusters)
                .await?;
        }
        log::info!(
            "[tl] round {} finalized: coverage {:.1}%, gross {}, wallet {}, vault {}",
            round.round_id,
            coverage * 100.0,
            gross,
            wallet,
            vault
        );
        Ok(gross)
    }

    /// Abandon an untouched round with a penalized refund. Rounds with any
    /// guess on record cannot be abandoned.
    pub async fn abandon_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        round_id: ID<TlRound>,
        player: &Player,
    ) -> GameResult<Coins> {
        let _guard = self.ctx.lock(LockName::player(player.player_id)).await?;
        let round = db
            .tl_round(round_id)
            .await?
            .ok_or(GameError::RoundNotFound)?;
        if round.player_id != player.player_id {
            return Err(GameError::Unauthorized);
        }
        if round.status != TlRoundStatus::Active {
            return Err(GameError::RoundNotActive);
        }
        if db.guess_count(round_id).await? > 0 {
            return Err(GameError::RoundHasGuesses);
        }
        let refund =
            (self.ctx.settings.tl_entry_cost - self.ctx.settings.abandoned_penalty).max(0);
        db.abandon_tl_round(round_id, self.ctx.now()).await?;
        if refund > 0 {
            db.credit_wallet(
                player.player_id,
                GameType::Tl,
                refund,
                kind::ABANDON_REFUND,
                Some(round_id.inner()),
                self.ctx.now(),
            )
            .await?;
        }
        log::info!("[tl] round {} abandoned (refund {})", round_id, refund);
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payout_at_exactly_half_coverage() {
        let settings = Settings::default();
        let (wallet, vault, gross) = tl_payout(0.5, &settings);
        assert_eq!(gross, 106);
        assert_eq!(wallet, 105);
        assert_eq!(vault, 1);
    }

    #[test]
    fn payout_bounds() {
        let settings = Settings::default();
        assert_eq!(tl_payout(0.0, &settings), (0, 0, 0));
        let (wallet, vault, gross) = tl_payout(1.0, &settings);
        assert_eq!(gross, 300);
        assert_eq!(vault, 60);
        assert_eq!(wallet, 240);
        // out-of-range coverage clamps rather than overflowing the curve
        assert_eq!(tl_payout(1.5, &settings).2, 300);
        assert_eq!(tl_payout(-0.5, &settings).2, 0);
    }

    #[test]
    fn small_payouts_skip_the_vault() {
        let settings = Settings::default();
        // coverage 0.45 -> gross round(300 * 0.45^1.5) = 91
        let (wallet, vault, gross) = tl_payout(0.45, &settings);
        assert_eq!(gross, 91);
        assert_eq!(wallet, 91);
        assert_eq!(vault, 0);
    }
}
