use crate::CoordinatorContext;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::ID;
use pf_core::RoundType;
use pf_records::BackronymRepository;
use pf_records::BackronymSet;
use pf_records::PartyPhase;
use pf_records::PartyRepository;
use pf_records::PartySession;
use pf_records::Phraseset;
use pf_records::PhrasesetRepository;
use pf_records::PhrasesetStatus;
use pf_records::Player;
use pf_records::Round;
use pf_records::RoundRepository;
use pf_records::RoundStatus;
use pf_sync::PHRASESET_QUEUE;
use pf_sync::PROMPT_QUEUE;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::GenericClient;

/// Picks the next eligible work item for a player, honoring exclusion
/// rules. Party sources win over the global queues; queue scans hold
/// ineligible items aside and requeue them in their original order.
pub struct WorkMatcher {
    ctx: Arc<CoordinatorContext>,
}

impl WorkMatcher {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        Self { ctx }
    }

    /// Prompt-round ids this player must not copy.
    async fn copy_exclusions<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: ID<Player>,
    ) -> GameResult<HashSet<uuid::Uuid>> {
        let mut excluded: HashSet<uuid::Uuid> = db
            .prompts_copied_by(player)
            .await?
            .into_iter()
            .map(|id| id.inner())
            .collect();
        let cooldown =
            Duration::from_secs(self.ctx.settings.abandoned_prompt_cooldown_hours * 3600);
        let cutoff = self.ctx.now() - cooldown;
        for id in db.prompts_abandoned_by(player, cutoff).await? {
            excluded.insert(id.inner());
        }
        Ok(excluded)
    }

    /// Pick a prompt round for the player to copy. Returns the prompt round
    /// and whether it was consumed from the global queue (and must be
    /// requeued if the copy never completes).
    pub async fn pick_prompt_for_copy<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: ID<Player>,
        party: Option<ID<PartySession>>,
    ) -> GameResult<(Round, bool)> {
        let excluded = self.copy_exclusions(db, player).await?;

        // Party prompts first, in creation order.
        let mut party_players: HashSet<uuid::Uuid> = HashSet::new();
        if let Some(session_id) = party {
            let session = db
                .party_session(session_id)
                .await?
                .ok_or(GameError::SessionNotFound)?;
            for participant in db.participants(session_id).await? {
                party_players.insert(participant.player_id.inner());
            }
            if session.current_phase == PartyPhase::Copy {
                if let Some(found) = self
                    .party_prompt(db, &session, player, &excluded)
                    .await?
                {
                    return Ok((found, false));
                }
            }
        }

        // Global queue fallback: hold ineligible items aside, requeue them
        // in original order once the scan resolves.
        let queues = &self.ctx.queues;
        let mut held: Vec<uuid::Uuid> = Vec::new();
        let mut found: Option<Round> = None;
        let depth = queues.len(PROMPT_QUEUE).await;
        for _ in 0..depth {
            let Some(item) = queues.pop(PROMPT_QUEUE).await else {
                break;
            };
            let Some(round) = db.round(ID::from(item)).await? else {
                continue;
            };
            if round.round_type != RoundType::Prompt {
                continue;
            }
            if round.status != RoundStatus::Submitted {
                continue;
            }
            if round.player_id == player
                || party_players.contains(&round.player_id.inner())
                || excluded.contains(&item)
            {
                held.push(item);
                continue;
            }
            found = Some(round);
            break;
        }
        for item in held {
            queues.push(PROMPT_QUEUE, item).await;
        }
        match found {
            Some(round) => Ok((round, true)),
            None => Err(GameError::NoEligibleWork),
        }
    }

    async fn party_prompt<C: GenericClient + Sync>(
        &self,
        db: &C,
        session: &PartySession,
        player: ID<Player>,
        excluded: &HashSet<uuid::Uuid>,
    ) -> GameResult<Option<Round>> {
        let links = db.party_rounds(session.session_id).await?;
        for link in links
            .iter()
            .filter(|l| l.round_type == RoundType::Prompt && l.phase == PartyPhase::Prompt)
        {
            if excluded.contains(&link.round_id.inner()) {
                continue;
            }
            let Some(round) = db.round(link.round_id).await? else {
                continue;
            };
            if round.player_id == player || round.status != RoundStatus::Submitted {
                continue;
            }
            return Ok(Some(round));
        }
        Ok(None)
    }

    /// Pick a phraseset for the player to vote on. Exclusions: contributed
    /// to it (prompt or either copy) or already voted on it.
    pub async fn pick_phraseset_for_vote<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: ID<Player>,
        party: Option<ID<PartySession>>,
    ) -> GameResult<Phraseset> {
        if let Some(session_id) = party {
            return self
                .party_phraseset(db, session_id, player)
                .await?
                .ok_or(GameError::NoEligibleWork);
        }

        let queues = &self.ctx.queues;
        let mut held: Vec<uuid::Uuid> = Vec::new();
        let mut found: Option<Phraseset> = None;
        let depth = queues.len(PHRASESET_QUEUE).await;
        for _ in 0..depth {
            let Some(item) = queues.pop(PHRASESET_QUEUE).await else {
                break;
            };
            let Some(set) = db.phraseset(ID::from(item)).await? else {
                continue;
            };
            if !matches!(
                set.status,
                PhrasesetStatus::Voting | PhrasesetStatus::Closing
            ) {
                continue;
            }
            if self.contributed(db, &set, player).await?
                || db.has_voted_on(player, set.phraseset_id).await?
            {
                held.push(item);
                continue;
            }
            found = Some(set);
            break;
        }
        // The chosen set stays in rotation for other voters.
        if let Some(set) = &found {
            held.push(set.phraseset_id.inner());
        }
        for item in held {
            queues.push(PHRASESET_QUEUE, item).await;
        }
        found.ok_or(GameError::NoEligibleWork)
    }

    async fn party_phraseset<C: GenericClient + Sync>(
        &self,
        db: &C,
        session: ID<PartySession>,
        player: ID<Player>,
    ) -> GameResult<Option<Phraseset>> {
        let links = db.party_phrasesets(session).await?;
        for link in links.iter().filter(|l| l.available_for_voting) {
            let Some(set) = db.phraseset(link.phraseset_id).await? else {
                continue;
            };
            if set.status != PhrasesetStatus::Voting {
                continue;
            }
            if self.contributed(db, &set, player).await? {
                continue;
            }
            if db.has_voted_on(player, set.phraseset_id).await? {
                continue;
            }
            return Ok(Some(set));
        }
        Ok(None)
    }

    async fn contributed<C: GenericClient + Sync>(
        &self,
        db: &C,
        set: &Phraseset,
        player: ID<Player>,
    ) -> GameResult<bool> {
        for round_id in set.contributor_rounds() {
            if let Some(round) = db.round(round_id).await? {
                if round.player_id == player {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Most recently created open backronym set with capacity that the
    /// player has not already entered. Concentrates players on one set
    /// instead of spreading them.
    pub async fn pick_backronym_set<C: GenericClient + Sync>(
        &self,
        db: &C,
        player: ID<Player>,
    ) -> GameResult<Option<BackronymSet>> {
        let age_limit = Duration::from_secs(
            self.ctx.settings.ir_rapid_entry_timeout_minutes * 60 * 2,
        );
        let created_after = self.ctx.now() - age_limit;
        Ok(db.available_set_for_entry(player, created_after).await?)
    }
}
