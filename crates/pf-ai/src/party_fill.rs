use crate::ContentCache;
use crate::RetryPolicy;
use crate::retry_with_backoff;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::ID;
use pf_database::Database;
use pf_engine::CoordinatorContext;
use pf_party::PartyCoordinator;
use pf_party::PartyService;
use pf_realtime::Broadcaster;
use pf_records::PartyParticipant;
use pf_records::PartyPhase;
use pf_records::PartyRepository;
use pf_records::PartySession;
use pf_records::Player;
use pf_records::PlayerRepository;
use pf_records::RoundRepository;
use pf_records::SessionStatus;
use std::sync::Arc;
use tokio_postgres::GenericClient;

/// Tally of one fill pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct FillStats {
    pub prompts_submitted: usize,
    pub copies_submitted: usize,
    pub votes_submitted: usize,
    pub errors: usize,
}

fn seed_for(player: ID<Player>) -> u64 {
    let bytes = player.inner().into_bytes();
    u64::from_le_bytes(bytes[..8].try_into().expect("uuid has 16 bytes"))
}

/// Fills party phases for AI participants.
///
/// All eligible AI participants for the current phase run in parallel, each
/// in its own database session so no two tasks share a unit of work. Inside
/// each task the normal engine paths run under the player's lock, and every
/// start/submit is wrapped in bounded exponential backoff because sibling
/// tasks contend for the same locks. Failure of one task never blocks the
/// others; each submission is its own transaction boundary.
pub struct PartyAiOrchestrator {
    ctx: Arc<CoordinatorContext>,
    database: Database,
    broadcaster: Arc<Broadcaster>,
    cache: Arc<ContentCache>,
}

impl PartyAiOrchestrator {
    pub fn new(
        ctx: Arc<CoordinatorContext>,
        database: Database,
        broadcaster: Arc<Broadcaster>,
        cache: Arc<ContentCache>,
    ) -> Self {
        Self {
            ctx,
            database,
            broadcaster,
            cache,
        }
    }

    /// Fill the current phase for every AI participant, then advance the
    /// phase if that completed it, repeating into the next phase so one
    /// trigger carries an all-AI table clean through the match.
    pub async fn process_ai_submissions(
        &self,
        session_id: ID<PartySession>,
    ) -> GameResult<FillStats> {
        let mut stats = FillStats::default();
        // Bounded by the phase count; each pass handles one phase.
        for _ in 0..4 {
            let db = self.database.session().await?;
            let Some(session) = db.party_session(session_id).await? else {
                log::info!("[ai fill] session {} gone, stopping", session_id);
                break;
            };
            if session.status != SessionStatus::InProgress {
                break;
            }
            let phase = session.current_phase;
            if phase.round_type().is_none() {
                break;
            }

            let mut ai_members: Vec<(PartyParticipant, Player)> = Vec::new();
            for participant in db.participants(session_id).await? {
                let Some(player) = db.player(participant.player_id).await? else {
                    continue;
                };
                if player.is_ai() {
                    ai_members.push((participant, player));
                }
            }
            drop(db);
            if ai_members.is_empty() {
                break;
            }
            log::info!(
                "[ai fill] session {}: {} AI participant(s) for {} phase",
                session_id,
                ai_members.len(),
                phase.as_str()
            );

            // One isolated session per task; the whole batch runs at once.
            let tasks = ai_members.into_iter().map(|(participant, player)| {
                self.fill_one(session_id, &session, phase, participant, player)
            });
            let results = futures::future::join_all(tasks).await;
            for result in results {
                match result {
                    Ok(Some(_)) => match phase {
                        PartyPhase::Prompt => stats.prompts_submitted += 1,
                        PartyPhase::Copy => stats.copies_submitted += 1,
                        PartyPhase::Vote => stats.votes_submitted += 1,
                        _ => {}
                    },
                    Ok(None) => {}
                    Err(error) => {
                        log::error!("[ai fill] submission failed: {}", error);
                        stats.errors += 1;
                    }
                }
            }

            // The batch may have completed the phase; advance and keep
            // going so the next phase's AI work starts immediately.
            let db = self.database.session().await?;
            let party = PartyService::new(self.ctx.clone(), self.broadcaster.clone());
            let advanced = if party.can_advance(&db, session_id).await? {
                party.advance_phase(&db, session_id).await?
            } else {
                None
            };
            match advanced {
                Some(next) => {
                    log::info!(
                        "[ai fill] session {} advanced to {}, continuing",
                        session_id,
                        next.as_str()
                    );
                }
                None => break,
            }
        }
        log::info!(
            "[ai fill] session {} done: {}p/{}c/{}v, {} error(s)",
            session_id,
            stats.prompts_submitted,
            stats.copies_submitted,
            stats.votes_submitted,
            stats.errors
        );
        Ok(stats)
    }

    /// Run one AI participant's work for the phase in an isolated session.
    /// Returns the submitted text, or None when there was nothing to do.
    async fn fill_one(
        &self,
        session_id: ID<PartySession>,
        session: &PartySession,
        phase: PartyPhase,
        participant: PartyParticipant,
        player: Player,
    ) -> GameResult<Option<String>> {
        if participant.submitted_for(phase) >= session.required_for(phase) {
            log::debug!(
                "[ai fill] {} already done with {}",
                player.username,
                phase.as_str()
            );
            return Ok(None);
        }
        let db = self.database.session().await?;
        let coordinator = PartyCoordinator::new(self.ctx.clone(), self.broadcaster.clone());
        match phase {
            PartyPhase::Prompt => {
                self.fill_prompt(&db, &coordinator, session_id, &player)
                    .await
            }
            PartyPhase::Copy => self.fill_copy(&db, &coordinator, session_id, &player).await,
            PartyPhase::Vote => self.fill_vote(&db, &coordinator, session_id, &player).await,
            _ => Ok(None),
        }
    }

    async fn fill_prompt<C: GenericClient + Sync>(
        &self,
        db: &C,
        coordinator: &PartyCoordinator,
        session_id: ID<PartySession>,
        player: &Player,
    ) -> GameResult<Option<String>> {
        let round = retry_with_backoff(
            &format!("start_prompt_round for {}", player.username),
            RetryPolicy::default(),
            || coordinator.start_party_prompt_round(db, session_id, player),
        )
        .await?;
        let phrase = self
            .cache
            .generate_quip_response(db, &round.prompt_text, round.round_id)
            .await?;
        retry_with_backoff(
            &format!("submit_prompt for {}", player.username),
            RetryPolicy::default(),
            || coordinator.submit_party_prompt(db, session_id, player, round.round_id, &phrase),
        )
        .await?;
        log::info!("[ai fill] {} submitted prompt {:?}", player.username, phrase);
        Ok(Some(phrase))
    }

    async fn fill_copy<C: GenericClient + Sync>(
        &self,
        db: &C,
        coordinator: &PartyCoordinator,
        session_id: ID<PartySession>,
        player: &Player,
    ) -> GameResult<Option<String>> {
        let round = match retry_with_backoff(
            &format!("start_copy_round for {}", player.username),
            RetryPolicy::default(),
            || coordinator.start_party_copy_round(db, session_id, player),
        )
        .await
        {
            Ok(round) => round,
            Err(GameError::NoEligibleWork) => {
                log::info!("[ai fill] no eligible prompts for {}", player.username);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let prompt_round_id = round.prompt_round_id.ok_or(GameError::RoundNotFound)?;
        let prompt_round = db
            .round(prompt_round_id)
            .await?
            .ok_or(GameError::RoundNotFound)?;
        let phrase = self.cache.consume_impostor_phrase(db, &prompt_round).await?;
        retry_with_backoff(
            &format!("submit_copy for {}", player.username),
            RetryPolicy::default(),
            || coordinator.submit_party_copy(db, session_id, player, round.round_id, &phrase),
        )
        .await?;
        log::info!("[ai fill] {} submitted copy {:?}", player.username, phrase);
        Ok(Some(phrase))
    }

    async fn fill_vote<C: GenericClient + Sync>(
        &self,
        db: &C,
        coordinator: &PartyCoordinator,
        session_id: ID<PartySession>,
        player: &Player,
    ) -> GameResult<Option<String>> {
        let (round, phraseset) = match retry_with_backoff(
            &format!("start_vote_round for {}", player.username),
            RetryPolicy::default(),
            || coordinator.start_party_vote_round(db, session_id, player),
        )
        .await
        {
            Ok(pair) => pair,
            Err(GameError::NoEligibleWork) => {
                log::info!("[ai fill] no eligible phrasesets for {}", player.username);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let chosen = self
            .cache
            .generate_vote_choice(&phraseset, seed_for(player.player_id))
            .await?;
        retry_with_backoff(
            &format!("submit_vote for {}", player.username),
            RetryPolicy::default(),
            || {
                coordinator.submit_party_vote(
                    db,
                    session_id,
                    player,
                    round.round_id,
                    phraseset.phraseset_id,
                    &chosen,
                )
            },
        )
        .await?;
        log::info!("[ai fill] {} voted for {:?}", player.username, chosen);
        Ok(Some(chosen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_stable_per_player() {
        let player: ID<Player> = ID::default();
        assert_eq!(seed_for(player), seed_for(player));
        let other: ID<Player> = ID::default();
        assert_ne!(seed_for(player), seed_for(other));
    }
}
