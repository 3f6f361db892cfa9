use crate::PartyService;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::ID;
use pf_core::RoundType;
use pf_engine::CoordinatorContext;
use pf_engine::RoundEngine;
use pf_engine::SubmitOutcome;
use pf_realtime::Broadcaster;
use pf_realtime::PartyEvent;
use pf_realtime::ProgressCounts;
use pf_realtime::SessionProgress;
use pf_records::PartyPhase;
use pf_records::PartyPhraseset;
use pf_records::PartyRepository;
use pf_records::PartyRound;
use pf_records::PartySession;
use pf_records::Phraseset;
use pf_records::Player;
use pf_records::Round;
use pf_records::SessionStatus;
use std::sync::Arc;
use tokio_postgres::GenericClient;

/// Result of a party-scoped submission: what the engine did, plus whether
/// this submission tipped the session into the next phase. When it did, the
/// caller owns triggering the AI fill for that phase.
#[derive(Debug, Clone)]
pub struct PartySubmit {
    pub outcome: SubmitOutcome,
    pub advanced_to: Option<PartyPhase>,
}

/// Coordinates party-scoped rounds with the round engine: phase gating,
/// party links, progress counters, and phase-advance detection.
pub struct PartyCoordinator {
    ctx: Arc<CoordinatorContext>,
    engine: RoundEngine,
    party: PartyService,
}

impl PartyCoordinator {
    pub fn new(ctx: Arc<CoordinatorContext>, broadcaster: Arc<Broadcaster>) -> Self {
        let engine = RoundEngine::new(ctx.clone());
        let party = PartyService::new(ctx.clone(), broadcaster);
        Self { ctx, engine, party }
    }
    pub fn engine(&self) -> &RoundEngine {
        &self.engine
    }
    pub fn party(&self) -> &PartyService {
        &self.party
    }

    /// Phase gate plus quota check shared by every party round start.
    async fn gate<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
        phase: PartyPhase,
    ) -> GameResult<PartySession> {
        let session = db
            .party_session(session_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if session.current_phase != phase {
            return Err(GameError::WrongPhase(
                session.current_phase.as_str().to_string(),
            ));
        }
        let participant = db
            .participant(session_id, player.player_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if participant.submitted_for(phase) >= session.required_for(phase) {
            return Err(GameError::AlreadySubmitted);
        }
        Ok(session)
    }

    async fn link<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
        round: &Round,
        phase: PartyPhase,
    ) -> GameResult<()> {
        let participant = db
            .participant(session_id, player.player_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        let link = PartyRound {
            party_round_id: ID::default(),
            session_id,
            round_id: round.round_id,
            participant_id: participant.participant_id,
            round_type: round.round_type,
            phase,
            created_at: self.ctx.now(),
        };
        db.link_round(&link).await?;
        Ok(())
    }

    pub async fn start_party_prompt_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
    ) -> GameResult<Round> {
        self.gate(db, session_id, player, PartyPhase::Prompt).await?;
        let round = self.engine.start_prompt_round(db, player).await?;
        self.link(db, session_id, player, &round, PartyPhase::Prompt)
            .await?;
        Ok(round)
    }

    pub async fn start_party_copy_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
    ) -> GameResult<Round> {
        self.gate(db, session_id, player, PartyPhase::Copy).await?;
        let (prompt_round, _from_queue) = self
            .engine
            .matcher()
            .pick_prompt_for_copy(db, player.player_id, Some(session_id))
            .await?;
        let round = self
            .engine
            .start_copy_round(db, player, Some(prompt_round.round_id), Some(session_id))
            .await?;
        self.link(db, session_id, player, &round, PartyPhase::Copy)
            .await?;
        Ok(round)
    }

    pub async fn start_party_vote_round<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
    ) -> GameResult<(Round, Phraseset)> {
        self.gate(db, session_id, player, PartyPhase::Vote).await?;
        let phraseset = self
            .engine
            .matcher()
            .pick_phraseset_for_vote(db, player.player_id, Some(session_id))
            .await?;
        let pair = self
            .engine
            .start_vote_round(db, player, Some(phraseset.phraseset_id), Some(session_id))
            .await?;
        self.link(db, session_id, player, &pair.0, PartyPhase::Vote)
            .await?;
        Ok(pair)
    }

    pub async fn submit_party_prompt<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
        round_id: ID<Round>,
        phrase: &str,
    ) -> GameResult<PartySubmit> {
        let outcome = self
            .engine
            .submit_prompt(db, round_id, phrase, player)
            .await?;
        self.after_submission(db, session_id, player, RoundType::Prompt, outcome)
            .await
    }

    pub async fn submit_party_copy<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
        round_id: ID<Round>,
        phrase: &str,
    ) -> GameResult<PartySubmit> {
        let outcome = self.engine.submit_copy(db, round_id, phrase, player).await?;
        if let Some(phraseset_id) = outcome.phraseset_created {
            let link = PartyPhraseset {
                party_phraseset_id: ID::default(),
                session_id,
                phraseset_id,
                created_in_phase: PartyPhase::Copy,
                available_for_voting: false,
                created_at: self.ctx.now(),
            };
            db.link_phraseset(&link).await?;
            log::info!(
                "[party {}] phraseset {} linked",
                session_id,
                phraseset_id
            );
        }
        self.after_submission(db, session_id, player, RoundType::Copy, outcome)
            .await
    }

    pub async fn submit_party_vote<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
        round_id: ID<Round>,
        phraseset_id: ID<Phraseset>,
        chosen: &str,
    ) -> GameResult<PartySubmit> {
        let outcome = self
            .engine
            .submit_vote(db, round_id, phraseset_id, chosen, player)
            .await?;
        self.after_submission(db, session_id, player, RoundType::Vote, outcome)
            .await
    }

    /// Progress bookkeeping shared by all three submission paths: bump the
    /// counter, broadcast progress, advance the phase when everyone is done.
    async fn after_submission<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
        round_type: RoundType,
        outcome: SubmitOutcome,
    ) -> GameResult<PartySubmit> {
        // A repeat of an already-submitted round changed nothing; counting
        // it would push progress past the per-player quota.
        if outcome.repeated {
            return Ok(PartySubmit {
                outcome,
                advanced_to: None,
            });
        }
        let participant = db
            .participant(session_id, player.player_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        db.increment_progress(participant.participant_id, round_type, self.ctx.now())
            .await?;

        let session = db
            .party_session(session_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        let participants = db.participants(session_id).await?;
        let updated = participants
            .iter()
            .find(|p| p.player_id == player.player_id)
            .cloned()
            .unwrap_or(participant);
        let required = session.required_for(session.current_phase);
        let done = participants
            .iter()
            .filter(|p| p.submitted_for(session.current_phase) >= required)
            .count();
        self.party
            .broadcaster()
            .broadcast(
                session_id.inner(),
                &PartyEvent::ProgressUpdate {
                    session_id: session_id.inner(),
                    player_id: player.player_id.inner(),
                    username: player.username.clone(),
                    action: format!("submitted_{}", round_type),
                    progress: ProgressCounts {
                        prompts_submitted: updated.prompts_submitted,
                        copies_submitted: updated.copies_submitted,
                        votes_submitted: updated.votes_submitted,
                    },
                    session_progress: SessionProgress {
                        players_done_with_phase: done,
                        total_players: participants.len(),
                    },
                },
                None,
            )
            .await;

        let mut advanced_to = None;
        if session.status == SessionStatus::InProgress
            && self.party.can_advance(db, session_id).await?
        {
            advanced_to = self.party.advance_phase(db, session_id).await?;
        }
        Ok(PartySubmit {
            outcome,
            advanced_to,
        })
    }
}
