use crate::generate_party_code;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::ID;
use pf_engine::CoordinatorContext;
use pf_realtime::Broadcaster;
use pf_realtime::PartyEvent;
use pf_records::ParticipantStatus;
use pf_records::PartyParticipant;
use pf_records::PartyPhase;
use pf_records::PartyRepository;
use pf_records::PartySession;
use pf_records::Player;
use pf_records::SessionStatus;
use pf_sync::LockName;
use std::sync::Arc;
use tokio_postgres::GenericClient;

/// Configuration for a new party.
#[derive(Debug, Clone, Copy)]
pub struct PartyConfig {
    pub min_players: i32,
    pub max_players: i32,
    pub prompts_per_player: i32,
    pub copies_per_player: i32,
    pub votes_per_player: i32,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            min_players: 3,
            max_players: 8,
            prompts_per_player: 1,
            copies_per_player: 2,
            votes_per_player: 3,
        }
    }
}

/// Whether every active participant has met the current phase's quota.
/// Evaluated after every progress increment.
pub fn all_done(session: &PartySession, participants: &[PartyParticipant]) -> bool {
    let required = session.required_for(session.current_phase);
    if required == 0 {
        return false;
    }
    let active: Vec<&PartyParticipant> = participants
        .iter()
        .filter(|p| p.status == ParticipantStatus::Active)
        .collect();
    !active.is_empty()
        && active
            .iter()
            .all(|p| p.submitted_for(session.current_phase) >= required)
}

/// Party session lifecycle: lobby membership, readiness, start, and the
/// strict linear phase machine.
pub struct PartyService {
    ctx: Arc<CoordinatorContext>,
    broadcaster: Arc<Broadcaster>,
}

impl PartyService {
    pub fn new(ctx: Arc<CoordinatorContext>, broadcaster: Arc<Broadcaster>) -> Self {
        Self { ctx, broadcaster }
    }
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Create a session with a collision-checked party code, the host
    /// joining as first participant.
    pub async fn create_session<C: GenericClient + Sync>(
        &self,
        db: &C,
        host: &Player,
        config: PartyConfig,
    ) -> GameResult<PartySession> {
        if db.player_active_session(host.player_id).await?.is_some() {
            return Err(GameError::AlreadyInSession);
        }
        let mut code = generate_party_code();
        for attempt in 0..3 {
            if !db.code_in_use(&code).await? {
                break;
            }
            if attempt == 2 {
                return Err(GameError::Internal(
                    "could not generate a unique party code".to_string(),
                ));
            }
            code = generate_party_code();
        }
        let now = self.ctx.now();
        let session = PartySession {
            session_id: ID::default(),
            party_code: code.clone(),
            host_player_id: host.player_id,
            min_players: config.min_players,
            max_players: config.max_players,
            prompts_per_player: config.prompts_per_player,
            copies_per_player: config.copies_per_player,
            votes_per_player: config.votes_per_player,
            status: SessionStatus::Open,
            current_phase: PartyPhase::Lobby,
            created_at: now,
            started_at: None,
            locked_at: None,
            phase_started_at: None,
            phase_expires_at: None,
            completed_at: None,
        };
        db.insert_session(&session).await?;
        let participant = PartyParticipant {
            participant_id: ID::default(),
            session_id: session.session_id,
            player_id: host.player_id,
            status: ParticipantStatus::Joined,
            is_host: true,
            prompts_submitted: 0,
            copies_submitted: 0,
            votes_submitted: 0,
            connected: false,
            joined_at: now,
            ready_at: None,
            disconnected_at: None,
            last_activity_at: None,
        };
        db.insert_participant(&participant).await?;
        log::info!(
            "[party {}] created with code {} by {}",
            session.session_id,
            code,
            host.player_id
        );
        Ok(session)
    }

    /// Join an open, non-full session the player is not already part of.
    pub async fn join_session<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
    ) -> GameResult<PartyParticipant> {
        let _guard = self.ctx.lock(LockName::party(session_id)).await?;
        let session = db
            .party_session(session_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if session.status != SessionStatus::Open {
            return Err(GameError::SessionAlreadyStarted);
        }
        if db.participant_count(session_id).await? >= i64::from(session.max_players) {
            return Err(GameError::SessionFull);
        }
        if db.participant(session_id, player.player_id).await?.is_some() {
            return Err(GameError::AlreadyInSession);
        }
        if db.player_active_session(player.player_id).await?.is_some() {
            return Err(GameError::AlreadyInSession);
        }
        let participant = PartyParticipant {
            participant_id: ID::default(),
            session_id,
            player_id: player.player_id,
            status: ParticipantStatus::Joined,
            is_host: false,
            prompts_submitted: 0,
            copies_submitted: 0,
            votes_submitted: 0,
            connected: false,
            joined_at: self.ctx.now(),
            ready_at: None,
            disconnected_at: None,
            last_activity_at: None,
        };
        db.insert_participant(&participant).await?;
        self.broadcaster
            .broadcast(
                session_id.inner(),
                &PartyEvent::PlayerJoined {
                    session_id: session_id.inner(),
                    player_id: player.player_id.inner(),
                    username: player.username.clone(),
                },
                None,
            )
            .await;
        log::info!("[party {}] {} joined", session_id, player.player_id);
        Ok(participant)
    }

    /// Leave the lobby. The last departure deletes the session; a departing
    /// host hands off to the earliest-joined remaining participant.
    /// Returns true when the session was deleted.
    pub async fn leave_session<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
    ) -> GameResult<bool> {
        let _guard = self.ctx.lock(LockName::party(session_id)).await?;
        let session = db
            .party_session(session_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if session.status != SessionStatus::Open {
            return Err(GameError::SessionAlreadyStarted);
        }
        let Some(participant) = db.participant(session_id, player.player_id).await? else {
            return Ok(false);
        };
        let was_host = participant.is_host;
        db.delete_participant(participant.participant_id).await?;
        let remaining = db.participants(session_id).await?;
        if remaining.is_empty() {
            db.delete_session_cascade(session_id).await?;
            log::info!("[party {}] deleted after last player left", session_id);
            return Ok(true);
        }
        let mut new_host = None;
        if was_host {
            let successor = &remaining[0];
            db.set_host(successor.participant_id, true).await?;
            new_host = Some(successor.player_id.inner());
            log::info!(
                "[party {}] host reassigned to {}",
                session_id,
                successor.player_id
            );
        }
        self.broadcaster
            .broadcast(
                session_id.inner(),
                &PartyEvent::PlayerLeft {
                    session_id: session_id.inner(),
                    player_id: player.player_id.inner(),
                    new_host_id: new_host,
                },
                None,
            )
            .await;
        Ok(false)
    }

    pub async fn mark_ready<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
    ) -> GameResult<()> {
        let session = db
            .party_session(session_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if session.status != SessionStatus::Open {
            return Err(GameError::SessionAlreadyStarted);
        }
        let participant = db
            .participant(session_id, player.player_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        db.set_participant_status(
            participant.participant_id,
            ParticipantStatus::Ready,
            Some(self.ctx.now()),
        )
        .await?;
        self.broadcaster
            .broadcast(
                session_id.inner(),
                &PartyEvent::PlayerReady {
                    session_id: session_id.inner(),
                    player_id: player.player_id.inner(),
                },
                None,
            )
            .await;
        Ok(())
    }

    /// Start the match: host-only, OPEN, at or above the minimum count.
    pub async fn start_session<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        requester: &Player,
    ) -> GameResult<PartySession> {
        let _guard = self.ctx.lock(LockName::party(session_id)).await?;
        let session = db
            .party_session(session_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if session.status != SessionStatus::Open {
            return Err(GameError::SessionAlreadyStarted);
        }
        let requester_participant = db
            .participant(session_id, requester.player_id)
            .await?
            .ok_or(GameError::NotHost)?;
        if !requester_participant.is_host {
            return Err(GameError::NotHost);
        }
        let count = db.participant_count(session_id).await?;
        if count < i64::from(session.min_players) {
            return Err(GameError::NotEnoughPlayers);
        }
        db.start_session_row(session_id, self.ctx.now()).await?;
        db.set_all_participants_status(session_id, ParticipantStatus::Active)
            .await?;
        self.broadcaster
            .broadcast(
                session_id.inner(),
                &PartyEvent::SessionStarted {
                    session_id: session_id.inner(),
                },
                None,
            )
            .await;
        log::info!("[party {}] started with {} players", session_id, count);
        db.party_session(session_id)
            .await?
            .ok_or(GameError::SessionNotFound)
    }

    /// Whether the session can advance out of its current phase.
    pub async fn can_advance<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
    ) -> GameResult<bool> {
        let Some(session) = db.party_session(session_id).await? else {
            return Ok(false);
        };
        if session.status != SessionStatus::InProgress {
            return Ok(false);
        }
        let participants = db.participants(session_id).await?;
        Ok(all_done(&session, &participants))
    }

    /// Atomically advance to the next phase. The compare-and-set collapses
    /// concurrent advancers to one winner; returns the new phase when this
    /// caller won.
    pub async fn advance_phase<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
    ) -> GameResult<Option<PartyPhase>> {
        let _guard = self.ctx.lock(LockName::phase(session_id)).await?;
        let session = db
            .party_session(session_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        let Some(next) = session.current_phase.next() else {
            return Ok(None);
        };
        let now = self.ctx.now();
        if !db
            .cas_phase(session_id, session.current_phase, next, now)
            .await?
        {
            log::debug!(
                "[party {}] phase advance lost to a concurrent caller",
                session_id
            );
            return Ok(None);
        }
        match next {
            PartyPhase::Vote => db.mark_phrasesets_votable(session_id).await?,
            PartyPhase::Results => db.set_completed_at(session_id, now).await?,
            PartyPhase::Completed => {
                db.set_session_status(session_id, SessionStatus::Completed)
                    .await?;
                self.broadcaster
                    .broadcast(
                        session_id.inner(),
                        &PartyEvent::SessionCompleted {
                            session_id: session_id.inner(),
                        },
                        None,
                    )
                    .await;
            }
            _ => {}
        }
        self.broadcaster
            .broadcast(
                session_id.inner(),
                &PartyEvent::PhaseTransition {
                    session_id: session_id.inner(),
                    old_phase: session.current_phase.as_str().to_string(),
                    new_phase: next.as_str().to_string(),
                    message: String::new(),
                },
                None,
            )
            .await;
        log::info!(
            "[party {}] advanced {} -> {}",
            session_id,
            session.current_phase.as_str(),
            next.as_str()
        );
        Ok(Some(next))
    }

    /// Presence: a lobby connection flips JOINED to READY; churn is
    /// broadcast so late joiners see current state.
    pub async fn on_connect<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
        context: Option<&str>,
    ) -> GameResult<()> {
        let session = db
            .party_session(session_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        let Some(participant) = db.participant(session_id, player.player_id).await? else {
            return Err(GameError::SessionNotFound);
        };
        db.set_connected(participant.participant_id, true, self.ctx.now())
            .await?;
        if session.status == SessionStatus::Open && context == Some("lobby") {
            db.set_participant_status(
                participant.participant_id,
                ParticipantStatus::Ready,
                Some(self.ctx.now()),
            )
            .await?;
            self.broadcaster
                .broadcast(
                    session_id.inner(),
                    &PartyEvent::SessionUpdate {
                        session_id: session_id.inner(),
                        reason: "lobby_presence_changed".to_string(),
                        message: "player_connected".to_string(),
                    },
                    None,
                )
                .await;
        }
        Ok(())
    }

    /// Presence: a lobby disconnect reverses READY back to JOINED while the
    /// session is still open, so reconnects restore the prior status.
    pub async fn on_disconnect<C: GenericClient + Sync>(
        &self,
        db: &C,
        session_id: ID<PartySession>,
        player: &Player,
        context: Option<&str>,
    ) -> GameResult<()> {
        let Some(session) = db.party_session(session_id).await? else {
            return Ok(());
        };
        let Some(participant) = db.participant(session_id, player.player_id).await? else {
            return Ok(());
        };
        db.set_connected(participant.participant_id, false, self.ctx.now())
            .await?;
        if session.status == SessionStatus::Open && context == Some("lobby") {
            db.set_participant_status(participant.participant_id, ParticipantStatus::Joined, None)
                .await?;
            self.broadcaster
                .broadcast(
                    session_id.inner(),
                    &PartyEvent::SessionUpdate {
                        session_id: session_id.inner(),
                        reason: "lobby_presence_changed".to_string(),
                        message: "player_disconnected".to_string(),
                    },
                    None,
                )
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn session(phase: PartyPhase) -> PartySession {
        PartySession {
            session_id: ID::default(),
            party_code: "WXYZ2345".into(),
            host_player_id: ID::default(),
            min_players: 3,
            max_players: 8,
            prompts_per_player: 1,
            copies_per_player: 2,
            votes_per_player: 3,
            status: SessionStatus::InProgress,
            current_phase: phase,
            created_at: SystemTime::UNIX_EPOCH,
            started_at: None,
            locked_at: None,
            phase_started_at: None,
            phase_expires_at: None,
            completed_at: None,
        }
    }

    fn participant(
        session: &PartySession,
        status: ParticipantStatus,
        counts: (i32, i32, i32),
    ) -> PartyParticipant {
        PartyParticipant {
            participant_id: ID::default(),
            session_id: session.session_id,
            player_id: ID::default(),
            status,
            is_host: false,
            prompts_submitted: counts.0,
            copies_submitted: counts.1,
            votes_submitted: counts.2,
            connected: true,
            joined_at: SystemTime::UNIX_EPOCH,
            ready_at: None,
            disconnected_at: None,
            last_activity_at: None,
        }
    }

    #[test]
    fn all_done_requires_every_active_participant() {
        let s = session(PartyPhase::Copy);
        let done = participant(&s, ParticipantStatus::Active, (1, 2, 0));
        let lagging = participant(&s, ParticipantStatus::Active, (1, 1, 0));
        assert!(all_done(&s, &[done.clone()]));
        assert!(!all_done(&s, &[done, lagging]));
    }

    #[test]
    fn all_done_ignores_inactive_participants() {
        let s = session(PartyPhase::Prompt);
        let done = participant(&s, ParticipantStatus::Active, (1, 0, 0));
        let ghost = participant(&s, ParticipantStatus::Disconnected, (0, 0, 0));
        assert!(all_done(&s, &[done, ghost]));
    }

    #[test]
    fn all_done_is_false_in_non_work_phases() {
        let s = session(PartyPhase::Lobby);
        let ready = participant(&s, ParticipantStatus::Active, (9, 9, 9));
        assert!(!all_done(&s, &[ready]));
    }

    #[test]
    fn all_done_is_false_with_no_active_participants() {
        let s = session(PartyPhase::Vote);
        assert!(!all_done(&s, &[]));
    }
}
