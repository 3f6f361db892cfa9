use crate::Phraseset;
use crate::Player;
use crate::Round;
use pf_core::ID;
use pf_core::RoundType;
use pf_core::Unique;
use pf_database::PARTY_PARTICIPANTS;
use pf_database::PARTY_PHRASESETS;
use pf_database::PARTY_ROUNDS;
use pf_database::PARTY_SESSIONS;
use pf_database::PgErr;
use pf_database::Schema;
use std::time::SystemTime;
use tokio_postgres::GenericClient;
use tokio_postgres::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Abandoned => "ABANDONED",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "ABANDONED" => Some(Self::Abandoned),
            _ => None,
        }
    }
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

/// Strict linear phase progression for a party session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyPhase {
    Lobby,
    Prompt,
    Copy,
    Vote,
    Results,
    Completed,
}

impl PartyPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lobby => "LOBBY",
            Self::Prompt => "PROMPT",
            Self::Copy => "COPY",
            Self::Vote => "VOTE",
            Self::Results => "RESULTS",
            Self::Completed => "COMPLETED",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOBBY" => Some(Self::Lobby),
            "PROMPT" => Some(Self::Prompt),
            "COPY" => Some(Self::Copy),
            "VOTE" => Some(Self::Vote),
            "RESULTS" => Some(Self::Results),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
    /// The next phase in the fixed progression, if any.
    pub fn next(&self) -> Option<PartyPhase> {
        match self {
            Self::Lobby => Some(Self::Prompt),
            Self::Prompt => Some(Self::Copy),
            Self::Copy => Some(Self::Vote),
            Self::Vote => Some(Self::Results),
            Self::Results => Some(Self::Completed),
            Self::Completed => None,
        }
    }
    /// Which round type a work phase collects, if it collects one.
    pub fn round_type(&self) -> Option<RoundType> {
        match self {
            Self::Prompt => Some(RoundType::Prompt),
            Self::Copy => Some(RoundType::Copy),
            Self::Vote => Some(RoundType::Vote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    Joined,
    Ready,
    Active,
    Completed,
    Disconnected,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joined => "JOINED",
            Self::Ready => "READY",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Disconnected => "DISCONNECTED",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "JOINED" => Some(Self::Joined),
            "READY" => Some(Self::Ready),
            "ACTIVE" => Some(Self::Active),
            "COMPLETED" => Some(Self::Completed),
            "DISCONNECTED" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

/// A synchronized multi-player QF match.
#[derive(Debug, Clone)]
pub struct PartySession {
    pub session_id: ID<PartySession>,
    pub party_code: String,
    pub host_player_id: ID<Player>,
    pub min_players: i32,
    pub max_players: i32,
    pub prompts_per_player: i32,
    pub copies_per_player: i32,
    pub votes_per_player: i32,
    pub status: SessionStatus,
    pub current_phase: PartyPhase,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub locked_at: Option<SystemTime>,
    pub phase_started_at: Option<SystemTime>,
    pub phase_expires_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
}

impl PartySession {
    /// Required submissions for a work phase.
    pub fn required_for(&self, phase: PartyPhase) -> i32 {
        match phase {
            PartyPhase::Prompt => self.prompts_per_player,
            PartyPhase::Copy => self.copies_per_player,
            PartyPhase::Vote => self.votes_per_player,
            _ => 0,
        }
    }
}

impl Unique for PartySession {
    fn id(&self) -> ID<Self> {
        self.session_id
    }
}

impl From<Row> for PartySession {
    fn from(row: Row) -> Self {
        let status: String = row.get("status");
        let phase: String = row.get("current_phase");
        Self {
            session_id: ID::from(row.get::<_, uuid::Uuid>("session_id")),
            party_code: row.get("party_code"),
            host_player_id: ID::from(row.get::<_, uuid::Uuid>("host_player_id")),
            min_players: row.get("min_players"),
            max_players: row.get("max_players"),
            prompts_per_player: row.get("prompts_per_player"),
            copies_per_player: row.get("copies_per_player"),
            votes_per_player: row.get("votes_per_player"),
            status: SessionStatus::parse(&status).expect("valid session status"),
            current_phase: PartyPhase::parse(&phase).expect("valid party phase"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            locked_at: row.get("locked_at"),
            phase_started_at: row.get("phase_started_at"),
            phase_expires_at: row.get("phase_expires_at"),
            completed_at: row.get("completed_at"),
        }
    }
}

impl Schema for PartySession {
    fn name() -> &'static str {
        PARTY_SESSIONS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            PARTY_SESSIONS,
            " (
                session_id          UUID PRIMARY KEY,
                party_code          TEXT NOT NULL,
                host_player_id      UUID NOT NULL,
                min_players         INTEGER NOT NULL,
                max_players         INTEGER NOT NULL,
                prompts_per_player  INTEGER NOT NULL,
                copies_per_player   INTEGER NOT NULL,
                votes_per_player    INTEGER NOT NULL,
                status              TEXT NOT NULL,
                current_phase       TEXT NOT NULL,
                created_at          TIMESTAMPTZ NOT NULL,
                started_at          TIMESTAMPTZ,
                locked_at           TIMESTAMPTZ,
                phase_started_at    TIMESTAMPTZ,
                phase_expires_at    TIMESTAMPTZ,
                completed_at        TIMESTAMPTZ
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS party_sessions_code ON ",
            PARTY_SESSIONS,
            " (party_code) WHERE status IN ('OPEN', 'IN_PROGRESS');"
        )
    }
}

/// A player linked to a party session with per-phase progress counters.
#[derive(Debug, Clone)]
pub struct PartyParticipant {
    pub participant_id: ID<PartyParticipant>,
    pub session_id: ID<PartySession>,
    pub player_id: ID<Player>,
    pub status: ParticipantStatus,
    pub is_host: bool,
    pub prompts_submitted: i32,
    pub copies_submitted: i32,
    pub votes_submitted: i32,
    pub connected: bool,
    pub joined_at: SystemTime,
    pub ready_at: Option<SystemTime>,
    pub disconnected_at: Option<SystemTime>,
    pub last_activity_at: Option<SystemTime>,
}

impl PartyParticipant {
    pub fn submitted_for(&self, phase: PartyPhase) -> i32 {
        match phase {
            PartyPhase::Prompt => self.prompts_submitted,
            PartyPhase::Copy => self.copies_submitted,
            PartyPhase::Vote => self.votes_submitted,
            _ => 0,
        }
    }
}

impl Unique for PartyParticipant {
    fn id(&self) -> ID<Self> {
        self.participant_id
    }
}

impl From<Row> for PartyParticipant {
    fn from(row: Row) -> Self {
        let status: String = row.get("status");
        Self {
            participant_id: ID::from(row.get::<_, uuid::Uuid>("participant_id")),
            session_id: ID::from(row.get::<_, uuid::Uuid>("session_id")),
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            status: ParticipantStatus::parse(&status).expect("valid participant status"),
            is_host: row.get("is_host"),
            prompts_submitted: row.get("prompts_submitted"),
            copies_submitted: row.get("copies_submitted"),
            votes_submitted: row.get("votes_submitted"),
            connected: row.get("connected"),
            joined_at: row.get("joined_at"),
            ready_at: row.get("ready_at"),
            disconnected_at: row.get("disconnected_at"),
            last_activity_at: row.get("last_activity_at"),
        }
    }
}

impl Schema for PartyParticipant {
    fn name() -> &'static str {
        PARTY_PARTICIPANTS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            PARTY_PARTICIPANTS,
            " (
                participant_id     UUID PRIMARY KEY,
                session_id         UUID NOT NULL,
                player_id          UUID NOT NULL,
                status             TEXT NOT NULL,
                is_host            BOOLEAN NOT NULL DEFAULT FALSE,
                prompts_submitted  INTEGER NOT NULL DEFAULT 0,
                copies_submitted   INTEGER NOT NULL DEFAULT 0,
                votes_submitted    INTEGER NOT NULL DEFAULT 0,
                connected          BOOLEAN NOT NULL DEFAULT FALSE,
                joined_at          TIMESTAMPTZ NOT NULL,
                ready_at           TIMESTAMPTZ,
                disconnected_at    TIMESTAMPTZ,
                last_activity_at   TIMESTAMPTZ,
                UNIQUE (session_id, player_id)
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS party_participants_session ON ",
            PARTY_PARTICIPANTS,
            " (session_id, joined_at);"
        )
    }
}

/// Link from a round to the party session it was played inside.
#[derive(Debug, Clone)]
pub struct PartyRound {
    pub party_round_id: ID<PartyRound>,
    pub session_id: ID<PartySession>,
    pub round_id: ID<Round>,
    pub participant_id: ID<PartyParticipant>,
    pub round_type: RoundType,
    pub phase: PartyPhase,
    pub created_at: SystemTime,
}

impl From<Row> for PartyRound {
    fn from(row: Row) -> Self {
        let round_type: String = row.get("round_type");
        let phase: String = row.get("phase");
        Self {
            party_round_id: ID::from(row.get::<_, uuid::Uuid>("party_round_id")),
            session_id: ID::from(row.get::<_, uuid::Uuid>("session_id")),
            round_id: ID::from(row.get::<_, uuid::Uuid>("round_id")),
            participant_id: ID::from(row.get::<_, uuid::Uuid>("participant_id")),
            round_type: RoundType::parse(&round_type).expect("valid round type"),
            phase: PartyPhase::parse(&phase).expect("valid party phase"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for PartyRound {
    fn name() -> &'static str {
        PARTY_ROUNDS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            PARTY_ROUNDS,
            " (
                party_round_id  UUID PRIMARY KEY,
                session_id      UUID NOT NULL,
                round_id        UUID NOT NULL,
                participant_id  UUID NOT NULL,
                round_type      TEXT NOT NULL,
                phase           TEXT NOT NULL,
                created_at      TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS party_rounds_session ON ",
            PARTY_ROUNDS,
            " (session_id, round_type, created_at);"
        )
    }
}

/// Link from a phraseset to the party session that produced it.
#[derive(Debug, Clone)]
pub struct PartyPhraseset {
    pub party_phraseset_id: ID<PartyPhraseset>,
    pub session_id: ID<PartySession>,
    pub phraseset_id: ID<Phraseset>,
    pub created_in_phase: PartyPhase,
    pub available_for_voting: bool,
    pub created_at: SystemTime,
}

impl From<Row> for PartyPhraseset {
    fn from(row: Row) -> Self {
        let phase: String = row.get("created_in_phase");
        Self {
            party_phraseset_id: ID::from(row.get::<_, uuid::Uuid>("party_phraseset_id")),
            session_id: ID::from(row.get::<_, uuid::Uuid>("session_id")),
            phraseset_id: ID::from(row.get::<_, uuid::Uuid>("phraseset_id")),
            created_in_phase: PartyPhase::parse(&phase).expect("valid party phase"),
            available_for_voting: row.get("available_for_voting"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for PartyPhraseset {
    fn name() -> &'static str {
        PARTY_PHRASESETS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            PARTY_PHRASESETS,
            " (
                party_phraseset_id    UUID PRIMARY KEY,
                session_id            UUID NOT NULL,
                phraseset_id          UUID NOT NULL,
                created_in_phase      TEXT NOT NULL,
                available_for_voting  BOOLEAN NOT NULL DEFAULT FALSE,
                created_at            TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS party_phrasesets_session ON ",
            PARTY_PHRASESETS,
            " (session_id);"
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait PartyRepository {
    async fn insert_session(&self, session: &PartySession) -> Result<(), PgErr>;
    async fn party_session(&self, id: ID<PartySession>) -> Result<Option<PartySession>, PgErr>;
    async fn session_by_code(&self, code: &str) -> Result<Option<PartySession>, PgErr>;
    /// Whether a code collides with any non-terminal session.
    async fn code_in_use(&self, code: &str) -> Result<bool, PgErr>;
    async fn open_sessions(&self) -> Result<Vec<PartySession>, PgErr>;
    async fn insert_participant(&self, participant: &PartyParticipant) -> Result<(), PgErr>;
    async fn participant(
        &self,
        session: ID<PartySession>,
        player: ID<Player>,
    ) -> Result<Option<PartyParticipant>, PgErr>;
    /// Ordered by join time, which is also the host-reassignment order.
    async fn participants(&self, session: ID<PartySession>)
    -> Result<Vec<PartyParticipant>, PgErr>;
    async fn participant_count(&self, session: ID<PartySession>) -> Result<i64, PgErr>;
    async fn delete_participant(&self, id: ID<PartyParticipant>) -> Result<(), PgErr>;
    /// Delete the session and cascade its participants and links.
    async fn delete_session_cascade(&self, id: ID<PartySession>) -> Result<(), PgErr>;
    async fn set_host(&self, id: ID<PartyParticipant>, is_host: bool) -> Result<(), PgErr>;
    /// The player's single non-terminal session, if any.
    async fn player_active_session(
        &self,
        player: ID<Player>,
    ) -> Result<Option<PartySession>, PgErr>;
    async fn set_participant_status(
        &self,
        id: ID<PartyParticipant>,
        status: ParticipantStatus,
        ready_at: Option<SystemTime>,
    ) -> Result<(), PgErr>;
    async fn set_all_participants_status(
        &self,
        session: ID<PartySession>,
        status: ParticipantStatus,
    ) -> Result<(), PgErr>;
    async fn set_connected(
        &self,
        id: ID<PartyParticipant>,
        connected: bool,
        now: SystemTime,
    ) -> Result<(), PgErr>;
    async fn increment_progress(
        &self,
        id: ID<PartyParticipant>,
        round_type: RoundType,
        now: SystemTime,
    ) -> Result<(), PgErr>;
    /// Flip OPEN lobby into IN_PROGRESS / PROMPT.
    async fn start_session_row(&self, id: ID<PartySession>, now: SystemTime) -> Result<(), PgErr>;
    /// Compare-and-set phase advance; false means another advancer won.
    async fn cas_phase(
        &self,
        id: ID<PartySession>,
        from: PartyPhase,
        to: PartyPhase,
        now: SystemTime,
    ) -> Result<bool, PgErr>;
    async fn set_completed_at(&self, id: ID<PartySession>, now: SystemTime) -> Result<(), PgErr>;
    async fn set_session_status(
        &self,
        id: ID<PartySession>,
        status: SessionStatus,
    ) -> Result<(), PgErr>;
    async fn link_round(&self, link: &PartyRound) -> Result<(), PgErr>;
    async fn link_phraseset(&self, link: &PartyPhraseset) -> Result<(), PgErr>;
    async fn party_rounds(&self, session: ID<PartySession>) -> Result<Vec<PartyRound>, PgErr>;
    async fn party_phrasesets(
        &self,
        session: ID<PartySession>,
    ) -> Result<Vec<PartyPhraseset>, PgErr>;
    async fn mark_phrasesets_votable(&self, session: ID<PartySession>) -> Result<(), PgErr>;
}

impl<C: GenericClient + Sync> PartyRepository for C {
    async fn insert_session(&self, session: &PartySession) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                PARTY_SESSIONS,
                " (session_id, party_code, host_player_id, min_players, max_players,
                   prompts_per_player, copies_per_player, votes_per_player, status,
                   current_phase, created_at, started_at, locked_at, phase_started_at,
                   phase_expires_at, completed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                         $15, $16)"
            ),
            &[
                &session.session_id.inner(),
                &session.party_code,
                &session.host_player_id.inner(),
                &session.min_players,
                &session.max_players,
                &session.prompts_per_player,
                &session.copies_per_player,
                &session.votes_per_player,
                &session.status.as_str(),
                &session.current_phase.as_str(),
                &session.created_at,
                &session.started_at,
                &session.locked_at,
                &session.phase_started_at,
                &session.phase_expires_at,
                &session.completed_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn party_session(&self, id: ID<PartySession>) -> Result<Option<PartySession>, PgErr> {
        self.query_opt(
            const_format::concatcp!("SELECT * FROM ", PARTY_SESSIONS, " WHERE session_id = $1"),
            &[&id.inner()],
        )
        .await
        .map(|opt| opt.map(PartySession::from))
    }

    async fn session_by_code(&self, code: &str) -> Result<Option<PartySession>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT * FROM ",
                PARTY_SESSIONS,
                " WHERE party_code = $1 AND status IN ('OPEN', 'IN_PROGRESS')
                 ORDER BY created_at DESC LIMIT 1"
            ),
            &[&code],
        )
        .await
        .map(|opt| opt.map(PartySession::from))
    }

    async fn code_in_use(&self, code: &str) -> Result<bool, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT 1 FROM ",
                PARTY_SESSIONS,
                " WHERE party_code = $1 AND status IN ('OPEN', 'IN_PROGRESS') LIMIT 1"
            ),
            &[&code],
        )
        .await
        .map(|opt| opt.is_some())
    }

    async fn open_sessions(&self) -> Result<Vec<PartySession>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                PARTY_SESSIONS,
                " WHERE status = 'OPEN' ORDER BY created_at DESC"
            ),
            &[],
        )
        .await
        .map(|rows| rows.into_iter().map(PartySession::from).collect())
    }

    async fn insert_participant(&self, participant: &PartyParticipant) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                PARTY_PARTICIPANTS,
                " (participant_id, session_id, player_id, status, is_host,
                   prompts_submitted, copies_submitted, votes_submitted, connected,
                   joined_at, ready_at, disconnected_at, last_activity_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
            ),
            &[
                &participant.participant_id.inner(),
                &participant.session_id.inner(),
                &participant.player_id.inner(),
                &participant.status.as_str(),
                &participant.is_host,
                &participant.prompts_submitted,
                &participant.copies_submitted,
                &participant.votes_submitted,
                &participant.connected,
                &participant.joined_at,
                &participant.ready_at,
                &participant.disconnected_at,
                &participant.last_activity_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn participant(
        &self,
        session: ID<PartySession>,
        player: ID<Player>,
    ) -> Result<Option<PartyParticipant>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT * FROM ",
                PARTY_PARTICIPANTS,
                " WHERE session_id = $1 AND player_id = $2"
            ),
            &[&session.inner(), &player.inner()],
        )
        .await
        .map(|opt| opt.map(PartyParticipant::from))
    }

    async fn participants(
        &self,
        session: ID<PartySession>,
    ) -> Result<Vec<PartyParticipant>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                PARTY_PARTICIPANTS,
                " WHERE session_id = $1 ORDER BY joined_at ASC"
            ),
            &[&session.inner()],
        )
        .await
        .map(|rows| rows.into_iter().map(PartyParticipant::from).collect())
    }

    async fn participant_count(&self, session: ID<PartySession>) -> Result<i64, PgErr> {
        self.query_one(
            const_format::concatcp!(
                "SELECT COUNT(*) FROM ",
                PARTY_PARTICIPANTS,
                " WHERE session_id = $1"
            ),
            &[&session.inner()],
        )
        .await
        .map(|row| row.get(0))
    }

    async fn delete_participant(&self, id: ID<PartyParticipant>) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "DELETE FROM ",
                PARTY_PARTICIPANTS,
                " WHERE participant_id = $1"
            ),
            &[&id.inner()],
        )
        .await
        .map(|_| ())
    }

    async fn delete_session_cascade(&self, id: ID<PartySession>) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!("DELETE FROM ", PARTY_ROUNDS, " WHERE session_id = $1"),
            &[&id.inner()],
        )
        .await?;
        self.execute(
            const_format::concatcp!("DELETE FROM ", PARTY_PHRASESETS, " WHERE session_id = $1"),
            &[&id.inner()],
        )
        .await?;
        self.execute(
            const_format::concatcp!(
                "DELETE FROM ",
                PARTY_PARTICIPANTS,
                " WHERE session_id = $1"
            ),
            &[&id.inner()],
        )
        .await?;
        self.execute(
            const_format::concatcp!("DELETE FROM ", PARTY_SESSIONS, " WHERE session_id = $1"),
            &[&id.inner()],
        )
        .await
        .map(|_| ())
    }

    async fn set_host(&self, id: ID<PartyParticipant>, is_host: bool) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_PARTICIPANTS,
                " SET is_host = $2 WHERE participant_id = $1"
            ),
            &[&id.inner(), &is_host],
        )
        .await
        .map(|_| ())
    }

    async fn player_active_session(
        &self,
        player: ID<Player>,
    ) -> Result<Option<PartySession>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT s.* FROM ",
                PARTY_SESSIONS,
                " s JOIN ",
                PARTY_PARTICIPANTS,
                " p ON p.session_id = s.session_id
                 WHERE p.player_id = $1 AND s.status IN ('OPEN', 'IN_PROGRESS')
                 LIMIT 1"
            ),
            &[&player.inner()],
        )
        .await
        .map(|opt| opt.map(PartySession::from))
    }

    async fn set_participant_status(
        &self,
        id: ID<PartyParticipant>,
        status: ParticipantStatus,
        ready_at: Option<SystemTime>,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_PARTICIPANTS,
                " SET status = $2, ready_at = $3 WHERE participant_id = $1"
            ),
            &[&id.inner(), &status.as_str(), &ready_at],
        )
        .await
        .map(|_| ())
    }

    async fn set_all_participants_status(
        &self,
        session: ID<PartySession>,
        status: ParticipantStatus,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_PARTICIPANTS,
                " SET status = $2 WHERE session_id = $1"
            ),
            &[&session.inner(), &status.as_str()],
        )
        .await
        .map(|_| ())
    }

    async fn set_connected(
        &self,
        id: ID<PartyParticipant>,
        connected: bool,
        now: SystemTime,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_PARTICIPANTS,
                " SET connected = $2,
                      last_activity_at = $3,
                      disconnected_at = CASE WHEN $2 THEN NULL ELSE $3 END
                 WHERE participant_id = $1"
            ),
            &[&id.inner(), &connected, &now],
        )
        .await
        .map(|_| ())
    }

    async fn increment_progress(
        &self,
        id: ID<PartyParticipant>,
        round_type: RoundType,
        now: SystemTime,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_PARTICIPANTS,
                " SET prompts_submitted = prompts_submitted
                          + CASE WHEN $2 = 'prompt' THEN 1 ELSE 0 END,
                      copies_submitted = copies_submitted
                          + CASE WHEN $2 = 'copy' THEN 1 ELSE 0 END,
                      votes_submitted = votes_submitted
                          + CASE WHEN $2 = 'vote' THEN 1 ELSE 0 END,
                      last_activity_at = $3
                 WHERE participant_id = $1"
            ),
            &[&id.inner(), &round_type.as_str(), &now],
        )
        .await
        .map(|_| ())
    }

    async fn start_session_row(&self, id: ID<PartySession>, now: SystemTime) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_SESSIONS,
                " SET status = 'IN_PROGRESS', current_phase = 'PROMPT', started_at = $2,
                      locked_at = $2, phase_started_at = $2
                 WHERE session_id = $1 AND status = 'OPEN'"
            ),
            &[&id.inner(), &now],
        )
        .await
        .map(|_| ())
    }

    async fn cas_phase(
        &self,
        id: ID<PartySession>,
        from: PartyPhase,
        to: PartyPhase,
        now: SystemTime,
    ) -> Result<bool, PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_SESSIONS,
                " SET current_phase = $3, phase_started_at = $4
                 WHERE session_id = $1 AND current_phase = $2"
            ),
            &[&id.inner(), &from.as_str(), &to.as_str(), &now],
        )
        .await
        .map(|n| n > 0)
    }

    async fn set_completed_at(&self, id: ID<PartySession>, now: SystemTime) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_SESSIONS,
                " SET completed_at = $2 WHERE session_id = $1"
            ),
            &[&id.inner(), &now],
        )
        .await
        .map(|_| ())
    }

    async fn set_session_status(
        &self,
        id: ID<PartySession>,
        status: SessionStatus,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_SESSIONS,
                " SET status = $2 WHERE session_id = $1"
            ),
            &[&id.inner(), &status.as_str()],
        )
        .await
        .map(|_| ())
    }

    async fn link_round(&self, link: &PartyRound) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                PARTY_ROUNDS,
                " (party_round_id, session_id, round_id, participant_id, round_type,
                   phase, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ),
            &[
                &link.party_round_id.inner(),
                &link.session_id.inner(),
                &link.round_id.inner(),
                &link.participant_id.inner(),
                &link.round_type.as_str(),
                &link.phase.as_str(),
                &link.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn link_phraseset(&self, link: &PartyPhraseset) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                PARTY_PHRASESETS,
                " (party_phraseset_id, session_id, phraseset_id, created_in_phase,
                   available_for_voting, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)"
            ),
            &[
                &link.party_phraseset_id.inner(),
                &link.session_id.inner(),
                &link.phraseset_id.inner(),
                &link.created_in_phase.as_str(),
                &link.available_for_voting,
                &link.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn party_rounds(&self, session: ID<PartySession>) -> Result<Vec<PartyRound>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                PARTY_ROUNDS,
                " WHERE session_id = $1 ORDER BY created_at ASC"
            ),
            &[&session.inner()],
        )
        .await
        .map(|rows| rows.into_iter().map(PartyRound::from).collect())
    }

    async fn party_phrasesets(
        &self,
        session: ID<PartySession>,
    ) -> Result<Vec<PartyPhraseset>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                PARTY_PHRASESETS,
                " WHERE session_id = $1 ORDER BY created_at ASC"
            ),
            &[&session.inner()],
        )
        .await
        .map(|rows| rows.into_iter().map(PartyPhraseset::from).collect())
    }

    async fn mark_phrasesets_votable(&self, session: ID<PartySession>) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PARTY_PHRASESETS,
                " SET available_for_voting = TRUE WHERE session_id = $1"
            ),
            &[&session.inner()],
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_progression_is_strictly_linear() {
        assert_eq!(PartyPhase::Lobby.next(), Some(PartyPhase::Prompt));
        assert_eq!(PartyPhase::Prompt.next(), Some(PartyPhase::Copy));
        assert_eq!(PartyPhase::Copy.next(), Some(PartyPhase::Vote));
        assert_eq!(PartyPhase::Vote.next(), Some(PartyPhase::Results));
        assert_eq!(PartyPhase::Results.next(), Some(PartyPhase::Completed));
        assert_eq!(PartyPhase::Completed.next(), None);
    }

    #[test]
    fn work_phases_map_to_round_types() {
        assert_eq!(PartyPhase::Prompt.round_type(), Some(RoundType::Prompt));
        assert_eq!(PartyPhase::Vote.round_type(), Some(RoundType::Vote));
        assert_eq!(PartyPhase::Lobby.round_type(), None);
        assert_eq!(PartyPhase::Results.round_type(), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
        assert!(!SessionStatus::Open.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
    }
}
