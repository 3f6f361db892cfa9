use crate::Player;
use crate::Round;
use pf_core::Coins;
use pf_core::ID;
use pf_core::Unique;
use pf_database::PHRASESETS;
use pf_database::PgErr;
use pf_database::Schema;
use pf_database::VOTES;
use std::time::SystemTime;
use tokio_postgres::GenericClient;
use tokio_postgres::Row;

/// QF phraseset lifecycle. `Closing` is the QF-only intermediate window; IR
/// sets go straight from voting to finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhrasesetStatus {
    Open,
    Voting,
    Closing,
    Finalized,
}

impl PhrasesetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Voting => "voting",
            Self::Closing => "closing",
            Self::Finalized => "finalized",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "voting" => Some(Self::Voting),
            "closing" => Some(Self::Closing),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

/// Which of the three phrases a vote landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseSlot {
    Original,
    Copy1,
    Copy2,
}

impl PhraseSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Copy1 => "copy1",
            Self::Copy2 => "copy2",
        }
    }
}

/// A completed (prompt, copy, copy) triple available for voting.
#[derive(Debug, Clone)]
pub struct Phraseset {
    pub phraseset_id: ID<Phraseset>,
    pub prompt_round_id: ID<Round>,
    pub copy_round_1_id: ID<Round>,
    pub copy_round_2_id: ID<Round>,
    pub prompt_text: String,
    pub original_phrase: String,
    pub copy_phrase_1: String,
    pub copy_phrase_2: String,
    pub status: PhrasesetStatus,
    pub vote_count: i64,
    pub original_votes: i64,
    pub copy1_votes: i64,
    pub copy2_votes: i64,
    /// Accumulated contributions plus non-contributor vote costs.
    pub prize_pool: Coins,
    pub created_at: SystemTime,
    pub voting_started_at: Option<SystemTime>,
    pub closing_started_at: Option<SystemTime>,
    pub finalized_at: Option<SystemTime>,
}

impl Phraseset {
    /// Find which slot a phrase occupies, if any.
    pub fn slot_of(&self, phrase: &str) -> Option<PhraseSlot> {
        if phrase == self.original_phrase {
            Some(PhraseSlot::Original)
        } else if phrase == self.copy_phrase_1 {
            Some(PhraseSlot::Copy1)
        } else if phrase == self.copy_phrase_2 {
            Some(PhraseSlot::Copy2)
        } else {
            None
        }
    }
    pub fn contributor_rounds(&self) -> [ID<Round>; 3] {
        [
            self.prompt_round_id,
            self.copy_round_1_id,
            self.copy_round_2_id,
        ]
    }
}

impl Unique for Phraseset {
    fn id(&self) -> ID<Self> {
        self.phraseset_id
    }
}

impl From<Row> for Phraseset {
    fn from(row: Row) -> Self {
        let status: String = row.get("status");
        Self {
            phraseset_id: ID::from(row.get::<_, uuid::Uuid>("phraseset_id")),
            prompt_round_id: ID::from(row.get::<_, uuid::Uuid>("prompt_round_id")),
            copy_round_1_id: ID::from(row.get::<_, uuid::Uuid>("copy_round_1_id")),
            copy_round_2_id: ID::from(row.get::<_, uuid::Uuid>("copy_round_2_id")),
            prompt_text: row.get("prompt_text"),
            original_phrase: row.get("original_phrase"),
            copy_phrase_1: row.get("copy_phrase_1"),
            copy_phrase_2: row.get("copy_phrase_2"),
            status: PhrasesetStatus::parse(&status).expect("valid phraseset status"),
            vote_count: row.get("vote_count"),
            original_votes: row.get("original_votes"),
            copy1_votes: row.get("copy1_votes"),
            copy2_votes: row.get("copy2_votes"),
            prize_pool: row.get("prize_pool"),
            created_at: row.get("created_at"),
            voting_started_at: row.get("voting_started_at"),
            closing_started_at: row.get("closing_started_at"),
            finalized_at: row.get("finalized_at"),
        }
    }
}

impl Schema for Phraseset {
    fn name() -> &'static str {
        PHRASESETS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            PHRASESETS,
            " (
                phraseset_id       UUID PRIMARY KEY,
                prompt_round_id    UUID NOT NULL,
                copy_round_1_id    UUID NOT NULL,
                copy_round_2_id    UUID NOT NULL,
                prompt_text        TEXT NOT NULL,
                original_phrase    TEXT NOT NULL,
                copy_phrase_1      TEXT NOT NULL,
                copy_phrase_2      TEXT NOT NULL,
                status             TEXT NOT NULL,
                vote_count         BIGINT NOT NULL DEFAULT 0,
                original_votes     BIGINT NOT NULL DEFAULT 0,
                copy1_votes        BIGINT NOT NULL DEFAULT 0,
                copy2_votes        BIGINT NOT NULL DEFAULT 0,
                prize_pool         BIGINT NOT NULL DEFAULT 0,
                created_at         TIMESTAMPTZ NOT NULL,
                voting_started_at  TIMESTAMPTZ,
                closing_started_at TIMESTAMPTZ,
                finalized_at       TIMESTAMPTZ
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS phrasesets_status ON ",
            PHRASESETS,
            " (status, created_at);"
        )
    }
}

/// A single vote on a phraseset.
#[derive(Debug, Clone)]
pub struct Vote {
    pub vote_id: ID<Vote>,
    pub phraseset_id: ID<Phraseset>,
    pub round_id: ID<Round>,
    pub player_id: ID<Player>,
    pub voted_phrase: String,
    pub correct: bool,
    pub created_at: SystemTime,
}

impl From<Row> for Vote {
    fn from(row: Row) -> Self {
        Self {
            vote_id: ID::from(row.get::<_, uuid::Uuid>("vote_id")),
            phraseset_id: ID::from(row.get::<_, uuid::Uuid>("phraseset_id")),
            round_id: ID::from(row.get::<_, uuid::Uuid>("round_id")),
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            voted_phrase: row.get("voted_phrase"),
            correct: row.get("correct"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for Vote {
    fn name() -> &'static str {
        VOTES
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            VOTES,
            " (
                vote_id       UUID PRIMARY KEY,
                phraseset_id  UUID NOT NULL,
                round_id      UUID NOT NULL,
                player_id     UUID NOT NULL,
                voted_phrase  TEXT NOT NULL,
                correct       BOOLEAN NOT NULL,
                created_at    TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS votes_phraseset ON ",
            VOTES,
            " (phraseset_id);"
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait PhrasesetRepository {
    async fn insert_phraseset(&self, set: &Phraseset) -> Result<(), PgErr>;
    async fn phraseset(&self, id: ID<Phraseset>) -> Result<Option<Phraseset>, PgErr>;
    async fn phrasesets_by_ids(&self, ids: &[uuid::Uuid]) -> Result<Vec<Phraseset>, PgErr>;
    /// Append a vote and bump the aggregate counters in one statement pair.
    async fn record_vote(&self, vote: &Vote, slot: PhraseSlot) -> Result<(), PgErr>;
    async fn add_to_pool(&self, id: ID<Phraseset>, amount: Coins) -> Result<(), PgErr>;
    async fn votes_for(&self, id: ID<Phraseset>) -> Result<Vec<Vote>, PgErr>;
    async fn votes_by_rounds(&self, round_ids: &[uuid::Uuid]) -> Result<Vec<Vote>, PgErr>;
    async fn set_voting(&self, id: ID<Phraseset>, now: SystemTime) -> Result<(), PgErr>;
    async fn set_closing(&self, id: ID<Phraseset>, now: SystemTime) -> Result<(), PgErr>;
    /// Idempotent: only flips `voting`/`closing` sets; returns whether this
    /// call performed the transition.
    async fn set_finalized(&self, id: ID<Phraseset>, now: SystemTime) -> Result<bool, PgErr>;
    async fn phrasesets_in_status(&self, status: PhrasesetStatus) -> Result<Vec<Phraseset>, PgErr>;
}

impl<C: GenericClient + Sync> PhrasesetRepository for C {
    async fn insert_phraseset(&self, set: &Phraseset) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                PHRASESETS,
                " (phraseset_id, prompt_round_id, copy_round_1_id, copy_round_2_id,
                   prompt_text, original_phrase, copy_phrase_1, copy_phrase_2, status,
                   vote_count, original_votes, copy1_votes, copy2_votes, prize_pool,
                   created_at, voting_started_at, closing_started_at, finalized_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                         $15, $16, $17, $18)"
            ),
            &[
                &set.phraseset_id.inner(),
                &set.prompt_round_id.inner(),
                &set.copy_round_1_id.inner(),
                &set.copy_round_2_id.inner(),
                &set.prompt_text,
                &set.original_phrase,
                &set.copy_phrase_1,
                &set.copy_phrase_2,
                &set.status.as_str(),
                &set.vote_count,
                &set.original_votes,
                &set.copy1_votes,
                &set.copy2_votes,
                &set.prize_pool,
                &set.created_at,
                &set.voting_started_at,
                &set.closing_started_at,
                &set.finalized_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn phraseset(&self, id: ID<Phraseset>) -> Result<Option<Phraseset>, PgErr> {
        self.query_opt(
            const_format::concatcp!("SELECT * FROM ", PHRASESETS, " WHERE phraseset_id = $1"),
            &[&id.inner()],
        )
        .await
        .map(|opt| opt.map(Phraseset::from))
    }

    async fn phrasesets_by_ids(&self, ids: &[uuid::Uuid]) -> Result<Vec<Phraseset>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                PHRASESETS,
                " WHERE phraseset_id = ANY($1)"
            ),
            &[&ids],
        )
        .await
        .map(|rows| rows.into_iter().map(Phraseset::from).collect())
    }

    async fn record_vote(&self, vote: &Vote, slot: PhraseSlot) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                VOTES,
                " (vote_id, phraseset_id, round_id, player_id, voted_phrase, correct, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ),
            &[
                &vote.vote_id.inner(),
                &vote.phraseset_id.inner(),
                &vote.round_id.inner(),
                &vote.player_id.inner(),
                &vote.voted_phrase,
                &vote.correct,
                &vote.created_at,
            ],
        )
        .await?;
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PHRASESETS,
                " SET vote_count = vote_count + 1,
                      original_votes = original_votes + CASE WHEN $2 = 'original' THEN 1 ELSE 0 END,
                      copy1_votes = copy1_votes + CASE WHEN $2 = 'copy1' THEN 1 ELSE 0 END,
                      copy2_votes = copy2_votes + CASE WHEN $2 = 'copy2' THEN 1 ELSE 0 END
                 WHERE phraseset_id = $1"
            ),
            &[&vote.phraseset_id.inner(), &slot.as_str()],
        )
        .await
        .map(|_| ())
    }

    async fn add_to_pool(&self, id: ID<Phraseset>, amount: Coins) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PHRASESETS,
                " SET prize_pool = prize_pool + $2 WHERE phraseset_id = $1"
            ),
            &[&id.inner(), &amount],
        )
        .await
        .map(|_| ())
    }

    async fn votes_for(&self, id: ID<Phraseset>) -> Result<Vec<Vote>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                VOTES,
                " WHERE phraseset_id = $1 ORDER BY created_at ASC"
            ),
            &[&id.inner()],
        )
        .await
        .map(|rows| rows.into_iter().map(Vote::from).collect())
    }

    async fn votes_by_rounds(&self, round_ids: &[uuid::Uuid]) -> Result<Vec<Vote>, PgErr> {
        self.query(
            const_format::concatcp!("SELECT * FROM ", VOTES, " WHERE round_id = ANY($1)"),
            &[&round_ids],
        )
        .await
        .map(|rows| rows.into_iter().map(Vote::from).collect())
    }

    async fn set_voting(&self, id: ID<Phraseset>, now: SystemTime) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PHRASESETS,
                " SET status = 'voting', voting_started_at = $2
                 WHERE phraseset_id = $1 AND status = 'open'"
            ),
            &[&id.inner(), &now],
        )
        .await
        .map(|_| ())
    }

    async fn set_closing(&self, id: ID<Phraseset>, now: SystemTime) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PHRASESETS,
                " SET status = 'closing', closing_started_at = $2
                 WHERE phraseset_id = $1 AND status = 'voting'"
            ),
            &[&id.inner(), &now],
        )
        .await
        .map(|_| ())
    }

    async fn set_finalized(&self, id: ID<Phraseset>, now: SystemTime) -> Result<bool, PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PHRASESETS,
                " SET status = 'finalized', finalized_at = $2
                 WHERE phraseset_id = $1 AND status IN ('voting', 'closing')"
            ),
            &[&id.inner(), &now],
        )
        .await
        .map(|n| n > 0)
    }

    async fn phrasesets_in_status(&self, status: PhrasesetStatus) -> Result<Vec<Phraseset>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                PHRASESETS,
                " WHERE status = $1 ORDER BY created_at ASC"
            ),
            &[&status.as_str()],
        )
        .await
        .map(|rows| rows.into_iter().map(Phraseset::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Phraseset {
        Phraseset {
            phraseset_id: ID::default(),
            prompt_round_id: ID::default(),
            copy_round_1_id: ID::default(),
            copy_round_2_id: ID::default(),
            prompt_text: "things you shout at a wedding".into(),
            original_phrase: "kiss the bride".into(),
            copy_phrase_1: "free cake forever".into(),
            copy_phrase_2: "run while able".into(),
            status: PhrasesetStatus::Voting,
            vote_count: 0,
            original_votes: 0,
            copy1_votes: 0,
            copy2_votes: 0,
            prize_pool: 200,
            created_at: SystemTime::UNIX_EPOCH,
            voting_started_at: None,
            closing_started_at: None,
            finalized_at: None,
        }
    }

    #[test]
    fn slot_lookup_matches_exact_phrase() {
        let set = sample();
        assert_eq!(set.slot_of("kiss the bride"), Some(PhraseSlot::Original));
        assert_eq!(set.slot_of("free cake forever"), Some(PhraseSlot::Copy1));
        assert_eq!(set.slot_of("run while able"), Some(PhraseSlot::Copy2));
        assert_eq!(set.slot_of("something else"), None);
    }
}
