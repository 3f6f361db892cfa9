use crate::Phraseset;
use crate::Player;
use pf_core::Coins;
use pf_core::GameType;
use pf_core::ID;
use pf_core::RoundType;
use pf_core::Unique;
use pf_database::PgErr;
use pf_database::ROUNDS;
use pf_database::Schema;
use std::time::SystemTime;
use tokio_postgres::GenericClient;
use tokio_postgres::Row;

/// Lifecycle of a billable round. Transitions are monotonic; a round never
/// returns to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    Active,
    Submitted,
    Expired,
    Abandoned,
    Completed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Submitted => "submitted",
            Self::Expired => "expired",
            Self::Abandoned => "abandoned",
            Self::Completed => "completed",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "submitted" => Some(Self::Submitted),
            "expired" => Some(Self::Expired),
            "abandoned" => Some(Self::Abandoned),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// The billable unit of activity, shared by all round-based games.
#[derive(Debug, Clone)]
pub struct Round {
    pub round_id: ID<Round>,
    pub player_id: ID<Player>,
    pub game: GameType,
    pub round_type: RoundType,
    pub status: RoundStatus,
    pub cost: Coins,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    /// Denormalized so copy/vote flows never join back to the prompt round.
    pub prompt_text: String,
    pub submitted_phrase: Option<String>,
    pub copy_phrase: Option<String>,
    pub chosen_phrase: Option<String>,
    /// For copy rounds: the prompt round being copied.
    pub prompt_round_id: Option<ID<Round>>,
    /// For vote rounds and submitted prompts: the owning phraseset.
    pub phraseset_id: Option<ID<Phraseset>>,
}

impl Unique for Round {
    fn id(&self) -> ID<Self> {
        self.round_id
    }
}

impl From<Row> for Round {
    fn from(row: Row) -> Self {
        let round_type: String = row.get("round_type");
        let status: String = row.get("status");
        let game: String = row.get("game");
        Self {
            round_id: ID::from(row.get::<_, uuid::Uuid>("round_id")),
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            game: match game.as_str() {
                "qf" => GameType::Qf,
                "ir" => GameType::Ir,
                _ => GameType::Tl,
            },
            round_type: RoundType::parse(&round_type).expect("valid round type"),
            status: RoundStatus::parse(&status).expect("valid round status"),
            cost: row.get("cost"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
            prompt_text: row.get("prompt_text"),
            submitted_phrase: row.get("submitted_phrase"),
            copy_phrase: row.get("copy_phrase"),
            chosen_phrase: row.get("chosen_phrase"),
            prompt_round_id: row
                .get::<_, Option<uuid::Uuid>>("prompt_round_id")
                .map(ID::from),
            phraseset_id: row
                .get::<_, Option<uuid::Uuid>>("phraseset_id")
                .map(ID::from),
        }
    }
}

impl Schema for Round {
    fn name() -> &'static str {
        ROUNDS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            ROUNDS,
            " (
                round_id          UUID PRIMARY KEY,
                player_id         UUID NOT NULL,
                game              TEXT NOT NULL,
                round_type        TEXT NOT NULL,
                status            TEXT NOT NULL,
                cost              BIGINT NOT NULL,
                created_at        TIMESTAMPTZ NOT NULL,
                expires_at        TIMESTAMPTZ NOT NULL,
                prompt_text       TEXT NOT NULL DEFAULT '',
                submitted_phrase  TEXT,
                copy_phrase       TEXT,
                chosen_phrase     TEXT,
                prompt_round_id   UUID,
                phraseset_id      UUID
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS rounds_player_status ON ",
            ROUNDS,
            " (player_id, game, status);
             CREATE INDEX IF NOT EXISTS rounds_expiry ON ",
            ROUNDS,
            " (status, expires_at);"
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait RoundRepository {
    async fn insert_round(&self, round: &Round) -> Result<(), PgErr>;
    async fn round(&self, id: ID<Round>) -> Result<Option<Round>, PgErr>;
    /// The player's single active round for a game, if any.
    async fn active_round(
        &self,
        player: ID<Player>,
        game: GameType,
    ) -> Result<Option<Round>, PgErr>;
    async fn store_prompt_submission(&self, id: ID<Round>, phrase: &str) -> Result<(), PgErr>;
    async fn store_copy_submission(&self, id: ID<Round>, phrase: &str) -> Result<(), PgErr>;
    async fn store_vote_submission(
        &self,
        id: ID<Round>,
        chosen: &str,
        phraseset: ID<Phraseset>,
    ) -> Result<(), PgErr>;
    async fn set_status(&self, id: ID<Round>, status: RoundStatus) -> Result<(), PgErr>;
    async fn set_phraseset(&self, id: ID<Round>, phraseset: ID<Phraseset>) -> Result<(), PgErr>;
    /// Rounds still `active` whose grace-adjusted deadline has passed.
    async fn expired_candidates(&self, deadline: SystemTime) -> Result<Vec<Round>, PgErr>;
    /// Prompt rounds this player has already copied.
    async fn prompts_copied_by(&self, player: ID<Player>) -> Result<Vec<ID<Round>>, PgErr>;
    /// Prompt rounds whose copy this player abandoned after the cutoff.
    async fn prompts_abandoned_by(
        &self,
        player: ID<Player>,
        cutoff: SystemTime,
    ) -> Result<Vec<ID<Round>>, PgErr>;
    async fn has_voted_on(
        &self,
        player: ID<Player>,
        phraseset: ID<Phraseset>,
    ) -> Result<bool, PgErr>;
    /// Submitted prompt rounds by this player not yet rolled into a phraseset.
    async fn outstanding_prompts(&self, player: ID<Player>) -> Result<i64, PgErr>;
    /// Submitted prompt rounds not yet in a phraseset and older than the
    /// cutoff, oldest first. The AI backup queue for copies.
    async fn stalled_prompt_rounds(
        &self,
        cutoff: SystemTime,
        limit: i64,
    ) -> Result<Vec<Round>, PgErr>;
    /// First submitted copy round for a prompt round, oldest first.
    async fn first_copy_phrase(&self, prompt_round: ID<Round>) -> Result<Option<String>, PgErr>;
    /// Copy rounds submitted against a prompt round, oldest first.
    async fn submitted_copies(&self, prompt_round: ID<Round>) -> Result<Vec<Round>, PgErr>;
}

impl<C: GenericClient + Sync> RoundRepository for C {
    async fn insert_round(&self, round: &Round) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                ROUNDS,
                " (round_id, player_id, game, round_type, status, cost, created_at,
                   expires_at, prompt_text, submitted_phrase, copy_phrase, chosen_phrase,
                   prompt_round_id, phraseset_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
            ),
            &[
                &round.round_id.inner(),
                &round.player_id.inner(),
                &round.game.as_str(),
                &round.round_type.as_str(),
                &round.status.as_str(),
                &round.cost,
                &round.created_at,
                &round.expires_at,
                &round.prompt_text,
                &round.submitted_phrase,
                &round.copy_phrase,
                &round.chosen_phrase,
                &round.prompt_round_id.map(|id| id.inner()),
                &round.phraseset_id.map(|id| id.inner()),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn round(&self, id: ID<Round>) -> Result<Option<Round>, PgErr> {
        self.query_opt(
            const_format::concatcp!("SELECT * FROM ", ROUNDS, " WHERE round_id = $1"),
            &[&id.inner()],
        )
        .await
        .map(|opt| opt.map(Round::from))
    }

    async fn active_round(
        &self,
        player: ID<Player>,
        game: GameType,
    ) -> Result<Option<Round>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT * FROM ",
                ROUNDS,
                " WHERE player_id = $1 AND game = $2 AND status = 'active' LIMIT 1"
            ),
            &[&player.inner(), &game.as_str()],
        )
        .await
        .map(|opt| opt.map(Round::from))
    }

    async fn store_prompt_submission(&self, id: ID<Round>, phrase: &str) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                ROUNDS,
                " SET status = 'submitted', submitted_phrase = $2 WHERE round_id = $1"
            ),
            &[&id.inner(), &phrase],
        )
        .await
        .map(|_| ())
    }

    async fn store_copy_submission(&self, id: ID<Round>, phrase: &str) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                ROUNDS,
                " SET status = 'submitted', copy_phrase = $2 WHERE round_id = $1"
            ),
            &[&id.inner(), &phrase],
        )
        .await
        .map(|_| ())
    }

    async fn store_vote_submission(
        &self,
        id: ID<Round>,
        chosen: &str,
        phraseset: ID<Phraseset>,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                ROUNDS,
                " SET status = 'submitted', chosen_phrase = $2, phraseset_id = $3
                 WHERE round_id = $1"
            ),
            &[&id.inner(), &chosen, &phraseset.inner()],
        )
        .await
        .map(|_| ())
    }

    async fn set_status(&self, id: ID<Round>, status: RoundStatus) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!("UPDATE ", ROUNDS, " SET status = $2 WHERE round_id = $1"),
            &[&id.inner(), &status.as_str()],
        )
        .await
        .map(|_| ())
    }

    async fn set_phraseset(&self, id: ID<Round>, phraseset: ID<Phraseset>) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                ROUNDS,
                " SET phraseset_id = $2 WHERE round_id = $1"
            ),
            &[&id.inner(), &phraseset.inner()],
        )
        .await
        .map(|_| ())
    }

    async fn expired_candidates(&self, deadline: SystemTime) -> Result<Vec<Round>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                ROUNDS,
                " WHERE status = 'active' AND expires_at < $1 ORDER BY expires_at ASC"
            ),
            &[&deadline],
        )
        .await
        .map(|rows| rows.into_iter().map(Round::from).collect())
    }

    async fn prompts_copied_by(&self, player: ID<Player>) -> Result<Vec<ID<Round>>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT DISTINCT prompt_round_id FROM ",
                ROUNDS,
                " WHERE player_id = $1 AND round_type = 'copy' AND prompt_round_id IS NOT NULL"
            ),
            &[&player.inner()],
        )
        .await
        .map(|rows| {
            rows.into_iter()
                .map(|row| ID::from(row.get::<_, uuid::Uuid>(0)))
                .collect()
        })
    }

    async fn prompts_abandoned_by(
        &self,
        player: ID<Player>,
        cutoff: SystemTime,
    ) -> Result<Vec<ID<Round>>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT DISTINCT prompt_round_id FROM ",
                ROUNDS,
                " WHERE player_id = $1 AND round_type = 'copy' AND status = 'abandoned'
                   AND prompt_round_id IS NOT NULL AND created_at >= $2"
            ),
            &[&player.inner(), &cutoff],
        )
        .await
        .map(|rows| {
            rows.into_iter()
                .map(|row| ID::from(row.get::<_, uuid::Uuid>(0)))
                .collect()
        })
    }

    async fn has_voted_on(
        &self,
        player: ID<Player>,
        phraseset: ID<Phraseset>,
    ) -> Result<bool, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT 1 FROM ",
                ROUNDS,
                " WHERE player_id = $1 AND round_type = 'vote' AND phraseset_id = $2 LIMIT 1"
            ),
            &[&player.inner(), &phraseset.inner()],
        )
        .await
        .map(|opt| opt.is_some())
    }

    async fn outstanding_prompts(&self, player: ID<Player>) -> Result<i64, PgErr> {
        self.query_one(
            const_format::concatcp!(
                "SELECT COUNT(*) FROM ",
                ROUNDS,
                " WHERE player_id = $1 AND round_type = 'prompt' AND status = 'submitted'
                   AND phraseset_id IS NULL"
            ),
            &[&player.inner()],
        )
        .await
        .map(|row| row.get(0))
    }

    async fn stalled_prompt_rounds(
        &self,
        cutoff: SystemTime,
        limit: i64,
    ) -> Result<Vec<Round>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                ROUNDS,
                " WHERE round_type = 'prompt' AND status = 'submitted'
                   AND phraseset_id IS NULL AND created_at <= $1
                 ORDER BY created_at ASC LIMIT $2"
            ),
            &[&cutoff, &limit],
        )
        .await
        .map(|rows| rows.into_iter().map(Round::from).collect())
    }

    async fn first_copy_phrase(&self, prompt_round: ID<Round>) -> Result<Option<String>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT copy_phrase FROM ",
                ROUNDS,
                " WHERE prompt_round_id = $1 AND round_type = 'copy' AND status = 'submitted'
                 ORDER BY created_at ASC LIMIT 1"
            ),
            &[&prompt_round.inner()],
        )
        .await
        .map(|opt| opt.and_then(|row| row.get(0)))
    }

    async fn submitted_copies(&self, prompt_round: ID<Round>) -> Result<Vec<Round>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                ROUNDS,
                " WHERE prompt_round_id = $1 AND round_type = 'copy' AND status = 'submitted'
                 ORDER BY created_at ASC"
            ),
            &[&prompt_round.inner()],
        )
        .await
        .map(|rows| rows.into_iter().map(Round::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for s in [
            RoundStatus::Active,
            RoundStatus::Submitted,
            RoundStatus::Expired,
            RoundStatus::Abandoned,
            RoundStatus::Completed,
        ] {
            assert_eq!(RoundStatus::parse(s.as_str()), Some(s));
        }
    }
}
