use pf_core::Coins;
use pf_core::GameType;
use pf_core::ID;
use pf_core::Unique;
use pf_database::PgErr;
use pf_database::PLAYERS;
use pf_database::PLAYER_GAME_DATA;
use pf_database::Schema;
use std::time::SystemTime;
use tokio_postgres::GenericClient;
use tokio_postgres::Row;

/// Email domain marking system-owned AI accounts.
pub const AI_EMAIL_DOMAIN: &str = "@phraseforge.internal";

/// A player account. Per-game balances live in [`PlayerGameData`].
#[derive(Debug, Clone)]
pub struct Player {
    pub player_id: ID<Player>,
    pub username: String,
    /// Lowercased username, unique across accounts.
    pub canonical_name: String,
    pub email: Option<String>,
    pub is_guest: bool,
    pub anonymized: bool,
    pub created_at: SystemTime,
    pub last_active_at: SystemTime,
}

impl Player {
    pub fn new(username: String, email: Option<String>, is_guest: bool, now: SystemTime) -> Self {
        let canonical_name = username.to_lowercase();
        Self {
            player_id: ID::default(),
            username,
            canonical_name,
            email,
            is_guest,
            anonymized: false,
            created_at: now,
            last_active_at: now,
        }
    }
    /// AI accounts are recognized by their internal email domain.
    pub fn is_ai(&self) -> bool {
        self.email
            .as_deref()
            .is_some_and(|e| e.ends_with(AI_EMAIL_DOMAIN))
    }
}

impl Unique for Player {
    fn id(&self) -> ID<Self> {
        self.player_id
    }
}

impl From<Row> for Player {
    fn from(row: Row) -> Self {
        Self {
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            username: row.get("username"),
            canonical_name: row.get("canonical_name"),
            email: row.get("email"),
            is_guest: row.get("is_guest"),
            anonymized: row.get("anonymized"),
            created_at: row.get("created_at"),
            last_active_at: row.get("last_active_at"),
        }
    }
}

impl Schema for Player {
    fn name() -> &'static str {
        PLAYERS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            PLAYERS,
            " (
                player_id       UUID PRIMARY KEY,
                username        TEXT NOT NULL,
                canonical_name  TEXT NOT NULL UNIQUE,
                email           TEXT UNIQUE,
                is_guest        BOOLEAN NOT NULL DEFAULT FALSE,
                anonymized      BOOLEAN NOT NULL DEFAULT FALSE,
                created_at      TIMESTAMPTZ NOT NULL,
                last_active_at  TIMESTAMPTZ NOT NULL
            );"
        )
    }
}

/// Per-game wallet/vault subrecord.
#[derive(Debug, Clone)]
pub struct PlayerGameData {
    pub player_id: ID<Player>,
    pub game: GameType,
    pub wallet: Coins,
    pub vault: Coins,
    pub tutorial_progress: i32,
    pub consecutive_incorrect_votes: i32,
    pub vote_lockout_until: Option<SystemTime>,
}

impl PlayerGameData {
    pub fn new(player_id: ID<Player>, game: GameType, wallet: Coins) -> Self {
        Self {
            player_id,
            game,
            wallet,
            vault: 0,
            tutorial_progress: 0,
            consecutive_incorrect_votes: 0,
            vote_lockout_until: None,
        }
    }
}

impl From<Row> for PlayerGameData {
    fn from(row: Row) -> Self {
        let game: String = row.get("game");
        Self {
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            game: match game.as_str() {
                "qf" => GameType::Qf,
                "ir" => GameType::Ir,
                _ => GameType::Tl,
            },
            wallet: row.get("wallet"),
            vault: row.get("vault"),
            tutorial_progress: row.get("tutorial_progress"),
            consecutive_incorrect_votes: row.get("consecutive_incorrect_votes"),
            vote_lockout_until: row.get("vote_lockout_until"),
        }
    }
}

impl Schema for PlayerGameData {
    fn name() -> &'static str {
        PLAYER_GAME_DATA
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            PLAYER_GAME_DATA,
            " (
                player_id                    UUID NOT NULL,
                game                         TEXT NOT NULL,
                wallet                       BIGINT NOT NULL CHECK (wallet >= 0),
                vault                        BIGINT NOT NULL DEFAULT 0 CHECK (vault >= 0),
                tutorial_progress            INTEGER NOT NULL DEFAULT 0,
                consecutive_incorrect_votes  INTEGER NOT NULL DEFAULT 0,
                vote_lockout_until           TIMESTAMPTZ,
                PRIMARY KEY (player_id, game)
            );"
        )
    }
}

/// Player persistence operations. Money movements live in the ledger crate;
/// this repository only covers identity and per-game bookkeeping.
#[allow(async_fn_in_trait)]
pub trait PlayerRepository {
    async fn create_player(&self, player: &Player) -> Result<(), PgErr>;
    async fn create_game_data(&self, data: &PlayerGameData) -> Result<(), PgErr>;
    async fn player(&self, id: ID<Player>) -> Result<Option<Player>, PgErr>;
    async fn player_by_canonical(&self, canonical: &str) -> Result<Option<Player>, PgErr>;
    async fn username_taken(&self, canonical: &str) -> Result<bool, PgErr>;
    async fn game_data(
        &self,
        id: ID<Player>,
        game: GameType,
    ) -> Result<Option<PlayerGameData>, PgErr>;
    /// All AI accounts whose email matches the given LIKE pattern.
    async fn ai_players(&self, email_pattern: &str) -> Result<Vec<Player>, PgErr>;
    /// Guest accounts idle since before the cutoff, candidates for
    /// soft-anonymization.
    async fn inactive_guests(&self, cutoff: SystemTime) -> Result<Vec<Player>, PgErr>;
    /// Soft-anonymize a retired account so its rounds stay intact.
    async fn anonymize_player(&self, id: ID<Player>, placeholder: &str) -> Result<(), PgErr>;
    /// Bump the consecutive-incorrect counter; returns the new value.
    async fn bump_incorrect_votes(&self, id: ID<Player>, game: GameType) -> Result<i32, PgErr>;
    async fn reset_incorrect_votes(&self, id: ID<Player>, game: GameType) -> Result<(), PgErr>;
    async fn set_vote_lockout(
        &self,
        id: ID<Player>,
        game: GameType,
        until: SystemTime,
    ) -> Result<(), PgErr>;
    async fn touch_last_active(&self, id: ID<Player>, now: SystemTime) -> Result<(), PgErr>;
}

impl<C: GenericClient + Sync> PlayerRepository for C {
    async fn create_player(&self, player: &Player) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                PLAYERS,
                " (player_id, username, canonical_name, email, is_guest, anonymized,
                   created_at, last_active_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ),
            &[
                &player.player_id.inner(),
                &player.username,
                &player.canonical_name,
                &player.email,
                &player.is_guest,
                &player.anonymized,
                &player.created_at,
                &player.last_active_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn create_game_data(&self, data: &PlayerGameData) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                PLAYER_GAME_DATA,
                " (player_id, game, wallet, vault, tutorial_progress,
                   consecutive_incorrect_votes, vote_lockout_until)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ),
            &[
                &data.player_id.inner(),
                &data.game.as_str(),
                &data.wallet,
                &data.vault,
                &data.tutorial_progress,
                &data.consecutive_incorrect_votes,
                &data.vote_lockout_until,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn player(&self, id: ID<Player>) -> Result<Option<Player>, PgErr> {
        self.query_opt(
            const_format::concatcp!("SELECT * FROM ", PLAYERS, " WHERE player_id = $1"),
            &[&id.inner()],
        )
        .await
        .map(|opt| opt.map(Player::from))
    }

    async fn player_by_canonical(&self, canonical: &str) -> Result<Option<Player>, PgErr> {
        self.query_opt(
            const_format::concatcp!("SELECT * FROM ", PLAYERS, " WHERE canonical_name = $1"),
            &[&canonical],
        )
        .await
        .map(|opt| opt.map(Player::from))
    }

    async fn username_taken(&self, canonical: &str) -> Result<bool, PgErr> {
        self.query_opt(
            const_format::concatcp!("SELECT 1 FROM ", PLAYERS, " WHERE canonical_name = $1"),
            &[&canonical],
        )
        .await
        .map(|opt| opt.is_some())
    }

    async fn game_data(
        &self,
        id: ID<Player>,
        game: GameType,
    ) -> Result<Option<PlayerGameData>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT * FROM ",
                PLAYER_GAME_DATA,
                " WHERE player_id = $1 AND game = $2"
            ),
            &[&id.inner(), &game.as_str()],
        )
        .await
        .map(|opt| opt.map(PlayerGameData::from))
    }

    async fn ai_players(&self, email_pattern: &str) -> Result<Vec<Player>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                PLAYERS,
                " WHERE email LIKE $1 AND NOT anonymized"
            ),
            &[&email_pattern],
        )
        .await
        .map(|rows| rows.into_iter().map(Player::from).collect())
    }

    async fn inactive_guests(&self, cutoff: SystemTime) -> Result<Vec<Player>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                PLAYERS,
                " WHERE is_guest AND NOT anonymized AND last_active_at < $1"
            ),
            &[&cutoff],
        )
        .await
        .map(|rows| rows.into_iter().map(Player::from).collect())
    }

    async fn anonymize_player(&self, id: ID<Player>, placeholder: &str) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PLAYERS,
                " SET anonymized = TRUE, username = $2, canonical_name = $2, email = NULL
                 WHERE player_id = $1"
            ),
            &[&id.inner(), &placeholder],
        )
        .await
        .map(|_| ())
    }

    async fn bump_incorrect_votes(&self, id: ID<Player>, game: GameType) -> Result<i32, PgErr> {
        self.query_one(
            const_format::concatcp!(
                "UPDATE ",
                PLAYER_GAME_DATA,
                " SET consecutive_incorrect_votes = consecutive_incorrect_votes + 1
                 WHERE player_id = $1 AND game = $2
                 RETURNING consecutive_incorrect_votes"
            ),
            &[&id.inner(), &game.as_str()],
        )
        .await
        .map(|row| row.get(0))
    }

    async fn reset_incorrect_votes(&self, id: ID<Player>, game: GameType) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PLAYER_GAME_DATA,
                " SET consecutive_incorrect_votes = 0 WHERE player_id = $1 AND game = $2"
            ),
            &[&id.inner(), &game.as_str()],
        )
        .await
        .map(|_| ())
    }

    async fn set_vote_lockout(
        &self,
        id: ID<Player>,
        game: GameType,
        until: SystemTime,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PLAYER_GAME_DATA,
                " SET vote_lockout_until = $3 WHERE player_id = $1 AND game = $2"
            ),
            &[&id.inner(), &game.as_str(), &until],
        )
        .await
        .map(|_| ())
    }

    async fn touch_last_active(&self, id: ID<Player>, now: SystemTime) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                PLAYERS,
                " SET last_active_at = $2 WHERE player_id = $1"
            ),
            &[&id.inner(), &now],
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_detection_uses_email_domain() {
        let now = SystemTime::UNIX_EPOCH;
        let human = Player::new("quipper".into(), Some("q@example.com".into()), false, now);
        let bot = Player::new(
            "bot".into(),
            Some(format!("ai_voter_ab12{}", AI_EMAIL_DOMAIN)),
            false,
            now,
        );
        let guest = Player::new("guest123".into(), None, true, now);
        assert!(!human.is_ai());
        assert!(bot.is_ai());
        assert!(!guest.is_ai());
    }

    #[test]
    fn canonical_name_is_lowercased() {
        let p = Player::new("QuipMaster".into(), None, false, SystemTime::UNIX_EPOCH);
        assert_eq!(p.canonical_name, "quipmaster");
    }
}
