use crate::Player;
use pf_core::Coins;
use pf_core::GameType;
use pf_core::ID;
use pf_core::Unique;
use pf_database::PgErr;
use pf_database::Schema;
use pf_database::TRANSACTIONS;
use std::time::SystemTime;
use tokio_postgres::GenericClient;
use tokio_postgres::Row;

/// Ledger row kinds. Plain strings in the store; constants here so call
/// sites cannot typo them.
pub mod kind {
    pub const STARTING_BALANCE: &str = "starting_balance";
    pub const DAILY_BONUS: &str = "daily_bonus";
    pub const PROMPT_ENTRY: &str = "prompt_entry";
    pub const COPY_ENTRY: &str = "copy_entry";
    pub const VOTE_ENTRY: &str = "vote_entry";
    pub const HINT_PURCHASE: &str = "hint_purchase";
    pub const PRIZE_PAYOUT: &str = "prize_payout";
    pub const VOTE_PAYOUT: &str = "vote_payout";
    pub const ABANDON_REFUND: &str = "abandon_refund";
    pub const EXPIRY_REFUND: &str = "expiry_refund";
    pub const VAULT_CONTRIBUTION: &str = "vault_contribution";
    pub const IR_ENTRY: &str = "ir_backronym_entry";
    pub const IR_VOTE_ENTRY: &str = "ir_vote_entry";
    pub const IR_VOTE_PAYOUT: &str = "ir_vote_payout";
    pub const IR_CREATOR_PAYOUT: &str = "ir_creator_payout";
    pub const TL_ROUND_ENTRY: &str = "tl_round_entry";
    pub const TL_PAYOUT_WALLET: &str = "tl_round_payout_wallet";
    pub const TL_PAYOUT_VAULT: &str = "tl_round_payout_vault";
}

/// One ledger row. `balance_after` values form a gap-free monotonic sequence
/// per (player, game) because debits and credits serialize on the wallet row.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub transaction_id: ID<Transaction>,
    pub player_id: ID<Player>,
    pub game: GameType,
    pub amount: Coins,
    pub balance_after: Coins,
    pub kind: String,
    pub reference_id: Option<uuid::Uuid>,
    pub vault_contribution: Coins,
    pub created_at: SystemTime,
}

impl Unique for Transaction {
    fn id(&self) -> ID<Self> {
        self.transaction_id
    }
}

impl From<Row> for Transaction {
    fn from(row: Row) -> Self {
        let game: String = row.get("game");
        Self {
            transaction_id: ID::from(row.get::<_, uuid::Uuid>("transaction_id")),
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            game: match game.as_str() {
                "qf" => GameType::Qf,
                "ir" => GameType::Ir,
                _ => GameType::Tl,
            },
            amount: row.get("amount"),
            balance_after: row.get("balance_after"),
            kind: row.get("kind"),
            reference_id: row.get("reference_id"),
            vault_contribution: row.get("vault_contribution"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for Transaction {
    fn name() -> &'static str {
        TRANSACTIONS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            TRANSACTIONS,
            " (
                transaction_id      UUID PRIMARY KEY,
                player_id           UUID NOT NULL,
                game                TEXT NOT NULL,
                amount              BIGINT NOT NULL,
                balance_after       BIGINT NOT NULL,
                kind                TEXT NOT NULL,
                reference_id        UUID,
                vault_contribution  BIGINT NOT NULL DEFAULT 0,
                created_at          TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS transactions_player ON ",
            TRANSACTIONS,
            " (player_id, game, created_at);
             CREATE INDEX IF NOT EXISTS transactions_reference ON ",
            TRANSACTIONS,
            " (reference_id);"
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait TransactionRepository {
    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), PgErr>;
    async fn transactions_for_player(
        &self,
        player: ID<Player>,
        game: GameType,
        limit: i64,
    ) -> Result<Vec<Transaction>, PgErr>;
    /// Every ledger row referencing any of the given entity ids.
    async fn transactions_referencing(
        &self,
        refs: &[uuid::Uuid],
    ) -> Result<Vec<Transaction>, PgErr>;
    /// Sum of signed amounts for a player in one game.
    async fn ledger_sum(&self, player: ID<Player>, game: GameType) -> Result<Coins, PgErr>;
}

impl<C: GenericClient + Sync> TransactionRepository for C {
    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                TRANSACTIONS,
                " (transaction_id, player_id, game, amount, balance_after, kind,
                   reference_id, vault_contribution, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ),
            &[
                &txn.transaction_id.inner(),
                &txn.player_id.inner(),
                &txn.game.as_str(),
                &txn.amount,
                &txn.balance_after,
                &txn.kind,
                &txn.reference_id,
                &txn.vault_contribution,
                &txn.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn transactions_for_player(
        &self,
        player: ID<Player>,
        game: GameType,
        limit: i64,
    ) -> Result<Vec<Transaction>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                TRANSACTIONS,
                " WHERE player_id = $1 AND game = $2 ORDER BY created_at DESC LIMIT $3"
            ),
            &[&player.inner(), &game.as_str(), &limit],
        )
        .await
        .map(|rows| rows.into_iter().map(Transaction::from).collect())
    }

    async fn transactions_referencing(
        &self,
        refs: &[uuid::Uuid],
    ) -> Result<Vec<Transaction>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                TRANSACTIONS,
                " WHERE reference_id = ANY($1)"
            ),
            &[&refs],
        )
        .await
        .map(|rows| rows.into_iter().map(Transaction::from).collect())
    }

    async fn ledger_sum(&self, player: ID<Player>, game: GameType) -> Result<Coins, PgErr> {
        self.query_one(
            const_format::concatcp!(
                "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM ",
                TRANSACTIONS,
                " WHERE player_id = $1 AND game = $2"
            ),
            &[&player.inner(), &game.as_str()],
        )
        .await
        .map(|row| row.get(0))
    }
}
