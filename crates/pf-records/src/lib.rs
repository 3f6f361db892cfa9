//! Persisted entities and their repositories.
//!
//! Every repository is a trait implemented over
//! [`tokio_postgres::GenericClient`], so the same operations run against a
//! bare client or inside a transaction. SQL stays in this crate; domain
//! modules above it never see column names.
//!
//! ## Entities
//!
//! - [`Player`] / [`PlayerGameData`] — accounts and per-game wallets
//! - [`Round`] — the billable unit of activity for all games
//! - [`Phraseset`] / [`Vote`] — QF voting aggregates
//! - [`BackronymSet`] / [`BackronymEntry`] / [`BackronymVote`] — IR races
//! - [`TlPrompt`] / [`TlAnswer`] / [`TlCluster`] / [`TlRound`] / [`TlGuess`]
//! - [`Transaction`] — the money ledger rows
//! - [`PartySession`] / [`PartyParticipant`] and party links
//! - [`QuipCache`] / [`ImpostorCache`] / embedding rows
//! - [`DailyBonus`] / [`ResultView`]
mod backronym;
mod cache;
mod extras;
mod party;
mod phraseset;
mod player;
mod round;
mod schema;
mod tl;
mod transaction;

pub use backronym::*;
pub use cache::*;
pub use extras::*;
pub use party::*;
pub use phraseset::*;
pub use player::*;
pub use round::*;
pub use schema::*;
pub use tl::*;
pub use transaction::*;
