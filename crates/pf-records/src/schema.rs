use crate::BackronymEntry;
use crate::BackronymSet;
use crate::BackronymVote;
use crate::BackronymWordUsage;
use crate::DailyBonus;
use crate::EmbeddingRecord;
use crate::ImpostorCache;
use crate::PartyParticipant;
use crate::PartyPhraseset;
use crate::PartyRound;
use crate::PartySession;
use crate::Phraseset;
use crate::Player;
use crate::PlayerGameData;
use crate::QuipCache;
use crate::QuipPhrase;
use crate::QuipPhraseUsage;
use crate::ResultView;
use crate::Round;
use crate::TlAnswer;
use crate::TlCluster;
use crate::TlGuess;
use crate::TlPrompt;
use crate::TlRound;
use crate::Transaction;
use crate::Vote;
use pf_database::PgErr;
use pf_database::Schema;
use tokio_postgres::Client;

/// Idempotent DDL bootstrap for every persisted entity. Run at startup;
/// every statement is `IF NOT EXISTS`.
pub async fn create_tables(client: &Client) -> Result<(), PgErr> {
    let ddl = [
        Player::creates(),
        PlayerGameData::creates(),
        Round::creates(),
        Round::indices(),
        Phraseset::creates(),
        Phraseset::indices(),
        Vote::creates(),
        Vote::indices(),
        BackronymSet::creates(),
        BackronymSet::indices(),
        BackronymEntry::creates(),
        BackronymEntry::indices(),
        BackronymVote::creates(),
        BackronymVote::indices(),
        BackronymWordUsage::creates(),
        BackronymWordUsage::indices(),
        TlPrompt::creates(),
        TlAnswer::creates(),
        TlAnswer::indices(),
        TlCluster::creates(),
        TlCluster::indices(),
        TlRound::creates(),
        TlRound::indices(),
        TlGuess::creates(),
        TlGuess::indices(),
        Transaction::creates(),
        Transaction::indices(),
        PartySession::creates(),
        PartySession::indices(),
        PartyParticipant::creates(),
        PartyParticipant::indices(),
        PartyRound::creates(),
        PartyRound::indices(),
        PartyPhraseset::creates(),
        PartyPhraseset::indices(),
        QuipCache::creates(),
        QuipCache::indices(),
        QuipPhrase::creates(),
        QuipPhraseUsage::creates(),
        ImpostorCache::creates(),
        EmbeddingRecord::creates(),
        DailyBonus::creates(),
        ResultView::creates(),
    ];
    for statement in ddl {
        if !statement.is_empty() {
            client.batch_execute(statement).await?;
        }
    }
    log::info!("schema bootstrap complete ({} statements)", ddl.len());
    Ok(())
}
