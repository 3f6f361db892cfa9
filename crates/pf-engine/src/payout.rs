use pf_core::Coins;
use pf_core::ID;
use pf_core::Settings;
use pf_ledger::PayoutShare;
use pf_ledger::pro_rata;
use pf_ledger::rake;
use pf_records::BackronymEntry;
use pf_records::BackronymVote;
use pf_records::Phraseset;
use pf_records::Player;
use pf_records::Vote;
use pf_records::kind;

/// A settled distribution for one finalized content item. Shares are in
/// credit order; the rounding residue (≤ participants) stays undistributed.
#[derive(Debug, Clone)]
pub struct PayoutPlan {
    pub shares: Vec<PayoutShare>,
    pub pool: Coins,
    pub vault_total: Coins,
}

impl PayoutPlan {
    pub fn distributed(&self) -> Coins {
        self.shares
            .iter()
            .map(|s| s.wallet_amount + s.vault_amount)
            .sum()
    }
}

/// Plan the payout for a finalized QF phraseset.
///
/// The pool is the accumulated contributions plus vote stakes. Correct
/// voters earn the fixed reward; the raked remainder goes to the three
/// contributors pro-rata by votes their phrase drew (evenly when nobody
/// voted), with each contributor's rake share landing in their own vault.
pub fn plan_phraseset_payout(
    set: &Phraseset,
    votes: &[Vote],
    authors: [ID<Player>; 3],
    settings: &Settings,
) -> PayoutPlan {
    let pool = set.prize_pool;
    let vault_total = rake(pool, settings.qf_vault_rake_percent);

    let mut shares = Vec::new();
    let mut voter_rewards: Coins = 0;
    for vote in votes.iter().filter(|v| v.correct) {
        voter_rewards += settings.vote_payout_correct;
        shares.push(PayoutShare {
            player: vote.player_id,
            wallet_amount: settings.vote_payout_correct,
            vault_amount: 0,
            kind: kind::VOTE_PAYOUT,
        });
    }

    let creator_pool = (pool - vault_total - voter_rewards).max(0);
    let weights = [set.original_votes, set.copy1_votes, set.copy2_votes];
    let total_weight: i64 = weights.iter().sum();
    for (author, weight) in authors.into_iter().zip(weights) {
        let (wallet, vault) = if total_weight > 0 {
            (
                pro_rata(creator_pool, weight, total_weight),
                pro_rata(vault_total, weight, total_weight),
            )
        } else {
            (creator_pool / 3, vault_total / 3)
        };
        if wallet > 0 || vault > 0 {
            shares.push(PayoutShare {
                player: author,
                wallet_amount: wallet,
                vault_amount: vault,
                kind: kind::PRIZE_PAYOUT,
            });
        }
    }

    PayoutPlan {
        shares,
        pool,
        vault_total,
    }
}

/// Plan the payout for a finalized IR backronym set.
///
/// Only human entries and human non-participant votes fund the pool.
/// Participant votes decide the winner and the pro-rata creator shares;
/// non-participant voters who picked the winner earn the fixed reward. A
/// creator who never cast their participant vote forfeits their share to
/// their vault. The pool-level rake is spread over creators' vaults by the
/// same weights.
pub fn plan_set_payout(
    entries: &[BackronymEntry],
    votes: &[BackronymVote],
    settings: &Settings,
) -> PayoutPlan {
    let human_entries = entries.iter().filter(|e| !e.is_ai).count() as i64;
    let human_np_votes = votes
        .iter()
        .filter(|v| !v.is_ai && !v.is_participant_voter)
        .count() as i64;
    let pool = human_entries * settings.ir_backronym_entry_cost
        + human_np_votes * settings.ir_vote_cost;
    let vault_total = rake(pool, settings.ir_vault_rake_percent);

    // Participant votes drive both the winner and the shares.
    let participant_votes: Vec<&BackronymVote> =
        votes.iter().filter(|v| v.is_participant_voter).collect();
    let weight_of = |entry: &BackronymEntry| {
        participant_votes
            .iter()
            .filter(|v| v.chosen_entry_id == entry.entry_id)
            .count() as i64
    };
    let total_weight: i64 = entries.iter().map(weight_of).sum();
    let winner = entries
        .iter()
        .max_by_key(|e| weight_of(e))
        .map(|e| e.entry_id);

    let mut shares = Vec::new();
    let mut voter_rewards: Coins = 0;
    if let Some(winner_id) = winner {
        for vote in votes
            .iter()
            .filter(|v| !v.is_ai && !v.is_participant_voter && v.chosen_entry_id == winner_id)
        {
            voter_rewards += settings.ir_vote_reward_correct;
            shares.push(PayoutShare {
                player: vote.player_id,
                wallet_amount: settings.ir_vote_reward_correct,
                vault_amount: 0,
                kind: kind::IR_VOTE_PAYOUT,
            });
        }
    }

    let creator_pool = (pool - vault_total - voter_rewards).max(0);
    for entry in entries.iter().filter(|e| !e.is_ai) {
        let weight = weight_of(entry);
        let amount = pro_rata(creator_pool, weight, total_weight);
        let vault_share = pro_rata(vault_total, weight, total_weight);
        if amount == 0 && vault_share == 0 {
            continue;
        }
        let creator_voted = participant_votes
            .iter()
            .any(|v| v.player_id == entry.player_id);
        let (wallet, vault) = if creator_voted {
            (amount, vault_share)
        } else {
            // Abstaining creators forfeit their share to their vault.
            (0, amount + vault_share)
        };
        shares.push(PayoutShare {
            player: entry.player_id,
            wallet_amount: wallet,
            vault_amount: vault,
            kind: kind::IR_CREATOR_PAYOUT,
        });
    }

    PayoutPlan {
        shares,
        pool,
        vault_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_records::PhrasesetStatus;
    use std::time::SystemTime;

    fn entry(
        set: ID<pf_records::BackronymSet>,
        player: ID<Player>,
        received: i32,
    ) -> BackronymEntry {
        BackronymEntry {
            entry_id: ID::default(),
            set_id: set,
            player_id: player,
            backronym_text: vec!["Fuzzy".into(), "Rodents".into()],
            is_ai: false,
            received_votes: received,
            submitted_at: SystemTime::UNIX_EPOCH,
        }
    }

    fn vote(
        set: ID<pf_records::BackronymSet>,
        player: ID<Player>,
        entry: ID<BackronymEntry>,
        participant: bool,
    ) -> BackronymVote {
        BackronymVote {
            vote_id: ID::default(),
            set_id: set,
            player_id: player,
            chosen_entry_id: entry,
            is_participant_voter: participant,
            is_ai: false,
            created_at: SystemTime::UNIX_EPOCH,
        }
    }

    /// The canonical split: 5 human entries, winner takes 3 of 5
    /// participant votes, 3 of 5 outside voters pick the winner.
    #[test]
    fn ir_party_vote_split() {
        let settings = Settings::default();
        let set_id: ID<pf_records::BackronymSet> = ID::default();
        let creators: Vec<ID<Player>> = (0..5).map(|_| ID::default()).collect();
        let entries: Vec<BackronymEntry> = creators
            .iter()
            .map(|c| entry(set_id, *c, 0))
            .collect();

        let mut votes = Vec::new();
        // participant votes: 3 for entry 0, 1 each for entries 1 and 2
        let targets = [0usize, 0, 0, 1, 2];
        for (creator, target) in creators.iter().zip(targets) {
            votes.push(vote(set_id, *creator, entries[target].entry_id, true));
        }
        // five non-participant voters, three of whom pick the winner
        let outsiders: Vec<ID<Player>> = (0..5).map(|_| ID::default()).collect();
        for (i, outsider) in outsiders.iter().enumerate() {
            let target = if i < 3 { 0 } else { 1 };
            votes.push(vote(set_id, *outsider, entries[target].entry_id, false));
        }

        let plan = plan_set_payout(&entries, &votes, &settings);
        assert_eq!(plan.pool, 550);
        assert_eq!(plan.vault_total, 165);

        let wallet_of = |player: ID<Player>| {
            plan.shares
                .iter()
                .filter(|s| s.player == player)
                .map(|s| s.wallet_amount)
                .sum::<Coins>()
        };
        // winner takes floor(325 * 3/5)
        assert_eq!(wallet_of(creators[0]), 195);
        assert_eq!(wallet_of(creators[1]), 65);
        assert_eq!(wallet_of(creators[2]), 65);
        assert_eq!(wallet_of(creators[3]), 0);
        // each correct outsider earns the fixed reward
        assert_eq!(wallet_of(outsiders[0]), 20);
        assert_eq!(wallet_of(outsiders[4]), 0);
        // everything in the pool is accounted for
        assert_eq!(plan.distributed(), 550);
    }

    #[test]
    fn ir_abstaining_creator_forfeits_to_vault() {
        let settings = Settings::default();
        let set_id: ID<pf_records::BackronymSet> = ID::default();
        let creators: Vec<ID<Player>> = (0..5).map(|_| ID::default()).collect();
        let entries: Vec<BackronymEntry> =
            creators.iter().map(|c| entry(set_id, *c, 0)).collect();
        // creator 1 never votes; the other four vote for entry 1
        let mut votes = Vec::new();
        for creator in creators.iter().skip(1).chain(std::iter::once(&creators[0])) {
            if *creator == creators[1] {
                continue;
            }
            votes.push(vote(set_id, *creator, entries[1].entry_id, true));
        }
        let plan = plan_set_payout(&entries, &votes, &settings);
        let share = plan
            .shares
            .iter()
            .find(|s| s.player == creators[1])
            .expect("winning creator has a share");
        assert_eq!(share.wallet_amount, 0);
        assert!(share.vault_amount > 0);
    }

    #[test]
    fn ir_ai_entries_and_votes_fund_nothing() {
        let settings = Settings::default();
        let set_id: ID<pf_records::BackronymSet> = ID::default();
        let human = ID::default();
        let mut e1 = entry(set_id, human, 0);
        e1.is_ai = false;
        let mut e2 = entry(set_id, ID::default(), 0);
        e2.is_ai = true;
        let mut v = vote(set_id, human, e1.entry_id, true);
        v.is_ai = false;
        let mut ai_vote = vote(set_id, ID::default(), e1.entry_id, false);
        ai_vote.is_ai = true;
        let plan = plan_set_payout(&[e1, e2], &[v, ai_vote], &settings);
        assert_eq!(plan.pool, 100);
    }

    fn phraseset(pool: Coins, votes: [i64; 3]) -> Phraseset {
        Phraseset {
            phraseset_id: ID::default(),
            prompt_round_id: ID::default(),
            copy_round_1_id: ID::default(),
            copy_round_2_id: ID::default(),
            prompt_text: "prompt".into(),
            original_phrase: "kiss the bride".into(),
            copy_phrase_1: "free cake forever".into(),
            copy_phrase_2: "run while able".into(),
            status: PhrasesetStatus::Finalized,
            vote_count: votes.iter().sum(),
            original_votes: votes[0],
            copy1_votes: votes[1],
            copy2_votes: votes[2],
            prize_pool: pool,
            created_at: SystemTime::UNIX_EPOCH,
            voting_started_at: None,
            closing_started_at: None,
            finalized_at: None,
        }
    }

    #[test]
    fn qf_pool_distribution_conserves_money() {
        let settings = Settings::default();
        let authors = [ID::default(), ID::default(), ID::default()];
        // 230 pool: 200 contributions plus three 10-coin votes
        let set = phraseset(230, [2, 1, 0]);
        let votes: Vec<Vote> = (0..3)
            .map(|i| Vote {
                vote_id: ID::default(),
                phraseset_id: set.phraseset_id,
                round_id: ID::default(),
                player_id: ID::default(),
                voted_phrase: if i < 2 {
                    set.original_phrase.clone()
                } else {
                    set.copy_phrase_1.clone()
                },
                correct: i < 2,
                created_at: SystemTime::UNIX_EPOCH,
            })
            .collect();
        let plan = plan_phraseset_payout(&set, &votes, authors, &settings);
        assert!(plan.distributed() <= plan.pool);
        // rake lands in vaults, not lost
        let vault_sum: Coins = plan.shares.iter().map(|s| s.vault_amount).sum();
        assert!(vault_sum <= plan.vault_total);
        assert!(vault_sum > 0);
        // the author of the most-voted phrase gets the largest creator cut
        let creator_shares: Vec<&PayoutShare> = plan
            .shares
            .iter()
            .filter(|s| s.kind == kind::PRIZE_PAYOUT)
            .collect();
        assert_eq!(creator_shares[0].player, authors[0]);
        assert!(creator_shares[0].wallet_amount >= creator_shares[1].wallet_amount);
    }

    #[test]
    fn qf_zero_votes_splits_evenly() {
        let settings = Settings::default();
        let authors = [ID::default(), ID::default(), ID::default()];
        let set = phraseset(200, [0, 0, 0]);
        let plan = plan_phraseset_payout(&set, &[], authors, &settings);
        let creator_shares: Vec<Coins> = plan
            .shares
            .iter()
            .filter(|s| s.kind == kind::PRIZE_PAYOUT)
            .map(|s| s.wallet_amount)
            .collect();
        assert_eq!(creator_shares.len(), 3);
        assert!(creator_shares.windows(2).all(|w| w[0] == w[1]));
    }
}
