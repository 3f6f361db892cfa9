use pf_core::Coins;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::ID;
use pf_records::PartyParticipant;
use pf_records::PartyRepository;
use pf_records::PartyRound;
use pf_records::PartySession;
use pf_records::Phraseset;
use pf_records::PhrasesetRepository;
use pf_records::Player;
use pf_records::PlayerRepository;
use pf_records::Transaction;
use pf_records::TransactionRepository;
use pf_records::Vote;
use pf_records::kind;
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::SystemTime;
use tokio_postgres::GenericClient;

/// One participant's line in the final standings.
#[derive(Debug, Clone)]
pub struct PlayerStanding {
    pub player_id: ID<Player>,
    pub username: String,
    pub spent: Coins,
    pub earned: Coins,
    pub net: Coins,
    pub votes_on_originals: i64,
    pub votes_fooled: i64,
    pub correct_votes: i64,
    pub total_votes: i64,
    pub vote_accuracy: f64,
    pub prompts_submitted: i32,
    pub copies_submitted: i32,
    pub votes_submitted: i32,
    pub rank: usize,
}

/// An award and the metric that earned it.
#[derive(Debug, Clone)]
pub struct Award {
    pub player_id: ID<Player>,
    pub username: String,
    pub metric: f64,
}

#[derive(Debug, Clone)]
pub struct SessionResults {
    pub session_id: ID<PartySession>,
    pub party_code: String,
    pub completed_at: Option<SystemTime>,
    pub rankings: Vec<PlayerStanding>,
    pub best_writer: Option<Award>,
    pub top_impostor: Option<Award>,
    pub sharpest_voter: Option<Award>,
}

/// Pure results computation over already-fetched session data.
pub fn compute_results(
    session: &PartySession,
    participants: &[(PartyParticipant, Player)],
    party_rounds: &[PartyRound],
    phrasesets: &[Phraseset],
    votes: &[Vote],
    transactions: &[Transaction],
) -> SessionResults {
    let phraseset_ids: HashSet<uuid::Uuid> =
        phrasesets.iter().map(|p| p.phraseset_id.inner()).collect();
    let votes_by_set: HashMap<uuid::Uuid, Vec<&Vote>> = {
        let mut map: HashMap<uuid::Uuid, Vec<&Vote>> = HashMap::new();
        for vote in votes {
            map.entry(vote.phraseset_id.inner()).or_default().push(vote);
        }
        map
    };

    let mut standings: Vec<PlayerStanding> = Vec::with_capacity(participants.len());
    for (participant, player) in participants {
        let round_ids: HashSet<uuid::Uuid> = party_rounds
            .iter()
            .filter(|pr| pr.participant_id == participant.participant_id)
            .map(|pr| pr.round_id.inner())
            .collect();

        let spent: Coins = transactions
            .iter()
            .filter(|t| {
                t.player_id == participant.player_id
                    && matches!(
                        t.kind.as_str(),
                        kind::PROMPT_ENTRY | kind::COPY_ENTRY | kind::VOTE_ENTRY
                    )
                    && t.reference_id.is_some_and(|r| round_ids.contains(&r))
            })
            .map(|t| t.amount.abs())
            .sum();
        let earned: Coins = transactions
            .iter()
            .filter(|t| {
                t.player_id == participant.player_id
                    && matches!(t.kind.as_str(), kind::VOTE_PAYOUT | kind::PRIZE_PAYOUT)
                    && t.reference_id
                        .is_some_and(|r| round_ids.contains(&r) || phraseset_ids.contains(&r))
            })
            .map(|t| t.amount + t.vault_contribution)
            .sum();

        let mut votes_on_originals = 0i64;
        let mut votes_fooled = 0i64;
        for set in phrasesets {
            let set_votes = votes_by_set
                .get(&set.phraseset_id.inner())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            if round_ids.contains(&set.prompt_round_id.inner()) {
                votes_on_originals += set_votes
                    .iter()
                    .filter(|v| v.voted_phrase == set.original_phrase)
                    .count() as i64;
            }
            if round_ids.contains(&set.copy_round_1_id.inner()) {
                votes_fooled += set_votes
                    .iter()
                    .filter(|v| v.voted_phrase == set.copy_phrase_1)
                    .count() as i64;
            }
            if round_ids.contains(&set.copy_round_2_id.inner()) {
                votes_fooled += set_votes
                    .iter()
                    .filter(|v| v.voted_phrase == set.copy_phrase_2)
                    .count() as i64;
            }
        }

        let own_votes: Vec<&Vote> = votes
            .iter()
            .filter(|v| round_ids.contains(&v.round_id.inner()))
            .collect();
        let correct_votes = own_votes.iter().filter(|v| v.correct).count() as i64;
        let total_votes = own_votes.len() as i64;
        let vote_accuracy = if total_votes > 0 {
            (correct_votes as f64 / total_votes as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        standings.push(PlayerStanding {
            player_id: participant.player_id,
            username: player.username.clone(),
            spent,
            earned,
            net: earned - spent,
            votes_on_originals,
            votes_fooled,
            correct_votes,
            total_votes,
            vote_accuracy,
            prompts_submitted: participant.prompts_submitted,
            copies_submitted: participant.copies_submitted,
            votes_submitted: participant.votes_submitted,
            rank: 0,
        });
    }

    standings.sort_by(|a, b| b.net.cmp(&a.net));
    for (index, standing) in standings.iter_mut().enumerate() {
        standing.rank = index + 1;
    }

    let award = |metric: &dyn Fn(&PlayerStanding) -> f64,
                 eligible: &dyn Fn(&PlayerStanding) -> bool|
     -> Option<Award> {
        standings
            .iter()
            .filter(|s| eligible(s))
            .max_by(|a, b| metric(a).total_cmp(&metric(b)))
            .map(|s| Award {
                player_id: s.player_id,
                username: s.username.clone(),
                metric: metric(s),
            })
    };
    let best_writer = award(
        &|s| s.votes_on_originals as f64,
        &|s| s.votes_on_originals > 0,
    );
    let top_impostor = award(&|s| s.votes_fooled as f64, &|s| s.votes_fooled > 0);
    let sharpest_voter = award(&|s| s.vote_accuracy, &|s| s.total_votes > 0);

    SessionResults {
        session_id: session.session_id,
        party_code: session.party_code.clone(),
        completed_at: session.completed_at,
        rankings: standings,
        best_writer,
        top_impostor,
        sharpest_voter,
    }
}

/// Fetch everything the results need and compute them.
pub async fn session_results<C: GenericClient + Sync>(
    db: &C,
    session_id: ID<PartySession>,
) -> GameResult<SessionResults> {
    let session = db
        .party_session(session_id)
        .await?
        .ok_or(GameError::SessionNotFound)?;
    let mut participants = Vec::new();
    for participant in db.participants(session_id).await? {
        let player = db
            .player(participant.player_id)
            .await?
            .ok_or(GameError::PlayerNotFound)?;
        participants.push((participant, player));
    }
    let party_rounds = db.party_rounds(session_id).await?;
    let links = db.party_phrasesets(session_id).await?;
    let set_ids: Vec<uuid::Uuid> = links.iter().map(|l| l.phraseset_id.inner()).collect();
    let phrasesets = db.phrasesets_by_ids(&set_ids).await?;
    let mut votes = Vec::new();
    for set in &phrasesets {
        votes.extend(db.votes_for(set.phraseset_id).await?);
    }
    let mut refs: Vec<uuid::Uuid> = party_rounds.iter().map(|pr| pr.round_id.inner()).collect();
    refs.extend(set_ids.iter().copied());
    let transactions = db.transactions_referencing(&refs).await?;
    Ok(compute_results(
        &session,
        &participants,
        &party_rounds,
        &phrasesets,
        &votes,
        &transactions,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::GameType;
    use pf_core::RoundType;
    use pf_records::ParticipantStatus;
    use pf_records::PartyPhase;
    use pf_records::PhrasesetStatus;
    use pf_records::SessionStatus;

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH
    }

    fn session() -> PartySession {
        PartySession {
            session_id: ID::default(),
            party_code: "WXYZ2345".into(),
            host_player_id: ID::default(),
            min_players: 3,
            max_players: 8,
            prompts_per_player: 1,
            copies_per_player: 2,
            votes_per_player: 3,
            status: SessionStatus::Completed,
            current_phase: PartyPhase::Results,
            created_at: now(),
            started_at: None,
            locked_at: None,
            phase_started_at: None,
            phase_expires_at: None,
            completed_at: Some(now()),
        }
    }

    fn member(session: &PartySession, name: &str) -> (PartyParticipant, Player) {
        let player = Player::new(name.to_string(), None, false, now());
        let participant = PartyParticipant {
            participant_id: ID::default(),
            session_id: session.session_id,
            player_id: player.player_id,
            status: ParticipantStatus::Active,
            is_host: false,
            prompts_submitted: 1,
            copies_submitted: 2,
            votes_submitted: 3,
            connected: true,
            joined_at: now(),
            ready_at: None,
            disconnected_at: None,
            last_activity_at: None,
        };
        (participant, player)
    }

    fn link(
        session: &PartySession,
        participant: &PartyParticipant,
        round_type: RoundType,
    ) -> PartyRound {
        PartyRound {
            party_round_id: ID::default(),
            session_id: session.session_id,
            round_id: ID::default(),
            participant_id: participant.participant_id,
            round_type,
            phase: PartyPhase::Prompt,
            created_at: now(),
        }
    }

    #[test]
    fn rankings_order_by_net_and_awards_land() {
        let s = session();
        let (alice_p, alice) = member(&s, "alice");
        let (bob_p, bob) = member(&s, "bob");

        let alice_prompt = link(&s, &alice_p, RoundType::Prompt);
        let bob_vote = link(&s, &bob_p, RoundType::Vote);
        let party_rounds = vec![alice_prompt.clone(), bob_vote.clone()];

        let set = Phraseset {
            phraseset_id: ID::default(),
            prompt_round_id: alice_prompt.round_id,
            copy_round_1_id: ID::default(),
            copy_round_2_id: ID::default(),
            prompt_text: "prompt".into(),
            original_phrase: "kiss the bride".into(),
            copy_phrase_1: "free cake forever".into(),
            copy_phrase_2: "run while able".into(),
            status: PhrasesetStatus::Finalized,
            vote_count: 1,
            original_votes: 1,
            copy1_votes: 0,
            copy2_votes: 0,
            prize_pool: 230,
            created_at: now(),
            voting_started_at: None,
            closing_started_at: None,
            finalized_at: Some(now()),
        };
        let vote = Vote {
            vote_id: ID::default(),
            phraseset_id: set.phraseset_id,
            round_id: bob_vote.round_id,
            player_id: bob_p.player_id,
            voted_phrase: "kiss the bride".into(),
            correct: true,
            created_at: now(),
        };

        let txn = |player: ID<Player>, amount: Coins, kind: &str, reference: uuid::Uuid| {
            Transaction {
                transaction_id: ID::default(),
                player_id: player,
                game: GameType::Qf,
                amount,
                balance_after: 0,
                kind: kind.to_string(),
                reference_id: Some(reference),
                vault_contribution: 0,
                created_at: now(),
            }
        };
        let transactions = vec![
            txn(
                alice_p.player_id,
                -100,
                kind::PROMPT_ENTRY,
                alice_prompt.round_id.inner(),
            ),
            txn(
                bob_p.player_id,
                -10,
                kind::VOTE_ENTRY,
                bob_vote.round_id.inner(),
            ),
            txn(
                alice_p.player_id,
                150,
                kind::PRIZE_PAYOUT,
                set.phraseset_id.inner(),
            ),
            txn(
                bob_p.player_id,
                20,
                kind::VOTE_PAYOUT,
                set.phraseset_id.inner(),
            ),
        ];

        let results = compute_results(
            &s,
            &[(alice_p.clone(), alice), (bob_p.clone(), bob)],
            &party_rounds,
            &[set],
            &[vote],
            &transactions,
        );

        // alice nets 50, bob nets 10
        assert_eq!(results.rankings[0].player_id, alice_p.player_id);
        assert_eq!(results.rankings[0].net, 50);
        assert_eq!(results.rankings[0].rank, 1);
        assert_eq!(results.rankings[1].net, 10);

        let writer = results.best_writer.expect("original drew a vote");
        assert_eq!(writer.player_id, alice_p.player_id);
        assert!(results.top_impostor.is_none());
        let sharp = results.sharpest_voter.expect("bob voted");
        assert_eq!(sharp.player_id, bob_p.player_id);
        assert_eq!(sharp.metric, 100.0);
    }
}
