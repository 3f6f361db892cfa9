use pf_core::Coins;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::GameType;
use pf_core::ID;
use pf_core::Settings;
use pf_records::AI_EMAIL_DOMAIN;
use pf_records::Player;
use pf_records::PlayerGameData;
use pf_records::PlayerRepository;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::time::SystemTime;
use tokio_postgres::GenericClient;

/// Roles an AI account can serve. Each role has its own email namespace so
/// pools never bleed into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiRole {
    QfQuip,
    QfImpostor,
    QfVoter,
    QfParty,
    IrPlayer,
}

impl AiRole {
    pub fn game(&self) -> GameType {
        match self {
            Self::IrPlayer => GameType::Ir,
            _ => GameType::Qf,
        }
    }
    fn email_prefix(&self) -> &'static str {
        match self {
            Self::QfQuip => "ai_quip_",
            Self::QfImpostor => "ai_impostor_",
            Self::QfVoter => "ai_voter_",
            Self::QfParty => "ai_party_",
            Self::IrPlayer => "ai_backronym_",
        }
    }
    /// SQL LIKE pattern matching every account in this role's pool.
    pub fn email_pattern(&self) -> String {
        format!("{}%{}", self.email_prefix(), AI_EMAIL_DOMAIN)
    }
    fn fresh_email(&self) -> String {
        let tag: String = (0..4)
            .map(|_| {
                let n = rand::rng().random_range(0..16u32);
                char::from_digit(n, 16).unwrap()
            })
            .collect();
        format!("{}{}{}", self.email_prefix(), tag, AI_EMAIL_DOMAIN)
    }
}

const ADJECTIVES: &[&str] = &[
    "Brisk", "Candid", "Dapper", "Eager", "Fabled", "Gentle", "Hasty", "Jolly", "Keen", "Lively",
    "Mellow", "Nimble", "Peppy", "Quirky", "Rustic", "Snappy", "Tidy", "Vivid", "Witty", "Zesty",
];
const NOUNS: &[&str] = &[
    "Badger", "Comet", "Dingo", "Falcon", "Gecko", "Heron", "Ibis", "Jackal", "Kiwi", "Lemur",
    "Marmot", "Nebula", "Ocelot", "Puffin", "Quokka", "Raven", "Sparrow", "Toucan", "Vole",
    "Wombat",
];

/// One candidate username; uniqueness is the caller's problem.
pub fn candidate_username() -> String {
    let mut rng = rand::rng();
    format!(
        "{}{}{}",
        ADJECTIVES.choose(&mut rng).unwrap(),
        NOUNS.choose(&mut rng).unwrap(),
        rng.random_range(10..100)
    )
}

/// Generate a username that does not collide with any canonical name.
pub async fn generate_unique_username<C: GenericClient + Sync>(db: &C) -> GameResult<String> {
    for _ in 0..16 {
        let candidate = candidate_username();
        if !db.username_taken(&candidate.to_lowercase()).await? {
            return Ok(candidate);
        }
    }
    // The name space is large; a collision streak this long means
    // something else is wrong.
    Err(GameError::AiGenerationFailed(
        "could not find a free username".into(),
    ))
}

/// Starting wallet for a newly created AI account.
fn starting_wallet(role: AiRole, settings: &Settings) -> Coins {
    match role.game() {
        GameType::Qf => settings.qf_starting_wallet,
        GameType::Ir => settings.ir_initial_balance,
        GameType::Tl => settings.tl_starting_balance,
    }
}

/// QF AI accounts must be able to afford their next round.
const MIN_QF_WALLET: Coins = 100;

/// Pick a pool member for a role, or mint a fresh account when every member
/// is excluded, broke, or busy.
pub async fn get_or_create_ai_player<C: GenericClient + Sync>(
    db: &C,
    role: AiRole,
    settings: &Settings,
    excluded: &[ID<Player>],
    now: SystemTime,
) -> GameResult<Player> {
    let pool = db.ai_players(&role.email_pattern()).await?;
    let mut eligible = Vec::new();
    for player in pool {
        if excluded.contains(&player.player_id) {
            continue;
        }
        if role.game() == GameType::Qf {
            let funded = db
                .game_data(player.player_id, GameType::Qf)
                .await?
                .is_some_and(|d| d.wallet > MIN_QF_WALLET);
            if !funded {
                continue;
            }
        }
        eligible.push(player);
    }
    if let Some(player) = eligible.choose(&mut rand::rng()) {
        return Ok(player.clone());
    }

    let username = generate_unique_username(db).await?;
    let player = Player::new(username.clone(), Some(role.fresh_email()), false, now);
    db.create_player(&player).await?;
    db.create_game_data(&PlayerGameData::new(
        player.player_id,
        role.game(),
        starting_wallet(role, settings),
    ))
    .await?;
    log::info!(
        "[ai] created {:?} pool account {} ({})",
        role,
        username,
        player.player_id
    );
    Ok(player)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_patterns_are_namespaced() {
        assert_eq!(
            AiRole::QfVoter.email_pattern(),
            format!("ai_voter_%{}", AI_EMAIL_DOMAIN)
        );
        assert!(AiRole::IrPlayer.fresh_email().starts_with("ai_backronym_"));
        assert!(AiRole::IrPlayer.fresh_email().ends_with(AI_EMAIL_DOMAIN));
    }

    #[test]
    fn fresh_emails_look_like_ai_accounts() {
        let email = AiRole::QfParty.fresh_email();
        let player = Player::new("bot".into(), Some(email), false, SystemTime::UNIX_EPOCH);
        assert!(player.is_ai());
    }

    #[test]
    fn usernames_have_shape() {
        for _ in 0..20 {
            let name = candidate_username();
            assert!(name.len() >= 8);
            assert!(name.chars().rev().take(2).all(|c| c.is_ascii_digit()));
        }
    }
}
