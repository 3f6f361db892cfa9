use pf_core::Coins;
use pf_core::GameType;
use pf_core::RoundType;
use pf_core::Settings;
use std::time::Duration;

/// Per-game descriptor: costs, timers, and refund policy. The round engine
/// is written once against this; each game supplies its numbers.
#[derive(Debug, Clone)]
pub struct GameRules {
    pub game: GameType,
    pub prompt_cost: Coins,
    pub copy_cost_normal: Coins,
    pub copy_cost_discount: Coins,
    pub vote_cost: Coins,
    pub prompt_ttl: Duration,
    pub copy_ttl: Duration,
    pub vote_ttl: Duration,
    pub grace: Duration,
    pub abandon_penalty: Coins,
    /// Queue depth at which copies become discounted.
    pub copy_discount_threshold: usize,
}

impl GameRules {
    pub fn qf(settings: &Settings) -> Self {
        Self {
            game: GameType::Qf,
            prompt_cost: settings.prompt_cost,
            copy_cost_normal: settings.copy_cost_normal,
            copy_cost_discount: settings.copy_cost_discount,
            vote_cost: settings.vote_cost,
            prompt_ttl: Duration::from_secs(settings.prompt_round_seconds),
            copy_ttl: Duration::from_secs(settings.copy_round_seconds),
            vote_ttl: Duration::from_secs(settings.vote_round_seconds),
            grace: Duration::from_secs(settings.grace_period_seconds),
            abandon_penalty: settings.abandoned_penalty,
            copy_discount_threshold: 10,
        }
    }

    pub fn ttl(&self, round_type: RoundType) -> Duration {
        match round_type {
            RoundType::Prompt => self.prompt_ttl,
            RoundType::Copy => self.copy_ttl,
            RoundType::Vote => self.vote_ttl,
            RoundType::Guess => self.prompt_ttl,
        }
    }

    /// Copy cost, discounted when the prompt backlog is deep.
    pub fn copy_cost(&self, queue_depth: usize) -> Coins {
        if queue_depth >= self.copy_discount_threshold {
            self.copy_cost_discount
        } else {
            self.copy_cost_normal
        }
    }

    /// Refund on abandon: the cost minus the fixed penalty, floored at zero.
    pub fn abandon_refund(&self, cost: Coins) -> Coins {
        (cost - self.abandon_penalty).max(0)
    }

    /// Refund on expiry. Prompts refund nothing (the AI orchestrator may
    /// still complete them); copies lose the penalty; votes refund in full.
    pub fn expiry_refund(&self, round_type: RoundType, cost: Coins) -> Coins {
        match round_type {
            RoundType::Prompt => 0,
            RoundType::Copy => (cost - self.abandon_penalty).max(0),
            RoundType::Vote => cost,
            RoundType::Guess => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qf_defaults() {
        let rules = GameRules::qf(&Settings::default());
        assert_eq!(rules.prompt_cost, 100);
        assert_eq!(rules.ttl(RoundType::Prompt), Duration::from_secs(180));
        assert_eq!(rules.ttl(RoundType::Vote), Duration::from_secs(60));
        assert_eq!(rules.grace, Duration::from_secs(5));
    }

    #[test]
    fn copy_discount_kicks_in_with_backlog() {
        let rules = GameRules::qf(&Settings::default());
        assert_eq!(rules.copy_cost(0), 50);
        assert_eq!(rules.copy_cost(9), 50);
        assert_eq!(rules.copy_cost(10), 40);
    }

    #[test]
    fn refund_policies() {
        let rules = GameRules::qf(&Settings::default());
        assert_eq!(rules.abandon_refund(100), 95);
        assert_eq!(rules.abandon_refund(3), 0);
        assert_eq!(rules.expiry_refund(RoundType::Prompt, 100), 0);
        assert_eq!(rules.expiry_refund(RoundType::Copy, 50), 45);
        assert_eq!(rules.expiry_refund(RoundType::Vote, 10), 10);
    }
}
