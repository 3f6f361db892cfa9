use pf_core::Coins;

/// Vault rake: the floored percentage of a pool diverted to vaults.
pub fn rake(pool: Coins, percent: i64) -> Coins {
    debug_assert!((0..=100).contains(&percent));
    pool * percent / 100
}

/// Split a gross payout into (wallet, vault). The rake applies only to the
/// portion above `threshold`; everything at or below it goes to the wallet.
pub fn split_payout(gross: Coins, threshold: Coins, rake_percent: i64) -> (Coins, Coins) {
    if gross <= threshold {
        (gross, 0)
    } else {
        let vault = rake(gross - threshold, rake_percent);
        (gross - vault, vault)
    }
}

/// Pro-rata integer share: `pool * part / whole`, floored. Callers keep the
/// rounding residue in the pool.
pub fn pro_rata(pool: Coins, part: i64, whole: i64) -> Coins {
    if whole == 0 {
        return 0;
    }
    pool * part / whole
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_at_exactly_half_coverage_payout() {
        // gross 106 with threshold 100: vault floor(6 * 0.30) = 1, wallet 105
        let (wallet, vault) = split_payout(106, 100, 30);
        assert_eq!(wallet, 105);
        assert_eq!(vault, 1);
    }

    #[test]
    fn split_below_threshold_goes_all_to_wallet() {
        assert_eq!(split_payout(100, 100, 30), (100, 0));
        assert_eq!(split_payout(0, 100, 30), (0, 0));
    }

    #[test]
    fn split_preserves_gross() {
        for gross in [0, 50, 100, 101, 137, 300] {
            let (wallet, vault) = split_payout(gross, 100, 30);
            assert_eq!(wallet + vault, gross);
            assert!(vault >= 0 && wallet >= 0);
        }
    }

    #[test]
    fn rake_floors() {
        assert_eq!(rake(550, 30), 165);
        assert_eq!(rake(1, 30), 0);
        assert_eq!(rake(10, 30), 3);
    }

    #[test]
    fn pro_rata_floors_and_handles_zero() {
        // winner with 3 of 5 shares of a 325 pool
        assert_eq!(pro_rata(325, 3, 5), 195);
        assert_eq!(pro_rata(325, 0, 5), 0);
        assert_eq!(pro_rata(325, 3, 0), 0);
    }
}
