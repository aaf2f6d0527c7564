//! Stake ledger rows and the balance-mutation rules applied to them.
//!
//! A [`Stake`] is the running position of one user in one pool. It is
//! created by the first observed `Staked` event, mutated by every later
//! event for the same `(chain, pool, user)` triple, and never deleted: a
//! fully withdrawn position is zeroed and deactivated instead.
//!
//! | Event                | Effect                                                    |
//! |----------------------|-----------------------------------------------------------|
//! | `Staked`             | add amount, refresh stake/unlock times, activate          |
//! | `Withdrawn`          | subtract amount (floored at zero), clear pending rewards  |
//! | `EmergencyWithdrawn` | zero amount and pending rewards, deactivate               |
//! | `RewardClaimed`      | clear pending rewards                                     |

use chrono::{DateTime, TimeDelta, Utc};

use super::{ChainId, EventKind, StakingEvent, U256};

/// Position of one user in one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stake {
    /// Chain partition.
    pub chain: ChainId,
    /// On-chain pool id.
    pub pool_id: u64,
    /// Staker address (`0x`-prefixed lowercase hex).
    pub user_address: String,
    /// Principal currently staked, in staking token base units.
    pub staked_amount: U256,
    /// Rewards accrued but not yet paid out, as last known to the ledger.
    pub pending_rewards: U256,
    /// Time of the most recent `Staked` event.
    pub last_stake_time: Option<DateTime<Utc>>,
    /// Time the position unlocks.
    pub unlock_time: Option<DateTime<Utc>>,
    /// `true` iff `staked_amount > 0` after the most recent mutation.
    pub is_active: bool,
    /// Time of the event that last mutated the row.
    pub updated_at: DateTime<Utc>,
}

impl Stake {
    /// Creates an empty, inactive position.
    #[must_use]
    pub fn empty(chain: ChainId, pool_id: u64, user_address: String, at: DateTime<Utc>) -> Self {
        Self {
            chain,
            pool_id,
            user_address,
            staked_amount: U256::ZERO,
            pending_rewards: U256::ZERO,
            last_stake_time: None,
            unlock_time: None,
            is_active: false,
            updated_at: at,
        }
    }

    /// Applies a `Staked` event.
    pub fn record_stake(&mut self, amount: U256, at: DateTime<Utc>, lock_duration_secs: u64) {
        self.staked_amount = self.staked_amount.saturating_add(amount);
        self.last_stake_time = Some(at);
        self.unlock_time = unlock_time(at, lock_duration_secs);
        self.is_active = !self.staked_amount.is_zero();
        self.updated_at = at;
    }

    /// Applies a `Withdrawn` event. Withdrawing more than the balance
    /// saturates at zero instead of failing.
    pub fn record_withdrawal(&mut self, amount: U256, at: DateTime<Utc>) {
        self.staked_amount = self.staked_amount.saturating_sub(amount);
        self.pending_rewards = U256::ZERO;
        self.is_active = !self.staked_amount.is_zero();
        self.updated_at = at;
    }

    /// Applies an `EmergencyWithdrawn` event. The penalty stays in the
    /// event log.
    pub fn record_emergency_withdrawal(&mut self, at: DateTime<Utc>) {
        self.staked_amount = U256::ZERO;
        self.pending_rewards = U256::ZERO;
        self.is_active = false;
        self.updated_at = at;
    }

    /// Applies a `RewardClaimed` event.
    pub fn record_reward_claim(&mut self, at: DateTime<Utc>) {
        self.pending_rewards = U256::ZERO;
        self.updated_at = at;
    }

    /// Returns `true` while the unlock time lies in the future.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.unlock_time.is_some_and(|unlock| unlock > now)
    }
}

/// Applies `event` to the current ledger row for its `(chain, pool, user)`.
///
/// Returns the row to persist, or `None` when the event leaves the ledger
/// untouched (a non-`Staked` event for a position that does not exist).
#[must_use]
pub fn apply_event(
    existing: Option<Stake>,
    event: &StakingEvent,
    lock_duration_secs: u64,
) -> Option<Stake> {
    let at = event.timestamp;
    match (event.kind, existing) {
        (EventKind::Staked, existing) => {
            let mut stake = existing.unwrap_or_else(|| {
                Stake::empty(
                    event.chain.clone(),
                    event.pool_id,
                    event.user_address.clone(),
                    at,
                )
            });
            stake.record_stake(event.amount.unwrap_or_default(), at, lock_duration_secs);
            Some(stake)
        }
        (_, None) => None,
        (EventKind::Withdrawn, Some(mut stake)) => {
            stake.record_withdrawal(event.amount.unwrap_or_default(), at);
            Some(stake)
        }
        (EventKind::EmergencyWithdrawn, Some(mut stake)) => {
            stake.record_emergency_withdrawal(at);
            Some(stake)
        }
        (EventKind::RewardClaimed, Some(mut stake)) => {
            stake.record_reward_claim(at);
            Some(stake)
        }
    }
}

fn unlock_time(at: DateTime<Utc>, lock_duration_secs: u64) -> Option<DateTime<Utc>> {
    i64::try_from(lock_duration_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|lock| at.checked_add_signed(lock))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .unwrap_or_else(|| panic!("valid timestamp"))
    }

    fn event(kind: EventKind, amount: Option<u64>, secs: i64) -> StakingEvent {
        StakingEvent {
            chain: ChainId::new("sepolia"),
            kind,
            tx_hash: format!("0x{secs:064x}"),
            block_number: 1,
            log_index: 0,
            pool_id: 0,
            user_address: "0xabc".to_string(),
            amount: amount.map(U256::from),
            reward_amount: None,
            penalty: None,
            timestamp: at(secs),
        }
    }

    fn with_pending(mut stake: Stake, pending: u64) -> Stake {
        stake.pending_rewards = U256::from(pending);
        stake
    }

    #[test]
    fn first_stake_creates_row_with_unlock_time() {
        let Some(stake) = apply_event(None, &event(EventKind::Staked, Some(500), 0), 3_600) else {
            panic!("stake should be created");
        };
        assert_eq!(stake.staked_amount, U256::from(500));
        assert!(stake.is_active);
        assert_eq!(stake.last_stake_time, Some(at(0)));
        assert_eq!(stake.unlock_time, Some(at(3_600)));
    }

    #[test]
    fn zero_stake_on_fresh_row_stays_inactive() {
        let Some(stake) = apply_event(None, &event(EventKind::Staked, Some(0), 0), 60) else {
            panic!("row is still created");
        };
        assert!(stake.staked_amount.is_zero());
        assert!(!stake.is_active);
    }

    #[test]
    fn zero_stake_after_full_withdrawal_stays_inactive() {
        let staked = apply_event(None, &event(EventKind::Staked, Some(5), 0), 60);
        let withdrawn = apply_event(staked, &event(EventKind::Withdrawn, Some(5), 1), 60);
        let Some(stake) = apply_event(withdrawn, &event(EventKind::Staked, Some(0), 2), 60) else {
            panic!("stake should exist");
        };
        assert!(stake.staked_amount.is_zero());
        assert!(!stake.is_active);
        assert_eq!(stake.last_stake_time, Some(at(2)));
    }

    #[test]
    fn restake_accumulates_and_refreshes_lock() {
        let first = apply_event(None, &event(EventKind::Staked, Some(500), 0), 100);
        let Some(stake) = apply_event(first, &event(EventKind::Staked, Some(250), 50), 100) else {
            panic!("stake should exist");
        };
        assert_eq!(stake.staked_amount, U256::from(750));
        assert_eq!(stake.unlock_time, Some(at(150)));
    }

    #[test]
    fn withdraw_over_balance_zeroes_and_deactivates() {
        let existing = apply_event(None, &event(EventKind::Staked, Some(100), 0), 0)
            .map(|s| with_pending(s, 9));
        let Some(stake) = apply_event(existing, &event(EventKind::Withdrawn, Some(1_000), 1), 0)
        else {
            panic!("stake should exist");
        };
        assert_eq!(stake.staked_amount.to_string(), "0");
        assert_eq!(stake.pending_rewards, U256::ZERO);
        assert!(!stake.is_active);
    }

    #[test]
    fn exact_withdraw_deactivates() {
        let existing = apply_event(None, &event(EventKind::Staked, Some(100), 0), 0);
        let Some(stake) = apply_event(existing, &event(EventKind::Withdrawn, Some(100), 1), 0)
        else {
            panic!("stake should exist");
        };
        assert!(stake.staked_amount.is_zero());
        assert!(!stake.is_active);
    }

    #[test]
    fn partial_withdraw_keeps_active_and_clears_rewards() {
        let existing = apply_event(None, &event(EventKind::Staked, Some(100), 0), 0)
            .map(|s| with_pending(s, 42));
        let Some(stake) = apply_event(existing, &event(EventKind::Withdrawn, Some(40), 1), 0)
        else {
            panic!("stake should exist");
        };
        assert_eq!(stake.staked_amount, U256::from(60));
        assert_eq!(stake.pending_rewards, U256::ZERO);
        assert!(stake.is_active);
    }

    #[test]
    fn emergency_withdraw_zeroes_everything() {
        let existing = apply_event(None, &event(EventKind::Staked, Some(777), 0), 0)
            .map(|s| with_pending(s, 55));
        let Some(stake) =
            apply_event(existing, &event(EventKind::EmergencyWithdrawn, Some(700), 1), 0)
        else {
            panic!("stake should exist");
        };
        assert!(stake.staked_amount.is_zero());
        assert!(stake.pending_rewards.is_zero());
        assert!(!stake.is_active);
    }

    #[test]
    fn reward_claim_only_clears_pending() {
        let existing = apply_event(None, &event(EventKind::Staked, Some(10), 0), 0)
            .map(|s| with_pending(s, 3));
        let Some(stake) = apply_event(existing, &event(EventKind::RewardClaimed, None, 1), 0) else {
            panic!("stake should exist");
        };
        assert_eq!(stake.staked_amount, U256::from(10));
        assert!(stake.pending_rewards.is_zero());
        assert!(stake.is_active);
    }

    #[test]
    fn non_stake_event_without_row_is_noop() {
        for kind in [
            EventKind::Withdrawn,
            EventKind::RewardClaimed,
            EventKind::EmergencyWithdrawn,
        ] {
            assert!(apply_event(None, &event(kind, Some(5), 0), 0).is_none());
        }
    }

    #[test]
    fn is_locked_compares_against_unlock_time() {
        let Some(stake) = apply_event(None, &event(EventKind::Staked, Some(1), 0), 60) else {
            panic!("stake should be created");
        };
        assert!(stake.is_locked(at(59)));
        assert!(!stake.is_locked(at(60)));
    }

    #[test]
    fn oversized_lock_duration_leaves_unlock_unset() {
        let Some(stake) = apply_event(None, &event(EventKind::Staked, Some(1), 0), u64::MAX) else {
            panic!("stake should be created");
        };
        assert!(stake.unlock_time.is_none());
    }

    fn replay(steps: &[(bool, u64)]) -> Option<Stake> {
        steps
            .iter()
            .enumerate()
            .fold(None, |acc, (i, (is_stake, amount))| {
                let kind = if *is_stake {
                    EventKind::Staked
                } else {
                    EventKind::Withdrawn
                };
                let secs = i64::try_from(i).unwrap_or(i64::MAX);
                apply_event(acc, &event(kind, Some(*amount), secs), 0)
            })
    }

    proptest! {
        #[test]
        fn balance_matches_saturating_replay(
            first in 1_u64..1_000_000,
            steps in proptest::collection::vec(
                (any::<bool>(), prop_oneof![Just(0_u64), 0_u64..1_000_000]),
                0..40,
            ),
        ) {
            let mut all = vec![(true, first)];
            all.extend(steps);

            let staked: u128 = all.iter().filter(|(s, _)| *s).map(|(_, a)| u128::from(*a)).sum();
            let withdrawn: u128 = all.iter().filter(|(s, _)| !*s).map(|(_, a)| u128::from(*a)).sum();

            let mut model: u128 = 0;
            let mut over_withdrawn = false;
            for (is_stake, amount) in &all {
                if *is_stake {
                    model += u128::from(*amount);
                } else if u128::from(*amount) > model {
                    over_withdrawn = true;
                    model = 0;
                } else {
                    model -= u128::from(*amount);
                }
            }

            let Some(stake) = replay(&all) else {
                panic!("first event is a stake, row must exist");
            };
            prop_assert_eq!(stake.staked_amount, U256::from(model));
            prop_assert!(stake.staked_amount <= U256::from(staked));
            prop_assert!(stake.staked_amount >= U256::from(staked.saturating_sub(withdrawn)));
            if !over_withdrawn {
                prop_assert_eq!(stake.staked_amount, U256::from(staked - withdrawn));
            }
            prop_assert_eq!(stake.is_active, !stake.staked_amount.is_zero());
        }
    }
}
