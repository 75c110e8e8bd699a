//! Proof-of-work difficulty schedule.
//!
//! The schedule adjusts the parent difficulty by `parent / 2048` steps based
//! on how far the new timestamp is from the parent's, clamped at 99 steps
//! downward, with an exponential component that doubles every 100,000 blocks.

use crate::primitives::Header;
use alloy_primitives::U256;

/// Lowest difficulty the schedule ever returns.
pub const MINIMUM_DIFFICULTY: u64 = 131_072;

/// Bound divisor for per-block difficulty adjustment.
pub const DIFFICULTY_BOUND_DIVISOR: u64 = 2_048;

/// Block interval after which the exponential component doubles.
pub const EXPONENTIAL_PERIOD: u64 = 100_000;

/// Seconds of block spacing covered by one adjustment step.
const ADJUSTMENT_WINDOW_SECS: u64 = 10;

/// Largest downward adjustment, in steps.
const MAX_ADJUSTMENT_STEPS: u64 = 99;

/// Calculate the difficulty a block created at `timestamp` on top of
/// `parent` must declare.
pub fn calc_difficulty(parent: &Header, timestamp: u64) -> U256 {
    let elapsed = timestamp.saturating_sub(parent.timestamp);
    let adjust = parent.difficulty / U256::from(DIFFICULTY_BOUND_DIVISOR);

    // 1 - elapsed/10 steps, clamped at -99: fast blocks raise difficulty,
    // slow blocks lower it.
    let steps_down = (elapsed / ADJUSTMENT_WINDOW_SECS).min(MAX_ADJUSTMENT_STEPS + 1);
    let mut difficulty = if steps_down == 0 {
        parent.difficulty.saturating_add(adjust)
    } else {
        parent
            .difficulty
            .saturating_sub(adjust * U256::from(steps_down - 1))
    };

    let minimum = U256::from(MINIMUM_DIFFICULTY);
    if difficulty < minimum {
        difficulty = minimum;
    }

    // Exponential component: 2^(period - 2) from the second period on.
    let period = (parent.number + 1) / EXPONENTIAL_PERIOD;
    if period > 1 && period - 2 < 256 {
        difficulty = difficulty.saturating_add(U256::from(1u64) << ((period - 2) as usize));
    }

    difficulty
}

/// Convert a difficulty to the hash target a valid proof must stay below.
pub fn difficulty_to_target(difficulty: U256) -> U256 {
    if difficulty.is_zero() {
        return U256::MAX;
    }
    U256::MAX / difficulty
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(number: u64, difficulty: u64, timestamp: u64) -> Header {
        Header {
            number,
            difficulty: U256::from(difficulty),
            timestamp,
            ..Default::default()
        }
    }

    #[test]
    fn test_fast_block_raises_difficulty() {
        let parent = parent(100, 1_000_000, 1_000);
        let next = calc_difficulty(&parent, 1_005);
        assert!(next > parent.difficulty);
    }

    #[test]
    fn test_on_target_block_keeps_difficulty() {
        let parent = parent(100, 1_000_000, 1_000);
        // Spacing in [10, 20) leaves the difficulty as is.
        let next = calc_difficulty(&parent, 1_012);
        assert_eq!(next, parent.difficulty);
    }

    #[test]
    fn test_slow_block_lowers_difficulty() {
        let parent = parent(100, 1_000_000, 1_000);
        let next = calc_difficulty(&parent, 1_100);
        assert!(next < parent.difficulty);
    }

    #[test]
    fn test_minimum_difficulty_floor() {
        let parent = parent(100, MINIMUM_DIFFICULTY, 1_000);
        // A very slow block cannot push below the floor.
        let next = calc_difficulty(&parent, 100_000);
        assert_eq!(next, U256::from(MINIMUM_DIFFICULTY));
    }

    #[test]
    fn test_adjustment_clamped_downward() {
        // 2000 seconds is 200 windows, clamped to 99 steps.
        let parent_header = parent(100, 1_000_000_000, 1_000);
        let adjust = parent_header.difficulty / U256::from(DIFFICULTY_BOUND_DIVISOR);
        let expected = parent_header.difficulty - adjust * U256::from(99u64);
        assert_eq!(calc_difficulty(&parent_header, 3_000), expected);
    }

    #[test]
    fn test_exponential_component() {
        // Parent 199_999 puts the next block in period 2: +2^0.
        let before = parent(199_998, 1_000_000, 1_000);
        let at = parent(199_999, 1_000_000, 1_000);

        let without = calc_difficulty(&before, 1_012);
        let with = calc_difficulty(&at, 1_012);
        assert_eq!(with, without + U256::from(1u64));
    }

    #[test]
    fn test_difficulty_to_target() {
        assert_eq!(difficulty_to_target(U256::ZERO), U256::MAX);
        assert_eq!(difficulty_to_target(U256::from(1u64)), U256::MAX);
        assert_eq!(
            difficulty_to_target(U256::from(4u64)),
            U256::MAX / U256::from(4u64)
        );

        // Higher difficulty, lower target.
        assert!(
            difficulty_to_target(U256::from(1_000u64)) > difficulty_to_target(U256::from(2_000u64))
        );
    }
}
