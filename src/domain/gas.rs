//! # Gas-Limit and Base-Fee Rules
//!
//! Header-level gas validation: the bounded gas-limit drift shared by both
//! fork eras, and the EIP-1559 base-fee schedule from the London fork on.

use crate::config::ChainSpec;
use crate::domain::entities::Header;
use crate::domain::value_objects::U256;
use crate::errors::ConsensusError;

/// Maximum relative gas-limit change per block: parent / 1024.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Minimum block gas limit.
pub const MIN_GAS_LIMIT: u64 = 5000;

/// Base fee on the first EIP-1559 block: 1 gwei.
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

/// Bounds base-fee change per block to 12.5%.
pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;

/// Gas-target multiplier under EIP-1559.
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// Verifies the gas limit stays within the bounded drift from the parent's.
pub fn verify_gas_limit(parent_gas_limit: u64, gas_limit: u64) -> Result<(), ConsensusError> {
    let diff = parent_gas_limit.abs_diff(gas_limit);
    let max_delta = parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR;
    if diff >= max_delta {
        return Err(ConsensusError::InvalidGasLimitDelta {
            have: gas_limit,
            parent: parent_gas_limit,
            max_delta,
        });
    }
    if gas_limit < MIN_GAS_LIMIT {
        return Err(ConsensusError::GasLimitBelowMinimum {
            have: gas_limit,
            min: MIN_GAS_LIMIT,
        });
    }
    Ok(())
}

/// Verifies the EIP-1559 attributes of a header against its parent: gas-limit
/// drift (with the elasticity bump on the fork block) and the base fee.
pub fn verify_eip1559_header(
    spec: &ChainSpec,
    parent: &Header,
    header: &Header,
) -> Result<(), ConsensusError> {
    // On the fork block the target doubles, so the parent limit is scaled up
    // before the drift check.
    let mut parent_gas_limit = parent.gas_limit;
    if !spec.is_london(parent.number) {
        parent_gas_limit = parent.gas_limit * ELASTICITY_MULTIPLIER;
    }
    verify_gas_limit(parent_gas_limit, header.gas_limit)?;

    let want = calc_base_fee(spec, parent);
    if header.base_fee != Some(want) {
        return Err(ConsensusError::InvalidBaseFee {
            have: header.base_fee,
            want: Some(want),
        });
    }
    Ok(())
}

/// Computes the expected base fee of the child of `parent`.
#[must_use]
pub fn calc_base_fee(spec: &ChainSpec, parent: &Header) -> U256 {
    // The first London block always carries the initial base fee.
    if !spec.is_london(parent.number) {
        return U256::from(INITIAL_BASE_FEE);
    }

    let parent_base_fee = parent.base_fee.unwrap_or_else(|| U256::from(INITIAL_BASE_FEE));
    let parent_gas_target = parent.gas_limit / ELASTICITY_MULTIPLIER;

    if parent.gas_used == parent_gas_target {
        return parent_base_fee;
    }

    let denominator = U256::from(BASE_FEE_CHANGE_DENOMINATOR);
    let target = U256::from(parent_gas_target);
    if parent.gas_used > parent_gas_target {
        let delta = U256::from(parent.gas_used - parent_gas_target);
        let fee_delta = std::cmp::max(
            parent_base_fee * delta / target / denominator,
            U256::one(),
        );
        parent_base_fee + fee_delta
    } else {
        let delta = U256::from(parent_gas_target - parent.gas_used);
        let fee_delta = parent_base_fee * delta / target / denominator;
        parent_base_fee.saturating_sub(fee_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(gas_limit: u64, gas_used: u64, base_fee: Option<u64>, number: u64) -> Header {
        Header {
            number,
            gas_limit,
            gas_used,
            base_fee: base_fee.map(U256::from),
            ..Default::default()
        }
    }

    fn london_spec(at: u64) -> ChainSpec {
        ChainSpec {
            london_block: Some(at),
            ..Default::default()
        }
    }

    #[test]
    fn gas_limit_drift_is_bounded() {
        // parent / 1024 = 7812; a drift of 7811 passes, 7812 fails.
        assert!(verify_gas_limit(8_000_000, 8_000_000 + 7811).is_ok());
        assert!(matches!(
            verify_gas_limit(8_000_000, 8_000_000 + 7812),
            Err(ConsensusError::InvalidGasLimitDelta { .. })
        ));
        assert!(matches!(
            verify_gas_limit(8_000_000, 8_000_000 - 7812),
            Err(ConsensusError::InvalidGasLimitDelta { .. })
        ));
    }

    #[test]
    fn gas_limit_minimum_is_enforced() {
        assert!(matches!(
            verify_gas_limit(5000, 4998),
            Err(ConsensusError::GasLimitBelowMinimum { .. })
        ));
    }

    #[test]
    fn first_london_block_uses_initial_base_fee() {
        let spec = london_spec(10);
        let parent = parent(8_000_000, 4_000_000, None, 9);
        assert_eq!(calc_base_fee(&spec, &parent), U256::from(INITIAL_BASE_FEE));
    }

    #[test]
    fn base_fee_stays_when_at_target() {
        let spec = london_spec(10);
        let parent = parent(8_000_000, 4_000_000, Some(INITIAL_BASE_FEE), 20);
        assert_eq!(calc_base_fee(&spec, &parent), U256::from(INITIAL_BASE_FEE));
    }

    #[test]
    fn base_fee_rises_on_full_blocks() {
        let spec = london_spec(10);
        let parent = parent(8_000_000, 8_000_000, Some(INITIAL_BASE_FEE), 20);
        // Full block: +12.5%.
        assert_eq!(
            calc_base_fee(&spec, &parent),
            U256::from(INITIAL_BASE_FEE + INITIAL_BASE_FEE / 8)
        );
    }

    #[test]
    fn base_fee_falls_on_empty_blocks() {
        let spec = london_spec(10);
        let parent = parent(8_000_000, 0, Some(INITIAL_BASE_FEE), 20);
        assert_eq!(
            calc_base_fee(&spec, &parent),
            U256::from(INITIAL_BASE_FEE - INITIAL_BASE_FEE / 8)
        );
    }

    #[test]
    fn fork_block_scales_parent_limit() {
        let spec = london_spec(10);
        let parent_header = parent(8_000_000, 0, None, 9);
        let mut header = parent(16_000_000, 0, Some(INITIAL_BASE_FEE), 10);
        header.base_fee = Some(calc_base_fee(&spec, &parent_header));
        assert!(verify_eip1559_header(&spec, &parent_header, &header).is_ok());
    }

    #[test]
    fn missing_base_fee_is_rejected_after_london() {
        let spec = london_spec(10);
        let parent_header = parent(8_000_000, 4_000_000, Some(INITIAL_BASE_FEE), 20);
        let header = parent(8_000_000, 0, None, 21);
        assert!(matches!(
            verify_eip1559_header(&spec, &parent_header, &header),
            Err(ConsensusError::InvalidBaseFee { .. })
        ));
    }
}
