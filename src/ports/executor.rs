//! The opaque EVM executor and the capabilities handed to it.

use crate::domain::entities::{Header, Log};
use crate::domain::value_objects::{Address, U256};
use crate::errors::ExecutionError;
use crate::ports::state::State;
use crate::system::access_control::AddressCheckType;

/// A call message executed against a state, outside the normal fee rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Caller account.
    pub from: Address,
    /// Callee; `None` creates a contract.
    pub to: Option<Address>,
    /// Caller nonce the call runs under.
    pub nonce: u64,
    /// Transferred value in wei.
    pub value: U256,
    /// Gas limit; system calls use the maximum.
    pub gas: u64,
    /// Gas price; zero for system calls.
    pub gas_price: U256,
    /// Call data.
    pub data: Vec<u8>,
    /// Whether the executor should assert the nonce matches the account.
    pub check_nonce: bool,
}

/// Executes call messages against a state. Implemented by the host's EVM.
pub trait MessageExecutor: Send + Sync {
    /// Runs `msg` in the context of `header` against `state`, returning the
    /// call output. Gas consumed is not charged to any block gas meter.
    fn execute(
        &self,
        msg: &Message,
        state: &mut dyn State,
        header: &Header,
    ) -> Result<Vec<u8>, ExecutionError>;
}

/// Extra validation the EVM consults while executing user transactions:
/// address denial on value transfers and log-emission denial.
pub trait EvmExtraValidator: Send + Sync {
    /// Whether an address is denied under the given check type.
    fn is_address_denied(&self, address: &Address, check: AddressCheckType) -> bool;

    /// Whether an emitted log trips a configured event check rule.
    fn is_log_denied(&self, log: &Log) -> bool;
}
