//! Contract violations and how they are reported.
//!
//! A contract violation is a bug in the caller (mismatched vector lengths, an empty
//! sampling range, a second check-out, ...), never a property of the data. The policy
//! is fixed at build time:
//!
//! - Debug builds halt on every violation, with the violated condition and the caller
//!   location in the panic message.
//! - In release builds, APIs that return a [`Result`] report the violation as a
//!   [`ContractViolation`] error, unless the `panic-on-contract-violation` feature is
//!   enabled, in which case they panic as well.
//! - Operator impls (`+=`, `[]`, ...) cannot return an error and always panic.
//!
//! Release panics carry a terse message. Either way the operation never continues with
//! inconsistent state. Every violation that panics is logged as a `tracing` error first.
use std::panic::Location;

use thiserror::Error;
use tracing::error;

/// A violated precondition of a ring-vector, lease or sampler operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// Element-wise operation on vectors of different length.
    #[error("length mismatch: left operand has {left} elements, right operand has {right}")]
    LengthMismatch {
        /// Length of the left operand.
        left: usize,
        /// Length of the right operand.
        right: usize,
    },
    /// Index outside of `0..len`.
    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the vector.
        len: usize,
    },
    /// Sampling range with `lb > ub`.
    #[error("lower bound {lb:#x} is greater than upper bound {ub:#x}")]
    InvalidRange {
        /// Lower bound as a word.
        lb: u64,
        /// Upper bound as a word.
        ub: u64,
    },
    /// The buffer was checked out while a lease was outstanding.
    #[error("the buffer is already checked out")]
    AlreadyCheckedOut,
    /// The vector was used by its owner while its buffer is checked out.
    #[error("the vector is unusable while its buffer is checked out")]
    CheckedOut,
    /// A lease was checked in although none is outstanding.
    #[error("no lease is outstanding for this vector")]
    NotCheckedOut,
    /// A lease was checked into a vector it was not checked out from.
    #[error("the lease was not checked out from this vector")]
    ForeignLease,
}

/// Panics for `violation`, with full diagnostics in debug builds.
#[cold]
#[track_caller]
pub(crate) fn violated(violation: ContractViolation, condition: &'static str) -> ! {
    let location = Location::caller();
    error!(%violation, condition, %location, "contract violation");
    if cfg!(debug_assertions) {
        panic!("contract violation: {violation}\n  condition: `{condition}`\n  at: {location}")
    } else {
        panic!("contract violation: {violation}")
    }
}

/// Whether violations reported through [`report`] panic instead of returning an error.
pub const PANICS: bool = cfg!(any(debug_assertions, feature = "panic-on-contract-violation"));

/// Panics for `violation` if [`PANICS`] is set, otherwise returns it as an error.
#[track_caller]
pub(crate) fn report(
    violation: ContractViolation,
    condition: &'static str,
) -> Result<(), ContractViolation> {
    if PANICS {
        violated(violation, condition)
    }
    Err(violation)
}

/// Panics with a [`ContractViolation`] unless the condition holds.
macro_rules! contract {
    ($cond:expr, $violation:expr $(,)?) => {
        if !$cond {
            $crate::contract::violated($violation, stringify!($cond))
        }
    };
}

/// Evaluates to `Err(ContractViolation)` unless the condition holds (see [`report`]).
macro_rules! check_contract {
    ($cond:expr, $violation:expr $(,)?) => {
        if $cond {
            Ok(())
        } else {
            $crate::contract::report($violation, stringify!($cond))
        }
    };
}

pub(crate) use {check_contract, contract};
