//! Legal moves for the three independent status fields of a token booking.
//!
//! The tables are only consulted under [`TransitionPolicy::Strict`]; the default
//! permissive policy lets the seller set any value over any other.

use std::fmt::Display;

use crate::error::ApiError;
use crate::models::{AgreementStatus, PaymentStatus, ReservationStatus};

pub trait Transition: Copy + PartialEq + Display {
    /// Whether `self -> next` is a legal move. Staying put is always legal.
    fn can_transition_to(self, next: Self) -> bool;
}

impl Transition for ReservationStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use ReservationStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Confirmed)
                    | (Pending, Rejected)
                    | (Pending, Cancelled)
                    | (Confirmed, Completed)
                    | (Confirmed, Cancelled)
            )
    }
}

impl Transition for PaymentStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use PaymentStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Completed)
                    | (Pending, Failed)
                    | (Failed, Pending)
                    | (Failed, Completed)
                    | (Completed, Refunded)
            )
    }
}

impl Transition for AgreementStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use AgreementStatus::*;
        self == next || matches!((self, next), (Pending, Signed) | (Pending, Rejected))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    #[default]
    Permissive,
    Strict,
}

impl TransitionPolicy {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            TransitionPolicy::Strict
        } else {
            TransitionPolicy::Permissive
        }
    }

    pub fn check<T: Transition>(self, field: &str, from: T, to: T) -> Result<(), ApiError> {
        match self {
            TransitionPolicy::Permissive => Ok(()),
            TransitionPolicy::Strict if from.can_transition_to(to) => Ok(()),
            TransitionPolicy::Strict => Err(ApiError::InvalidOperation(format!(
                "{} cannot change from {} to {}",
                field, from, to
            ))),
        }
    }
}
