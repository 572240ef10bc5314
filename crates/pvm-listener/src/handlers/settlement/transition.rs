//! Settlement transition table.
//!
//! `PENDING -> OK -> {ACCEPTED, REJECTED, ERROR}`. All transitions are
//! one-way: terminal states absorb redelivered validations, which is what
//! makes slot restoration happen exactly once no matter how many times a
//! terminal outcome is redelivered.
//!
//! The table decides *what* must happen. Executing the side effects,
//! including the insufficient-funds abort that forces `ACCEPTED` to `ERROR`,
//! is the handler's job.

use pvm_schemas::RequestStatus;

/// Side effects a transition demands, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Charge 10% of the latest listing price to the owning wallet and append
    /// a ledger entry. Skipped when the request has no local owner; aborts
    /// the acceptance when the balance is insufficient.
    DebitWallet,
    /// Give the consumed visit slot back to the listing.
    RestoreSlot,
    /// Best-effort payment-accepted notification.
    NotifyAccepted,
    /// Best-effort rejection notification.
    NotifyRejected,
}

/// Outcome of one `(current, incoming)` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    /// `None` means the validation is a no-op (already terminal, or the
    /// incoming status cannot advance the machine).
    pub new_status: Option<RequestStatus>,
    pub effects: &'static [SideEffect],
}

const NOOP: TransitionPlan = TransitionPlan {
    new_status: None,
    effects: &[],
};

/// The transition table: current status × incoming validation status.
pub fn plan(
    current: RequestStatus,
    incoming: RequestStatus,
    is_admin_reservation: bool,
) -> TransitionPlan {
    use RequestStatus::*;

    match (current, incoming) {
        // Terminal states absorb everything, including redelivery.
        (Accepted | Rejected | Error, _) => NOOP,

        // Admin-privileged reservations are pre-paid: record the acceptance,
        // nothing else.
        (Pending | Ok, Accepted) if is_admin_reservation => TransitionPlan {
            new_status: Some(Accepted),
            effects: &[],
        },

        (Pending | Ok, Accepted) => TransitionPlan {
            new_status: Some(Accepted),
            effects: &[SideEffect::DebitWallet, SideEffect::NotifyAccepted],
        },

        (Pending | Ok, Rejected) => TransitionPlan {
            new_status: Some(Rejected),
            effects: &[SideEffect::RestoreSlot, SideEffect::NotifyRejected],
        },

        (Pending | Ok, Error) => TransitionPlan {
            new_status: Some(Error),
            effects: &[SideEffect::RestoreSlot, SideEffect::NotifyRejected],
        },

        // Broker acknowledgement echo: PENDING advances to OK, OK stays put.
        (Pending, Ok) => TransitionPlan {
            new_status: Some(Ok),
            effects: &[],
        },
        (Ok, Ok) => NOOP,

        // A validation can never demote a request back to PENDING.
        (Pending | Ok, Pending) => NOOP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvm_schemas::RequestStatus::*;

    #[test]
    fn acceptance_from_live_states_debits_and_notifies() {
        for current in [Pending, Ok] {
            let p = plan(current, Accepted, false);
            assert_eq!(p.new_status, Some(Accepted));
            assert_eq!(
                p.effects,
                &[SideEffect::DebitWallet, SideEffect::NotifyAccepted]
            );
        }
    }

    #[test]
    fn admin_acceptance_records_status_only() {
        let p = plan(Ok, Accepted, true);
        assert_eq!(p.new_status, Some(Accepted));
        assert!(p.effects.is_empty());
    }

    #[test]
    fn rejection_and_error_restore_the_slot() {
        for incoming in [Rejected, Error] {
            for current in [Pending, Ok] {
                let p = plan(current, incoming, false);
                assert_eq!(p.new_status, Some(incoming));
                assert_eq!(
                    p.effects,
                    &[SideEffect::RestoreSlot, SideEffect::NotifyRejected]
                );
            }
        }
    }

    #[test]
    fn terminal_states_absorb_every_incoming_status() {
        for current in [Accepted, Rejected, Error] {
            for incoming in [Pending, Ok, Accepted, Rejected, Error] {
                for admin in [false, true] {
                    let p = plan(current, incoming, admin);
                    assert_eq!(p.new_status, None, "{current:?} + {incoming:?}");
                    assert!(p.effects.is_empty());
                }
            }
        }
    }

    #[test]
    fn ok_echo_advances_pending_only() {
        assert_eq!(plan(Pending, Ok, false).new_status, Some(Ok));
        assert_eq!(plan(Ok, Ok, false).new_status, None);
    }

    #[test]
    fn nothing_demotes_to_pending() {
        assert_eq!(plan(Pending, Pending, false).new_status, None);
        assert_eq!(plan(Ok, Pending, false).new_status, None);
    }

    #[test]
    fn every_cell_is_total() {
        // The match must cover the full 5×5×2 grid without panicking.
        for current in [Pending, Ok, Accepted, Rejected, Error] {
            for incoming in [Pending, Ok, Accepted, Rejected, Error] {
                for admin in [false, true] {
                    let _ = plan(current, incoming, admin);
                }
            }
        }
    }
}
