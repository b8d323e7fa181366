// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Canonical tracking states.
//!
//! Every carrier dialect resolves to exactly one of these states. The
//! normalizers emit whatever the carrier reports; the ordering exposed by
//! [`TrackingState::can_transition_to`] is advisory and is never enforced
//! while ingesting.
//!
//! ```text
//!  PickupPending ──► PickedUp ──► InTransit ──► OutForDelivery ──► Delivered
//!                                                  ▲      │
//!                                                  │      ▼
//!                                               DeliveryFailed ──► Returning ──► Returned
//!
//!  Exception / Unknown: compatible with every state
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical shipment state shared by all carriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    /// Booked with the carrier, waiting for pickup.
    PickupPending,
    /// Collected from the shipper.
    PickedUp,
    /// Moving through the carrier network.
    InTransit,
    /// On the last-mile vehicle.
    OutForDelivery,
    /// Received by the consignee.
    Delivered,
    /// A delivery attempt failed.
    DeliveryFailed,
    /// On its way back to the shipper.
    Returning,
    /// Returned to the shipper.
    Returned,
    /// Cancelled, lost, or otherwise exceptional.
    Exception,
    /// The carrier status could not be mapped.
    Unknown,
}

impl TrackingState {
    /// Every state, in lattice order.
    pub const ALL: [TrackingState; 10] = [
        TrackingState::PickupPending,
        TrackingState::PickedUp,
        TrackingState::InTransit,
        TrackingState::OutForDelivery,
        TrackingState::Delivered,
        TrackingState::DeliveryFailed,
        TrackingState::Returning,
        TrackingState::Returned,
        TrackingState::Exception,
        TrackingState::Unknown,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingState::PickupPending => "pickup_pending",
            TrackingState::PickedUp => "picked_up",
            TrackingState::InTransit => "in_transit",
            TrackingState::OutForDelivery => "out_for_delivery",
            TrackingState::Delivered => "delivered",
            TrackingState::DeliveryFailed => "delivery_failed",
            TrackingState::Returning => "returning",
            TrackingState::Returned => "returned",
            TrackingState::Exception => "exception",
            TrackingState::Unknown => "unknown",
        }
    }

    /// Whether no further movement is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackingState::Delivered | TrackingState::Returned)
    }

    /// Position in the forward flow. `None` for states outside it.
    fn rank(&self) -> Option<u8> {
        match self {
            TrackingState::PickupPending => Some(0),
            TrackingState::PickedUp => Some(1),
            TrackingState::InTransit => Some(2),
            TrackingState::OutForDelivery | TrackingState::DeliveryFailed => Some(3),
            TrackingState::Returning => Some(4),
            TrackingState::Delivered | TrackingState::Returned => Some(5),
            TrackingState::Exception | TrackingState::Unknown => None,
        }
    }

    /// Advisory check of whether `next` may follow `self`.
    ///
    /// Downstream consumers use this to reconcile out-of-order deliveries.
    pub fn can_transition_to(&self, next: TrackingState) -> bool {
        if *self == next {
            return true;
        }

        let (Some(from), Some(to)) = (self.rank(), next.rank()) else {
            return true;
        };

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            // Redelivery attempts bounce between these two.
            (TrackingState::DeliveryFailed, TrackingState::OutForDelivery) => true,
            (TrackingState::DeliveryFailed, TrackingState::InTransit) => true,
            // A returning parcel never becomes delivered to the consignee.
            (TrackingState::Returning, TrackingState::Delivered) => false,
            _ => to >= from,
        }
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackingState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown tracking state: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for state in TrackingState::ALL {
            assert_eq!(state.as_str().parse::<TrackingState>().unwrap(), state);
        }
        assert!("teleported".parse::<TrackingState>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&TrackingState::OutForDelivery).unwrap();
        assert_eq!(json, "\"out_for_delivery\"");
    }

    #[test]
    fn test_forward_flow_is_allowed() {
        assert!(TrackingState::PickupPending.can_transition_to(TrackingState::PickedUp));
        assert!(TrackingState::InTransit.can_transition_to(TrackingState::Delivered));
        assert!(TrackingState::Returning.can_transition_to(TrackingState::Returned));
    }

    #[test]
    fn test_backward_flow_is_rejected() {
        assert!(!TrackingState::InTransit.can_transition_to(TrackingState::PickupPending));
        assert!(!TrackingState::Delivered.can_transition_to(TrackingState::InTransit));
        assert!(!TrackingState::Returned.can_transition_to(TrackingState::Returning));
        assert!(!TrackingState::Returning.can_transition_to(TrackingState::Delivered));
    }

    #[test]
    fn test_redelivery_after_failure() {
        assert!(TrackingState::DeliveryFailed.can_transition_to(TrackingState::OutForDelivery));
        assert!(TrackingState::OutForDelivery.can_transition_to(TrackingState::DeliveryFailed));
        assert!(TrackingState::DeliveryFailed.can_transition_to(TrackingState::Returning));
    }

    #[test]
    fn test_exception_and_unknown_are_compatible() {
        for state in TrackingState::ALL {
            assert!(state.can_transition_to(TrackingState::Unknown));
            assert!(TrackingState::Exception.can_transition_to(state));
        }
    }
}
