//! # Well-Known Paths
//!
//! The addressing scheme of the data layer. Every item write and every
//! direct message is routed by one of these paths.
//!
//! | Path | Direction | Carried by |
//! |---|---|---|
//! | `/fitmatch/product`          | phone → watch | item (last-write-wins) |
//! | `/fitmatch/action/like`      | watch → phone | message |
//! | `/fitmatch/action/pass`      | watch → phone | message |
//! | `/fitmatch/request/next`     | watch → phone | message |
//! | `/fitmatch/event/call`       | both          | message |
//! | `/fitmatch/event/chat`       | both          | message |
//! | `/fitmatch/event/navigation` | both          | message |
//!
//! Unknown paths arriving from a peer are logged and skipped, never fatal;
//! a newer peer may legitimately use paths this build does not know.

use fitmatch_core::{ActionKind, DeliveryEventKind};

use crate::error::SyncError;

// =============================================================================
// Path Constants
// =============================================================================

/// Item path the phone pushes the current product to.
pub const PRODUCT: &str = "/fitmatch/product";

/// Message path for LIKE actions.
pub const ACTION_LIKE: &str = "/fitmatch/action/like";

/// Message path for PASS actions.
pub const ACTION_PASS: &str = "/fitmatch/action/pass";

/// Message path for next-product requests.
pub const REQUEST_NEXT: &str = "/fitmatch/request/next";

/// Message path for delivery call events.
pub const EVENT_CALL: &str = "/fitmatch/event/call";

/// Message path for delivery chat events.
pub const EVENT_CHAT: &str = "/fitmatch/event/chat";

/// Message path for delivery navigation events.
pub const EVENT_NAVIGATION: &str = "/fitmatch/event/navigation";

// =============================================================================
// Typed Path
// =============================================================================

/// A parsed well-known path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPath {
    /// The current discovery product.
    Product,
    /// A LIKE on the current product.
    ActionLike,
    /// A PASS on the current product.
    ActionPass,
    /// A request for the next product.
    RequestNext,
    /// A delivery call event.
    EventCall,
    /// A delivery chat event.
    EventChat,
    /// A delivery navigation event.
    EventNavigation,
}

impl SyncPath {
    /// Returns the wire representation of this path.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncPath::Product => PRODUCT,
            SyncPath::ActionLike => ACTION_LIKE,
            SyncPath::ActionPass => ACTION_PASS,
            SyncPath::RequestNext => REQUEST_NEXT,
            SyncPath::EventCall => EVENT_CALL,
            SyncPath::EventChat => EVENT_CHAT,
            SyncPath::EventNavigation => EVENT_NAVIGATION,
        }
    }

    /// Parses a wire path, returning `None` for anything unknown.
    pub fn parse(path: &str) -> Option<SyncPath> {
        match path {
            PRODUCT => Some(SyncPath::Product),
            ACTION_LIKE => Some(SyncPath::ActionLike),
            ACTION_PASS => Some(SyncPath::ActionPass),
            REQUEST_NEXT => Some(SyncPath::RequestNext),
            EVENT_CALL => Some(SyncPath::EventCall),
            EVENT_CHAT => Some(SyncPath::EventChat),
            EVENT_NAVIGATION => Some(SyncPath::EventNavigation),
            _ => None,
        }
    }

    /// Returns the action path for a watch action.
    pub const fn for_action(kind: ActionKind) -> SyncPath {
        match kind {
            ActionKind::Like => SyncPath::ActionLike,
            ActionKind::Pass => SyncPath::ActionPass,
            ActionKind::RequestNext => SyncPath::RequestNext,
        }
    }

    /// Returns the event path for a delivery event.
    pub const fn for_event(kind: DeliveryEventKind) -> SyncPath {
        match kind {
            DeliveryEventKind::Call => SyncPath::EventCall,
            DeliveryEventKind::Chat => SyncPath::EventChat,
            DeliveryEventKind::Navigation => SyncPath::EventNavigation,
        }
    }

    /// Returns the action kind this path carries, if it is an action path.
    pub const fn action_kind(&self) -> Option<ActionKind> {
        match self {
            SyncPath::ActionLike => Some(ActionKind::Like),
            SyncPath::ActionPass => Some(ActionKind::Pass),
            SyncPath::RequestNext => Some(ActionKind::RequestNext),
            _ => None,
        }
    }

    /// Returns the delivery event kind this path carries, if any.
    pub const fn event_kind(&self) -> Option<DeliveryEventKind> {
        match self {
            SyncPath::EventCall => Some(DeliveryEventKind::Call),
            SyncPath::EventChat => Some(DeliveryEventKind::Chat),
            SyncPath::EventNavigation => Some(DeliveryEventKind::Navigation),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncPath {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncPath::parse(s).ok_or_else(|| SyncError::InvalidPath(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_paths() {
        for path in [
            SyncPath::Product,
            SyncPath::ActionLike,
            SyncPath::ActionPass,
            SyncPath::RequestNext,
            SyncPath::EventCall,
            SyncPath::EventChat,
            SyncPath::EventNavigation,
        ] {
            assert_eq!(SyncPath::parse(path.as_str()), Some(path));
        }
    }

    #[test]
    fn test_unknown_path_is_none() {
        assert_eq!(SyncPath::parse("/fitmatch/unknown"), None);
        assert!("/fitmatch/unknown".parse::<SyncPath>().is_err());
    }

    #[test]
    fn test_action_mapping() {
        assert_eq!(SyncPath::for_action(ActionKind::Like), SyncPath::ActionLike);
        assert_eq!(
            SyncPath::ActionPass.action_kind(),
            Some(ActionKind::Pass)
        );
        assert_eq!(SyncPath::Product.action_kind(), None);
    }

    #[test]
    fn test_event_mapping() {
        assert_eq!(
            SyncPath::for_event(DeliveryEventKind::Navigation),
            SyncPath::EventNavigation
        );
        assert_eq!(
            SyncPath::EventCall.event_kind(),
            Some(DeliveryEventKind::Call)
        );
        assert_eq!(SyncPath::ActionLike.event_kind(), None);
    }
}
