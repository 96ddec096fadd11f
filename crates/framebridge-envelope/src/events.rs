//! Event vocabulary.
//!
//! Names are fixed, except for RPC responses which carry the call's
//! correlation id as a `:<uid>` suffix on [`RPC_CALL`].

/// Child → parent: the embedded document finished its handshake.
pub const CHILD_READY: &str = "bridge:child-ready";

/// Child → parent: the embedded document is moving to a new address.
pub const CHILD_NAVIGATING: &str = "bridge:child-navigating";

/// Parent → child: navigate to `{url}`.
pub const NAVIGATE: &str = "bridge:child-navigate";

/// Parent → child: invoke `{uid, fnName, args}`.
pub const RPC_CALL: &str = "bridge:rpc-call";

/// Classification of an event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ChildReady,
    ChildNavigating,
    Navigate,
    RpcCall,
    RpcResponse(u64),
    Custom,
}

/// Event name carrying the response to call `uid`.
pub fn rpc_response_event(uid: u64) -> String {
    format!("{RPC_CALL}:{uid}")
}

/// Classify `name`.
pub fn event_kind(name: &str) -> EventKind {
    match name {
        CHILD_READY => EventKind::ChildReady,
        CHILD_NAVIGATING => EventKind::ChildNavigating,
        NAVIGATE => EventKind::Navigate,
        RPC_CALL => EventKind::RpcCall,
        _ => name
            .strip_prefix(RPC_CALL)
            .and_then(|rest| rest.strip_prefix(':'))
            .and_then(|uid| uid.parse::<u64>().ok())
            .map_or(EventKind::Custom, EventKind::RpcResponse),
    }
}

/// Returns true for the parent → child navigation command.
pub fn is_navigation(name: &str) -> bool {
    name == NAVIGATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_fixed_names() {
        assert_eq!(event_kind(CHILD_READY), EventKind::ChildReady);
        assert_eq!(event_kind(CHILD_NAVIGATING), EventKind::ChildNavigating);
        assert_eq!(event_kind(NAVIGATE), EventKind::Navigate);
        assert_eq!(event_kind(RPC_CALL), EventKind::RpcCall);
    }

    #[test]
    fn classifies_rpc_responses_by_uid() {
        assert_eq!(rpc_response_event(42), "bridge:rpc-call:42");
        assert_eq!(event_kind(&rpc_response_event(42)), EventKind::RpcResponse(42));
        assert_eq!(event_kind("bridge:rpc-call:abc"), EventKind::Custom);
        assert_eq!(event_kind("bridge:rpc-call42"), EventKind::Custom);
    }

    #[test]
    fn everything_else_is_custom() {
        assert_eq!(event_kind("cart:updated"), EventKind::Custom);
        assert!(!is_navigation("cart:updated"));
        assert!(is_navigation(NAVIGATE));
    }
}
