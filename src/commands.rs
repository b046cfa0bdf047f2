use chrono::Utc;
use tracing::{debug, error, warn};

use crate::blacklist::{check_message, GateDecision};
use crate::event::MessageEvent;
use crate::helpers::truncate;
use crate::state::State;

/// What happened to an inbound message.
#[derive(Debug, PartialEq)]
pub(crate) enum EventOutcome {
    /// Sender is blacklisted; nothing downstream saw the message.
    Blocked,
    /// Passed the gate but was not a command for us.
    Passed,
    /// An admin chat command was run and this reply was sent.
    Replied(String),
}

/// Gate every message first, then route admin `/tool` commands in groups to
/// the tool registry.
///
/// Only admins reach the registry from chat, so the non-admin mute policy
/// (permissive clamp or strict refusal) is never hit from here. It applies to
/// callers driving the registry through the `--print-tools` declarations.
pub(crate) async fn handle_event(state: &State, mut event: MessageEvent) -> EventOutcome {
    let decision = check_message(&state.store, &mut event, Utc::now());
    if event.is_stopped() {
        debug_assert_eq!(decision, GateDecision::Block);
        return EventOutcome::Blocked;
    }
    debug!(sender = %event.sender_id, "Message: {}", truncate(&event.text, 80));

    let Some(group_id) = event.group_id.clone() else {
        return EventOutcome::Passed;
    };
    if !event.is_admin {
        return EventOutcome::Passed;
    }
    let Some((name, args)) = state.tools.parse_command(&event.text) else {
        return EventOutcome::Passed;
    };

    let ctx = event.tool_context();
    let reply = match state.tools.invoke(state, &ctx, name, &args).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(tool = name, sender = %event.sender_id, "Tool failed: {e}");
            format!("Error: {e}")
        }
    };
    if let Err(e) = state.platform.send_group_msg(&group_id, &reply).await {
        warn!(group_id = %group_id, "Failed to send reply: {e}");
    }
    EventOutcome::Replied(reply)
}
