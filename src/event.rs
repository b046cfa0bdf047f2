use serde_json::Value;

/// An inbound chat message, parsed from a OneBot v11 `message` post.
#[derive(Debug, Clone)]
pub(crate) struct MessageEvent {
    pub(crate) sender_id: String,
    /// `None` for private chats.
    pub(crate) group_id: Option<String>,
    pub(crate) self_id: String,
    pub(crate) is_admin: bool,
    pub(crate) text: String,
    stopped: bool,
}

impl MessageEvent {
    pub(crate) fn new(
        sender_id: &str,
        group_id: Option<&str>,
        self_id: &str,
        is_admin: bool,
        text: &str,
    ) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            group_id: group_id.filter(|g| !g.is_empty()).map(str::to_string),
            self_id: self_id.to_string(),
            is_admin,
            text: text.to_string(),
            stopped: false,
        }
    }

    /// Halt further processing of this message. Downstream handlers check
    /// `is_stopped` and skip the event.
    pub(crate) fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub(crate) fn tool_context(&self) -> ToolContext {
        ToolContext {
            group_id: self.group_id.clone(),
            self_id: self.self_id.clone(),
            sender_id: self.sender_id.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// What a tool invocation knows about the conversation it was called from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ToolContext {
    pub(crate) group_id: Option<String>,
    pub(crate) self_id: String,
    pub(crate) sender_id: String,
    pub(crate) is_admin: bool,
}

impl ToolContext {
    pub(crate) fn group(&self) -> Option<&str> {
        self.group_id.as_deref().filter(|g| !g.is_empty())
    }
}

/// Parse a OneBot v11 event. Returns None for anything that is not a
/// message post with a sender (meta events, notices, requests, echoes).
pub(crate) fn parse_event(payload: &Value, admins: &[String]) -> Option<MessageEvent> {
    if payload["post_type"].as_str() != Some("message") {
        return None;
    }
    let sender_id = id_string(&payload["user_id"])?;
    let self_id = id_string(&payload["self_id"]).unwrap_or_default();
    let group_id = match payload["message_type"].as_str() {
        Some("group") => id_string(&payload["group_id"]),
        _ => None,
    };
    let text = payload["raw_message"]
        .as_str()
        .or_else(|| payload["message"].as_str())
        .unwrap_or_default();
    let role_admin = matches!(payload["sender"]["role"].as_str(), Some("owner" | "admin"));
    let is_admin = role_admin || admins.iter().any(|a| *a == sender_id);

    Some(MessageEvent::new(
        &sender_id,
        group_id.as_deref(),
        &self_id,
        is_admin,
        text,
    ))
}

/// OneBot implementations disagree on whether ids are numbers or strings.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
