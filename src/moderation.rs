use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::{error, info};

use crate::blacklist::{classify, BlacklistRecord, BlacklistStore, ExpiryStatus};
use crate::config::{Config, MutePolicy};
use crate::error::AppError;
use crate::event::ToolContext;
use crate::helpers::format_duration_human;
use crate::state::State;

pub(crate) const GROUP_ONLY_MESSAGE: &str = "This action is only available in group chats.";
pub(crate) const ADMIN_REQUIRED_MESSAGE: &str = "This action requires admin authorization.";
pub(crate) const STORAGE_FAILURE_MESSAGE: &str = "An error occurred while updating the blacklist.";
pub(crate) const STORAGE_READ_FAILURE_MESSAGE: &str = "An error occurred while reading the blacklist.";
const MISSING_USER_MESSAGE: &str = "A target user id is required.";

/// Duration the platform will actually be asked for, or None if the
/// requester may not mute at all.
pub(crate) fn authorized_mute_duration(config: &Config, is_admin: bool, requested: i64) -> Option<i64> {
    if is_admin {
        return Some(requested);
    }
    match config.mute_policy {
        MutePolicy::Permissive => Some(requested.min(config.max_unauthorized_mute_secs)),
        MutePolicy::Strict => None,
    }
}

pub(crate) async fn mute(
    state: &State,
    ctx: &ToolContext,
    user_id: &str,
    duration: i64,
) -> Result<String, AppError> {
    let Some(group_id) = ctx.group() else {
        return Ok(GROUP_ONLY_MESSAGE.to_string());
    };
    if user_id.is_empty() {
        return Ok(MISSING_USER_MESSAGE.to_string());
    }
    if duration < 0 {
        return Ok(format!("Invalid mute duration: {duration}. Use 0 to unmute."));
    }
    let Some(duration) = authorized_mute_duration(&state.config, ctx.is_admin, duration) else {
        info!(requester = %ctx.sender_id, target = %user_id, "Mute refused for non-admin");
        return Ok(ADMIN_REQUIRED_MESSAGE.to_string());
    };

    state
        .platform
        .set_group_ban(group_id, user_id, duration, &ctx.self_id)
        .await?;
    info!(
        group_id = %group_id,
        target = %user_id,
        actor = %ctx.self_id,
        requester = %ctx.sender_id,
        duration = duration,
        "User muted"
    );
    if duration == 0 {
        Ok(format!("User {user_id} has been unmuted."))
    } else {
        Ok(format!("User {user_id} has been muted for {duration} seconds."))
    }
}

pub(crate) async fn kick(state: &State, ctx: &ToolContext, user_id: &str) -> Result<String, AppError> {
    let Some(group_id) = ctx.group() else {
        return Ok(GROUP_ONLY_MESSAGE.to_string());
    };
    if user_id.is_empty() {
        return Ok(MISSING_USER_MESSAGE.to_string());
    }
    if !ctx.is_admin {
        info!(requester = %ctx.sender_id, target = %user_id, "Kick refused for non-admin");
        return Ok(format!("{} is not allowed to perform this action.", ctx.sender_id));
    }

    state
        .platform
        .set_group_kick(group_id, user_id, false, &ctx.self_id)
        .await?;
    info!(
        group_id = %group_id,
        target = %user_id,
        actor = %ctx.self_id,
        requester = %ctx.sender_id,
        "User kicked"
    );
    Ok(format!("User {user_id} has been kicked from the group."))
}

/// `duration_secs <= 0` blacklists permanently. Replaces any existing entry.
pub(crate) fn add_to_blacklist(
    store: &BlacklistStore,
    user_id: &str,
    duration_secs: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> String {
    if user_id.is_empty() {
        return MISSING_USER_MESSAGE.to_string();
    }
    let expire_time = if duration_secs > 0 {
        match Duration::try_seconds(duration_secs).and_then(|d| now.checked_add_signed(d)) {
            Some(t) => Some(t),
            None => return format!("Invalid blacklist duration: {duration_secs}"),
        }
    } else {
        None
    };
    let record = BlacklistRecord {
        user_id: user_id.to_string(),
        ban_time: now,
        expire_time,
        reason: reason.to_string(),
    };
    if let Err(e) = store.put(&record) {
        error!(user_id = %user_id, "Failed to add blacklist entry: {e}");
        return STORAGE_FAILURE_MESSAGE.to_string();
    }
    info!(user_id = %user_id, reason = %reason, expire_time = ?expire_time, "User blacklisted");
    match expire_time {
        Some(t) => format!(
            "User {user_id} has been blacklisted until {}.",
            t.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        None => format!("User {user_id} has been blacklisted permanently."),
    }
}

pub(crate) fn remove_from_blacklist(store: &BlacklistStore, user_id: &str) -> String {
    if user_id.is_empty() {
        return MISSING_USER_MESSAGE.to_string();
    }
    match store.delete(user_id) {
        Ok(true) => {
            info!(user_id = %user_id, "User removed from blacklist");
            format!("User {user_id} has been removed from the blacklist.")
        }
        Ok(false) => format!("User {user_id} is not in the blacklist."),
        Err(e) => {
            error!(user_id = %user_id, "Failed to remove blacklist entry: {e}");
            STORAGE_FAILURE_MESSAGE.to_string()
        }
    }
}

/// Read-only: expired rows are shown but left for the gate to purge.
pub(crate) fn list_blacklist(store: &BlacklistStore, now: DateTime<Utc>) -> String {
    let records = match store.list() {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to list blacklist: {e}");
            return STORAGE_READ_FAILURE_MESSAGE.to_string();
        }
    };
    if records.is_empty() {
        return "The blacklist is empty.".to_string();
    }
    let mut lines = vec![format!("Blacklist ({} entries):", records.len())];
    for record in &records {
        let status = match (classify(record, now), record.expire_time) {
            (ExpiryStatus::Permanent, _) => "permanent".to_string(),
            (ExpiryStatus::Active, Some(t)) => {
                let remaining = (t - now).num_seconds().max(0) as u64;
                format!("expires in {}", format_duration_human(remaining))
            }
            _ => "expired".to_string(),
        };
        if record.reason.is_empty() {
            lines.push(format!("  {} ({status})", record.user_id));
        } else {
            lines.push(format!("  {} ({status}): {}", record.user_id, record.reason));
        }
    }
    lines.join("\n")
}
