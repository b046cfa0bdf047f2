//! Per-message blacklist gate.
//!
//! Runs before any other handler. Storage faults fail OPEN: a broken
//! database must never silently drop all traffic.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use super::expiry::{classify, ExpiryStatus};
use super::store::BlacklistStore;
use crate::error::AppError;
use crate::event::MessageEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateDecision {
    Allow,
    Block,
}

/// Decide whether `event` may continue. Blocking halts the event; an expired
/// entry is removed and the message allowed through.
pub(crate) fn check_message(
    store: &BlacklistStore,
    event: &mut MessageEvent,
    now: DateTime<Utc>,
) -> GateDecision {
    match evaluate(store, &event.sender_id, now) {
        Ok(GateDecision::Block) => {
            event.stop_propagation();
            GateDecision::Block
        }
        Ok(GateDecision::Allow) => GateDecision::Allow,
        Err(e) => {
            error!(user_id = %event.sender_id, "Blacklist check failed, allowing message: {e}");
            GateDecision::Allow
        }
    }
}

fn evaluate(
    store: &BlacklistStore,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<GateDecision, AppError> {
    let Some(record) = store.get(user_id)? else {
        return Ok(GateDecision::Allow);
    };
    match classify(&record, now) {
        ExpiryStatus::Expired => {
            store.delete(user_id)?;
            info!(user_id = %user_id, "Blacklist entry expired, removed");
            Ok(GateDecision::Allow)
        }
        ExpiryStatus::Active | ExpiryStatus::Permanent => {
            info!(user_id = %user_id, reason = %record.reason, "Blocked message from blacklisted user");
            Ok(GateDecision::Block)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::store::tests::temp_store;
    use crate::blacklist::BlacklistRecord;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn message_from(sender: &str) -> MessageEvent {
        MessageEvent::new(sender, Some("777"), "42", false, "hello")
    }

    fn put(store: &BlacklistStore, user_id: &str, expire_time: Option<DateTime<Utc>>) {
        store
            .put(&BlacklistRecord {
                user_id: user_id.to_string(),
                ban_time: t0(),
                expire_time,
                reason: "spam".to_string(),
            })
            .unwrap();
    }

    #[test]
    fn test_unknown_sender_allowed() {
        let (_dir, store) = temp_store();
        let mut event = message_from("10001");
        assert_eq!(check_message(&store, &mut event, t0()), GateDecision::Allow);
        assert!(!event.is_stopped());
    }

    #[test]
    fn test_permanent_entry_blocks_without_mutation() {
        let (_dir, store) = temp_store();
        put(&store, "10001", None);
        let before = store.get("10001").unwrap();
        let mut event = message_from("10001");
        let later = t0() + Duration::days(3650);
        assert_eq!(check_message(&store, &mut event, later), GateDecision::Block);
        assert!(event.is_stopped());
        assert_eq!(store.get("10001").unwrap(), before);
    }

    #[test]
    fn test_active_entry_blocks_without_mutation() {
        let (_dir, store) = temp_store();
        put(&store, "10001", Some(t0() + Duration::seconds(60)));
        let before = store.get("10001").unwrap();
        let mut event = message_from("10001");
        assert_eq!(
            check_message(&store, &mut event, t0() + Duration::seconds(30)),
            GateDecision::Block
        );
        assert!(event.is_stopped());
        assert_eq!(store.get("10001").unwrap(), before);
    }

    #[test]
    fn test_expiry_instant_still_blocks() {
        let (_dir, store) = temp_store();
        let expire = t0() + Duration::seconds(60);
        put(&store, "10001", Some(expire));
        let mut event = message_from("10001");
        assert_eq!(check_message(&store, &mut event, expire), GateDecision::Block);
    }

    #[test]
    fn test_expired_entry_deleted_and_allowed() {
        let (_dir, store) = temp_store();
        put(&store, "10001", Some(t0() + Duration::seconds(60)));
        let mut event = message_from("10001");
        assert_eq!(
            check_message(&store, &mut event, t0() + Duration::seconds(61)),
            GateDecision::Allow
        );
        assert!(!event.is_stopped());
        assert!(store.get("10001").unwrap().is_none());
    }

    #[test]
    fn test_gate_only_touches_sender_record() {
        let (_dir, store) = temp_store();
        put(&store, "10001", Some(t0() - Duration::seconds(1)));
        put(&store, "20002", Some(t0() - Duration::seconds(1)));
        let mut event = message_from("10001");
        check_message(&store, &mut event, t0());
        assert!(store.get("10001").unwrap().is_none());
        assert!(store.get("20002").unwrap().is_some());
    }

    #[test]
    fn test_offsetless_timestamps_still_enforced() {
        let (_dir, store) = temp_store();
        let conn = rusqlite::Connection::open(store.path()).unwrap();
        conn.execute(
            "INSERT INTO blacklist (user_id, ban_time, expire_time, reason) VALUES
             ('10001', '2026-05-01T12:00:00.123456', NULL, 'spam'),
             ('20002', '2026-05-01T11:00:00', '2026-05-01T11:30:00', '')",
            [],
        )
        .unwrap();
        drop(conn);

        let mut permanent = message_from("10001");
        assert_eq!(check_message(&store, &mut permanent, t0()), GateDecision::Block);
        assert!(permanent.is_stopped());

        let mut lapsed = message_from("20002");
        assert_eq!(check_message(&store, &mut lapsed, t0()), GateDecision::Allow);
        assert!(store.get("20002").unwrap().is_none());
    }

    #[test]
    fn test_storage_failure_fails_open() {
        let (dir, store) = temp_store();
        put(&store, "10001", None);
        drop(dir);
        let mut event = message_from("10001");
        assert_eq!(check_message(&store, &mut event, t0()), GateDecision::Allow);
        assert!(!event.is_stopped());
    }

    #[test]
    fn test_corrupt_row_fails_open() {
        let (_dir, store) = temp_store();
        let conn = rusqlite::Connection::open(store.path()).unwrap();
        conn.execute(
            "INSERT INTO blacklist (user_id, ban_time, expire_time, reason) VALUES ('10001', 'garbage', 'garbage', '')",
            [],
        )
        .unwrap();
        drop(conn);
        let mut event = message_from("10001");
        assert_eq!(check_message(&store, &mut event, t0()), GateDecision::Allow);
    }
}
