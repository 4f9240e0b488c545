//! Connection store and state machine.
//!
//! A record moves `pending -> {accepted, rejected}` and is terminal per
//! record; only `remove_connection` (accepted records only) clears a pair
//! so it can be requested again. Rejected records are retained and are not
//! automatically re-requestable.

use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use devtinder_types::models::{Connection, ConnectionStatus};

use crate::models::{fmt_ts, row_to_connection};
use crate::{Database, Result, StoreError};

const CONNECTION_COLUMNS: &str = "id, requester, recipient, status, created_at, updated_at";

impl Database {
    /// Create a pending request from `requester` to `recipient`.
    ///
    /// Fails if the pair is already connected or a pending request exists in
    /// either direction. A retained rejected record in the same direction
    /// still occupies the ordered pair and surfaces as "already sent".
    pub fn request_connection(&self, requester: Uuid, recipient: Uuid) -> Result<()> {
        if requester == recipient {
            return Err(StoreError::SelfConnection);
        }

        self.with_conn(|conn| {
            // Prefer accepted/pending over a lingering rejected record when
            // the pair has accumulated more than one row.
            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {CONNECTION_COLUMNS} FROM connections
                         WHERE (requester = ?1 AND recipient = ?2)
                            OR (requester = ?2 AND recipient = ?1)
                         ORDER BY CASE status
                             WHEN 'accepted' THEN 0
                             WHEN 'pending' THEN 1
                             ELSE 2 END
                         LIMIT 1"
                    ),
                    [requester.to_string(), recipient.to_string()],
                    row_to_connection,
                )
                .optional()?;

            if let Some(record) = existing {
                match record.status {
                    ConnectionStatus::Accepted => return Err(StoreError::AlreadyConnected),
                    ConnectionStatus::Pending => {
                        return Err(if record.requester == requester {
                            StoreError::RequestAlreadySent
                        } else {
                            StoreError::RequestAlreadyReceived
                        });
                    }
                    // A rejected record does not block the insert attempt;
                    // same-direction re-requests hit the UNIQUE(requester,
                    // recipient) constraint below, reverse-direction ones
                    // create a fresh pending record.
                    ConnectionStatus::Rejected => {}
                }
            }

            let now = fmt_ts(Utc::now());
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO connections (id, requester, recipient, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
                (
                    Uuid::new_v4().to_string(),
                    requester.to_string(),
                    recipient.to_string(),
                    &now,
                ),
            )?;

            if inserted == 0 {
                return Err(StoreError::RequestAlreadySent);
            }
            Ok(())
        })
    }

    /// Accept a pending request. Requires the record to run
    /// `requester -> recipient` in exactly that direction.
    pub fn accept_connection(&self, recipient: Uuid, requester: Uuid) -> Result<()> {
        self.transition_pending(recipient, requester, ConnectionStatus::Accepted)
    }

    /// Reject a pending request. The record is retained with status
    /// `rejected`, not deleted.
    pub fn reject_connection(&self, recipient: Uuid, requester: Uuid) -> Result<()> {
        self.transition_pending(recipient, requester, ConnectionStatus::Rejected)
    }

    fn transition_pending(
        &self,
        recipient: Uuid,
        requester: Uuid,
        to: ConnectionStatus,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE connections SET status = ?1, updated_at = ?2
                 WHERE requester = ?3 AND recipient = ?4 AND status = 'pending'",
                (
                    to.as_str(),
                    fmt_ts(Utc::now()),
                    requester.to_string(),
                    recipient.to_string(),
                ),
            )?;

            if updated == 0 {
                return Err(StoreError::NoSuchRequest);
            }
            Ok(())
        })
    }

    /// Remove an accepted connection between two users. Unlike reject, this
    /// deletes the record entirely, so either party may request again.
    pub fn remove_connection(&self, user_a: Uuid, user_b: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM connections
                 WHERE ((requester = ?1 AND recipient = ?2)
                     OR (requester = ?2 AND recipient = ?1))
                   AND status = 'accepted'",
                [user_a.to_string(), user_b.to_string()],
            )?;

            if deleted == 0 {
                return Err(StoreError::NotConnected);
            }
            Ok(())
        })
    }

    /// True iff an accepted record exists between the pair in either
    /// direction. This is the sole gate the message path consults.
    pub fn is_connected(&self, user_a: Uuid, user_b: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let connected: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM connections
                    WHERE ((requester = ?1 AND recipient = ?2)
                        OR (requester = ?2 AND recipient = ?1))
                      AND status = 'accepted')",
                [user_a.to_string(), user_b.to_string()],
                |row| row.get(0),
            )?;
            Ok(connected)
        })
    }

    /// IDs of users connected to `user`. Each entry is the OTHER party of an
    /// accepted record, never `user` itself.
    pub fn list_accepted(&self, user: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT CASE WHEN requester = ?1 THEN recipient ELSE requester END
                 FROM connections
                 WHERE (requester = ?1 OR recipient = ?1) AND status = 'accepted'
                 ORDER BY updated_at DESC",
            )?;
            collect_ids(&mut stmt, user)
        })
    }

    /// Users with a pending request TOWARDS `user` (their IDs).
    pub fn list_pending_incoming(&self, user: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT requester FROM connections
                 WHERE recipient = ?1 AND status = 'pending'
                 ORDER BY created_at DESC",
            )?;
            collect_ids(&mut stmt, user)
        })
    }

    /// Users `user` has a pending request towards (their IDs).
    pub fn list_pending_outgoing(&self, user: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT recipient FROM connections
                 WHERE requester = ?1 AND status = 'pending'
                 ORDER BY created_at DESC",
            )?;
            collect_ids(&mut stmt, user)
        })
    }

    /// Fetch the raw record between a pair, if any. Test and diagnostic
    /// helper; mutation goes through the operations above.
    pub fn connection_between(&self, user_a: Uuid, user_b: Uuid) -> Result<Option<Connection>> {
        self.with_conn(|conn| {
            let record = conn
                .query_row(
                    &format!(
                        "SELECT {CONNECTION_COLUMNS} FROM connections
                         WHERE (requester = ?1 AND recipient = ?2)
                            OR (requester = ?2 AND recipient = ?1)"
                    ),
                    [user_a.to_string(), user_b.to_string()],
                    row_to_connection,
                )
                .optional()?;
            Ok(record)
        })
    }
}

fn collect_ids(stmt: &mut rusqlite::Statement<'_>, user: Uuid) -> Result<Vec<Uuid>> {
    let rows = stmt.query_map([user.to_string()], |row| {
        let id: String = row.get(0)?;
        crate::models::parse_uuid(0, &id)
    })?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{test_db, user};

    #[test]
    fn request_accept_lifecycle() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        db.request_connection(a, b).unwrap();
        assert!(!db.is_connected(a, b).unwrap());
        assert_eq!(db.list_pending_incoming(b).unwrap(), vec![a]);
        assert_eq!(db.list_pending_outgoing(a).unwrap(), vec![b]);

        db.accept_connection(b, a).unwrap();
        assert!(db.is_connected(a, b).unwrap());
        assert_eq!(db.list_accepted(a).unwrap(), vec![b]);
        assert_eq!(db.list_accepted(b).unwrap(), vec![a]);
        assert!(db.list_pending_incoming(b).unwrap().is_empty());
    }

    #[test]
    fn is_connected_is_symmetric() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        assert_eq!(
            db.is_connected(a, b).unwrap(),
            db.is_connected(b, a).unwrap()
        );

        db.request_connection(a, b).unwrap();
        db.accept_connection(b, a).unwrap();
        assert!(db.is_connected(a, b).unwrap());
        assert!(db.is_connected(b, a).unwrap());

        db.remove_connection(b, a).unwrap();
        assert_eq!(
            db.is_connected(a, b).unwrap(),
            db.is_connected(b, a).unwrap()
        );
    }

    #[test]
    fn self_connection_is_rejected() {
        let db = test_db();
        let a = user(&db, "alice");

        assert!(matches!(
            db.request_connection(a, a),
            Err(StoreError::SelfConnection)
        ));
    }

    #[test]
    fn duplicate_requests_report_the_existing_direction() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        db.request_connection(a, b).unwrap();
        assert!(matches!(
            db.request_connection(a, b),
            Err(StoreError::RequestAlreadySent)
        ));
        assert!(matches!(
            db.request_connection(b, a),
            Err(StoreError::RequestAlreadyReceived)
        ));

        db.accept_connection(b, a).unwrap();
        assert!(matches!(
            db.request_connection(a, b),
            Err(StoreError::AlreadyConnected)
        ));
        assert!(matches!(
            db.request_connection(b, a),
            Err(StoreError::AlreadyConnected)
        ));
    }

    #[test]
    fn accept_requires_exact_direction() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        db.request_connection(a, b).unwrap();

        // Alice cannot accept her own outgoing request.
        assert!(matches!(
            db.accept_connection(a, b),
            Err(StoreError::NoSuchRequest)
        ));
        db.accept_connection(b, a).unwrap();
    }

    #[test]
    fn reject_retains_the_record() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        db.request_connection(a, b).unwrap();
        db.reject_connection(b, a).unwrap();

        let record = db.connection_between(a, b).unwrap().unwrap();
        assert_eq!(record.status, ConnectionStatus::Rejected);
        assert!(!db.is_connected(a, b).unwrap());

        // Rejected is terminal per record: the same direction cannot be
        // re-requested while the record survives.
        assert!(matches!(
            db.request_connection(a, b),
            Err(StoreError::RequestAlreadySent)
        ));
        // remove only matches accepted records, so the pair stays occupied.
        assert!(matches!(
            db.remove_connection(a, b),
            Err(StoreError::NotConnected)
        ));
    }

    #[test]
    fn removal_resets_state_for_a_fresh_request() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        db.request_connection(a, b).unwrap();
        db.accept_connection(b, a).unwrap();
        db.remove_connection(a, b).unwrap();

        assert!(!db.is_connected(a, b).unwrap());
        assert!(db.connection_between(a, b).unwrap().is_none());

        // A fresh request goes through and lands pending.
        db.request_connection(a, b).unwrap();
        let record = db.connection_between(a, b).unwrap().unwrap();
        assert_eq!(record.status, ConnectionStatus::Pending);
    }

    #[test]
    fn remove_requires_an_accepted_connection() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");

        assert!(matches!(
            db.remove_connection(a, b),
            Err(StoreError::NotConnected)
        ));

        db.request_connection(a, b).unwrap();
        assert!(matches!(
            db.remove_connection(a, b),
            Err(StoreError::NotConnected)
        ));
    }

    #[test]
    fn listings_exclude_the_caller_and_other_statuses() {
        let db = test_db();
        let a = user(&db, "alice");
        let b = user(&db, "bob");
        let c = user(&db, "carol");

        db.request_connection(a, b).unwrap();
        db.accept_connection(b, a).unwrap();
        db.request_connection(c, a).unwrap();

        assert_eq!(db.list_accepted(a).unwrap(), vec![b]);
        assert_eq!(db.list_pending_incoming(a).unwrap(), vec![c]);
        assert!(db.list_pending_outgoing(a).unwrap().is_empty());
        assert_eq!(db.list_pending_outgoing(c).unwrap(), vec![a]);
    }
}
