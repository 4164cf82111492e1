// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.
//!
//! A message is one `messages` row plus its ordered `message_parts` rows.
//! Every write replaces both inside one transaction.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{OptionalExtension, Transaction, params, params_from_iter};

use mmsd_core::{
    ContentPart, Direction, Message, MessageFilter, MessageHeaders, MessageId, MmsdError,
    RetryState, TransactionState,
};

use crate::database::{Database, map_tr_err};

const MESSAGE_COLUMNS: &str = "id, direction, state, headers, read, failure, delivery_status, \
     raw_pdu, confirmation, attempts, max_attempts, next_attempt_at, created_at, updated_at, \
     last_attempt_at, expires_at";

/// Fixed-width RFC 3339 so that text order is time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_ts(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(ts)
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_ts(idx: usize, s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parse_opt_ts(idx: usize, s: Option<String>) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    s.map(|s| parse_ts(idx, &s)).transpose()
}

/// Row image of a message without its parts.
fn message_from_row(row: &rusqlite::Row<'_>) -> Result<Message, rusqlite::Error> {
    let direction: String = row.get(1)?;
    let state: String = row.get(2)?;
    let headers: String = row.get(3)?;
    let attempts: i64 = row.get(9)?;
    let max_attempts: i64 = row.get(10)?;

    Ok(Message {
        id: MessageId(row.get(0)?),
        direction: direction
            .parse::<Direction>()
            .map_err(|e| conversion_err(1, e))?,
        state: state
            .parse::<TransactionState>()
            .map_err(|e| conversion_err(2, e))?,
        headers: serde_json::from_str::<MessageHeaders>(&headers)
            .map_err(|e| conversion_err(3, e))?,
        parts: Vec::new(),
        read: row.get(4)?,
        failure: row.get(5)?,
        delivery_status: row.get(6)?,
        raw_pdu: row.get(7)?,
        confirmation: row.get(8)?,
        retry: RetryState {
            attempts: u32::try_from(attempts).map_err(|e| conversion_err(9, e))?,
            max_attempts: u32::try_from(max_attempts).map_err(|e| conversion_err(10, e))?,
            next_attempt_at: parse_opt_ts(11, row.get(11)?)?,
        },
        created_at: parse_ts(12, &row.get::<_, String>(12)?)?,
        updated_at: parse_ts(13, &row.get::<_, String>(13)?)?,
        last_attempt_at: parse_opt_ts(14, row.get(14)?)?,
        expires_at: parse_opt_ts(15, row.get(15)?)?,
    })
}

fn load_parts(conn: &rusqlite::Connection, id: &str) -> Result<Vec<ContentPart>, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(
        "SELECT content_type, content_id, filename, data
         FROM message_parts WHERE message_id = ?1 ORDER BY idx ASC",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok(ContentPart {
            content_type: row.get(0)?,
            content_id: row.get(1)?,
            filename: row.get(2)?,
            data: row.get(3)?,
        })
    })?;
    rows.collect()
}

/// Writes the row and replaces the parts. Caller owns the transaction.
fn write_message(tx: &Transaction<'_>, msg: &Message, upsert: bool) -> Result<(), rusqlite::Error> {
    let headers = serde_json::to_string(&msg.headers)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let verb = if upsert { "INSERT OR REPLACE" } else { "INSERT" };
    tx.execute(
        &format!(
            "{verb} INTO messages ({MESSAGE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            msg.id.as_str(),
            msg.direction.to_string(),
            msg.state.to_string(),
            headers,
            msg.read,
            msg.failure,
            msg.delivery_status,
            msg.raw_pdu,
            msg.confirmation,
            i64::from(msg.retry.attempts),
            i64::from(msg.retry.max_attempts),
            opt_ts(msg.retry.next_attempt_at),
            ts(msg.created_at),
            ts(msg.updated_at),
            opt_ts(msg.last_attempt_at),
            opt_ts(msg.expires_at),
        ],
    )?;

    tx.execute(
        "DELETE FROM message_parts WHERE message_id = ?1",
        params![msg.id.as_str()],
    )?;
    let mut stmt = tx.prepare_cached(
        "INSERT INTO message_parts (message_id, idx, content_type, content_id, filename, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (idx, part) in msg.parts.iter().enumerate() {
        stmt.execute(params![
            msg.id.as_str(),
            idx as i64,
            part.content_type,
            part.content_id,
            part.filename,
            part.data,
        ])?;
    }
    Ok(())
}

/// Insert a new message. Fails with `AlreadyExists` if the id is taken.
pub async fn create_message(db: &Database, msg: &Message) -> Result<(), MmsdError> {
    let msg = msg.clone();
    let id = msg.id.clone();
    let inserted = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM messages WHERE id = ?1",
                    params![msg.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Ok(false);
            }
            write_message(&tx, &msg, false)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;

    if inserted {
        Ok(())
    } else {
        Err(MmsdError::AlreadyExists { id })
    }
}

/// Insert or replace a message snapshot, parts included.
pub async fn put_message(db: &Database, msg: &Message) -> Result<(), MmsdError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            write_message(&tx, &msg, true)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a message with its parts.
pub async fn get_message(db: &Database, id: &MessageId) -> Result<Option<Message>, MmsdError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            let msg = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                    params![id],
                    message_from_row,
                )
                .optional()?;
            match msg {
                Some(mut msg) => {
                    msg.parts = load_parts(conn, &id)?;
                    Ok(Some(msg))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Translates a filter into a WHERE clause and its bound values.
fn filter_clause(filter: &MessageFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(direction) = filter.direction {
        values.push(Value::Text(direction.to_string()));
        conditions.push(format!("direction = ?{}", values.len()));
    }
    if !filter.states.is_empty() {
        let mut slots = Vec::with_capacity(filter.states.len());
        for state in &filter.states {
            values.push(Value::Text(state.to_string()));
            slots.push(format!("?{}", values.len()));
        }
        conditions.push(format!("state IN ({})", slots.join(", ")));
    }
    if let Some(read) = filter.read {
        values.push(Value::Integer(i64::from(read)));
        conditions.push(format!("read = ?{}", values.len()));
    }
    if let Some(before) = filter.terminal_before {
        let terminal = [
            TransactionState::Completed,
            TransactionState::Failed,
            TransactionState::Expired,
        ];
        let mut slots = Vec::with_capacity(terminal.len());
        for state in terminal {
            values.push(Value::Text(state.to_string()));
            slots.push(format!("?{}", values.len()));
        }
        conditions.push(format!("state IN ({})", slots.join(", ")));
        values.push(Value::Text(ts(before)));
        conditions.push(format!("updated_at < ?{}", values.len()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

/// List matching messages, oldest first.
pub async fn list_messages(
    db: &Database,
    filter: &MessageFilter,
) -> Result<Vec<Message>, MmsdError> {
    let (clause, values) = filter_clause(filter);
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages{clause}
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let mut messages = stmt
                .query_map(params_from_iter(values.iter()), message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            for msg in &mut messages {
                msg.parts = load_parts(conn, msg.id.as_str())?;
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a message and its parts. Returns whether it existed.
pub async fn delete_message(db: &Database, id: &MessageId) -> Result<bool, MmsdError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let removed = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mmsd_core::Priority;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
    }

    fn make_msg(id: &str, direction: Direction, created: i64) -> Message {
        let mut msg = Message::new(MessageId::from(id), direction, 5, at(created));
        msg.headers.subject = Some(format!("subject {id}"));
        msg.headers.to = vec!["+15551234567/TYPE=PLMN".into()];
        msg
    }

    #[tokio::test]
    async fn create_and_get_round_trips_every_field() {
        let db = Database::open_in_memory().await.unwrap();

        let mut msg = make_msg("T1", Direction::Inbound, 0);
        msg.state = TransactionState::Decoding;
        msg.headers.priority = Some(Priority::High);
        msg.headers.date = Some(at(-30));
        msg.headers.message_size = Some(2848);
        msg.read = true;
        msg.failure = Some("timed out".into());
        msg.raw_pdu = Some(vec![0x8C, 0x84, 0x00]);
        msg.retry.attempts = 2;
        msg.retry.next_attempt_at = Some(at(90));
        msg.last_attempt_at = Some(at(60));
        msg.expires_at = Some(at(604_800));
        msg.parts = vec![
            ContentPart::new("text/plain; charset=utf-8", b"hello".to_vec()),
            ContentPart {
                content_type: "image/jpeg".into(),
                content_id: Some("<img1>".into()),
                filename: Some("cat.jpg".into()),
                data: vec![0xFF, 0xD8, 0xFF],
            },
        ];

        create_message(&db, &msg).await.unwrap();
        let loaded = get_message(&db, &msg.id).await.unwrap().unwrap();
        assert_eq!(loaded, msg);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let db = Database::open_in_memory().await.unwrap();
        let msg = make_msg("DUP", Direction::Inbound, 0);
        create_message(&db, &msg).await.unwrap();

        let err = create_message(&db, &msg).await.unwrap_err();
        assert!(matches!(err, MmsdError::AlreadyExists { id } if id.as_str() == "DUP"));
    }

    #[tokio::test]
    async fn put_replaces_parts() {
        let db = Database::open_in_memory().await.unwrap();
        let mut msg = make_msg("P1", Direction::Outbound, 0);
        msg.parts = vec![
            ContentPart::new("text/plain", b"a".to_vec()),
            ContentPart::new("text/plain", b"b".to_vec()),
        ];
        put_message(&db, &msg).await.unwrap();

        msg.parts = vec![ContentPart::new("text/plain", b"only".to_vec())];
        msg.state = TransactionState::BearerWait;
        put_message(&db, &msg).await.unwrap();

        let loaded = get_message(&db, &msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, TransactionState::BearerWait);
        assert_eq!(loaded.parts.len(), 1);
        assert_eq!(loaded.parts[0].data, b"only");
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(get_message(&db, &MessageId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_and_orders_oldest_first() {
        let db = Database::open_in_memory().await.unwrap();

        let mut a = make_msg("A", Direction::Inbound, 20);
        a.state = TransactionState::Completed;
        let b = make_msg("B", Direction::Outbound, 10);
        let mut c = make_msg("C", Direction::Inbound, 0);
        c.state = TransactionState::BearerWait;
        c.read = true;
        for msg in [&a, &b, &c] {
            create_message(&db, msg).await.unwrap();
        }

        let all = list_messages(&db, &MessageFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["C", "B", "A"]);

        let inbound = MessageFilter {
            direction: Some(Direction::Inbound),
            ..Default::default()
        };
        assert_eq!(list_messages(&db, &inbound).await.unwrap().len(), 2);

        let unfinished = list_messages(&db, &MessageFilter::unfinished()).await.unwrap();
        let ids: Vec<_> = unfinished.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["C", "B"]);

        let unread = MessageFilter {
            read: Some(false),
            ..Default::default()
        };
        let ids: Vec<_> = list_messages(&db, &unread)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id.0)
            .collect();
        assert_eq!(ids, ["B", "A"]);
    }

    #[tokio::test]
    async fn terminal_before_selects_old_terminal_messages() {
        let db = Database::open_in_memory().await.unwrap();

        let mut old_done = make_msg("OLD", Direction::Inbound, 0);
        old_done.state = TransactionState::Completed;
        let mut new_done = make_msg("NEW", Direction::Inbound, 0);
        new_done.state = TransactionState::Failed;
        new_done.updated_at = at(0) + Duration::days(40);
        let old_pending = make_msg("PEND", Direction::Outbound, 0);
        for msg in [&old_done, &new_done, &old_pending] {
            create_message(&db, msg).await.unwrap();
        }

        let filter = MessageFilter {
            terminal_before: Some(at(0) + Duration::days(30)),
            ..Default::default()
        };
        let found = list_messages(&db, &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "OLD");
        assert!(filter.matches(&found[0]));
    }

    #[tokio::test]
    async fn delete_removes_message_and_parts() {
        let db = Database::open_in_memory().await.unwrap();
        let mut msg = make_msg("D1", Direction::Inbound, 0);
        msg.parts = vec![ContentPart::new("text/plain", b"bye".to_vec())];
        create_message(&db, &msg).await.unwrap();

        assert!(delete_message(&db, &msg.id).await.unwrap());
        assert!(!delete_message(&db, &msg.id).await.unwrap());

        let orphans: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM message_parts", [], |r| r.get(0))
            })
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
