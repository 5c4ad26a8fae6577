use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use fete_types::api::ActiveChat;
use fete_types::models::{Message, ReadReceipt};

use super::{col, json_col, opt_col, to_json};
use crate::Database;
use crate::models::NewMessage;

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, sender_type, sender_name, sender_email,
        content, message_type, attachments, is_read, created_at";

impl Database {
    /// Persist a message and hand it to `on_commit` before the connection
    /// lock is released. Broadcasting from `on_commit` keeps fan-out order
    /// identical to history order for a chat.
    pub fn insert_message<F>(&self, new: &NewMessage, on_commit: F) -> Result<Message>
    where
        F: FnOnce(&Message),
    {
        let now = Utc::now();
        let attachments = to_json(&new.attachments)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, sender_type, sender_name, sender_email,
                                       content, message_type, attachments, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    new.id.to_string(),
                    new.chat_id,
                    new.sender.map(|id| id.to_string()),
                    new.sender_type.as_str(),
                    new.sender_name,
                    new.sender_email,
                    new.content,
                    new.message_type.as_str(),
                    attachments,
                    now,
                ],
            )?;

            let message = Message {
                id: new.id,
                chat_id: new.chat_id.clone(),
                sender: new.sender,
                sender_type: new.sender_type,
                sender_name: new.sender_name.clone(),
                sender_email: new.sender_email.clone(),
                content: new.content.clone(),
                message_type: new.message_type,
                attachments: new.attachments.clone(),
                is_read: false,
                read_by: Vec::new(),
                created_at: now,
            };
            on_commit(&message);
            Ok(message)
        })
    }

    /// One page of a chat's history in insertion order.
    pub fn get_messages(&self, chat_id: &str, offset: u32, limit: u32) -> Result<(Vec<Message>, u64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1
                 ORDER BY seq ASC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let mut messages = stmt
                .query_map(rusqlite::params![chat_id, limit, offset], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut receipts = chat_receipts(conn, chat_id)?;
            for message in &mut messages {
                if let Some(read_by) = receipts.remove(&message.id) {
                    message.read_by = read_by;
                }
            }

            Ok((messages, total as u64))
        })
    }

    pub fn get_message(&self, chat_id: &str, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, chat_id, id))
    }

    /// Flag a message read and record `reader` once. Returns `None` when the
    /// message is not part of `chat_id`.
    pub fn mark_read(&self, chat_id: &str, id: Uuid, reader: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1 WHERE id = ?1 AND chat_id = ?2",
                rusqlite::params![id.to_string(), chat_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id.to_string(), reader.to_string(), Utc::now()],
            )?;
            query_message(conn, chat_id, id)
        })
    }

    /// Most recently active chats with their last message and counters.
    pub fn active_chats(&self, limit: u32) -> Result<Vec<ActiveChat>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.chat_id, m.content, m.created_at, agg.total, agg.unread
                 FROM (
                     SELECT chat_id,
                            MAX(seq) AS last_seq,
                            COUNT(*) AS total,
                            SUM(CASE WHEN is_read = 0 THEN 1 ELSE 0 END) AS unread
                     FROM messages
                     GROUP BY chat_id
                 ) agg
                 JOIN messages m ON m.seq = agg.last_seq
                 ORDER BY agg.last_seq DESC
                 LIMIT ?1",
            )?;
            let chats = stmt
                .query_map([limit], |row| {
                    Ok(ActiveChat {
                        chat_id: row.get(0)?,
                        last_message: row.get(1)?,
                        last_message_time: row.get(2)?,
                        message_count: row.get::<_, i64>(3)? as u64,
                        unread_count: row.get::<_, i64>(4)? as u64,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(chats)
        })
    }

    /// Delete every message of chats whose newest message predates `cutoff`.
    /// Returns the number of messages removed.
    pub fn delete_stale_chats(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM messages WHERE chat_id IN (
                     SELECT chat_id FROM messages GROUP BY chat_id HAVING MAX(created_at) < ?1
                 )",
                [cutoff],
            )?;
            Ok(removed)
        })
    }
}

fn query_message(conn: &Connection, chat_id: &str, id: Uuid) -> Result<Option<Message>> {
    let message = conn
        .query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND chat_id = ?2"),
            rusqlite::params![id.to_string(), chat_id],
            map_message,
        )
        .optional()?;

    let Some(mut message) = message else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT user_id, read_at FROM message_reads WHERE message_id = ?1 ORDER BY read_at ASC",
    )?;
    message.read_by = stmt
        .query_map([id.to_string()], |row| {
            Ok(ReadReceipt { user: col(row, 0)?, read_at: row.get(1)? })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Some(message))
}

/// Read receipts for every message of a chat, grouped by message id.
fn chat_receipts(conn: &Connection, chat_id: &str) -> Result<HashMap<Uuid, Vec<ReadReceipt>>> {
    let mut stmt = conn.prepare(
        "SELECT r.message_id, r.user_id, r.read_at
         FROM message_reads r
         JOIN messages m ON m.id = r.message_id
         WHERE m.chat_id = ?1
         ORDER BY r.read_at ASC",
    )?;
    let rows = stmt.query_map([chat_id], |row| {
        Ok((col::<Uuid>(row, 0)?, ReadReceipt { user: col(row, 1)?, read_at: row.get(2)? }))
    })?;

    let mut grouped: HashMap<Uuid, Vec<ReadReceipt>> = HashMap::new();
    for row in rows {
        let (message_id, receipt) = row?;
        grouped.entry(message_id).or_default().push(receipt);
    }
    Ok(grouped)
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: col(row, 0)?,
        chat_id: row.get(1)?,
        sender: opt_col(row, 2)?,
        sender_type: col(row, 3)?,
        sender_name: row.get(4)?,
        sender_email: row.get(5)?,
        content: row.get(6)?,
        message_type: col(row, 7)?,
        attachments: json_col(row, 8)?,
        is_read: row.get(9)?,
        read_by: Vec::new(),
        created_at: row.get(10)?,
    })
}
