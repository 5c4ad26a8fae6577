use std::collections::HashMap;

use uuid::Uuid;

use fete_types::events::TypingPayload;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TypingEntry {
    user_name: String,
    /// Connection that reported the entry; used to clear it on leave/disconnect.
    conn_id: Uuid,
}

/// Who is currently typing in one chat, keyed by the sender's user id.
/// A `true` report replaces any previous entry for that sender, `false`
/// removes it, so repeated starts never stack up.
#[derive(Debug, Default)]
pub struct TypingRoster {
    entries: HashMap<String, TypingEntry>,
}

impl TypingRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one indicator update reported by `conn_id`.
    pub fn apply(&mut self, conn_id: Uuid, payload: &TypingPayload) {
        if payload.is_typing {
            self.entries.insert(
                payload.user_id.clone(),
                TypingEntry { user_name: payload.user_name.clone(), conn_id },
            );
        } else {
            self.entries.remove(&payload.user_id);
        }
    }

    /// Drop every entry reported by `conn_id`, returning `(user_id, user_name)`
    /// of the removed senders.
    pub fn clear_connection(&mut self, conn_id: Uuid) -> Vec<(String, String)> {
        let gone: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.conn_id == conn_id)
            .map(|(user_id, _)| user_id.clone())
            .collect();

        gone.into_iter()
            .filter_map(|user_id| self.entries.remove(&user_id).map(|e| (user_id, e.user_name)))
            .collect()
    }

    /// Current typers as `(user_id, user_name)`, sorted by user id.
    pub fn typing(&self) -> Vec<(String, String)> {
        let mut typers: Vec<_> = self
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.user_name.clone()))
            .collect();
        typers.sort();
        typers
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user_id: &str, is_typing: bool) -> TypingPayload {
        TypingPayload {
            chat_id: "chat_1".into(),
            user_id: user_id.into(),
            user_name: format!("name-{user_id}"),
            is_typing,
        }
    }

    #[test]
    fn start_start_stop_leaves_roster_empty() {
        let conn = Uuid::new_v4();
        let mut roster = TypingRoster::new();
        roster.apply(conn, &typing("u1", true));
        roster.apply(conn, &typing("u1", true));
        assert_eq!(roster.typing().len(), 1);

        roster.apply(conn, &typing("u1", false));
        assert!(roster.is_empty());
    }

    #[test]
    fn stop_for_unknown_sender_is_harmless() {
        let mut roster = TypingRoster::new();
        roster.apply(Uuid::new_v4(), &typing("ghost", false));
        assert!(roster.is_empty());
    }

    #[test]
    fn clearing_a_connection_keeps_other_senders() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut roster = TypingRoster::new();
        roster.apply(a, &typing("u1", true));
        roster.apply(b, &typing("u2", true));

        let removed = roster.clear_connection(a);
        assert_eq!(removed, vec![("u1".to_string(), "name-u1".to_string())]);
        assert_eq!(roster.typing(), vec![("u2".to_string(), "name-u2".to_string())]);
    }
}
