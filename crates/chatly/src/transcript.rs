//! In-memory view of one chat's messages while a send is in flight.
//!
//! The transcript owns its rows and is the single place rows get appended,
//! swapped, or amended, so ordering and dedup rules live in one module.

use crate::completion::WireMessage;
use crate::store::MessageRow;
use tracing::debug;

#[derive(Default)]
pub struct Transcript {
    rows: Vec<MessageRow>,
}

impl Transcript {
    pub fn new(rows: Vec<MessageRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[MessageRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row unless one with the same id is already present. The
    /// change feed can re-deliver rows this process inserted itself, so
    /// append is idempotent by id. Returns whether the row was added.
    pub fn append(&mut self, row: MessageRow) -> bool {
        if self.rows.iter().any(|r| r.id == row.id) {
            debug!("Skipping duplicate row {}", row.id);
            return false;
        }
        self.rows.push(row);
        true
    }

    /// Removes the row with the given id. Used to roll back optimistic rows.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| r.id != id);
        before != self.rows.len()
    }

    /// Swaps an optimistic local row for its persisted counterpart, keeping
    /// the row's position. If the persisted row already arrived through the
    /// change feed, the local row is simply dropped.
    pub fn replace(&mut self, temp_id: &str, row: MessageRow) {
        if self.rows.iter().any(|r| r.id == row.id) {
            self.remove(temp_id);
            return;
        }
        match self.rows.iter_mut().find(|r| r.id == temp_id) {
            Some(slot) => *slot = row,
            None => {
                self.rows.push(row);
            }
        }
    }

    /// Appends a streamed fragment to the row's content, in arrival order.
    pub fn append_fragment(&mut self, id: &str, fragment: &str) {
        if let Some(row) = self.rows.iter_mut().find(|r| r.id == id) {
            row.content.push_str(fragment);
        }
    }

    pub fn set_content(&mut self, id: &str, content: &str) {
        if let Some(row) = self.rows.iter_mut().find(|r| r.id == id) {
            row.content = content.to_string();
        }
    }

    pub fn get(&self, id: &str) -> Option<&MessageRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    /// The transcript as wire messages, oldest first, for the prompt history.
    pub fn wire_history(&self) -> Vec<WireMessage> {
        self.rows
            .iter()
            .map(|r| WireMessage {
                role: r.role.clone(),
                content: r.content.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, role: &str, content: &str) -> MessageRow {
        MessageRow {
            id: id.into(),
            chat_id: "chat-1".into(),
            role: role.into(),
            content: content.into(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn fragments_accumulate_in_arrival_order() {
        let mut t = Transcript::default();
        t.append(row("a1", "assistant", ""));
        for fragment in ["Hel", "lo, ", "world"] {
            t.append_fragment("a1", fragment);
        }
        assert_eq!(t.get("a1").unwrap().content, "Hello, world");
    }

    #[test]
    fn append_is_idempotent_by_id() {
        let mut t = Transcript::default();
        assert!(t.append(row("m1", "user", "hi")));
        assert!(!t.append(row("m1", "user", "hi again")));
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("m1").unwrap().content, "hi");
    }

    #[test]
    fn remove_rolls_back_an_optimistic_row() {
        let mut t = Transcript::new(vec![row("m1", "user", "kept")]);
        t.append(row("tmp", "user", "optimistic"));
        assert!(t.remove("tmp"));
        assert!(!t.remove("tmp"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn replace_keeps_the_row_position() {
        let mut t = Transcript::default();
        t.append(row("tmp", "assistant", "draft"));
        t.append(row("m2", "user", "later"));

        t.replace("tmp", row("real", "assistant", "final"));
        let ids: Vec<&str> = t.rows().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["real", "m2"]);
    }

    #[test]
    fn replace_drops_the_local_row_when_the_real_one_already_arrived() {
        let mut t = Transcript::default();
        t.append(row("tmp", "assistant", "draft"));
        // Feed delivery beat the swap.
        t.append(row("real", "assistant", "final"));

        t.replace("tmp", row("real", "assistant", "final"));
        assert_eq!(t.len(), 1);
        assert_eq!(t.rows()[0].id, "real");
    }

    #[test]
    fn wire_history_preserves_roles_and_order() {
        let t = Transcript::new(vec![
            row("m1", "user", "q"),
            row("m2", "assistant", "a"),
        ]);
        let history = t.wire_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].content, "a");
    }
}
