use std::collections::HashMap;
use crate::common::models::Keyed;

/// Insertion-ordered set of rows keyed by id.
///
/// Both the initial bulk read and the push channel feed the same collection and
/// can overlap, so every write goes through the id index and an id is never
/// listed twice.
#[derive(Debug, Clone)]
pub struct LiveCollection<T> {
    order: Vec<String>,
    items: HashMap<String, T>,
}

impl<T> Default for LiveCollection<T> {
    fn default() -> Self {
        Self { order: Vec::new(), items: HashMap::new() }
    }
}

impl<T: Keyed + Clone> LiveCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `item` unless its id is already present. Returns whether it was added.
    pub fn upsert_if_absent(&mut self, item: T) -> bool {
        if self.items.contains_key(item.key()) {
            return false;
        }
        let key = item.key().to_string();
        self.order.push(key.clone());
        self.items.insert(key, item);
        true
    }

    /// Replaces the contents with `rows`, deduplicated by id.
    ///
    /// A duplicated id keeps the position of its first occurrence and the value of its last.
    pub fn replace_all<I: IntoIterator<Item = T>>(&mut self, rows: I) {
        self.order.clear();
        self.items.clear();
        for row in rows {
            let key = row.key().to_string();
            if self.items.insert(key.clone(), row).is_none() {
                self.order.push(key);
            }
        }
    }

    /// Replaces the contents with `rows` and re-appends anything already present that
    /// `rows` does not contain, so a push that beat the bulk read survives it.
    pub fn merge_initial<I: IntoIterator<Item = T>>(&mut self, rows: I) -> usize {
        let previous = std::mem::take(&mut self.order);
        let mut previous_items = std::mem::take(&mut self.items);
        self.replace_all(rows);
        let mut kept = 0;
        for key in previous {
            if let Some(item) = previous_items.remove(&key) {
                if self.upsert_if_absent(item) {
                    kept += 1;
                }
            }
        }
        kept
    }

    pub fn to_ordered_list(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.order.iter().filter_map(move |k| self.items.get(k))
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.items.clear();
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|k| k == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: &'static str,
        body: &'static str,
    }

    impl Keyed for Row {
        fn key(&self) -> &str {
            self.id
        }
    }

    fn row(id: &'static str, body: &'static str) -> Row {
        Row { id, body }
    }

    #[test]
    fn repeated_insert_keeps_first_item() {
        let mut c = LiveCollection::new();
        assert!(c.upsert_if_absent(row("a", "first")));
        assert!(!c.upsert_if_absent(row("a", "second")));
        assert!(!c.upsert_if_absent(row("a", "first")));
        assert_eq!(c.len(), 1);
        assert_eq!(c.get("a").unwrap().body, "first");
    }

    #[test]
    fn inserts_are_appended_in_arrival_order() {
        let mut c = LiveCollection::new();
        c.upsert_if_absent(row("c", ""));
        c.upsert_if_absent(row("a", ""));
        c.upsert_if_absent(row("b", ""));
        let ids: Vec<_> = c.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn replace_all_dedups_keeping_first_position_last_value() {
        let mut c = LiveCollection::new();
        c.upsert_if_absent(row("old", ""));
        c.replace_all(vec![row("a", "1"), row("b", "2"), row("a", "3")]);
        assert_eq!(c.to_ordered_list(), vec![row("a", "3"), row("b", "2")]);
        assert!(!c.contains("old"));
    }

    #[test]
    fn merge_initial_keeps_pushed_rows_missing_from_fetch() {
        let mut c = LiveCollection::new();
        c.upsert_if_absent(row("late", "pushed"));
        c.upsert_if_absent(row("b", "pushed"));
        let kept = c.merge_initial(vec![row("a", "fetched"), row("b", "fetched")]);
        assert_eq!(kept, 1);
        let ids: Vec<_> = c.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "late"]);
        assert_eq!(c.get("b").unwrap().body, "fetched");
    }

    #[test]
    fn clear_empties_everything() {
        let mut c = LiveCollection::new();
        c.upsert_if_absent(row("a", ""));
        c.clear();
        assert!(c.is_empty());
        assert_eq!(c.position("a"), None);
    }
}
