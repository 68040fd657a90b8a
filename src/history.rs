//! Per-session query history.
//!
//! Each session keeps its most recent entries in a bounded FIFO buffer. The
//! ledger lives in process memory only and is empty after a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entries kept per session
pub const DEFAULT_CAPACITY: usize = 10;

/// Title reported for entries whose query returned no products
pub const UNKNOWN_TITLE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Image,
    Link,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub query_type: QueryType,
    pub source_url: Option<String>,
    /// Title of the first result, if there was one
    pub first_title: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(query_type: QueryType, source_url: Option<String>, first_title: Option<String>) -> Self {
        Self {
            query_type,
            source_url,
            first_title,
            recorded_at: Utc::now(),
        }
    }
}

/// Read-side view of one history entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub url: Option<String>,
    pub first_product_title: String,
    /// Position within the session's current window, oldest = 0
    pub timestamp_index: usize,
    pub recorded_at: DateTime<Utc>,
}

type SessionLog = Arc<Mutex<VecDeque<HistoryEntry>>>;

/// Bounded per-session history.
///
/// Appends to one session serialize on that session's lock; different sessions
/// only share the brief map lookup.
pub struct HistoryLedger {
    sessions: RwLock<HashMap<String, SessionLog>>,
    capacity: usize,
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HistoryLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, evicting the oldest once the session is full.
    pub fn record(&self, session_id: &str, entry: HistoryEntry) {
        let log = self.session_log(session_id);
        let mut entries = log.lock().unwrap_or_else(|e| e.into_inner());

        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Entries for a session, oldest first. Unknown sessions are empty.
    pub fn list(&self, session_id: &str) -> Vec<HistoryItem> {
        let log = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            match sessions.get(session_id) {
                Some(log) => log.clone(),
                None => return Vec::new(),
            }
        };

        let entries = log.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| HistoryItem {
                query_type: entry.query_type,
                url: entry.source_url.clone(),
                first_product_title: entry
                    .first_title
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
                timestamp_index: idx,
                recorded_at: entry.recorded_at,
            })
            .collect()
    }

    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .map(|s| s.len())
            .unwrap_or_else(|e| e.into_inner().len())
    }

    fn session_log(&self, session_id: &str) -> SessionLog {
        if let Some(log) = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
        {
            return log.clone();
        }

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(self.capacity))))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn image_entry(title: &str) -> HistoryEntry {
        HistoryEntry::new(QueryType::Image, None, Some(title.to_string()))
    }

    #[test]
    fn test_record_and_list() {
        let ledger = HistoryLedger::default();
        ledger.record("s1", image_entry("first"));
        ledger.record(
            "s1",
            HistoryEntry::new(
                QueryType::Link,
                Some("https://www.flipkart.com/p/1".to_string()),
                Some("second".to_string()),
            ),
        );

        let items = ledger.list("s1");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].first_product_title, "first");
        assert_eq!(items[0].timestamp_index, 0);
        assert_eq!(items[1].query_type, QueryType::Link);
        assert_eq!(items[1].url.as_deref(), Some("https://www.flipkart.com/p/1"));
        assert_eq!(items[1].timestamp_index, 1);
    }

    #[test]
    fn test_cap_keeps_last_ten_in_order() {
        let ledger = HistoryLedger::new(10);
        for i in 0..12 {
            ledger.record("s", image_entry(&format!("q{i}")));
        }

        let titles: Vec<String> = ledger
            .list("s")
            .into_iter()
            .map(|item| item.first_product_title)
            .collect();
        let expected: Vec<String> = (2..12).map(|i| format!("q{i}")).collect();
        assert_eq!(titles, expected);
    }

    #[test]
    fn test_window_indices_restart_at_zero() {
        let ledger = HistoryLedger::new(3);
        for i in 0..5 {
            ledger.record("s", image_entry(&format!("q{i}")));
        }

        let indices: Vec<usize> = ledger.list("s").iter().map(|i| i.timestamp_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_title_is_unknown() {
        let ledger = HistoryLedger::default();
        ledger.record("s", HistoryEntry::new(QueryType::Image, None, None));

        assert_eq!(ledger.list("s")[0].first_product_title, UNKNOWN_TITLE);
    }

    #[test]
    fn test_sessions_are_independent() {
        let ledger = HistoryLedger::new(2);
        ledger.record("a", image_entry("a1"));
        ledger.record("b", image_entry("b1"));
        ledger.record("a", image_entry("a2"));
        ledger.record("a", image_entry("a3"));

        assert_eq!(ledger.list("a").len(), 2);
        assert_eq!(ledger.list("b").len(), 1);
        assert_eq!(ledger.session_count(), 2);
    }

    #[test]
    fn test_unknown_session_is_empty_and_not_created() {
        let ledger = HistoryLedger::default();
        assert!(ledger.list("nobody").is_empty());
        assert_eq!(ledger.session_count(), 0);
    }

    #[test]
    fn test_concurrent_appends_respect_cap() {
        let ledger = Arc::new(HistoryLedger::new(10));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        ledger.record("shared", image_entry(&format!("t{t}-{i}")));
                        ledger.record(&format!("own-{t}"), image_entry(&format!("{i}")));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.list("shared").len(), 10);
        for t in 0..8 {
            let own = ledger.list(&format!("own-{t}"));
            let titles: Vec<String> = own.into_iter().map(|i| i.first_product_title).collect();
            let expected: Vec<String> = (40..50).map(|i| format!("{i}")).collect();
            assert_eq!(titles, expected);
        }
    }

    #[test]
    fn test_item_serializes_type_field() {
        let ledger = HistoryLedger::default();
        ledger.record("s", image_entry("x"));

        let json = serde_json::to_value(&ledger.list("s")[0]).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["first_product_title"], "x");
        assert_eq!(json["timestamp_index"], 0);
        assert!(json["url"].is_null());
    }
}
