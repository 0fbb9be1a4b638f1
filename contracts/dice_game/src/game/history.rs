use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::RoundRecord;

pub const HISTORY_CAPACITY: usize = 10;

/// Newest-first log of resolved rounds. Holds at most [`HISTORY_CAPACITY`] records.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    records: VecDeque<RoundRecord>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record` at the front and drops whatever falls past the cap.
    pub fn push(&mut self, record: RoundRecord) {
        self.records.push_front(record);
        self.records.truncate(HISTORY_CAPACITY);
    }

    pub fn latest(&self) -> Option<&RoundRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoundRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a HistoryLog {
    type Item = &'a RoundRecord;
    type IntoIter = std::collections::vec_deque::Iter<'a, RoundRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Condition;
    use pretty_assertions::assert_eq;

    fn record(id: u64) -> RoundRecord {
        RoundRecord::new(id, 50, Condition::GreaterThan, 75, id)
    }

    #[test]
    fn keeps_newest_first() {
        let mut log = HistoryLog::new();
        log.push(record(1));
        log.push(record(2));
        log.push(record(3));
        let ids: Vec<u64> = log.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3u64, 2, 1]);
        assert_eq!(log.latest().map(|r| r.id), Some(3));
    }

    #[test]
    fn evicts_from_the_tail() {
        let mut log = HistoryLog::new();
        for id in 1..=25 {
            log.push(record(id));
            assert_eq!(log.len(), (id as usize).min(HISTORY_CAPACITY));
        }
        let ids: Vec<u64> = log.iter().map(|r| r.id).collect();
        assert_eq!(ids, (16..=25u64).rev().collect::<Vec<_>>());
    }

    #[test]
    fn serializes_as_a_plain_list() {
        let mut log = HistoryLog::new();
        log.push(record(9));
        let json = serde_json::to_value(&log).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["id"], 9);
    }
}
