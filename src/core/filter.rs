// QueryTrail - core/filter.rs
//
// Level and category filtering applied to incoming messages.
// Level, category, and except rules are AND-combined.
// Core layer: pure logic, no I/O.

use crate::core::model::{Level, LogMessage};
use crate::util::constants::{CATEGORY_WILDCARD, DEFAULT_CATEGORIES};
use std::collections::HashSet;

/// Filter rules applied by a target before buffering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    /// Levels to keep (empty = all).
    pub levels: HashSet<Level>,

    /// Categories to keep (empty = all). A trailing `*` makes a prefix match.
    pub categories: Vec<String>,

    /// Categories to drop even when `categories` matched.
    pub except: Vec<String>,
}

impl MessageFilter {
    /// Returns true if no filters are active.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty() && self.categories.is_empty() && self.except.is_empty()
    }

    /// Filter for the database command channels only.
    pub fn database_queries() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Check if a single message passes all rules.
    pub fn matches(&self, message: &LogMessage) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&message.level) {
            return false;
        }

        let included = self.categories.is_empty()
            || self
                .categories
                .iter()
                .any(|pattern| category_matches(pattern, &message.category));
        if !included {
            return false;
        }

        !self
            .except
            .iter()
            .any(|pattern| category_matches(pattern, &message.category))
    }
}

/// Keep only the messages that pass `filter`, preserving order.
pub fn filter_messages<I>(incoming: I, filter: &MessageFilter) -> Vec<LogMessage>
where
    I: IntoIterator<Item = LogMessage>,
{
    if filter.is_empty() {
        return incoming.into_iter().collect();
    }
    incoming.into_iter().filter(|m| filter.matches(m)).collect()
}

/// Exact match, or prefix match when the pattern ends with `*`.
fn category_matches(pattern: &str, category: &str) -> bool {
    pattern == category
        || (pattern.ends_with(CATEGORY_WILDCARD)
            && category.starts_with(pattern.trim_end_matches(CATEGORY_WILDCARD)))
}
