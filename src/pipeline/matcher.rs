use std::collections::HashSet;

use crate::feed::FeedItem;
use crate::storage::Subscription;

/// Returns the items whose title contains at least one subscription query.
///
/// Comparison is plain substring containment after lowercasing both sides. Output
/// follows the order of `items`, and an item matching several queries appears once.
pub fn match_subscriptions(subscriptions: &[Subscription], items: &[FeedItem]) -> Vec<FeedItem> {
    if subscriptions.is_empty() || items.is_empty() {
        return Vec::new();
    }

    let queries: Vec<String> = subscriptions
        .iter()
        .map(|sub| sub.query.to_lowercase())
        .collect();

    let mut seen: HashSet<&str> = HashSet::with_capacity(items.len());
    let mut matched = Vec::new();

    for item in items {
        let title = item.title.to_lowercase();
        if queries.iter().any(|q| title.contains(q.as_str())) && seen.insert(item.guid.as_str()) {
            matched.push(item.clone());
        }
    }

    matched
}
