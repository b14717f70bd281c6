use crate::feed::FeedItem;

/// Items published since the previous observation, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    pub items: Vec<FeedItem>,
    /// The previous head could not be found in the new list, so every item is
    /// reported and some releases may have been missed entirely.
    pub gap: bool,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Returns the prefix of `new` that precedes the previous head item.
///
/// The feed only ever prepends, so the newest item of `old` is the only reference
/// point needed. The scan is bounded by `new`:
///
/// - `old` empty: nothing to compare against, the diff is empty
/// - previous head at index `k`: the diff is `new[..k]`
/// - previous head absent: the diff is all of `new` and `gap` is set
pub fn diff_changes(old: &[FeedItem], new: &[FeedItem]) -> Diff {
    let Some(last_known) = old.first() else {
        return Diff::default();
    };

    match new.iter().position(|item| item.guid == last_known.guid) {
        Some(index) => Diff {
            items: new[..index].to_vec(),
            gap: false,
        },
        None if new.is_empty() => Diff::default(),
        None => {
            tracing::warn!(
                last_known_guid = %last_known.guid,
                new_items = new.len(),
                "Gap detected: previous head not found in feed, treating every item as new"
            );
            Diff {
                items: new.to_vec(),
                gap: true,
            }
        }
    }
}
