//! Per-message reaction summaries derived from raw reaction rows.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use mingle_shared::constants::{EMOJI_LIST, UNKNOWN_USER_NAME};
use mingle_shared::types::{MessageId, UserId};
use mingle_store::models::Reaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub viewer_has_reacted: bool,
    /// Display names in reaction order.
    pub reactor_names: Vec<String>,
}

pub type ReactionSummaries = HashMap<MessageId, Vec<ReactionSummary>>;

/// Group reactions per message and emoji.
///
/// Emojis outside [`EMOJI_LIST`] are ignored and summaries follow its
/// order. Rows repeating a `(message, user, emoji)` triple, as an
/// optimistic row and its echo would, count once. Messages without any
/// counted reaction get no entry.
pub fn summarize(
    reactions: impl IntoIterator<Item = impl Borrow<Reaction>>,
    viewer: UserId,
    names: &HashMap<UserId, String>,
) -> ReactionSummaries {
    let mut seen: HashSet<(MessageId, UserId, String)> = HashSet::new();
    // message -> slot in EMOJI_LIST -> (viewer reacted, names)
    let mut grouped: HashMap<MessageId, Vec<Option<(bool, Vec<String>)>>> = HashMap::new();

    for reaction in reactions {
        let reaction = reaction.borrow();
        let Some(slot) = EMOJI_LIST.iter().position(|e| *e == reaction.emoji) else {
            continue;
        };
        if !seen.insert((reaction.message_id, reaction.user_id, reaction.emoji.clone())) {
            continue;
        }

        let name = names
            .get(&reaction.user_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string());

        let slots = grouped
            .entry(reaction.message_id)
            .or_insert_with(|| vec![None; EMOJI_LIST.len()]);
        let (reacted, reactors) = slots[slot].get_or_insert_with(|| (false, Vec::new()));
        *reacted |= reaction.user_id == viewer;
        reactors.push(name);
    }

    grouped
        .into_iter()
        .map(|(message, slots)| {
            let summaries = slots
                .into_iter()
                .zip(EMOJI_LIST)
                .filter_map(|(slot, emoji)| {
                    let (viewer_has_reacted, reactor_names) = slot?;
                    Some(ReactionSummary {
                        emoji: emoji.to_string(),
                        count: reactor_names.len(),
                        viewer_has_reacted,
                        reactor_names,
                    })
                })
                .collect();
            (message, summaries)
        })
        .collect()
}
