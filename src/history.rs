//! Conversation history pruning.
//!
//! Bounds the prior turns sent to the model without breaking turn
//! semantics: the trailing unanswered user message (the "current" message)
//! is always kept, complete user/assistant turns are retained newest-first
//! up to the configured limit, and system-role messages never reach the
//! client-bound result.

use serde::{Deserialize, Serialize};

use crate::config::PrunerConfig;
use crate::document::{ConversationMessage, MessageRole};

/// Accounting for one pruning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneMetrics {
    /// Messages in the input, including system messages.
    pub original_count: usize,
    /// Messages in the output.
    pub pruned_count: usize,
    /// Complete turns retained.
    pub turns_preserved: usize,
    /// System messages filtered out.
    pub system_filtered: usize,
}

/// The pruned history plus what happened to it.
#[derive(Debug, Clone)]
pub struct PruneOutcome {
    /// Retained messages in original relative order.
    pub messages: Vec<ConversationMessage>,
    /// Whether any non-system message was actually dropped.
    pub was_applied: bool,
    /// Counts for observability.
    pub metrics: PruneMetrics,
}

/// Prune a conversation to at most `max_turns` complete turns plus the
/// current message.
///
/// A turn is a user message immediately followed by its assistant reply.
/// The walk is a single backward pass, linear in the input size.
/// `max_turns = 0` keeps only the current message. With
/// `preserve_first_turn` set, the oldest complete turn is kept in addition
/// to the most recent `max_turns` when truncation occurs.
pub fn prune_conversation(
    messages: &[ConversationMessage],
    config: &PrunerConfig,
) -> PruneOutcome {
    let original_count = messages.len();

    // 1. Drop system messages from the client-bound result.
    let visible: Vec<usize> = (0..messages.len())
        .filter(|&i| messages[i].role != MessageRole::System)
        .collect();
    let system_filtered = original_count - visible.len();

    // 2. A trailing unanswered user message is the current message.
    let current = match visible.last() {
        Some(&i) if messages[i].role == MessageRole::User => Some(i),
        _ => None,
    };
    let turn_region_end = match current {
        Some(_) => visible.len() - 1,
        None => visible.len(),
    };

    // 3. Pair complete turns walking backward. Pairing stops at the first
    // position that does not form a user/assistant pair; older messages
    // cannot belong to an aligned turn.
    let mut turns: Vec<(usize, usize)> = Vec::new();
    let mut i = turn_region_end;
    while i >= 2 {
        let assistant = visible[i - 1];
        let user = visible[i - 2];
        if messages[assistant].role == MessageRole::Assistant
            && messages[user].role == MessageRole::User
        {
            turns.push((user, assistant));
            i -= 2;
        } else {
            break;
        }
    }

    // 4. Keep the newest `max_turns` turns; optionally also the oldest one.
    let mut kept: Vec<(usize, usize)> = turns.iter().take(config.max_turns).copied().collect();
    if config.preserve_first_turn && turns.len() > config.max_turns {
        if let Some(&oldest) = turns.last() {
            kept.push(oldest);
        }
    }
    let turns_preserved = kept.len();

    let mut keep_indices: Vec<usize> = kept.iter().flat_map(|&(u, a)| [u, a]).collect();
    if let Some(current) = current {
        keep_indices.push(current);
    }
    keep_indices.sort_unstable();

    let pruned: Vec<ConversationMessage> =
        keep_indices.iter().map(|&i| messages[i].clone()).collect();
    let was_applied = pruned.len() < visible.len();

    PruneOutcome {
        metrics: PruneMetrics {
            original_count,
            pruned_count: pruned.len(),
            turns_preserved,
            system_filtered,
        },
        was_applied,
        messages: pruned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(content: &str) -> ConversationMessage {
        ConversationMessage::new(MessageRole::User, content)
    }

    fn assistant(content: &str) -> ConversationMessage {
        ConversationMessage::new(MessageRole::Assistant, content)
    }

    fn system(content: &str) -> ConversationMessage {
        ConversationMessage::new(MessageRole::System, content)
    }

    /// Alternating u/a pairs plus a trailing unanswered user message.
    fn conversation(turns: usize) -> Vec<ConversationMessage> {
        let mut messages = Vec::new();
        for t in 0..turns {
            messages.push(user(&format!("u{t}")));
            messages.push(assistant(&format!("a{t}")));
        }
        messages.push(user("current"));
        messages
    }

    #[test]
    fn eleven_messages_two_turns_keeps_last_five() {
        // 6 user + 5 assistant: turns u0..u4 answered, u5 current.
        let messages = conversation(5);
        assert_eq!(messages.len(), 11);
        let outcome = prune_conversation(
            &messages,
            &PrunerConfig { max_turns: 2, preserve_first_turn: false },
        );
        let contents: Vec<&str> =
            outcome.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["u3", "a3", "u4", "a4", "current"]);
        assert!(outcome.was_applied);
        assert_eq!(outcome.metrics.turns_preserved, 2);
        assert_eq!(outcome.metrics.original_count, 11);
        assert_eq!(outcome.metrics.pruned_count, 5);
    }

    #[test]
    fn current_message_always_survives() {
        let messages = conversation(4);
        let outcome = prune_conversation(
            &messages,
            &PrunerConfig { max_turns: 0, preserve_first_turn: false },
        );
        let contents: Vec<&str> =
            outcome.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["current"]);
    }

    #[test]
    fn system_messages_never_appear_in_output() {
        let mut messages = vec![system("be helpful")];
        messages.extend(conversation(2));
        messages.insert(3, system("tool output"));
        let outcome = prune_conversation(&messages, &PrunerConfig::default());
        assert!(outcome.messages.iter().all(|m| m.role != MessageRole::System));
        assert_eq!(outcome.metrics.system_filtered, 2);
    }

    #[test]
    fn no_truncation_means_not_applied() {
        let messages = conversation(3);
        let outcome = prune_conversation(
            &messages,
            &PrunerConfig { max_turns: 10, preserve_first_turn: false },
        );
        assert!(!outcome.was_applied);
        assert_eq!(outcome.messages.len(), 7);
        assert_eq!(outcome.metrics.turns_preserved, 3);
    }

    #[test]
    fn system_filtering_alone_is_not_truncation() {
        let mut messages = vec![system("prompt")];
        messages.extend(conversation(1));
        let outcome = prune_conversation(&messages, &PrunerConfig::default());
        assert!(!outcome.was_applied);
        assert_eq!(outcome.metrics.system_filtered, 1);
    }

    #[test]
    fn output_bounded_by_two_n_plus_one() {
        for max_turns in 0..6 {
            let messages = conversation(20);
            let outcome = prune_conversation(
                &messages,
                &PrunerConfig { max_turns, preserve_first_turn: false },
            );
            assert!(outcome.messages.len() <= 2 * max_turns + 1);
        }
    }

    #[test]
    fn preserve_first_turn_keeps_oldest_pair() {
        let messages = conversation(6);
        let outcome = prune_conversation(
            &messages,
            &PrunerConfig { max_turns: 2, preserve_first_turn: true },
        );
        let contents: Vec<&str> =
            outcome.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["u0", "a0", "u4", "a4", "u5", "a5", "current"]);
        assert_eq!(outcome.metrics.turns_preserved, 3);
    }

    #[test]
    fn answered_final_message_means_no_current() {
        let mut messages = conversation(3);
        messages.pop(); // drop the trailing user message
        let outcome = prune_conversation(
            &messages,
            &PrunerConfig { max_turns: 1, preserve_first_turn: false },
        );
        let contents: Vec<&str> =
            outcome.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["u2", "a2"]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let outcome = prune_conversation(&[], &PrunerConfig::default());
        assert!(outcome.messages.is_empty());
        assert!(!outcome.was_applied);
        assert_eq!(outcome.metrics.original_count, 0);
    }
}
