//! Property tests for conversation pruning invariants.

use proptest::prelude::*;
use ragstack::{ConversationMessage, MessageRole, PrunerConfig, prune_conversation};

fn arb_role() -> impl Strategy<Value = MessageRole> {
    prop_oneof![
        Just(MessageRole::System),
        Just(MessageRole::User),
        Just(MessageRole::Assistant),
    ]
}

fn arb_messages() -> impl Strategy<Value = Vec<ConversationMessage>> {
    proptest::collection::vec((arb_role(), "[a-z ]{1,20}"), 0..40).prop_map(|items| {
        items
            .into_iter()
            .map(|(role, content)| ConversationMessage::new(role, content))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// For any input: no system message survives, the output is bounded by
    /// `2 * max_turns + 1` (plus 2 when the first turn is preserved), and a
    /// trailing user message always survives.
    #[test]
    fn pruning_invariants(
        messages in arb_messages(),
        max_turns in 0usize..8,
        preserve_first_turn in any::<bool>(),
    ) {
        let config = PrunerConfig { max_turns, preserve_first_turn };
        let outcome = prune_conversation(&messages, &config);

        for message in &outcome.messages {
            prop_assert!(message.role != MessageRole::System);
        }

        let bound = 2 * max_turns + 1 + if preserve_first_turn { 2 } else { 0 };
        prop_assert!(outcome.messages.len() <= bound);

        let trailing_user = messages
            .iter()
            .rev()
            .find(|m| m.role != MessageRole::System)
            .filter(|m| m.role == MessageRole::User);
        if let Some(current) = trailing_user {
            prop_assert_eq!(outcome.messages.last().unwrap(), current);
        }

        prop_assert_eq!(outcome.metrics.original_count, messages.len());
        prop_assert_eq!(outcome.metrics.pruned_count, outcome.messages.len());

        // Output preserves original relative order.
        let mut cursor = messages.iter();
        for kept in &outcome.messages {
            prop_assert!(cursor.any(|m| m == kept));
        }
    }

    /// Pruning twice with the same config is a fixed point.
    #[test]
    fn pruning_is_idempotent(
        messages in arb_messages(),
        max_turns in 0usize..8,
    ) {
        let config = PrunerConfig { max_turns, preserve_first_turn: false };
        let once = prune_conversation(&messages, &config);
        let twice = prune_conversation(&once.messages, &config);
        prop_assert_eq!(&once.messages, &twice.messages);
        prop_assert!(!twice.was_applied);
    }
}
