//! Property-based tests for the transport mailbox
//!
//! Fragmented text must come out of the mailbox exactly as it went in, no
//! matter where the transport splits it, and the mailbox must never hold
//! more frames than its capacity.

use proptest::prelude::*;
use statuslink_core::RealtimeConfig;
use statuslink_runtime::{opcode, DataFrame, Mailbox};

/// Text plus sorted, distinct cut points strictly inside it
fn arb_split_text() -> impl Strategy<Value = (String, Vec<usize>)> {
    "[ -~]{2,512}".prop_flat_map(|text| {
        let len = text.len();
        let cuts = proptest::collection::btree_set(1..len, 1..8)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>());
        (Just(text), cuts)
    })
}

proptest! {
    #[test]
    fn fragments_reassemble_to_original((text, cuts) in arb_split_text()) {
        let mut mailbox = Mailbox::new(&RealtimeConfig::default());
        let sink = mailbox.sink(1);
        let bytes = text.as_bytes();

        let mut start = 0;
        for end in cuts.iter().copied().chain(std::iter::once(bytes.len())) {
            let kind = if start == 0 { opcode::TEXT } else { opcode::CONTINUATION };
            sink.on_data(DataFrame::fragment(kind, &bytes[start..end], start, bytes.len()));
            start = end;
        }

        let frame = mailbox.next_frame().expect("reassembled frame");
        prop_assert_eq!(frame.text, text);
        prop_assert!(mailbox.next_frame().is_none());
    }

    #[test]
    fn mailbox_never_exceeds_capacity(capacity in 2usize..16, burst in 0usize..40) {
        let config = RealtimeConfig {
            mailbox_capacity: capacity,
            ..RealtimeConfig::default()
        };
        let mut mailbox = Mailbox::new(&config);
        let sink = mailbox.sink(7);

        for i in 0..burst {
            let text = format!("{{\"seq\":{i}}}");
            sink.on_data(DataFrame::text(&text));
        }

        let mut delivered = 0;
        while let Some(frame) = mailbox.next_frame() {
            prop_assert_eq!(frame.generation, 7);
            delivered += 1;
        }
        prop_assert_eq!(delivered, burst.min(capacity));
        prop_assert_eq!(mailbox.dropped_frames(), burst.saturating_sub(capacity) as u64);
    }
}
