//! Property tests for canonical chunk-stream ordering.
//!
//! Whatever the backend emits, the translated stream must hold: exactly
//! one `Start` at sequence 0, contiguous sequence numbers, exactly one
//! terminal chunk last, and delta concatenation equal to the final
//! assembled message.

use prism::error::GatewayError;
use prism::ir::StreamChunk;
use prism::stream::{BackendEvent, StreamOptions, StreamTranslator};
use prism::ir::FinishReason;
use proptest::prelude::*;

fn arb_mid_event() -> impl Strategy<Value = BackendEvent> {
    prop_oneof![
        ".{0,12}".prop_map(BackendEvent::Delta),
        any::<bool>().prop_map(|named| BackendEvent::Start {
            model: named.then(|| "m".to_string()),
        }),
        ".{0,8}".prop_map(|args| BackendEvent::ToolCallDelta {
            id: None,
            name: None,
            arguments: args,
        }),
    ]
}

fn arb_terminal_event() -> impl Strategy<Value = BackendEvent> {
    // BackendEvent is not Clone, so build each value inside prop_map.
    any::<bool>().prop_map(|ok| {
        if ok {
            BackendEvent::Done { finish_reason: FinishReason::Stop, usage: None }
        } else {
            BackendEvent::TransportError(GatewayError::network("CONNECT", "reset"))
        }
    })
}

fn assert_invariants(chunks: &[StreamChunk]) {
    assert!(
        matches!(chunks.first(), Some(StreamChunk::Start { .. })),
        "first chunk must be Start, got {:?}",
        chunks.first()
    );
    let starts = chunks
        .iter()
        .filter(|c| matches!(c, StreamChunk::Start { .. }))
        .count();
    assert_eq!(starts, 1, "exactly one Start");

    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence(), i as u64, "sequences must be contiguous");
    }

    let terminals = chunks.iter().filter(|c| c.is_terminal()).count();
    assert_eq!(terminals, 1, "exactly one terminal chunk");
    assert!(chunks.last().map(StreamChunk::is_terminal).unwrap_or(false));
}

proptest! {
    #[test]
    fn translated_streams_always_satisfy_ordering_invariants(
        mid in proptest::collection::vec(arb_mid_event(), 0..24),
        terminal in arb_terminal_event(),
        trailing in proptest::collection::vec(arb_mid_event(), 0..6),
    ) {
        let mut translator = StreamTranslator::new("req-1", StreamOptions::default());
        let mut chunks = Vec::new();
        for event in mid {
            chunks.extend(translator.translate(event));
        }
        chunks.extend(translator.translate(terminal));
        // Anything after the terminal event must be swallowed.
        for event in trailing {
            prop_assert!(translator.translate(event).is_empty());
        }
        assert_invariants(&chunks);
    }

    #[test]
    fn delta_concatenation_matches_assembled_message(
        deltas in proptest::collection::vec(".{0,12}", 0..24),
    ) {
        let mut translator = StreamTranslator::new("req-1", StreamOptions::default());
        let mut chunks = Vec::new();
        for delta in &deltas {
            chunks.extend(translator.translate(BackendEvent::Delta(delta.clone())));
        }
        chunks.extend(translator.translate(BackendEvent::Done {
            finish_reason: FinishReason::Stop,
            usage: None,
        }));

        let streamed: String = chunks
            .iter()
            .filter_map(|c| match c {
                StreamChunk::Content { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(&streamed, &deltas.concat());

        match chunks.last().expect("terminal chunk") {
            StreamChunk::Done { message, .. } => {
                prop_assert_eq!(message.text_content(), deltas.concat());
            }
            other => prop_assert!(false, "expected Done, got {:?}", other),
        }
    }

    #[test]
    fn accumulated_mode_prefixes_are_monotone(
        deltas in proptest::collection::vec(".{1,8}", 1..12),
    ) {
        let mut translator = StreamTranslator::new(
            "req-1",
            StreamOptions { mode: prism::stream::StreamMode::Accumulated, include_both: false },
        );
        let mut last = String::new();
        for delta in &deltas {
            for chunk in translator.translate(BackendEvent::Delta(delta.clone())) {
                if let StreamChunk::Content { accumulated: Some(acc), .. } = chunk {
                    prop_assert!(acc.starts_with(&last), "accumulated text must grow by suffix");
                    last = acc;
                }
            }
        }
        prop_assert_eq!(last, deltas.concat());
    }
}
