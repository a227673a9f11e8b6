// tests/property/pagination_test.rs

//! Property-based tests for paginated enumeration
//! Tests that enough rounds find every key exactly once

use crate::test_helpers::TestContext;
use keyscope::ScanSession;
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32, // Each case runs a full enumeration
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_rounds_find_every_key_once(
        key_count in 0usize..300,
        page_size in 1usize..60,
        shard_count in 1usize..5,
        noise in 0usize..100
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = if shard_count == 1 {
                TestContext::standalone()
            } else {
                TestContext::cluster(shard_count)
            };
            ctx.populate("match:", key_count);
            ctx.populate("other:", noise);

            let session = ScanSession::new("match:*", page_size);
            let mut names = HashSet::new();
            // Per-shard counts are unknown, so keep going until every shard is done.
            for _ in 0..(key_count + noise + 2) {
                let entries = ctx.round(&session).await;
                assert!(entries.len() <= page_size * shard_count);
                for entry in entries {
                    assert!(!entry.is_error(), "{}", entry.name);
                    assert!(entry.name.starts_with("match:"));
                    assert!(names.insert(entry.name.clone()), "{} emitted twice", entry.name);
                }
                if session.cursors().all_drained()
                    && session.cursors().shard_count() == shard_count
                {
                    break;
                }
            }
            assert_eq!(names.len(), key_count);
        });
    }
}
