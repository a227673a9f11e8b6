// tests/property/glob_test.rs

//! Property-based tests for glob pattern matching

use keyscope::core::client::glob::{glob_match, has_wildcard};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_literal_pattern_matches_only_itself(
        pattern in "[a-z0-9:_]{0,20}",
        other in "[a-z0-9:_]{0,20}"
    ) {
        prop_assert!(!has_wildcard(&pattern));
        prop_assert!(glob_match(pattern.as_bytes(), pattern.as_bytes()));
        prop_assert_eq!(glob_match(pattern.as_bytes(), other.as_bytes()), pattern == other);
    }

    #[test]
    fn test_prefix_star_matches_by_prefix(
        prefix in "[a-z:]{0,10}",
        key in "[a-z:0-9]{0,20}"
    ) {
        let pattern = format!("{prefix}*");
        prop_assert!(has_wildcard(&pattern));
        prop_assert_eq!(glob_match(pattern.as_bytes(), key.as_bytes()), key.starts_with(&prefix));
    }

    #[test]
    fn test_question_mark_matches_one_byte(key in "[a-z]{1,20}") {
        let pattern = "?".repeat(key.len());
        prop_assert!(glob_match(pattern.as_bytes(), key.as_bytes()));
        let longer = format!("{pattern}?");
        prop_assert!(!glob_match(longer.as_bytes(), key.as_bytes()));
    }
}
