// tests/property/slot_test.rs

//! Property-based tests for hash slot routing

use keyscope::core::cluster::{NUM_SLOTS, get_slot};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_slot_is_in_range(key in prop::collection::vec(any::<u8>(), 0..64)) {
        prop_assert!((get_slot(&key) as usize) < NUM_SLOTS);
    }

    #[test]
    fn test_hash_tag_pins_the_slot(
        tag in "[a-z0-9]{1,12}",
        left in "[a-z0-9:]{0,12}",
        right in "[a-z0-9:]{0,12}"
    ) {
        let key = format!("{left}{{{tag}}}{right}");
        prop_assert_eq!(get_slot(key.as_bytes()), get_slot(tag.as_bytes()));
    }
}
