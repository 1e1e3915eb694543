use proptest::prelude::*;
use strata_core::bitfield::MAX_SUB_DEVICES;
use strata_core::{max_n_bit_value, DeviceBitfield};

proptest! {
    #[test]
    fn all_below_sets_exactly_the_low_bits(count in 0u32..=MAX_SUB_DEVICES) {
        let bitfield = DeviceBitfield::all_below(count);
        prop_assert_eq!(bitfield.count(), count);
        for slot in 0..MAX_SUB_DEVICES {
            prop_assert_eq!(bitfield.is_set(slot), slot < count);
        }
    }

    #[test]
    fn max_n_bit_value_has_n_ones(bits in 0u64..=64) {
        prop_assert_eq!(u64::from(max_n_bit_value(bits).count_ones()), bits);
    }

    #[test]
    fn single_is_contained_in_all_below(slot in 0u32..MAX_SUB_DEVICES) {
        let all = DeviceBitfield::all_below(slot + 1);
        prop_assert_eq!(all.raw() & DeviceBitfield::single(slot).raw(), 1 << slot);
    }
}
