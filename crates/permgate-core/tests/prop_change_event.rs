//! Property tests for rights flags and compaction keys

#![allow(clippy::unwrap_used)]

use permgate_core::{
    has_admin_flag, ChangeEvent, CompactionKey, GroupName, Principal, ResourceRef, Right, UserId,
};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:/.-]{1,24}"
}

fn principal() -> impl Strategy<Value = Principal> {
    prop_oneof![
        segment().prop_map(|s| Principal::User(UserId::parse(s).unwrap())),
        segment().prop_map(|s| Principal::Group(GroupName::parse(s).unwrap())),
    ]
}

proptest! {
    #[test]
    fn admin_flag_matches_char_membership(right in "[a-z]{0,8}") {
        prop_assert_eq!(has_admin_flag(&right), right.chars().any(|c| c == 'a'));
        prop_assert_eq!(Right::new(right.clone()).grants_admin(), has_admin_flag(&right));
    }

    #[test]
    fn keys_equal_iff_coordinates_equal(
        kind_a in segment(), id_a in segment(), who_a in principal(),
        kind_b in segment(), id_b in segment(), who_b in principal(),
    ) {
        let res_a = ResourceRef::parse(kind_a, id_a).unwrap();
        let res_b = ResourceRef::parse(kind_b, id_b).unwrap();
        let key_a = CompactionKey::for_assignment(&res_a, &who_a);
        let key_b = CompactionKey::for_assignment(&res_b, &who_b);
        prop_assert_eq!(key_a == key_b, res_a == res_b && who_a == who_b);
    }

    #[test]
    fn put_survives_wire_decode(kind in segment(), id in segment(), who in principal(), right in "[a-z]{0,6}") {
        let event = ChangeEvent::put(ResourceRef::parse(kind, id).unwrap(), who, Right::new(right));
        let bytes = event.to_json().unwrap();
        prop_assert_eq!(ChangeEvent::from_json(&bytes).unwrap(), event);
    }
}
