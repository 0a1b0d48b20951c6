//! Property-based tests for the line-protocol grammar invariants: ascending
//! key order, escaping of special characters, and deterministic output
//! across repeated calls.

use metric::Metric;
use proptest::prelude::*;

fn arb_ident() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,12}"
}

proptest! {
    #[test]
    fn serialize_is_deterministic_across_runs(name in arb_ident(), value in any::<i64>()) {
        let metric = Metric::new(name).field("value", value);
        let first = metric.serialize();
        let second = metric.serialize();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn tags_and_fields_always_appear_in_ascending_order(
        a in arb_ident(), b in arb_ident(), c in arb_ident(), d in arb_ident(),
    ) {
        prop_assume!(a != b && c != d);
        let metric = Metric::new("m")
            .tag(b.clone(), "1")
            .tag(a.clone(), "2")
            .field(d.clone(), 1)
            .field(c.clone(), 2);
        let line = metric.serialize().unwrap();

        let mut tags = vec![a, b];
        tags.sort();
        let mut fields = vec![c, d];
        fields.sort();

        let body = line.split(' ').nth(0).unwrap();
        let tag_order: Vec<&str> = body.split(',').skip(1).map(|kv| kv.split('=').next().unwrap()).collect();
        prop_assert_eq!(tag_order, tags);

        let field_part = line.split(' ').nth(1).unwrap();
        let field_order: Vec<&str> = field_part.split(',').map(|kv| kv.split('=').next().unwrap()).collect();
        prop_assert_eq!(field_order, fields);
    }

    #[test]
    fn special_characters_in_tag_values_are_escaped(suffix in "[a-z]{1,5}") {
        let value = format!("a,b c={suffix}");
        let metric = Metric::new("m").tag("t", value).field("v", 1);
        let line = metric.serialize().unwrap();
        prop_assert!(!line.contains("t=a,b"));
        prop_assert!(line.contains("\\,"));
        prop_assert!(line.contains("\\ "));
        prop_assert!(line.contains("\\="));
    }
}
