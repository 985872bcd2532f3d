//! Canonicalization laws.

use proptest::prelude::*;
use serde_json::{Map, Value};

use chrono::{TimeZone, Utc};
use telemetry_server::protocol::{canonical_payload, parse, sign, signature_matches, MetricMessage, SIGNATURE_FIELD};

fn field_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        (-1.0e12f64..1.0e12).prop_map(Value::from),
        "[a-zA-Z0-9/._ \u{e9}\u{4e2d}]{0,16}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ]
}

proptest! {
    #[test]
    fn field_order_does_not_change_the_payload(
        fields in prop::collection::btree_map("[a-z_]{1,8}", field_value(), 1..8),
        seed in any::<u64>(),
        signature in "[0-9a-f]{64}",
    ) {
        let mut entries: Vec<(String, Value)> = fields.into_iter().collect();
        let sorted: Map<String, Value> = entries.iter().cloned().collect();

        // Deterministic shuffle driven by the seed.
        let mut state = seed | 1;
        for i in (1..entries.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            entries.swap(i, (state % (i as u64 + 1)) as usize);
        }
        let mut shuffled: Map<String, Value> = entries.into_iter().collect();
        shuffled.insert(SIGNATURE_FIELD.to_string(), Value::from(signature));

        let expected = canonical_payload(&sorted);
        prop_assert_eq!(&canonical_payload(&shuffled), &expected);
        prop_assert_eq!(sign("secret", &canonical_payload(&shuffled)), sign("secret", &expected));
    }

    #[test]
    fn parsed_payload_ignores_wire_order(value in -1.0e9f64..1.0e9, reverse in any::<bool>()) {
        let mut keys = vec!["type", "uri", "ts", "value", "token", "signature"];
        if reverse {
            keys.reverse();
        }
        let body: Vec<String> = keys
            .iter()
            .map(|k| {
                let v = match *k {
                    "type" => Value::from("metric"),
                    "uri" => Value::from("/agent/alice/cpu"),
                    "ts" => Value::from("2025-01-01T00:00:00Z"),
                    "value" => Value::from(value),
                    "token" => Value::from("T1"),
                    _ => Value::from("sig"),
                };
                format!("{}:{}", Value::from(*k), v)
            })
            .collect();
        let line = format!("{{{}}}", body.join(", "));

        let sub = parse(&line).unwrap();
        let expected_prefix = r#"{"token":"T1","ts":"2025-01-01T00:00:00Z","type":"metric""#;
        prop_assert!(sub.canonical_payload().starts_with(expected_prefix));
        prop_assert!(!sub.canonical_payload().contains(' '));
    }

    #[test]
    fn any_finite_float_verifies_after_parse(
        value in any::<f64>().prop_filter("finite", |v| v.is_finite()),
        secs in 0i64..4_000_000_000,
    ) {
        let ts = Utc.timestamp_opt(secs, 0).unwrap();
        let message = MetricMessage::new("/agent/alice/system.cpu.core0", ts, value, "T1").unwrap();
        let line = message.to_signed_line("s1");

        let sub = parse(line.trim_end()).unwrap();
        prop_assert_eq!(sub.value.as_f64(), Some(value));
        prop_assert!(signature_matches("s1", sub.canonical_payload(), &sub.signature));
    }

    #[test]
    fn percent_like_floats_verify_after_parse(value in 0.0f64..100.0) {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let line = MetricMessage::new("/agent/alice/cpu", ts, value, "T1").unwrap().to_signed_line("s1");

        let sub = parse(line.trim_end()).unwrap();
        prop_assert!(signature_matches("s1", sub.canonical_payload(), &sub.signature));
    }
}
