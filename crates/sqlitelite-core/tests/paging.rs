//! Paging properties of `WindowCursor` over an in-memory source.

use proptest::prelude::*;
use rand::Rng;
use sqlitelite_core::{MemoryRows, Value, WindowCursor};

fn text_rows(n: usize) -> MemoryRows {
    let mut rng = rand::thread_rng();
    let rows = (0..n)
        .map(|i| {
            let len = rng.gen_range(0..40);
            let text: String = (0..len).map(|_| char::from(rng.gen_range(b'a'..=b'z'))).collect();
            vec![Value::Integer(i as i64), Value::Text(format!("{i}:{text}"))]
        })
        .collect();
    MemoryRows::new(vec!["id".to_string(), "label".to_string()], rows)
}

#[test]
fn forward_steps_match_row_count() {
    let mut cursor = WindowCursor::with_window_capacity(text_rows(777), 1024);
    let mut seen = 0usize;
    while cursor.move_to_next().unwrap() {
        assert_eq!(cursor.get_long(0).unwrap(), seen as i64);
        seen += 1;
    }
    assert!(!cursor.move_to_next().unwrap());
    assert_eq!(seen, cursor.get_row_count().unwrap());
}

#[test]
fn backward_scan_sees_every_row() {
    let mut cursor = WindowCursor::with_window_capacity(text_rows(300), 512);
    assert!(cursor.move_to_last().unwrap());
    let mut expected = 299i64;
    loop {
        assert_eq!(cursor.get_long(0).unwrap(), expected);
        let label = cursor.get_text(1).unwrap().unwrap();
        assert!(label.starts_with(&format!("{expected}:")));
        if !cursor.move_to_previous().unwrap() {
            break;
        }
        expected -= 1;
    }
    assert_eq!(expected, 0);
    assert!(cursor.is_before_first().unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_seeks_read_the_right_row(
        capacity in 64usize..2048,
        seeks in proptest::collection::vec(0i64..400, 1..60),
    ) {
        let rows: Vec<Vec<Value>> = (0..400)
            .map(|i| vec![Value::Integer(i), Value::Text("x".repeat((i % 7) as usize))])
            .collect();
        let source = MemoryRows::new(vec!["id".to_string(), "pad".to_string()], rows);
        let mut cursor = WindowCursor::with_window_capacity(source, capacity);

        for &seek in &seeks {
            prop_assert!(cursor.move_to_position(seek).unwrap());
            prop_assert_eq!(cursor.get_long(0).unwrap(), seek);
            let pad = cursor.get_text(1).unwrap().unwrap();
            prop_assert_eq!(pad.len(), (seek % 7) as usize);
        }
        prop_assert_eq!(cursor.get_row_count().unwrap(), 400);
    }
}
