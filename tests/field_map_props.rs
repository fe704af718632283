//! Property-based tests for the FieldMap adapter.
//!
//! Each property drives the public API with generated field contents and
//! checks it against a plain `Vec` model of the occurrence list.

use proptest::prelude::*;
use std::rc::Rc;

use record_map::{
    BufferPool, FieldMap, FieldTable, FieldType, MapConfig, Mapping, RecordError, SetMode, Value,
};
use smol_str::SmolStr;

fn pool() -> Rc<BufferPool> {
    let table = FieldTable::builder()
        .field_numbered("A", 1, FieldType::Long)
        .field_numbered("B", 2, FieldType::String)
        .field_numbered("D", 3, FieldType::Double)
        .field_numbered("S", 4, FieldType::Short)
        .build()
        .unwrap();
    BufferPool::new(table)
}

fn ints(items: &[i64]) -> Vec<Value> {
    items.iter().map(|i| Value::Int(*i)).collect()
}

fn strs(items: &[String]) -> Vec<Value> {
    items.iter().map(|s| Value::from(s.as_str())).collect()
}

fn filled(pool: &Rc<BufferPool>, a: &[i64], b: &[String]) -> FieldMap<'static> {
    let mut m = FieldMap::new(pool).unwrap();
    if !a.is_empty() {
        m.set("A", ints(a)).unwrap();
    }
    if !b.is_empty() {
        m.set("B", strs(b)).unwrap();
    }
    m
}

#[derive(Debug, Clone)]
enum SeqOp {
    Append(i64),
    Insert(isize, i64),
    Delete(isize),
    Set(isize, i64),
}

fn seq_op() -> impl Strategy<Value = SeqOp> {
    prop_oneof![
        any::<i64>().prop_map(SeqOp::Append),
        (-6isize..6, any::<i64>()).prop_map(|(i, v)| SeqOp::Insert(i, v)),
        (-6isize..6).prop_map(SeqOp::Delete),
        (-6isize..6, any::<i64>()).prop_map(|(i, v)| SeqOp::Set(i, v)),
    ]
}

/// Index resolution the sequence API promises, applied to the model.
fn resolve(index: isize, len: usize, inclusive: bool) -> Option<usize> {
    let resolved = if index < 0 { index + len as isize } else { index };
    let limit = if inclusive { len as isize } else { len as isize - 1 };
    (resolved >= 0 && resolved <= limit).then_some(resolved as usize)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn delete_removes_field(a in prop::collection::vec(any::<i64>(), 1..8)) {
        let pool = pool();
        let mut m = filled(&pool, &a, &[]);
        m.delete("A").unwrap();
        prop_assert!(!m.contains("A").unwrap());
        prop_assert_eq!(m.get("A").unwrap().len().unwrap(), 0);
        prop_assert!(matches!(m.delete("A"), Err(RecordError::FieldNotPresent(_))));
    }

    #[test]
    fn mapping_roundtrip_preserves_order(
        a in prop::collection::vec(any::<i64>(), 0..6),
        b in prop::collection::vec("[ -~]{0,12}", 0..6),
    ) {
        let pool = pool();
        let m = filled(&pool, &a, &b);
        let mapping = m.to_mapping().unwrap();
        let back = FieldMap::from_mapping(&pool, &mapping, MapConfig::default()).unwrap();
        prop_assert!(back.equals(&m).unwrap());
        prop_assert_eq!(back.to_mapping().unwrap(), mapping);
    }

    #[test]
    fn copy_of_copy_is_equal(
        a in prop::collection::vec(any::<i64>(), 0..6),
        b in prop::collection::vec("[a-z]{0,8}", 0..6),
    ) {
        let pool = pool();
        let m = filled(&pool, &a, &b);
        let c1 = m.copy().unwrap();
        let c2 = c1.copy().unwrap();
        prop_assert_ne!(c1.handle(), c2.handle());
        prop_assert!(c2.equals(&c1).unwrap());
        prop_assert!(c1.equals(&m).unwrap());
        drop((c1, c2));
        prop_assert_eq!(pool.live_count(), 1);
    }

    #[test]
    fn set_modes_match_model(
        initial in prop::collection::vec(any::<i64>(), 0..8),
        update in prop::collection::vec(any::<i64>(), 0..8),
    ) {
        let pool = pool();
        let mut m = filled(&pool, &initial, &[]);
        m.set_with_mode("A", ints(&update), SetMode::Preserve).unwrap();
        let mut expected = update.clone();
        if initial.len() > update.len() {
            expected.extend_from_slice(&initial[update.len()..]);
        }
        prop_assert_eq!(m.get("A").unwrap().to_values().unwrap(), ints(&expected));

        m.set_with_mode("A", ints(&update), SetMode::Truncate).unwrap();
        prop_assert_eq!(m.get("A").unwrap().to_values().unwrap(), ints(&update));
    }

    #[test]
    fn negative_index_mirrors_positive(a in prop::collection::vec(any::<i64>(), 1..10)) {
        let pool = pool();
        let m = filled(&pool, &a, &[]);
        let seq = m.get("A").unwrap();
        let n = a.len() as isize;
        for i in 0..n {
            prop_assert_eq!(seq.get(i - n).unwrap().as_i64(), seq.get(i).unwrap().as_i64());
        }
        prop_assert!(seq.get(n).is_err());
        prop_assert!(seq.get(-n - 1).is_err());
    }

    #[test]
    fn slices_match_model(
        a in prop::collection::vec(any::<i64>(), 0..10),
        start in prop::option::of(-12isize..12),
        stop in prop::option::of(-12isize..12),
        step in 1isize..4,
    ) {
        let pool = pool();
        let m = filled(&pool, &a, &[]);
        let got: Vec<i64> = m
            .get("A")
            .unwrap()
            .slice(start, stop, step)
            .unwrap()
            .iter()
            .filter_map(|v| v.as_i64())
            .collect();

        let n = a.len() as isize;
        let clamp = |b: isize| if b < 0 { (b + n).max(0) } else { b.min(n) };
        let lo = start.map_or(0, clamp);
        let hi = stop.map_or(n, clamp);
        let expected: Vec<i64> = (lo..hi.max(lo))
            .step_by(step as usize)
            .map(|i| a[i as usize])
            .collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn items_occ_counts_every_occurrence(
        a in prop::collection::vec(any::<i64>(), 0..6),
        b in prop::collection::vec("[a-z]{1,4}", 0..6),
    ) {
        let pool = pool();
        let m = filled(&pool, &a, &b);
        let total: usize = m
            .items()
            .map(|item| item.and_then(|(_, seq)| seq.len()))
            .sum::<Result<usize, _>>()
            .unwrap();
        prop_assert_eq!(total, a.len() + b.len());
        prop_assert_eq!(m.items_occ().len().unwrap(), total);
        prop_assert_eq!(m.items_occ().count(), total);
    }

    #[test]
    fn seq_mutations_match_model(
        initial in prop::collection::vec(any::<i64>(), 0..5),
        ops in prop::collection::vec(seq_op(), 0..24),
    ) {
        let pool = pool();
        let mut m = filled(&pool, &initial, &[]);
        let mut model = initial.clone();
        for op in ops {
            let mut seq = m.get_mut("A").unwrap();
            match op {
                SeqOp::Append(v) => {
                    seq.append(v).unwrap();
                    model.push(v);
                }
                SeqOp::Insert(i, v) => match resolve(i, model.len(), true) {
                    Some(at) => {
                        seq.insert(i, v).unwrap();
                        model.insert(at, v);
                    }
                    None => prop_assert!(seq.insert(i, v).is_err()),
                },
                SeqOp::Delete(i) => match resolve(i, model.len(), false) {
                    Some(at) => {
                        seq.delete(i).unwrap();
                        model.remove(at);
                    }
                    None => prop_assert!(seq.delete(i).is_err()),
                },
                SeqOp::Set(i, v) => match resolve(i, model.len(), false) {
                    Some(at) => {
                        seq.set(i, v).unwrap();
                        model[at] = v;
                    }
                    None => prop_assert!(seq.set(i, v).is_err()),
                },
            }
        }
        prop_assert_eq!(m.get("A").unwrap().to_values().unwrap(), ints(&model));
        prop_assert_eq!(m.contains("A").unwrap(), !model.is_empty());
    }

    #[test]
    fn print_extread_roundtrip(
        a in prop::collection::vec(any::<i64>(), 0..5),
        b in prop::collection::vec("[ -~]{0,12}", 0..5),
        s in prop::collection::vec(any::<i16>(), 0..3),
    ) {
        let pool = pool();
        let mut m = filled(&pool, &a, &b);
        if !s.is_empty() {
            m.set("S", s.clone()).unwrap();
        }
        let text = m.print().unwrap();
        let back = FieldMap::extread(&pool, &text, MapConfig::default()).unwrap();
        prop_assert!(back.equals(&m).unwrap());
    }

    #[test]
    fn json_roundtrip(
        a in prop::collection::vec(any::<i64>(), 0..5),
        b in prop::collection::vec("\\PC{0,8}", 0..5),
    ) {
        let pool = pool();
        let m = filled(&pool, &a, &b);
        let back = FieldMap::from_json(&pool, &m.to_json().unwrap(), MapConfig::default()).unwrap();
        prop_assert!(back.equals(&m).unwrap());
    }

    #[test]
    fn cbor_roundtrip_keeps_doubles(
        d in prop::collection::vec(any::<f64>().prop_filter("finite", |f| f.is_finite()), 1..5),
    ) {
        let pool = pool();
        let mut m = FieldMap::new(&pool).unwrap();
        m.set("D", d.clone()).unwrap();
        let back = FieldMap::from_cbor(&pool, &m.to_cbor().unwrap(), MapConfig::default()).unwrap();
        prop_assert!(back.equals(&m).unwrap());
    }

    #[test]
    fn out_of_range_short_leaves_buffer(
        good in prop::collection::vec(any::<i16>(), 1..4),
        bad in (i16::MAX as i64 + 1)..i64::MAX,
    ) {
        let pool = pool();
        let mut m = FieldMap::new(&pool).unwrap();
        m.set("S", good.clone()).unwrap();
        let before = m.copy().unwrap();
        let mut attempt: Vec<Value> = good.iter().map(|v| Value::from(*v)).collect();
        attempt.push(Value::Int(bad));
        let is_conversion_error = matches!(
            m.set("S", attempt),
            Err(RecordError::TypeConversion { .. })
        );
        prop_assert!(is_conversion_error);
        prop_assert!(m.equals(&before).unwrap());
    }
}

#[test]
fn example_mapping_order() {
    let pool = pool();
    let mut expected = Mapping::new();
    expected.insert(SmolStr::from("A"), ints(&[100, 99]));
    expected.insert(
        SmolStr::from("B"),
        vec![Value::from("HELLO"), Value::from("WORLD")],
    );
    let m = FieldMap::from_mapping(&pool, &expected, MapConfig::default()).unwrap();
    assert_eq!(m.to_mapping().unwrap(), expected);
    assert!(m.equals_mapping(&expected).unwrap());

    let flat: Vec<(String, Value)> = m
        .items_occ()
        .map(|item| item.and_then(|(k, v)| Ok((k.to_string(), v.into_value()?))))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        flat,
        vec![
            ("A".to_string(), Value::Int(100)),
            ("A".to_string(), Value::Int(99)),
            ("B".to_string(), Value::from("HELLO")),
            ("B".to_string(), Value::from("WORLD")),
        ]
    );
}
