// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════
mod schema_tests {
    use crate::error::RecordError;
    use crate::schema::{FieldTable, derive_field_number};
    use crate::types::*;
    use crate::value::{Mapping, Value, ViewValue};
    use crate::view::{ViewDef, decode_view, encode_view, parse_views};
    use smol_str::SmolStr;

    const FD_TEXT: &str = "\
$ test fields
*base 1000
T_SHORT_FLD   1  short   - short field
T_LONG_FLD    2  long    -
# comment line
T_STRING_FLD  5  string  -
*base 2000
T_PTR_FLD     1  ptr     -
";

    const VIEW_TEXT: &str = "\
VIEW MYVIEW1
#type  cname    fbname count flag size null
short  tshort1  -      2     -    -    -
long   tlong1   -      1     -    -    -
string tstring1 -      3     -    8    -
carray tcarr1   -      1     -    4    -
END
";

    fn view_table() -> FieldTable {
        FieldTable::builder()
            .field("T_VIEW_FLD", FieldType::View)
            .load_views(VIEW_TEXT)
            .unwrap()
            .build()
            .unwrap()
    }

    fn view_value(pairs: &[(&str, Vec<Value>)]) -> ViewValue {
        let mut data = Mapping::new();
        for (k, v) in pairs {
            data.insert(SmolStr::from(*k), v.clone());
        }
        ViewValue::new("MYVIEW1", data)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Field definitions
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_parse_fd_base_offsets() {
        let table = FieldTable::parse_fd(FD_TEXT).unwrap();
        assert_eq!(table.len(), 4);
        let id = table.resolve_field_id("T_LONG_FLD").unwrap();
        assert_eq!(id.number(), 1002);
        assert_eq!(id.field_type(), FieldType::Long);
        let ptr = table.resolve_field_id("T_PTR_FLD").unwrap();
        assert_eq!(ptr.number(), 2001);
        assert_eq!(table.field_name(ptr), Some("T_PTR_FLD"));
    }

    #[test]
    fn test_parse_fd_errors_carry_line() {
        let err = FieldTable::parse_fd("A 1 short\nB x long\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { line: 2, .. }));
        let err = FieldTable::parse_fd("A 1 quad\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { line: 1, .. }));
        let err = FieldTable::parse_fd("*nope 3\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { line: 1, .. }));
    }

    #[test]
    fn test_parse_fd_base_overflow() {
        let err = FieldTable::parse_fd("*base 4294967295\nX 1 long\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { line: 2, .. }));
        // Base plus zero stays in u32; the id range check rejects it later.
        let err = FieldTable::parse_fd("*base 4294967295\nX 0 long\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { line: 2, .. }));
    }

    #[test]
    fn test_duplicate_number_rejected() {
        let err = FieldTable::parse_fd("A 1 short\nB 1 short\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { line: 2, .. }));
        // Same number under another type is a different id.
        assert!(FieldTable::parse_fd("A 1 short\nB 1 long\n").is_ok());
    }

    #[test]
    fn test_derived_numbers_stable() {
        let a = derive_field_number("T_NAME_FLD");
        assert_eq!(a, derive_field_number("T_NAME_FLD"));
        assert!(a >= 1 && a <= MAX_FIELD_NUMBER);
        let table = FieldTable::builder()
            .field("T_NAME_FLD", FieldType::String)
            .build()
            .unwrap();
        assert_eq!(table.resolve_field_id("T_NAME_FLD").unwrap().number(), a);
    }

    #[test]
    fn test_unknown_name_not_resolvable() {
        let table = FieldTable::parse_fd(FD_TEXT).unwrap();
        assert!(matches!(
            table.resolve_field_id("NOPE"),
            Err(RecordError::KeyNotResolvable(name)) if name == "NOPE"
        ));
    }

    #[test]
    fn test_compiled_id_text_resolves() {
        let table = FieldTable::default();
        let id = FieldId::new(FieldType::Double, 77).unwrap();
        assert_eq!(table.resolve_field_id(&id.to_string()).unwrap(), id);
        assert_eq!(table.key_for(id), FieldKey::Id(id));
        assert_eq!(table.display_name(id), id.to_string());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // View definitions
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_parse_views() {
        let views = parse_views(VIEW_TEXT).unwrap();
        assert_eq!(views.len(), 1);
        let v = &views[0];
        assert_eq!(v.name.as_str(), "MYVIEW1");
        assert_eq!(v.fields.len(), 4);
        assert_eq!(v.field("tstring1").unwrap().size, 8);
        assert_eq!(v.field("tshort1").unwrap().count, 2);
        // 4 members * u16 + 2*2 + 8 + 3*8 + (2+4)
        assert_eq!(v.layout_size(), 8 + 4 + 8 + 24 + 6);
    }

    #[test]
    fn test_parse_views_unclosed() {
        let err = parse_views("VIEW V\nshort a - 1 - - -\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { .. }));
        let err = parse_views("END\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { line: 1, .. }));
    }

    #[test]
    fn test_parse_views_rejects_oversized_slots() {
        let err = parse_views("VIEW V\ncarray c - 1 - 70000 -\nEND\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { line: 2, .. }));
        let err = parse_views("VIEW V\nshort s - 70000 - - -\nEND\n").unwrap_err();
        assert!(matches!(err, RecordError::Schema { line: 2, .. }));
        let views = parse_views("VIEW V\ncarray c - 1 - 65535 -\nEND\n").unwrap();
        assert_eq!(views[0].field("c").unwrap().size, 65535);
    }

    #[test]
    fn test_view_builder_matches_text() {
        let built = ViewDef::new("MYVIEW1")
            .unwrap()
            .member("tshort1", FieldType::Short, 2, 0)
            .member("tlong1", FieldType::Long, 1, 0)
            .member("tstring1", FieldType::String, 3, 8)
            .member("tcarr1", FieldType::Carray, 1, 4);
        assert_eq!(parse_views(VIEW_TEXT).unwrap()[0], built);
    }

    #[test]
    fn test_view_encode_decode() {
        let table = view_table();
        let view = view_value(&[
            ("tshort1", vec![Value::Int(5), Value::Int(-6)]),
            ("tstring1", vec![Value::from("abc")]),
            ("tcarr1", vec![Value::Bytes(vec![0, 1])]),
        ]);
        let bytes = encode_view(&table, "T_VIEW_FLD", &view).unwrap();
        let decoded = decode_view(&table, &bytes).unwrap();
        assert_eq!(decoded, view);
        assert!(decoded.data.get("tlong1").is_none());
    }

    #[test]
    fn test_view_null_roundtrip() {
        let table = view_table();
        let bytes = encode_view(&table, "T_VIEW_FLD", &ViewValue::default()).unwrap();
        assert_eq!(bytes.len(), crate::view::VIEW_NAME_SIZE);
        assert!(decode_view(&table, &bytes).unwrap().is_null());
    }

    #[test]
    fn test_view_overflow_is_no_space() {
        let table = view_table();
        let too_many = view_value(&[(
            "tshort1",
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        )]);
        assert!(matches!(
            encode_view(&table, "T_VIEW_FLD", &too_many),
            Err(RecordError::NoSpace(_))
        ));
        // Strings need room for the terminator.
        let too_long = view_value(&[("tstring1", vec![Value::from("12345678")])]);
        assert!(matches!(
            encode_view(&table, "T_VIEW_FLD", &too_long),
            Err(RecordError::NoSpace(_))
        ));
        let fits = view_value(&[("tstring1", vec![Value::from("1234567")])]);
        assert!(encode_view(&table, "T_VIEW_FLD", &fits).is_ok());
        let carray = view_value(&[("tcarr1", vec![Value::Bytes(vec![1; 5])])]);
        assert!(matches!(
            encode_view(&table, "T_VIEW_FLD", &carray),
            Err(RecordError::NoSpace(_))
        ));
    }

    #[test]
    fn test_view_unknown_names() {
        let table = view_table();
        let unknown_view = ViewValue::new("NOVIEW", Mapping::new());
        assert!(matches!(
            encode_view(&table, "T_VIEW_FLD", &unknown_view),
            Err(RecordError::KeyNotResolvable(_))
        ));
        let unknown_member = view_value(&[("nope", vec![Value::Int(1)])]);
        assert!(matches!(
            encode_view(&table, "T_VIEW_FLD", &unknown_member),
            Err(RecordError::KeyNotResolvable(_))
        ));
    }

    #[test]
    fn test_view_member_conversion() {
        let table = view_table();
        let bad = view_value(&[("tshort1", vec![Value::from("xyz")])]);
        assert!(matches!(
            encode_view(&table, "T_VIEW_FLD", &bad),
            Err(RecordError::TypeConversion { .. })
        ));
        let out_of_range = view_value(&[("tshort1", vec![Value::Int(70_000)])]);
        assert!(matches!(
            encode_view(&table, "T_VIEW_FLD", &out_of_range),
            Err(RecordError::TypeConversion { .. })
        ));
    }

    #[test]
    fn test_view_carray_beyond_u16_is_no_space() {
        let def = ViewDef::new("WIDE")
            .unwrap()
            .member("blob", FieldType::Carray, 1, 70_000);
        let table = FieldTable::builder()
            .field("T_VIEW_FLD", FieldType::View)
            .view(def)
            .build()
            .unwrap();
        let mut data = Mapping::new();
        data.insert(SmolStr::from("blob"), vec![Value::Bytes(vec![7; 70_000])]);
        assert!(matches!(
            encode_view(&table, "T_VIEW_FLD", &ViewValue::new("WIDE", data.clone())),
            Err(RecordError::NoSpace(_))
        ));

        data.insert(SmolStr::from("blob"), vec![Value::Bytes(vec![7; 65_535])]);
        let view = ViewValue::new("WIDE", data);
        let bytes = encode_view(&table, "T_VIEW_FLD", &view).unwrap();
        assert_eq!(decode_view(&table, &bytes).unwrap(), view);
    }

    #[test]
    fn test_view_float_member_out_of_range() {
        let def = ViewDef::new("FLOATS")
            .unwrap()
            .member("f", FieldType::Float, 1, 0);
        let table = FieldTable::builder()
            .field("T_VIEW_FLD", FieldType::View)
            .view(def)
            .build()
            .unwrap();
        let mut data = Mapping::new();
        data.insert(SmolStr::from("f"), vec![Value::Float(1e300)]);
        assert!(matches!(
            encode_view(&table, "T_VIEW_FLD", &ViewValue::new("FLOATS", data.clone())),
            Err(RecordError::TypeConversion { .. })
        ));

        data.insert(SmolStr::from("f"), vec![Value::Float(f64::INFINITY)]);
        let bytes = encode_view(&table, "T_VIEW_FLD", &ViewValue::new("FLOATS", data)).unwrap();
        let decoded = decode_view(&table, &bytes).unwrap();
        assert_eq!(decoded.data["f"], vec![Value::Float(f64::INFINITY)]);
    }
}
