use std::collections::BTreeMap;

/// A flat entity record: canonical field key -> cell text.
pub type Record = BTreeMap<String, String>;

/// Ordered association between sheet headers and canonical field keys.
///
/// Column order in `columns` is the physical column order of the sheet. The
/// header row written on first append is derived from it.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub columns: &'static [(&'static str, &'static str)],
    /// Canonical key that gets phone-number normalization on read.
    pub phone_field: Option<&'static str>,
}

impl FieldMapping {
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|(h, _)| (*h).to_string()).collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(_, k)| *k)
    }

    pub fn field_for_header(&self, header: &str) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(h, _)| *h == header)
            .map(|(_, k)| *k)
    }

    pub fn header_for_field(&self, field: &str) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(_, k)| *k == field)
            .map(|(h, _)| *h)
    }

    /// Column index of `field` according to the sheet's actual header row.
    pub fn column_of(&self, headers: &[String], field: &str) -> Option<usize> {
        let header = self.header_for_field(field)?;
        headers.iter().position(|h| h == header)
    }

    /// Map one stored row through the sheet's header row.
    ///
    /// Mapped keys whose header is missing from the sheet come back as `""`.
    pub fn row_to_record(&self, headers: &[String], row: &[String]) -> Record {
        let mut out: Record = self.keys().map(|k| (k.to_string(), String::new())).collect();

        for (idx, header) in headers.iter().enumerate() {
            let Some(field) = self.field_for_header(header) else {
                continue;
            };
            let mut value = row.get(idx).cloned().unwrap_or_default();
            if self.phone_field == Some(field) && !value.is_empty() {
                value = normalize_phone(&value);
            }
            out.insert(field.to_string(), value);
        }

        out
    }

    /// Positional row in mapping order; missing fields become `""`.
    pub fn record_to_row(&self, record: &Record) -> Vec<String> {
        self.keys()
            .map(|k| record.get(k).cloned().unwrap_or_default())
            .collect()
    }
}

/// Normalize a Vietnamese phone number as stored in the sheet.
///
/// Spreadsheets eat leading zeros and people type the `84` country code, so
/// `84912345678` and `912345678` both read back as `0912345678`.
pub fn normalize_phone(raw: &str) -> String {
    let value: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    if value.starts_with("84") && value.chars().count() == 11 {
        format!("0{}", &value[2..])
    } else if value.chars().count() == 9 && !value.starts_with('0') {
        format!("0{value}")
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: FieldMapping = FieldMapping {
        columns: &[
            ("Mã KH", "maKhachHang"),
            ("Họ và tên ", "hoVaTen"),
            ("Số điện thoại", "soDienThoai"),
            ("Ghi chú", "ghiChu"),
        ],
        phone_field: Some("soDienThoai"),
    };

    fn rec(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn phone_country_code_is_replaced() {
        assert_eq!(normalize_phone("84912345678"), "0912345678");
        assert_eq!(normalize_phone("84 912 345 678"), "0912345678");
    }

    #[test]
    fn phone_missing_leading_zero_is_restored() {
        assert_eq!(normalize_phone("912345678"), "0912345678");
        assert_eq!(normalize_phone("0912345678"), "0912345678");
    }

    #[test]
    fn phone_other_shapes_are_only_stripped() {
        assert_eq!(normalize_phone(" 028 3822 1234 "), "02838221234");
        assert_eq!(normalize_phone("8412"), "8412");
    }

    #[test]
    fn row_maps_through_header_row_not_mapping_order() {
        let headers = vec![
            "Số điện thoại".to_string(),
            "Mã KH".to_string(),
            "Cột lạ".to_string(),
        ];
        let row = vec!["912345678".to_string(), "KH01".to_string(), "x".to_string()];

        let record = SAMPLE.row_to_record(&headers, &row);

        assert_eq!(record["maKhachHang"], "KH01");
        assert_eq!(record["soDienThoai"], "0912345678");
        assert_eq!(record["hoVaTen"], "");
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn short_rows_pad_with_empty_strings() {
        let record = SAMPLE.row_to_record(&SAMPLE.headers(), &["KH01".to_string()]);
        assert_eq!(record["maKhachHang"], "KH01");
        assert_eq!(record["ghiChu"], "");
    }

    #[test]
    fn record_to_row_follows_mapping_order_and_ignores_unknown_keys() {
        let row = SAMPLE.record_to_row(&rec(&[
            ("ghiChu", "note"),
            ("maKhachHang", "KH01"),
            ("unknown", "dropped"),
        ]));
        assert_eq!(row, vec!["KH01", "", "", "note"]);
    }

    #[test]
    fn column_lookup_uses_actual_headers() {
        let headers = vec!["Ghi chú".to_string(), "Mã KH".to_string()];
        assert_eq!(SAMPLE.column_of(&headers, "maKhachHang"), Some(1));
        assert_eq!(SAMPLE.column_of(&headers, "hoVaTen"), None);
        assert_eq!(SAMPLE.column_of(&headers, "nope"), None);
    }

    proptest! {
        #[test]
        fn record_survives_row_round_trip(
            id in "[A-Z0-9]{1,8}",
            name in "[a-zA-Z ]{0,20}",
            note in "\\PC{0,30}",
        ) {
            let original = rec(&[
                ("maKhachHang", &id),
                ("hoVaTen", &name),
                ("soDienThoai", ""),
                ("ghiChu", &note),
            ]);
            let row = SAMPLE.record_to_row(&original);
            let back = SAMPLE.row_to_record(&SAMPLE.headers(), &row);
            prop_assert_eq!(back, original);
        }

        #[test]
        fn phone_normalization_is_idempotent(raw in "[0-9 ]{0,14}") {
            let once = normalize_phone(&raw);
            prop_assert_eq!(normalize_phone(&once), once.clone());
        }
    }
}
