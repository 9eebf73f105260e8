use serde::Deserialize;

use super::{
    default_field, field, is_blank, newest_first, parse_date, require, set, today,
    Clinic, ClinicError, ClinicResult, Session, DONE,
};
use crate::entities::{ORDER, TRANSACTION};
use crate::ids::generate_id;
use crate::mapping::Record;

pub(super) const PAID: &str = "Đã thanh toán";
pub(super) const UNPAID: &str = "Chưa thanh toán";
/// Older rows only recorded payment as a note.
const PAID_NOTE_MARKER: &str = "Đã Thanh Toán";
pub(super) const INCOME: &str = "Thu";
pub(super) const CASH: &str = "Tiền mặt";

/// Filters for the ledger listing. Dates are inclusive `YYYY-MM-DD` bounds.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub customer_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl TransactionFilter {
    fn matches(&self, tx: &Record) -> bool {
        let day = parse_date(field(tx, "ngayGiaoDich"));
        let after_start = match self.start_date.as_deref().and_then(parse_date) {
            Some(start) => day.is_some_and(|d| d >= start),
            None => true,
        };
        let before_end = match self.end_date.as_deref().and_then(parse_date) {
            Some(end) => day.is_some_and(|d| d <= end),
            None => true,
        };
        let customer = self
            .customer_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .is_none_or(|c| field(tx, "maKhachHang") == c);
        let kind = self
            .kind
            .as_deref()
            .filter(|k| !k.is_empty())
            .is_none_or(|k| field(tx, "loaiGiaoDich") == k);
        after_start && before_end && customer && kind
    }
}

/// Fill an empty payment status from the legacy note marker.
pub(super) fn fill_payment_status(row: &mut Record) {
    if is_blank(row, "trangThaiThanhToan") {
        let status = if field(row, "ghiChu").contains(PAID_NOTE_MARKER) {
            PAID
        } else {
            UNPAID
        };
        set(row, "trangThaiThanhToan", status);
    }
}

/// One income entry in the ledger.
pub(super) struct LedgerEntry<'a> {
    pub reference: &'a str,
    pub customer_id: &'a str,
    pub customer_name: &'a str,
    pub amount: String,
    pub method: &'a str,
    pub date: String,
    pub note: String,
    pub handled_by: &'a str,
}

impl Clinic {
    /// Append an income transaction; the caller's write already happened.
    pub(super) async fn record_income(&self, entry: LedgerEntry<'_>) -> ClinicResult<Record> {
        let mut tx = Record::new();
        set(&mut tx, "maGiaoDich", generate_id(TRANSACTION.id_prefix));
        set(&mut tx, "loaiGiaoDich", INCOME);
        set(&mut tx, "maThamChieu", entry.reference);
        set(&mut tx, "maKhachHang", entry.customer_id);
        set(&mut tx, "tenKhachHang", entry.customer_name);
        set(&mut tx, "soTien", entry.amount);
        set(&mut tx, "phuongThuc", entry.method);
        set(&mut tx, "ngayGiaoDich", entry.date);
        set(&mut tx, "noiDung", entry.note);
        set(&mut tx, "trangThai", DONE);
        set(&mut tx, "nhanVienXuLy", entry.handled_by);

        self.insert(&TRANSACTION, &tx).await?;
        tracing::info!(
            target: "store",
            "ledger: {} {} for {}",
            field(&tx, "soTien"),
            INCOME,
            entry.reference
        );
        Ok(tx)
    }

    /* ---- orders ---- */

    pub async fn list_orders(&self) -> ClinicResult<Vec<Record>> {
        let mut orders = self.list(&ORDER).await?;
        orders.iter_mut().for_each(fill_payment_status);
        Ok(orders)
    }

    pub async fn create_order(&self, session: &Session, mut data: Record) -> ClinicResult<Record> {
        require(&data, &["maKhachHang", "danhSachSanPham"], "Thiếu thông tin đơn hàng")?;

        default_field(&mut data, "maDonHang", generate_id(ORDER.id_prefix));
        default_field(&mut data, "ngayTao", today());
        default_field(&mut data, "nhanVienTao", session.name.as_str());
        default_field(&mut data, "trangThaiThanhToan", UNPAID);

        self.insert(&ORDER, &data).await?;

        if field(&data, "trangThaiThanhToan") == PAID {
            self.record_income(LedgerEntry {
                reference: field(&data, "maDonHang"),
                customer_id: field(&data, "maKhachHang"),
                customer_name: field(&data, "tenKhachHang"),
                amount: field(&data, "thanhTien").to_string(),
                method: field(&data, "phuongThucThanhToan"),
                date: field(&data, "ngayTao").to_string(),
                note: format!("Thanh toán đơn hàng {}", field(&data, "maDonHang")),
                handled_by: field(&data, "nhanVienTao"),
            })
            .await?;
        }
        Ok(data)
    }

    /// Partial update; moving an order from unpaid to paid books the income.
    pub async fn update_order(
        &self,
        session: &Session,
        id: &str,
        updates: Record,
    ) -> ClinicResult<Record> {
        let current = self.fetch(&ORDER, id, "Không tìm thấy đơn hàng").await?;

        let becomes_paid =
            field(&current, "trangThaiThanhToan") != PAID && field(&updates, "trangThaiThanhToan") == PAID;

        if !self.patch(&ORDER, id, updates.clone()).await? {
            return Err(ClinicError::NotFound("Không tìm thấy đơn hàng".into()));
        }

        if becomes_paid {
            let pick = |key: &str| -> String {
                if is_blank(&updates, key) {
                    field(&current, key).to_string()
                } else {
                    field(&updates, key).to_string()
                }
            };
            let method = pick("phuongThucThanhToan");
            self.record_income(LedgerEntry {
                reference: id,
                customer_id: field(&current, "maKhachHang"),
                customer_name: field(&current, "tenKhachHang"),
                amount: pick("thanhTien"),
                method: &method,
                date: today(),
                note: format!("Thanh toán đơn hàng {id}"),
                handled_by: &session.name,
            })
            .await?;
        }

        let mut order = self.fetch(&ORDER, id, "Không tìm thấy đơn hàng").await?;
        fill_payment_status(&mut order);
        Ok(order)
    }

    /* ---- transactions ---- */

    pub async fn list_transactions(&self, filter: &TransactionFilter) -> ClinicResult<Vec<Record>> {
        let mut txs: Vec<Record> = self
            .list(&TRANSACTION)
            .await?
            .into_iter()
            .filter(|tx| filter.matches(tx))
            .collect();
        txs.sort_by(|a, b| newest_first(field(a, "ngayGiaoDich"), field(b, "ngayGiaoDich")));
        Ok(txs)
    }

    pub async fn create_transaction(&self, session: &Session, mut data: Record) -> ClinicResult<Record> {
        require(&data, &["soTien", "loaiGiaoDich"], "Thiếu thông tin giao dịch")?;

        default_field(&mut data, "maGiaoDich", generate_id(TRANSACTION.id_prefix));
        default_field(&mut data, "ngayGiaoDich", today());
        default_field(&mut data, "trangThai", DONE);
        set(&mut data, "nhanVienXuLy", session.name.as_str());

        self.insert(&TRANSACTION, &data).await?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{admin, clinic, staff};
    use super::super::record;
    use super::*;

    fn order(id: &str, status: &str) -> Record {
        record([
            ("maDonHang", id),
            ("maKhachHang", "KH0001"),
            ("tenKhachHang", "Nguyễn Văn A"),
            ("danhSachSanPham", "Cao dán x2"),
            ("thanhTien", "300000"),
            ("phuongThucThanhToan", "Chuyển khoản"),
            ("trangThaiThanhToan", status),
        ])
    }

    #[test]
    fn legacy_note_marks_orders_paid() {
        let mut a = record([("ghiChu", "Khách Đã Thanh Toán đủ")]);
        let mut b = record([("ghiChu", "")]);
        let mut c = record([("trangThaiThanhToan", "Đã cọc")]);
        fill_payment_status(&mut a);
        fill_payment_status(&mut b);
        fill_payment_status(&mut c);
        assert_eq!(field(&a, "trangThaiThanhToan"), PAID);
        assert_eq!(field(&b, "trangThaiThanhToan"), UNPAID);
        assert_eq!(field(&c, "trangThaiThanhToan"), "Đã cọc");
    }

    #[tokio::test]
    async fn unpaid_order_books_nothing() {
        let (_mem, clinic) = clinic();
        let mut data = order("", "");
        data.remove("maDonHang");
        let created = clinic.create_order(&staff(), data).await.unwrap();

        assert!(field(&created, "maDonHang").starts_with("DH"));
        assert_eq!(field(&created, "trangThaiThanhToan"), UNPAID);
        assert_eq!(field(&created, "nhanVienTao"), "Lan");
        assert!(clinic
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn paid_order_books_income() {
        let (_mem, clinic) = clinic();
        clinic.create_order(&staff(), order("DH1", PAID)).await.unwrap();

        let txs = clinic
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        let tx = &txs[0];
        assert_eq!(field(tx, "loaiGiaoDich"), INCOME);
        assert_eq!(field(tx, "maThamChieu"), "DH1");
        assert_eq!(field(tx, "soTien"), "300000");
        assert_eq!(field(tx, "phuongThuc"), "Chuyển khoản");
        assert_eq!(field(tx, "noiDung"), "Thanh toán đơn hàng DH1");
        assert_eq!(field(tx, "trangThai"), DONE);
        assert_eq!(field(tx, "nhanVienXuLy"), "Lan");
    }

    #[tokio::test]
    async fn paying_an_order_later_books_income_once() {
        let (_mem, clinic) = clinic();
        clinic.create_order(&staff(), order("DH1", UNPAID)).await.unwrap();

        let paid = clinic
            .update_order(&admin(), "DH1", record([("trangThaiThanhToan", PAID), ("thanhTien", "280000")]))
            .await
            .unwrap();
        assert_eq!(field(&paid, "trangThaiThanhToan"), PAID);

        clinic
            .update_order(&admin(), "DH1", record([("trangThaiThanhToan", PAID)]))
            .await
            .unwrap();

        let txs = clinic
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(field(&txs[0], "soTien"), "280000");
        assert_eq!(field(&txs[0], "ngayGiaoDich"), today());
        assert_eq!(field(&txs[0], "nhanVienXuLy"), "Bác sĩ Lực");
    }

    #[tokio::test]
    async fn order_validation_and_missing_rows() {
        let (_mem, clinic) = clinic();
        assert!(matches!(
            clinic.create_order(&staff(), record([("maKhachHang", "KH1")])).await,
            Err(ClinicError::BadRequest(_))
        ));
        assert!(matches!(
            clinic.update_order(&staff(), "DH404", record([("ghiChu", "x")])).await,
            Err(ClinicError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn transactions_filter_and_sort() {
        let (_mem, clinic) = clinic();
        for (date, customer, kind) in [
            ("2024-01-05", "KH1", "Thu"),
            ("2024-02-10", "KH2", "Thu"),
            ("2024-03-01", "KH1", "Chi"),
            ("không rõ", "KH1", "Thu"),
        ] {
            clinic
                .create_transaction(
                    &staff(),
                    record([
                        ("soTien", "1000"),
                        ("loaiGiaoDich", kind),
                        ("maKhachHang", customer),
                        ("ngayGiaoDich", date),
                    ]),
                )
                .await
                .unwrap();
        }

        let all = clinic
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        let dates: Vec<_> = all.iter().map(|t| field(t, "ngayGiaoDich")).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-02-10", "2024-01-05", "không rõ"]);

        let window = TransactionFilter {
            start_date: Some("2024-01-05".into()),
            end_date: Some("2024-02-10".into()),
            ..Default::default()
        };
        assert_eq!(clinic.list_transactions(&window).await.unwrap().len(), 2);

        let kh1_income = TransactionFilter {
            customer_id: Some("KH1".into()),
            kind: Some("Thu".into()),
            ..Default::default()
        };
        let rows = clinic.list_transactions(&kh1_income).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|t| field(t, "nhanVienXuLy") == "Lan"));
    }

    #[tokio::test]
    async fn transactions_need_amount_and_type() {
        let (_mem, clinic) = clinic();
        assert!(matches!(
            clinic.create_transaction(&staff(), record([("soTien", "1")])).await,
            Err(ClinicError::BadRequest(_))
        ));
        let tx = clinic
            .create_transaction(&staff(), record([("soTien", "1"), ("loaiGiaoDich", "Chi")]))
            .await
            .unwrap();
        assert!(field(&tx, "maGiaoDich").starts_with("GD"));
        assert_eq!(field(&tx, "trangThai"), DONE);
        assert_eq!(field(&tx, "ngayGiaoDich"), today());
    }
}
