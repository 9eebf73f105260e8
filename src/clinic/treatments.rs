use serde::{Deserialize, Serialize};

use super::billing::{fill_payment_status, LedgerEntry, CASH};
use super::{
    amount, default_field, field, format_number, is_blank, newest_first, parse_count, require,
    set, today, Clinic, ClinicError, ClinicResult, Session, DONE,
};
use crate::entities::{CANCELLED, TREATMENT_PLAN, TREATMENT_SESSION};
use crate::ids::generate_id;
use crate::mapping::Record;

const IN_PROGRESS: &str = "Đang thực hiện";
const SCHEDULED: &str = "Đã lên lịch";
const CONFIRMED: &str = "Đã xác nhận";
const SESSION_STATUSES: [&str; 4] = [SCHEDULED, CONFIRMED, DONE, CANCELLED];

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
    pub treatment_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentProgress {
    pub completed: i64,
    pub total: i64,
    pub is_complete: bool,
}

/// Plans are numbered `0001`, `0002`, ... unless the caller names them.
/// Only names made entirely of digits take part in the numbering.
fn next_plan_name(plans: &[Record]) -> String {
    let last = plans
        .iter()
        .map(|p| field(p, "tenLieuTrinh").trim())
        .filter(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|name| name.parse::<u128>().ok())
        .max()
        .unwrap_or(0);
    format!("{:04}", last.saturating_add(1))
}

fn count(r: &Record, key: &str) -> i64 {
    parse_count(field(r, key)).unwrap_or(0)
}

impl Clinic {
    pub async fn list_treatment_plans(&self) -> ClinicResult<Vec<Record>> {
        let mut plans = self.list(&TREATMENT_PLAN).await?;
        plans.iter_mut().for_each(fill_payment_status);
        Ok(plans)
    }

    pub async fn create_treatment_plan(&self, session: &Session, mut data: Record) -> ClinicResult<Record> {
        require(&data, &["maKhachHang", "soBuoi"], "Thiếu thông tin liệu trình")?;

        let plans = self.list(&TREATMENT_PLAN).await?;
        set(&mut data, "maLieuTrinh", generate_id(TREATMENT_PLAN.id_prefix));
        default_field(&mut data, "tenLieuTrinh", next_plan_name(&plans));
        default_field(&mut data, "ngayBatDau", today());
        default_field(&mut data, "soBuoiDaThucHien", "0");
        default_field(&mut data, "daThanhToan", "0");
        let total = match field(&data, "tongTien") {
            "" => "0".to_string(),
            t => t.to_string(),
        };
        default_field(&mut data, "conLai", total);
        default_field(&mut data, "trangThai", IN_PROGRESS);
        default_field(&mut data, "nhanVienTuVan", session.name.as_str());

        self.insert(&TREATMENT_PLAN, &data).await?;

        if amount(&data, "daThanhToan") > 0.0 {
            self.record_income(LedgerEntry {
                reference: field(&data, "maLieuTrinh"),
                customer_id: field(&data, "maKhachHang"),
                customer_name: field(&data, "tenKhachHang"),
                amount: field(&data, "daThanhToan").to_string(),
                method: CASH,
                date: field(&data, "ngayBatDau").to_string(),
                note: format!("Thanh toán liệu trình {}", field(&data, "tenLieuTrinh")),
                handled_by: field(&data, "nhanVienTuVan"),
            })
            .await?;
        }
        Ok(data)
    }

    /// Partial update with derived fields: the remaining balance follows the
    /// paid amount, and reaching the session count closes the plan.
    pub async fn update_treatment_plan(
        &self,
        session: &Session,
        id: &str,
        mut updates: Record,
    ) -> ClinicResult<Record> {
        let current = self.fetch(&TREATMENT_PLAN, id, "Không tìm thấy liệu trình").await?;

        if !is_blank(&updates, "daThanhToan") {
            let total = if is_blank(&updates, "tongTien") {
                amount(&current, "tongTien")
            } else {
                amount(&updates, "tongTien")
            };
            let remaining = total - amount(&updates, "daThanhToan");
            set(&mut updates, "conLai", format_number(remaining));
        }

        if !is_blank(&updates, "soBuoiDaThucHien") {
            let total = if is_blank(&updates, "soBuoi") {
                count(&current, "soBuoi")
            } else {
                count(&updates, "soBuoi")
            };
            if count(&updates, "soBuoiDaThucHien") >= total {
                set(&mut updates, "trangThai", DONE);
                set(&mut updates, "ngayKetThuc", today());
            }
        }

        let extra = amount(&updates, "daThanhToan") - amount(&current, "daThanhToan");
        let paid_more = !is_blank(&updates, "daThanhToan") && extra > 0.0;

        if !self.patch(&TREATMENT_PLAN, id, updates).await? {
            return Err(ClinicError::NotFound("Không tìm thấy liệu trình".into()));
        }

        if paid_more {
            self.record_income(LedgerEntry {
                reference: id,
                customer_id: field(&current, "maKhachHang"),
                customer_name: field(&current, "tenKhachHang"),
                amount: format_number(extra),
                method: CASH,
                date: today(),
                note: format!("Thanh toán thêm liệu trình {}", field(&current, "tenLieuTrinh")),
                handled_by: &session.name,
            })
            .await?;
        }

        let mut plan = self.fetch(&TREATMENT_PLAN, id, "Không tìm thấy liệu trình").await?;
        fill_payment_status(&mut plan);
        Ok(plan)
    }

    /* ---- sessions ---- */

    /// Latest day first, later start time first within a day.
    pub async fn list_sessions(&self, filter: &SessionFilter) -> ClinicResult<Vec<Record>> {
        let treatment = filter.treatment_id.as_deref().filter(|t| !t.is_empty());
        let date = filter.date.as_deref().filter(|d| !d.is_empty());

        let mut sessions: Vec<Record> = self
            .list(&TREATMENT_SESSION)
            .await?
            .into_iter()
            .filter(|s| treatment.is_none_or(|t| field(s, "maLieuTrinh") == t))
            .filter(|s| date.is_none_or(|d| field(s, "ngayThucHien") == d))
            .collect();

        sessions.sort_by(|a, b| {
            newest_first(field(a, "ngayThucHien"), field(b, "ngayThucHien"))
                .then_with(|| field(b, "gioBatDau").cmp(field(a, "gioBatDau")))
        });
        Ok(sessions)
    }

    pub async fn get_session(&self, id: &str) -> ClinicResult<Record> {
        self.fetch(&TREATMENT_SESSION, id, "Không tìm thấy lượt trị liệu")
            .await
    }

    /// Book a session. When it belongs to a plan, the plan's progress moves
    /// forward by one and the plan closes once every session is used.
    pub async fn create_session(
        &self,
        session: &Session,
        mut data: Record,
    ) -> ClinicResult<(Record, Option<TreatmentProgress>)> {
        require(
            &data,
            &["dichVuThucHien", "maKhachHang", "tenKhachHang"],
            "Thiếu thông tin bắt buộc",
        )?;

        let plan_id = field(&data, "maLieuTrinh").trim().to_string();
        let plan = if plan_id.is_empty() {
            None
        } else {
            let plan = self
                .fetch(&TREATMENT_PLAN, &plan_id, "Liệu trình không tồn tại")
                .await?;
            let status = field(&plan, "trangThai");
            if status == DONE || status == CANCELLED {
                return Err(ClinicError::BadRequest(format!(
                    "Liệu trình đã {}",
                    status.to_lowercase()
                )));
            }
            Some(plan)
        };

        set(&mut data, "maLuot", generate_id(TREATMENT_SESSION.id_prefix));
        set(&mut data, "maLieuTrinh", plan_id.as_str());
        default_field(&mut data, "ngayThucHien", today());
        default_field(&mut data, "trangThai", SCHEDULED);
        default_field(&mut data, "nhanVienThucHien", session.name.as_str());

        self.insert(&TREATMENT_SESSION, &data).await?;

        let Some(plan) = plan else {
            return Ok((data, None));
        };

        let completed = count(&plan, "soBuoiDaThucHien") + 1;
        let total = count(&plan, "soBuoi");
        let is_complete = completed >= total;

        let mut progress = Record::new();
        set(&mut progress, "soBuoiDaThucHien", completed.to_string());
        if is_complete {
            set(&mut progress, "trangThai", DONE);
            set(&mut progress, "ngayKetThuc", field(&data, "ngayThucHien"));
        }
        self.patch(&TREATMENT_PLAN, &plan_id, progress).await?;

        tracing::info!(
            target: "store",
            "plan {plan_id}: {completed}/{total} sessions used"
        );
        Ok((
            data,
            Some(TreatmentProgress {
                completed,
                total,
                is_complete,
            }),
        ))
    }

    pub async fn update_session(&self, id: &str, updates: Record) -> ClinicResult<Record> {
        let status = field(&updates, "trangThai");
        if !status.is_empty() && !SESSION_STATUSES.contains(&status) {
            return Err(ClinicError::BadRequest("Trạng thái không hợp lệ".into()));
        }
        if !self.patch(&TREATMENT_SESSION, id, updates).await? {
            return Err(ClinicError::NotFound("Không tìm thấy lượt trị liệu".into()));
        }
        self.get_session(id).await
    }

    /// Sessions are history: cancelling keeps the row.
    pub async fn cancel_session(&self, id: &str) -> ClinicResult<()> {
        if !self.remove(&TREATMENT_SESSION, id).await? {
            return Err(ClinicError::NotFound("Không tìm thấy lượt trị liệu".into()));
        }
        Ok(())
    }
}
