//! Clinic workflows layered on top of the generic row store.
//!
//! Every operation reads and writes through [`RowStore`]; nothing here caches
//! sheet contents between calls. Cross-entity side effects (ledger entries,
//! plan progress) are plain follow-up writes with no rollback.

mod billing;
mod catalog;
mod payments;
mod people;
mod treatments;

use std::cmp::Ordering;

use serde::Serialize;
use time::{macros::format_description, Date, OffsetDateTime};

use crate::config::ClinicBankDefaults;
use crate::entities::EntitySpec;
use crate::ids::generate_id;
use crate::mapping::Record;
use crate::sheets::SheetError;
use crate::store::RowStore;

pub use billing::TransactionFilter;
pub use payments::{BankSettings, PaymentQr, PaymentRequest};
pub use treatments::{SessionFilter, TreatmentProgress};

pub const ADMIN_ROLE: &str = "Admin";
pub const STAFF_ROLE: &str = "Nhân viên";
pub const ACTIVE: &str = "Hoạt động";
pub const DONE: &str = "Hoàn thành";

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] SheetError),
}

pub type ClinicResult<T> = Result<T, ClinicError>;

/// The staff member acting on a request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    fn require_admin(&self) -> ClinicResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ClinicError::Forbidden("Chỉ Admin mới có quyền thực hiện".into()))
        }
    }
}

#[derive(Clone)]
pub struct Clinic {
    store: RowStore,
    bank: ClinicBankDefaults,
    owner_email: Option<String>,
}

impl Clinic {
    pub fn new(store: RowStore, bank: ClinicBankDefaults, owner_email: Option<String>) -> Self {
        Self {
            store,
            bank,
            owner_email,
        }
    }

    async fn list(&self, spec: &EntitySpec) -> ClinicResult<Vec<Record>> {
        Ok(self.store.list_all(spec.sheet, &spec.mapping).await?)
    }

    async fn find(&self, spec: &EntitySpec, id: &str) -> ClinicResult<Option<Record>> {
        Ok(self
            .store
            .get_by_id(spec.sheet, &spec.mapping, spec.id_field, id)
            .await?)
    }

    async fn fetch(&self, spec: &EntitySpec, id: &str, missing: &str) -> ClinicResult<Record> {
        self.find(spec, id)
            .await?
            .ok_or_else(|| ClinicError::NotFound(missing.to_string()))
    }

    async fn insert(&self, spec: &EntitySpec, record: &Record) -> ClinicResult<()> {
        self.store.append(spec.sheet, &spec.mapping, record).await?;
        tracing::info!(
            target: "store",
            "[{}] created {}={}",
            spec.sheet,
            spec.id_field,
            field(record, spec.id_field)
        );
        Ok(())
    }

    /// Merge `updates` into the row, never touching its identity column.
    async fn patch(&self, spec: &EntitySpec, id: &str, mut updates: Record) -> ClinicResult<bool> {
        updates.remove(spec.id_field);
        Ok(self
            .store
            .update(spec.sheet, &spec.mapping, spec.id_field, id, &updates)
            .await?)
    }

    /// Hard delete for deletable entities, status change for soft-cancelled
    /// ones. Returns `false` when no row matched.
    async fn remove(&self, spec: &EntitySpec, id: &str) -> ClinicResult<bool> {
        if spec.deletable {
            return Ok(self
                .store
                .delete(spec.sheet, &spec.mapping, spec.id_field, id)
                .await?);
        }
        match spec.cancel_status {
            Some(status) => self.patch(spec, id, record([("trangThai", status)])).await,
            None => Err(ClinicError::BadRequest(format!(
                "Không thể xóa dữ liệu trong {}",
                spec.sheet
            ))),
        }
    }
}

/* ---- record helpers ---- */

pub(crate) fn record<const N: usize>(pairs: [(&str, &str); N]) -> Record {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub(crate) fn field<'a>(r: &'a Record, key: &str) -> &'a str {
    r.get(key).map(String::as_str).unwrap_or("")
}

fn is_blank(r: &Record, key: &str) -> bool {
    field(r, key).trim().is_empty()
}

fn require(r: &Record, keys: &[&str], message: &str) -> ClinicResult<()> {
    if keys.iter().any(|k| is_blank(r, k)) {
        return Err(ClinicError::BadRequest(message.to_string()));
    }
    Ok(())
}

/// Fill `key` only when the caller left it empty.
fn default_field(r: &mut Record, key: &str, value: impl Into<String>) {
    if is_blank(r, key) {
        r.insert(key.to_string(), value.into());
    }
}

fn set(r: &mut Record, key: &str, value: impl Into<String>) {
    r.insert(key.to_string(), value.into());
}

fn ensure_id(r: &mut Record, spec: &EntitySpec) {
    default_field(r, spec.id_field, generate_id(spec.id_prefix));
}

/* ---- numbers and dates as the sheet stores them ---- */

/// Leading decimal number of a cell, ignoring whatever follows it.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    s[..end].trim_end_matches('.').parse().ok()
}

/// Leading integer of a cell.
pub(crate) fn parse_count(raw: &str) -> Option<i64> {
    parse_number(raw).map(|n| n.trunc() as i64)
}

fn amount(r: &Record, key: &str) -> f64 {
    parse_number(field(r, key)).unwrap_or(0.0)
}

/// Whole numbers print without a fractional part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

pub(crate) fn today() -> String {
    format_date(OffsetDateTime::now_utc().date())
}

fn format_date(d: Date) -> String {
    d.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| d.to_string())
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
pub(crate) fn parse_date(raw: &str) -> Option<Date> {
    let day = raw.trim().get(..10)?;
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

/// Newest first; rows without a readable date sink to the bottom.
fn newest_first(a: &str, b: &str) -> Ordering {
    match (parse_date(a), parse_date(b)) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::entities::STAFF;
    use crate::sheets::MemorySheets;

    pub const OWNER: &str = "owner@clinic.vn";

    pub fn admin() -> Session {
        Session {
            id: "NV001".into(),
            name: "Bác sĩ Lực".into(),
            email: "admin@clinic.vn".into(),
            role: ADMIN_ROLE.into(),
        }
    }

    pub fn staff() -> Session {
        Session {
            id: "NV002".into(),
            name: "Lan".into(),
            email: "lan@clinic.vn".into(),
            role: STAFF_ROLE.into(),
        }
    }

    pub fn clinic() -> (Arc<MemorySheets>, Clinic) {
        let mem = Arc::new(MemorySheets::new());
        let store = RowStore::new(mem.clone());
        let clinic = Clinic::new(store, ClinicBankDefaults::default(), Some(OWNER.into()));
        (mem, clinic)
    }

    /// Admin and staff rows matching [`admin`] and [`staff`].
    pub async fn seed_staff(mem: &MemorySheets) {
        let row = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        mem.seed(
            STAFF.sheet,
            vec![
                STAFF.mapping.headers(),
                row(&[
                    "NV001", "Bác sĩ Lực", "0901000001", "admin@clinic.vn", "Bác sĩ", "Đông y",
                    "2023-01-01", ADMIN_ROLE, ACTIVE, "0", "Vietcombank", "0123456789",
                ]),
                row(&[
                    "NV002", "Lan", "0901000002", "lan@clinic.vn", "Kỹ thuật viên", "Châm cứu",
                    "2023-02-01", STAFF_ROLE, ACTIVE, "10", "", "",
                ]),
            ],
        )
        .await;
    }
}
