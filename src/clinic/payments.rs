use serde::{de::IgnoredAny, Deserialize, Serialize};

use super::{field, is_blank, record, Clinic, ClinicError, ClinicResult, Session, ACTIVE, ADMIN_ROLE};
use crate::entities::STAFF;
use crate::mapping::Record;
use crate::vietqr::{
    bank_by_bin, bank_by_name, generate_transaction_ref, generate_vietqr_image_url,
    validate_bank_account, VietQrPaymentData, TECHCOMBANK_BIN,
};

/// Receiving account used for payment QR codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicBank {
    pub bank_bin: String,
    pub account_number: String,
    pub account_name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankSettings {
    pub ten_ngan_hang: String,
    pub ma_bin: String,
    pub so_tai_khoan: String,
    pub ten_tai_khoan: String,
    pub chi_nhanh: String,
    pub trang_thai: String,
}

/// Body of a payment-QR request. Line items are only counted, and any
/// caller-supplied description is ignored in favour of `"{orderId} - {customerName}"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub items: Vec<IgnoredAny>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankInfo {
    pub name: String,
    pub account: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQr {
    pub success: bool,
    #[serde(rename = "qrDataURL")]
    pub qr_data_url: String,
    pub transaction_ref: String,
    pub bank_info: BankInfo,
}

/// First Admin with both bank and account filled in, else any staff member
/// with both.
fn bank_holder(staff: &[Record]) -> Option<&Record> {
    let has_bank = |s: &&Record| !is_blank(s, "nganHang") && !is_blank(s, "soTK");
    staff
        .iter()
        .filter(has_bank)
        .find(|s| field(s, "quyenHan") == ADMIN_ROLE)
        .or_else(|| staff.iter().find(has_bank))
}

impl Clinic {
    fn default_bank(&self) -> ClinicBank {
        ClinicBank {
            bank_bin: self.bank.bank_bin.clone(),
            account_number: self.bank.account_number.clone(),
            account_name: self.bank.account_name.clone(),
            display_name: self.bank.display_name.clone(),
        }
    }

    /// Where payments go. Never fails: an unreadable staff sheet or missing
    /// bank details fall back to the configured account.
    pub async fn resolve_clinic_bank(&self) -> ClinicBank {
        let staff = match self.list(&STAFF).await {
            Ok(staff) => staff,
            Err(e) => {
                tracing::warn!(target: "vietqr", "staff sheet unavailable, using default bank: {e}");
                return self.default_bank();
            }
        };

        let Some(holder) = bank_holder(&staff) else {
            return self.default_bank();
        };

        let bank_name = field(holder, "nganHang");
        let bank_bin = bank_by_name(bank_name)
            .map(|b| b.bin)
            .unwrap_or(TECHCOMBANK_BIN)
            .to_string();
        ClinicBank {
            bank_bin,
            account_number: field(holder, "soTK").trim().to_string(),
            account_name: self.bank.account_name.clone(),
            display_name: self.bank.display_name.clone(),
        }
    }

    pub async fn bank_settings(&self) -> BankSettings {
        let bank = self.resolve_clinic_bank().await;
        let name = bank_by_bin(&bank.bank_bin)
            .map(|b| b.name.to_string())
            .unwrap_or_else(|| bank.bank_bin.clone());
        BankSettings {
            ten_ngan_hang: name,
            ma_bin: bank.bank_bin,
            so_tai_khoan: bank.account_number,
            ten_tai_khoan: bank.account_name,
            chi_nhanh: String::new(),
            trang_thai: ACTIVE.to_string(),
        }
    }

    /// Store the receiving account on the first Admin's staff row.
    pub async fn update_bank_settings(
        &self,
        session: &Session,
        bank_name: &str,
        account_number: &str,
    ) -> ClinicResult<BankSettings> {
        session.require_admin()?;
        if bank_name.trim().is_empty() || account_number.trim().is_empty() {
            return Err(ClinicError::BadRequest("Thiếu thông tin ngân hàng".into()));
        }

        let staff = self.list(&STAFF).await?;
        let admin_id = staff
            .iter()
            .find(|s| field(s, "quyenHan") == ADMIN_ROLE)
            .map(|s| field(s, "maNhanVien").to_string())
            .ok_or_else(|| ClinicError::NotFound("Không tìm thấy tài khoản Admin".into()))?;

        let updates = record([
            ("nganHang", bank_name.trim()),
            ("soTK", account_number.trim()),
        ]);
        if !self.patch(&STAFF, &admin_id, updates).await? {
            return Err(ClinicError::NotFound("Không tìm thấy tài khoản Admin".into()));
        }

        tracing::info!(target: "vietqr", "clinic bank changed to {} by {}", bank_name.trim(), session.email);
        Ok(self.bank_settings().await)
    }

    /// Payment QR for an order, paid into the clinic's account.
    pub async fn payment_qr(&self, req: &PaymentRequest) -> ClinicResult<PaymentQr> {
        if req.order_id.trim().is_empty() || req.customer_name.trim().is_empty() {
            return Err(ClinicError::BadRequest(
                "Missing required fields: orderId, customerName".into(),
            ));
        }
        if req.total_amount.is_nan() || req.total_amount <= 0.0 {
            return Err(ClinicError::BadRequest("Total amount must be greater than 0".into()));
        }
        if req.items.is_empty() {
            return Err(ClinicError::BadRequest("Order must contain at least one item".into()));
        }

        let bank = self.resolve_clinic_bank().await;
        if !validate_bank_account(&bank.bank_bin, &bank.account_number) {
            tracing::error!(
                target: "vietqr",
                "invalid clinic bank configuration: bin={} account={}",
                bank.bank_bin,
                bank.account_number
            );
            return Err(ClinicError::Internal("Invalid clinic bank configuration".into()));
        }

        let data = VietQrPaymentData {
            bank_bin: bank.bank_bin.clone(),
            account_number: bank.account_number.clone(),
            account_name: bank.account_name.clone(),
            amount: req.total_amount,
            description: format!("{} - {}", req.order_id, req.customer_name),
            order_id: Some(req.order_id.clone()),
            patient_name: Some(req.customer_name.clone()),
            service_type: None,
        };
        let qr_data_url = generate_vietqr_image_url(&data);
        let transaction_ref = generate_transaction_ref(Some(req.order_id.as_str()));

        let bank_name = bank_by_bin(&bank.bank_bin)
            .map(|b| b.name)
            .unwrap_or("Unknown Bank");
        tracing::info!(target: "vietqr", "payment QR {transaction_ref} for order {}", req.order_id);

        Ok(PaymentQr {
            success: true,
            qr_data_url,
            transaction_ref,
            bank_info: BankInfo {
                name: bank.display_name,
                account: format!("{} ({bank_name})", bank.account_number),
            },
        })
    }
}
