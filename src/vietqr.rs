//! VietQR bank-transfer descriptors.
//!
//! Everything here is pure: the bank table is a process-wide constant and the
//! URL builder never talks to the network. Callers must run
//! [`validate_bank_account`] before [`generate_vietqr_image_url`]; the builder
//! happily produces an unusable URL from bad input.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::ids::{now_millis, random_base36, to_base36};

pub const QR_SERVICE_BASE: &str = "https://qrcode.io.vn/api/generate";
const DEFAULT_DESCRIPTION: &str = "Thanh toan don hang";
const MAX_DESCRIPTION_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bank {
    pub name: &'static str,
    pub bin: &'static str,
    pub short_name: &'static str,
    pub display_name: &'static str,
    #[serde(skip)]
    pub account_len: (usize, usize),
}

/// NAPAS members the clinic can receive transfers on.
pub const VIETNAMESE_BANKS: [Bank; 15] = [
    Bank { name: "VietinBank", bin: "970415", short_name: "ICB", display_name: "Ngân hàng TMCP Công thương Việt Nam", account_len: (10, 19) },
    Bank { name: "Vietcombank", bin: "970436", short_name: "VCB", display_name: "Ngân hàng TMCP Ngoại Thương Việt Nam", account_len: (10, 16) },
    Bank { name: "BIDV", bin: "970418", short_name: "BIDV", display_name: "Ngân hàng TMCP Đầu tư và Phát triển Việt Nam", account_len: (10, 19) },
    Bank { name: "Agribank", bin: "970405", short_name: "VBA", display_name: "Ngân hàng Nông nghiệp và Phát triển Nông thôn Việt Nam", account_len: (8, 19) },
    Bank { name: "OCB", bin: "970448", short_name: "OCB", display_name: "Ngân hàng TMCP Phương Đông", account_len: (10, 19) },
    Bank { name: "MBBank", bin: "970422", short_name: "MB", display_name: "Ngân hàng TMCP Quân đội", account_len: (10, 19) },
    Bank { name: "Techcombank", bin: "970407", short_name: "TCB", display_name: "Ngân hàng TMCP Kỹ thương Việt Nam", account_len: (10, 19) },
    Bank { name: "ACB", bin: "970416", short_name: "ACB", display_name: "Ngân hàng TMCP Á Châu", account_len: (6, 19) },
    Bank { name: "VPBank", bin: "970432", short_name: "VPB", display_name: "Ngân hàng TMCP Việt Nam Thịnh Vượng", account_len: (10, 19) },
    Bank { name: "TPBank", bin: "970423", short_name: "TPB", display_name: "Ngân hàng TMCP Tiên Phong", account_len: (10, 19) },
    Bank { name: "Sacombank", bin: "970403", short_name: "STB", display_name: "Ngân hàng TMCP Sài Gòn Thương Tín", account_len: (8, 19) },
    Bank { name: "HDBank", bin: "970437", short_name: "HDB", display_name: "Ngân hàng TMCP Phát triển Thành phố Hồ Chí Minh", account_len: (10, 19) },
    Bank { name: "VietCapitalBank", bin: "970454", short_name: "VCCB", display_name: "Ngân hàng TMCP Bản Việt", account_len: (10, 19) },
    Bank { name: "SCB", bin: "970429", short_name: "SCB", display_name: "Ngân hàng TMCP Sài Gòn", account_len: (8, 19) },
    Bank { name: "VIB", bin: "970441", short_name: "VIB", display_name: "Ngân hàng TMCP Quốc tế Việt Nam", account_len: (10, 19) },
];

pub const TECHCOMBANK_BIN: &str = "970407";

/// Short code -> bank slug understood by the QR rendering service.
const QR_SERVICE_SLUGS: [(&str, &str); 13] = [
    ("tcb", "techcombank"),
    ("vcb", "vietcombank"),
    ("bidv", "bidv"),
    ("vba", "agribank"),
    ("mb", "mbbank"),
    ("acb", "acb"),
    ("vpb", "vpbank"),
    ("tpb", "tpbank"),
    ("stb", "sacombank"),
    ("hdb", "hdbank"),
    ("scb", "scb"),
    ("vib", "vib"),
    ("ocb", "ocb"),
];

pub fn bank_by_bin(bin: &str) -> Option<&'static Bank> {
    VIETNAMESE_BANKS.iter().find(|b| b.bin == bin)
}

/// Case-insensitive match on name, display name or short code.
pub fn bank_by_name(name: &str) -> Option<&'static Bank> {
    let wanted = name.trim().to_lowercase();
    VIETNAMESE_BANKS.iter().find(|b| {
        b.name.to_lowercase() == wanted
            || b.display_name.to_lowercase() == wanted
            || b.short_name.to_lowercase() == wanted
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VietQrPaymentData {
    pub bank_bin: String,
    pub account_number: String,
    #[serde(default)]
    pub account_name: String,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    pub order_id: Option<String>,
    pub patient_name: Option<String>,
    pub service_type: Option<String>,
}

pub fn validate_bank_account(bin: &str, account_number: &str) -> bool {
    let Some(bank) = bank_by_bin(bin) else {
        return false;
    };
    if account_number.is_empty() || !account_number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let (min, max) = bank.account_len;
    (min..=max).contains(&account_number.len())
}

/// ASCII-only text safe for a URL path segment, at most 50 characters.
pub fn sanitize_vietnamese_text(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .map(|c| match c {
            'đ' => 'd',
            'Đ' => 'D',
            other => other,
        })
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '_' | '.'))
        .collect();

    stripped.trim().chars().take(MAX_DESCRIPTION_CHARS).collect()
}

/// Whole dong, halves rounded up.
pub fn format_vnd_amount(amount: f64) -> String {
    let rounded = (amount + 0.5).floor();
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{rounded:.0}")
}

fn qr_service_slug(bank: &Bank) -> String {
    let short = bank.short_name.to_lowercase();
    QR_SERVICE_SLUGS
        .iter()
        .find(|(code, _)| *code == short)
        .map(|(_, slug)| (*slug).to_string())
        .unwrap_or(short)
}

/// `{base}/{bankSlug}/{account}/{amount}/{description}` for an image tag.
pub fn generate_vietqr_image_url(data: &VietQrPaymentData) -> String {
    let bank_code = bank_by_bin(&data.bank_bin)
        .map(qr_service_slug)
        .unwrap_or_else(|| data.bank_bin.clone());

    let description = if data.description.is_empty() {
        DEFAULT_DESCRIPTION
    } else {
        data.description.as_str()
    };

    format!(
        "{QR_SERVICE_BASE}/{bank_code}/{}/{}/{}",
        data.account_number,
        format_vnd_amount(data.amount),
        sanitize_vietnamese_text(description)
    )
}

/// Client-visible correlation token. Never checked against the ledger.
pub fn generate_transaction_ref(order_id: Option<&str>) -> String {
    let prefix = match order_id {
        Some(id) if !id.is_empty() => format!("ORD{id}"),
        _ => "TXN".to_string(),
    };
    format!("{prefix}_{}_{}", to_base36(now_millis()), random_base36(5)).to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(bin: &str, account: &str, amount: f64, description: &str) -> VietQrPaymentData {
        VietQrPaymentData {
            bank_bin: bin.into(),
            account_number: account.into(),
            account_name: "PHONG KHAM".into(),
            amount,
            description: description.into(),
            order_id: None,
            patient_name: None,
            service_type: None,
        }
    }

    #[test]
    fn techcombank_length_boundaries() {
        assert!(!validate_bank_account("970407", &"1".repeat(9)));
        assert!(validate_bank_account("970407", &"1".repeat(10)));
        assert!(validate_bank_account("970407", &"1".repeat(19)));
        assert!(!validate_bank_account("970407", &"1".repeat(20)));
    }

    #[test]
    fn non_digits_always_fail() {
        assert!(!validate_bank_account("970407", "12345a7890"));
        assert!(!validate_bank_account("970407", "1234 567890"));
        assert!(!validate_bank_account("970407", ""));
    }

    #[test]
    fn per_bank_ranges_apply() {
        assert!(validate_bank_account("970416", "123456"));
        assert!(!validate_bank_account("970416", "12345"));
        assert!(validate_bank_account("970405", "12345678"));
        assert!(!validate_bank_account("970436", &"1".repeat(17)));
        assert!(!validate_bank_account("999999", "1234567890"));
    }

    #[test]
    fn sanitizes_clinic_name() {
        let out = sanitize_vietnamese_text("Phòng khám Tống Gia Đường");
        assert_eq!(out, "Phong kham Tong Gia Duong");
        assert!(out.is_ascii());
    }

    #[test]
    fn sanitize_drops_symbols_and_truncates() {
        assert_eq!(sanitize_vietnamese_text("  đơn #42 (gấp)!  "), "don 42 gap");
        let long = "a".repeat(80);
        assert_eq!(sanitize_vietnamese_text(&long).len(), 50);
        assert_eq!(sanitize_vietnamese_text(""), "");
    }

    #[test]
    fn amounts_are_whole_dong() {
        assert_eq!(format_vnd_amount(1234.9), "1235");
        assert_eq!(format_vnd_amount(0.0), "0");
        assert_eq!(format_vnd_amount(500_000.0), "500000");
        assert_eq!(format_vnd_amount(2.5), "3");
        assert_eq!(format_vnd_amount(-0.4), "0");
    }

    #[test]
    fn techcombank_url_shape() {
        let url = generate_vietqr_image_url(&payment(
            "970407",
            "19070220842011",
            500_000.0,
            "DH001 - Nguyen Van A",
        ));
        assert_eq!(
            url,
            "https://qrcode.io.vn/api/generate/techcombank/19070220842011/500000/DH001 - Nguyen Van A"
        );
    }

    #[test]
    fn slug_fallbacks() {
        let vietin = generate_vietqr_image_url(&payment("970415", "1234567890", 1.0, "x"));
        assert!(vietin.starts_with(&format!("{QR_SERVICE_BASE}/icb/")));

        let unknown = generate_vietqr_image_url(&payment("123456", "1", 1.0, ""));
        assert_eq!(unknown, format!("{QR_SERVICE_BASE}/123456/1/1/Thanh toan don hang"));
    }

    #[test]
    fn bank_lookup_by_name_is_case_insensitive() {
        assert_eq!(bank_by_name("techcombank").map(|b| b.bin), Some("970407"));
        assert_eq!(bank_by_name("VCB").map(|b| b.bin), Some("970436"));
        assert_eq!(
            bank_by_name("Ngân hàng TMCP Á Châu").map(|b| b.bin),
            Some("970416")
        );
        assert!(bank_by_name("Nope Bank").is_none());
    }

    #[test]
    fn transaction_refs() {
        let r = generate_transaction_ref(Some("DH001"));
        let parts: Vec<_> = r.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORDDH001");
        for part in &parts[1..] {
            assert!(!part.is_empty());
            assert!(part.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
        assert!(generate_transaction_ref(None).starts_with("TXN_"));
        assert_ne!(generate_transaction_ref(Some("DH001")), generate_transaction_ref(Some("DH001")));
    }
}
