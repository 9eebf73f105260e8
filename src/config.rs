use anyhow::{anyhow, bail, Result};

use crate::vietqr::TECHCOMBANK_BIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Google,
    Mongo,
    Memory,
}

impl BackendKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "google" | "sheets" => Ok(Self::Google),
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown SHEET_BACKEND `{other}` (expected google, mongo or memory)"),
        }
    }
}

/// Fallback receiving account when no staff row carries bank details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicBankDefaults {
    pub bank_bin: String,
    pub account_number: String,
    pub account_name: String,
    pub display_name: String,
}

impl Default for ClinicBankDefaults {
    fn default() -> Self {
        Self {
            bank_bin: TECHCOMBANK_BIN.to_string(),
            account_number: "19070220842011".to_string(),
            account_name: "TRAN CONG KHANG".to_string(),
            display_name: "Phòng Khám Tống Gia Đường".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub api_key: String,
    pub hmac_secret: String,
    pub backend: BackendKind,
    pub google_sheet_id: Option<String>,
    pub google_token: Option<String>,
    pub mongo_uri: Option<String>,
    pub mongo_db: String,
    /// Signs in as Admin even without a staff row.
    pub owner_email: Option<String>,
    pub bank: ClinicBankDefaults,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("PORT") {
            Some(v) => v.parse().map_err(|_| anyhow!("PORT must be a number, got `{v}`"))?,
            None => 3000,
        };

        let backend = BackendKind::parse(&non_empty("SHEET_BACKEND").unwrap_or_else(|| "google".into()))?;

        let cfg = Self {
            port,
            api_key: non_empty("CLINIC_API_KEY").unwrap_or_else(|| "dev-clinic-key".into()),
            hmac_secret: non_empty("CLINIC_HMAC_SECRET").unwrap_or_else(|| "dev-secret-xyz".into()),
            backend,
            google_sheet_id: non_empty("GOOGLE_SHEET_ID"),
            google_token: non_empty("GOOGLE_SHEETS_TOKEN"),
            mongo_uri: non_empty("MONGO_URI"),
            mongo_db: non_empty("MONGO_DB").unwrap_or_else(|| "clinic".into()),
            owner_email: non_empty("CLINIC_OWNER_EMAIL"),
            bank: {
                let d = ClinicBankDefaults::default();
                ClinicBankDefaults {
                    bank_bin: non_empty("CLINIC_BANK_BIN").unwrap_or(d.bank_bin),
                    account_number: non_empty("CLINIC_ACCOUNT_NUMBER").unwrap_or(d.account_number),
                    account_name: non_empty("CLINIC_ACCOUNT_NAME").unwrap_or(d.account_name),
                    display_name: d.display_name,
                }
            },
        };

        match cfg.backend {
            BackendKind::Google if cfg.google_sheet_id.is_none() => {
                bail!("GOOGLE_SHEET_ID environment variable is required")
            }
            BackendKind::Google if cfg.google_token.is_none() => {
                bail!("GOOGLE_SHEETS_TOKEN environment variable is required")
            }
            BackendKind::Mongo if cfg.mongo_uri.is_none() => {
                bail!("MONGO_URI missing in environment")
            }
            _ => {}
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn memory_backend_needs_nothing_else() {
        let cfg = AppConfig::from_lookup(lookup(&[("SHEET_BACKEND", "memory")])).unwrap();
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.bank, ClinicBankDefaults::default());
    }

    #[test]
    fn google_backend_requires_sheet_and_token() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_SHEET_ID"));

        let err = AppConfig::from_lookup(lookup(&[("GOOGLE_SHEET_ID", "abc")])).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_SHEETS_TOKEN"));

        let cfg = AppConfig::from_lookup(lookup(&[
            ("GOOGLE_SHEET_ID", "abc"),
            ("GOOGLE_SHEETS_TOKEN", "t"),
            ("PORT", "8080"),
        ]))
        .unwrap();
        assert_eq!(cfg.backend, BackendKind::Google);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn mongo_backend_requires_uri() {
        assert!(AppConfig::from_lookup(lookup(&[("SHEET_BACKEND", "mongo")])).is_err());
    }

    #[test]
    fn bank_defaults_can_be_overridden() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("SHEET_BACKEND", "memory"),
            ("CLINIC_BANK_BIN", "970415"),
            ("CLINIC_ACCOUNT_NUMBER", "1234567890"),
        ]))
        .unwrap();
        assert_eq!(cfg.bank.bank_bin, "970415");
        assert_eq!(cfg.bank.account_number, "1234567890");
        assert_eq!(cfg.bank.account_name, "TRAN CONG KHANG");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("SHEET_BACKEND", "excel")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SHEET_BACKEND", "memory"), ("PORT", "x")])).is_err());
    }
}
