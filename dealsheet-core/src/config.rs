//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "scanner": {
//!     "spreadsheetId": "1AbC...",
//!     "sheetName": "Deals",
//!     "fetchRetries": 2,
//!     "sheetsBaseUrl": "https://sheets.googleapis.com/v4"
//!   }
//! }
//! ```
//! Other top-level keys are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::adapters::google_sheets::{DEFAULT_BASE_URL, TOKEN_ENV};
use crate::services::scan::ScanConfig;

pub const SPREADSHEET_ID_ENV: &str = "DEALSHEET_SPREADSHEET_ID";
pub const SHEET_NAME_ENV: &str = "DEALSHEET_SHEET_NAME";

const DEFAULT_SHEET_NAME: &str = "Sheet1";
const DEFAULT_FETCH_RETRIES: u32 = 2;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    scanner: ScannerSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScannerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spreadsheet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sheet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fetch_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sheets_base_url: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Environment values that override the settings file
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub spreadsheet_id: Option<String>,
    pub sheet_name: Option<String>,
    pub google_token: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            spreadsheet_id: std::env::var(SPREADSHEET_ID_ENV).ok(),
            sheet_name: std::env::var(SHEET_NAME_ENV).ok(),
            google_token: std::env::var(TOKEN_ENV).ok(),
        }
    }
}

/// Scanner configuration (resolved view of settings and environment)
#[derive(Debug, Clone)]
pub struct Config {
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    pub fetch_retries: u32,
    pub sheets_base_url: String,
    /// Raw `GOOGLE_TOKEN` value; never written to disk
    pub google_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            fetch_retries: DEFAULT_FETCH_RETRIES,
            sheets_base_url: DEFAULT_BASE_URL.to_string(),
            google_token: None,
        }
    }
}

impl Config {
    /// Load config from the data directory, applying environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with(data_dir, EnvOverrides::from_env())
    }

    /// Load config with explicit overrides instead of the process environment
    pub fn load_with(data_dir: &Path, env: EnvOverrides) -> Result<Self> {
        let raw = read_settings(data_dir)?;
        let scanner = raw.scanner;

        Ok(Self {
            spreadsheet_id: non_empty(env.spreadsheet_id).or(non_empty(scanner.spreadsheet_id)),
            sheet_name: non_empty(env.sheet_name)
                .or(non_empty(scanner.sheet_name))
                .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
            fetch_retries: scanner.fetch_retries.unwrap_or(DEFAULT_FETCH_RETRIES),
            sheets_base_url: non_empty(scanner.sheets_base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            google_token: non_empty(env.google_token),
        })
    }

    /// Save config to the data directory
    /// Preserves other settings that the scanner doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join("settings.json");
        let mut settings = read_settings(data_dir)?;

        settings.scanner.spreadsheet_id = self.spreadsheet_id.clone();
        settings.scanner.sheet_name = Some(self.sheet_name.clone());
        settings.scanner.fetch_retries = Some(self.fetch_retries);
        settings.scanner.sheets_base_url = Some(self.sheets_base_url.clone());

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Defaults handed to the scan orchestrator
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            default_spreadsheet_id: self.spreadsheet_id.clone(),
            default_sheet_name: self.sheet_name.clone(),
        }
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
