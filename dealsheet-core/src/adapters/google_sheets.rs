//! Google Sheets API client
//!
//! Reads one tab of a spreadsheet through the Sheets v4 `values` endpoint
//! using an OAuth token supplied in `GOOGLE_TOKEN`.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use crate::domain::result::{Error, Result};
use crate::domain::{Cell, SheetGrid};
use crate::ports::SheetSource;

/// Environment variable holding the OAuth token
pub const TOKEN_ENV: &str = "GOOGLE_TOKEN";

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Initial retry delay in milliseconds (doubles each retry: 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 200;

/// Tokens this close to expiry are refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Authorized-user OAuth token, as written by the re-authorization script
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleCredential {
    #[serde(default, alias = "access_token")]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl GoogleCredential {
    /// Decode a `GOOGLE_TOKEN` value: base64-encoded JSON, or raw JSON
    pub fn from_env_value(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let json = if raw.starts_with('{') {
            raw.as_bytes().to_vec()
        } else {
            base64::engine::general_purpose::STANDARD
                .decode(raw)
                .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(raw))
                .map_err(|e| Error::auth(format!("{} is not valid base64: {}", TOKEN_ENV, e)))?
        };

        let credential: GoogleCredential = serde_json::from_slice(&json)
            .map_err(|e| Error::auth(format!("{} is not a valid OAuth token: {}", TOKEN_ENV, e)))?;

        if credential.token.is_none() && credential.refresh_token.is_none() {
            return Err(Error::auth(format!(
                "{} has neither an access token nor a refresh token",
                TOKEN_ENV
            )));
        }

        Ok(credential)
    }

    fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }

    fn initial_access(&self) -> Option<AccessToken> {
        self.token.as_ref().map(|token| AccessToken {
            token: token.clone(),
            expires_at: self.expiry.as_deref().and_then(parse_expiry),
        })
    }
}

/// Parse the token expiry; the Python auth library writes it without an offset
fn parse_expiry(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let trimmed = s.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .ok()
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => (expires_at - now).num_seconds() > EXPIRY_MARGIN_SECS,
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Sheets API `values.get` response
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Cell>>,
}

#[derive(Debug)]
enum CredentialState {
    Missing,
    Invalid(String),
    Ready(GoogleCredential),
}

/// Sheet source backed by the Google Sheets API
#[derive(Debug)]
pub struct GoogleSheetsSource {
    client: Client,
    base_url: Url,
    credential: CredentialState,
    access: Mutex<Option<AccessToken>>,
    fetch_retries: u32,
}

impl GoogleSheetsSource {
    /// Create a source from the raw `GOOGLE_TOKEN` value, if any
    ///
    /// A missing or undecodable token is not an error here; it surfaces from
    /// `ensure_ready` so the run fails before any fetch.
    pub fn new(token: Option<&str>, base_url: &str, fetch_retries: u32) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid Sheets base URL '{}': {}", base_url, e)))?;

        let credential = match token.map(str::trim).filter(|t| !t.is_empty()) {
            None => CredentialState::Missing,
            Some(raw) => match GoogleCredential::from_env_value(raw) {
                Ok(credential) => CredentialState::Ready(credential),
                Err(e) => CredentialState::Invalid(e.to_string()),
            },
        };

        let access = match &credential {
            CredentialState::Ready(c) => c.initial_access(),
            _ => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            credential,
            access: Mutex::new(access),
            fetch_retries,
        })
    }

    fn credential(&self) -> Result<&GoogleCredential> {
        match &self.credential {
            CredentialState::Ready(c) => Ok(c),
            CredentialState::Missing => Err(Error::auth(format!(
                "{} is not set; a Google OAuth token is required to read the spreadsheet",
                TOKEN_ENV
            ))),
            CredentialState::Invalid(msg) => Err(Error::auth(msg.clone())),
        }
    }

    /// Current access token, refreshed when close to expiry
    fn access_token(&self) -> Result<String> {
        let mut cached = self.access.lock().unwrap();
        if let Some(access) = cached.as_ref() {
            if access.is_fresh_at(Utc::now()) {
                return Ok(access.token.clone());
            }
        }

        let fresh = self.refresh_access_token()?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    fn refresh_access_token(&self) -> Result<AccessToken> {
        let credential = self.credential()?;
        if !credential.can_refresh() {
            return Err(Error::auth(format!(
                "{} access token has expired and cannot be refreshed (missing refresh_token or client credentials)",
                TOKEN_ENV
            )));
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", credential.refresh_token.as_deref().unwrap_or_default()),
            ("client_id", credential.client_id.as_deref().unwrap_or_default()),
            ("client_secret", credential.client_secret.as_deref().unwrap_or_default()),
        ];

        let response = self
            .client
            .post(&credential.token_uri)
            .form(&form)
            .send()
            .map_err(map_request_error)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().unwrap_or_default();
            return Err(match status {
                400 | 401 | 403 => Error::auth(format!(
                    "Token refresh was rejected (HTTP {}); re-authorize and update {}",
                    status, TOKEN_ENV
                )),
                _ => classify_status(status, &body, "", ""),
            });
        }

        let data: TokenResponse = response
            .json()
            .map_err(|e| Error::auth(format!("Failed to parse token refresh response: {}", e)))?;

        Ok(AccessToken {
            token: data.access_token,
            expires_at: data
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
    }

    /// Build the `values.get` URL for a whole tab
    pub fn values_url(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        let range = format!("'{}'", sheet_name.replace('\'', "''"));
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid Sheets base URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(["spreadsheets", spreadsheet_id, "values", range.as_str()]);
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE")
            .append_pair("dateTimeRenderOption", "FORMATTED_STRING");
        Ok(url)
    }

    fn fetch_once(&self, url: &Url, spreadsheet_id: &str, sheet_name: &str) -> Result<SheetGrid> {
        let token = self.access_token()?;

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .map_err(map_request_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, &body, spreadsheet_id, sheet_name));
        }

        let data: ValueRange = response
            .json()
            .map_err(|e| Error::Other(format!("Failed to parse Sheets response: {}", e)))?;

        Ok(SheetGrid::from_values(data.values))
    }
}

impl SheetSource for GoogleSheetsSource {
    fn name(&self) -> &str {
        "google_sheets"
    }

    fn ensure_ready(&self) -> Result<()> {
        self.credential().map(|_| ())
    }

    fn fetch_grid(&self, spreadsheet_id: &str, sheet_name: &str) -> Result<SheetGrid> {
        let url = self.values_url(spreadsheet_id, sheet_name)?;
        let mut attempt = 0;

        loop {
            match self.fetch_once(&url, spreadsheet_id, sheet_name) {
                Err(e) if e.is_retryable() && attempt < self.fetch_retries => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    eprintln!(
                        "[dealsheet] Sheets API unavailable, retrying in {}ms (attempt {}/{}): {}",
                        delay.as_millis(),
                        attempt + 1,
                        self.fetch_retries,
                        e
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Map request errors to user-friendly messages
fn map_request_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::transient("Connection to Google Sheets timed out after 30 seconds")
    } else if error.is_connect() {
        Error::transient("Unable to connect to Google Sheets")
    } else if error.is_request() {
        Error::transient(format!("Google Sheets request failed: {}", error))
    } else {
        Error::Other(format!("Google Sheets request failed: {}", error))
    }
}

/// Map a non-success HTTP status to a run-level error
pub fn classify_status(status: u16, body: &str, spreadsheet_id: &str, sheet_name: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "Google Sheets refused the credential (HTTP {}); check {} and that the spreadsheet is shared with it",
            status, TOKEN_ENV
        )),
        404 => Error::not_found(format!("Spreadsheet '{}' not found", spreadsheet_id)),
        400 if body.contains("Unable to parse range") => Error::not_found(format!(
            "Sheet '{}' not found in spreadsheet '{}'",
            sheet_name, spreadsheet_id
        )),
        429 => Error::transient("Google Sheets rate limit exceeded (HTTP 429)"),
        500..=599 => Error::transient(format!("Google Sheets API unavailable (HTTP {})", status)),
        _ => {
            let snippet: String = body.chars().take(200).collect();
            Error::Other(format!("Google Sheets API error: HTTP {}: {}", status, snippet))
        }
    }
}
