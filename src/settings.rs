//! Credential settings kept in a flat `KEY=value` file.
//!
//! The file is shared with other tooling, so saves rewrite only the lines
//! they own and keep comments, blank lines and foreign keys in place.

use crate::errors::{AppError, AppResult};
use crate::redaction::display_value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const NOT_CONFIGURED: &str = "Not configured";
pub const FILE_HEADER: &str = "# Dashboard configuration";
pub const OPENAI_MODELS: &[&str] = &["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo"];
pub const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialField {
    pub key: &'static str,
    pub label: &'static str,
    pub secret: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum CredentialGroup {
    Shopify,
    Whatsapp,
    Openai,
    Redis,
}

const SHOPIFY_FIELDS: &[CredentialField] = &[
    CredentialField { key: "SHOPIFY_SHOP_URL", label: "Shop URL", secret: false },
    CredentialField { key: "SHOPIFY_API_KEY", label: "API key", secret: false },
    CredentialField { key: "SHOPIFY_API_SECRET", label: "API secret", secret: true },
    CredentialField { key: "SHOPIFY_ACCESS_TOKEN", label: "Access token", secret: true },
];

const WHATSAPP_FIELDS: &[CredentialField] = &[
    CredentialField { key: "GRAPH_API_TOKEN", label: "Graph API token", secret: true },
    CredentialField { key: "WHATSAPP_PHONE_NUMBER_ID", label: "Phone number ID", secret: false },
    CredentialField { key: "WHATSAPP_BUSINESS_ACCOUNT_ID", label: "Business account ID", secret: false },
    CredentialField { key: "WEBHOOK_VERIFY_TOKEN", label: "Webhook verify token", secret: true },
];

const OPENAI_FIELDS: &[CredentialField] = &[
    CredentialField { key: "OPENAI_API_KEY", label: "API key", secret: true },
    CredentialField { key: "OPENAI_MODEL", label: "Model", secret: false },
];

const REDIS_FIELDS: &[CredentialField] = &[
    CredentialField { key: "REDIS_URL", label: "URL", secret: false },
    CredentialField { key: "REDIS_PASSWORD", label: "Password", secret: true },
];

impl CredentialGroup {
    pub const ALL: [CredentialGroup; 4] = [Self::Shopify, Self::Whatsapp, Self::Openai, Self::Redis];

    pub fn title(self) -> &'static str {
        match self {
            Self::Shopify => "Shopify",
            Self::Whatsapp => "WhatsApp",
            Self::Openai => "OpenAI",
            Self::Redis => "Redis",
        }
    }

    pub fn fields(self) -> &'static [CredentialField] {
        match self {
            Self::Shopify => SHOPIFY_FIELDS,
            Self::Whatsapp => WHATSAPP_FIELDS,
            Self::Openai => OPENAI_FIELDS,
            Self::Redis => REDIS_FIELDS,
        }
    }

    /// Key whose presence marks the integration as configured.
    pub fn token_key(self) -> Option<&'static str> {
        match self {
            Self::Shopify => Some("SHOPIFY_ACCESS_TOKEN"),
            Self::Whatsapp => Some("GRAPH_API_TOKEN"),
            Self::Openai => Some("OPENAI_API_KEY"),
            Self::Redis => None,
        }
    }

    fn field(self, key: &str) -> Option<&'static CredentialField> {
        self.fields().iter().find(|field| field.key == key)
    }
}

/// Settings visible to the process: file entries overlaid by the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSettings {
    values: BTreeMap<String, String>,
}

impl ResolvedSettings {
    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        Self { values: entries }
    }

    /// Loads the env file and lets process variables for known keys win.
    pub fn load(env_file: &Path) -> AppResult<Self> {
        let mut values = read_entries(env_file)?;
        for group in CredentialGroup::ALL {
            for field in group.fields() {
                if let Ok(value) = std::env::var(field.key) {
                    values.insert(field.key.to_string(), value);
                }
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn is_configured(&self, group: CredentialGroup) -> bool {
        group.token_key().is_some_and(|key| self.get(key).is_some())
    }

    /// `(label, key, display value)` rows for one settings form.
    pub fn masked_rows(&self, group: CredentialGroup) -> Vec<(&'static str, &'static str, String)> {
        group
            .fields()
            .iter()
            .map(|field| (field.label, field.key, display_value(self.get(field.key), field.secret, NOT_CONFIGURED)))
            .collect()
    }
}

/// Parses `KEY=value` lines; comments, blanks and lines without `=` are ignored.
pub fn parse_entries(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

pub fn read_entries(path: &Path) -> AppResult<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path).map_err(|error| AppError::Io(error.to_string()))?;
    Ok(parse_entries(&content))
}

/// Rewrites `existing` with `updates` applied. Existing keys are replaced in
/// place, new keys are appended in the given order.
pub fn merge_lines(existing: &str, updates: &[(String, String)]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut written: Vec<&str> = Vec::new();

    for raw in existing.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            lines.push(line.to_string());
            continue;
        }
        let Some((key, _)) = line.split_once('=') else {
            lines.push(line.to_string());
            continue;
        };
        let key = key.trim();
        match updates.iter().find(|(candidate, _)| candidate == key) {
            Some((key, value)) => {
                lines.push(format!("{}={}", key, value));
                written.push(key.as_str());
            }
            None => lines.push(line.to_string()),
        }
    }

    for (key, value) in updates {
        if !written.contains(&key.as_str()) {
            lines.push(format!("{}={}", key, value));
        }
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

/// Builds the full form submission for `group`: supplied values win, other
/// fields keep their current value.
pub fn form_values(
    group: CredentialGroup,
    supplied: &BTreeMap<String, String>,
    current: &ResolvedSettings,
) -> AppResult<Vec<(String, String)>> {
    if let Some(unknown) = supplied.keys().find(|key| group.field(key).is_none()) {
        return Err(AppError::Config(format!(
            "{} is not a {} setting (expected one of: {})",
            unknown,
            group.title(),
            group
                .fields()
                .iter()
                .map(|field| field.key)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    if let Some((key, _)) = supplied
        .iter()
        .find(|(_, value)| value.contains('\n') || value.contains('\r'))
    {
        return Err(AppError::Config(format!("{} must fit on a single line", key)));
    }
    if let Some(model) = supplied.get("OPENAI_MODEL") {
        if !OPENAI_MODELS.contains(&model.as_str()) {
            return Err(AppError::Config(format!(
                "unsupported OpenAI model `{}` (expected one of: {})",
                model,
                OPENAI_MODELS.join(", ")
            )));
        }
    }

    Ok(group
        .fields()
        .iter()
        .map(|field| {
            let value = supplied
                .get(field.key)
                .cloned()
                .or_else(|| current.get(field.key).map(str::to_string))
                .unwrap_or_default();
            (field.key.to_string(), value)
        })
        .collect())
}

/// Merges `updates` into the env file at `path`, replacing it atomically.
pub fn save_group(path: &Path, group: CredentialGroup, updates: &[(String, String)]) -> AppResult<()> {
    let existing = if path.exists() {
        fs::read_to_string(path).map_err(|error| AppError::Io(error.to_string()))?
    } else {
        format!("{}\n", FILE_HEADER)
    };
    let content = merge_lines(&existing, updates);
    write_atomically(path, content.as_bytes())?;
    tracing::info!(
        group = group.title(),
        path = %path.to_string_lossy(),
        keys = ?updates.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>(),
        "saved settings"
    );
    Ok(())
}

fn temp_path(path: &Path) -> AppResult<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| AppError::Config(format!("{} has no file name", path.to_string_lossy())))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(format!(".tmp-{}", std::process::id()));
    Ok(path.with_file_name(temp_name))
}

/// New settings files hold secrets, so they start owner-only.
#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<File> {
    File::create(path)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;
    }
    let temp = temp_path(path)?;
    let previous = fs::metadata(path).ok().map(|metadata| metadata.permissions());
    let result = (|| -> std::io::Result<()> {
        let mut file = create_private(&temp)?;
        file.write_all(bytes)?;
        if let Some(permissions) = previous {
            file.set_permissions(permissions)?;
        }
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, path)
    })();
    if let Err(error) = result {
        let _ = fs::remove_file(&temp);
        return Err(AppError::Io(format!("failed to write {}: {}", path.to_string_lossy(), error)));
    }
    Ok(())
}

/// Parses `KEY=VALUE` command-line pairs.
pub fn parse_assignments(pairs: &[String]) -> AppResult<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.to_string()))
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| AppError::Config(format!("expected KEY=VALUE, got `{}`", pair)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn merge_preserves_comments_and_foreign_keys() {
        let existing = "# shop\nSHOPIFY_SHOP_URL=old.myshopify.com\n\n  OTHER=kept  \nnot a setting\n";
        let merged = merge_lines(
            existing,
            &pairs(&[("SHOPIFY_SHOP_URL", "new.myshopify.com"), ("SHOPIFY_API_KEY", "k1")]),
        );
        assert_eq!(
            merged,
            "# shop\nSHOPIFY_SHOP_URL=new.myshopify.com\n\nOTHER=kept\nnot a setting\nSHOPIFY_API_KEY=k1\n"
        );
    }

    #[test]
    fn saving_twice_is_byte_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".env");
        fs::write(&path, "# keep me\n   REDIS_URL = redis://old:6379\nUNRELATED=1").expect("seed env");
        let updates = pairs(&[("REDIS_URL", "redis://cache:6379"), ("REDIS_PASSWORD", "pw")]);

        save_group(&path, CredentialGroup::Redis, &updates).expect("first save");
        let first = fs::read(&path).expect("read first");
        save_group(&path, CredentialGroup::Redis, &updates).expect("second save");
        let second = fs::read(&path).expect("read second");

        assert_eq!(first, second);
        assert_eq!(
            String::from_utf8(first).expect("utf8"),
            "# keep me\nREDIS_URL=redis://cache:6379\nUNRELATED=1\nREDIS_PASSWORD=pw\n"
        );
    }

    #[test]
    fn missing_file_starts_from_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(".env");
        save_group(&path, CredentialGroup::Openai, &pairs(&[("OPENAI_MODEL", "gpt-4")])).expect("save");
        let content = fs::read_to_string(&path).expect("read");
        assert_eq!(content, format!("{}\nOPENAI_MODEL=gpt-4\n", FILE_HEADER));
        assert!(!dir.path().join("nested").join(format!(".env.tmp-{}", std::process::id())).exists());
    }

    #[test]
    fn failed_write_leaves_previous_file_intact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings");
        fs::create_dir(&path).expect("directory in place of file");
        let result = save_group(&path, CredentialGroup::Redis, &pairs(&[("REDIS_URL", "x")]));
        assert!(result.is_err());
        assert!(path.is_dir());
    }

    #[test]
    fn form_values_fill_unsupplied_fields_from_current() {
        let current = ResolvedSettings::from_entries(BTreeMap::from([
            ("SHOPIFY_SHOP_URL".to_string(), "shop.myshopify.com".to_string()),
            ("SHOPIFY_API_SECRET".to_string(), "s".to_string()),
        ]));
        let supplied = BTreeMap::from([("SHOPIFY_ACCESS_TOKEN".to_string(), "tok".to_string())]);
        let values = form_values(CredentialGroup::Shopify, &supplied, &current).expect("form");
        assert_eq!(
            values,
            pairs(&[
                ("SHOPIFY_SHOP_URL", "shop.myshopify.com"),
                ("SHOPIFY_API_KEY", ""),
                ("SHOPIFY_API_SECRET", "s"),
                ("SHOPIFY_ACCESS_TOKEN", "tok"),
            ])
        );
    }

    #[test]
    fn form_values_reject_foreign_keys_and_unknown_models() {
        let current = ResolvedSettings::default();
        let foreign = BTreeMap::from([("REDIS_URL".to_string(), "x".to_string())]);
        let error = form_values(CredentialGroup::Openai, &foreign, &current).expect_err("foreign key");
        assert!(error.to_string().contains("CONFIG_INVALID"));

        let model = BTreeMap::from([("OPENAI_MODEL".to_string(), "gpt-2".to_string())]);
        assert!(form_values(CredentialGroup::Openai, &model, &current).is_err());
    }

    #[test]
    fn form_values_reject_multiline_values() {
        let current = ResolvedSettings::default();
        let injected = BTreeMap::from([(
            "REDIS_URL".to_string(),
            "redis://a:6379\nOPENAI_API_KEY=injected".to_string(),
        )]);
        let error = form_values(CredentialGroup::Redis, &injected, &current).expect_err("newline");
        assert!(error.to_string().contains("REDIS_URL"));

        let carriage = BTreeMap::from([("REDIS_PASSWORD".to_string(), "pw\rX=1".to_string())]);
        assert!(form_values(CredentialGroup::Redis, &carriage, &current).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn save_keeps_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let existing = dir.path().join(".env");
        fs::write(&existing, "REDIS_URL=redis://old:6379\n").expect("seed env");
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o600)).expect("chmod");
        save_group(&existing, CredentialGroup::Redis, &pairs(&[("REDIS_URL", "redis://new:6379")])).expect("save");
        let mode = fs::metadata(&existing).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        let fresh = dir.path().join("fresh.env");
        save_group(&fresh, CredentialGroup::Redis, &pairs(&[("REDIS_URL", "x")])).expect("save fresh");
        let mode = fs::metadata(&fresh).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn masked_rows_hide_secrets() {
        let settings = ResolvedSettings::from_entries(parse_entries(
            "GRAPH_API_TOKEN=\"abc\"\nWHATSAPP_PHONE_NUMBER_ID=123\n",
        ));
        let rows = settings.masked_rows(CredentialGroup::Whatsapp);
        assert_eq!(rows[0].2, "*****");
        assert_eq!(rows[1].2, "123");
        assert_eq!(rows[2].2, NOT_CONFIGURED);
        assert!(settings.is_configured(CredentialGroup::Whatsapp));
        assert!(!settings.is_configured(CredentialGroup::Openai));
    }

    #[test]
    fn assignments_require_key_and_equals() {
        let parsed = parse_assignments(&["A=1".to_string(), "B=x=y".to_string()]).expect("parse");
        assert_eq!(parsed.get("B").map(String::as_str), Some("x=y"));
        assert!(parse_assignments(&["novalue".to_string()]).is_err());
        assert!(parse_assignments(&["=v".to_string()]).is_err());
    }
}
