use crate::error::{Result, Sift365Error};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Risk point values awarded per finding type.
///
/// These are the fixed contributions each evidence item adds to a subject's
/// risk score. Tenants can tune them in sift365.toml but the defaults match
/// the scoring contract the reports are calibrated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    #[serde(default = "default_unusual_signin")]
    pub unusual_signin: i64,

    #[serde(default = "default_high_risk_signin")]
    pub high_risk_signin: i64,

    #[serde(default = "default_high_risk_admin_op")]
    pub high_risk_admin_op: i64,

    #[serde(default = "default_suspicious_inbox_rule")]
    pub suspicious_inbox_rule: i64,

    #[serde(default = "default_suspicious_delegation")]
    pub suspicious_delegation: i64,

    #[serde(default = "default_high_risk_app")]
    pub high_risk_app: i64,
}

fn default_unusual_signin() -> i64 {
    5
}
fn default_high_risk_signin() -> i64 {
    15
}
fn default_high_risk_admin_op() -> i64 {
    10
}
fn default_suspicious_inbox_rule() -> i64 {
    15
}
fn default_suspicious_delegation() -> i64 {
    8
}
fn default_high_risk_app() -> i64 {
    20
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            unusual_signin: default_unusual_signin(),
            high_risk_signin: default_high_risk_signin(),
            high_risk_admin_op: default_high_risk_admin_op(),
            suspicious_inbox_rule: default_suspicious_inbox_rule(),
            suspicious_delegation: default_suspicious_delegation(),
            high_risk_app: default_high_risk_app(),
        }
    }
}

/// Inclusive lower bounds for each risk tier. Score 50 is Critical, 49 is High.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_critical")]
    pub critical: i64,

    #[serde(default = "default_high")]
    pub high: i64,

    #[serde(default = "default_medium")]
    pub medium: i64,
}

fn default_critical() -> i64 {
    50
}
fn default_high() -> i64 {
    30
}
fn default_medium() -> i64 {
    15
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            critical: default_critical(),
            high: default_high(),
            medium: default_medium(),
        }
    }
}

/// Thresholds for the mail-trace (ETR) spam pattern passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamThresholds {
    /// Pass 1: per-sender outbound volume above this is flagged.
    #[serde(default = "default_max_messages_per_sender")]
    pub max_messages_per_sender: usize,

    /// Pass 2: identical-subject groups at or above this count are flagged.
    #[serde(default = "default_max_same_subject")]
    pub max_same_subject_messages: usize,

    /// Pass 2: subjects shorter than this (after trim) are ignored.
    #[serde(default = "default_min_subject_length")]
    pub min_subject_length: usize,

    /// Pass 3: keyword pass only runs when total matches exceed this.
    #[serde(default = "default_keyword_total_gate")]
    pub keyword_total_gate: usize,

    /// Pass 3: senders with more matching messages than this are flagged.
    #[serde(default = "default_keyword_per_sender")]
    pub keyword_per_sender: usize,

    /// Pass 5: senders with more failed deliveries than this are flagged.
    #[serde(default = "default_max_failed_deliveries")]
    pub max_failed_deliveries: usize,

    /// Pass 3: subjects are matched case-insensitively against these.
    #[serde(default = "default_spam_keywords")]
    pub keywords: Vec<String>,
}

fn default_max_messages_per_sender() -> usize {
    200
}
fn default_max_same_subject() -> usize {
    50
}
fn default_min_subject_length() -> usize {
    5
}
fn default_keyword_total_gate() -> usize {
    5
}
fn default_keyword_per_sender() -> usize {
    3
}
fn default_max_failed_deliveries() -> usize {
    10
}

fn default_spam_keywords() -> Vec<String> {
    [
        "bitcoin",
        "crypto",
        "invoice",
        "urgent",
        "payment",
        "wire transfer",
        "lottery",
        "winner",
        "prince",
        "inheritance",
        "viagra",
        "pharmacy",
        "act now",
        "limited time",
        "click here",
        "verify your account",
        "password expire",
        "unclaimed",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SpamThresholds {
    fn default() -> Self {
        Self {
            max_messages_per_sender: default_max_messages_per_sender(),
            max_same_subject_messages: default_max_same_subject(),
            min_subject_length: default_min_subject_length(),
            keyword_total_gate: default_keyword_total_gate(),
            keyword_per_sender: default_keyword_per_sender(),
            max_failed_deliveries: default_max_failed_deliveries(),
            keywords: default_spam_keywords(),
        }
    }
}

/// Settings for the IP geolocation enrichment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoSettings {
    /// Cache entries older than this are lazily evicted on next lookup.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Lookup endpoint; `{ip}` is substituted with the address.
    #[serde(default = "default_geo_endpoint")]
    pub endpoint: String,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_geo_endpoint() -> String {
    "http://ip-api.com/json/{ip}".to_string()
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            endpoint: default_geo_endpoint(),
        }
    }
}

/// Immutable analysis configuration passed into every extractor and the
/// aggregator. Loaded once per run; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub weights: RiskWeights,

    #[serde(default)]
    pub tiers: TierThresholds,

    #[serde(default)]
    pub spam: SpamThresholds,

    #[serde(default)]
    pub geo: GeoSettings,

    /// Countries considered expected sign-in locations. Sign-ins from any
    /// other country are "unusual". Comparison is case-insensitive.
    #[serde(default = "default_allowed_countries")]
    pub allowed_countries: Vec<String>,

    /// The tenant's *.onmicrosoft.com domain, e.g. "contoso.onmicrosoft.com".
    #[serde(default)]
    pub onmicrosoft_domain: String,

    /// The tenant's primary verified domain, e.g. "contoso.com".
    #[serde(default)]
    pub primary_domain: String,

    /// Graph permission IDs treated as high-risk when required by an app.
    #[serde(default = "default_high_risk_permission_ids")]
    pub high_risk_permission_ids: Vec<String>,
}

fn default_allowed_countries() -> Vec<String> {
    vec!["United States".to_string(), "Canada".to_string()]
}

/// Application permissions that grant broad mail/directory control.
fn default_high_risk_permission_ids() -> Vec<String> {
    [
        // Mail.ReadWrite
        "e2a3a72e-5f79-4c64-b1b1-878b674786c9",
        // Mail.Send
        "b633e1c5-b582-4048-a93e-9f11b44c7e96",
        // MailboxSettings.ReadWrite
        "6931bccd-447a-43d1-b442-00a195474933",
        // Directory.ReadWrite.All
        "19dbc75e-c2e2-444c-a770-ec69d8559fc7",
        // RoleManagement.ReadWrite.Directory
        "9e3f62cf-ca93-4989-b6ce-bf83c28f9fe8",
        // AppRoleAssignment.ReadWrite.All
        "06b708a9-e830-4db3-a914-8e69da51d44f",
        // User.ReadWrite.All
        "741f803b-c850-494e-b5df-cde7c675a1ca",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            tiers: TierThresholds::default(),
            spam: SpamThresholds::default(),
            geo: GeoSettings::default(),
            allowed_countries: default_allowed_countries(),
            onmicrosoft_domain: String::new(),
            primary_domain: String::new(),
            high_risk_permission_ids: default_high_risk_permission_ids(),
        }
    }
}

/// Resolves and loads the analysis configuration.
///
/// Lookup order: explicit `--config` path, then the per-user config
/// directory, then built-in defaults.
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "sift365", "sift365").ok_or_else(|| {
            Sift365Error::ConfigError("Failed to determine config directory".into())
        })?;

        let config_dir = project_dirs.config_dir().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        Ok(Self { config_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("sift365.toml")
    }

    /// Load the analysis config, falling back to defaults when no file exists.
    pub fn load(&self, override_path: Option<&Path>) -> Result<AnalysisConfig> {
        let path = match override_path {
            Some(p) => {
                if !p.exists() {
                    return Err(Sift365Error::ConfigError(format!(
                        "Config file not found: {}",
                        p.display()
                    )));
                }
                p.to_path_buf()
            }
            None => {
                let default_path = self.config_file();
                if !default_path.exists() {
                    return Ok(AnalysisConfig::default());
                }
                default_path
            }
        };

        let contents = fs::read_to_string(&path)?;
        let config: AnalysisConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write the default config to the user config directory.
    pub fn init(&self, force: bool) -> Result<PathBuf> {
        let path = self.config_file();

        if path.exists() && !force {
            return Err(Sift365Error::ConfigError(format!(
                "Config already exists at {} (use --force to overwrite)",
                path.display()
            )));
        }

        let contents = toml::to_string_pretty(&AnalysisConfig::default())
            .map_err(|e| Sift365Error::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(&path, contents)?;
        Ok(path)
    }
}

impl AnalysisConfig {
    /// True when the country is on the expected-locations allow-list.
    pub fn is_allowed_country(&self, country: &str) -> bool {
        let country = country.trim();
        if country.is_empty() {
            return false;
        }
        self.allowed_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country))
    }

    /// True when the email domain belongs to this tenant.
    pub fn is_tenant_domain(&self, domain: &str) -> bool {
        let domain = domain.trim();
        if domain.is_empty() {
            return false;
        }
        (!self.onmicrosoft_domain.is_empty()
            && domain.eq_ignore_ascii_case(&self.onmicrosoft_domain))
            || (!self.primary_domain.is_empty() && domain.eq_ignore_ascii_case(&self.primary_domain))
    }
}
