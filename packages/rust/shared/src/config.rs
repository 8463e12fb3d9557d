//! Application configuration for FeedBuilder.
//!
//! Settings live in `feedbuilder.toml` in the working directory (or the path
//! given with `--config`). Environment overrides for the filter and pricing
//! knobs are applied on top; FTP credentials only ever come from the
//! environment or CLI flags.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FeedBuilderError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "feedbuilder.toml";

/// Default FTP control port.
pub const DEFAULT_FTP_PORT: u16 = 21;

// ---------------------------------------------------------------------------
// Config structs (matching feedbuilder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote server settings (credentials excluded).
    #[serde(default)]
    pub ftp: FtpConfig,

    /// Which files to fetch and where the rule lists live.
    #[serde(default)]
    pub input: InputConfig,

    /// Vendor XML layout.
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Product selection rules.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Sell-price model.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Published artifacts.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[ftp]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtpConfig {
    /// Remote directory holding the vendor XML files.
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// Connect and read timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Use passive data connections.
    #[serde(default = "default_true")]
    pub passive: bool,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            remote_dir: default_remote_dir(),
            timeout_secs: default_timeout_secs(),
            passive: true,
        }
    }
}

fn default_remote_dir() -> String {
    "/files/products/xml/standard".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// `[input]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// File listing the remote XML names, one per line (`#` comments allowed).
    #[serde(default = "default_list_file")]
    pub list_file: String,

    /// Directory holding `allow_categories.txt`, `deny_keywords.txt`, `allow_brands.txt`.
    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,

    /// Log and skip files that fail to download or parse instead of aborting.
    #[serde(default)]
    pub skip_failed_files: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            list_file: default_list_file(),
            rules_dir: default_rules_dir(),
            skip_failed_files: false,
        }
    }
}

fn default_list_file() -> String {
    "products_list.txt".into()
}
fn default_rules_dir() -> String {
    ".".into()
}

/// `[schema]` section: how a vendor document lays out its products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Element name of one product, matched at any depth.
    #[serde(default = "default_item_tag")]
    pub item_tag: String,

    /// Child elements to extract, in output column order.
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,

    /// Fields that must be non-blank for a product to be kept.
    #[serde(default = "default_required")]
    pub required: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            item_tag: default_item_tag(),
            fields: default_fields(),
            required: default_required(),
        }
    }
}

fn default_item_tag() -> String {
    "product".into()
}
fn default_fields() -> Vec<String> {
    [
        "id",
        "name",
        "description",
        "price",
        "pvd",
        "ean13",
        "stock",
        "image1",
        "category",
        "brand",
        "date_upd",
        "width",
        "height",
        "depth",
        "weight",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_required() -> Vec<String> {
    ["id", "name", "price", "stock"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[filters]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// When false every extracted product is published, in source order.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_min_price")]
    pub min_price: f64,

    #[serde(default = "default_max_price")]
    pub max_price: f64,

    #[serde(default = "default_min_stock")]
    pub min_stock: i64,

    /// Maximum weight in kg; products without a weight pass.
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,

    /// Products updated longer ago than this (months of 30 days) are dropped.
    #[serde(default = "default_recent_months")]
    pub recent_months: i64,

    /// Cap on published products after sorting; 0 means no cap.
    #[serde(default = "default_max_products")]
    pub max_products: usize,

    #[serde(default = "default_true")]
    pub require_ean: bool,

    #[serde(default = "default_true")]
    pub require_image: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_price: default_min_price(),
            max_price: default_max_price(),
            min_stock: default_min_stock(),
            max_weight: default_max_weight(),
            recent_months: default_recent_months(),
            max_products: default_max_products(),
            require_ean: true,
            require_image: true,
        }
    }
}

fn default_min_price() -> f64 {
    10.0
}
fn default_max_price() -> f64 {
    80.0
}
fn default_min_stock() -> i64 {
    1
}
fn default_max_weight() -> f64 {
    8.0
}
fn default_recent_months() -> i64 {
    18
}
fn default_max_products() -> usize {
    5000
}

/// `[pricing]` section. Percentages are whole numbers (21.0 = 21 %).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Emit the derived pricing columns.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_vat_pct")]
    pub vat_pct: f64,

    #[serde(default)]
    pub ship_cost_eur: f64,

    /// Marketplace commission.
    #[serde(default = "default_fee_pct")]
    pub fee_pct: f64,

    /// Marketplace fixed fee per sale.
    #[serde(default = "default_fee_fixed")]
    pub fee_fixed: f64,

    #[serde(default = "default_min_profit_eur")]
    pub min_profit_eur: f64,

    #[serde(default = "default_min_margin_pct")]
    pub min_margin_pct: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vat_pct: default_vat_pct(),
            ship_cost_eur: 0.0,
            fee_pct: default_fee_pct(),
            fee_fixed: default_fee_fixed(),
            min_profit_eur: default_min_profit_eur(),
            min_margin_pct: default_min_margin_pct(),
        }
    }
}

fn default_vat_pct() -> f64 {
    21.0
}
fn default_fee_pct() -> f64 {
    12.0
}
fn default_fee_fixed() -> f64 {
    0.3
}
fn default_min_profit_eur() -> f64 {
    3.0
}
fn default_min_margin_pct() -> f64 {
    15.0
}

/// `[output]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Web-servable directory receiving the artifacts.
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Root element of `feed.xml`.
    #[serde(default = "default_feed_root")]
    pub feed_root: String,

    /// Element wrapping one product in `feed.xml`.
    #[serde(default = "default_feed_item")]
    pub feed_item: String,

    /// Add the spreadsheet review columns (`Keep?`, `image_preview`) to the preview CSV.
    #[serde(default = "default_true")]
    pub review_columns: bool,

    /// Also write `catalog_light.csv`.
    #[serde(default = "default_true")]
    pub light_csv: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            feed_root: default_feed_root(),
            feed_item: default_feed_item(),
            review_columns: true,
            light_csv: true,
        }
    }
}

fn default_output_dir() -> String {
    "public".into()
}
fn default_feed_root() -> String {
    "catalog".into()
}
fn default_feed_item() -> String {
    "item".into()
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply `MIN_PRICE`, `VAT_PCT`, … from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are
    /// ignored with a warning and the configured value is kept.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let filters = &mut self.filters;
        override_value(&lookup, "MIN_PRICE", &mut filters.min_price);
        override_value(&lookup, "MAX_PRICE", &mut filters.max_price);
        override_value(&lookup, "MIN_STOCK", &mut filters.min_stock);
        override_value(&lookup, "MAX_WEIGHT", &mut filters.max_weight);
        override_value(&lookup, "RECENT_MONTHS", &mut filters.recent_months);
        override_value(&lookup, "MAX_PRODUCTS", &mut filters.max_products);

        let pricing = &mut self.pricing;
        override_value(&lookup, "VAT_PCT", &mut pricing.vat_pct);
        override_value(&lookup, "SHIP_COST_EUR", &mut pricing.ship_cost_eur);
        override_value(&lookup, "BOL_FEE_PCT", &mut pricing.fee_pct);
        override_value(&lookup, "BOL_FEE_FIXED", &mut pricing.fee_fixed);
        override_value(&lookup, "MIN_PROFIT_EUR", &mut pricing.min_profit_eur);
        override_value(&lookup, "MIN_MARGIN_PCT", &mut pricing.min_margin_pct);
    }
}

fn override_value<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T)
where
    T: std::str::FromStr + fmt::Debug,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => {
            debug!(name, ?value, "config override from environment");
            *target = value;
        }
        Err(_) => warn!(name, raw = %raw, "ignoring unparseable environment override"),
    }
}

// ---------------------------------------------------------------------------
// FTP credentials
// ---------------------------------------------------------------------------

/// Static FTP credentials. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct FtpCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl FtpCredentials {
    /// Build credentials from `host`, `host:port`, a bare IPv6 address or
    /// `[ipv6]:port`.
    pub fn new(
        host_spec: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        let host_spec = required("BB_HOST", host_spec)?;
        let user = required("BB_USER", user)?;
        let password = required("BB_PASS", password)?;

        let (host, port) = split_host_port(host_spec)?;

        Ok(Self {
            host,
            port,
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// `host:port` for socket resolution. IPv6 hosts are bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for FtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Split `BB_HOST` into host and port. Only a bracketed IPv6 host may carry
/// a port; an unbracketed value with several colons is a bare IPv6 address.
fn split_host_port(spec: &str) -> Result<(String, u16)> {
    let invalid = || FeedBuilderError::config(format!("invalid port in BB_HOST '{spec}'"));

    if let Some(rest) = spec.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| FeedBuilderError::config(format!("unclosed '[' in BB_HOST '{spec}'")))?;
        let port = match tail {
            "" => DEFAULT_FTP_PORT,
            _ => tail
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(invalid)?,
        };
        return Ok((host.to_string(), port));
    }

    match spec.split_once(':') {
        Some((host, port)) if !port.contains(':') => {
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            Ok((host.to_string(), port))
        }
        _ => Ok((spec.to_string(), DEFAULT_FTP_PORT)),
    }
}

fn required<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FeedBuilderError::config(format!(
            "{name} is not set. Provide it via the environment or the matching CLI flag."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the config. An explicit path must exist; otherwise `feedbuilder.toml`
/// in the working directory is used when present, defaults when not.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match explicit {
        Some(path) => load_config_from(path),
        None => {
            let path = PathBuf::from(CONFIG_FILE_NAME);
            if !path.exists() {
                debug!(?path, "config file not found, using defaults");
                return Ok(AppConfig::default());
            }
            load_config_from(&path)
        }
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FeedBuilderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        FeedBuilderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default config file into `dir`. Refuses to overwrite an existing one.
pub fn init_config(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(FeedBuilderError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| FeedBuilderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FeedBuilderError::write(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

// ---------------------------------------------------------------------------
// Line-list files
// ---------------------------------------------------------------------------

/// Read a line list: trimmed, non-blank lines that do not start with `#`.
pub fn read_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| FeedBuilderError::io(path, e))?;
    Ok(parse_list(&content))
}

/// Like [`read_list`], but a missing file is an empty list.
pub fn read_optional_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_list(path)
}

fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}
