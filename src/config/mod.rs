use crate::error::{Offboard365Error, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub log_level: String,

    #[serde(default)]
    pub current_tenant: Option<String>,

    #[serde(default)]
    pub offboarding: OffboardingDefaults,
}

/// Defaults applied to every offboarding run unless overridden on the command line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffboardingDefaults {
    pub shared_mailbox_expiry_days: u32,

    /// Mailbox custom attribute that receives the expiry marker
    pub expiry_attribute: String,

    /// Holding OU for on-premises accounts
    pub holding_ou: Option<String>,

    /// Root folder for run artifacts
    pub output_root: Option<PathBuf>,
}

impl Default for OffboardingDefaults {
    fn default() -> Self {
        Self {
            shared_mailbox_expiry_days: 180,
            expiry_attribute: "CustomAttribute1".to_string(),
            holding_ou: None,
            output_root: None,
        }
    }
}

impl OffboardingDefaults {
    /// Root for timestamped output folders: the configured root, else
    /// `Documents/Offboarding` (falling back to the home directory).
    pub fn resolved_output_root(&self) -> PathBuf {
        if let Some(root) = &self.output_root {
            return root.clone();
        }

        UserDirs::new()
            .map(|dirs| {
                dirs.document_dir()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| dirs.home_dir().to_path_buf())
            })
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Offboarding")
    }
}

/// Tenant-specific configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TenantConfig {
    pub name: String,
    pub tenant_id: String,
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Primary tenant domain (contoso.onmicrosoft.com), used to anchor Exchange requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// API surfaces that need their own access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Graph,
    Exchange,
}

impl Resource {
    pub fn scope(&self) -> &'static str {
        match self {
            Resource::Graph => "https://graph.microsoft.com/.default",
            Resource::Exchange => "https://outlook.office365.com/.default",
        }
    }

    fn cache_suffix(&self) -> &'static str {
        match self {
            Resource::Graph => "graph",
            Resource::Exchange => "exchange",
        }
    }
}

/// Token cache structure
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub tenant_id: String,
}

/// Configuration manager
#[derive(Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "offboard365", "offboard365").ok_or_else(|| {
            Offboard365Error::ConfigError("Failed to determine config directory".into())
        })?;

        Self::at(project_dirs.config_dir())
    }

    /// Use an explicit configuration directory
    pub fn at(dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = dir.into();
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }
        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn tenants_file(&self) -> PathBuf {
        self.config_dir.join("tenants.toml")
    }

    pub fn token_cache_file(&self, tenant_name: &str, resource: Resource) -> PathBuf {
        self.config_dir
            .join("cache")
            .join(format!("{}.{}.token", tenant_name, resource.cache_suffix()))
    }

    /// Load main config
    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save main config
    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config).map_err(|e| {
            Offboard365Error::ConfigError(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    /// Load all tenants
    pub fn load_tenants(&self) -> Result<Vec<TenantConfig>> {
        let tenants_path = self.tenants_file();

        if !tenants_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(tenants_path)?;

        #[derive(Deserialize)]
        struct TenantsFile {
            tenants: Vec<TenantConfig>,
        }

        let file: TenantsFile = toml::from_str(&contents)?;
        Ok(file.tenants)
    }

    /// Save all tenants
    pub fn save_tenants(&self, tenants: &[TenantConfig]) -> Result<()> {
        #[derive(Serialize)]
        struct TenantsFile<'a> {
            tenants: &'a [TenantConfig],
        }

        let contents = toml::to_string_pretty(&TenantsFile { tenants }).map_err(|e| {
            Offboard365Error::ConfigError(format!("Failed to serialize tenants: {}", e))
        })?;
        fs::write(self.tenants_file(), contents)?;
        Ok(())
    }

    /// Add or update tenant
    pub fn add_tenant(&self, tenant: TenantConfig) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        tenants.retain(|t| t.name != tenant.name);
        tenants.push(tenant);
        self.save_tenants(&tenants)
    }

    /// Get tenant by name
    pub fn get_tenant(&self, name: &str) -> Result<TenantConfig> {
        self.load_tenants()?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Offboard365Error::TenantNotFound(name.to_string()))
    }

    /// Resolve the tenant for a run: explicit hint first, then the active tenant
    pub fn resolve_tenant(&self, hint: Option<&str>) -> Result<TenantConfig> {
        if let Some(name) = hint {
            return self.get_tenant_or_env(name);
        }

        let config = self.load_config()?;
        match config.current_tenant {
            Some(name) => self.get_tenant_or_env(&name),
            None => Err(Offboard365Error::ConfigError(
                "No active tenant. Pass --tenant or run 'offboard365 tenant switch <name>'".into(),
            )),
        }
    }

    pub fn save_token(&self, tenant_name: &str, resource: Resource, token: &TokenCache) -> Result<()> {
        let cache_dir = self.config_dir.join("cache");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        let contents = serde_json::to_string_pretty(token)?;
        fs::write(self.token_cache_file(tenant_name, resource), contents)?;
        Ok(())
    }

    /// Load a cached token; expired tokens are reported as `AuthError`
    pub fn load_token(&self, tenant_name: &str, resource: Resource) -> Result<TokenCache> {
        let token_path = self.token_cache_file(tenant_name, resource);

        if !token_path.exists() {
            return Err(Offboard365Error::TokenNotFound);
        }

        let contents = fs::read_to_string(token_path)?;
        let token: TokenCache = serde_json::from_str(&contents)?;

        if token.expires_at < chrono::Utc::now() {
            return Err(Offboard365Error::AuthError("Token expired".into()));
        }

        Ok(token)
    }

    pub fn delete_tokens(&self, tenant_name: &str) -> Result<()> {
        for resource in [Resource::Graph, Resource::Exchange] {
            let token_path = self.token_cache_file(tenant_name, resource);
            if token_path.exists() {
                fs::remove_file(token_path)?;
            }
        }
        Ok(())
    }

    /// Set the active tenant
    pub fn set_active_tenant(&self, tenant_name: &str) -> Result<()> {
        let tenant = self.get_tenant(tenant_name)?;

        let mut config = self.load_config()?;
        config.current_tenant = Some(tenant.name);
        self.save_config(&config)
    }

    /// Remove a tenant by name
    pub fn remove_tenant(&self, tenant_name: &str) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        let original_len = tenants.len();
        tenants.retain(|t| !t.name.eq_ignore_ascii_case(tenant_name));

        if tenants.len() == original_len {
            return Err(Offboard365Error::TenantNotFound(tenant_name.to_string()));
        }

        self.save_tenants(&tenants)?;
        let _ = self.delete_tokens(tenant_name);

        let mut config = self.load_config()?;
        if config
            .current_tenant
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(tenant_name))
        {
            config.current_tenant = None;
            self.save_config(&config)?;
        }

        Ok(())
    }

    /// Load tenant from `<name>.env` (or `.env`) in the config directory
    ///
    /// ```text
    /// TENANT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_SECRET=your-secret-here
    /// ORGANIZATION=contoso.onmicrosoft.com
    /// ```
    pub fn load_env_file(&self, name: &str) -> Result<Option<TenantConfig>> {
        let env_path = self.config_dir.join(format!("{}.env", name.to_lowercase()));
        let fallback_path = self.config_dir.join(".env");

        let path = if env_path.exists() {
            env_path
        } else if fallback_path.exists() {
            fallback_path
        } else {
            return Ok(None);
        };

        let contents = fs::read_to_string(&path)?;
        let vars = parse_env_lines(contents.lines().map(str::trim));
        Ok(vars_to_tenant(name, &vars))
    }

    /// Load all tenants from a sectioned `tenants.env`
    ///
    /// ```text
    /// [CONTOSO]
    /// NAME=Contoso Ltd
    /// TENANT_ID=...
    /// CLIENT_ID=...
    /// CLIENT_SECRET=...
    /// ```
    pub fn load_tenants_env(&self) -> Result<Vec<TenantConfig>> {
        let env_path = self.config_dir.join("tenants.env");

        if !env_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&env_path)?;
        let mut tenants = Vec::new();
        let mut current_section: Option<String> = None;
        let mut section_lines: Vec<&str> = Vec::new();

        for line in contents.lines().map(str::trim) {
            if line.starts_with('[') && line.ends_with(']') {
                if let Some(abbrev) = current_section.take() {
                    let vars = parse_env_lines(section_lines.drain(..));
                    tenants.extend(vars_to_tenant(&abbrev, &vars));
                }
                current_section = Some(line[1..line.len() - 1].to_string());
                continue;
            }
            section_lines.push(line);
        }

        if let Some(abbrev) = current_section {
            let vars = parse_env_lines(section_lines.into_iter());
            tenants.extend(vars_to_tenant(&abbrev, &vars));
        }

        Ok(tenants)
    }

    /// Get tenant by name, checking env files when it is not yet in tenants.toml
    pub fn get_tenant_or_env(&self, name: &str) -> Result<TenantConfig> {
        if let Ok(tenant) = self.get_tenant(name) {
            return Ok(tenant);
        }

        if let Some(tenant) = self
            .load_tenants_env()?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
        {
            self.add_tenant(tenant.clone())?;
            return Ok(tenant);
        }

        if let Some(tenant) = self.load_env_file(name)? {
            self.add_tenant(tenant.clone())?;
            return Ok(tenant);
        }

        Err(Offboard365Error::TenantNotFound(name.to_string()))
    }
}

/// Parse `KEY=VALUE` lines, skipping blanks and comments; keys are upper-cased
fn parse_env_lines<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in lines {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            let value = if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                &value[1..value.len() - 1]
            } else {
                value
            };
            vars.insert(key.trim().to_uppercase(), value.to_string());
        }
    }

    vars
}

fn vars_to_tenant(abbrev: &str, vars: &HashMap<String, String>) -> Option<TenantConfig> {
    Some(TenantConfig {
        name: abbrev.to_uppercase(),
        tenant_id: vars.get("TENANT_ID")?.clone(),
        client_id: vars.get("CLIENT_ID")?.clone(),
        client_secret: vars.get("CLIENT_SECRET").cloned(),
        organization: vars.get("ORGANIZATION").cloned(),
        description: vars.get("NAME").or_else(|| vars.get("DESCRIPTION")).cloned(),
    })
}
