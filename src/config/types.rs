use super::ConfigStore;
use crate::error::{ConfigError, GeneratorError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid tag regex"));

/// Prefix under which the broker API is published; never shared with the application
pub const BROKER_API_PREFIX: &str = "/broker/api/";

/// Base path the application serves itself from inside its container
pub const APP_INTERNAL_PATH: &str = "/guacamole/";

/// Certificate sourcing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    SelfSigned,
    LetsEncrypt,
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "selfsigned" => Ok(SslMode::SelfSigned),
            "letsencrypt" => Ok(SslMode::LetsEncrypt),
            other => Err(format!("expected selfsigned or letsencrypt, got '{other}'")),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SslMode::SelfSigned => write!(f, "selfsigned"),
            SslMode::LetsEncrypt => write!(f, "letsencrypt"),
        }
    }
}

/// TLS protocol/cipher profile of the main proxy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsProfile {
    Modern,
    Intermediate,
}

impl FromStr for TlsProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "modern" => Ok(TlsProfile::Modern),
            "intermediate" => Ok(TlsProfile::Intermediate),
            other => Err(format!("expected modern or intermediate, got '{other}'")),
        }
    }
}

/// External path the application is published under, always `/segment/.../`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePath(String);

impl BasePath {
    /// Adds the missing leading and trailing slashes (`guac` becomes `/guac/`)
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err("path mode needs a non-root base path; use url_mode=root".to_string());
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c == ';' || c == '{' || c == '}') {
            return Err(format!("'{raw}' is not a usable URL path"));
        }
        let path = format!("/{trimmed}/");
        if BROKER_API_PREFIX.starts_with(&path) || path.starts_with(BROKER_API_PREFIX) {
            return Err(format!("'{path}' collides with the broker API prefix"));
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How the application is reached from outside
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exposure {
    Path { base_path: BasePath },
    Root,
    Subdomain { label: String },
}

impl Exposure {
    /// External location of the application; `/` outside path mode
    pub fn base_path(&self) -> &str {
        match self {
            Exposure::Path { base_path } => base_path.as_str(),
            Exposure::Root | Exposure::Subdomain { .. } => "/",
        }
    }

    pub fn url_mode(&self) -> &'static str {
        match self {
            Exposure::Path { .. } => "path",
            Exposure::Root => "root",
            Exposure::Subdomain { .. } => "subdomain",
        }
    }
}

/// Backing images the topology pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Postgres,
    Guacd,
    Guacamole,
    Broker,
    Nginx,
    Certbot,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::Postgres,
        Component::Guacd,
        Component::Guacamole,
        Component::Broker,
        Component::Nginx,
        Component::Certbot,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Component::Postgres => "postgres",
            Component::Guacd => "guacd",
            Component::Guacamole => "guacamole",
            Component::Broker => "broker",
            Component::Nginx => "nginx",
            Component::Certbot => "certbot",
        }
    }

    fn default_image(self) -> &'static str {
        match self {
            Component::Postgres => "postgres",
            Component::Guacd => "guacamole/guacd",
            Component::Guacamole => "guacamole/guacamole",
            Component::Broker => "ghcr.io/maximewewer/guacamole-session-broker",
            Component::Nginx => "nginx",
            Component::Certbot => "certbot/certbot",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageRef {
    pub repository: String,
    pub tag: Option<String>,
}

/// Pinned image references, indexed by [`Component`]
#[derive(Debug, Clone)]
pub struct Images {
    refs: Vec<(Component, ImageRef)>,
}

impl Images {
    /// `repository:tag`, or `MissingVersion` when no tag was pinned
    pub fn reference(&self, component: Component) -> Result<String, GeneratorError> {
        let image = self
            .refs
            .iter()
            .find(|(c, _)| *c == component)
            .map(|(_, image)| image)
            .ok_or_else(|| GeneratorError::MissingVersion(component.key().to_string()))?;
        match &image.tag {
            Some(tag) => Ok(format!("{}:{}", image.repository, tag)),
            None => Err(GeneratorError::MissingVersion(component.key().to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct GuacamoleSettings {
    pub admin_user: String,
    pub admin_password: String,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub api_key: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct SslSettings {
    pub mode: SslMode,
    pub profile: TlsProfile,
    /// Normalized: no scheme, no leading `www.`
    pub domain: Option<String>,
    pub email: Option<String>,
    pub resolver: String,
    pub staging: bool,
}

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub exposure: Exposure,
    pub http_port: u16,
    pub https_port: u16,
}

#[derive(Debug, Clone)]
pub enum VaultAuth {
    Token(String),
    AppRole { role_id: String, secret_id: String },
}

#[derive(Debug, Clone)]
pub struct VaultSettings {
    pub addr: String,
    pub auth: VaultAuth,
    pub mount: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct DockerSettings {
    pub socket: String,
    /// Group owning the runtime socket; resolved per run when not configured
    pub gid: Option<u32>,
}

/// Immutable snapshot of everything a synthesis run reads.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub guacamole: GuacamoleSettings,
    pub broker: BrokerSettings,
    pub ssl: SslSettings,
    pub proxy: ProxySettings,
    pub images: Images,
    /// `Some` only when `vault.enabled` is true
    pub vault: Option<VaultSettings>,
    pub docker: DockerSettings,
}

impl Settings {
    /// Read and validate a snapshot from the configuration document
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        let ssl_mode: SslMode = parse_field(store, "ssl.mode", "selfsigned")?;
        let domain = store
            .get_str("ssl.domain")
            .map(|d| crate::domain::normalize(strip_scheme(d.trim())).to_string())
            .filter(|d| !d.is_empty());
        if ssl_mode == SslMode::LetsEncrypt && domain.is_none() {
            return Err(ConfigError::MissingRequiredField("ssl.domain".to_string()));
        }

        let exposure = match store.get_or_default("nginx.url_mode", "path").as_str() {
            "path" => {
                let raw = store.get_or_default("nginx.base_path", APP_INTERNAL_PATH);
                Exposure::Path {
                    base_path: BasePath::parse(&raw)
                        .map_err(|reason| invalid("nginx.base_path", reason))?,
                }
            }
            "root" => Exposure::Root,
            "subdomain" => {
                let label = store.get_or_default("nginx.subdomain", "guacamole");
                let label = label.trim().trim_end_matches('.').to_string();
                let is_host_char = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.';
                if label.is_empty() || !label.chars().all(is_host_char) {
                    return Err(invalid(
                        "nginx.subdomain",
                        format!("'{label}' is not a host label"),
                    ));
                }
                Exposure::Subdomain { label }
            }
            other => {
                return Err(invalid(
                    "nginx.url_mode",
                    format!("expected path, root or subdomain, got '{other}'"),
                ))
            }
        };

        let docker_gid = match store.get_str("docker.gid") {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| invalid("docker.gid", format!("'{raw}' is not a group id")))?,
            ),
            None => None,
        };

        Ok(Self {
            database: DatabaseSettings {
                host: store.get_or_default("database.host", "postgres"),
                port: parse_field(store, "database.port", "5432")?,
                name: store.get_or_default("database.name", "guacamole"),
                user: store.get_or_default("database.user", "guacamole"),
                password: required(store, "database.password")?,
            },
            guacamole: GuacamoleSettings {
                admin_user: store.get_or_default("guacamole.admin_user", "guacadmin"),
                admin_password: required(store, "guacamole.admin_password")?,
            },
            broker: BrokerSettings {
                api_key: store.get_str("broker.api_key"),
                log_level: store.get_or_default("broker.log_level", "INFO"),
            },
            ssl: SslSettings {
                mode: ssl_mode,
                profile: parse_field(store, "ssl.profile", "intermediate")?,
                domain,
                email: store.get_str("ssl.email"),
                resolver: store.get_or_default("ssl.resolver", "1.1.1.1 8.8.8.8"),
                staging: parse_field(store, "ssl.staging", "false")?,
            },
            proxy: ProxySettings {
                exposure,
                http_port: parse_field(store, "nginx.http_port", "80")?,
                https_port: parse_field(store, "nginx.https_port", "443")?,
            },
            images: read_images(store)?,
            vault: read_vault(store)?,
            docker: DockerSettings {
                socket: store.get_or_default("docker.socket", "/var/run/docker.sock"),
                gid: docker_gid,
            },
        })
    }

    /// Host name the site answers on, when a domain is configured
    pub fn site_domains(&self) -> Option<crate::domain::DomainSet> {
        self.ssl
            .domain
            .as_deref()
            .map(|domain| crate::domain::site_domains(domain, &self.proxy.exposure))
    }

    /// URL users reach the application at through the proxy
    pub fn public_url(&self) -> String {
        let host = self
            .site_domains()
            .map(|set| set.canonical().to_string())
            .unwrap_or_else(|| "localhost".to_string());
        let port = match self.proxy.https_port {
            443 => String::new(),
            other => format!(":{other}"),
        };
        format!("https://{host}{port}{}", self.proxy.exposure.base_path())
    }
}

fn strip_scheme(domain: &str) -> &str {
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain);
    domain.trim_end_matches('/')
}

fn invalid(path: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn required(store: &ConfigStore, path: &str) -> Result<String, ConfigError> {
    store
        .get_str(path)
        .ok_or_else(|| ConfigError::MissingRequiredField(path.to_string()))
}

fn parse_field<T>(store: &ConfigStore, path: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = store.get_or_default(path, default);
    raw.parse().map_err(|e: T::Err| invalid(path, e.to_string()))
}

fn read_images(store: &ConfigStore) -> Result<Images, ConfigError> {
    let mut refs = Vec::with_capacity(Component::ALL.len());
    for component in Component::ALL {
        let tag_path = format!("versions.{}", component.key());
        let tag = store.get_str(&tag_path);
        if let Some(tag) = &tag {
            if !TAG_PATTERN.is_match(tag) {
                return Err(invalid(&tag_path, format!("'{tag}' is not a valid image tag")));
            }
        }
        let repository = store.get_or_default(
            &format!("images.{}", component.key()),
            component.default_image(),
        );
        refs.push((component, ImageRef { repository, tag }));
    }
    Ok(Images { refs })
}

fn read_vault(store: &ConfigStore) -> Result<Option<VaultSettings>, ConfigError> {
    let enabled: bool = parse_field(store, "vault.enabled", "false")?;
    if !enabled {
        return Ok(None);
    }

    let auth = match (store.get_str("vault.role_id"), store.get_str("vault.secret_id")) {
        (Some(role_id), Some(secret_id)) => VaultAuth::AppRole { role_id, secret_id },
        (Some(_), None) => {
            return Err(ConfigError::MissingRequiredField(
                "vault.secret_id".to_string(),
            ))
        }
        _ => VaultAuth::Token(required(store, "vault.token")?),
    };

    Ok(Some(VaultSettings {
        addr: required(store, "vault.addr")?,
        auth,
        mount: store.get_or_default("vault.mount", "secret"),
        path: store.get_or_default("vault.path", "guacamole/broker"),
    }))
}
