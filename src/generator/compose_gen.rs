//! # Compose Generator
//!
//! Builds the container topology as typed structs and serializes it to YAML.
//! Service order, dependency edges and networks are fixed; what varies with the
//! configuration is the TLS material mounted into the proxy, the optional
//! certificate renewal service and the broker's secret-manager block.

use super::{layout, services};
use crate::config::types::{Component, Settings, SslMode, VaultAuth, APP_INTERNAL_PATH};
use crate::error::{ConfigError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Address block of the network session containers are spawned on
pub const VNC_SUBNET: &str = "172.30.0.0/16";

const INTERNAL_NET: &str = "internal";
const FRONTEND_NET: &str = "frontend";
const VNC_NET: &str = "vnc-network";

const POSTGRES_VOLUME: &str = "postgres_data";
const PROFILES_VOLUME: &str = "user_profiles";
const RECORDINGS_VOLUME: &str = "recordings";

#[derive(Debug, Serialize)]
pub struct ComposeFile {
    pub name: String,
    pub services: Services,
    pub networks: Networks,
    pub volumes: Volumes,
}

/// Fixed service set, serialized in dependency order
#[derive(Debug, Serialize)]
pub struct Services {
    pub postgres: Service,
    pub guacd: Service,
    pub guacamole: Service,
    #[serde(rename = "session-broker")]
    pub session_broker: Service,
    pub nginx: Service,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certbot: Option<Service>,
}

#[derive(Debug, Serialize)]
pub struct Service {
    pub image: String,
    pub restart: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_add: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    pub networks: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub depends_on: BTreeMap<String, DependsOn>,
    pub healthcheck: HealthCheck,
    pub logging: Logging,
}

#[derive(Debug, Serialize)]
pub struct DependsOn {
    pub condition: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub test: Vec<String>,
    pub interval: &'static str,
    pub timeout: &'static str,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_period: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct Logging {
    pub driver: &'static str,
    pub options: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
pub struct Networks {
    pub internal: Network,
    pub frontend: Network,
    #[serde(rename = "vnc-network")]
    pub vnc_network: Network,
}

#[derive(Debug, Default, Serialize)]
pub struct Network {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub driver: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub internal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
}

#[derive(Debug, Serialize)]
pub struct Ipam {
    pub config: Vec<IpamPool>,
}

#[derive(Debug, Serialize)]
pub struct IpamPool {
    pub subnet: String,
}

#[derive(Debug, Serialize)]
pub struct Volumes {
    pub postgres_data: Volume,
    pub user_profiles: Volume,
    pub recordings: Volume,
}

#[derive(Debug, Default, Serialize)]
pub struct Volume {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Escape `$` so compose interpolation leaves the value as written
pub fn compose_escape(value: &str) -> String {
    value.replace('$', "$$")
}

impl Service {
    fn new(image: String, networks: &[&str], healthcheck: HealthCheck) -> Self {
        Self {
            image: compose_escape(&image),
            restart: "unless-stopped",
            entrypoint: None,
            cap_add: Vec::new(),
            group_add: Vec::new(),
            environment: BTreeMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            networks: networks.iter().map(|n| n.to_string()).collect(),
            depends_on: BTreeMap::new(),
            healthcheck,
            logging: Logging::bounded(),
        }
    }

    fn env(mut self, pairs: impl IntoIterator<Item = (&'static str, String)>) -> Self {
        self.environment
            .extend(pairs.into_iter().map(|(k, v)| (k.to_string(), compose_escape(&v))));
        self
    }

    fn volumes(mut self, volumes: impl IntoIterator<Item = String>) -> Self {
        self.volumes.extend(volumes.into_iter().map(|v| compose_escape(&v)));
        self
    }

    /// Start only once each of `services` reports healthy
    fn after_healthy(mut self, services: &[&str]) -> Self {
        for name in services {
            self.depends_on.insert(
                name.to_string(),
                DependsOn {
                    condition: "service_healthy",
                },
            );
        }
        self
    }
}

impl HealthCheck {
    fn new(test: &[&str]) -> Self {
        Self {
            test: test.iter().map(|s| compose_escape(s)).collect(),
            interval: "10s",
            timeout: "5s",
            retries: 5,
            start_period: None,
        }
    }

    fn shell(command: String) -> Self {
        Self {
            test: vec!["CMD-SHELL".to_string(), compose_escape(&command)],
            ..Self::new(&[])
        }
    }

    fn start_period(mut self, period: &'static str) -> Self {
        self.start_period = Some(period);
        self
    }
}

impl Logging {
    fn bounded() -> Self {
        Self {
            driver: "json-file",
            options: BTreeMap::from([("max-size", "10m"), ("max-file", "3")]),
        }
    }
}

/// Name the runtime gives the session network; the broker attaches spawned containers to it
pub fn vnc_network_name() -> String {
    format!("{}_{}", services::PROJECT, VNC_NET)
}

/// Name of the volume holding per-user profile data
pub fn profiles_volume_name() -> String {
    format!("{}_{}", services::PROJECT, PROFILES_VOLUME)
}

/// Build the full topology for a settings snapshot
pub fn build(settings: &Settings) -> Result<ComposeFile> {
    let images = &settings.images;
    let db = &settings.database;

    let postgres = Service::new(
        images.reference(Component::Postgres)?,
        &[INTERNAL_NET],
        HealthCheck::shell(format!("pg_isready -U {} -d {}", db.user, db.name)),
    )
    .env([
        ("POSTGRES_DB", db.name.clone()),
        ("POSTGRES_USER", db.user.clone()),
        ("POSTGRES_PASSWORD", db.password.clone()),
    ])
    .volumes([
        format!("{POSTGRES_VOLUME}:/var/lib/postgresql/data"),
        format!("./{}:/docker-entrypoint-initdb.d:ro", layout::INIT_DIR),
    ]);

    let mut guacd = Service::new(
        images.reference(Component::Guacd)?,
        &[INTERNAL_NET, VNC_NET],
        HealthCheck::shell(format!("nc -z 127.0.0.1 {} || exit 1", services::GUACD_PORT)),
    )
    .volumes([format!("{RECORDINGS_VOLUME}:/recordings")])
    .after_healthy(&[services::POSTGRES]);
    guacd.cap_add.push("NET_ADMIN".to_string());

    let guacamole = Service::new(
        images.reference(Component::Guacamole)?,
        &[INTERNAL_NET],
        HealthCheck::shell(format!(
            "curl -fsS http://localhost:{}{} > /dev/null || exit 1",
            services::GUACAMOLE_PORT,
            APP_INTERNAL_PATH
        ))
        .start_period("30s"),
    )
    .env([
        ("GUACD_HOSTNAME", services::GUACD.to_string()),
        ("GUACD_PORT", services::GUACD_PORT.to_string()),
        ("POSTGRESQL_HOSTNAME", db.host.clone()),
        ("POSTGRESQL_PORT", db.port.to_string()),
        ("POSTGRESQL_DATABASE", db.name.clone()),
        ("POSTGRESQL_USER", db.user.clone()),
        ("POSTGRESQL_PASSWORD", db.password.clone()),
        ("RECORDING_SEARCH_PATH", "/recordings".to_string()),
        ("REMOTE_IP_VALVE_ENABLED", "true".to_string()),
    ])
    .volumes([format!("{RECORDINGS_VOLUME}:/recordings:ro")])
    .after_healthy(&[services::POSTGRES, services::GUACD]);

    let session_broker = broker_service(settings)?;
    let nginx = proxy_service(settings)?;

    let certbot = match settings.ssl.mode {
        SslMode::SelfSigned => None,
        SslMode::LetsEncrypt => Some(renewal_service(settings)?),
    };

    Ok(ComposeFile {
        name: services::PROJECT.to_string(),
        services: Services {
            postgres,
            guacd,
            guacamole,
            session_broker,
            nginx,
            certbot,
        },
        networks: Networks {
            internal: Network {
                driver: "bridge",
                internal: true,
                ..Network::default()
            },
            frontend: Network {
                driver: "bridge",
                ..Network::default()
            },
            vnc_network: Network {
                name: Some(vnc_network_name()),
                driver: "bridge",
                internal: false,
                ipam: Some(Ipam {
                    config: vec![IpamPool {
                        subnet: VNC_SUBNET.to_string(),
                    }],
                }),
            },
        },
        volumes: Volumes {
            postgres_data: Volume::default(),
            user_profiles: Volume {
                name: Some(profiles_volume_name()),
            },
            recordings: Volume::default(),
        },
    })
}

/// Serialize the topology for a settings snapshot
pub fn generate(settings: &Settings) -> Result<String> {
    let compose = build(settings)?;
    let yaml = serde_yaml::to_string(&compose)?;
    Ok(format!(
        "# Generated by guac-stack. Changes are overwritten on the next run.\n{yaml}"
    ))
}

fn broker_service(settings: &Settings) -> Result<Service> {
    let db = &settings.database;
    let gid = settings
        .docker
        .gid
        .ok_or_else(|| ConfigError::MissingRequiredField("docker.gid".to_string()))?;

    let probe = format!(
        "import urllib.request; urllib.request.urlopen('http://localhost:{}/health')",
        services::BROKER_PORT
    );
    let mut service = Service::new(
        settings.images.reference(Component::Broker)?,
        &[INTERNAL_NET, VNC_NET],
        HealthCheck::new(&["CMD", "python", "-c", &probe]).start_period("20s"),
    )
    .env([
        (
            "GUACAMOLE_URL",
            format!(
                "http://{}:{}{}",
                services::GUACAMOLE,
                services::GUACAMOLE_PORT,
                APP_INTERNAL_PATH.trim_end_matches('/')
            ),
        ),
        ("GUACAMOLE_PUBLIC_URL", settings.public_url()),
        ("GUACAMOLE_ADMIN_USER", settings.guacamole.admin_user.clone()),
        ("GUACAMOLE_ADMIN_PASSWORD", settings.guacamole.admin_password.clone()),
        ("DATABASE_HOST", db.host.clone()),
        ("DATABASE_PORT", db.port.to_string()),
        ("DATABASE_NAME", db.name.clone()),
        ("DATABASE_USER", db.user.clone()),
        ("DATABASE_PASSWORD", db.password.clone()),
        ("GUACD_HOSTNAME", services::GUACD.to_string()),
        ("DOCKER_HOST", format!("unix://{}", settings.docker.socket)),
        ("USER_PROFILES_VOLUME", profiles_volume_name()),
        ("CONFIG_PATH", "/data/config".to_string()),
        ("USER_DATA_PATH", "/data/users".to_string()),
        ("LOG_LEVEL", settings.broker.log_level.clone()),
    ])
    .volumes([
        format!("{}:{}", settings.docker.socket, settings.docker.socket),
        format!("{PROFILES_VOLUME}:/data/users"),
        format!("./{}:/data/config", layout::BROKER_CONFIG_DIR),
    ])
    .after_healthy(&[services::POSTGRES, services::GUACAMOLE]);
    service.group_add.push(gid.to_string());

    if let Some(api_key) = &settings.broker.api_key {
        service = service.env([("BROKER_API_KEY", api_key.clone())]);
    }

    if let Some(vault) = &settings.vault {
        service = service.env([
            ("VAULT_ADDR", vault.addr.clone()),
            ("VAULT_MOUNT", vault.mount.clone()),
            ("VAULT_PATH", vault.path.clone()),
        ]);
        service = match &vault.auth {
            VaultAuth::Token(token) => service.env([("VAULT_TOKEN", token.clone())]),
            VaultAuth::AppRole { role_id, secret_id } => service.env([
                ("VAULT_ROLE_ID", role_id.clone()),
                ("VAULT_SECRET_ID", secret_id.clone()),
            ]),
        };
    }

    Ok(service)
}

fn proxy_service(settings: &Settings) -> Result<Service> {
    let mut volumes = vec![
        format!("./{}:/etc/nginx/nginx.conf:ro", layout::NGINX_MAIN_FILE),
        format!("./{}:/etc/nginx/conf.d:ro", layout::NGINX_CONF_D),
    ];
    // TLS material comes from exactly one place
    match settings.ssl.mode {
        SslMode::SelfSigned => {
            volumes.push(format!("./{}:{}:ro", layout::LOCAL_TLS_DIR, layout::LOCAL_TLS_MOUNT));
        }
        SslMode::LetsEncrypt => {
            volumes.push(format!("./{}:{}:ro", layout::LETSENCRYPT_DIR, layout::LETSENCRYPT_MOUNT));
            volumes.push(format!(
                "./{}:{}:ro",
                layout::ACME_WEBROOT_DIR,
                layout::ACME_WEBROOT_MOUNT
            ));
        }
    }

    let mut service = Service::new(
        settings.images.reference(Component::Nginx)?,
        &[INTERNAL_NET, FRONTEND_NET],
        HealthCheck::shell("curl -fsS http://localhost/health > /dev/null || exit 1".to_string()),
    )
    .volumes(volumes)
    .after_healthy(&[services::GUACAMOLE, services::BROKER]);
    service.ports = vec![
        format!("{}:80", settings.proxy.http_port),
        format!("{}:443", settings.proxy.https_port),
    ];
    Ok(service)
}

fn renewal_service(settings: &Settings) -> Result<Service> {
    let mut service = Service::new(
        settings.images.reference(Component::Certbot)?,
        &[FRONTEND_NET],
        HealthCheck::shell(format!("test -d {}", layout::LETSENCRYPT_MOUNT)),
    )
    .volumes([
        format!("./{}:{}", layout::LETSENCRYPT_DIR, layout::LETSENCRYPT_MOUNT),
        format!("./{}:{}", layout::ACME_WEBROOT_DIR, layout::ACME_WEBROOT_MOUNT),
    ]);
    // `$$` survives compose interpolation as a literal `$`
    service.entrypoint = Some(format!(
        "/bin/sh -c 'trap exit TERM; while :; do certbot renew --webroot -w {} --quiet; sleep 12h & wait $${{!}}; done;'",
        layout::ACME_WEBROOT_MOUNT
    ));
    Ok(service)
}
