use crate::common::file_utils;
use crate::config::types::Settings;
use crate::error::Result;
use log::{debug, info};
use std::path::{Path, PathBuf};

pub mod certbot_gen;
pub mod compose_gen;
pub mod nginx_gen;
pub mod templates;

/// Artifact locations, relative to the output directory, and where they are mounted
pub mod layout {
    pub const COMPOSE_FILE: &str = "docker-compose.yml";
    pub const NGINX_MAIN_FILE: &str = "nginx/nginx.conf";
    pub const NGINX_CONF_D: &str = "nginx/conf.d";
    pub const NGINX_VHOST_FILE: &str = "nginx/conf.d/guacamole.conf";
    pub const CERTBOT_SCRIPT: &str = "init-letsencrypt.sh";

    pub const LOCAL_TLS_DIR: &str = "nginx/ssl";
    pub const LOCAL_TLS_MOUNT: &str = "/etc/nginx/ssl";
    pub const LOCAL_CERT_FILE: &str = "cert.pem";
    pub const LOCAL_KEY_FILE: &str = "key.pem";

    pub const CERTBOT_DIR: &str = "certbot";
    pub const LETSENCRYPT_DIR: &str = "certbot/conf";
    pub const LETSENCRYPT_MOUNT: &str = "/etc/letsencrypt";
    pub const ACME_WEBROOT_DIR: &str = "certbot/www";
    pub const ACME_WEBROOT_MOUNT: &str = "/var/www/certbot";

    pub const INIT_DIR: &str = "init";
    pub const SCHEMA_FILE: &str = "init/initdb.sql";
    pub const BROKER_CONFIG_DIR: &str = "broker/config";
}

/// Service names and ports shared by the topology and the proxy
pub mod services {
    pub const PROJECT: &str = "guacamole";
    pub const POSTGRES: &str = "postgres";
    pub const GUACD: &str = "guacd";
    pub const GUACD_PORT: u16 = 4822;
    pub const GUACAMOLE: &str = "guacamole";
    pub const GUACAMOLE_PORT: u16 = 8080;
    pub const BROKER: &str = "session-broker";
    pub const BROKER_PORT: u16 = 5000;
    pub const NGINX: &str = "nginx";
    pub const CERTBOT: &str = "certbot";
}

/// Everything one synthesis run emits, as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub compose: String,
    pub nginx_main: String,
    pub nginx_vhost: String,
    /// Present only in Let's Encrypt mode
    pub certbot_script: Option<String>,
}

/// Generate every artifact from one settings snapshot
pub fn synthesize(settings: &Settings) -> Result<Artifacts> {
    debug!(
        "Synthesizing artifacts for ssl.mode={} url_mode={}",
        settings.ssl.mode,
        settings.proxy.exposure.url_mode()
    );
    Ok(Artifacts {
        compose: compose_gen::generate(settings)?,
        nginx_main: nginx_gen::generate_main(settings)?,
        nginx_vhost: nginx_gen::generate_vhost(settings)?,
        certbot_script: certbot_gen::generate(settings)?,
    })
}

impl Artifacts {
    /// `(relative path, content)` for every file this run owns
    pub fn files(&self) -> Vec<(&'static str, &str)> {
        let mut files = vec![
            (layout::COMPOSE_FILE, self.compose.as_str()),
            (layout::NGINX_MAIN_FILE, self.nginx_main.as_str()),
            (layout::NGINX_VHOST_FILE, self.nginx_vhost.as_str()),
        ];
        if let Some(script) = &self.certbot_script {
            files.push((layout::CERTBOT_SCRIPT, script.as_str()));
        }
        files
    }

    /// Write all artifacts under `dir`, replacing previous runs' output
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (relative, content) in self.files() {
            let path = dir.join(relative);
            file_utils::write_artifact(&path, content)?;
            written.push(path);
        }

        let script = dir.join(layout::CERTBOT_SCRIPT);
        if self.certbot_script.is_some() {
            file_utils::make_executable(&script)?;
        } else if file_utils::remove_stale(&script)? {
            info!("Removed {} (not used without Let's Encrypt)", script.display());
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::tests::settings_with;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const URL_MODES: [&str; 3] = ["path", "root", "subdomain"];

    #[test]
    fn test_cert_directory_agreement() {
        for url_mode in URL_MODES {
            let settings = settings_with(&[
                ("ssl.mode", json!("letsencrypt")),
                ("ssl.domain", json!("www.example.org")),
                ("nginx.url_mode", json!(url_mode)),
                ("nginx.subdomain", json!("desk")),
            ]);
            let artifacts = synthesize(&settings).unwrap();
            let script = artifacts.certbot_script.unwrap();

            let first_domain = script
                .lines()
                .find_map(|l| l.strip_prefix("DOMAINS=('"))
                .and_then(|rest| rest.split('\'').next())
                .unwrap();
            let cert_dir = artifacts
                .nginx_vhost
                .lines()
                .find_map(|l| l.trim().strip_prefix("ssl_certificate /etc/letsencrypt/live/"))
                .and_then(|rest| rest.split('/').next())
                .unwrap();

            assert_eq!(first_domain, cert_dir, "url_mode={url_mode}");
        }
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        for ssl_mode in ["selfsigned", "letsencrypt"] {
            for url_mode in URL_MODES {
                let overrides = [
                    ("ssl.mode", json!(ssl_mode)),
                    ("ssl.domain", json!("example.com")),
                    ("nginx.url_mode", json!(url_mode)),
                    ("vault.enabled", json!(true)),
                    ("vault.addr", json!("http://vault:8200")),
                    ("vault.token", json!("t")),
                ];
                let first = synthesize(&settings_with(&overrides)).unwrap();
                let second = synthesize(&settings_with(&overrides)).unwrap();
                assert_eq!(first, second);
            }
        }
    }

    #[test]
    fn test_unrelated_change_leaves_other_artifacts_alone() {
        let before = synthesize(&settings_with(&[])).unwrap();
        let bumped = settings_with(&[("versions.postgres", json!("17-alpine"))]);
        let after = synthesize(&bumped).unwrap();
        assert_ne!(before.compose, after.compose);
        assert_eq!(before.nginx_main, after.nginx_main);
        assert_eq!(before.nginx_vhost, after.nginx_vhost);
    }

    #[test]
    fn test_write_to_layout_and_stale_script() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let issued = synthesize(&settings_with(&[
            ("ssl.mode", json!("letsencrypt")),
            ("ssl.domain", json!("example.com")),
        ]))
        .unwrap();
        issued.write_to(root).unwrap();
        assert!(root.join("docker-compose.yml").is_file());
        assert!(root.join("nginx/nginx.conf").is_file());
        assert!(root.join("nginx/conf.d/guacamole.conf").is_file());
        assert!(root.join("init-letsencrypt.sh").is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(root.join("init-letsencrypt.sh")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        let local = synthesize(&settings_with(&[])).unwrap();
        let written = local.write_to(root).unwrap();
        assert_eq!(written.len(), 3);
        assert!(!root.join("init-letsencrypt.sh").exists());
        assert_eq!(
            fs::read_to_string(root.join("nginx/conf.d/guacamole.conf")).unwrap(),
            local.nginx_vhost
        );
    }
}
