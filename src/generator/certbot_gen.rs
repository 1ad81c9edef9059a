use super::templates::{self, CERTBOT_INIT};
use super::{layout, services};
use crate::config::types::{Settings, SslMode};
use crate::error::{ConfigError, Result};
use serde::Serialize;

#[derive(Serialize)]
struct BootstrapContext {
    cert_name: String,
    domains: String,
    email: String,
    staging: u8,
    certbot_data: &'static str,
    certbot_service: &'static str,
    proxy_service: &'static str,
    acme_webroot: &'static str,
}

/// Generate the one-shot certificate bootstrap script.
///
/// Returns `None` outside Let's Encrypt mode; there is nothing to request.
pub fn generate(settings: &Settings) -> Result<Option<String>> {
    if settings.ssl.mode != SslMode::LetsEncrypt {
        return Ok(None);
    }

    let domains = settings
        .site_domains()
        .ok_or_else(|| ConfigError::MissingRequiredField("ssl.domain".to_string()))?;

    let context = BootstrapContext {
        cert_name: shell_quote(domains.cert_directory()),
        domains: domains
            .as_list()
            .iter()
            .map(|d| shell_quote(d))
            .collect::<Vec<_>>()
            .join(" "),
        email: shell_quote(settings.ssl.email.as_deref().unwrap_or("")),
        staging: u8::from(settings.ssl.staging),
        certbot_data: layout::CERTBOT_DIR,
        certbot_service: services::CERTBOT,
        proxy_service: services::NGINX,
        acme_webroot: layout::ACME_WEBROOT_MOUNT,
    };

    Ok(Some(templates::render(CERTBOT_INIT, &context)?))
}

/// Single-quote a value for POSIX shells
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
