use crate::common::file_utils;
use crate::config::types::Settings;
use crate::error::Result;
use crate::generator::layout;
use log::{debug, info};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

const VALIDITY_DAYS: i64 = 365;
const ORGANIZATION: &str = "Guacamole";
const ORGANIZATIONAL_UNIT: &str = "Self-Signed";

/// PEM-encoded certificate and private key
pub struct CertificatePair {
    pub cert_pem: String,
    pub key_pem: String,
}

pub fn cert_path(dir: &Path) -> PathBuf {
    dir.join(layout::LOCAL_TLS_DIR).join(layout::LOCAL_CERT_FILE)
}

pub fn key_path(dir: &Path) -> PathBuf {
    dir.join(layout::LOCAL_TLS_DIR).join(layout::LOCAL_KEY_FILE)
}

/// Generate the local pair under `dir` unless both files already exist.
///
/// Returns `true` when a new pair was written.
pub fn ensure_certificate(settings: &Settings, dir: &Path) -> Result<bool> {
    let cert = cert_path(dir);
    let key = key_path(dir);
    if file_utils::all_present(&[&cert, &key]) {
        debug!("Keeping existing certificate at {}", cert.display());
        return Ok(false);
    }

    let (common_name, sans) = match settings.site_domains() {
        Some(domains) => (
            domains.canonical().to_string(),
            domains.as_list().iter().map(|d| d.to_string()).collect(),
        ),
        None => ("localhost".to_string(), vec!["localhost".to_string()]),
    };

    let pair = generate(&common_name, sans)?;
    file_utils::write_with_mode(&cert, &pair.cert_pem, 0o644)?;
    file_utils::write_with_mode(&key, &pair.key_pem, 0o600)?;
    info!("Generated self-signed certificate for {}", common_name);
    Ok(true)
}

/// Self-signed certificate valid for a year from now
pub fn generate(common_name: &str, sans: Vec<String>) -> Result<CertificatePair> {
    let mut params = CertificateParams::new(sans)?;

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, common_name.to_string());
    distinguished_name.push(DnType::OrganizationName, ORGANIZATION);
    distinguished_name.push(DnType::OrganizationalUnitName, ORGANIZATIONAL_UNIT);
    params.distinguished_name = distinguished_name;

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(VALIDITY_DAYS);

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;
    Ok(CertificatePair {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}
