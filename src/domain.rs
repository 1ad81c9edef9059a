//! # Domain Module
//!
//! Canonicalizes the configured domain and derives the two-name site a certificate
//! is issued for. The nginx virtual host and the certificate bootstrap script both
//! take their names from [`site_domains`], so the certificate directory nginx reads
//! is always the one certbot writes.

use crate::config::types::Exposure;

const WWW_PREFIX: &str = "www.";

/// Strips leading `www.` labels; anything else passes through untouched.
///
/// Every leading `www.` is removed, not only the first one, so that
/// `normalize(normalize(x)) == normalize(x)` holds for inputs like `www.www.x`.
///
/// No DNS syntax validation happens here, malformed input comes back as-is.
pub fn normalize(input: &str) -> &str {
    let mut base = input;
    while let Some(rest) = base.strip_prefix(WWW_PREFIX) {
        base = rest;
    }
    base
}

/// The base name and its `www.` counterpart.
pub fn variants(base: &str) -> [String; 2] {
    [base.to_string(), format!("{WWW_PREFIX}{base}")]
}

/// A canonical host name plus the `www.` alias that redirects to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSet {
    canonical: String,
    alias: String,
}

impl DomainSet {
    fn from_base(base: &str) -> Self {
        let [canonical, alias] = variants(base);
        Self { canonical, alias }
    }

    /// First requested domain; the certificate is stored under this name.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Directory under `live/` holding the issued certificate bundle.
    pub fn cert_directory(&self) -> &str {
        &self.canonical
    }

    /// Ordered domain list handed to the certificate client.
    pub fn as_list(&self) -> [&str; 2] {
        [&self.canonical, &self.alias]
    }
}

/// Derives the site names for a domain under the given exposure mode.
///
/// Path and root modes serve the bare domain; subdomain mode moves both names
/// under the dedicated label (`portal.example.com`, `www.portal.example.com`).
pub fn site_domains(domain: &str, exposure: &Exposure) -> DomainSet {
    let base = normalize(domain);
    match exposure {
        Exposure::Path { .. } | Exposure::Root => DomainSet::from_base(base),
        Exposure::Subdomain { label } => DomainSet::from_base(&format!("{label}.{base}")),
    }
}
