use super::templates::{self, NGINX_MAIN, NGINX_VHOST};
use super::{layout, services};
use crate::config::types::{
    Exposure, Settings, SslMode, TlsProfile, APP_INTERNAL_PATH, BROKER_API_PREFIX,
};
use crate::error::{ConfigError, Result};
use log::debug;
use serde::Serialize;

const INTERMEDIATE_CIPHERS: &str = "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:\
ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:ECDHE-ECDSA-CHACHA20-POLY1305:\
ECDHE-RSA-CHACHA20-POLY1305:DHE-RSA-AES128-GCM-SHA256:DHE-RSA-AES256-GCM-SHA384:\
DHE-RSA-CHACHA20-POLY1305";

#[derive(Serialize)]
struct MainContext {
    profile: &'static str,
    protocols: &'static str,
    ciphers: Option<&'static str>,
}

/// Values for the virtual host template, one set per `(ssl.mode, url_mode)` row
#[derive(Debug, Serialize)]
struct VhostContext {
    ssl_mode: String,
    url_mode: &'static str,
    app_upstream: String,
    broker_upstream: String,
    http_server_names: String,
    acme_webroot: Option<&'static str>,
    https_origin: String,
    alias: Option<String>,
    server_name: String,
    cert_path: String,
    key_path: String,
    chain_path: Option<String>,
    resolver: String,
    root_redirect: bool,
    base_path: String,
    app_internal_path: &'static str,
    broker_prefix: &'static str,
}

/// Generate the main nginx configuration; only the TLS profile varies
pub fn generate_main(settings: &Settings) -> Result<String> {
    let context = match settings.ssl.profile {
        TlsProfile::Modern => MainContext {
            profile: "modern",
            protocols: "TLSv1.3",
            ciphers: None,
        },
        TlsProfile::Intermediate => MainContext {
            profile: "intermediate",
            protocols: "TLSv1.2 TLSv1.3",
            ciphers: Some(INTERMEDIATE_CIPHERS),
        },
    };
    Ok(templates::render(NGINX_MAIN, &context)?)
}

/// Generate the virtual host for the active SSL and URL mode
pub fn generate_vhost(settings: &Settings) -> Result<String> {
    let exposure = &settings.proxy.exposure;
    let port_suffix = match settings.proxy.https_port {
        443 => String::new(),
        port => format!(":{port}"),
    };

    let mut context = VhostContext {
        ssl_mode: settings.ssl.mode.to_string(),
        url_mode: exposure.url_mode(),
        app_upstream: format!("{}:{}", services::GUACAMOLE, services::GUACAMOLE_PORT),
        broker_upstream: format!("{}:{}", services::BROKER, services::BROKER_PORT),
        http_server_names: "_".to_string(),
        acme_webroot: None,
        https_origin: format!("https://$host{port_suffix}"),
        alias: None,
        server_name: "_".to_string(),
        cert_path: format!("{}/{}", layout::LOCAL_TLS_MOUNT, layout::LOCAL_CERT_FILE),
        key_path: format!("{}/{}", layout::LOCAL_TLS_MOUNT, layout::LOCAL_KEY_FILE),
        chain_path: None,
        resolver: settings.ssl.resolver.clone(),
        root_redirect: matches!(exposure, Exposure::Path { .. }),
        base_path: exposure.base_path().to_string(),
        app_internal_path: APP_INTERNAL_PATH,
        broker_prefix: BROKER_API_PREFIX,
    };

    match settings.ssl.mode {
        SslMode::SelfSigned => {}
        SslMode::LetsEncrypt => {
            let domains = settings
                .site_domains()
                .ok_or_else(|| ConfigError::MissingRequiredField("ssl.domain".to_string()))?;
            let live = format!("{}/live/{}", layout::LETSENCRYPT_MOUNT, domains.cert_directory());

            context.http_server_names = domains.as_list().join(" ");
            context.acme_webroot = Some(layout::ACME_WEBROOT_MOUNT);
            context.https_origin = format!("https://{}{port_suffix}", domains.canonical());
            context.alias = Some(domains.alias().to_string());
            context.server_name = domains.canonical().to_string();
            context.cert_path = format!("{live}/fullchain.pem");
            context.key_path = format!("{live}/privkey.pem");
            context.chain_path = Some(format!("{live}/chain.pem"));
        }
    }

    debug!(
        "Rendering vhost for ssl.mode={} url_mode={}",
        context.ssl_mode, context.url_mode
    );
    Ok(templates::render(NGINX_VHOST, &context)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::tests::settings_with;
    use serde_json::json;

    #[test]
    fn test_path_mode_selfsigned() {
        let settings = settings_with(&[]);
        let vhost = generate_vhost(&settings).unwrap();

        assert!(vhost.contains("server_name _;"));
        assert!(vhost.contains("location /guacamole/ {"));
        assert!(vhost.contains("ssl_certificate /etc/nginx/ssl/cert.pem;"));
        assert!(vhost.contains("ssl_certificate_key /etc/nginx/ssl/key.pem;"));
        assert!(vhost.contains("location = / {\n        return 302 /guacamole/;"));
        assert!(!vhost.contains("acme-challenge"));
        assert!(!vhost.contains("letsencrypt"));
        assert!(!vhost.contains("ssl_stapling"));
    }

    #[test]
    fn test_subdomain_mode_letsencrypt() {
        let settings = settings_with(&[
            ("ssl.mode", json!("letsencrypt")),
            ("ssl.domain", json!("example.com")),
            ("nginx.url_mode", json!("subdomain")),
            ("nginx.subdomain", json!("portal")),
        ]);
        let vhost = generate_vhost(&settings).unwrap();

        assert!(vhost.contains("server_name portal.example.com www.portal.example.com;"));
        assert!(vhost.contains("server_name www.portal.example.com;"));
        assert!(vhost.contains("return 301 https://portal.example.com$request_uri;"));
        assert!(vhost.contains("server_name portal.example.com;"));
        assert!(vhost.contains("/etc/letsencrypt/live/portal.example.com/fullchain.pem"));
        assert!(vhost.contains("/etc/letsencrypt/live/portal.example.com/privkey.pem"));
        assert!(vhost
            .contains("location /.well-known/acme-challenge/ {\n        root /var/www/certbot;"));
        assert!(vhost
            .contains("location / {\n        proxy_pass http://guacamole_app/guacamole/;"));
        assert!(!vhost.contains("location = / {"));
    }

    #[test]
    fn test_root_mode() {
        let settings = settings_with(&[
            ("nginx.url_mode", json!("root")),
            ("nginx.base_path", json!("/guacamole/")),
        ]);
        let vhost = generate_vhost(&settings).unwrap();

        assert!(vhost.contains("location / {\n        proxy_pass"));
        assert!(vhost.contains("proxy_cookie_path /guacamole/ /;"));
        assert!(!vhost.contains("location = / {"));
        assert!(!vhost.contains("location /guacamole/ {"));
    }

    #[test]
    fn test_letsencrypt_path_mode_uses_bare_domain() {
        let settings = settings_with(&[
            ("ssl.mode", json!("letsencrypt")),
            ("ssl.domain", json!("www.example.com")),
            ("nginx.base_path", json!("remote")),
        ]);
        let vhost = generate_vhost(&settings).unwrap();

        assert!(vhost.contains("server_name example.com www.example.com;"));
        assert!(vhost.contains("/etc/letsencrypt/live/example.com/chain.pem"));
        assert!(vhost.contains("location /remote/ {"));
        assert!(vhost.contains("proxy_cookie_path /guacamole/ /remote/;"));
        assert!(vhost.contains("return 302 /remote/;"));
        assert!(vhost.contains("resolver 1.1.1.1 8.8.8.8 valid=300s;"));
    }

    #[test]
    fn test_fixed_locations_in_every_mode() {
        for (ssl, url) in [
            ("selfsigned", "path"),
            ("selfsigned", "root"),
            ("selfsigned", "subdomain"),
            ("letsencrypt", "path"),
            ("letsencrypt", "root"),
            ("letsencrypt", "subdomain"),
        ] {
            let settings = settings_with(&[
                ("ssl.mode", json!(ssl)),
                ("ssl.domain", json!("example.com")),
                ("nginx.url_mode", json!(url)),
            ]);
            let vhost = generate_vhost(&settings).unwrap();
            assert_eq!(vhost.matches("location = /health {").count(), 2, "{ssl}/{url}");
            assert!(vhost.contains("return 200 \"OK\\n\";"));
            assert!(vhost.contains("location /broker/api/ {"));
            assert!(vhost.contains("proxy_set_header Connection $connection_upgrade;"));
        }
    }

    #[test]
    fn test_non_default_https_port_in_redirect() {
        let settings = settings_with(&[("nginx.https_port", json!("8443"))]);
        let vhost = generate_vhost(&settings).unwrap();
        assert!(vhost.contains("return 301 https://$host:8443$request_uri;"));
    }

    #[test]
    fn test_tls_profile_changes_only_main_config() {
        let modern = settings_with(&[("ssl.profile", json!("modern"))]);
        let intermediate = settings_with(&[("ssl.profile", json!("intermediate"))]);

        let main_modern = generate_main(&modern).unwrap();
        let main_intermediate = generate_main(&intermediate).unwrap();
        assert!(main_modern.contains("ssl_protocols TLSv1.3;"));
        assert!(!main_modern.contains("ssl_ciphers"));
        assert!(main_intermediate.contains("ssl_protocols TLSv1.2 TLSv1.3;"));
        assert!(main_intermediate.contains("ssl_ciphers ECDHE-ECDSA-AES128-GCM-SHA256:"));
        assert!(main_modern.contains(
            "map $http_upgrade $connection_upgrade {\n        default upgrade;\n        ''      close;"
        ));

        assert_eq!(
            generate_vhost(&modern).unwrap(),
            generate_vhost(&intermediate).unwrap()
        );
    }
}
