//! Text templates for the generated proxy configuration and bootstrap script.
//!
//! Rendered with tera; all values are computed by the generators, the templates
//! only decide layout.

use crate::error::GeneratorError;
use serde::Serialize;
use tera::{Context, Tera};

pub const NGINX_MAIN: &str = "nginx.conf";
pub const NGINX_VHOST: &str = "guacamole.conf";
pub const CERTBOT_INIT: &str = "init-letsencrypt.sh";

const NGINX_MAIN_TEMPLATE: &str = r##"# Generated by guac-stack. Changes are overwritten on the next run.
user  nginx;
worker_processes  auto;

error_log  /var/log/nginx/error.log warn;
pid        /var/run/nginx.pid;

events {
    worker_connections  1024;
}

http {
    include       /etc/nginx/mime.types;
    default_type  application/octet-stream;

    log_format  main  '$remote_addr - $remote_user [$time_local] "$request" '
                      '$status $body_bytes_sent "$http_referer" '
                      '"$http_user_agent" "$http_x_forwarded_for"';
    access_log  /var/log/nginx/access.log  main;

    sendfile        on;
    tcp_nopush      on;
    keepalive_timeout  65;
    server_tokens   off;
    client_max_body_size  100m;

    map $http_upgrade $connection_upgrade {
        default upgrade;
        ''      close;
    }

    # TLS profile: {{ profile }}
    ssl_protocols {{ protocols }};
{%- if ciphers %}
    ssl_ciphers {{ ciphers }};
{%- endif %}
    ssl_prefer_server_ciphers off;
    ssl_session_timeout 1d;
    ssl_session_cache shared:SSL:10m;
    ssl_session_tickets off;

    include /etc/nginx/conf.d/*.conf;
}
"##;

const NGINX_VHOST_TEMPLATE: &str = r##"# Generated by guac-stack. Changes are overwritten on the next run.
# ssl.mode={{ ssl_mode }} url_mode={{ url_mode }}

upstream guacamole_app {
    server {{ app_upstream }};
}

upstream session_broker {
    server {{ broker_upstream }};
}

server {
    listen 80;
    listen [::]:80;
    server_name {{ http_server_names }};

    location = /health {
        access_log off;
        default_type text/plain;
        return 200 "OK\n";
    }
{%- if acme_webroot %}

    location /.well-known/acme-challenge/ {
        root {{ acme_webroot }};
    }
{%- endif %}

    location / {
        return 301 {{ https_origin }}$request_uri;
    }
}
{%- if alias %}

server {
    listen 443 ssl;
    listen [::]:443 ssl;
    http2 on;
    server_name {{ alias }};

    ssl_certificate {{ cert_path }};
    ssl_certificate_key {{ key_path }};

    return 301 {{ https_origin }}$request_uri;
}
{%- endif %}

server {
    listen 443 ssl;
    listen [::]:443 ssl;
    http2 on;
    server_name {{ server_name }};

    ssl_certificate {{ cert_path }};
    ssl_certificate_key {{ key_path }};
{%- if chain_path %}
    ssl_trusted_certificate {{ chain_path }};
    ssl_stapling on;
    ssl_stapling_verify on;
    resolver {{ resolver }} valid=300s;
    resolver_timeout 5s;

    add_header Strict-Transport-Security "max-age=63072000" always;
{%- endif %}

    location = /health {
        access_log off;
        default_type text/plain;
        return 200 "OK\n";
    }
{%- if root_redirect %}

    location = / {
        return 302 {{ base_path }};
    }
{%- endif %}

    location {{ base_path }} {
        proxy_pass http://guacamole_app{{ app_internal_path }};
        proxy_buffering off;
        proxy_http_version 1.1;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection $connection_upgrade;
        proxy_cookie_path {{ app_internal_path }} {{ base_path }};
        proxy_read_timeout 1h;
        access_log off;
    }

    location {{ broker_prefix }} {
        proxy_pass http://session_broker/api/;
        proxy_http_version 1.1;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }
}
"##;

// Values arrive shell-quoted; avoid `${#` in here, tera reads `{#` as a comment.
const CERTBOT_INIT_TEMPLATE: &str = r####"#!/usr/bin/env bash
# Generated by guac-stack. Changes are overwritten on the next run.
#
# Requests the Let's Encrypt certificate for this deployment once, then
# leaves renewal to the certbot service.
set -euo pipefail

cd "$(dirname "$0")"

CERT_NAME={{ cert_name }}
DOMAINS=({{ domains }})
EMAIL={{ email }}
STAGING={{ staging }}
RSA_KEY_SIZE=4096
DATA_PATH="./{{ certbot_data }}"

if [ -e "$DATA_PATH/conf/renewal/$CERT_NAME.conf" ]; then
  echo "Certificate for $CERT_NAME already issued, nothing to do."
  exit 0
fi

mkdir -p "$DATA_PATH/conf/live/$CERT_NAME" "$DATA_PATH/www"

echo "### Creating temporary certificate for $CERT_NAME ..."
docker compose run --rm --no-deps --entrypoint sh {{ certbot_service }} -c "\
  openssl req -x509 -nodes -newkey rsa:2048 -days 1 \
    -keyout /etc/letsencrypt/live/$CERT_NAME/privkey.pem \
    -out /etc/letsencrypt/live/$CERT_NAME/fullchain.pem \
    -subj /CN=localhost \
  && cp /etc/letsencrypt/live/$CERT_NAME/fullchain.pem /etc/letsencrypt/live/$CERT_NAME/chain.pem"

echo "### Starting {{ proxy_service }} ..."
docker compose up --force-recreate -d {{ proxy_service }}

echo "### Removing temporary certificate for $CERT_NAME ..."
docker compose run --rm --no-deps --entrypoint sh {{ certbot_service }} -c "\
  rm -rf /etc/letsencrypt/live/$CERT_NAME \
    /etc/letsencrypt/archive/$CERT_NAME \
    /etc/letsencrypt/renewal/$CERT_NAME.conf"

echo "### Requesting certificate for ${DOMAINS[*]} ..."
DOMAIN_ARGS=()
for domain in "${DOMAINS[@]}"; do
  DOMAIN_ARGS+=(-d "$domain")
done

if [ -n "$EMAIL" ]; then
  EMAIL_ARGS=(--email "$EMAIL")
else
  EMAIL_ARGS=(--register-unsafely-without-email)
fi

STAGING_ARGS=()
if [ "$STAGING" != "0" ]; then
  STAGING_ARGS=(--staging)
fi

docker compose run --rm --no-deps --entrypoint certbot {{ certbot_service }} \
  certonly --webroot -w {{ acme_webroot }} \
  --cert-name "$CERT_NAME" \
  "${DOMAIN_ARGS[@]}" \
  "${EMAIL_ARGS[@]}" \
  ${STAGING_ARGS[@]+"${STAGING_ARGS[@]}"} \
  --rsa-key-size "$RSA_KEY_SIZE" \
  --agree-tos --no-eff-email --non-interactive

echo "### Reloading {{ proxy_service }} ..."
docker compose exec {{ proxy_service }} nginx -s reload
"####;

fn engine() -> Result<Tera, GeneratorError> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        (NGINX_MAIN, NGINX_MAIN_TEMPLATE),
        (NGINX_VHOST, NGINX_VHOST_TEMPLATE),
        (CERTBOT_INIT, CERTBOT_INIT_TEMPLATE),
    ])?;
    Ok(tera)
}

/// Render one of the named templates with a serializable context
pub fn render<T: Serialize>(name: &str, context: &T) -> Result<String, GeneratorError> {
    let context = Context::from_serialize(context)?;
    Ok(engine()?.render(name, &context)?)
}
