use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"{
  "database": { "password": "db-secret" },
  "guacamole": { "admin_password": "admin-secret" },
  "ssl": { "mode": "letsencrypt", "domain": "www.example.com", "email": "ops@example.com" },
  "nginx": { "url_mode": "path", "base_path": "remote" },
  "versions": {
    "postgres": "16-alpine",
    "guacd": "1.5.5",
    "guacamole": "1.5.5",
    "broker": "0.4.0",
    "nginx": "1.27-alpine",
    "certbot": "v2.11.0"
  },
  "docker": { "gid": "998" }
}
"#;

fn guac_stack(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("guac-stack").unwrap();
    cmd.env_remove("GUAC_STACK_CONFIG").arg("-c").arg(config);
    cmd
}

#[test]
fn init_creates_empty_document_once() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("stack.json");

    guac_stack(&config).arg("init").assert().success();
    assert_eq!(fs::read_to_string(&config).unwrap().trim(), "{}");

    guac_stack(&config)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn set_then_get_round_trips_through_the_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("stack.json");
    guac_stack(&config).arg("init").assert().success();

    guac_stack(&config)
        .args(["set", "versions.guacamole", "1.50"])
        .assert()
        .success();
    guac_stack(&config)
        .args(["set", "ssl.staging", "true"])
        .assert()
        .success();

    guac_stack(&config)
        .args(["get", "versions.guacamole"])
        .assert()
        .success()
        .stdout("1.50\n");
    guac_stack(&config)
        .args(["get", "ssl.staging"])
        .assert()
        .success()
        .stdout("true\n");

    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config).unwrap()).unwrap();
    assert_eq!(document["versions"]["guacamole"], "1.50");
    assert_eq!(document["ssl"]["staging"], true);
}

#[test]
fn get_unset_key_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("stack.json");
    guac_stack(&config).arg("init").assert().success();

    guac_stack(&config)
        .args(["get", "ssl.domain"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error: "));
}

#[test]
fn missing_document_fails_before_generation() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("absent.json");

    guac_stack(&config)
        .args(["generate", "--dry-run", "--non-interactive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreadable"));
}

#[test]
fn dry_run_prints_agreeing_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("stack.json");
    fs::write(&config, FULL_CONFIG).unwrap();
    let output = temp_dir.path().join("out");

    guac_stack(&config)
        .args(["generate", "--dry-run", "--non-interactive", "-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("--- docker-compose.yml (dry run) ---"))
        .stdout(predicate::str::contains("--- nginx/conf.d/guacamole.conf (dry run) ---"))
        .stdout(predicate::str::contains("--- init-letsencrypt.sh (dry run) ---"))
        .stdout(predicate::str::contains("/etc/letsencrypt/live/example.com/fullchain.pem"))
        .stdout(predicate::str::contains("CERT_NAME='example.com'"))
        .stdout(predicate::str::contains("location /remote/ {"));

    assert!(!output.exists());
}

#[test]
fn non_interactive_reports_missing_secret() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("stack.json");
    fs::write(&config, FULL_CONFIG.replace("\"db-secret\"", "\"\"")).unwrap();

    guac_stack(&config)
        .args(["generate", "--dry-run", "--non-interactive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("database.password"));
}
