use crate::config::types::{BasePath, SslMode};
use crate::config::ConfigStore;
use crate::error::{ConfigError, Result};
use log::debug;
use std::io::{BufRead, Write};

/// Asks for configuration the document does not carry yet and persists each answer.
///
/// Only unset keys are asked for; a value already in the document is never
/// overwritten.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Collect secrets and first-run choices; returns the keys that were set
    pub fn collect_missing(&mut self, store: &mut ConfigStore) -> Result<Vec<String>> {
        let mut answered = Vec::new();

        for (path, label) in [
            ("database.password", "Database password"),
            ("guacamole.admin_password", "Guacamole admin password"),
        ] {
            if store.is_unset(path) {
                let value = self.ask_required(path, label)?;
                store.set(path, value)?;
                answered.push(path.to_string());
            }
        }

        if store.is_unset("ssl.mode") {
            let mode = self.ask_choice("ssl.mode", "SSL mode", &["selfsigned", "letsencrypt"])?;
            store.set("ssl.mode", mode)?;
            answered.push("ssl.mode".to_string());
        }

        if store.is_unset("nginx.url_mode") {
            let mode =
                self.ask_choice("nginx.url_mode", "URL mode", &["path", "root", "subdomain"])?;
            store.set("nginx.url_mode", mode)?;
            answered.push("nginx.url_mode".to_string());
        }

        let letsencrypt =
            store.get_or_default("ssl.mode", "selfsigned") == SslMode::LetsEncrypt.to_string();
        if letsencrypt {
            if store.is_unset("ssl.domain") {
                let domain = self.ask_required("ssl.domain", "Domain name (e.g. example.com)")?;
                store.set("ssl.domain", domain)?;
                answered.push("ssl.domain".to_string());
            }
            // An empty answer is stored so the question is not repeated
            if store.get("ssl.email").is_none() {
                let email = self
                    .ask("Contact email for Let's Encrypt (optional)")?
                    .unwrap_or_default();
                store.set("ssl.email", email)?;
                answered.push("ssl.email".to_string());
            }
        }

        match store.get_or_default("nginx.url_mode", "path").as_str() {
            "path" if store.is_unset("nginx.base_path") => {
                let base_path = loop {
                    let raw = self
                        .ask_with_default("nginx.base_path", "Base path", "/guacamole/")?;
                    match BasePath::parse(&raw) {
                        Ok(path) => break path,
                        Err(reason) => writeln!(self.output, "  {reason}")?,
                    }
                };
                store.set("nginx.base_path", base_path.as_str())?;
                answered.push("nginx.base_path".to_string());
            }
            "subdomain" if store.is_unset("nginx.subdomain") => {
                let label =
                    self.ask_with_default("nginx.subdomain", "Subdomain label", "guacamole")?;
                store.set("nginx.subdomain", label)?;
                answered.push("nginx.subdomain".to_string());
            }
            _ => {}
        }

        debug!("Prompted for {} value(s)", answered.len());
        Ok(answered)
    }

    /// One line of input, trimmed; `None` for an empty answer
    fn ask(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.output, "{label}: ")?;
        self.output.flush()?;
        self.read_answer()
    }

    fn ask_required(&mut self, path: &str, label: &str) -> Result<String> {
        loop {
            write!(self.output, "{label}: ")?;
            self.output.flush()?;
            match self.read_answer_or_eof(path)? {
                Some(value) => return Ok(value),
                None => writeln!(self.output, "  A value is required.")?,
            }
        }
    }

    fn ask_with_default(&mut self, path: &str, label: &str, default: &str) -> Result<String> {
        write!(self.output, "{label} [{default}]: ")?;
        self.output.flush()?;
        Ok(self
            .read_answer_or_eof(path)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// First option is the default
    fn ask_choice(&mut self, path: &str, label: &str, options: &[&str]) -> Result<String> {
        let default = options[0];
        loop {
            write!(self.output, "{label} ({}) [{default}]: ", options.join("/"))?;
            self.output.flush()?;
            match self.read_answer_or_eof(path)? {
                None => return Ok(default.to_string()),
                Some(answer) if options.contains(&answer.as_str()) => return Ok(answer),
                Some(answer) => writeln!(
                    self.output,
                    "  '{answer}' is not one of {}",
                    options.join(", ")
                )?,
            }
        }
    }

    fn read_answer(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let answer = line.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }

    /// Like `read_answer`, but closed input means the field can never be supplied
    fn read_answer_or_eof(&mut self, path: &str) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(ConfigError::MissingRequiredField(path.to_string()).into());
        }
        let answer = line.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn run(store: &mut ConfigStore, answers: &str) -> (Result<Vec<String>>, String) {
        let mut output = Vec::new();
        let result = Prompter::new(Cursor::new(answers.as_bytes().to_vec()), &mut output)
            .collect_missing(store);
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_first_run_letsencrypt_subdomain() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ConfigStore::create(&temp_dir.path().join("c.json")).unwrap();

        let (result, output) = run(
            &mut store,
            "db-pass\nadmin-pass\nletsencrypt\nsubdomain\nexample.com\n\nportal\n",
        );
        assert_eq!(
            result.unwrap(),
            vec![
                "database.password",
                "guacamole.admin_password",
                "ssl.mode",
                "nginx.url_mode",
                "ssl.domain",
                "ssl.email",
                "nginx.subdomain",
            ]
        );
        assert!(output.contains("SSL mode (selfsigned/letsencrypt) [selfsigned]: "));

        let reopened = ConfigStore::open(store.path()).unwrap();
        assert_eq!(reopened.get_str("ssl.domain").as_deref(), Some("example.com"));
        assert_eq!(reopened.get("ssl.email"), Some(&json!("")));
        assert_eq!(reopened.get_str("nginx.subdomain").as_deref(), Some("portal"));
    }

    #[test]
    fn test_defaults_and_base_path_normalization() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ConfigStore::create(&temp_dir.path().join("c.json")).unwrap();

        let (result, _) = run(&mut store, "a\nb\n\n\nremote\n");
        assert_eq!(result.unwrap().len(), 5);
        assert_eq!(store.get_str("ssl.mode").as_deref(), Some("selfsigned"));
        assert_eq!(store.get_str("nginx.url_mode").as_deref(), Some("path"));
        assert_eq!(store.get_str("nginx.base_path").as_deref(), Some("/remote/"));
        assert!(store.get("ssl.domain").is_none());
    }

    #[test]
    fn test_set_values_are_not_asked_again() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ConfigStore::create(&temp_dir.path().join("c.json")).unwrap();
        for (path, value) in [
            ("database.password", "x"),
            ("guacamole.admin_password", "y"),
            ("ssl.mode", "selfsigned"),
            ("nginx.url_mode", "root"),
        ] {
            store.set(path, value).unwrap();
        }

        let (result, output) = run(&mut store, "");
        assert!(result.unwrap().is_empty());
        assert!(output.is_empty());
    }

    #[test]
    fn test_invalid_choice_is_asked_again() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ConfigStore::create(&temp_dir.path().join("c.json")).unwrap();
        store.set("database.password", "x").unwrap();
        store.set("guacamole.admin_password", "y").unwrap();

        let answers = "acme\nletsencrypt\nroot\nexample.org\nops@example.org\n";
        let (result, output) = run(&mut store, answers);
        result.unwrap();
        assert!(output.contains("'acme' is not one of selfsigned, letsencrypt"));
        assert_eq!(store.get_str("ssl.email").as_deref(), Some("ops@example.org"));
    }

    #[test]
    fn test_closed_input_reports_field() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ConfigStore::create(&temp_dir.path().join("c.json")).unwrap();

        let (result, _) = run(&mut store, "");
        assert!(matches!(
            result,
            Err(StackError::Config(ConfigError::MissingRequiredField(field)))
                if field == "database.password"
        ));
    }
}
