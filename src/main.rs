use clap::Parser;
use colored::Colorize;
use guac_stack::{
    cli::{Cli, Commands},
    common::command_utils,
    config::{self, types::Settings, types::SslMode, ConfigStore},
    error::ConfigError,
    generator::{self, layout},
    prompt::Prompter,
    provision,
};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> guac_stack::Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match cli.command {
        Commands::Init => handle_init(&cli.config),
        Commands::Get { path } => handle_get(&cli.config, &path),
        Commands::Set { path, value } => handle_set(&cli.config, &path, &value),
        Commands::Generate {
            output,
            non_interactive,
            dry_run,
            pull,
        } => handle_generate(&cli.config, output, non_interactive, dry_run, pull),
    }
}

fn handle_init(config_path: &Path) -> guac_stack::Result<()> {
    ConfigStore::create(config_path)?;
    println!("✅ Created {}", config_path.display().to_string().bold());
    println!(
        "💡 Pin image versions with `guac-stack set versions.<component> <tag>`, \
         then run `guac-stack generate`."
    );
    Ok(())
}

fn handle_get(config_path: &Path, path: &str) -> guac_stack::Result<()> {
    let store = ConfigStore::open(config_path)?;
    match store.get(path) {
        Some(Value::String(s)) => println!("{}", s),
        Some(other) => println!("{}", serde_json::to_string_pretty(other)?),
        None => return Err(ConfigError::MissingRequiredField(path.to_string()).into()),
    }
    Ok(())
}

fn handle_set(config_path: &Path, path: &str, value: &str) -> guac_stack::Result<()> {
    let mut store = ConfigStore::open(config_path)?;
    store.set(path, config::parse_cli_value(value))?;
    println!("✅ {} updated", path.bold());
    Ok(())
}

fn handle_generate(
    config_path: &Path,
    output: PathBuf,
    non_interactive: bool,
    dry_run: bool,
    pull: bool,
) -> guac_stack::Result<()> {
    if !dry_run {
        command_utils::ensure_dependencies(&command_utils::REQUIRED_TOOLS)?;
    }

    let mut store = ConfigStore::open(config_path)?;
    if !non_interactive {
        let stdin = io::stdin();
        let answered = Prompter::new(stdin.lock(), io::stdout()).collect_missing(&mut store)?;
        if !answered.is_empty() {
            println!("💾 Saved {} to {}", answered.join(", "), config_path.display());
        }
    }

    let mut settings = Settings::from_store(&store)?;
    if settings.docker.gid.is_none() {
        settings.docker.gid = Some(command_utils::lookup_group_id("docker")?);
    }

    println!(
        "🔧 Generating deployment ({}, {} mode)...",
        settings.ssl.mode.to_string().cyan(),
        settings.proxy.exposure.url_mode().cyan()
    );
    let artifacts = generator::synthesize(&settings)?;

    if dry_run {
        for (path, content) in artifacts.files() {
            println!("--- {} (dry run) ---", path);
            println!("{}", content);
        }
        return Ok(());
    }

    for path in artifacts.write_to(&output)? {
        println!("  {} {}", "✓".green(), path.display());
    }

    if settings.ssl.mode == SslMode::SelfSigned
        && provision::ensure_certificate(&settings, &output)?
    {
        println!(
            "  {} {}/ (self-signed certificate)",
            "✓".green(),
            output.join(layout::LOCAL_TLS_DIR).display()
        );
    }
    if provision::ensure_schema(&settings, &output)? {
        println!("  {} {}", "✓".green(), output.join(layout::SCHEMA_FILE).display());
    }

    if pull {
        command_utils::pull_images(&output)?;
        println!("  {} images pulled", "✓".green());
    }

    println!(
        "\n🎉 Generation complete. Guacamole will be served at {}",
        settings.public_url().bold()
    );
    match settings.ssl.mode {
        SslMode::LetsEncrypt => println!(
            "💡 Next: run ./{} once, then `docker compose up -d`.",
            layout::CERTBOT_SCRIPT
        ),
        SslMode::SelfSigned => println!("💡 Next: `docker compose up -d`."),
    }
    Ok(())
}
