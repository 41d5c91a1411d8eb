//! docseal command-line interface
//!
//! Renders form templates, runs full submissions and manages the encryption
//! key and encrypted files.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing::{debug, error, info};

use docseal::config::AppConfig;
use docseal::encryption::{EncryptionService, KeyStore};
use docseal::error::{ConfigError, Error, Result};
use docseal::hash_utils::{hash_data, verify_hash};
use docseal::pipeline::SubmissionPipeline;
use docseal::placeholder::PlaceholderMap;
use docseal::template::{DocumentArchive, PatchEngine};
use docseal::utils::{init_logging, write_atomic, LogLevel};

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let log_level = matches
        .get_one::<LogLevel>("verbose")
        .copied()
        .unwrap_or_default();
    if let Err(e) = init_logging(log_level) {
        eprintln!("failed to set tracing subscriber: {}", e);
    }

    if let Err(e) = run(&matches).await {
        error!("{}", e);
        process::exit(1);
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    debug!(?config, "configuration ready");

    match matches.subcommand() {
        Some(("render", sub)) => render(&config, sub),
        Some(("fields", sub)) => fields(&config, sub),
        Some(("submit", sub)) => submit(&config, sub).await,
        Some(("encrypt-file", sub)) => {
            let path = required_path(sub, "path")?;
            let sealed = encryption_service(&config)?.encrypt_file(&path)?;
            println!("{}", sealed.path.display());
            Ok(())
        }
        Some(("decrypt-file", sub)) => {
            let path = required_path(sub, "path")?;
            let restored = encryption_service(&config)?.decrypt_file(&path)?;
            println!("{}", restored.display());
            Ok(())
        }
        Some(("rotate-key", _)) => {
            let store = KeyStore::load_or_generate(&config.key_store.key_path)?;
            store.rotate()?;
            info!(path = %store.path().display(), "key rotated");
            Ok(())
        }
        Some(("hash", sub)) => {
            let value = sub.get_one::<String>("value").map(String::as_str).unwrap_or_default();
            println!("{}", hash_data(value.as_bytes()));
            Ok(())
        }
        Some(("verify-hash", sub)) => {
            let value = sub.get_one::<String>("value").map(String::as_str).unwrap_or_default();
            let record = sub.get_one::<String>("record").map(String::as_str).unwrap_or_default();
            if verify_hash(value.as_bytes(), record) {
                println!("match");
                Ok(())
            } else {
                println!("mismatch");
                process::exit(2);
            }
        }
        Some(("token", _)) => {
            println!("{}", encryption_service(&config)?.generate_secure_token());
            Ok(())
        }
        _ => Err(ConfigError::Invalid("no subcommand given, see --help".into()).into()),
    }
}

fn render(config: &AppConfig, sub: &ArgMatches) -> Result<()> {
    let template = required_path(sub, "template")?;
    let output = required_path(sub, "output")?;
    let data = load_form_data(sub)?;

    let engine = PatchEngine::new(config.engine.clone());
    let archive = DocumentArchive::open(&template)?;
    let (rendered, report) = engine.render_with_report(&archive, &data)?;
    write_atomic(&output, &rendered.to_bytes()?)?;

    if sub.get_flag("report") {
        let json = serde_json::to_string_pretty(&report).map_err(|e| ConfigError::Parse(e.to_string()))?;
        println!("{}", json);
    }
    info!(output = %output.display(), "template rendered");
    Ok(())
}

fn fields(config: &AppConfig, sub: &ArgMatches) -> Result<()> {
    let template = required_path(sub, "template")?;
    let engine = PatchEngine::new(config.engine.clone());
    for name in engine.form_fields(&DocumentArchive::open(&template)?)? {
        println!("{}", name);
    }
    Ok(())
}

async fn submit(config: &AppConfig, sub: &ArgMatches) -> Result<()> {
    let data = load_form_data(sub)?;
    let pipeline = SubmissionPipeline::with_office_converter(config, encryption_service(config)?);
    let receipt = pipeline
        .submit(sub.get_one::<String>("template-id").map(String::as_str), data)
        .await?;

    let json = serde_json::to_string_pretty(&receipt).map_err(|e| ConfigError::Parse(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

fn encryption_service(config: &AppConfig) -> Result<EncryptionService> {
    let store = KeyStore::load_or_generate(&config.key_store.key_path)?;
    Ok(EncryptionService::new(Arc::new(store))
        .with_encrypted_suffix(config.pipeline.encrypted_suffix.clone()))
}

fn required_path(matches: &ArgMatches, id: &str) -> Result<PathBuf> {
    matches
        .get_one::<PathBuf>(id)
        .cloned()
        .ok_or_else(|| Error::from(ConfigError::Invalid(format!("missing argument <{}>", id))))
}

/// Form data from `--data` (JSON or YAML) overlaid with `--set key=value` pairs.
fn load_form_data(matches: &ArgMatches) -> Result<PlaceholderMap> {
    let mut data = match matches.get_one::<PathBuf>("data") {
        Some(path) => parse_form_file(path)?,
        None => PlaceholderMap::new(),
    };

    if let Some(pairs) = matches.get_many::<String>("set") {
        for pair in pairs {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::Invalid(format!("expected key=value, got '{}'", pair)))?;
            data.insert_string(key, value);
        }
    }
    Ok(data)
}

fn parse_form_file(path: &Path) -> Result<PlaceholderMap> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    // Try JSON first, then YAML
    serde_json::from_str(&content)
        .or_else(|_| serde_yaml::from_str(&content))
        .map_err(|e| ConfigError::Parse(format!("form data {}: {}", path.display(), e)).into())
}

fn build_cli() -> Command {
    let template_file = Arg::new("template")
        .short('t')
        .long("template")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .help("Template .docx file")
        .required(true);

    let data_args = [
        Arg::new("data")
            .short('d')
            .long("data")
            .value_name("FILE")
            .value_parser(value_parser!(PathBuf))
            .help("Form data file (JSON/YAML)"),
        Arg::new("set")
            .short('s')
            .long("set")
            .value_name("KEY=VALUE")
            .action(ArgAction::Append)
            .help("Set one form field; repeatable, applied after --data"),
    ];

    let path_arg = || {
        Arg::new("path")
            .value_name("FILE")
            .value_parser(value_parser!(PathBuf))
            .required(true)
    };

    Command::new("docseal")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fills form templates, converts them to PDF and encrypts the result")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .value_parser(value_parser!(PathBuf))
            .global(true)
            .help("Configuration file (JSON/YAML)"))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .value_name("LEVEL")
            .value_parser(value_parser!(LogLevel))
            .global(true)
            .help("Log level (error/warn/info/debug/trace)"))

        .subcommand(Command::new("render")
            .about("Render a template with form data")
            .arg(template_file.clone())
            .args(data_args.clone())
            .arg(Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .help("Rendered .docx path"))
            .arg(Arg::new("report")
                .long("report")
                .action(ArgAction::SetTrue)
                .help("Print render counters as JSON")))

        .subcommand(Command::new("fields")
            .about("List legacy form-field names in a template")
            .arg(template_file))

        .subcommand(Command::new("submit")
            .about("Render, convert and encrypt one submission")
            .arg(Arg::new("template-id")
                .short('i')
                .long("template-id")
                .value_name("ID")
                .help("Whitelisted template id; defaults to the form's 'template' field"))
            .args(data_args))

        .subcommand(Command::new("encrypt-file")
            .about("Encrypt a file in place (<file>.encrypted, plaintext removed)")
            .arg(path_arg()))

        .subcommand(Command::new("decrypt-file")
            .about("Restore the plaintext next to an encrypted file")
            .arg(path_arg()))

        .subcommand(Command::new("rotate-key")
            .about("Replace the encryption key; existing records become undecryptable"))

        .subcommand(Command::new("hash")
            .about("Print a salted hash record for a value")
            .arg(Arg::new("value").required(true)))

        .subcommand(Command::new("verify-hash")
            .about("Check a value against a salted hash record")
            .arg(Arg::new("value").required(true))
            .arg(Arg::new("record").required(true)))

        .subcommand(Command::new("token")
            .about("Print a random 256-bit hex token"))
}
