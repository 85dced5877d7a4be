//! `FieldCrypt` CLI tool for key management and cipher record operations.

#![warn(clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldcrypt::codec::{FieldCodec, StringCodec};
use fieldcrypt::config::EncryptionConfig;
use fieldcrypt::facade::EncryptionFacade;
use fieldcrypt::key_provider::KeyProvider;
use fieldcrypt::record::CipherRecord;
use fieldcrypt_key_file::FileKeyProvider;
use tracing_subscriber::EnvFilter;

const DEFAULT_KEY_DIR: &str = "./keys";

#[derive(Parser)]
#[command(name = "fieldcrypt")]
#[command(about = "FieldCrypt key management CLI", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Key directory (overrides configuration)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the first version of a key
    Keygen {
        /// Key name (defaults to the configured encryption key name)
        #[arg(short, long)]
        name: Option<String>,
        /// Mechanism type the key is for
        #[arg(short, long)]
        mechanism: Option<String>,
    },
    /// Add a new version of an existing key
    Rotate {
        /// Key name (defaults to the configured encryption key name)
        #[arg(short, long)]
        name: Option<String>,
        /// Mechanism type the key is for
        #[arg(short, long)]
        mechanism: Option<String>,
    },
    /// Encrypt a value into a cipher record
    Encrypt {
        /// Plaintext value
        value: String,
        /// Key name (defaults to the configured encryption key name)
        #[arg(short, long)]
        name: Option<String>,
        /// Mechanism type
        #[arg(short, long)]
        algorithm: Option<String>,
    },
    /// Decrypt a cipher record
    Decrypt {
        /// Cipher record, escaped as printed by `encrypt`
        record: String,
        /// Key name (defaults to the one stamped in the record)
        #[arg(short, long)]
        name: Option<String>,
        /// Mechanism type (defaults to the one stamped in the record)
        #[arg(short, long)]
        algorithm: Option<String>,
    },
    /// Compute the blind index of a value
    Hash {
        /// Plaintext value
        value: String,
        /// Key name (defaults to the configured blind index key name)
        #[arg(short, long)]
        name: Option<String>,
        /// Mechanism type
        #[arg(short, long)]
        algorithm: Option<String>,
    },
    /// Show the metadata of a cipher record
    Inspect {
        /// Cipher record, escaped as printed by `encrypt`
        record: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let key_dir = cli
        .dir
        .or_else(|| config.key_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_DIR));

    match cli.command {
        Commands::Keygen { name, mechanism } => {
            let provider = FileKeyProvider::init(&key_dir)?;
            let name = name.unwrap_or_else(|| config.encryption_key_name.clone());
            let mechanism = mechanism.unwrap_or_else(|| config.default_algorithm.clone());
            if let Some(version) = provider.latest_version(&name, &mechanism)? {
                anyhow::bail!(
                    "key {name} ({mechanism}) already exists at version {version}; use rotate"
                );
            }
            let version = provider.create_key(&name, &mechanism)?;
            println!("Created {name} ({mechanism}) v{version} in {}", key_dir.display());
        }
        Commands::Rotate { name, mechanism } => {
            let provider = FileKeyProvider::new(&key_dir)?;
            let name = name.unwrap_or_else(|| config.encryption_key_name.clone());
            let mechanism = mechanism.unwrap_or_else(|| config.default_algorithm.clone());
            let previous = provider
                .latest_version(&name, &mechanism)?
                .with_context(|| format!("key {name} ({mechanism}) does not exist; use keygen"))?;
            let version = provider.create_key(&name, &mechanism)?;
            tracing::info!(
                key = %name,
                mechanism = %mechanism,
                from = previous,
                to = version,
                "rotated key"
            );
            println!("Rotated {name} ({mechanism}) v{previous} -> v{version}");
        }
        Commands::Encrypt { value, name, algorithm } => {
            let codec = codec(&key_dir)?;
            let name = name.unwrap_or_else(|| config.encryption_key_name.clone());
            let algorithm = algorithm.unwrap_or_else(|| config.default_algorithm.clone());
            let record = codec.encrypt(&value, &name, &algorithm)?;
            println!("{}", escape(&record));
        }
        Commands::Decrypt { record, name, algorithm } => {
            let codec = codec(&key_dir)?;
            let record = unescape(&record)?;
            let parsed = CipherRecord::from_text(&record).context("not a cipher record")?;
            let name = name.as_deref().unwrap_or_else(|| parsed.key_name());
            let algorithm = algorithm.as_deref().unwrap_or_else(|| parsed.mechanism_type());
            let plaintext = codec.decrypt(&record, name, algorithm)?;
            println!("{plaintext}");
        }
        Commands::Hash { value, name, algorithm } => {
            let codec = codec(&key_dir)?;
            let name = name.unwrap_or_else(|| config.blind_id_key_name.clone());
            let algorithm = algorithm.unwrap_or_else(|| config.blind_id_algorithm.clone());
            println!("{}", escape(&codec.hash(&value, &name, &algorithm)?));
        }
        Commands::Inspect { record } => {
            let record = unescape(&record)?;
            let parsed = CipherRecord::from_text(&record).context("not a cipher record")?;
            println!("key name:   {}", parsed.key_name());
            println!("version:    {}", parsed.key_version());
            println!("mechanism:  {}", parsed.mechanism_type());
            println!("content:    {} bytes", parsed.content().len());

            if let Ok(provider) = FileKeyProvider::new(&key_dir) {
                match provider.latest_key(parsed.key_name(), parsed.mechanism_type()) {
                    Ok(latest) if latest.version() > parsed.key_version() => {
                        println!("status:     stale (latest v{})", latest.version());
                    }
                    Ok(_) => println!("status:     current"),
                    Err(e) => println!("status:     unknown ({e})"),
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<EncryptionConfig> {
    let config = match path {
        Some(path) => EncryptionConfig::from_file(path)?,
        None => EncryptionConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn codec(key_dir: &std::path::Path) -> Result<StringCodec> {
    let provider = FileKeyProvider::new(key_dir)
        .with_context(|| format!("cannot open key directory {}", key_dir.display()))?;
    let facade = EncryptionFacade::with_default_mechanisms(Arc::new(provider));
    Ok(StringCodec::new(Arc::new(facade)))
}

/// Escapes control and non-ASCII characters of records and blind indexes.
fn escape(text: &str) -> String {
    text.chars().flat_map(char::escape_default).collect()
}

fn unescape(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            Some('u') => {
                let code: String = chars
                    .by_ref()
                    .skip_while(|c| *c == '{')
                    .take_while(|c| *c != '}')
                    .collect();
                let code = u32::from_str_radix(&code, 16)
                    .with_context(|| format!("bad escape \\u{{{code}}}"))?;
                let c = char::from_u32(code)
                    .with_context(|| format!("invalid code point {code:#x}"))?;
                out.push(c);
            }
            other => {
                let sequence = other.map(String::from).unwrap_or_default();
                anyhow::bail!("unsupported escape sequence: \\{sequence}")
            }
        }
    }
    Ok(out)
}
