use std::time::Duration;

use anyhow::{Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use puremail::{MxCacheOptions, ParseMode};

#[derive(Parser)]
#[command(name = "puremail-cli", version)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// lit des adresses depuis stdin (une par ligne)
    #[arg(long)]
    pub stdin: bool,

    /// write report to file (JSON/NDJSON/CSV selon --format)
    #[arg(long)]
    pub out: Option<String>,

    /// format: human|json|ndjson|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// mode rapide : valide les tags sans les conserver
    #[arg(long)]
    pub fast: bool,

    /// vérifie que le domaine possède des enregistrements MX
    #[arg(long)]
    pub mx: bool,

    /// durée de vie d'une réponse MX positive (secondes)
    #[arg(long, default_value_t = 6 * 60 * 60)]
    pub mx_positive_ttl: u64,

    /// durée de vie d'une réponse MX négative (secondes)
    #[arg(long, default_value_t = 15 * 60)]
    pub mx_negative_ttl: u64,

    /// délai max d'une requête DNS (millisecondes)
    #[arg(long, default_value_t = 400)]
    pub dns_timeout_ms: u64,

    /// attente max d'un créneau de requête DNS (millisecondes)
    #[arg(long, default_value_t = 2_000)]
    pub dns_burst_ms: u64,

    /// nombre max de requêtes DNS simultanées
    #[arg(long, default_value_t = 250)]
    pub max_lookups: u32,

    /// exposant de sharding du cache MX (2^(n+1) shards)
    #[arg(long, default_value_t = 4)]
    pub shard_exponent: u8,

    /// verbosité des logs sur stderr (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    Validate {
        /// mode rapide (prend le pas sur l'option globale)
        #[arg(long)]
        fast: bool,
        email: String,
    },
}

impl Cli {
    pub fn parse_mode(&self) -> ParseMode {
        let sub_fast = matches!(self.cmd, Some(Commands::Validate { fast: true, .. }));
        if self.fast || sub_fast {
            ParseMode::Fast
        } else {
            ParseMode::Full
        }
    }

    pub fn cache_options(&self) -> Result<MxCacheOptions> {
        let options = MxCacheOptions {
            positive_ttl: Duration::from_secs(self.mx_positive_ttl),
            negative_ttl: Duration::from_secs(self.mx_negative_ttl),
            dns_timeout: Duration::from_millis(self.dns_timeout_ms),
            dns_burst_timeout: Duration::from_millis(self.dns_burst_ms),
            max_concurrent_lookups: self.max_lookups,
            shard_exponent: self.shard_exponent,
            ..MxCacheOptions::default()
        };
        if let Err(err) = options.validate() {
            bail!("invalid MX cache options: {err}");
        }
        Ok(options)
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
