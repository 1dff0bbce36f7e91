#[cfg(any(feature = "with-serde", feature = "with-csv"))]
use anyhow::Context;
use anyhow::{Result, bail};

use crate::args::Cli;
use crate::mx::MxSummary;
use puremail::{Address, ParseError};

#[cfg_attr(feature = "with-serde", derive(serde::Serialize))]
pub struct OutputRow {
    pub input: String,
    pub valid: bool,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub login: Option<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub domain: Option<String>,
    pub tags: Vec<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub mail: Option<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub fingerprint: Option<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub error: Option<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub mx: Option<MxSummary>,
}

impl OutputRow {
    pub fn new(input: String, parsed: &Result<Address, ParseError>) -> Self {
        match parsed {
            Ok(address) => Self {
                input,
                valid: true,
                login: Some(address.login().to_string()),
                domain: Some(address.domain().to_string()),
                tags: address.tags().iter().map(ToString::to_string).collect(),
                mail: Some(address.mail_full()),
                fingerprint: Some(hex(&address.hash())),
                error: None,
                mx: None,
            },
            Err(err) => Self {
                input,
                valid: false,
                login: None,
                domain: None,
                tags: Vec::new(),
                mail: None,
                fingerprint: None,
                error: Some(err.to_string()),
                mx: None,
            },
        }
    }

    /// Parsed, and when checked, with a reachable mail domain.
    pub fn is_ok(&self) -> bool {
        self.valid && self.mx.as_ref().is_none_or(|mx| mx.reachable)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn emit(rows: &[OutputRow], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => {
            for r in rows {
                match (&r.mail, &r.error) {
                    (Some(mail), _) => println!("[OK]    {} -> {mail}", r.input),
                    (None, Some(error)) => println!("[INVALID] {} :: {error}", r.input),
                    (None, None) => println!("[INVALID] {}", r.input),
                }
                if let Some(mx) = &r.mx {
                    println!("        {}", mx.human_summary());
                }
            }
            Ok(())
        }
        "json" => {
            #[cfg(feature = "with-serde")]
            {
                let s = serde_json::to_string_pretty(rows)?;
                if let Some(path) = &cli.out {
                    write_all_atomically(path, s.as_bytes())
                        .with_context(|| format!("write {path}"))?;
                } else {
                    println!("{s}");
                }
                Ok(())
            }
            #[cfg(not(feature = "with-serde"))]
            {
                bail!("format=json nécessite la feature 'with-serde'")
            }
        }
        "ndjson" => {
            #[cfg(feature = "with-serde")]
            {
                let mut buf = Vec::new();
                for r in rows {
                    buf.extend_from_slice(serde_json::to_string(r)?.as_bytes());
                    buf.push(b'\n');
                }
                if let Some(path) = &cli.out {
                    write_all_atomically(path, &buf).with_context(|| format!("write {path}"))?;
                } else {
                    print!("{}", String::from_utf8_lossy(&buf));
                }
                Ok(())
            }
            #[cfg(not(feature = "with-serde"))]
            {
                bail!("format=ndjson nécessite la feature 'with-serde'")
            }
        }
        "csv" => {
            #[cfg(feature = "with-csv")]
            {
                let mut wtr = csv::Writer::from_writer(Vec::new());
                wtr.write_record([
                    "input",
                    "valid",
                    "login",
                    "domain",
                    "tags",
                    "mail",
                    "fingerprint",
                    "error",
                    "mx",
                ])?;
                for r in rows {
                    let tags = r.tags.join("|");
                    let mx = match &r.mx {
                        Some(mx) if mx.reachable => "true",
                        Some(_) => "false",
                        None => "",
                    };
                    wtr.write_record([
                        r.input.as_str(),
                        if r.valid { "true" } else { "false" },
                        r.login.as_deref().unwrap_or(""),
                        r.domain.as_deref().unwrap_or(""),
                        tags.as_str(),
                        r.mail.as_deref().unwrap_or(""),
                        r.fingerprint.as_deref().unwrap_or(""),
                        r.error.as_deref().unwrap_or(""),
                        mx,
                    ])?;
                }
                let data = wtr.into_inner().context("flush csv")?;
                if let Some(path) = &cli.out {
                    write_all_atomically(path, &data).with_context(|| format!("write {path}"))?;
                } else {
                    print!("{}", String::from_utf8_lossy(&data));
                }
                Ok(())
            }
            #[cfg(not(feature = "with-csv"))]
            {
                bail!("format=csv nécessite la feature 'with-csv'")
            }
        }
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

#[cfg(any(feature = "with-serde", feature = "with-csv"))]
fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
