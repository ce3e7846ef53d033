use std::env;

use ratatui::style::Color;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown STORAGE_PROVIDER '{0}' (expected 's3' or 'r2')")]
    UnknownProvider(String),
    #[error("the r2 provider requires CLOUDFLARE_ACCOUNT_ID to be set")]
    MissingAccountId,
}

#[derive(Clone, Debug)]
pub enum Provider {
    S3,
    R2 {
        account_id: String,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        /// Bucket names known from outside the S3 API (the Cloudflare
        /// dashboard exposes them without R2 API keys).
        external_buckets: Vec<String>,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub provider: Provider,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = get("STORAGE_PROVIDER").unwrap_or_default().to_lowercase();
        let provider = match raw.as_str() {
            "" | "s3" => Provider::S3,
            "r2" => {
                let account_id = get("CLOUDFLARE_ACCOUNT_ID")
                    .filter(|v| !v.is_empty())
                    .ok_or(ConfigError::MissingAccountId)?;
                Provider::R2 {
                    account_id,
                    access_key_id: get("R2_ACCESS_KEY_ID").filter(|v| !v.is_empty()),
                    secret_access_key: get("R2_SECRET_ACCESS_KEY").filter(|v| !v.is_empty()),
                    external_buckets: parse_bucket_names(
                        get("R2_BUCKET_NAMES").unwrap_or_default().as_str(),
                    ),
                }
            }
            other => return Err(ConfigError::UnknownProvider(other.to_string())),
        };
        Ok(Self { provider })
    }

    /// Scheme used in displayed paths, e.g. `s3://bucket/key`.
    pub fn provider_label(&self) -> &'static str {
        match self.provider {
            Provider::S3 => "s3",
            Provider::R2 { .. } => "r2",
        }
    }

    pub fn accent(&self) -> Color {
        match self.provider {
            Provider::S3 => Color::Rgb(0xff, 0x99, 0x00),
            Provider::R2 { .. } => Color::Rgb(0xf3, 0x80, 0x20),
        }
    }

    /// True when object-level calls cannot be made (R2 without API keys);
    /// bucket names from the external list stay browsable.
    pub fn needs_credentials(&self) -> bool {
        match &self.provider {
            Provider::S3 => false,
            Provider::R2 {
                access_key_id,
                secret_access_key,
                ..
            } => access_key_id.is_none() || secret_access_key.is_none(),
        }
    }

    pub fn external_buckets(&self) -> &[String] {
        match &self.provider {
            Provider::S3 => &[],
            Provider::R2 {
                external_buckets, ..
            } => external_buckets,
        }
    }

    /// Body of the standing error modal shown when object access is
    /// attempted without API keys.
    pub fn credentials_help(&self) -> &'static str {
        "R2 API credentials are not configured, so bucket contents cannot be\n\
         browsed or modified.\n\n\
         Create an R2 API token in the Cloudflare dashboard, then:\n\n\
           export R2_ACCESS_KEY_ID=<access key id>\n\
           export R2_SECRET_ACCESS_KEY=<secret access key>\n\n\
         and restart."
    }
}

fn parse_bucket_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
