use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use url::Url;

pub const US1_BASE_URL: &str = "https://api.crowdstrike.com";
pub const US2_BASE_URL: &str = "https://api.us-2.crowdstrike.com";
pub const EU1_BASE_URL: &str = "https://api.eu-1.crowdstrike.com";
pub const USGOV1_BASE_URL: &str = "https://api.laggar.gcw.crowdstrike.com";
pub const USGOV2_BASE_URL: &str = "https://api.us-gov-2.crowdstrike.mil";

#[derive(Error, Debug, PartialEq)]
pub enum CloudError {
    #[error("unknown Falcon cloud `{0}`, expected auto, us1, us2, eu1, usgov1, usgov2 or an http(s) url")]
    UnknownCloud(String),
    #[error("invalid Falcon base url `{0}`: {1}")]
    InvalidUrl(String, String),
}

/// Falcon cloud the API client talks to.
///
/// `Auto` authenticates against US-1 and follows the region the token endpoint reports.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum FalconCloud {
    #[default]
    Auto,
    Us1,
    Us2,
    Eu1,
    UsGov1,
    UsGov2,
    Custom(Url),
}

impl FalconCloud {
    /// Base url for API requests, without trailing slash.
    pub fn base_url(&self) -> String {
        match self {
            Self::Auto | Self::Us1 => US1_BASE_URL.to_string(),
            Self::Us2 => US2_BASE_URL.to_string(),
            Self::Eu1 => EU1_BASE_URL.to_string(),
            Self::UsGov1 => USGOV1_BASE_URL.to_string(),
            Self::UsGov2 => USGOV2_BASE_URL.to_string(),
            Self::Custom(url) => url.as_str().trim_end_matches('/').to_string(),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }

    /// Maps the region reported by the `X-Cs-Region` header to its cloud.
    pub fn from_region(region: &str) -> Option<Self> {
        match region.trim().to_lowercase().as_str() {
            "us-1" => Some(Self::Us1),
            "us-2" => Some(Self::Us2),
            "eu-1" => Some(Self::Eu1),
            "us-gov-1" => Some(Self::UsGov1),
            "us-gov-2" => Some(Self::UsGov2),
            _ => None,
        }
    }
}

impl FromStr for FalconCloud {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let lowercase = value.to_lowercase();
        if lowercase.starts_with("http://") || lowercase.starts_with("https://") {
            return Url::parse(value)
                .map(Self::Custom)
                .map_err(|err| CloudError::InvalidUrl(value.to_string(), err.to_string()));
        }
        match lowercase.as_str() {
            "auto" => Ok(Self::Auto),
            "us1" | "us-1" => Ok(Self::Us1),
            "us2" | "us-2" => Ok(Self::Us2),
            "eu1" | "eu-1" => Ok(Self::Eu1),
            "usgov1" | "us-gov-1" => Ok(Self::UsGov1),
            "usgov2" | "us-gov-2" => Ok(Self::UsGov2),
            _ => Err(CloudError::UnknownCloud(value.to_string())),
        }
    }
}

impl TryFrom<String> for FalconCloud {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for FalconCloud {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Us1 => write!(f, "us-1"),
            Self::Us2 => write!(f, "us-2"),
            Self::Eu1 => write!(f, "eu-1"),
            Self::UsGov1 => write!(f, "us-gov-1"),
            Self::UsGov2 => write!(f, "us-gov-2"),
            Self::Custom(url) => write!(f, "{url}"),
        }
    }
}
