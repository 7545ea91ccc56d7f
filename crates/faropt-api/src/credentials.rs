use serde::Serialize;
use std::str::FromStr;

/// Credentials to connect to the FarOpt gateway
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FarOptCredentials {
    api_key: String,
}

impl FarOptCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Creates a new instance of `FarOptCredentials` from environment variables.
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let api_key = std::env::var("FAROPT_API_KEY")?;
        Ok(Self::new(api_key))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl FromStr for FarOptCredentials {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err("API key cannot be empty".to_string())
        } else {
            Ok(Self::new(s))
        }
    }
}
