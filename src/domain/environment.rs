use crate::error::ConsentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sandbox (`SB`) or real-data (`RD`) bank environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvPrefix {
    Sandbox,
    RealData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvType {
    Test,
    Prelive,
    Production,
}

/// A bank environment such as `SB Test` or `RD Prelive`.
///
/// Serialized as its label, which is also the form used in storage keys and
/// certificate file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Environment {
    pub prefix: EnvPrefix,
    pub kind: EnvType,
}

impl Environment {
    pub fn new(prefix: EnvPrefix, kind: EnvType) -> Self {
        Self { prefix, kind }
    }

    pub fn prefix_code(&self) -> &'static str {
        match self.prefix {
            EnvPrefix::Sandbox => "SB",
            EnvPrefix::RealData => "RD",
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            EnvType::Test => "Test",
            EnvType::Prelive => "Prelive",
            EnvType::Production => "Production",
        }
    }

    pub fn is_sandbox(&self) -> bool {
        self.prefix == EnvPrefix::Sandbox
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.prefix_code(), self.type_name())
    }
}

impl FromStr for Environment {
    type Err = ConsentError;

    /// Splits the label on whitespace and reads the first and last words.
    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let invalid = || ConsentError::InvalidEnvironment(label.to_string());
        let mut words = label.split_whitespace();
        let first = words.next().ok_or_else(invalid)?;
        let last = words.last().ok_or_else(invalid)?;

        let prefix = match first {
            "SB" => EnvPrefix::Sandbox,
            "RD" => EnvPrefix::RealData,
            _ => return Err(invalid()),
        };
        let kind = match last {
            "Test" => EnvType::Test,
            "Prelive" => EnvType::Prelive,
            "Production" => EnvType::Production,
            _ => return Err(invalid()),
        };
        Ok(Self { prefix, kind })
    }
}

impl TryFrom<String> for Environment {
    type Error = ConsentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Environment> for String {
    fn from(env: Environment) -> Self {
        env.to_string()
    }
}
