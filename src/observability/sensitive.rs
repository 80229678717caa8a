use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Keys of a `KEY=VALUE;` connection string whose values are secrets
const SECRET_KEYS: [&str; 4] = ["pwd", "password", "token", "secret"];

/// A wrapper for secrets such as connection strings that redacts them when
/// formatted for logging. Use `.expose()` to hand the value to a driver.
///
/// Serializing writes a placeholder, so a serialized value cannot be read
/// back. Skip the field when a structure must round-trip.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Sensitive<String> {
    /// The connection string with secret attribute values masked.
    pub fn masked(&self) -> String {
        mask_connection_string(&self.0)
    }
}

impl<T> Debug for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> Display for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Serialize> Serialize for Sensitive<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("***")
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Sensitive)
    }
}

/// Masks the values of password-like attributes in a `KEY=VALUE;` string.
pub fn mask_connection_string(connection: &str) -> String {
    connection
        .split(';')
        .map(|attr| match attr.split_once('=') {
            Some((key, _)) if SECRET_KEYS.contains(&key.trim().to_ascii_lowercase().as_str()) => {
                format!("{key}=***")
            }
            _ => attr.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
