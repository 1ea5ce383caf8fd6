use thiserror::Error;

/// Payload stored in a [`super::TtlCache`] entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheValue {
    Int(i64),
    Uint(u64),
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache key not found: {0}")]
    NotFound(String),
    #[error("cache value of {key} is {kind}, not a number")]
    TypeMismatch { key: String, kind: &'static str },
    #[error("cache value of {0} is already zero")]
    Underflow(String),
    #[error("cache value of {0} would overflow")]
    Overflow(String),
}

impl CacheValue {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub(super) fn increment(&mut self, key: &str) -> Result<(), CacheError> {
        match self {
            Self::Int(value) => {
                *value = value
                    .checked_add(1)
                    .ok_or_else(|| CacheError::Overflow(key.to_string()))?;
            }
            Self::Uint(value) => {
                *value = value
                    .checked_add(1)
                    .ok_or_else(|| CacheError::Overflow(key.to_string()))?;
            }
            Self::Text(_) | Self::Bytes(_) => {
                return Err(CacheError::TypeMismatch {
                    key: key.to_string(),
                    kind: self.kind(),
                })
            }
        }
        Ok(())
    }

    // Signed values may go negative; unsigned ones stop at zero.
    pub(super) fn decrement(&mut self, key: &str) -> Result<(), CacheError> {
        match self {
            Self::Int(value) => {
                *value = value
                    .checked_sub(1)
                    .ok_or_else(|| CacheError::Overflow(key.to_string()))?;
            }
            Self::Uint(value) => {
                *value = value
                    .checked_sub(1)
                    .ok_or_else(|| CacheError::Underflow(key.to_string()))?;
            }
            Self::Text(_) | Self::Bytes(_) => {
                return Err(CacheError::TypeMismatch {
                    key: key.to_string(),
                    kind: self.kind(),
                })
            }
        }
        Ok(())
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for CacheValue {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}
