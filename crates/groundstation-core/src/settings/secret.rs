// # Sealed Secrets
//
// Passwords and broker usernames are stored sealed inside the
// configuration store and inside every settings snapshot. They are opened
// only at the moment transport credentials are built.
//
// The sealing scheme is pluggable through [`SecretCodec`]. The default
// [`PlainTextCodec`] stores the value as-is, which is what a host without a
// platform keyring gets.

use crate::error::Result;

/// A secret value as stored by the configuration store
///
/// The inner representation is whatever the active [`SecretCodec`] produced.
/// `Debug` never prints it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SealedSecret(String);

impl SealedSecret {
    /// Wrap an already-sealed representation
    pub fn from_sealed(sealed: impl Into<String>) -> Self {
        Self(sealed.into())
    }

    /// Seal a plaintext value with the given codec
    pub fn seal(codec: &dyn SecretCodec, plaintext: &str) -> Result<Self> {
        Ok(Self(codec.seal(plaintext)?))
    }

    /// Open the secret with the given codec
    pub fn open(&self, codec: &dyn SecretCodec) -> Result<String> {
        if self.0.is_empty() {
            return Ok(String::new());
        }
        codec.open(&self.0)
    }

    /// The sealed representation
    pub fn as_sealed(&self) -> &str {
        &self.0
    }

    /// Whether no secret is stored
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("SealedSecret(<empty>)")
        } else {
            f.write_str("SealedSecret(<REDACTED>)")
        }
    }
}

/// Sealing scheme used by the configuration store
pub trait SecretCodec: Send + Sync {
    /// Seal a plaintext value
    fn seal(&self, plaintext: &str) -> Result<String>;

    /// Open a sealed value
    fn open(&self, sealed: &str) -> Result<String>;
}

/// Identity codec
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextCodec;

impl SecretCodec for PlainTextCodec {
    fn seal(&self, plaintext: &str) -> Result<String> {
        Ok(plaintext.to_string())
    }

    fn open(&self, sealed: &str) -> Result<String> {
        Ok(sealed.to_string())
    }
}
