use std::fmt;

/// A 32-byte Blake3 hash of a value's canonical binary encoding.
///
/// Two processes encoding the same logical value produce the same digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Computes the digest of already-encoded canonical bytes.
    pub fn from_data(data: &[u8]) -> Self {
        Digest(*blake3::hash(data).as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Disambiguation code of a registered concrete type.
///
/// Derived from the Blake3 hash of the registered name. Zero bytes are
/// skipped so a prefix never contains 0x00.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix([u8; 4]);

impl Prefix {
    pub fn from_name(name: &str) -> Self {
        let hash = blake3::hash(name.as_bytes());
        let mut out = [0u8; 4];
        let mut nonzero = hash.as_bytes().iter().copied().filter(|b| *b != 0);
        for slot in &mut out {
            // 32 hash bytes are all zero with negligible probability
            *slot = nonzero.next().unwrap_or(0xff);
        }
        Prefix(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Prefix)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prefix({})", self)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}
