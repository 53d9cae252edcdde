//! Snapshot fingerprints.
//!
//! A fingerprint is the 32-bit FNV-1a hash of every entry name of a snapshot
//! concatenated in the order given. It identifies which files exist, not
//! their contents, and it is sensitive to ordering.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Incremental FNV-1a (32-bit) hasher.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    state: u32,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprinter {
    /// Create a hasher in its initial state.
    pub fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    /// Feed raw bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= u32::from(*byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    /// Feed one entry name.
    pub fn push_name(&mut self, name: &str) {
        self.update(name.as_bytes());
    }

    /// Current hash value.
    pub fn finish(&self) -> u32 {
        self.state
    }
}

/// Fingerprint an ordered sequence of entry names.
pub fn fingerprint<I, S>(names: I) -> u32
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Fingerprinter::new();
    for name in names {
        hasher.push_name(name.as_ref());
    }
    hasher.finish()
}
