use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

/// First 8 hex characters of the SHA-256 of `text`
pub fn digest8(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..4])
}

/// Digest and collision sequence number for one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minted {
    pub digest: String,
    pub seq: u32,
}

impl Minted {
    /// Renders `<scope>-<label>-<digest>-<seq>`
    pub fn render(&self, scope: &str, label: &str) -> String {
        let mut buf = itoa::Buffer::new();
        let seq = buf.format(self.seq);
        let mut id =
            String::with_capacity(scope.len() + label.len() + self.digest.len() + seq.len() + 3);
        id.push_str(scope);
        id.push('-');
        id.push_str(label);
        id.push('-');
        id.push_str(&self.digest);
        id.push('-');
        id.push_str(seq);
        id
    }
}

/// Mints row identifiers within one (subject, property) scope.
///
/// Identical texts get the same digest but increasing sequence numbers, so
/// identifiers stay unique within the scope. Collisions are only tracked
/// inside the scope; callers create a fresh minter (or call [`reset`]) for
/// each new property group.
///
/// [`reset`]: IdentifierMinter::reset
#[derive(Debug, Default)]
pub struct IdentifierMinter {
    next_seq: FxHashMap<String, u32>,
}

impl IdentifierMinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, text: &str) -> Minted {
        let digest = digest8(text);
        let slot = self.next_seq.entry(digest.clone()).or_insert(0);
        let seq = *slot;
        *slot += 1;
        Minted { digest, seq }
    }

    pub fn reset(&mut self) {
        self.next_seq.clear();
    }
}
