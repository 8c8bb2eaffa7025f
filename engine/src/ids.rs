//! Time-ordered unique identifiers.
//!
//! Every oplog entry, task, and device is named by a UUIDv7 rendered as a
//! string. UUIDv7 embeds a millisecond timestamp in its most significant
//! bits, so ids minted on one device sort in creation order under plain
//! lexicographic comparison - the property the push high-water mark and the
//! oplog tie-breaker rely on. No coordination between devices is needed.

use uuid::{ContextV7, Timestamp, Uuid};

/// Generator for UUIDv7 identifiers.
///
/// The [`ContextV7`] carries a counter that keeps ids generated within the
/// same millisecond strictly increasing, so program order on a single
/// device is preserved even under rapid generation.
#[derive(Debug)]
pub struct IdGen {
    ctx: ContextV7,
}

impl IdGen {
    pub fn new() -> Self {
        Self {
            ctx: ContextV7::new(),
        }
    }

    /// Mint a fresh id, greater than every id this generator has produced.
    pub fn generate(&self) -> String {
        Uuid::new_v7(Timestamp::now(&self.ctx)).to_string()
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_valid_uuids() {
        let ids = IdGen::new();
        let id = ids.generate();
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn ids_are_unique() {
        let ids = IdGen::new();
        let a = ids.generate();
        let b = ids.generate();
        assert_ne!(a, b);
    }

    #[test]
    fn rapid_generation_sorts_in_creation_order() {
        let ids = IdGen::new();
        let mut generated = Vec::with_capacity(10_000);
        for _ in 0..10_000 {
            generated.push(ids.generate());
        }

        let mut sorted = generated.clone();
        sorted.sort();
        assert_eq!(generated, sorted);
    }
}
