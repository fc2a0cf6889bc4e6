use std::collections::HashSet;

/// Remembers every library id accepted during one collection session.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    /// True the first time `id` is offered, false afterwards.
    pub fn accept(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string())
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_once() {
        let mut d = Deduplicator::default();
        assert!(!d.is_seen("42"));
        assert!(d.accept("42"));
        assert!(!d.accept("42"));
        assert!(d.is_seen("42"));
        assert!(d.accept("43"));
        assert_eq!(d.len(), 2);
    }
}
