/// Single predicate separating the configured operator from ordinary
/// requesters. Gates the operator-only entry points, the one-key-per-owner
/// exemption, and the right to name an arbitrary target identity.
#[derive(Clone, Copy, Debug)]
pub struct AccessGate {
    admin_id: i64,
}

impl AccessGate {
    pub fn new(admin_id: i64) -> Self {
        Self { admin_id }
    }

    pub fn is_privileged(&self, identity: i64) -> bool {
        self.admin_id == identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_configured_identity_is_privileged() {
        let gate = AccessGate::new(99);
        assert!(gate.is_privileged(99));
        assert!(!gate.is_privileged(98));
        assert!(!gate.is_privileged(-99));
        assert!(!gate.is_privileged(0));
    }
}
