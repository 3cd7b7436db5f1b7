//! Conduit address source

use std::sync::RwLock;

/// Supplies the local addresses a target registers with
pub trait Conduit: Send + Sync {
    /// Current local addresses in CIDR notation
    fn ips(&self) -> Vec<String>;
}

/// Conduit with a fixed, replaceable address list
#[derive(Debug, Default)]
pub struct StaticConduit {
    ips: RwLock<Vec<String>>,
}

impl StaticConduit {
    /// Create a conduit with the given addresses
    pub fn new<I, S>(ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ips: RwLock::new(ips.into_iter().map(Into::into).collect()),
        }
    }

    /// Replace the addresses
    pub fn set_ips(&self, ips: Vec<String>) {
        match self.ips.write() {
            Ok(mut guard) => *guard = ips,
            Err(poisoned) => *poisoned.into_inner() = ips,
        }
    }
}

impl Conduit for StaticConduit {
    fn ips(&self) -> Vec<String> {
        match self.ips.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_ips() {
        let conduit = StaticConduit::new(["172.16.0.1/24"]);
        assert_eq!(conduit.ips(), vec!["172.16.0.1/24".to_string()]);

        conduit.set_ips(vec![]);
        assert!(conduit.ips().is_empty());
    }
}
