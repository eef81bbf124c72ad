use serde::Serialize;

pub const MASTER: &str = "spark.master";
pub const DEPLOY_MODE: &str = "spark.submit.deployMode";
pub const DRIVER_BIND_ADDRESS: &str = "spark.driver.bindAddress";
pub const APP_NAME: &str = "spark.app.name";
pub const EXECUTOR_MEMORY: &str = "spark.executor.memory";
pub const DYNAMIC_ALLOCATION: &str = "spark.dynamicAllocation.enabled";
pub const NETWORK_TIMEOUT: &str = "spark.network.timeout";

/// Ordered option set handed to a session provider.
///
/// Insertion order is preserved; setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionConf {
    entries: Vec<(String, String)>,
}

impl SessionConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn set_all<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            self.set(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_and_replaces_in_place() {
        let mut conf = SessionConf::new();
        conf.set_all([(MASTER, "local[2]"), (APP_NAME, "a"), (EXECUTOR_MEMORY, "1g")]);
        conf.set(APP_NAME, "b");

        let keys: Vec<&str> = conf.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![MASTER, APP_NAME, EXECUTOR_MEMORY]);
        assert_eq!(conf.get(APP_NAME), Some("b"));
        assert_eq!(conf.len(), 3);
        assert_eq!(conf.get(DEPLOY_MODE), None);
    }
}
