//! INFO report parsing
//!
//! `key:value` lines grouped under `# Section` headers

use std::collections::HashMap;

/// Parsed INFO reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoReport {
    fields: HashMap<String, String>,
}

impl InfoReport {
    pub fn parse(text: &str) -> Self {
        let fields = text
            .lines()
            .map(|line| line.trim_end_matches('\r').trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `redis_version`
    pub fn version(&self) -> Option<&str> {
        self.get("redis_version")
    }

    /// Leading integer of `redis_version`
    pub fn major_version(&self) -> Option<u32> {
        self.version()?.split('.').next()?.trim().parse().ok()
    }

    /// `role` (`master` or `slave`)
    pub fn role(&self) -> Option<&str> {
        self.get("role")
    }
}
