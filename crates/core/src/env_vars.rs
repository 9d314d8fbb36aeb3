// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered environment variables with scoped overriding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Text shown in place of a secure value.
pub const MASK: &str = "********";

/// One named environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secure: bool,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), secure: false }
    }

    pub fn secure(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), secure: true }
    }

    /// Value suitable for console output.
    pub fn display_value(&self) -> &str {
        if self.secure {
            MASK
        } else {
            &self.value
        }
    }
}

impl fmt::Display for EnvironmentVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.display_value())
    }
}

/// Insertion-ordered set of environment variables keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentVariables(Vec<EnvironmentVariable>);

impl EnvironmentVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing an existing value in place.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set(EnvironmentVariable::new(name, value));
    }

    pub fn add_secure(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set(EnvironmentVariable::secure(name, value));
    }

    pub fn set(&mut self, var: EnvironmentVariable) {
        match self.0.iter_mut().find(|v| v.name == var.name) {
            Some(existing) => *existing = var,
            None => self.0.push(var),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|v| v.name == name).map(|v| v.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|v| v.name == name)
    }

    /// Apply `other` on top of `self`: shared names take `other`'s value at
    /// their original position, new names are appended in `other`'s order.
    pub fn override_with(&mut self, other: &EnvironmentVariables) {
        for var in &other.0 {
            self.set(var.clone());
        }
    }

    /// `self` overridden by `other`, leaving both inputs untouched.
    pub fn overridden_by(&self, other: &EnvironmentVariables) -> Self {
        let mut merged = self.clone();
        merged.override_with(other);
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvironmentVariable> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Name/value pairs for handing to a child process.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0.iter().map(|v| (v.name.clone(), v.value.clone())).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = Self::new();
        for (k, v) in iter {
            vars.add(k, v);
        }
        vars
    }
}

impl<'a> IntoIterator for &'a EnvironmentVariables {
    type Item = &'a EnvironmentVariable;
    type IntoIter = std::slice::Iter<'a, EnvironmentVariable>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
#[path = "env_vars_tests.rs"]
mod tests;
