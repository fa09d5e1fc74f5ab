//! Destructive-keyword guard
//!
//! Rejects calls whose query text contains a destructive statement keyword.
//! Write and admin functions have all of their string arguments checked. Runs before dispatch and independently of
//! the permission grant.

use crate::error::{RelayError, Result};
use crate::registry::{FunctionClass, FunctionDescriptor};
use arc_swap::ArcSwap;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
struct KeywordPattern {
    regex: Option<Regex>,
}

impl KeywordPattern {
    fn compile(keywords: &[String]) -> Result<Self> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { regex: None });
        }

        let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
        let regex = Regex::new(&pattern)
            .map_err(|e| RelayError::config(format!("Invalid destructive keyword list: {}", e)))?;
        Ok(Self { regex: Some(regex) })
    }
}

/// Keyword guard with a hot-swappable keyword list
#[derive(Debug)]
pub struct KeywordGuard {
    pattern: ArcSwap<KeywordPattern>,
}

impl KeywordGuard {
    pub fn new(keywords: &[String]) -> Result<Self> {
        Ok(Self {
            pattern: ArcSwap::from_pointee(KeywordPattern::compile(keywords)?),
        })
    }

    /// Replace the keyword list
    pub fn reload(&self, keywords: &[String]) -> Result<()> {
        self.pattern.store(Arc::new(KeywordPattern::compile(keywords)?));
        Ok(())
    }

    /// Check a call's arguments.
    ///
    /// The declared query parameter is always inspected. Write and admin
    /// functions also have every top-level string argument inspected, since
    /// the query parameter may come from the tool server's own listing.
    pub fn check(&self, function: &FunctionDescriptor, arguments: &Value) -> std::result::Result<(), String> {
        let pattern = self.pattern.load();
        let Some(regex) = pattern.regex.as_ref() else {
            return Ok(());
        };

        let mut inspected: Vec<(&str, String)> = Vec::new();
        if let Some(parameter) = function.query_parameter.as_deref() {
            match arguments.get(parameter) {
                Some(Value::String(s)) => inspected.push((parameter, s.clone())),
                Some(other) => inspected.push((parameter, other.to_string())),
                None => {}
            }
        }
        if matches!(function.class, FunctionClass::Write | FunctionClass::Admin) {
            if let Some(map) = arguments.as_object() {
                for (name, value) in map {
                    if Some(name.as_str()) == function.query_parameter.as_deref() {
                        continue;
                    }
                    if let Value::String(s) = value {
                        inspected.push((name.as_str(), s.clone()));
                    }
                }
            }
        }

        for (parameter, text) in inspected {
            if let Some(found) = regex.find(&text) {
                let keyword = found.as_str().to_uppercase();
                warn!(
                    "🛡️ [GUARD] Rejected '{}': parameter '{}' contains destructive keyword {}",
                    function.qualified_name(),
                    parameter,
                    keyword
                );
                return Err(format!(
                    "parameter '{}' contains destructive keyword '{}'",
                    parameter, keyword
                ));
            }
        }

        Ok(())
    }
}
