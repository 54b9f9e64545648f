//! Placement constraints and their CLI DSL.
//!
//! Constraints arrive on the command line as
//! `must={layer:device,...},mustnot={layer:device,...}`; either clause
//! may be omitted. Malformed input is a fatal parse error.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Hard placement constraints, keyed by layer name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub must_be_on_device: BTreeMap<String, String>,
    pub must_not_be_on_device: BTreeMap<String, String>,
}

fn must_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|,)\s*must=\{([\w\s:,.-]*)\}").unwrap())
}

fn mustnot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|,)\s*mustnot=\{([\w\s:,.-]*)\}").unwrap())
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.must_be_on_device.is_empty() && self.must_not_be_on_device.is_empty()
    }

    /// Parse the constraint DSL.
    pub fn parse(input: &str) -> CoreResult<Constraints> {
        let must_caps = must_re().captures(input);
        let mustnot_caps = mustnot_re().captures(input);

        // Non-empty input that matches neither clause is garbage, not an
        // empty constraint set.
        if must_caps.is_none() && mustnot_caps.is_none() && !input.trim().is_empty() {
            return Err(CoreError::MalformedConstraints(input.to_string()));
        }

        let must = match &must_caps {
            Some(caps) => parse_pairs(caps.get(1).map_or("", |m| m.as_str()), input)?,
            None => BTreeMap::new(),
        };
        let mustnot = match &mustnot_caps {
            Some(caps) => parse_pairs(caps.get(1).map_or("", |m| m.as_str()), input)?,
            None => BTreeMap::new(),
        };

        Ok(Constraints {
            must_be_on_device: must,
            must_not_be_on_device: mustnot,
        })
    }
}

/// Split a `layer:device,layer:device` body into a map.
fn parse_pairs(body: &str, original: &str) -> CoreResult<BTreeMap<String, String>> {
    let mut result = BTreeMap::new();
    for pair in body.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (layer, device) = pair
            .split_once(':')
            .ok_or_else(|| CoreError::MalformedConstraints(original.to_string()))?;
        let (layer, device) = (layer.trim(), device.trim());
        if layer.is_empty() || device.is_empty() {
            return Err(CoreError::MalformedConstraints(original.to_string()));
        }
        result.insert(layer.to_string(), device.to_string());
    }
    Ok(result)
}
