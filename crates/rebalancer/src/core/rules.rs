//! Allow/deny rules evaluated against host attributes.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::common::{Error, Result};
use crate::core::stats::HostStats;

/// Host attribute a rule is matched against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Host,
    Ha,
    Az,
}

impl FromStr for RuleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "host" => Ok(RuleType::Host),
            "ha" => Ok(RuleType::Ha),
            "az" => Ok(RuleType::Az),
            _ => Err(Error::Validation(format!("Invalid lbrule type provided: {}", s))),
        }
    }
}

impl Display for RuleType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            RuleType::Host => write!(f, "host"),
            RuleType::Ha => write!(f, "ha"),
            RuleType::Az => write!(f, "az"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: u32,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    /// Regular expression matched from the start of the attribute value.
    pub value: String,
    pub allow: bool,
}

/// CRUD owner of the rule list. Rules are validated on insert and listed in
/// id order; the engine takes the verdict of the last matching rule.
pub struct RuleStore {
    rules: BTreeMap<u32, Rule>,
    next_id: u32,
}

impl RuleStore {
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn create(&mut self, rule_type: &str, value: &str, allow: bool) -> Result<Rule> {
        let rule_type = rule_type.parse()?;
        Regex::new(&anchored(value))
            .map_err(|err| Error::Validation(format!("Invalid lbrule value provided: {}", err)))?;
        let rule = Rule {
            id: self.next_id,
            rule_type,
            value: value.to_string(),
            allow,
        };
        self.next_id += 1;
        self.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    pub fn get(&self, id: u32) -> Result<&Rule> {
        self.rules.get(&id).ok_or(Error::RuleNotFound(id))
    }

    pub fn delete(&mut self, id: u32) -> Result<()> {
        self.rules.remove(&id).map(|_| ()).ok_or(Error::RuleNotFound(id))
    }

    /// All rules, id ascending.
    pub fn list(&self) -> Vec<Rule> {
        self.rules.values().cloned().collect()
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the template matches from the start of the string.
pub fn check_string(string: &str, template: &str) -> bool {
    match Regex::new(&anchored(template)) {
        Ok(pattern) => pattern.is_match(string),
        Err(_) => false,
    }
}

/// Verdict of the ordered rule list for one host: the `allow` of the last
/// rule whose pattern matches the attribute named by its type, `true` when
/// nothing matches.
pub fn host_allowed(node: &HostStats, rules: &[Rule]) -> bool {
    let mut result = true;
    for rule in rules {
        let attribute = match rule.rule_type {
            RuleType::Host => &node.host,
            RuleType::Ha => &node.ha,
            RuleType::Az => &node.az,
        };
        if check_string(attribute, &rule.value) {
            result = rule.allow;
        }
    }
    result
}

/// Hostnames of the hosts admitted by the rule list.
pub fn allowed_hosts(nodes: &[HostStats], rules: &[Rule]) -> HashSet<String> {
    nodes
        .iter()
        .filter(|node| host_allowed(node, rules))
        .map(|node| node.hypervisor_hostname.clone())
        .collect()
}

fn anchored(template: &str) -> String {
    format!(r"\A(?:{})", template)
}
