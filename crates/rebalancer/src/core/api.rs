//! Command and view surface exposed over the REST boundary.
//!
//! Transport-agnostic: each operation returns either a serialisable view or
//! an [`ApiError`] carrying the HTTP status the REST layer should answer
//! with. Rule lookups answer 404 for unknown ids; the host commands answer
//! 400 for domain refusals (wrong state, unknown host, rule-forbidden)
//! while transient backend failures keep their server-error status.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::core::common::{Error, SuspendState};
use crate::core::compute_api::{ComputeApi, WakeOnLan};
use crate::core::config::LoadBalancerConfig;
use crate::core::rules::{Rule, RuleStore};
use crate::core::stats::{StateFilter, StatsFilter, StatsStore};
use crate::core::underload::{underload_resolver, UnderloadStrategy};

#[derive(Clone, Debug, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self { status: 400, message }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::HostNotFound(_) | Error::RuleNotFound(_) | Error::InstanceNotFound(_) => 404,
            Error::WrongState { .. } | Error::ForbiddenByRule(_) | Error::Validation(_) => 400,
            Error::Transient(_) => 500,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleView {
    pub id: u32,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleListView {
    pub rules: Vec<RuleView>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleShowView {
    pub rule: RuleView,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeView {
    pub hypervisor_hostname: String,
    pub cpu_used_percent: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub suspend_state: SuspendState,
    pub mac_to_wake: Option<String>,
    pub vcpus: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoadBalancerView {
    pub compute_nodes: Vec<NodeView>,
}

impl From<&Rule> for RuleView {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id,
            rule_type: rule.rule_type.to_string(),
            value: rule.value.clone(),
        }
    }
}

/// The API controller. Owns its own underload strategy instance for the
/// suspend/unsuspend commands, resolved from the same configuration as the
/// driver's.
pub struct Api {
    store: Rc<RefCell<StatsStore>>,
    rules: Rc<RefCell<RuleStore>>,
    underload: Box<dyn UnderloadStrategy>,
}

impl Api {
    pub fn new(
        config: Rc<LoadBalancerConfig>,
        store: Rc<RefCell<StatsStore>>,
        rules: Rc<RefCell<RuleStore>>,
        compute: Rc<RefCell<dyn ComputeApi>>,
        wol: Rc<RefCell<dyn WakeOnLan>>,
    ) -> Self {
        let underload = underload_resolver(
            &config.underload_class.clone(),
            store.clone(),
            rules.clone(),
            compute,
            wol,
            config,
        );
        Self {
            store,
            rules,
            underload,
        }
    }

    /// GET /lbrules
    pub fn list_rules(&self) -> RuleListView {
        RuleListView {
            rules: self.rules.borrow().list().iter().map(RuleView::from).collect(),
        }
    }

    /// GET /lbrules/{id}
    pub fn show_rule(&self, id: u32) -> ApiResult<RuleShowView> {
        let rules = self.rules.borrow();
        let rule = rules.get(id)?;
        Ok(RuleShowView {
            rule: RuleView::from(rule),
        })
    }

    /// POST /lbrules, body `{"lb_rules": {"type", "value", "allow"}}`.
    pub fn create_rule(&self, body: &Value) -> ApiResult<RuleShowView> {
        let rule = body
            .get("lb_rules")
            .ok_or_else(|| ApiError::bad_request("lb_rules body is required".to_string()))?;
        let rule_type = rule
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_request("Invalid lbrule type provided.".to_string()))?;
        let value = rule
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_request("Invalid lbrule value provided.".to_string()))?;
        let allow = rule
            .get("allow")
            .and_then(Value::as_bool)
            .ok_or_else(|| ApiError::bad_request("allow key should be bool type.".to_string()))?;
        let created = self.rules.borrow_mut().create(rule_type, value, allow)?;
        Ok(RuleShowView {
            rule: RuleView::from(&created),
        })
    }

    /// DELETE /lbrules/{id}
    pub fn delete_rule(&self, id: u32) -> ApiResult<()> {
        self.rules.borrow_mut().delete(id)?;
        Ok(())
    }

    /// GET /loadbalancer
    pub fn list_hosts(&self) -> LoadBalancerView {
        let nodes = self.store.borrow().list_hosts(&StatsFilter {
            state: StateFilter::Any,
            ..Default::default()
        });
        LoadBalancerView {
            compute_nodes: nodes
                .into_iter()
                .map(|node| NodeView {
                    hypervisor_hostname: node.hypervisor_hostname,
                    cpu_used_percent: node.cpu_used_percent,
                    memory_total: node.memory_total,
                    memory_used: node.memory_used,
                    suspend_state: node.suspend_state,
                    mac_to_wake: node.mac_to_wake,
                    vcpus: node.vcpus,
                })
                .collect(),
        }
    }

    /// POST /loadbalancer, body `{"suspend_host": {"host": ...}}` -> 202.
    pub fn suspend_host(&self, body: &Value) -> ApiResult<()> {
        let host = Self::host_from_action(body, "suspend_host")?;
        self.underload.suspend_host(&host).map_err(Self::command_error)?;
        Ok(())
    }

    /// POST /loadbalancer, body `{"unsuspend_host": {"host": ...}}` -> 202.
    pub fn unsuspend_host(&self, body: &Value) -> ApiResult<()> {
        let host = Self::host_from_action(body, "unsuspend_host")?;
        if self.store.borrow().get_host(&host).is_err() {
            return Err(ApiError::bad_request("Requested node not found".to_string()));
        }
        self.underload.unsuspend_host(&host).map_err(Self::command_error)?;
        Ok(())
    }

    /// Status mapping of the host commands: 400 for domain refusals
    /// including an unknown host; anything transient (a failed RPC
    /// mid-drain, a lost magic packet) keeps its server-error status.
    fn command_error(err: Error) -> ApiError {
        match err {
            Error::HostNotFound(_) | Error::WrongState { .. } | Error::ForbiddenByRule(_) => {
                ApiError::bad_request(err.to_string())
            }
            other => other.into(),
        }
    }

    fn host_from_action(body: &Value, action: &str) -> ApiResult<String> {
        body.get(action)
            .and_then(|a| a.get("host"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request(format!("{} requires a host", action)))
    }
}
