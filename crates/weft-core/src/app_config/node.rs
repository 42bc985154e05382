use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kernel::context::ContextConfig;
use crate::service::keys::{Access, group_key};

/// A configuration file: context settings plus configuration templates.
///
/// Templates stay raw until built, since `%NAME%` placeholders may stand
/// anywhere a string can.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub configs: Vec<Value>,
}

/// One configuration after parameter substitution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub id: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterDecl>,
    pub objects: Vec<ObjectDecl>,
    /// Objects this configuration uses but does not create; components
    /// bound to them wait until they are published.
    pub deferred: Vec<String>,
    pub services: Vec<ServiceDecl>,
    pub connections: Vec<ConnectionDecl>,
    /// Components to start; all of them, in declaration order, when absent.
    pub start: Option<Vec<String>>,
    /// Components updated after start.
    pub update: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDecl {
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectDecl {
    pub uid: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub value: Option<Value>,
    /// Field name → uid of an object declared earlier (or already published).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDecl {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type")]
    pub implementation: String,
    #[serde(default)]
    pub worker: Option<String>,
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default)]
    pub objects: Vec<BindingDecl>,
    #[serde(default)]
    pub groups: Vec<GroupDecl>,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingDecl {
    pub key: String,
    pub uid: String,
    pub access: Access,
    #[serde(default)]
    pub auto_connect: Option<bool>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDecl {
    pub group: String,
    pub access: Access,
    #[serde(default)]
    pub auto_connect: Option<bool>,
    #[serde(default)]
    pub optional: bool,
    pub uids: Vec<String>,
}

/// Every listed signal is connected to every listed slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionDecl {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub slots: Vec<String>,
    #[serde(default)]
    pub optional: bool,
}

/// One object reference of a component declaration, group members expanded
/// to their `group#index` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyReference<'a> {
    pub key: String,
    pub uid: &'a str,
    pub access: Access,
    pub auto_connect: Option<bool>,
    pub optional: bool,
}

impl ServiceDecl {
    pub fn references(&self) -> Vec<KeyReference<'_>> {
        let mut references: Vec<KeyReference<'_>> = self
            .objects
            .iter()
            .map(|b| KeyReference {
                key: b.key.clone(),
                uid: &b.uid,
                access: b.access,
                auto_connect: b.auto_connect,
                optional: b.optional,
            })
            .collect();
        for group in &self.groups {
            references.extend(group.uids.iter().enumerate().map(|(index, uid)| KeyReference {
                key: group_key(&group.group, index),
                uid,
                access: group.access,
                auto_connect: group.auto_connect,
                optional: group.optional,
            }));
        }
        references
    }

    /// Whether any input or inout reference names one of `deferred`.
    pub fn waits_on(&self, deferred: &BTreeSet<&str>) -> bool {
        self.references()
            .iter()
            .any(|r| r.access != Access::Output && deferred.contains(r.uid))
    }
}

impl AppConfig {
    /// Uids declared by this configuration: objects, deferred objects,
    /// named components and output bindings, in declaration order.
    pub fn declared_uids(&self) -> Vec<&str> {
        let mut uids: Vec<&str> = self.objects.iter().map(|o| o.uid.as_str()).collect();
        uids.extend(self.deferred.iter().map(String::as_str));
        for service in &self.services {
            if let Some(uid) = &service.uid {
                uids.push(uid);
            }
            uids.extend(
                service
                    .objects
                    .iter()
                    .filter(|b| b.access == Access::Output)
                    .map(|b| b.uid.as_str()),
            );
        }
        uids
    }

    /// Uids whose objects only exist while the graph runs: the `deferred`
    /// list plus every output a component produces.
    pub fn deferred_uids(&self) -> BTreeSet<&str> {
        let mut uids: BTreeSet<&str> = self.deferred.iter().map(String::as_str).collect();
        for service in &self.services {
            uids.extend(
                service
                    .objects
                    .iter()
                    .filter(|b| b.access == Access::Output)
                    .map(|b| b.uid.as_str()),
            );
        }
        uids
    }
}
