use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::object::Object;
use crate::kernel::constants::GROUP_SEPARATOR;

/// How a component uses the object bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[serde(alias = "in")]
    Input,
    Inout,
    #[serde(alias = "out")]
    Output,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Access::Input => "input",
            Access::Inout => "inout",
            Access::Output => "output",
        };
        f.write_str(s)
    }
}

/// A key a component declares, e.g. `KeyDecl::inout("image")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDecl {
    pub name: String,
    pub access: Access,
    pub optional: bool,
    /// Repeated role; bound as `name#0`, `name#1`, ...
    pub group: bool,
}

impl KeyDecl {
    fn new(name: impl Into<String>, access: Access) -> Self {
        Self {
            name: name.into(),
            access,
            optional: false,
            group: false,
        }
    }

    pub fn input(name: impl Into<String>) -> Self {
        Self::new(name, Access::Input)
    }

    pub fn inout(name: impl Into<String>) -> Self {
        Self::new(name, Access::Inout)
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, Access::Output)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn group(mut self) -> Self {
        self.group = true;
        self
    }

    /// Whether `key` names this declaration, directly or as a group member.
    pub fn matches(&self, key: &str) -> bool {
        if self.group {
            split_group_key(key).is_some_and(|(group, _)| group == self.name)
        } else {
            key == self.name
        }
    }
}

pub fn group_key(group: &str, index: usize) -> String {
    format!("{}{}{}", group, GROUP_SEPARATOR, index)
}

/// `"views#2"` -> `("views", 2)`.
pub fn split_group_key(key: &str) -> Option<(&str, usize)> {
    let (group, index) = key.rsplit_once(GROUP_SEPARATOR)?;
    index.parse().ok().map(|i| (group, i))
}

/// A concrete object (or object slot, for outputs) bound to one key.
#[derive(Debug, Clone)]
pub struct ObjectBinding {
    pub uid: String,
    pub access: Access,
    /// Overrides the component-wide auto-connect flag when set.
    pub auto_connect: Option<bool>,
    pub optional: bool,
    pub object: Option<Arc<Object>>,
}

impl ObjectBinding {
    pub fn new(access: Access, object: Arc<Object>) -> Self {
        Self {
            uid: object.uid().to_string(),
            access,
            auto_connect: None,
            optional: false,
            object: Some(object),
        }
    }

    /// Binding for an output the component will produce under `uid`.
    pub fn output(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            access: Access::Output,
            auto_connect: None,
            optional: false,
            object: None,
        }
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = Some(auto_connect);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: BTreeMap<String, ObjectBinding>,
}

impl Bindings {
    pub fn insert(&mut self, key: impl Into<String>, binding: ObjectBinding) -> Option<ObjectBinding> {
        self.entries.insert(key.into(), binding)
    }

    pub fn get(&self, key: &str) -> Option<&ObjectBinding> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ObjectBinding> {
        self.entries.remove(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ObjectBinding> {
        self.entries.get_mut(key)
    }

    pub fn object(&self, key: &str) -> Option<Arc<Object>> {
        self.entries.get(key).and_then(|b| b.object.clone())
    }

    /// Members of `group`, ordered by index.
    pub fn group(&self, group: &str) -> Vec<(&str, &ObjectBinding)> {
        let mut members: Vec<(usize, &str, &ObjectBinding)> = self
            .entries
            .iter()
            .filter_map(|(key, binding)| {
                split_group_key(key)
                    .filter(|(g, _)| *g == group)
                    .map(|(_, index)| (index, key.as_str(), binding))
            })
            .collect();
        members.sort_by_key(|(index, _, _)| *index);
        members.into_iter().map(|(_, key, binding)| (key, binding)).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ObjectBinding)> {
        self.entries.iter()
    }

    pub fn is_bound_to(&self, object_uid: &str) -> bool {
        self.entries
            .values()
            .any(|b| b.object.as_ref().is_some_and(|o| o.uid() == object_uid))
    }

    /// Drop every object reference while keeping the declared uids.
    pub fn clear_objects(&mut self) {
        for binding in self.entries.values_mut() {
            binding.object = None;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-key table of `(object signal, component slot)` pairs connected
/// while the component is started.
#[derive(Debug, Clone, Default)]
pub struct AutoConnections {
    entries: BTreeMap<String, Vec<(String, String)>>,
}

impl AutoConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, signal: &str, slot: &str) -> Self {
        self.entries
            .entry(key.to_string())
            .or_default()
            .push((signal.to_string(), slot.to_string()));
        self
    }

    /// Pairs for `key`, falling back to the group's entry for `group#i`.
    pub fn for_key(&self, key: &str) -> &[(String, String)] {
        if let Some(pairs) = self.entries.get(key) {
            return pairs;
        }
        split_group_key(key)
            .and_then(|(group, _)| self.entries.get(group))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
