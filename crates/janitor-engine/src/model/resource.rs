//! Candidate resources as returned by providers

use chrono::{DateTime, Utc};
use janitor_common::ResourceKind;
use janitor_common::defaults::default_cloud_provider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A cloud resource considered for cleanup
///
/// Identity is `(resource_id, resource_type, cloud_provider)`. The `details`
/// map is scratch space filled by pre-processors for one evaluation pass and
/// is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_id: String,
    pub resource_type: ResourceKind,
    #[serde(default = "default_cloud_provider")]
    pub cloud_provider: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Creation time in epoch millis
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub grouping: Option<Grouping>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub spec: ResourceSpec,
    #[serde(skip)]
    pub details: Details,
}

/// Type specific payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ResourceSpec {
    Volume {
        state: String,
        #[serde(default)]
        snapshot_id: Option<String>,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    LaunchConfiguration {
        #[serde(default)]
        image_id: Option<String>,
    },
    ServerGroup {
        #[serde(default)]
        load_balancer_names: Vec<String>,
        #[serde(default)]
        launch_configuration_name: Option<String>,
    },
    #[default]
    Generic,
}

/// A volume attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub instance_id: String,
    pub state: String,
    #[serde(default)]
    pub device: Option<String>,
}

impl Attachment {
    pub fn is_attached(&self) -> bool {
        self.state == "attached"
    }
}

/// Owning group of a resource, usually an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grouping {
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: GroupingKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupingKind {
    #[default]
    Application,
    Pattern,
}

/// Derived facts recorded by pre-processors and read by rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Details(BTreeMap<String, Value>);

impl Details {
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.set(key, value);
    }

    /// True only when the key holds boolean `true`
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(Value::Bool(true)))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Resource {
    pub fn new(resource_id: impl Into<String>, resource_type: ResourceKind) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type,
            cloud_provider: default_cloud_provider(),
            name: None,
            created_time: 0,
            grouping: None,
            tags: BTreeMap::new(),
            spec: ResourceSpec::Generic,
            details: Details::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_created_time(mut self, created_time: DateTime<Utc>) -> Self {
        self.created_time = created_time.timestamp_millis();
        self
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.grouping = Some(Grouping {
            value: application.into(),
            kind: GroupingKind::Application,
        });
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_spec(mut self, spec: ResourceSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.resource_id)
    }

    /// Human readable `type: (id) name` label used in audit messages
    pub fn type_and_name(&self) -> String {
        let kind = self.resource_type.display_name();
        match self.name.as_deref() {
            Some(name) if name != self.resource_id => {
                format!("{kind}: ({}) {name}", self.resource_id)
            }
            _ => format!("{kind}: {}", self.resource_id),
        }
    }

    pub fn application(&self) -> Option<&str> {
        self.grouping
            .as_ref()
            .filter(|g| g.kind == GroupingKind::Application)
            .map(|g| g.value.as_str())
    }

    /// Look up an attribute by key for exclusion and attribute matching
    ///
    /// Unknown keys fall back to tags; `tag:` prefixed keys only read tags.
    pub fn attribute(&self, key: &str) -> Option<String> {
        if let Some(tag) = key.strip_prefix("tag:") {
            return self.tags.get(tag).cloned();
        }

        match key {
            "resourceId" | "id" => Some(self.resource_id.clone()),
            "name" => Some(self.display_name().to_string()),
            "resourceType" => Some(self.resource_type.as_str().to_string()),
            "cloudProvider" => Some(self.cloud_provider.clone()),
            "grouping" | "application" => self.grouping.as_ref().map(|g| g.value.clone()),
            "state" => match &self.spec {
                ResourceSpec::Volume { state, .. } => Some(state.clone()),
                _ => None,
            },
            "snapshotId" => match &self.spec {
                ResourceSpec::Volume { snapshot_id, .. } => snapshot_id.clone(),
                _ => None,
            },
            "imageId" => match &self.spec {
                ResourceSpec::LaunchConfiguration { image_id } => image_id.clone(),
                _ => None,
            },
            _ => self.tags.get(key).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> Resource {
        Resource::new("vol-1", ResourceKind::Volume)
            .with_name("data")
            .with_application("billing")
            .with_tag("team", "payments")
            .with_spec(ResourceSpec::Volume {
                state: "available".to_string(),
                snapshot_id: Some("snap-1".to_string()),
                attachments: vec![],
            })
    }

    #[test]
    fn test_attribute_lookup() {
        let resource = volume();
        assert_eq!(resource.attribute("resourceId").as_deref(), Some("vol-1"));
        assert_eq!(resource.attribute("name").as_deref(), Some("data"));
        assert_eq!(resource.attribute("application").as_deref(), Some("billing"));
        assert_eq!(resource.attribute("state").as_deref(), Some("available"));
        assert_eq!(resource.attribute("snapshotId").as_deref(), Some("snap-1"));
        assert_eq!(resource.attribute("team").as_deref(), Some("payments"));
        assert_eq!(resource.attribute("tag:team").as_deref(), Some("payments"));
        assert_eq!(resource.attribute("imageId"), None);
        assert_eq!(resource.attribute("tag:missing"), None);
    }

    #[test]
    fn test_type_and_name() {
        assert_eq!(volume().type_and_name(), "volume: (vol-1) data");
        let lc = Resource::new("lc-1", ResourceKind::LaunchConfiguration);
        assert_eq!(lc.type_and_name(), "launch configuration: lc-1");
    }

    #[test]
    fn test_details_flags() {
        let mut details = Details::default();
        assert!(!details.flag("attached"));
        details.set_flag("attached", false);
        assert!(details.contains("attached"));
        assert!(!details.flag("attached"));
        details.set_flag("attached", true);
        assert!(details.flag("attached"));
        details.set("attached", "yes");
        assert!(!details.flag("attached"));
    }

    #[test]
    fn test_details_are_not_serialized() {
        let mut resource = volume();
        resource.details.set_flag("usedBySnapshot", true);

        let json = serde_json::to_string(&resource).unwrap();
        assert!(!json.contains("usedBySnapshot"));

        let back: Resource = serde_json::from_str(&json).unwrap();
        assert!(back.details.is_empty());
        assert_eq!(back.spec, resource.spec);
    }

    #[test]
    fn test_spec_deserializes_camel_case_fields() {
        let json = r#"{
            "resourceId": "vol-2",
            "resourceType": "volume",
            "spec": {
                "kind": "volume",
                "state": "in-use",
                "attachments": [{"instanceId": "i-1", "state": "attached"}]
            }
        }"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.cloud_provider, "aws");
        match resource.spec {
            ResourceSpec::Volume { attachments, .. } => {
                assert!(attachments[0].is_attached());
                assert_eq!(attachments[0].instance_id, "i-1");
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }
}
