//! Records returned by the services.
//!
//! Only the fields the stores rely on are typed. Everything else is kept in
//! the flattened `attributes` map so records survive a round trip unchanged.

use hbp_paging::Keyed;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document service entity (project, folder, file, link...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity id.
    #[serde(rename = "_uuid")]
    pub uuid: String,
    /// Entity name.
    #[serde(rename = "_name", default)]
    pub name: String,
    /// Entity type, e.g. `folder` or `file`.
    #[serde(rename = "_entityType", default)]
    pub entity_type: String,
    /// Parent id, absent for projects.
    #[serde(rename = "_parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Id of the creator.
    #[serde(rename = "_createdBy", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Display name of the creator, filled by user id resolution.
    #[serde(rename = "_createdByName", default, skip_serializing_if = "Option::is_none")]
    pub created_by_name: Option<String>,
    /// Other attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    /// Creates an entity with the given id, type and name.
    pub fn new(uuid: impl Into<String>, entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            parent: None,
            created_by: None,
            created_by_name: None,
            attributes: Map::new(),
        }
    }

    /// Sets the parent id.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Returns true for folders, releases and projects.
    pub fn is_container(&self) -> bool {
        ["folder", "release", "project"]
            .iter()
            .any(|suffix| self.entity_type.ends_with(suffix))
    }
}

impl Keyed for Entity {
    fn key(&self) -> Option<&str> {
        (!self.uuid.is_empty()).then_some(self.uuid.as_str())
    }
}

/// A user or a group as returned by the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Id. Group ids start with `S`.
    pub id: String,
    /// Login or group name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display name, defaults to `name`.
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Other attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl User {
    /// Fills a missing display name from the name.
    pub fn normalized(mut self) -> Self {
        if self.display_name.is_none() {
            self.display_name = self.name.clone();
        }
        self
    }

    /// Best human readable label: display name, name, then id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// An identity service group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Group id.
    pub id: String,
    /// Group name.
    #[serde(default)]
    pub name: String,
    /// Other attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// The logged in user and the groups it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    /// Profile.
    pub user: User,
    /// Groups.
    pub groups: Vec<Group>,
}

impl CurrentUser {
    /// Returns true if `principal` is the user id, or the id or name of one
    /// of its groups.
    pub fn is_principal(&self, principal: &str) -> bool {
        self.user.id == principal || self.is_member(principal)
    }

    /// Returns true if the user belongs to the group with this id or name.
    pub fn is_member(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.id == group || g.name == group)
    }
}

/// Access rights of the current user on an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserAccess {
    /// Read access.
    pub can_read: bool,
    /// Write access.
    pub can_write: bool,
    /// Manage access.
    pub can_manage: bool,
}

impl UserAccess {
    /// Widens the rights with one ACL level (`read`, `write` or `manage`).
    pub fn grant(&mut self, level: &str) {
        match level {
            "manage" => {
                self.can_manage = true;
                self.can_write = true;
                self.can_read = true;
            }
            "write" => {
                self.can_write = true;
                self.can_read = true;
            }
            "read" => self.can_read = true,
            _ => {}
        }
    }
}

/// A collab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collab {
    /// Collab id, absent before creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Description.
    #[serde(default)]
    pub content: String,
    /// Soft deletion flag.
    #[serde(default)]
    pub deleted: bool,
    /// Creation date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Last edition date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited: Option<String>,
    /// Other attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Collab {
    /// Creates a collab to be sent to [`CollabStore::create`](crate::CollabStore::create).
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            deleted: false,
            created: None,
            edited: None,
            attributes: Map::new(),
        }
    }

    /// Body sent on creation and update.
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        if let Some(id) = self.id {
            body.insert("id".into(), Value::from(id));
        }
        body.insert("title".into(), Value::String(self.title.clone()));
        body.insert("content".into(), Value::String(self.content.clone()));
        if self.id.is_some() {
            body.insert("deleted".into(), Value::Bool(self.deleted));
        }
        Value::Object(body)
    }

    /// Copies `id`, `title` and `content` from a service reply.
    pub fn update_from(&mut self, reply: &Value) {
        if let Some(id) = reply.get("id").and_then(Value::as_u64) {
            self.id = Some(id);
        }
        if let Some(title) = reply.get("title").and_then(Value::as_str) {
            self.title = title.to_string();
        }
        if let Some(content) = reply.get("content").and_then(Value::as_str) {
            self.content = content.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_keeps_unknown_attributes() {
        let raw = json!({
            "_uuid": "e1",
            "_name": "data",
            "_entityType": "folder",
            "_parent": "p1",
            "_contentType": "text/plain"
        });
        let entity: Entity = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entity.parent.as_deref(), Some("p1"));
        assert!(entity.is_container());
        assert_eq!(entity.key(), Some("e1"));
        assert_eq!(serde_json::to_value(&entity).unwrap(), raw);
    }

    #[test]
    fn containers() {
        assert!(Entity::new("a", "project", "p").is_container());
        assert!(Entity::new("a", "release", "r").is_container());
        assert!(Entity::new("a", "link:folder", "l").is_container());
        assert!(!Entity::new("a", "file", "f").is_container());
    }

    #[test]
    fn display_name_defaults_to_name() {
        let user: User = serde_json::from_value(json!({"id": "S1", "name": "admins"})).unwrap();
        let user = user.normalized();
        assert_eq!(user.display_name.as_deref(), Some("admins"));
        assert_eq!(user.label(), "admins");
    }

    #[test]
    fn access_levels() {
        let mut access = UserAccess::default();
        access.grant("read");
        assert_eq!(
            access,
            UserAccess { can_read: true, can_write: false, can_manage: false }
        );
        access.grant("manage");
        assert!(access.can_write && access.can_manage);
        access.grant("bogus");
        assert!(access.can_manage);
    }

    #[test]
    fn collab_payload() {
        let mut collab = Collab::new("Brain", "atlas");
        assert_eq!(collab.payload(), json!({"title": "Brain", "content": "atlas"}));

        collab.update_from(&json!({"id": 42, "title": "Brain v2"}));
        assert_eq!(collab.id, Some(42));
        assert_eq!(
            collab.payload(),
            json!({"id": 42, "title": "Brain v2", "content": "atlas", "deleted": false})
        );
    }
}
