use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::auth::RoleSet;

/// Length of every entity id: UUID v4 in simple form.
pub const ID_LENGTH: usize = 32;

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub registered_at: DateTime<Utc>,
    pub city_id: Option<String>,
    pub roles: RoleSet,
    pub verified: bool,
}

// Identity is the immutable id
impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for User {}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password_hash: String, roles: RoleSet) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            email: email.into(),
            password_hash,
            registered_at: Utc::now(),
            city_id: None,
            roles,
            verified: false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.has_admin_role()
    }
}

/// Directory resources sharing the `{id, name}` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryKind {
    City,
    Institution,
    Benefit,
    CriterionType,
    Criterion,
}

impl DirectoryKind {
    pub const ALL: [DirectoryKind; 5] = [
        DirectoryKind::City,
        DirectoryKind::Institution,
        DirectoryKind::Benefit,
        DirectoryKind::CriterionType,
        DirectoryKind::Criterion,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            DirectoryKind::City => "cities",
            DirectoryKind::Institution => "institutions",
            DirectoryKind::Benefit => "benefits",
            DirectoryKind::CriterionType => "criterion_types",
            DirectoryKind::Criterion => "criteria",
        }
    }

    /// URL segment under `/api`.
    pub fn segment(&self) -> &'static str {
        match self {
            DirectoryKind::City => "cities",
            DirectoryKind::Institution => "institutions",
            DirectoryKind::Benefit => "benefits",
            DirectoryKind::CriterionType => "criterion-types",
            DirectoryKind::Criterion => "criteria",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DirectoryKind::City => "City",
            DirectoryKind::Institution => "Institution",
            DirectoryKind::Benefit => "Benefit",
            DirectoryKind::CriterionType => "Criterion type",
            DirectoryKind::Criterion => "Criterion",
        }
    }

    /// Owning resource, for kinds that belong to exactly one parent.
    pub fn parent(&self) -> Option<DirectoryKind> {
        match self {
            DirectoryKind::Institution => Some(DirectoryKind::City),
            DirectoryKind::Criterion => Some(DirectoryKind::CriterionType),
            _ => None,
        }
    }

    pub fn parent_column(&self) -> Option<&'static str> {
        match self {
            DirectoryKind::Institution => Some("city_id"),
            DirectoryKind::Criterion => Some("criterion_type_id"),
            _ => None,
        }
    }

    /// JSON field name of the parent reference.
    pub fn parent_field(&self) -> Option<&'static str> {
        match self {
            DirectoryKind::Institution => Some("cityId"),
            DirectoryKind::Criterion => Some("criterionTypeId"),
            _ => None,
        }
    }

    pub fn has_description(&self) -> bool {
        matches!(self, DirectoryKind::Benefit)
    }

    /// Kinds whose rows reference this one.
    pub fn children(&self) -> Vec<DirectoryKind> {
        Self::ALL.into_iter().filter(|k| k.parent() == Some(*self)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DirectoryEntry {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
}

impl DirectoryEntry {
    pub fn to_json(&self, kind: DirectoryKind) -> Value {
        let mut map = Map::new();
        map.insert("id".to_string(), json!(self.id));
        map.insert("name".to_string(), json!(self.name));
        if kind.has_description() {
            map.insert("description".to_string(), json!(self.description));
        }
        if let Some(field) = kind.parent_field() {
            map.insert(field.to_string(), json!(self.parent_id));
        }
        Value::Object(map)
    }
}

/// Many-to-many associations hanging off a benefit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BenefitLink {
    City,
    Institution,
    Criterion,
}

impl BenefitLink {
    pub const ALL: [BenefitLink; 3] = [BenefitLink::City, BenefitLink::Institution, BenefitLink::Criterion];

    pub fn table(&self) -> &'static str {
        match self {
            BenefitLink::City => "benefit_cities",
            BenefitLink::Institution => "benefit_institutions",
            BenefitLink::Criterion => "benefit_criteria",
        }
    }

    pub fn target_column(&self) -> &'static str {
        match self {
            BenefitLink::City => "city_id",
            BenefitLink::Institution => "institution_id",
            BenefitLink::Criterion => "criterion_id",
        }
    }

    pub fn target(&self) -> DirectoryKind {
        match self {
            BenefitLink::City => DirectoryKind::City,
            BenefitLink::Institution => DirectoryKind::Institution,
            BenefitLink::Criterion => DirectoryKind::Criterion,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            BenefitLink::City => "cityIds",
            BenefitLink::Institution => "institutionIds",
            BenefitLink::Criterion => "criterionIds",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    #[test]
    fn generated_ids_have_fixed_alphanumeric_length() {
        let id = new_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_id());
    }

    #[test]
    fn users_compare_by_id() {
        let a = User::new("A", "a@example.com", String::new(), RoleSet::of(&[Role::User]));
        let mut b = a.clone();
        b.name = "Renamed".into();
        assert_eq!(a, b);
        assert_ne!(a, User::new("A", "a@example.com", String::new(), RoleSet::new()));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User::new("A", "a@example.com", "$2b$hash".into(), RoleSet::of(&[Role::User]));
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["roles"], json!(["ROLE_USER"]));
    }

    #[test]
    fn entry_json_uses_kind_specific_fields() {
        let entry = DirectoryEntry {
            id: "i1".into(),
            name: "Library".into(),
            description: None,
            parent_id: Some("c1".into()),
        };
        let json = entry.to_json(DirectoryKind::Institution);
        assert_eq!(json["cityId"], "c1");
        assert!(json.get("description").is_none());
        assert!(entry.to_json(DirectoryKind::City).get("cityId").is_none());
    }

    #[test]
    fn children_follow_parent_relation() {
        assert_eq!(DirectoryKind::City.children(), vec![DirectoryKind::Institution]);
        assert_eq!(DirectoryKind::CriterionType.children(), vec![DirectoryKind::Criterion]);
        assert!(DirectoryKind::Benefit.children().is_empty());
    }
}
