// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Typed clinical resources
//!
//! Every resource type the workspace knows about is one variant of
//! [`Resource`], tagged by its `resourceType` discriminant. The payload of
//! every variant is the same [`ResourceBody`]: a stable id plus the remaining
//! JSON fields, kept verbatim so views can read whatever the server sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Declares the resource sum type and its discriminant enum side by side so
/// the two can never drift apart.
macro_rules! resource_types {
    ($($variant:ident => $subject_field:expr),+ $(,)?) => {
        /// Discriminant of a clinical resource
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum ResourceType {
            $($variant,)+
        }

        impl ResourceType {
            /// Every known resource type, in declaration order
            pub const ALL: &'static [ResourceType] = &[$(ResourceType::$variant,)+];

            /// FHIR name of the type (`"MedicationRequest"`, ...)
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ResourceType::$variant => stringify!($variant),)+
                }
            }

            /// Name of the reference field pointing at the owning patient
            pub fn subject_field(&self) -> Option<&'static str> {
                match self {
                    $(ResourceType::$variant => $subject_field,)+
                }
            }
        }

        impl FromStr for ResourceType {
            type Err = UnknownResourceType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(ResourceType::$variant),)+
                    other => Err(UnknownResourceType(other.to_string())),
                }
            }
        }

        /// A clinical resource, tagged by `resourceType`
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "resourceType")]
        pub enum Resource {
            $($variant(ResourceBody),)+
        }

        impl Resource {
            /// Wrap a body in the variant matching `resource_type`
            pub fn from_body(resource_type: ResourceType, body: ResourceBody) -> Self {
                match resource_type {
                    $(ResourceType::$variant => Resource::$variant(body),)+
                }
            }

            pub fn resource_type(&self) -> ResourceType {
                match self {
                    $(Resource::$variant(_) => ResourceType::$variant,)+
                }
            }

            pub fn body(&self) -> &ResourceBody {
                match self {
                    $(Resource::$variant(body) => body,)+
                }
            }

            pub fn into_body(self) -> ResourceBody {
                match self {
                    $(Resource::$variant(body) => body,)+
                }
            }
        }
    };
}

resource_types! {
    Patient => None,
    Practitioner => None,
    Encounter => Some("subject"),
    Condition => Some("subject"),
    MedicationRequest => Some("subject"),
    AllergyIntolerance => Some("patient"),
    Observation => Some("subject"),
    Procedure => Some("subject"),
    DiagnosticReport => Some("subject"),
    Coverage => Some("beneficiary"),
    Immunization => Some("patient"),
    CarePlan => Some("subject"),
    CareTeam => Some("subject"),
    DocumentReference => Some("subject"),
    ImagingStudy => Some("subject"),
    ServiceRequest => Some("subject"),
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown resource type: {0}")]
pub struct UnknownResourceType(pub String);

/// Shared payload of every resource variant
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceBody {
    /// Server-assigned id; empty until the server has assigned one
    #[serde(default)]
    pub id: String,

    /// Every other field, as sent by the server
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Resource {
    /// Build a resource from an id and a JSON object of fields.
    ///
    /// Non-object `fields` values are ignored.
    pub fn new(resource_type: ResourceType, id: impl Into<String>, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::from_body(
            resource_type,
            ResourceBody {
                id: id.into(),
                fields,
            },
        )
    }

    /// Parse a resource from its FHIR JSON form
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn id(&self) -> &str {
        &self.body().id
    }

    /// `Type/id` form used in references and cache keys
    pub fn reference(&self) -> String {
        format!("{}/{}", self.resource_type(), self.id())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body().fields.get(name)
    }

    /// Id of the patient this resource belongs to, if any.
    ///
    /// Reads the type's subject reference (`subject`, `patient` or
    /// `beneficiary`) and strips a leading `Patient/`.
    pub fn subject_id(&self) -> Option<&str> {
        let field = self.resource_type().subject_field()?;
        let reference = self.field(field)?.get("reference")?.as_str()?;
        Some(reference.strip_prefix("Patient/").unwrap_or(reference))
    }

    /// Top-level `status` code, when present
    pub fn status(&self) -> Option<&str> {
        self.field("status").and_then(Value::as_str)
    }

    /// Return a copy with `partial` merged over the current fields.
    ///
    /// `id` and `resourceType` keys in `partial` are ignored; a `null` value
    /// removes the field.
    pub fn merged(&self, partial: &Map<String, Value>) -> Resource {
        let mut body = self.body().clone();
        for (key, value) in partial {
            if key == "id" || key == "resourceType" {
                continue;
            }
            if value.is_null() {
                body.fields.remove(key);
            } else {
                body.fields.insert(key.clone(), value.clone());
            }
        }
        Resource::from_body(self.resource_type(), body)
    }

    /// Same resource with a new id
    pub fn with_id(self, id: impl Into<String>) -> Resource {
        let resource_type = self.resource_type();
        let mut body = self.into_body();
        body.id = id.into();
        Resource::from_body(resource_type, body)
    }
}

/// Reference JSON pointing at a patient, as stored in `subject`-like fields
pub fn patient_reference(subject_id: &str) -> Value {
    serde_json::json!({ "reference": format!("Patient/{}", subject_id) })
}
