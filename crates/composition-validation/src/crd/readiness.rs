use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::schema::KnownJsonType;

/// A check deciding whether a composed resource is ready.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ReadinessCheck {
    None,
    NonEmpty(FieldReadinessCheck),
    MatchString(MatchStringReadinessCheck),
    MatchInteger(MatchIntegerReadinessCheck),
    MatchTrue(FieldReadinessCheck),
    MatchFalse(FieldReadinessCheck),
    MatchCondition(MatchConditionReadinessCheck),
}

impl ReadinessCheck {
    /// The field path the check reads, if any.
    pub fn field_path(&self) -> Option<&str> {
        match self {
            Self::None | Self::MatchCondition(_) => None,
            Self::NonEmpty(check) | Self::MatchTrue(check) | Self::MatchFalse(check) => {
                Some(&check.field_path)
            }
            Self::MatchString(check) => Some(&check.field_path),
            Self::MatchInteger(check) => Some(&check.field_path),
        }
    }

    /// The type the field read by the check needs to have, if the check
    /// constrains it.
    pub fn required_type(&self) -> Option<KnownJsonType> {
        match self {
            Self::MatchString(_) => Some(KnownJsonType::String),
            Self::MatchInteger(_) => Some(KnownJsonType::Integer),
            Self::MatchTrue(_) | Self::MatchFalse(_) => Some(KnownJsonType::Boolean),
            Self::None | Self::NonEmpty(_) | Self::MatchCondition(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReadinessCheck {
    #[serde(default)]
    pub field_path: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStringReadinessCheck {
    #[serde(default)]
    pub field_path: String,

    #[serde(default)]
    pub match_string: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchIntegerReadinessCheck {
    #[serde(default)]
    pub field_path: String,

    #[serde(default)]
    pub match_integer: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConditionReadinessCheck {
    #[serde(default)]
    pub match_condition: MatchCondition,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct MatchCondition {
    #[serde(rename = "type", default)]
    pub type_: String,

    #[serde(default)]
    pub status: String,
}

/// The source of a connection detail written to the connection secret.
#[derive(Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum ConnectionDetailType {
    FromConnectionSecretKey,
    FromFieldPath,
    FromValue,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<ConnectionDetailType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_connection_secret_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ConnectionDetail {
    /// Returns the declared type, or infers it from the populated source field.
    pub fn resolved_type(&self) -> Option<ConnectionDetailType> {
        self.type_.or_else(|| {
            if self.from_connection_secret_key.is_some() {
                Some(ConnectionDetailType::FromConnectionSecretKey)
            } else if self.from_field_path.is_some() {
                Some(ConnectionDetailType::FromFieldPath)
            } else if self.value.is_some() {
                Some(ConnectionDetailType::FromValue)
            } else {
                None
            }
        })
    }
}
