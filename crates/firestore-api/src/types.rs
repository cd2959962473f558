use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Values ──────────────────────────────────────────────────────────

/// A typed Firestore value in its REST JSON form, e.g. `{"stringValue": "x"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    /// int64 values travel as decimal strings.
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(LatLng),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

impl Value {
    /// Encode a plain JSON value. Integers that fit in i64 become
    /// `integerValue`, every other number becomes `doubleValue`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::NullValue(()),
            serde_json::Value::Bool(b) => Self::BooleanValue(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::IntegerValue(i.to_string()),
                None => Self::DoubleValue(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::StringValue(s.clone()),
            serde_json::Value::Array(items) => Self::ArrayValue(ArrayValue {
                values: items.iter().map(Self::from_json).collect(),
            }),
            serde_json::Value::Object(map) => Self::MapValue(MapValue {
                fields: map
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            }),
        }
    }

    /// Decode into plain JSON. Timestamps, bytes and references decode to
    /// their string form.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::NullValue(()) => serde_json::Value::Null,
            Self::BooleanValue(b) => serde_json::Value::Bool(b),
            Self::IntegerValue(s) => match s.parse::<i64>() {
                Ok(i) => serde_json::Value::from(i),
                Err(_) => serde_json::Value::String(s),
            },
            Self::DoubleValue(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::TimestampValue(s)
            | Self::StringValue(s)
            | Self::BytesValue(s)
            | Self::ReferenceValue(s) => serde_json::Value::String(s),
            Self::GeoPointValue(p) => serde_json::json!({
                "latitude": p.latitude,
                "longitude": p.longitude,
            }),
            Self::ArrayValue(a) => {
                serde_json::Value::Array(a.values.into_iter().map(Self::into_json).collect())
            }
            Self::MapValue(m) => serde_json::Value::Object(
                m.fields
                    .into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect(),
            ),
        }
    }
}

// ── Documents ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name: `projects/{p}/databases/{d}/documents/{collection}/{id}`.
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
}

impl Document {
    /// The document id, i.e. the last segment of the resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Decode all fields into a JSON object.
    pub fn into_json_fields(self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .into_iter()
            .map(|(k, v)| (k, v.into_json()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteFields {
    pub fields: HashMap<String, Value>,
}

// ── Queries ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

impl StructuredQuery {
    /// Equality query over one collection; multiple filters are AND-ed.
    pub fn equality(collection: &str, filters: &[(String, Value)], limit: Option<i32>) -> Self {
        let mut field_filters: Vec<Filter> = filters
            .iter()
            .map(|(path, value)| {
                Filter::FieldFilter(FieldFilter {
                    field: FieldReference {
                        field_path: path.clone(),
                    },
                    op: FieldOperator::Equal,
                    value: value.clone(),
                })
            })
            .collect();

        let r#where = match field_filters.len() {
            0 => None,
            1 => field_filters.pop(),
            _ => Some(Filter::CompositeFilter(CompositeFilter {
                op: CompositeOperator::And,
                filters: field_filters,
            })),
        };

        Self {
            from: vec![CollectionSelector {
                collection_id: collection.to_string(),
            }],
            r#where,
            limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    CompositeFilter(CompositeFilter),
    FieldFilter(FieldFilter),
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeFilter {
    pub op: CompositeOperator,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompositeOperator {
    And,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: FieldOperator,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldOperator {
    Equal,
}

/// One element of the streamed `runQuery` response array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub read_time: Option<String>,
}

// ── Auth ────────────────────────────────────────────────────────────

/// The subset of a Google service-account key file the client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenClaims<'a> {
    pub iss: &'a str,
    pub scope: &'a str,
    pub aud: &'a str,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}
