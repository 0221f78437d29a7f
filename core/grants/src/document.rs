//! Persisted form of the grants held for an identity.
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use breakglass_crypto::KeyId;
use breakglass_index::IndexDefinition;

/// Prefix of document IDs storing grants observed with API keys.
pub const API_ID_PREFIX: &str = "api+";

/// All grants observed for a single identity, as stored in the index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantDocument {
    /// Display name of the user, may be empty.
    #[serde(default)]
    pub user: String,

    /// Distinguishes grants observed with API keys from grants observed with tokens.
    #[serde(
        rename = "isAPI",
        default,
        serialize_with = "bool_as_string",
        deserialize_with = "bool_from_string"
    )]
    pub is_api: bool,

    /// Grants grouped by the credential they were observed with.
    #[serde(default)]
    pub keys: Vec<Key>,
}

/// Grants observed with a single credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    /// Base64 encoded ciphertext of the API key, empty for identity grants.
    #[serde(default)]
    pub api_key: String,

    /// Base64 encoded ciphertext of the bearer token, empty for identity grants.
    #[serde(default)]
    pub token: String,

    /// Encryption key shared by the API key and token ciphertexts.
    #[serde(rename = "keyID", default)]
    pub key_id: KeyId,

    /// Provider that issued the credential.
    #[serde(default)]
    pub source: String,

    /// Most recent grant time across all resources (seconds since epoch).
    #[serde(default)]
    pub last_updated: i64,

    #[serde(default)]
    pub resources: Vec<ResourceGrants>,
}

/// Permissions granted on a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrants {
    pub resource: String,

    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,
}

/// Time a permission was last granted (seconds since epoch).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission: String,
    pub time: i64,
}

/// Identifier of a grant document, derived from the identity it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentId<'a> {
    /// Grants observed with API keys.
    ApiKey(&'a str),

    /// Grants observed with bearer tokens.
    Identity(&'a str),
}

impl<'a> DocumentId<'a> {
    /// Interpret a document ID, returning `None` when it names no identity.
    pub fn parse(id: &'a str) -> Option<DocumentId<'a>> {
        let id = match id.strip_prefix(API_ID_PREFIX) {
            Some(identity) => DocumentId::ApiKey(identity),
            None => DocumentId::Identity(id),
        };
        if id.identity().is_empty() {
            return None;
        }
        Some(id)
    }

    /// Identity the document belongs to.
    pub fn identity(&self) -> &'a str {
        match self {
            DocumentId::ApiKey(identity) => identity,
            DocumentId::Identity(identity) => identity,
        }
    }
}

impl<'a> std::fmt::Display for DocumentId<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentId::ApiKey(identity) => write!(f, "{}{}", API_ID_PREFIX, identity),
            DocumentId::Identity(identity) => write!(f, "{}", identity),
        }
    }
}

/// Definition of the index grant documents are stored in.
///
/// Documents are only ever fetched in full so keys are stored but not indexed.
pub fn index_definition(name: &str) -> IndexDefinition {
    let mappings = serde_json::json!({
        "dynamic": false,
        "properties": {
            "user": {"type": "keyword"},
            "isAPI": {"type": "keyword"},
            "keys": {"type": "object", "enabled": false},
        },
    });
    IndexDefinition {
        mappings,
        name: name.to_string(),
    }
}

fn bool_as_string<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(if *value { "true" } else { "false" })
}

fn bool_from_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        String(String),
    }
    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::String(value) => Ok(value.eq_ignore_ascii_case("true")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::DocumentId;
    use super::GrantDocument;

    #[test]
    fn document_id_api() {
        let id = DocumentId::parse("api+iam-123").unwrap();
        assert_eq!(id, DocumentId::ApiKey("iam-123"));
        assert_eq!(id.to_string(), "api+iam-123");
    }

    #[test]
    fn document_id_identity() {
        let id = DocumentId::parse("iam-123").unwrap();
        assert_eq!(id, DocumentId::Identity("iam-123"));
        assert_eq!(id.to_string(), "iam-123");
    }

    #[test]
    fn document_id_empty() {
        assert_eq!(DocumentId::parse(""), None);
        assert_eq!(DocumentId::parse("api+"), None);
    }

    #[test]
    fn wire_format() {
        let document: GrantDocument = serde_json::from_value(json!({
            "user": "alice",
            "isAPI": "true",
            "keys": [{
                "apiKey": "YWJj",
                "token": "ZGVm",
                "keyID": 3,
                "source": "public-iam",
                "lastUpdated": 2000,
                "resources": [{
                    "resource": "crn:v1:bluemix:public:svc:us-south:a/1::",
                    "permissions": [{"permission": "read", "time": 2000}],
                }],
            }],
        }))
        .unwrap();
        assert!(document.is_api);
        assert_eq!(document.keys[0].key_id, 3);
        assert_eq!(document.keys[0].resources[0].permissions[0].time, 2000);

        let encoded = serde_json::to_value(&document).unwrap();
        assert_eq!(encoded["isAPI"], json!("true"));
        assert_eq!(encoded["keys"][0]["keyID"], json!(3));
        assert_eq!(encoded["keys"][0]["lastUpdated"], json!(2000));
    }

    #[test]
    fn is_api_accepts_booleans() {
        let document: GrantDocument =
            serde_json::from_value(json!({"user": "", "isAPI": false})).unwrap();
        assert!(!document.is_api);
        assert!(document.keys.is_empty());
    }
}
