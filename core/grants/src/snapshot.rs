//! Build the persisted form of the grants held for an identity.
use std::collections::HashMap;

use anyhow::Result;

use breakglass_crypto::Envelope;
use breakglass_crypto::KeyId;
use breakglass_crypto::Sealed;
use breakglass_crypto::NO_KEY;

use crate::document::GrantDocument;
use crate::document::Key;
use crate::document::PermissionGrant;
use crate::document::ResourceGrants;
use crate::errors::KeyIdMismatch;
use crate::errors::MissingIdentity;
use crate::Grant;
use crate::Resources;
use crate::UserGrant;

/// Assemble the document of all API key grants for an identity.
///
/// Keys are ordered by API key so the document only depends on the grants it holds.
pub fn api_key_document(
    envelope: &Envelope,
    table: &HashMap<String, Grant>,
    identity: &str,
    user: &str,
) -> Result<GrantDocument> {
    if identity.is_empty() {
        anyhow::bail!(MissingIdentity);
    }
    let mut grants: Vec<(&String, &Grant)> = table
        .iter()
        .filter(|(_, grant)| grant.identity == identity)
        .collect();
    grants.sort_by(|(left, _), (right, _)| left.cmp(right));

    let mut keys = Vec::with_capacity(grants.len());
    for (api_key, grant) in grants {
        let api_key = envelope.seal(api_key)?;
        let token = envelope.seal(&grant.token)?;
        let key_id = shared_key_id(&api_key, &token)?;
        keys.push(Key {
            api_key: api_key.ciphertext,
            token: token.ciphertext,
            key_id,
            source: grant.source.clone(),
            last_updated: last_updated(&grant.resources),
            resources: flatten(&grant.resources),
        });
    }
    Ok(GrantDocument {
        user: user.to_string(),
        is_api: true,
        keys,
    })
}

/// Assemble the document of the identity grants for an identity.
pub fn identity_document(grant: &UserGrant) -> Result<GrantDocument> {
    if grant.identity.is_empty() {
        anyhow::bail!(MissingIdentity);
    }
    let key = Key {
        api_key: String::new(),
        token: String::new(),
        key_id: NO_KEY,
        source: grant.source.clone(),
        last_updated: last_updated(&grant.resources),
        resources: flatten(&grant.resources),
    };
    Ok(GrantDocument {
        user: grant.user.clone(),
        is_api: false,
        keys: vec![key],
    })
}

/// Key ID of an API key and token pair, which must be sealed with the same key.
pub fn shared_key_id(api_key: &Sealed, token: &Sealed) -> Result<KeyId> {
    if api_key.key_id != token.key_id {
        anyhow::bail!(KeyIdMismatch {
            api_key: api_key.key_id,
            token: token.key_id,
        });
    }
    Ok(api_key.key_id)
}

fn flatten(resources: &Resources) -> Vec<ResourceGrants> {
    resources
        .iter()
        .map(|(resource, permissions)| ResourceGrants {
            resource: resource.clone(),
            permissions: permissions
                .iter()
                .map(|(permission, time)| PermissionGrant {
                    permission: permission.clone(),
                    time: *time,
                })
                .collect(),
        })
        .collect()
}

fn last_updated(resources: &Resources) -> i64 {
    resources
        .values()
        .flat_map(|permissions| permissions.values())
        .copied()
        .max()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use breakglass_crypto::Envelope;
    use breakglass_crypto::Sealed;

    use super::api_key_document;
    use super::identity_document;
    use super::shared_key_id;
    use crate::errors::KeyIdMismatch;
    use crate::errors::MissingIdentity;
    use crate::Grant;
    use crate::UserGrant;

    fn grant(identity: &str, token: &str) -> Grant {
        let mut grant = Grant {
            identity: identity.into(),
            user: "alice".into(),
            source: "public-iam".into(),
            token: token.into(),
            resources: Default::default(),
        };
        grant.record("R1", "read", 1000);
        grant.record("R1", "write", 1500);
        grant.record("R2", "read", 1200);
        grant
    }

    #[test]
    fn api_document_collects_identity_keys() {
        let envelope = Envelope::fixture();
        let mut table = HashMap::new();
        table.insert("K2".to_string(), grant("I", "T2"));
        table.insert("K1".to_string(), grant("I", "T1"));
        table.insert("K3".to_string(), grant("other", "T3"));

        let document = api_key_document(&envelope, &table, "I", "alice").unwrap();
        assert!(document.is_api);
        assert_eq!(document.keys.len(), 2);
        let key = &document.keys[0];
        assert_eq!(envelope.open(&key.api_key, key.key_id).unwrap(), "K1");
        assert_eq!(envelope.open(&key.token, key.key_id).unwrap(), "T1");
        assert_eq!(key.last_updated, 1500);
        assert_eq!(key.resources.len(), 2);
        assert_eq!(key.resources[0].resource, "R1");
        assert_eq!(key.resources[0].permissions[1].permission, "write");
        let key = &document.keys[1];
        assert_eq!(envelope.open(&key.api_key, key.key_id).unwrap(), "K2");
    }

    #[test]
    fn identity_document_has_no_secrets() {
        let grant = UserGrant {
            identity: "I".into(),
            user: "alice".into(),
            source: "public-iam".into(),
            resources: grant("I", "").resources,
        };
        let document = identity_document(&grant).unwrap();
        assert!(!document.is_api);
        assert_eq!(document.keys.len(), 1);
        assert_eq!(document.keys[0].api_key, "");
        assert_eq!(document.keys[0].token, "");
        assert_eq!(document.keys[0].key_id, 0);
        assert_eq!(document.keys[0].last_updated, 1500);
    }

    #[test]
    fn empty_identity_is_rejected() {
        let envelope = Envelope::fixture();
        let table = HashMap::new();
        let error = api_key_document(&envelope, &table, "", "alice").unwrap_err();
        assert!(error.is::<MissingIdentity>());
    }

    #[test]
    fn key_ids_must_match() {
        let api_key = Sealed {
            ciphertext: "a".into(),
            key_id: 1,
        };
        let token = Sealed {
            ciphertext: "b".into(),
            key_id: 2,
        };
        let error = shared_key_id(&api_key, &token).unwrap_err();
        assert!(error.is::<KeyIdMismatch>());
        assert_eq!(shared_key_id(&api_key, &api_key.clone()).unwrap(), 1);
    }
}
