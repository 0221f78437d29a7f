//! Canonical Resource Names and public resource matching.
use std::str::FromStr;

use anyhow::Result;

use crate::errors::InvalidCrn;

/// Number of `:` separated segments in a CRN.
const SEGMENTS: usize = 10;

/// A Canonical Resource Name:
/// `crn:version:cname:ctype:service-name:location:scope:service-instance:resource-type:resource`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crn {
    pub version: String,
    pub cname: String,
    pub ctype: String,
    pub service_name: String,
    pub location: String,
    pub scope: String,
    pub service_instance: String,
    pub resource_type: String,
    pub resource: String,
}

impl Crn {
    /// Parse a CRN, the resource segment may contain `:` characters.
    pub fn parse(crn: &str) -> Result<Crn> {
        let segments: Vec<&str> = crn.splitn(SEGMENTS, ':').collect();
        if segments.len() != SEGMENTS || segments[0] != "crn" {
            anyhow::bail!(InvalidCrn(crn.to_string()));
        }
        Ok(Crn {
            version: segments[1].to_string(),
            cname: segments[2].to_string(),
            ctype: segments[3].to_string(),
            service_name: segments[4].to_string(),
            location: segments[5].to_string(),
            scope: segments[6].to_string(),
            service_instance: segments[7].to_string(),
            resource_type: segments[8].to_string(),
            resource: segments[9].to_string(),
        })
    }

    /// Generic resources are not scoped to an account or service instance.
    pub fn is_generic(&self) -> bool {
        self.scope.is_empty() && self.service_instance.is_empty()
    }
}

impl FromStr for Crn {
    type Err = anyhow::Error;

    fn from_str(crn: &str) -> Result<Self> {
        Crn::parse(crn)
    }
}

impl std::fmt::Display for Crn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "crn:{}:{}:{}:{}:{}:{}:{}:{}:{}",
            self.version,
            self.cname,
            self.ctype,
            self.service_name,
            self.location,
            self.scope,
            self.service_instance,
            self.resource_type,
            self.resource,
        )
    }
}

/// Resources every user is authorised to access.
#[derive(Clone, Debug, Default)]
pub struct PublicResources {
    patterns: Vec<String>,
}

impl PublicResources {
    /// Match generic CRNs plus the given patterns (exact or with a trailing `*`).
    pub fn new(patterns: Vec<String>) -> PublicResources {
        PublicResources { patterns }
    }

    /// Check if a resource is public.
    pub fn matches(&self, resource: &str) -> bool {
        let configured = self.patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => resource.starts_with(prefix),
            None => resource == pattern,
        });
        if configured {
            return true;
        }
        Crn::parse(resource)
            .map(|crn| crn.is_generic())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::Crn;
    use super::PublicResources;
    use crate::errors::InvalidCrn;

    #[test]
    fn parse_crn() {
        let crn = Crn::parse("crn:v1:bluemix:public:kms:us-south:a/123:inst-1:key:abc").unwrap();
        assert_eq!(crn.service_name, "kms");
        assert_eq!(crn.location, "us-south");
        assert_eq!(crn.scope, "a/123");
        assert_eq!(crn.service_instance, "inst-1");
        assert_eq!(crn.resource_type, "key");
        assert_eq!(crn.resource, "abc");
        assert!(!crn.is_generic());
        assert_eq!(
            crn.to_string(),
            "crn:v1:bluemix:public:kms:us-south:a/123:inst-1:key:abc"
        );
    }

    #[test]
    fn resource_keeps_colons() {
        let crn: Crn = "crn:v1:bluemix:public:cos:global:::bucket:a:b".parse().unwrap();
        assert_eq!(crn.resource, "a:b");
        assert!(crn.is_generic());
    }

    #[test]
    fn invalid_crn() {
        let error = Crn::parse("crn:v1:bluemix").unwrap_err();
        assert!(error.is::<InvalidCrn>());
        let error = Crn::parse("urn:v1:bluemix:public:kms:us-south:a/1:i:key:abc").unwrap_err();
        assert!(error.is::<InvalidCrn>());
    }

    #[test]
    fn public_resources() {
        let public = PublicResources::new(vec![
            "crn:v1:bluemix:public:catalog:*".into(),
            "status-page".into(),
        ]);
        assert!(public.matches("crn:v1:bluemix:public:catalog:global:a/1:i::"));
        assert!(public.matches("status-page"));
        assert!(!public.matches("status-page-admin"));
        assert!(public.matches("crn:v1:bluemix:public:kms:us-south::::"));
        assert!(!public.matches("crn:v1:bluemix:public:kms:us-south:a/1:inst::"));
        assert!(!public.matches("not-a-crn"));
    }
}
