//! Resource addresses and cross-resource references
//!
//! A reference is written into a resource configuration as a
//! `${type.name.attribute}` token. Tokens are resolved against the
//! attributes of already-applied resources right before a node is applied,
//! and every token also counts as an implicit dependency edge.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

const TOKEN_OPEN: &str = "${";
const TOKEN_CLOSE: char = '}';

/// Attributes exported by an applied resource
pub type Attributes = HashMap<String, serde_json::Value>;

/// Unique, deterministic resource address (`type.name`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    resource_type: String,
    name: String,
}

impl Address {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let resource_type = resource_type.into();
        let name = name.into();

        if resource_type.is_empty()
            || !resource_type
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(CloudError::Graph(format!(
                "invalid resource type '{}'",
                resource_type
            )));
        }
        if name.is_empty() || name.contains(TOKEN_CLOSE) || name.contains(TOKEN_OPEN) {
            return Err(CloudError::Graph(format!("invalid resource name '{}'", name)));
        }

        Ok(Self {
            resource_type,
            name,
        })
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference to one of this resource's exported attributes
    pub fn attr(&self, attribute: &str) -> Reference {
        Reference {
            address: self.clone(),
            attribute: attribute.to_string(),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

impl std::str::FromStr for Address {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        let (resource_type, name) = s
            .split_once('.')
            .ok_or_else(|| CloudError::Graph(format!("malformed address '{}'", s)))?;
        Address::new(resource_type, name)
    }
}

impl TryFrom<String> for Address {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// Reference to an attribute of another resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    pub address: Address,
    pub attribute: String,
}

impl Reference {
    /// The `${...}` token embedded in configurations
    pub fn token(&self) -> String {
        format!("{}{}.{}{}", TOKEN_OPEN, self.address, self.attribute, TOKEN_CLOSE)
    }

    /// Parse the inside of a token (`type.name.attribute`)
    fn parse_inner(inner: &str) -> Result<Self> {
        let (address, attribute) = inner
            .rsplit_once('.')
            .ok_or_else(|| CloudError::Graph(format!("malformed reference '{}'", inner)))?;
        Ok(Reference {
            address: address.parse()?,
            attribute: attribute.to_string(),
        })
    }
}

impl From<Reference> for serde_json::Value {
    fn from(reference: Reference) -> Self {
        serde_json::Value::String(reference.token())
    }
}

/// A reference serializes as its token, so it can be embedded with `json!`
impl Serialize for Reference {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.address, self.attribute)
    }
}

/// Split a string into literal text and reference segments
fn segments(s: &str) -> Result<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    let mut rest = s;

    while let Some(start) = rest.find(TOKEN_OPEN) {
        if start > 0 {
            out.push(Segment::Text(&rest[..start]));
        }
        let after = &rest[start + TOKEN_OPEN.len()..];
        let end = after
            .find(TOKEN_CLOSE)
            .ok_or_else(|| CloudError::Graph(format!("unterminated reference in '{}'", s)))?;
        out.push(Segment::Ref(Reference::parse_inner(&after[..end])?));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }

    Ok(out)
}

enum Segment<'a> {
    Text(&'a str),
    Ref(Reference),
}

/// Collect every reference contained in a configuration value
pub fn references(value: &serde_json::Value) -> Result<BTreeSet<Reference>> {
    let mut found = BTreeSet::new();
    collect(value, &mut found)?;
    Ok(found)
}

fn collect(value: &serde_json::Value, found: &mut BTreeSet<Reference>) -> Result<()> {
    match value {
        serde_json::Value::String(s) => {
            for segment in segments(s)? {
                if let Segment::Ref(r) = segment {
                    found.insert(r);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect(item, found)?;
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect(item, found)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Replace every reference in `value` with the referenced attribute
///
/// A string that consists of exactly one token takes the attribute's JSON
/// value as-is; tokens embedded in longer strings are interpolated.
pub fn resolve<F>(value: &serde_json::Value, lookup: &F) -> Result<serde_json::Value>
where
    F: Fn(&Reference) -> Option<serde_json::Value>,
{
    match value {
        serde_json::Value::String(s) => {
            let parts = segments(s)?;
            if let [Segment::Ref(r)] = parts.as_slice() {
                return lookup(r).ok_or_else(|| unresolved(r));
            }

            let mut out = String::new();
            for part in parts {
                match part {
                    Segment::Text(t) => out.push_str(t),
                    Segment::Ref(r) => match lookup(&r).ok_or_else(|| unresolved(&r))? {
                        serde_json::Value::String(v) => out.push_str(&v),
                        other => out.push_str(&other.to_string()),
                    },
                }
            }
            Ok(serde_json::Value::String(out))
        }
        serde_json::Value::Array(items) => Ok(serde_json::Value::Array(
            items
                .iter()
                .map(|item| resolve(item, lookup))
                .collect::<Result<Vec<_>>>()?,
        )),
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve(v, lookup)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn unresolved(reference: &Reference) -> CloudError {
    CloudError::Graph(format!("unresolved reference {}", reference))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket() -> Address {
        Address::new("storage_bucket", "website").unwrap()
    }

    #[test]
    fn test_address_round_trip() {
        let addr: Address = "storage_object.img/logo.png".parse().unwrap();
        assert_eq!(addr.resource_type(), "storage_object");
        assert_eq!(addr.name(), "img/logo.png");
        assert_eq!(addr.to_string(), "storage_object.img/logo.png");
    }

    #[test]
    fn test_invalid_address() {
        assert!(Address::new("Storage-Bucket", "x").is_err());
        assert!(Address::new("storage_bucket", "").is_err());
        assert!(Address::new("storage_bucket", "a}b").is_err());
        assert!("nodot".parse::<Address>().is_err());
    }

    #[test]
    fn test_token_with_dotted_name() {
        let addr = Address::new("storage_object", "img/logo.png").unwrap();
        let config = json!({ "etag": addr.attr("etag").token() });
        let refs = references(&config).unwrap();
        let r = refs.iter().next().unwrap();
        assert_eq!(r.address, addr);
        assert_eq!(r.attribute, "etag");
    }

    #[test]
    fn test_collect_nested_references() {
        let config = json!({
            "bucket": bucket().attr("name").token(),
            "statement": [{
                "resource": format!("arn:aws:s3:::{}/*", bucket().attr("name").token()),
                "condition": { "arn": "${distribution.website.arn}" }
            }],
            "ttl": 60
        });
        let refs = references(&config).unwrap();
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_resolve_whole_and_interpolated() {
        let config = json!({
            "name": bucket().attr("name").token(),
            "resource": format!("arn:aws:s3:::{}/*", bucket().attr("name").token()),
            "aliases": [bucket().attr("aliases").token()],
        });
        let lookup = |r: &Reference| match r.attribute.as_str() {
            "name" => Some(json!("site-assets-example")),
            "aliases" => Some(json!(["example.com"])),
            _ => None,
        };
        let resolved = resolve(&config, &lookup).unwrap();
        assert_eq!(resolved["name"], "site-assets-example");
        assert_eq!(resolved["resource"], "arn:aws:s3:::site-assets-example/*");
        assert_eq!(resolved["aliases"], json!([["example.com"]]));
    }

    #[test]
    fn test_resolve_missing_attribute_fails() {
        let config = json!({ "arn": "${distribution.website.arn}" });
        let err = resolve(&config, &|_: &Reference| None).unwrap_err();
        assert!(err.to_string().contains("distribution.website.arn"));
    }

    #[test]
    fn test_unterminated_token() {
        assert!(references(&json!("${storage_bucket.website.name")).is_err());
    }
}
