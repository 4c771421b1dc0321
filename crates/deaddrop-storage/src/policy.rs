//! Bucket policy document model.
//!
//! Mirrors the JSON shape object-storage services accept for bucket
//! policies: a versioned document holding statements, each granting one
//! action on a list of object resources to either the anonymous public
//! principal or a single named account principal. The ledger mutates these
//! documents and re-publishes them whole; this module only models the data.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Policy language version understood by the storage service.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Document id stamped on every published policy.
pub const POLICY_ID: &str = "DeaddropBucketPolicy";

/// Object-level permission carried by a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// Read access to an object.
    #[serde(rename = "s3:GetObject")]
    GetObject,
    /// Write access to an object.
    #[serde(rename = "s3:PutObject")]
    PutObject,
}

/// The principal a statement grants access to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Anonymous access; serializes as the literal string `"*"`.
    Public,
    /// A named account, keyed by its canonical id.
    Canonical(String),
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Principal::Public => serializer.serialize_str("*"),
            Principal::Canonical(id) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("CanonicalUser", id)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) if s == "*" => Ok(Principal::Public),
            serde_json::Value::Object(map) => match map.get("CanonicalUser") {
                Some(serde_json::Value::String(id)) => Ok(Principal::Canonical(id.clone())),
                _ => Err(D::Error::custom("principal object missing CanonicalUser")),
            },
            other => Err(D::Error::custom(format!("unsupported principal: {other}"))),
        }
    }
}

/// One named grant: an action over a set of object resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    /// Statement id; the ledger's lookup key.
    pub sid: String,
    /// Always `"Allow"`; deny statements are never produced.
    pub effect: String,
    /// Who the grant applies to.
    pub principal: Principal,
    /// Granted actions (always a single permission in practice).
    pub action: Vec<Permission>,
    /// Fully-qualified object ARNs covered by the grant.
    pub resource: Vec<String>,
}

impl PolicyStatement {
    /// Build a statement granting `permission` on one resource.
    pub fn single(
        sid: impl Into<String>,
        principal: Principal,
        permission: Permission,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            sid: sid.into(),
            effect: "Allow".to_string(),
            principal,
            action: vec![permission],
            resource: vec![resource.into()],
        }
    }
}

/// A whole bucket policy document, published as one JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version.
    pub version: String,
    /// Document id.
    pub id: String,
    /// The statements currently in force.
    pub statement: Vec<PolicyStatement>,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            id: POLICY_ID.to_string(),
            statement: Vec::new(),
        }
    }
}

impl PolicyDocument {
    /// An empty document with the standard version and id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the statement with the given sid, if present.
    pub fn find_statement(&self, sid: &str) -> Option<usize> {
        self.statement.iter().position(|s| s.sid == sid)
    }
}

/// Fully-qualified ARN for an object key within a bucket.
pub fn object_arn(bucket: &str, key: &str) -> String {
    format!("arn:aws:s3:::{bucket}/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_statement_json_shape() {
        let st = PolicyStatement::single(
            "public-gettable-abc",
            Principal::Public,
            Permission::GetObject,
            object_arn("drop-bucket", "abc"),
        );
        let json = serde_json::to_value(&st).unwrap();
        assert_eq!(json["Sid"], "public-gettable-abc");
        assert_eq!(json["Effect"], "Allow");
        assert_eq!(json["Principal"], "*");
        assert_eq!(json["Action"][0], "s3:GetObject");
        assert_eq!(json["Resource"][0], "arn:aws:s3:::drop-bucket/abc");
    }

    #[test]
    fn test_canonical_principal_json_shape() {
        let st = PolicyStatement::single(
            "private-puttable",
            Principal::Canonical("deadbeef".to_string()),
            Permission::PutObject,
            object_arn("drop-bucket", "*"),
        );
        let json = serde_json::to_value(&st).unwrap();
        assert_eq!(json["Principal"]["CanonicalUser"], "deadbeef");
        assert_eq!(json["Action"][0], "s3:PutObject");
    }

    #[test]
    fn test_document_round_trip() {
        let mut doc = PolicyDocument::new();
        doc.statement.push(PolicyStatement::single(
            "sid-1",
            Principal::Public,
            Permission::PutObject,
            object_arn("b", "k"),
        ));
        let text = serde_json::to_string(&doc).unwrap();
        let back: PolicyDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.version, POLICY_VERSION);
        assert_eq!(back.id, POLICY_ID);
    }

    #[test]
    fn test_find_statement() {
        let mut doc = PolicyDocument::new();
        assert_eq!(doc.find_statement("missing"), None);
        doc.statement.push(PolicyStatement::single(
            "a",
            Principal::Public,
            Permission::GetObject,
            "arn:aws:s3:::b/x",
        ));
        doc.statement.push(PolicyStatement::single(
            "b",
            Principal::Public,
            Permission::GetObject,
            "arn:aws:s3:::b/y",
        ));
        assert_eq!(doc.find_statement("b"), Some(1));
    }

    #[test]
    fn test_bad_principal_rejected() {
        let err = serde_json::from_value::<Principal>(serde_json::json!({"Service": "x"}));
        assert!(err.is_err());
        let err = serde_json::from_value::<Principal>(serde_json::json!(42));
        assert!(err.is_err());
    }
}
