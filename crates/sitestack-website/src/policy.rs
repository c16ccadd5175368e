//! Storage access policy scoped to one distribution

use serde::{Deserialize, Serialize};
use sitestack_cloud::{CloudError, Result};

pub const POLICY_VERSION: &str = "2012-10-17";
pub const CDN_SERVICE_PRINCIPAL: &str = "cloudfront.amazonaws.com";
pub const READ_OBJECT_ACTION: &str = "s3:GetObject";
pub const SOURCE_ARN_CONDITION_KEY: &str = "AWS:SourceArn";
pub const STATEMENT_SID: &str = "AllowCloudFrontServicePrincipalReadOnly";

/// Bucket policy document
///
/// Always holds exactly one allow statement: the CDN service principal may
/// read objects only when the request comes from `source_arn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub sid: String,
    pub effect: String,
    pub principal: ServicePrincipal,
    pub action: String,
    pub resource: String,
    pub condition: PolicyCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePrincipal {
    #[serde(rename = "Service")]
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCondition {
    #[serde(rename = "StringEquals")]
    pub string_equals: SourceArnCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArnCondition {
    #[serde(rename = "AWS:SourceArn")]
    pub source_arn: String,
}

impl BucketPolicyDocument {
    /// Read-only access for one distribution
    pub fn for_distribution(bucket: &str, distribution_arn: &str) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: vec![PolicyStatement {
                sid: STATEMENT_SID.to_string(),
                effect: "Allow".to_string(),
                principal: ServicePrincipal {
                    service: CDN_SERVICE_PRINCIPAL.to_string(),
                },
                action: READ_OBJECT_ACTION.to_string(),
                resource: format!("arn:aws:s3:::{}/*", bucket),
                condition: PolicyCondition {
                    string_equals: SourceArnCondition {
                        source_arn: distribution_arn.to_string(),
                    },
                },
            }],
        }
    }

    /// Parse and check the single-statement shape
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let document: Self = serde_json::from_value(value.clone())?;
        document.check()?;
        Ok(document)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn check(&self) -> Result<()> {
        match self.statement.as_slice() {
            [statement] if statement.effect == "Allow" => {
                if statement.condition.string_equals.source_arn.is_empty() {
                    return Err(CloudError::Configuration(
                        "bucket policy condition has no distribution".to_string(),
                    ));
                }
                Ok(())
            }
            [_] => Err(CloudError::Configuration(
                "bucket policy statement must be an allow statement".to_string(),
            )),
            other => Err(CloudError::Configuration(format!(
                "bucket policy must have exactly one statement, found {}",
                other.len()
            ))),
        }
    }

    /// The distribution this policy is scoped to
    pub fn source_arn(&self) -> Option<&str> {
        self.statement
            .first()
            .map(|s| s.condition.string_equals.source_arn.as_str())
    }

    /// Whether `principal` reading an object via `source_arn` is allowed
    pub fn allows_read(&self, principal: &str, source_arn: &str) -> bool {
        self.statement.iter().any(|s| {
            s.effect == "Allow"
                && s.principal.service == principal
                && s.action == READ_OBJECT_ACTION
                && s.condition.string_equals.source_arn == source_arn
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ARN: &str = "arn:aws:cloudfront::123456789012:distribution/E000000000001";

    #[test]
    fn test_policy_shape() {
        let policy = BucketPolicyDocument::for_distribution("site-assets-example", ARN);
        let value = policy.to_json().unwrap();
        assert_eq!(
            value,
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Sid": "AllowCloudFrontServicePrincipalReadOnly",
                    "Effect": "Allow",
                    "Principal": { "Service": "cloudfront.amazonaws.com" },
                    "Action": "s3:GetObject",
                    "Resource": "arn:aws:s3:::site-assets-example/*",
                    "Condition": { "StringEquals": { "AWS:SourceArn": ARN } }
                }]
            })
        );
        assert_eq!(BucketPolicyDocument::from_json(&value).unwrap(), policy);
    }

    #[test]
    fn test_only_the_distribution_may_read() {
        let policy = BucketPolicyDocument::for_distribution("site-assets-example", ARN);
        assert!(policy.allows_read(CDN_SERVICE_PRINCIPAL, ARN));
        assert!(!policy.allows_read(
            CDN_SERVICE_PRINCIPAL,
            "arn:aws:cloudfront::123456789012:distribution/EOTHER"
        ));
        assert!(!policy.allows_read("s3.amazonaws.com", ARN));
        assert!(!policy.allows_read("*", ARN));
    }

    #[test]
    fn test_rejects_extra_statements() {
        let policy = BucketPolicyDocument::for_distribution("b", ARN);
        let mut value = policy.to_json().unwrap();
        let statement = value["Statement"][0].clone();
        value["Statement"].as_array_mut().unwrap().push(statement);
        assert!(BucketPolicyDocument::from_json(&value).is_err());
    }
}
