//! Certificate validation wait

use crate::services::{CertificateAuthority, CertificateRequest, CertificateStatus};
use sitestack_cloud::{CloudError, Result, RetryConfig};

/// Poll until the certificate is validated
///
/// Pending polls back off per `retry`. A failed validation is reported with
/// the authority's message; running out of attempts is a
/// [`CloudError::ValidationTimeout`]. Transient errors count as a pending
/// poll.
pub async fn wait_for_validation(
    authority: &dyn CertificateAuthority,
    arn: &str,
    retry: &RetryConfig,
) -> Result<CertificateRequest> {
    let mut domain = arn.to_string();
    for attempt in 0..retry.max_attempts {
        match authority.describe_certificate(arn).await {
            Ok(request) => {
                domain = request.domain.to_string();
                match &request.status {
                    CertificateStatus::Validated => {
                        tracing::info!("Certificate for {} is validated", domain);
                        return Ok(request);
                    }
                    CertificateStatus::Failed(reason) => {
                        return Err(CloudError::provider(
                            format!("certificate for {}", domain),
                            reason.clone(),
                        ));
                    }
                    CertificateStatus::Pending => {}
                }
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("Checking certificate {} failed: {}", arn, e);
            }
            Err(e) => return Err(e),
        }

        if attempt + 1 < retry.max_attempts {
            let delay = retry.delay_for(attempt);
            tracing::debug!(
                "Certificate for {} pending, next check in {:?} ({}/{})",
                domain,
                delay,
                attempt + 1,
                retry.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(CloudError::ValidationTimeout {
        domain,
        attempts: retry.max_attempts,
    })
}

/// Fail unless the certificate behind `arn` is validated right now
pub async fn ensure_validated(authority: &dyn CertificateAuthority, arn: &str) -> Result<()> {
    if arn.is_empty() {
        return Err(CloudError::CertificateNotValidated(
            "no certificate handle".to_string(),
        ));
    }
    let request = authority
        .describe_certificate(arn)
        .await
        .map_err(|e| match e {
            CloudError::Provider { message, .. } => {
                CloudError::CertificateNotValidated(format!("{}: {}", arn, message))
            }
            other => other,
        })?;
    match request.status {
        CertificateStatus::Validated => Ok(()),
        CertificateStatus::Pending => Err(CloudError::CertificateNotValidated(format!(
            "{} is still pending validation",
            arn
        ))),
        CertificateStatus::Failed(reason) => Err(CloudError::CertificateNotValidated(format!(
            "{}: {}",
            arn, reason
        ))),
    }
}
