//! Decides whether the certificate currently installed on an SNI endpoint is still good
//! enough to keep.
//!
//! Only the validity window is inspected. Whether the certificate's SANs still cover the
//! app's current custom domains is not checked, so after a domain is added a certificate
//! that has not yet reached the threshold is kept.

use crate::certificate::{CertParseError, CertificateInfo};
use chrono::{DateTime, Utc};

const MILLIS_PER_DAY: i64 = 24 * 3600 * 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewalDecision {
    Skip,
    Renew,
}

pub fn evaluate(existing_cert_pem: &str, domains: &[String], threshold_days: i64, force: bool) -> Result<RenewalDecision, CertParseError> {
    evaluate_at(existing_cert_pem, domains, threshold_days, force, Utc::now())
}

pub fn evaluate_at(
    existing_cert_pem: &str,
    domains: &[String],
    threshold_days: i64,
    force: bool,
    now: DateTime<Utc>,
) -> Result<RenewalDecision, CertParseError> {
    if force {
        return Ok(RenewalDecision::Renew);
    }
    let info = CertificateInfo::from_pem(existing_cert_pem)?;
    let remaining = remaining_days(info.not_after, now);
    log::info!("existing certificate found, expires in {} day(s)", remaining);
    log::debug!("existing certificate covers {:?}, requested {:?}", info.domains, domains);
    match remaining < threshold_days {
        true => Ok(RenewalDecision::Renew),
        false => Ok(RenewalDecision::Skip),
    }
}

/// Whole days left until `not_after`, rounded down. Negative once expired.
pub fn remaining_days(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// True for certificates from a staging CA, which browsers do not trust.
pub fn is_staging_issuer(cert_pem: &str) -> bool {
    match CertificateInfo::from_pem(cert_pem) {
        Ok(info) => is_staging(&info),
        Err(err) => {
            log::debug!("could not inspect issuer: {}", err);
            false
        }
    }
}

pub(crate) fn is_staging(info: &CertificateInfo) -> bool {
    let issuer = info.issuer.as_deref().unwrap_or_default();
    issuer.starts_with("Fake")
        || issuer.contains("(STAGING)")
        || info.ocsp_urls.first().map(|url| url.contains("stg")).unwrap_or(false)
}
