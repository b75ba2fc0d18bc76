use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use x509_parser::certificate::Validity;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::parse_x509_certificate;

const OCSP_ACCESS_METHOD: &str = "1.3.6.1.5.5.7.48.1";

/// Material produced by one successful order. Only lives for the duration of a run.
#[derive(Clone, Debug)]
pub struct CertificateBundle {
    /// Leaf certificate.
    pub certificate_pem: String,
    pub private_key_pem: String,
    /// Intermediates following the leaf, possibly empty.
    pub chain_pem: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
}

impl CertificateBundle {
    /// Builds a bundle from the PEM chain returned by the CA, leaf first.
    pub fn from_pem(private_key_pem: impl Into<String>, chain: &str) -> Result<Self, CertParseError> {
        let pems = pem::parse_many(chain)?;
        let mut certs = pems.iter().filter(|p| p.tag() == "CERTIFICATE").map(pem::encode);
        let certificate_pem = certs.next().ok_or(CertParseError::TooFewPem(0))?;
        let chain_pem: String = certs.collect();
        let info = CertificateInfo::from_pem(&certificate_pem)?;
        Ok(Self {
            certificate_pem,
            private_key_pem: private_key_pem.into(),
            chain_pem,
            issued_at: info.not_before,
            expires_at: info.not_after,
            issuer: info.issuer.unwrap_or_default(),
        })
    }

    /// Leaf followed by intermediates, the form SNI endpoints expect.
    pub fn full_chain(&self) -> String {
        [self.certificate_pem.as_str(), self.chain_pem.as_str()].concat()
    }
}

/// The parts of a leaf certificate renewal decisions look at.
#[derive(Clone, Debug)]
pub struct CertificateInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Issuer common name.
    pub issuer: Option<String>,
    pub ocsp_urls: Vec<String>,
    pub domains: Vec<String>,
}

impl CertificateInfo {
    /// Parses the first certificate found in `pem`.
    pub fn from_pem(pem: &str) -> Result<Self, CertParseError> {
        let pems = pem::parse_many(pem)?;
        let leaf = pems
            .iter()
            .find(|p| p.tag() == "CERTIFICATE")
            .ok_or(CertParseError::TooFewPem(0))?;
        Self::from_der(leaf.contents())
    }

    pub fn from_der(der: &[u8]) -> Result<Self, CertParseError> {
        let (_, x509) = parse_x509_certificate(der).map_err(CertParseError::X509)?;
        let Validity { not_before, not_after } = x509.validity();
        let [not_before, not_after] = [not_before, not_after].map(|t| Utc.timestamp_opt(t.timestamp(), 0).single());
        let (not_before, not_after) = match (not_before, not_after) {
            (Some(not_before), Some(not_after)) => (not_before, not_after),
            _ => return Err(CertParseError::InvalidValidity),
        };
        let issuer = x509
            .issuer()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(String::from);
        let mut ocsp_urls = Vec::new();
        for extension in x509.extensions() {
            if let ParsedExtension::AuthorityInfoAccess(aia) = extension.parsed_extension() {
                for description in &aia.accessdescs {
                    if description.access_method.to_id_string() != OCSP_ACCESS_METHOD {
                        continue;
                    }
                    if let GeneralName::URI(uri) = &description.access_location {
                        ocsp_urls.push(uri.to_string());
                    }
                }
            }
        }
        let domains = x509
            .subject_alternative_name()
            .ok()
            .flatten()
            .iter()
            .flat_map(|it| {
                it.value.general_names.iter().filter_map(|it| match it {
                    GeneralName::DNSName(dns) => Some(String::from(*dns)),
                    _ => None,
                })
            })
            .collect();
        Ok(Self {
            not_before,
            not_after,
            issuer,
            ocsp_urls,
            domains,
        })
    }
}

#[derive(Error, Debug)]
pub enum CertParseError {
    #[error("X509 parsing error: {0}")]
    X509(x509_parser::nom::Err<x509_parser::error::X509Error>),
    #[error("pem parsing error: {0}")]
    Pem(#[from] pem::PemError),
    #[error("expected at least one certificate pem, got: {0}")]
    TooFewPem(usize),
    #[error("certificate validity is out of range")]
    InvalidValidity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{certificate, ymd};

    #[test]
    fn bundle_from_chain_splits_leaf_and_intermediates() {
        let (key, leaf) = certificate("Test Leaf", &["www.example.com"], ymd(2030, 1, 1), ymd(2030, 4, 1));
        let (_, intermediate) = certificate("Test Intermediate", &["ca.example.com"], ymd(2029, 1, 1), ymd(2035, 1, 1));
        let chain = format!("{}\n{}", leaf, intermediate);
        let bundle = CertificateBundle::from_pem(key.clone(), &chain).unwrap();

        assert_eq!(bundle.private_key_pem, key);
        assert_eq!(bundle.issuer, "Test Leaf");
        assert_eq!(bundle.expires_at, Utc.with_ymd_and_hms(2030, 4, 1, 0, 0, 0).unwrap());
        assert_eq!(bundle.issued_at, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        let full = pem::parse_many(bundle.full_chain()).unwrap();
        assert_eq!(full.len(), 2);
        assert_eq!(CertificateInfo::from_pem(&bundle.chain_pem).unwrap().issuer.as_deref(), Some("Test Intermediate"));
    }

    #[test]
    fn info_lists_san_domains() {
        let (_, leaf) = certificate("Test", &["a.example.com", "b.example.com"], ymd(2030, 1, 1), ymd(2030, 4, 1));
        let info = CertificateInfo::from_pem(&leaf).unwrap();
        assert_eq!(info.domains, vec!["a.example.com".to_string(), "b.example.com".to_string()]);
        assert!(info.ocsp_urls.is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(CertificateInfo::from_pem("not a certificate").is_err());
        let (key, _) = certificate("Test", &["a.example.com"], ymd(2030, 1, 1), ymd(2030, 4, 1));
        // a private key alone carries no certificate
        assert!(matches!(CertificateBundle::from_pem("k", &key), Err(CertParseError::TooFewPem(0))));
    }
}
