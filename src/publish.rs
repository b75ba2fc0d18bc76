use crate::certificate::CertificateBundle;
use crate::platform::{Platform, PlatformError, SniEndpoint};

/// Installs `bundle` on the app. Patches `existing` in place when given, otherwise creates a
/// new endpoint. An update overwrites chain and key completely.
pub async fn publish<P: Platform + ?Sized>(
    platform: &P,
    existing: Option<&SniEndpoint>,
    bundle: &CertificateBundle,
) -> Result<SniEndpoint, PlatformError> {
    let chain = bundle.full_chain();
    match existing {
        Some(endpoint) => {
            log::info!("updating sni endpoint {}", display_name(endpoint));
            platform.update_sni_endpoint(&endpoint.id, &chain, &bundle.private_key_pem).await
        }
        None => {
            log::info!("creating sni endpoint");
            platform.create_sni_endpoint(&chain, &bundle.private_key_pem).await
        }
    }
}

fn display_name(endpoint: &SniEndpoint) -> &str {
    endpoint.name.as_deref().unwrap_or(&endpoint.id)
}
