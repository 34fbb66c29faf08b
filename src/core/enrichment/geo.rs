//! Geo enrichment precedence for the request normalizer:
//! client-supplied GPS wins when present; otherwise an
//! IP-to-geo lookup; absent both, the request carries no geo.
//!
//! IP-to-geo resolution is modeled as an external collaborator behind
//! a trait so an operator can wire in whatever lookup service they
//! run, rather than bundling a geo-IP database into this crate.

use crate::rtb::bid_request::Geo;
use async_trait::async_trait;

#[async_trait]
pub trait GeoIpLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Option<Geo>;
}

/// Degrades to no geo; used when no lookup service is configured.
pub struct NoopGeoIpLookup;

#[async_trait]
impl GeoIpLookup for NoopGeoIpLookup {
    async fn lookup(&self, _ip: &str) -> Option<Geo> {
        None
    }
}

/// Resolves geo with GPS-first, IP-based-lookup-second precedence.
pub async fn resolve_geo(
    client_lat: Option<f64>,
    client_lon: Option<f64>,
    accuracy: Option<u32>,
    ip: &str,
    lookup: &dyn GeoIpLookup,
) -> Option<Geo> {
    if let (Some(lat), Some(lon)) = (client_lat, client_lon) {
        return Some(Geo {
            lat: Some(lat),
            lon: Some(lon),
            r#type: Some(1),
            accuracy,
            ..Default::default()
        });
    }

    let mut geo = lookup.lookup(ip).await?;
    geo.r#type = Some(2);
    Some(geo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gps_takes_precedence_over_ip_lookup() {
        struct AlwaysLookup;
        #[async_trait]
        impl GeoIpLookup for AlwaysLookup {
            async fn lookup(&self, _ip: &str) -> Option<Geo> {
                Some(Geo {
                    country: "XX".into(),
                    ..Default::default()
                })
            }
        }

        let geo = resolve_geo(Some(1.0), Some(2.0), Some(10), "1.2.3.4", &AlwaysLookup)
            .await
            .unwrap();
        assert_eq!(geo.r#type, Some(1));
        assert_eq!(geo.lat, Some(1.0));
    }

    #[tokio::test]
    async fn falls_back_to_ip_lookup_without_gps() {
        let geo = resolve_geo(None, None, None, "1.2.3.4", &NoopGeoIpLookup).await;
        assert!(geo.is_none());
    }
}
