use crate::*;

use latmesh_services::{split_regions, DnsTxtResolver, RegionResolver};

fn resolver(server: SocketAddr) -> DnsTxtResolver {
    DnsTxtResolver::new(server, Duration::from_secs(2))
}

/// The regions record resolves over UDP and feeds the registry.
#[tokio::test]
async fn test_regions_record_populates_registry() {
    let dns = spawn_dns_server(DnsAnswer::Txt(vec!["ams,sin".into()]))
        .await
        .unwrap();
    let config = test_config();
    let registry = RegionRegistry::new(&config);

    let records = resolver(dns)
        .lookup_txt(&config.regions_record())
        .await
        .unwrap();
    for region in split_regions(&records[0]) {
        registry.lookup_or_create(&region).unwrap();
    }

    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.get("ams").unwrap().address(),
        "ams.probe.internal:10000"
    );
    assert_eq!(
        registry.get("sin").unwrap().address(),
        "sin.probe.internal:10000"
    );
}

/// A missing record is an empty answer, not an error.
#[tokio::test]
async fn test_nxdomain_yields_no_records() {
    let dns = spawn_dns_server(DnsAnswer::NxDomain).await.unwrap();
    let records = resolver(dns)
        .lookup_txt(&test_config().regions_record())
        .await
        .unwrap();
    assert!(records.is_empty());
}

/// Several TXT records come back in answer order.
#[tokio::test]
async fn test_multiple_records_are_returned_in_order() {
    let dns = spawn_dns_server(DnsAnswer::Txt(vec!["ams".into(), "sin,syd".into()]))
        .await
        .unwrap();
    let records = resolver(dns)
        .lookup_txt(&test_config().regions_record())
        .await
        .unwrap();
    assert_eq!(records, vec!["ams".to_string(), "sin,syd".to_string()]);
}
