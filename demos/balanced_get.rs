use dnsbalancer::config::ResolverConfig;
use dnsbalancer::dns::{AddressFamily, HickoryResolver};
use dnsbalancer::transport::{wrap, HyperTransport, Transport};
use http_body_util::{BodyExt, Empty};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://example.com/".to_string());

    // Cache for 1s (250ms for failures), coalesce concurrent misses,
    // bound each lookup to 2s.
    let resolver = ResolverConfig::new(AddressFamily::Ip4).build(Arc::new(HickoryResolver::new()));
    let client = wrap(HyperTransport::new(), Arc::new(resolver), AddressFamily::Ip4);

    for i in 0..3 {
        let req = http::Request::get(url.as_str()).body(Empty::<bytes::Bytes>::new())?;
        let response = client.send(req).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        println!("#{i}: {status} ({} bytes)", body.len());
    }

    Ok(())
}
