use dnsbalancer::balancer::{Balancer, DnsBalancer, DnsBalancerConfig};
use dnsbalancer::dns::GaiResolver;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(
        &std::env::args()
            .nth(1)
            .unwrap_or_else(|| "https://example.com".to_string()),
    )?;

    let config = DnsBalancerConfig::from_url(&url)?.interval(Duration::from_secs(5));
    let balancer = DnsBalancer::new(config, Arc::new(GaiResolver::new())).await?;
    println!("initial hosts: {:?}", balancer.hosts());

    for _ in 0..4 {
        println!("next: {}", balancer.next()?);
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    balancer.stop().await;
    println!("stopped, still serving {} hosts", balancer.hosts().len());
    Ok(())
}
