//! Per-instance values: one gauge per cache tier.

use mmv::{Client, GaugeVector};

fn main() -> mmv::Result<()> {
    let client = Client::new("instance_gauge")?;

    let hit_rates = GaugeVector::with_description(
        &[("l1", 0.0), ("l2", 0.0), ("disk", 0.0)],
        "cache.hit_rate",
        "Cache hit rate per tier",
        "",
    )?;
    client.register(&hit_rates)?;

    client.start()?;
    println!("mapped at {}", client.location().display());

    hit_rates.set(0.98, "l1")?;
    hit_rates.set(0.71, "l2")?;
    hit_rates.set(0.12, "disk")?;

    std::thread::sleep(std::time::Duration::from_secs(30));

    client.stop()
}
