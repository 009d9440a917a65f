//! A minimal producer: one counter, updated once a second.
//!
//! While this runs, the written file can be inspected with any MMV dump
//! tool, or simply watched growing its value with `xxd`.

use std::thread;
use std::time::Duration;

use mmv::{Client, Counter};

fn main() -> mmv::Result<()> {
    let client = Client::new("singleton_counter")?;

    let counter = Counter::with_description(
        0,
        "example.count",
        "Seconds since the example started",
        "",
    )?;
    client.register(&counter)?;

    client.start()?;
    println!("mapped at {}", client.location().display());

    for _ in 0..30 {
        thread::sleep(Duration::from_secs(1));
        counter.up();
    }

    client.stop()
}
