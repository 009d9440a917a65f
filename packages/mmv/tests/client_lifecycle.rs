//! Lifecycle behavior of a client-owned mapping: creation, replacement,
//! freeze, teardown and the generation publication protocol.

mod common;

use mmv::{Client, Counter, CountUnit, Error, FileFlags, MetricSemantics, MetricType};

use common::Dump;

#[test]
fn start_creates_the_file_and_stop_keeps_it() {
    let (_dir, client) = common::test_client("lifecycle");
    client
        .register_string(
            "test.1",
            2_i32,
            MetricSemantics::Counter,
            MetricType::I32,
            CountUnit::One,
        )
        .unwrap();

    client.start().unwrap();
    assert!(client.location().exists());

    client.stop().unwrap();
    assert!(
        client.location().exists(),
        "the file outlives the mapping unless erase-on-stop is set"
    );
}

#[test]
fn erase_on_stop_removes_the_file() {
    let (_dir, client) = common::test_client("erased");
    client.set_erase_file_on_stop(true);

    client.start().unwrap();
    assert!(client.location().exists());

    client.stop().unwrap();
    assert!(!client.location().exists());
}

#[test]
fn double_start_and_double_stop_fail() {
    let (_dir, client) = common::test_client("twice");

    client.start().unwrap();
    assert!(matches!(client.start(), Err(Error::AlreadyStarted)));

    client.stop().unwrap();
    assert!(matches!(client.stop(), Err(Error::NotStarted)));
}

#[test]
fn registration_is_frozen_while_mapped() {
    let (_dir, client) = common::test_client("frozen");
    client
        .register_string(
            "test.1",
            2_i32,
            MetricSemantics::Counter,
            MetricType::I32,
            CountUnit::One,
        )
        .unwrap();

    client.start().unwrap();

    let err = client
        .register_string(
            "test.2",
            2_i32,
            MetricSemantics::Counter,
            MetricType::I32,
            CountUnit::One,
        )
        .unwrap_err();
    assert!(matches!(err, Error::RegistryFrozen));

    client.stop().unwrap();

    // Registration works again after the mapping ends.
    client
        .register_string(
            "test.2",
            2_i32,
            MetricSemantics::Counter,
            MetricType::I32,
            CountUnit::One,
        )
        .unwrap();
}

#[test]
fn generation_pair_is_equal_after_start() {
    let (_dir, client) = common::test_client("generation");
    client.register(&Counter::new(0, "c.1").unwrap()).unwrap();

    client.start().unwrap();

    let dump = Dump::parse(&common::read_image(&client));
    assert_eq!(dump.header.g1, dump.header.g2);
    assert!(dump.header.g1 > 0, "the generation is a Unix timestamp");

    // The raw byte ranges are identical, not merely the decoded numbers.
    let image = common::read_image(&client);
    assert_eq!(image[8..16], image[16..24]);

    client.stop().unwrap();
}

#[test]
fn header_carries_flags_pid_and_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let client = Client::with_config(
        "header",
        FileFlags::PROCESS | FileFlags::SENTINEL,
        &common::test_config(&dir),
    )
    .unwrap();

    client.start().unwrap();

    let dump = Dump::parse(&common::read_image(&client));
    assert_eq!(dump.header.version, 1);
    assert_eq!(dump.header.flags, 0x2 | 0x4);
    assert_eq!(dump.header.pid, std::process::id() as i32);
    assert_eq!(dump.header.cluster as u32, client.cluster_id());
    assert!((dump.header.cluster as u32) < (1 << 12));

    client.stop().unwrap();
}

#[test]
fn restart_replaces_the_previous_file() {
    let (dir, client) = common::test_client("replaced");
    client.register(&Counter::new(0, "c.1").unwrap()).unwrap();

    client.start().unwrap();
    let first = Dump::parse(&common::read_image(&client));
    client.stop().unwrap();

    // A second client with the same name writes over the same path.
    let client2 = Client::with_config(
        "replaced",
        FileFlags::PROCESS,
        &common::test_config(&dir),
    )
    .unwrap();
    client2
        .register(&Counter::new(0, "c.other").unwrap())
        .unwrap();
    client2.start().unwrap();

    assert_eq!(client.location(), client2.location());

    let second = Dump::parse(&common::read_image(&client2));
    assert_eq!(second.header.g1, second.header.g2);
    assert!(second.metrics.values().any(|m| m.name == "c.other"));
    assert!(first.metrics.values().any(|m| m.name == "c.1"));

    client2.stop().unwrap();
}

#[test]
fn detached_metrics_keep_working_in_memory() {
    let (_dir, client) = common::test_client("detached");
    let counter = Counter::new(0, "c.1").unwrap();
    client.register(&counter).unwrap();

    client.start().unwrap();
    counter.up();
    client.stop().unwrap();

    // Updates after stop no longer touch the file but still track in memory.
    let image_after_stop = common::read_image(&client);
    counter.inc(10).unwrap();
    assert_eq!(counter.val(), 11);
    assert_eq!(common::read_image(&client), image_after_stop);
}

#[test]
fn empty_registry_maps_header_and_tocs_only() {
    let (_dir, client) = common::test_client("empty");

    assert_eq!(client.length(), 40 + 2 * 16);

    client.start().unwrap();

    let dump = Dump::parse(&common::read_image(&client));
    assert_eq!(dump.header.toc, 2);

    let metrics_toc = dump.toc(3).unwrap();
    assert_eq!(metrics_toc.count, 0);
    assert_eq!(metrics_toc.offset, 0);

    let values_toc = dump.toc(4).unwrap();
    assert_eq!(values_toc.count, 0);
    assert_eq!(values_toc.offset, 0);

    client.stop().unwrap();
}
