mod common;

use common::{build_line, feed, init_logging};
use flowsim::entities::server::{CollectBatch, FilteredBatch};
use flowsim::{Distribution, EventScheduler, PriorityCategory, Server, ServerOptions, ServerPhase};
use std::cell::RefCell;
use std::rc::Rc;

fn resilient() -> ServerOptions {
    ServerOptions::new()
        .with_continue_after_failure(true)
        .with_auto_recover(true)
        .with_auto_restart(true)
}

#[test]
fn test_every_part_ends_up_in_exactly_one_product() {
    init_logging();
    let mut sched = EventScheduler::with_seed(2024);
    let line = build_line(&mut sched, 3, resilient()).unwrap();
    feed(&mut sched, &line.stock, 31).unwrap();
    sched.run().unwrap();

    let stats = line.press.stats();
    assert_eq!(stats.products_made, 10);
    assert_eq!(stats.scrapped_batches, 0);
    assert_eq!(stats.failures, stats.recoveries);
    assert_eq!(line.dock.received(), 10);
    assert_eq!(line.conveyor.stats().dropped, 0);

    // the 31st part waits for two more
    assert!(line.stock.is_empty());
    assert_eq!(line.press.current_material_len(), 1);
    assert_eq!(line.press.phase(), ServerPhase::Idle);
    let delivered: u64 = line.dock.take_items().iter().sum();
    assert_eq!(delivered, (0..30).sum::<u64>());
}

#[test]
fn test_phase_transitions_are_legal() {
    init_logging();
    let mut sched = EventScheduler::with_seed(77);
    let line = build_line(&mut sched, 2, resilient()).unwrap();

    let phases = Rc::new(RefCell::new(vec![ServerPhase::Idle]));
    let log = phases.clone();
    let priority = sched.next_priority(PriorityCategory::Default);
    line.press.on_state_changed().subscribe(priority, move |_, notice| {
        log.borrow_mut().push(notice.phase);
        Ok(())
    });

    feed(&mut sched, &line.stock, 120).unwrap();
    sched.run().unwrap();

    use ServerPhase::*;
    for pair in phases.borrow().windows(2) {
        let legal = matches!(
            (pair[0], pair[1]),
            (Idle, Idle) | (Idle, Working) | (Working, Idle) | (Working, Damaged) | (Damaged, Recovering) | (Recovering, Idle)
        );
        assert!(legal, "illegal transition {} -> {}", pair[0], pair[1]);
    }
    assert!(line.press.stats().failures > 0);
}

#[test]
fn test_scrapping_loses_whole_batches() {
    init_logging();
    let mut sched = EventScheduler::with_seed(5);
    let line = build_line(
        &mut sched,
        2,
        ServerOptions::new().with_auto_recover(true).with_auto_restart(true),
    )
    .unwrap();
    feed(&mut sched, &line.stock, 60).unwrap();
    sched.run().unwrap();

    let stats = line.press.stats();
    assert_eq!(2 * (stats.products_made + stats.scrapped_batches), 60);
    assert_eq!(stats.scrapped_batches, stats.failures);
}

#[test]
fn test_filtered_material_stays_in_buffer() {
    init_logging();
    let mut sched = EventScheduler::with_seed(1);
    let stock = flowsim::Buffer::new(&mut sched, "mixed", flowsim::BufferConfig::default()).unwrap();
    let press: Server<i32, Vec<i32>> = Server::builder("evens", ())
        .machining_time(Distribution::constant(1.0))
        .material_policy(FilteredBatch::new(1, |m: &i32| m % 2 == 0))
        .product_factory(CollectBatch)
        .build(&mut sched)
        .unwrap();

    stock.put(&mut sched, 2);
    stock.put(&mut sched, 3);
    stock.put(&mut sched, 4);
    press.pull_from(&mut sched, &stock).unwrap();
    sched.run().unwrap();

    // FIFO head 3 blocks the 4 behind it
    assert_eq!(press.stats().products_made, 1);
    assert_eq!(stock.len(), 2);
    assert_eq!(stock.preview(), Some(3));
}

#[test]
fn test_server_feeds_server() {
    init_logging();
    let mut sched = EventScheduler::with_seed(1);
    let cut: Server<u8, Vec<u8>> = Server::builder("cut", ())
        .machining_time(Distribution::constant(1.0))
        .product_factory(CollectBatch)
        .build(&mut sched)
        .unwrap();
    let polish: Server<Vec<u8>, Vec<Vec<u8>>> = Server::builder("polish", ())
        .machining_time(Distribution::constant(2.0))
        .product_factory(CollectBatch)
        .build(&mut sched)
        .unwrap();
    let dock = flowsim::Sink::new("dock");
    flowsim::ItemSource::send_to(&cut, &polish);
    flowsim::ItemSink::connect_to(&dock, &polish);

    assert!(cut.put(&mut sched, 1).unwrap());
    sched.run().unwrap();

    assert_eq!(sched.now().as_f64(), 3.0);
    assert_eq!(dock.received(), 1);
    assert_eq!(cut.stats().discarded_products, 0);
}
