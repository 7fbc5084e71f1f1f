//! Production line: raw parts arrive at random, a press assembles them in
//! pairs and occasionally breaks down, finished assemblies leave on a
//! conveyor. Prints a summary per replication.
use flowsim::entities::server::{BatchSize, ProduceWith};
use flowsim::{
    run_replications, Buffer, BufferConfig, ConcurrencyMode, Delay, Distribution, EventScheduler, ItemSink,
    ItemSource, Server, ServerOptions, SimResult, SimulationConfig, Sink,
};
use log::error;

#[derive(Debug)]
struct Summary {
    assemblies: u64,
    failures: u64,
    scrapped: u64,
    parts_left: usize,
    end_time: f64,
}

fn production_line(config: SimulationConfig) -> SimResult<Summary> {
    let mut sched = EventScheduler::new(config)?;

    let stock: Buffer<u32> = Buffer::new(&mut sched, "stock", BufferConfig::new(20))?;
    let press: Server<u32, (u32, u32)> = Server::builder("press", ())
        .options(ServerOptions::new().with_auto_recover(true).with_auto_restart(true))
        .machining_time(Distribution::Triangular {
            min: 1.0,
            mode: 1.5,
            max: 3.0,
        })
        .time_to_failure(Distribution::exponential(60.0))
        .time_to_recovery(Distribution::uniform(2.0, 6.0))
        .material_policy(BatchSize(2))
        .product_factory(ProduceWith(|parts: Vec<u32>, _: &()| {
            (parts.first().copied().unwrap_or_default(), parts.last().copied().unwrap_or_default())
        }))
        .build(&mut sched)?;
    let conveyor = Delay::new(&mut sched, "conveyor", Distribution::constant(4.0))?;
    let dock = Sink::new("dock");

    press.pull_from(&mut sched, &stock)?;
    press.send_to(&conveyor);
    dock.connect_to(&conveyor);

    // arrivals
    let mut arrivals = sched.random_stream(None);
    let interarrival = Distribution::exponential(0.8);
    let mut at = 0.0;
    for part in 0..400u32 {
        at += arrivals.sample(&interarrival)?;
        let stock = stock.clone();
        sched.schedule(at, move |s| {
            stock.put(s, part);
            Ok(())
        })?;
    }

    let end = sched.run()?;
    let stats = press.stats();
    Ok(Summary {
        assemblies: dock.received(),
        failures: stats.failures,
        scrapped: stats.scrapped_batches,
        parts_left: stock.len(),
        end_time: end.as_f64(),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = SimulationConfig::new()
        .with_seed(2024)
        .with_max_time(1000.0)
        .with_trace(false)
        .with_concurrency(ConcurrencyMode::Rayon);

    for replication in run_replications(&config, 8, production_line)? {
        match replication.result {
            Ok(summary) => println!(
                "replication {} (seed {}): {} assemblies, {} failures, {} batches scrapped, {} parts left, ended at {:.1}",
                replication.index,
                replication.seed,
                summary.assemblies,
                summary.failures,
                summary.scrapped,
                summary.parts_left,
                summary.end_time
            ),
            Err(e) => error!("replication {} failed: {}", replication.index, e),
        }
    }
    Ok(())
}
