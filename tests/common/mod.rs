#![allow(dead_code)]

use flowsim::entities::server::{BatchSize, ProduceWith};
use flowsim::{
    Buffer, BufferConfig, Delay, Distribution, EventScheduler, ItemSink, ItemSource, Server, ServerOptions, SimResult,
    Sink,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sum of the part numbers in one batch
pub type Assembly = u64;

/// stock -> press -> conveyor -> dock
pub struct Line {
    pub stock: Buffer<u64>,
    pub press: Server<u64, Assembly>,
    pub conveyor: Delay<Assembly>,
    pub dock: Sink<Assembly>,
}

pub fn build_line(sched: &mut EventScheduler, batch: usize, options: ServerOptions) -> SimResult<Line> {
    let stock = Buffer::new(sched, "stock", BufferConfig::new(256))?;
    let press = Server::builder("press", ())
        .options(options)
        .machining_time(Distribution::uniform(1.0, 3.0))
        .time_to_failure(Distribution::exponential(20.0))
        .time_to_recovery(Distribution::exponential(2.0))
        .material_policy(BatchSize(batch))
        .product_factory(ProduceWith(|parts: Vec<u64>, _: &()| parts.iter().sum::<u64>()))
        .build(sched)?;
    let conveyor = Delay::new(sched, "conveyor", Distribution::constant(0.5))?;
    let dock = Sink::new("dock").retaining();

    press.pull_from(sched, &stock)?;
    press.send_to(&conveyor);
    dock.connect_to(&conveyor);
    Ok(Line {
        stock,
        press,
        conveyor,
        dock,
    })
}

/// Feed `parts` parts into the stock, one per time unit
pub fn feed(sched: &mut EventScheduler, stock: &Buffer<u64>, parts: u64) -> SimResult<()> {
    for part in 0..parts {
        let stock = stock.clone();
        sched.schedule(part as f64, move |s| {
            stock.put(s, part);
            Ok(())
        })?;
    }
    Ok(())
}
