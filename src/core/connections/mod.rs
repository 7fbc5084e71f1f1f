pub mod ports;

pub use ports::{Inlet, ItemSink, ItemSource, Offer, Outlet};
