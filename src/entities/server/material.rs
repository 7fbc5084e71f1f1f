//! Strategies a server is configured with: which material it takes, when a
//! batch is complete, how long a run lasts and what a batch turns into.

use crate::core::random::Distribution;

/// Decides which material a server accepts and when a batch is complete
pub trait MaterialPolicy<M, D> {
    fn is_usable(&self, current: &[M], candidate: &M, data: &D) -> bool;

    fn is_complete(&self, current: &[M], data: &D) -> bool;
}

/// Any material, `n` pieces per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize(pub usize);

impl<M, D> MaterialPolicy<M, D> for BatchSize {
    fn is_usable(&self, current: &[M], _candidate: &M, _data: &D) -> bool {
        current.len() < self.0
    }

    fn is_complete(&self, current: &[M], _data: &D) -> bool {
        current.len() >= self.0
    }
}

/// `size` pieces per run, only material passing `accept`
pub struct FilteredBatch<F> {
    pub size: usize,
    pub accept: F,
}

impl<F> FilteredBatch<F> {
    pub fn new(size: usize, accept: F) -> Self {
        Self { size, accept }
    }
}

impl<M, D, F> MaterialPolicy<M, D> for FilteredBatch<F>
where
    F: Fn(&M) -> bool,
{
    fn is_usable(&self, current: &[M], candidate: &M, _data: &D) -> bool {
        current.len() < self.size && (self.accept)(candidate)
    }

    fn is_complete(&self, current: &[M], _data: &D) -> bool {
        current.len() >= self.size
    }
}

/// Turns a committed batch into one product
pub trait ProductFactory<M, P, D> {
    fn produce(&mut self, batch: Vec<M>, data: &D) -> P;
}

/// The product is the batch itself
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectBatch;

impl<M, D> ProductFactory<M, Vec<M>, D> for CollectBatch {
    fn produce(&mut self, batch: Vec<M>, _data: &D) -> Vec<M> {
        batch
    }
}

/// Product built by a function of the batch and the server data
pub struct ProduceWith<F>(pub F);

impl<M, P, D, F> ProductFactory<M, P, D> for ProduceWith<F>
where
    F: FnMut(Vec<M>, &D) -> P,
{
    fn produce(&mut self, batch: Vec<M>, data: &D) -> P {
        (self.0)(batch, data)
    }
}

/// Source of machining durations: sampled, or computed from the batch. Never both.
pub enum MachiningTime<M, D> {
    Distribution(Distribution),
    Function(Box<dyn Fn(&[M], &D) -> f64>),
}

impl<M, D> MachiningTime<M, D> {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[M], &D) -> f64 + 'static,
    {
        MachiningTime::Function(Box::new(f))
    }
}

impl<M, D> std::fmt::Debug for MachiningTime<M, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachiningTime::Distribution(d) => write!(f, "Distribution({:?})", d),
            MachiningTime::Function(_) => write!(f, "Function(..)"),
        }
    }
}
