use super::material::{BatchSize, MachiningTime, MaterialPolicy, ProductFactory};
use super::Server;
use crate::core::errors::{SimError, SimResult};
use crate::core::event_scheduler::EventScheduler;
use crate::core::random::Distribution;
use serde::{Deserialize, Serialize};

/// Behavior switches of a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOptions {
    /// Accept material pushed in through `put`; pulling is unaffected
    pub allow_push: bool,
    /// Accept material while damaged or recovering
    pub allow_push_during_maintenance: bool,
    /// Start the next run as soon as material is complete
    pub auto_continue: bool,
    /// Schedule recovery as soon as a failure happens
    pub auto_recover: bool,
    /// Restart production once recovered
    pub auto_restart: bool,
    /// Resume the interrupted batch after recovery instead of scrapping it
    pub continue_product_after_failure: bool,
    /// Seed of the server's random stream; derived from the master seed when absent
    pub seed: Option<u64>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            allow_push: true,
            allow_push_during_maintenance: false,
            auto_continue: true,
            auto_recover: false,
            auto_restart: false,
            continue_product_after_failure: false,
            seed: None,
        }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allow_push(mut self, enabled: bool) -> Self {
        self.allow_push = enabled;
        self
    }

    pub fn with_push_during_maintenance(mut self, enabled: bool) -> Self {
        self.allow_push_during_maintenance = enabled;
        self
    }

    pub fn with_auto_continue(mut self, enabled: bool) -> Self {
        self.auto_continue = enabled;
        self
    }

    pub fn with_auto_recover(mut self, enabled: bool) -> Self {
        self.auto_recover = enabled;
        self
    }

    pub fn with_auto_restart(mut self, enabled: bool) -> Self {
        self.auto_restart = enabled;
        self
    }

    pub fn with_continue_after_failure(mut self, enabled: bool) -> Self {
        self.continue_product_after_failure = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Single construction path for a server
pub struct ServerBuilder<M, P, D> {
    pub(crate) name: String,
    pub(crate) options: ServerOptions,
    pub(crate) machining: Option<MachiningTime<M, D>>,
    pub(crate) time_to_failure: Option<Distribution>,
    pub(crate) time_to_recovery: Option<Distribution>,
    pub(crate) material: Box<dyn MaterialPolicy<M, D>>,
    pub(crate) factory: Option<Box<dyn ProductFactory<M, P, D>>>,
    pub(crate) data: D,
}

impl<M: 'static, P: 'static, D: 'static> ServerBuilder<M, P, D> {
    pub fn new(name: impl Into<String>, data: D) -> Self {
        Self {
            name: name.into(),
            options: ServerOptions::default(),
            machining: None,
            time_to_failure: None,
            time_to_recovery: None,
            material: Box::new(BatchSize(1)),
            factory: None,
            data,
        }
    }

    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn machining_time(mut self, distribution: Distribution) -> Self {
        self.machining = Some(MachiningTime::Distribution(distribution));
        self
    }

    pub fn machining_function<F>(mut self, f: F) -> Self
    where
        F: Fn(&[M], &D) -> f64 + 'static,
    {
        self.machining = Some(MachiningTime::function(f));
        self
    }

    pub fn time_to_failure(mut self, distribution: Distribution) -> Self {
        self.time_to_failure = Some(distribution);
        self
    }

    pub fn time_to_recovery(mut self, distribution: Distribution) -> Self {
        self.time_to_recovery = Some(distribution);
        self
    }

    pub fn material_policy(mut self, policy: impl MaterialPolicy<M, D> + 'static) -> Self {
        self.material = Box::new(policy);
        self
    }

    pub fn product_factory(mut self, factory: impl ProductFactory<M, P, D> + 'static) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        match &self.machining {
            None => {
                return Err(SimError::InvalidConfiguration(format!(
                    "server '{}' has no machining time",
                    self.name
                )))
            }
            Some(MachiningTime::Distribution(d)) => d.validate()?,
            Some(MachiningTime::Function(_)) => {}
        }
        if let Some(d) = &self.time_to_failure {
            d.validate()?;
        }
        if let Some(d) = &self.time_to_recovery {
            d.validate()?;
        }
        if self.factory.is_none() {
            return Err(SimError::InvalidConfiguration(format!(
                "server '{}' has no product factory",
                self.name
            )));
        }
        Ok(())
    }

    pub fn build(self, sched: &mut EventScheduler) -> SimResult<Server<M, P, D>> {
        self.validate()?;
        Server::from_builder(sched, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::server::material::CollectBatch;

    #[test]
    fn test_default_options() {
        let options = ServerOptions::default();
        assert!(options.allow_push);
        assert!(options.auto_continue);
        assert!(!options.auto_recover);
        assert!(!options.continue_product_after_failure);
    }

    #[test]
    fn test_missing_machining_time_rejected() {
        let builder: ServerBuilder<u8, Vec<u8>, ()> = ServerBuilder::new("lathe", ()).product_factory(CollectBatch);
        assert!(builder.validate().is_err());
    }

    #[test]
    fn test_missing_factory_rejected() {
        let builder: ServerBuilder<u8, Vec<u8>, ()> =
            ServerBuilder::new("lathe", ()).machining_time(Distribution::constant(1.0));
        assert!(builder.validate().is_err());
    }

    #[test]
    fn test_bad_failure_distribution_rejected() {
        let builder: ServerBuilder<u8, Vec<u8>, ()> = ServerBuilder::new("lathe", ())
            .machining_time(Distribution::constant(1.0))
            .time_to_failure(Distribution::exponential(-2.0))
            .product_factory(CollectBatch);
        assert!(builder.validate().is_err());
    }
}
