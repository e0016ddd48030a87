pub mod alloc;
pub mod host;
pub mod runtime;

use anyhow::Result;
use metrond_common::metric::Metric;

pub trait Collector: Send + Sync {
    fn name(&self) -> &str;
    fn collect(&mut self) -> Result<Vec<Metric>>;
}
