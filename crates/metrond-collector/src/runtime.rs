//! Process-runtime collector: allocator counters plus the process's own
//! memory figures, and the `RandomValue` gauge.

use anyhow::Result;
use metrond_common::metric::Metric;
use rand::Rng;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::{alloc, Collector};

pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = %e, "cannot determine own pid, process gauges disabled");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        let stats = alloc::stats();
        let mut points = vec![
            Metric::gauge("Alloc", stats.allocated as f64),
            Metric::gauge("TotalAlloc", stats.total_allocated as f64),
            Metric::gauge("Mallocs", stats.mallocs as f64),
            Metric::gauge("Frees", stats.frees as f64),
            Metric::gauge("HeapAlloc", stats.allocated as f64),
            Metric::gauge(
                "HeapObjects",
                stats.mallocs.saturating_sub(stats.frees) as f64,
            ),
        ];

        if let Some(pid) = self.pid {
            self.system
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = self.system.process(pid) {
                points.push(Metric::gauge("HeapSys", process.memory() as f64));
                points.push(Metric::gauge("Sys", process.virtual_memory() as f64));
                points.push(Metric::gauge("Uptime", process.run_time() as f64));
            }
        }

        points.push(Metric::gauge("RandomValue", rand::thread_rng().gen::<f64>()));
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrond_common::metric::MetricType;

    #[test]
    fn emits_valid_gauges() {
        let mut collector = RuntimeCollector::new();
        let points = collector.collect().unwrap();
        assert!(!points.is_empty());
        for point in &points {
            assert_eq!(point.mtype, MetricType::Gauge);
            point.check(true).unwrap();
        }
        assert!(points.iter().any(|p| p.id == "Alloc"));
        assert!(points.iter().any(|p| p.id == "RandomValue"));
    }

    #[test]
    fn random_value_stays_in_unit_interval() {
        let mut collector = RuntimeCollector::new();
        let points = collector.collect().unwrap();
        let random = points.iter().find(|p| p.id == "RandomValue").unwrap();
        let v = random.value.unwrap();
        assert!((0.0..1.0).contains(&v));
    }
}
