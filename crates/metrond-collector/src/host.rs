//! Host collector: virtual memory and per-CPU utilization.

use anyhow::Result;
use metrond_common::metric::Metric;
use sysinfo::System;

use crate::Collector;

pub struct HostCollector {
    system: System,
}

impl HostCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for HostCollector {
    fn name(&self) -> &str {
        "host"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system.refresh_memory();
        self.system.refresh_cpu_all();

        let mut points = vec![
            Metric::gauge("TotalMemory", self.system.total_memory() as f64),
            Metric::gauge("FreeMemory", self.system.free_memory() as f64),
        ];

        // one gauge per logical CPU, discovered at runtime
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            points.push(Metric::gauge(
                format!("CPUutilization{i}"),
                cpu.cpu_usage() as f64,
            ));
        }

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrond_common::metric::MetricType;

    #[test]
    fn emits_memory_and_per_cpu_gauges() {
        let mut collector = HostCollector::new();
        let points = collector.collect().unwrap();

        for point in &points {
            assert_eq!(point.mtype, MetricType::Gauge);
            point.check(true).unwrap();
        }
        assert!(points.iter().any(|p| p.id == "TotalMemory"));
        assert!(points.iter().any(|p| p.id == "FreeMemory"));

        let cpu_count = points
            .iter()
            .filter(|p| p.id.starts_with("CPUutilization"))
            .count();
        assert!(cpu_count >= 1);
    }
}
