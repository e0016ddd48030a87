//! The HTML metric list.

use std::fmt::Write;

use metrond_common::metric::Metric;

/// Renders all metrics as a plain HTML table, sorted by id. Ids are
/// restricted to ASCII alphanumerics by validation, so no escaping is
/// needed.
pub fn metrics_list_page(metrics: &[Metric]) -> String {
    let mut sorted: Vec<&Metric> = metrics.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut rows = String::new();
    for metric in sorted {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            metric.id,
            metric.mtype,
            metric.value_str()
        );
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>metrond</title></head>\n\
         <body>\n<h1>Metrics</h1>\n\
         <table>\n<tr><th>id</th><th>type</th><th>value</th></tr>{rows}</table>\n\
         </body>\n</html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_lists_metrics_sorted_by_id() {
        let page = metrics_list_page(&[
            Metric::counter("PollCount", 7),
            Metric::gauge("Alloc", 1.5),
        ]);
        assert!(page.contains("<td>Alloc</td><td>gauge</td><td>1.5</td>"));
        assert!(page.contains("<td>PollCount</td><td>counter</td><td>7</td>"));
        assert!(page.find("Alloc").unwrap() < page.find("PollCount").unwrap());
    }
}
