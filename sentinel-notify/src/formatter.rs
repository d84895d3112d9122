//! Email subject and HTML body rendering for breach batches.

use std::fmt::Write;

use sentinel_monitor::Breach;

#[must_use]
pub fn subject(breaches: &[Breach]) -> String {
    format!(
        "[Threshold Breach Alert] {} breach(es) detected.",
        breaches.len()
    )
}

/// Renders the breach table. Rows are ordered by
/// `(timestamp, factory, zone, device, sensor)` so the same multiset of
/// breaches always renders identically.
#[must_use]
pub fn html_body(breaches: &[Breach]) -> String {
    let mut sorted: Vec<&Breach> = breaches.iter().collect();
    sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut rows = String::new();
    for breach in sorted {
        let _ = write!(
            rows,
            "<tr>\
             <td>{}</td>\
             <td>{}</td>\
             <td>{}</td>\
             <td>{}</td>\
             <td>{}</td>\
             <td>{}</td>\
             <td>{}</td>\
             <td>{}</td>\
             <td>{}</td>\
             </tr>",
            breach.factory_name,
            breach.zone_name,
            breach.machine_name,
            breach.device_id,
            breach.sensor_type,
            breach.sensor_value,
            breach.severity,
            breach.threshold_value,
            breach.timestamp,
        );
    }

    format!(
        r#"<html>
<head>
<style>
table {{ width: 100%; border-collapse: collapse; }}
th, td {{ border: 1px solid black; padding: 8px; text-align: left; }}
th {{ background-color: #f2f2f2; }}
tr:nth-child(even) {{ background-color: #f9f9f9; }}
</style>
</head>
<body>
<p><strong>Attention:</strong></p>
<p>The following devices have crossed their standard thresholds:</p>
<table>
<thead>
<tr>
<th>Factory Name</th>
<th>Zone Name</th>
<th>Machine Name</th>
<th>Device ID</th>
<th>Sensor Name</th>
<th>Sensor Value</th>
<th>Threshold Breached</th>
<th>Threshold Value</th>
<th>Timestamp</th>
</tr>
</thead>
<tbody>
{rows}
</tbody>
</table>
<br><br>
<p>Regards,<br><strong>Klvin Support Team</strong></p>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sentinel_common::Severity;

    use super::*;

    fn breach(timestamp: &str, factory: &str, device: &str, sensor: &str) -> Breach {
        Breach {
            device_id: device.to_string(),
            sensor_id: sensor.to_string(),
            factory_name: factory.to_string(),
            zone_name: "Z".to_string(),
            machine_name: "M".to_string(),
            sensor_type: "temperature".to_string(),
            sensor_value: 42.0,
            timestamp: timestamp.to_string(),
            severity: Severity::Red,
            threshold_value: 30.0,
        }
    }

    #[test]
    fn subject_counts_breaches() {
        let batch = vec![breach("t0", "F", "d1", "s1"), breach("t0", "F", "d2", "s1")];
        assert_eq!(
            subject(&batch),
            "[Threshold Breach Alert] 2 breach(es) detected."
        );
    }

    #[test]
    fn rows_are_sorted_by_the_rendering_key() {
        // Deliberately out of order on every component of the key.
        let batch = vec![
            breach("t2", "A", "d1", "s1"),
            breach("t1", "B", "d2", "s2"),
            breach("t1", "A", "d2", "s2"),
            breach("t1", "A", "d1", "s9"),
            breach("t1", "A", "d1", "s1"),
        ];

        let html = html_body(&batch);
        let order: Vec<usize> = [
            "<td>A</td><td>Z</td><td>M</td><td>d1</td><td>temperature</td><td>42</td><td>red</td><td>30</td><td>t1</td>",
            "<td>A</td><td>Z</td><td>M</td><td>d2</td>",
            "<td>B</td><td>Z</td><td>M</td><td>d2</td>",
            "<td>A</td><td>Z</td><td>M</td><td>d1</td><td>temperature</td><td>42</td><td>red</td><td>30</td><td>t2</td>",
        ]
        .iter()
        .map(|needle| html.find(needle).expect("row should be present"))
        .collect();

        // t1/A/d1 rows first, then t1/A/d2, t1/B/d2, and t2 last.
        assert!(order[0] < order[1]);
        assert!(order[1] < order[2]);
        assert!(order[2] < order[3]);
    }

    #[test]
    fn identical_input_renders_identically() {
        let batch = vec![
            breach("t1", "B", "d2", "s1"),
            breach("t1", "A", "d1", "s1"),
        ];
        let mut shuffled = batch.clone();
        shuffled.reverse();

        assert_eq!(html_body(&batch), html_body(&shuffled));
    }
}
