use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

/// Point-in-time copy of every live series.
///
/// Keys are series identities (`measurement[,tags] field`). Histograms are
/// materialised as gauge entries suffixed `.P50` … `.P999`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, i64>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty()
    }

    /// Render in line protocol: `<series>=<value>\n` per entry, counters
    /// first, each group sorted by series.
    pub fn to_lines(&self) -> String {
        let mut out = String::with_capacity((self.counters.len() + self.gauges.len()) * 48);
        for (series, value) in &self.counters {
            let _ = writeln!(out, "{series}={value}");
        }
        for (series, value) in &self.gauges {
            let _ = writeln!(out, "{series}={value}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_renders_empty_string() {
        assert_eq!(Snapshot::default().to_lines(), "");
    }

    #[test]
    fn counters_then_gauges_sorted() {
        let mut snap = Snapshot::default();
        snap.gauges.insert("m,h=a size".into(), -3);
        snap.counters.insert("m,h=b total".into(), 2);
        snap.counters.insert("m,h=a total".into(), 1);

        assert_eq!(
            snap.to_lines(),
            "m,h=a total=1\nm,h=b total=2\nm,h=a size=-3\n"
        );
    }
}
