use super::Tags;

/// Builds the series identity for a measurement, tag set and field:
///
///   `<measurement>[,<tag>=<value>]* <field>`
///
/// Tags are sorted by key, so any insertion order yields the same identity.
/// Nothing is escaped: tag keys, values and the field must not contain
/// `,`, `=`, space or newline.
pub fn encode(measurement: &str, tags: &Tags, field: &str) -> String {
    let mut keys: Vec<&String> = tags.keys().collect();
    keys.sort_unstable();

    let tag_len: usize = tags.iter().map(|(k, v)| k.len() + v.len() + 2).sum();
    let mut series = String::with_capacity(measurement.len() + tag_len + field.len() + 1);

    series.push_str(measurement);
    for key in keys {
        series.push(',');
        series.push_str(key);
        series.push('=');
        series.push_str(&tags[key]);
    }
    series.push(' ');
    series.push_str(field);
    series
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn sorts_tags_by_key() {
        let t = tags(&[("uri", "/app"), ("host", "web-1"), ("dc", "eu")]);
        assert_eq!(
            encode("http_response", &t, "total"),
            "http_response,dc=eu,host=web-1,uri=/app total"
        );
    }

    #[test]
    fn permuted_tags_give_same_identity() {
        let mut a = Tags::new();
        a.insert("b".into(), "2".into());
        a.insert("a".into(), "1".into());
        a.insert("c".into(), "3".into());

        let mut b = Tags::new();
        b.insert("c".into(), "3".into());
        b.insert("a".into(), "1".into());
        b.insert("b".into(), "2".into());

        assert_eq!(encode("m", &a, "f"), encode("m", &b, "f"));
        assert_eq!(encode("m", &a, "f"), "m,a=1,b=2,c=3 f");
    }

    #[test]
    fn empty_tags_omit_segment() {
        assert_eq!(encode("foo", &Tags::new(), "value"), "foo value");
    }
}
