//! Segment file naming
//!
//! `_<segment>[_<suffix>].<ext>` for per-segment files and
//! `_<segment>_<gen>.<ext>` for generation files, with generations and
//! segment counters rendered in base 36.

/// Per-segment file name; an empty suffix is omitted
pub fn segment_file_name(segment: &str, suffix: &str, ext: &str) -> String {
    let mut name = String::with_capacity(segment.len() + suffix.len() + ext.len() + 2);
    name.push_str(segment);
    if !suffix.is_empty() {
        name.push('_');
        name.push_str(suffix);
    }
    if !ext.is_empty() {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// File name for generation `gen` of `base`; `None` for generation -1
pub fn file_name_from_generation(base: &str, ext: &str, gen: i64) -> Option<String> {
    match gen {
        -1 => None,
        0 => Some(segment_file_name(base, "", ext)),
        gen => {
            assert!(gen > 0, "invalid generation {}", gen);
            Some(segment_file_name(base, &to_base36(gen as u64), ext))
        }
    }
}

/// Segment name for the `counter`-th segment: `_0`, `_1`, ... `_a`, ...
pub fn segment_name(counter: u64) -> String {
    format!("_{}", to_base36(counter))
}

pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_file_name() {
        assert_eq!(segment_file_name("_1", "Lucene40_0", "pst"), "_1_Lucene40_0.pst");
        assert_eq!(segment_file_name("_1", "", "pst"), "_1.pst");
        assert_eq!(segment_file_name("_1", "", ""), "_1");
    }

    #[test]
    fn test_generation_names() {
        assert_eq!(file_name_from_generation("_1", "liv", -1), None);
        assert_eq!(file_name_from_generation("_1", "liv", 0).as_deref(), Some("_1.liv"));
        assert_eq!(file_name_from_generation("_1", "liv", 3).as_deref(), Some("_1_3.liv"));
        assert_eq!(file_name_from_generation("_1", "liv", 36).as_deref(), Some("_1_10.liv"));
    }

    #[test]
    fn test_segment_names() {
        assert_eq!(segment_name(0), "_0");
        assert_eq!(segment_name(10), "_a");
        assert_eq!(segment_name(37), "_11");
    }
}
