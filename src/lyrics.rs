// Timed lyric parsing and lookup
//
// Accepts LRC-style text where each line carries zero or more `[MM:SS.ff]`
// or `[MM:SS.fff]` tags followed by the line's text. A line with several
// tags repeats at each tagged moment.

use std::sync::OnceLock;

use log::warn;
use regex::Regex;
use serde::Serialize;

fn timestamp_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\[(\d{2}):(\d{2})\.(\d{2,3})\]").unwrap())
}

/// One timed line. `time` is seconds from track start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LyricLine {
    pub time: f64,
    pub text: String,
}

/// Time-ordered lyric table for a single track. Rebuilt wholesale each time
/// a new lyric source is parsed; never mutated incrementally.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LyricTrack {
    lines: Vec<LyricLine>,
}

impl LyricTrack {
    /// Parse raw lyric text. Lines without a valid tag, and tags whose
    /// remaining text is empty after stripping, contribute nothing. Parsing
    /// never fails: malformed input degrades to an empty track.
    pub fn parse(text: &str) -> Self {
        let regex = timestamp_regex();
        let mut lines = Vec::new();

        for raw in text.lines() {
            let stripped = regex.replace_all(raw, "");
            let content = stripped.trim();
            if content.is_empty() {
                continue;
            }

            for caps in regex.captures_iter(raw) {
                let minutes: f64 = match caps[1].parse() {
                    Ok(v) => v,
                    Err(_) => {
                        warn!("skipping lyric tag with bad minutes: {raw}");
                        continue;
                    }
                };
                let seconds: f64 = match caps[2].parse() {
                    Ok(v) => v,
                    Err(_) => {
                        warn!("skipping lyric tag with bad seconds: {raw}");
                        continue;
                    }
                };
                // Two fractional digits are centiseconds; pad to millis.
                let mut frac = caps[3].to_string();
                while frac.len() < 3 {
                    frac.push('0');
                }
                let millis: f64 = match frac.parse() {
                    Ok(v) => v,
                    Err(_) => {
                        warn!("skipping lyric tag with bad fraction: {raw}");
                        continue;
                    }
                };

                lines.push(LyricLine {
                    time: minutes * 60.0 + seconds + millis / 1000.0,
                    text: content.to_string(),
                });
            }
        }

        // Stable sort keeps input order among equal timestamps.
        lines.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(std::cmp::Ordering::Equal));
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    /// Index of the line active at `elapsed` seconds: the last entry whose
    /// timestamp is at or before `elapsed`. `None` before the first entry.
    pub fn lookup(&self, elapsed: f64) -> Option<usize> {
        let after = self.lines.partition_point(|line| line.time <= elapsed);
        after.checked_sub(1)
    }

    /// Text of the active line at `elapsed`, if any.
    pub fn current_line(&self, elapsed: f64) -> Option<&str> {
        self.lookup(elapsed).map(|i| self.lines[i].text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts_by_timestamp() {
        let track = LyricTrack::parse("[01:02.50]Hello\n[00:10.000]World");
        let lines = track.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], LyricLine { time: 10.0, text: "World".into() });
        assert_eq!(lines[1], LyricLine { time: 62.5, text: "Hello".into() });
    }

    #[test]
    fn multiple_tags_share_the_line_text() {
        let track = LyricTrack::parse("[00:05.00][01:05.00][02:05.00]Chorus");
        assert_eq!(track.len(), 3);
        assert!(track.lines().iter().all(|l| l.text == "Chorus"));
        assert_eq!(track.lines()[2].time, 125.0);
    }

    #[test]
    fn two_digit_fractions_are_centiseconds() {
        let track = LyricTrack::parse("[00:01.05]a\n[00:01.005]b");
        // .05 pads to 50ms, .005 stays 5ms, so "b" sorts first.
        assert_eq!(track.lines()[0].text, "b");
        assert!((track.lines()[0].time - 1.005).abs() < 1e-9);
        assert!((track.lines()[1].time - 1.05).abs() < 1e-9);
    }

    #[test]
    fn untagged_and_empty_lines_are_dropped() {
        let text = "just a header\n[00:01.00]\n[00:02.00]   \n[00:03.00]kept";
        let track = LyricTrack::parse(text);
        assert_eq!(track.len(), 1);
        assert_eq!(track.lines()[0].text, "kept");
    }

    #[test]
    fn malformed_input_degrades_to_empty() {
        assert!(LyricTrack::parse("").is_empty());
        assert!(LyricTrack::parse("[xx:yy.zz]nope\n[1:2.3]also no").is_empty());
    }

    #[test]
    fn duplicate_timestamps_keep_input_order() {
        let track = LyricTrack::parse("[00:10.00]first\n[00:10.00]second");
        assert_eq!(track.lines()[0].text, "first");
        assert_eq!(track.lines()[1].text, "second");
    }

    #[test]
    fn lookup_is_boundary_exact() {
        let track = LyricTrack::parse("[00:10.00]a\n[00:20.00]b");
        assert_eq!(track.lookup(9.999), None);
        assert_eq!(track.lookup(10.0), Some(0));
        assert_eq!(track.lookup(19.999), Some(0));
        assert_eq!(track.lookup(20.0), Some(1));
        assert_eq!(track.lookup(1000.0), Some(1));
        assert_eq!(track.current_line(10.0), Some("a"));
    }

    #[test]
    fn lookup_on_empty_track_is_none() {
        assert_eq!(LyricTrack::parse("").lookup(5.0), None);
    }

    #[test]
    fn lookup_is_monotonic_in_elapsed() {
        let track = LyricTrack::parse("[00:01.00]a\n[00:02.00]b\n[00:02.00]c\n[00:09.50]d");
        let mut last = None;
        for tick in 0..200 {
            let idx = track.lookup(tick as f64 * 0.05);
            assert!(idx >= last);
            last = idx;
        }
    }
}
