//! A small parser for LRC lyrics and the line selector built on top of it.


use std::time::Duration;

/// Width of a `[mm:ss.cc]` prefix, which is stripped from every synced line.
pub const TIMESTAMP_PREFIX_WIDTH: usize = 10;

/// A time offset from the start of the song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TimeTag(pub Duration);
impl From<Duration> for TimeTag {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}
impl From<TimeTag> for Duration {
    fn from(t: TimeTag) -> Self {
        t.0
    }
}
impl TimeTag {
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parse the leading `[mm:ss.cc]` tag of a line into milliseconds.
///
/// The centisecond part is optional and only its first two digits count.
#[must_use]
pub fn try_parse_line_timestamp(line: &str) -> Option<u64> {
    let open = line.find('[')?;
    let close = line.find(']')?;
    let inner = line.get(open + 1..close)?;
    let (minutes, rest) = inner.split_once(':')?;
    let (seconds, centis) = match rest.split_once('.') {
        Some((s, c)) => (s, Some(c)),
        None => (rest, None),
    };
    let minutes = parse_digits(minutes)?;
    let seconds = parse_digits(seconds)?;
    let centis = match centis {
        None | Some("") => 0,
        Some(c) => {
            parse_digits(c)?;
            let mut digits: String = c.chars().take(2).collect();
            while digits.len() < 2 {
                digits.push('0');
            }
            digits.parse::<u64>().ok()?
        }
    };
    minutes
        .checked_mul(60_000)?
        .checked_add(seconds.checked_mul(1000)?)?
        .checked_add(centis * 10)
}

/// Whether `line` opens with a well-formed `[mm:ss.cc]` tag.
#[must_use]
pub fn starts_with_timestamp(line: &str) -> bool {
    line.trim_start().starts_with('[') && try_parse_line_timestamp(line).is_some()
}

/// Like [`try_parse_line_timestamp`], but malformed lines map to `0`.
#[must_use]
pub fn parse_line_timestamp(line: &str) -> u64 {
    try_parse_line_timestamp(line).unwrap_or(0)
}

/// Drop the fixed-width timestamp prefix of a synced line.
#[must_use]
pub fn strip_timestamp_prefix(line: &str) -> String {
    line.chars()
        .skip(TIMESTAMP_PREFIX_WIDTH)
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedLine {
    pub time: TimeTag,
    pub text: String,
}

/// Lyrics of one track, either timed or plain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsDocument {
    Synced(Vec<SyncedLine>),
    Plain(Vec<String>),
}

impl LyricsDocument {
    /// Build a synced document. Empty lines are skipped, order is kept as written.
    #[must_use]
    pub fn synced(raw: &str) -> Option<Self> {
        let lines: Vec<_> = raw
            .split('\n')
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(|l| SyncedLine {
                time: TimeTag::from_millis(parse_line_timestamp(l)),
                text: strip_timestamp_prefix(l),
            })
            .collect();
        (!lines.is_empty()).then_some(Self::Synced(lines))
    }

    #[must_use]
    pub fn plain(raw: &str) -> Option<Self> {
        let lines: Vec<_> = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect();
        (!lines.is_empty()).then_some(Self::Plain(lines))
    }

    /// Guess the format of `raw`: synced when some line opens with a well-formed timestamp.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if !raw.lines().any(starts_with_timestamp) {
            return Self::plain(raw);
        }
        if raw.lines().count() == 1 && raw.contains(" [") {
            // Lines are concatenated by some players - split them on best-effort basis
            tracing::warn!("Lyric lines are concatenated - parsing them might be inaccurate");
            let split = raw.split(" [").collect::<Vec<_>>().join("\n[");
            return Self::synced(&split);
        }
        Self::synced(raw)
    }

    /// The line that should be visible at `position` of a track lasting `duration`.
    #[must_use]
    pub fn select_line(&self, position: Duration, duration: Duration) -> &str {
        match self {
            Self::Synced(lines) => {
                let mut selected = "";
                for line in lines {
                    if line.time.0 > position {
                        break;
                    }
                    selected = &line.text;
                }
                selected
            }
            Self::Plain(lines) => {
                if lines.is_empty() {
                    return "";
                }
                let duration_ms = duration.as_millis();
                let index = if duration_ms == 0 {
                    0
                } else {
                    let index = position.as_millis() * lines.len() as u128 / duration_ms;
                    usize::try_from(index).unwrap_or(usize::MAX)
                };
                &lines[index.min(lines.len() - 1)]
            }
        }
    }
}
