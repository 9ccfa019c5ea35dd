//! Parse response header lines delivered by curl's header callback.

/// Parsed `Content-Range: bytes <start>-<end>/<total>` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    pub start: u64,
    pub end: u64,
    /// `None` when the origin sent `*`.
    pub total: Option<u64>,
}

/// Status and sizing headers of the final response. Headers of redirects and
/// interim responses are discarded when the next status line arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
}

impl ResponseHead {
    /// Feed one raw header line (status line, `Name: value`, or the blank terminator).
    pub fn feed_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line.starts_with("HTTP/") {
            *self = Self {
                status: line.split_whitespace().nth(1).and_then(|c| c.parse().ok()),
                ..Self::default()
            };
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                self.content_length = value.parse().ok();
            } else if name.eq_ignore_ascii_case("content-range") {
                self.content_range = parse_content_range(value);
            }
        }
    }

    /// Full size of the resource: the Content-Range total for 206, or
    /// `offset + Content-Length` otherwise (offset is 0 for a 200).
    pub fn total_size(&self, offset: u64) -> Option<u64> {
        match self.status {
            Some(206) => self
                .content_range
                .and_then(|r| r.total)
                .or_else(|| self.content_length.map(|len| offset + len)),
            Some(200) => self.content_length,
            _ => None,
        }
    }
}

/// Parse a `Content-Range` value. Unsatisfied ranges (`bytes */1000`) yield `None`.
pub(crate) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (start, end) = span.trim().split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
        total,
    })
}
