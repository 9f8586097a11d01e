use chrono::{DateTime, Duration, Utc};
use pvarch_core::{ArchiverError, TimeSpan};

/// One requested PV after syntax normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvSelector {
    /// PV name with `.VAL` and any function-call wrapper removed.
    pub name: String,
    /// Processor named inline as `fn(pv)` or `fn(pv,arg)`, rendered as `fn_arg`.
    pub processor: Option<String>,
    /// The `pv` parameter as the caller wrote it; forwarded as-is when proxying.
    pub raw: String,
}

impl PvSelector {
    /// Parse `pv`, `pv.VAL`, `fn(pv)` or `fn(pv,arg,...)`.
    ///
    /// # Errors
    /// Returns `InvalidArg` for empty names and unbalanced parentheses.
    pub fn parse(raw: &str) -> Result<Self, ArchiverError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ArchiverError::invalid_arg("empty pv name in request"));
        }

        let (name, processor) = if raw.contains('(') {
            if !raw.contains(')') {
                return Err(ArchiverError::invalid_arg(format!(
                    "unbalanced parenthesis in {raw}"
                )));
            }
            let mut parts = raw
                .split(['(', ',', ')'])
                .map(str::trim)
                .filter(|s| !s.is_empty());
            let func = parts.next().unwrap_or_default();
            let pv = parts.next().ok_or_else(|| {
                ArchiverError::invalid_arg(format!("missing pv name in {raw}"))
            })?;
            let mut processor = func.to_string();
            for arg in parts {
                processor.push('_');
                processor.push_str(arg);
            }
            (pv, Some(processor))
        } else {
            (raw, None)
        };

        let name = name.strip_suffix(".VAL").unwrap_or(name);
        Ok(Self {
            name: name.to_string(),
            processor,
            raw: raw.to_string(),
        })
    }
}

/// A parsed `getData` request.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// Output format extension from the request path.
    pub extension: String,
    /// Requested PVs, in request order.
    pub pvs: Vec<PvSelector>,
    /// Requested time ranges, ordered and non-overlapping.
    pub spans: Vec<TimeSpan>,
    /// Processor from the `pp` parameter.
    pub processor: Option<String>,
    /// Fall back to the configured reducing processor when none is named.
    pub use_reduced: bool,
    /// Whether the response may use chunked transfer encoding.
    pub chunked: bool,
    /// Ask the engine for the latest metadata and add it to each PV header.
    pub fetch_latest_metadata: bool,
    /// PV whose descriptor is cloned for PVs without one.
    pub retired_template: Option<String>,
    /// Legacy server sample limit; `None` is unlimited.
    pub legacy_count: Option<u32>,
    /// Legacy server retrieval method.
    pub legacy_how: i32,
    /// Every non-`pv` query parameter, forwarded verbatim when proxying.
    pub params: Vec<(String, String)>,
}

impl RetrievalRequest {
    /// Parse the path extension and query pairs of a `getData.<ext>` request.
    ///
    /// `now` anchors the default window: `to` defaults to one hour from now and
    /// `from` to one day before `to`.
    ///
    /// # Errors
    /// Returns `InvalidArg` for missing PVs, unparseable times, inverted spans
    /// and malformed `timeranges`.
    pub fn from_query<K, V>(
        extension: &str,
        query: &[(K, V)],
        now: DateTime<Utc>,
    ) -> Result<Self, ArchiverError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let get = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k.as_ref() == name)
                .map(|(_, v)| v.as_ref())
        };

        let pvs = query
            .iter()
            .filter(|(k, _)| k.as_ref() == "pv")
            .map(|(_, v)| PvSelector::parse(v.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if pvs.is_empty() {
            return Err(ArchiverError::invalid_arg("no pv specified in request"));
        }

        let end = get("to").map_or(Ok(now + Duration::hours(1)), parse_time)?;
        let start = get("from").map_or(Ok(end - Duration::days(1)), parse_time)?;

        let spans = match get("timeranges") {
            Some(ranges) => parse_time_ranges(ranges)?,
            None => vec![TimeSpan::new(start, end)?],
        };

        let legacy_count = get("ca_count").and_then(|v| match v.trim().parse::<u32>() {
            Ok(n) => Some(n),
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(ca_count = v, "ignoring non-integer ca_count");
                None
            }
        });
        let legacy_how = get("ca_how").map_or(0, |v| {
            v.trim().parse::<i32>().unwrap_or_else(|_| {
                #[cfg(feature = "tracing")]
                tracing::warn!(ca_how = v, "ignoring non-integer ca_how; using raw");
                0
            })
        });

        Ok(Self {
            extension: extension.to_string(),
            pvs,
            spans,
            processor: get("pp").filter(|s| !s.is_empty()).map(str::to_string),
            use_reduced: get("usereduced").is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            chunked: get("donotchunk").is_none_or(|v| v == "false"),
            fetch_latest_metadata: get("fetchLatestMetadata") == Some("true"),
            retired_template: get("retiredPVTemplate")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            legacy_count,
            legacy_how,
            params: query
                .iter()
                .filter(|(k, _)| k.as_ref() != "pv")
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
                .collect(),
        })
    }

    /// Convex hull of the requested ranges.
    #[must_use]
    pub fn overall_span(&self) -> Option<TimeSpan> {
        let first = self.spans.first()?;
        let last = self.spans.last()?;
        TimeSpan::new(first.start(), last.end()).ok()
    }
}

/// Parse an ISO-8601 timestamp (`2011-02-02T08:00:00.000Z`) or one carrying a
/// numeric offset (`2011-02-02T08:00:00.000-08:00`, `...-0800`).
///
/// # Errors
/// Returns `InvalidArg` when neither form matches.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, ArchiverError> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ArchiverError::invalid_arg(format!("cannot parse time {raw}")))
}

/// Parse `start,end,start,end,...` into ordered, non-overlapping spans.
///
/// # Errors
/// Returns `InvalidArg` for an odd count, unparseable times, an empty or
/// inverted pair, or a pair starting before the previous pair ended.
pub fn parse_time_ranges(raw: &str) -> Result<Vec<TimeSpan>, ArchiverError> {
    let times = raw
        .split(',')
        .map(parse_time)
        .collect::<Result<Vec<_>, _>>()?;
    if times.len() % 2 != 0 {
        return Err(ArchiverError::invalid_arg(format!(
            "need an even number of times in timeranges; got {}",
            times.len()
        )));
    }

    let mut spans: Vec<TimeSpan> = Vec::with_capacity(times.len() / 2);
    for pair in times.chunks_exact(2) {
        let span = TimeSpan::new(pair[0], pair[1])?;
        if let Some(prev) = spans.last()
            && span.start() < prev.end()
        {
            return Err(ArchiverError::invalid_arg(format!(
                "time range starting {} begins before previous end {}",
                span.start().to_rfc3339(),
                prev.end().to_rfc3339()
            )));
        }
        spans.push(span);
    }
    Ok(spans)
}
