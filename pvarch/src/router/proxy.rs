use std::collections::BTreeMap;
use std::time::Duration;

use futures::StreamExt;
use pvarch_core::{ArchiverError, ProxySink};
use reqwest::{Client, StatusCode};
use url::Url;

use super::request::RetrievalRequest;

/// Response headers copied from an upstream `getData` answer.
pub const PROXIED_HEADERS: [&str; 3] = [
    "Content-Type",
    "Content-Disposition",
    "Access-Control-Allow-Origin",
];

fn join(base: &str, path: &str) -> Result<Url, ArchiverError> {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| ArchiverError::invalid_arg(format!("bad url {joined}: {e}")))
}

fn http_err(target: &str, e: &reqwest::Error) -> ArchiverError {
    ArchiverError::Http(format!("{target}: {e}"))
}

/// Forward the PVs in `pvs` to `<base>/data/getData.<ext>` and relay the
/// body byte-for-byte.
///
/// The forwarded query carries the `pv` values as the caller wrote them,
/// inline processor syntax included, followed by every other
/// parameter of the original request. Only [`PROXIED_HEADERS`] are copied.
///
/// # Errors
/// - `Proxy` when the upstream answers with a non-200 status.
/// - `SourceTimeout` when no response head arrives within `timeout`.
/// - `Http` for transport failures.
/// - Sink errors (`ClientGone`) from `write_chunk`.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        name = "pvarch::proxy::forward",
        skip(http, req, sink),
        fields(target = %base, pvs = pvs.len()),
    )
)]
pub async fn forward(
    http: &Client,
    base: &str,
    req: &RetrievalRequest,
    pvs: &[String],
    timeout: Duration,
    sink: &mut dyn ProxySink,
) -> Result<(), ArchiverError> {
    let mut url = join(base, &format!("data/getData.{}", req.extension))?;
    {
        let mut query = url.query_pairs_mut();
        for pv in pvs {
            query.append_pair("pv", pv);
        }
        for (k, v) in &req.params {
            query.append_pair(k, v);
        }
    }
    let target = url.to_string();

    let resp = tokio::time::timeout(timeout, http.get(url).send())
        .await
        .map_err(|_| ArchiverError::source_timeout(target.clone()))?
        .map_err(|e| http_err(&target, &e))?;

    let status = resp.status();
    if status != StatusCode::OK {
        let body = resp.text().await.unwrap_or_default();
        return Err(ArchiverError::Proxy {
            target,
            status: status.as_u16(),
            body,
        });
    }

    for name in PROXIED_HEADERS {
        if let Some(value) = resp.headers().get(name)
            && let Ok(value) = value.to_str()
        {
            sink.set_header(name, value);
        }
    }

    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| http_err(&target, &e))?;
        sink.write_chunk(&chunk).await?;
    }
    Ok(())
}

/// Ask an external appliance whether it archives `pv`.
///
/// Both `{"status": "true"}` and `{"status": true}` count as yes.
///
/// # Errors
/// Returns `Http` or `SourceTimeout` when the appliance cannot be asked.
pub async fn are_we_archiving(
    http: &Client,
    base: &str,
    pv: &str,
    timeout: Duration,
) -> Result<bool, ArchiverError> {
    let mut url = join(base, "bpl/areWeArchivingPV")?;
    url.query_pairs_mut().append_pair("pv", pv);
    let body = get_json(http, url, timeout).await?;
    Ok(match body.get("status") {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// Latest metadata the engine holds for `pv`, as a string map.
///
/// Non-string JSON values are rendered with their JSON text.
///
/// # Errors
/// Returns `Http` or `SourceTimeout` when the engine cannot be asked.
pub async fn engine_metadata(
    http: &Client,
    engine_url: &str,
    pv: &str,
    timeout: Duration,
) -> Result<BTreeMap<String, String>, ArchiverError> {
    let mut url = join(engine_url, "getMetadata")?;
    url.query_pairs_mut().append_pair("pv", pv);
    let body = get_json(http, url, timeout).await?;
    let serde_json::Value::Object(map) = body else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}

async fn get_json(
    http: &Client,
    url: Url,
    timeout: Duration,
) -> Result<serde_json::Value, ArchiverError> {
    let target = url.to_string();
    let call = async {
        let resp = http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| http_err(&target, &e))?;
        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| http_err(&target, &e))
    };
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| Err(ArchiverError::source_timeout(target.clone())))
}
