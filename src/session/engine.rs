//! The request engine: one logical request through header derivation,
//! cookies, protocol selection, redirects, and retry.

use bytes::Bytes;
use http::Method;
use url::Url;

use crate::error::{Error, Result};
use crate::headers::{fetch_site, OrderedHeaders};
use crate::pool::{alt_svc, Connection, Origin, ReleaseOutcome};
use crate::profile::http2::PseudoHeaderOrder;
use crate::request::Request;
use crate::response::Response;

use super::Session;

/// Execute one request with the session deadline applied.
pub(super) async fn execute(session: &Session, request: Request) -> Result<Response> {
    let deadline = request.timeout.unwrap_or(session.options.timeout);
    tokio::time::timeout(deadline, follow_redirects(session, request))
        .await
        .map_err(|_| Error::timeout("request deadline"))?
}

/// Drive the request, following redirects up to the configured cap.
async fn follow_redirects(session: &Session, mut request: Request) -> Result<Response> {
    let mut url = Url::parse(&request.url)?;
    let mut redirects = 0u32;

    loop {
        let response = perform(session, &request, &url).await?;

        ingest_alt_svc(session, &url, &response);

        if !(response.is_redirect() && request.follow_redirects) {
            return Ok(response);
        }
        let Some(location) = response.location() else {
            return Ok(response);
        };

        redirects += 1;
        if redirects > session.options.redirect_cap {
            return Err(Error::RedirectLimit { count: redirects });
        }

        let next = url
            .join(location)
            .map_err(|_| Error::InvalidRedirectUrl(location.to_string()))?;
        tracing::debug!(status = response.status, from = %url, to = %next, "following redirect");

        // 301/302/303 rewrite to GET and drop the body unless the request
        // was already GET/HEAD; 307/308 preserve method and body.
        if matches!(response.status, 301 | 302 | 303)
            && request.method != Method::GET
            && request.method != Method::HEAD
        {
            request.method = Method::GET;
            request.body = None;
            request.headers.remove("content-type");
            request.headers.remove("content-length");
        }

        // Origin-sensitive headers do not cross origins; cookies are
        // re-derived from the jar for every hop anyway.
        let next_origin = Origin::from_url(&next)?;
        if Origin::from_url(&url)? != next_origin {
            request.headers.remove("authorization");
            request.headers.remove("cookie");
            request.headers.remove("origin");
        }

        url = next;
        request.url = url.to_string();
    }
}

/// One request/response exchange, with a bounded retry on connections the
/// peer abandoned before processing the stream.
async fn perform(session: &Session, request: &Request, url: &Url) -> Result<Response> {
    let origin = Origin::from_url(url)?;
    let (headers, pseudo_order) = build_headers(session, request, url)?;
    let pairs = headers.into_pairs();

    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let mut conn = session.pool.acquire(&origin, request.force_protocol).await?;
        let protocol = conn.protocol();

        match exchange(&mut conn, request, url, &pairs, pseudo_order).await {
            Ok((status, resp_headers, body)) => {
                session.pool.release(&origin, conn, ReleaseOutcome::Clean);
                if protocol == crate::response::Protocol::H1 {
                    session.pool.spawn_prewarm(&origin);
                }
                let response =
                    Response::new(status, resp_headers, body, url.to_string(), protocol);
                store_cookies(session, url, &response);
                return Ok(response);
            }
            Err(e) => {
                session.pool.release(&origin, conn, ReleaseOutcome::Errored);
                let may_retry = e.is_retryable_on_new_connection()
                    && (request.is_idempotent() || request.retryable)
                    && attempts <= session.options.retry_cap;
                if may_retry {
                    tracing::debug!(origin = %origin, error = %e, "retrying on a fresh connection");
                    continue;
                }
                return Err(e);
            }
        }
    }
}

async fn exchange(
    conn: &mut Connection,
    request: &Request,
    url: &Url,
    headers: &[(String, String)],
    pseudo_order: Option<PseudoHeaderOrder>,
) -> Result<(u16, Vec<(String, String)>, Bytes)> {
    let host = url.host_str().ok_or_else(|| Error::missing("host"))?;
    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let path = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    match conn {
        Connection::H1(h1) => {
            h1.send_request(
                &request.method,
                &authority,
                &path,
                headers,
                request.body.as_ref(),
            )
            .await
        }
        Connection::H2(h2) => {
            let resp = h2
                .send_request(
                    &request.method,
                    url.scheme(),
                    &authority,
                    &path,
                    headers,
                    request.body.clone(),
                    pseudo_order,
                    None,
                )
                .await?;
            Ok((resp.status, resp.headers, resp.body))
        }
        Connection::H3(h3) => {
            let resp = h3
                .send_request(
                    &request.method,
                    &authority,
                    &path,
                    headers,
                    request.body.clone(),
                    pseudo_order,
                )
                .await?;
            Ok((resp.status, resp.headers, resp.body))
        }
    }
}

/// Merge the profile template with the caller's headers (caller wins),
/// attach cookies and Referer, guarantee Host, and resolve order
/// overrides.
fn build_headers(
    session: &Session,
    request: &Request,
    url: &Url,
) -> Result<(OrderedHeaders, Option<PseudoHeaderOrder>)> {
    let mut caller = request.headers.clone();
    let (header_order, pseudo_names) = caller.take_order_overrides();
    let pseudo_order = match pseudo_names {
        Some(names) => Some(
            PseudoHeaderOrder::from_names(&names)
                .ok_or_else(|| Error::InvalidOverride(format!("PHeader-Order: {:?}", names)))?,
        ),
        None => None,
    };

    let page = match &request.page_url {
        Some(page) => Some(Url::parse(page)?),
        None => None,
    };
    let mode = request.effective_fetch_mode();
    let site = fetch_site(page.as_ref(), url);

    let mut headers = OrderedHeaders::new();
    for (name, value) in session.profile.default_headers(mode, site) {
        headers.append(name, value);
    }

    // Caller headers win on conflict but keep the template's position;
    // repeated caller names append as additional values.
    let mut seen: Vec<String> = Vec::new();
    for (name, value) in caller.into_pairs() {
        let lower = name.to_ascii_lowercase();
        if seen.contains(&lower) {
            headers.append(name, value);
        } else {
            headers.set(name, value);
            seen.push(lower);
        }
    }

    if let Some(page) = &page {
        if !headers.contains("referer") {
            headers.append("referer", page.as_str());
        }
    }

    // Cookies come from the jar unless the caller pinned a Cookie header.
    if !headers.contains("cookie") {
        let host = url.host_str().ok_or_else(|| Error::missing("host"))?;
        let secure = url.scheme() == "https";
        if let Some(cookie_header) =
            session.jar(|jar| jar.header_for(host, url.path(), secure))
        {
            headers.append("cookie", cookie_header);
        }
    }

    // The Host header is always part of the outgoing set; H2/H3 transport
    // it as :authority instead of a regular field.
    if !headers.contains("host") {
        let host = url.host_str().ok_or_else(|| Error::missing("host"))?;
        let value = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        headers.prepend("Host", value);
    }

    if let Some(order) = header_order {
        headers.reorder(&order);
    }

    Ok((headers, pseudo_order))
}

/// Set-Cookie processing completes before the response is returned.
fn store_cookies(session: &Session, url: &Url, response: &Response) {
    let set_cookies = response.set_cookie_headers();
    if set_cookies.is_empty() {
        return;
    }
    let Some(host) = url.host_str() else { return };
    let secure = url.scheme() == "https";
    session.jar_mut(|jar| {
        jar.set_from_headers(host, secure, &set_cookies);
    });
}

/// Alt-Svc advertisements feed the capability cache.
fn ingest_alt_svc(session: &Session, url: &Url, response: &Response) {
    let Some(header) = response.header("alt-svc") else {
        return;
    };
    let Ok(origin) = Origin::from_url(url) else {
        return;
    };
    match alt_svc::parse(header) {
        alt_svc::AltSvc::Clear => session.pool.capabilities().clear_origin(&origin),
        alt_svc::AltSvc::Entries(entries) => {
            // Only same-host alternatives feed the origin's record.
            if let Some(entry) = entries
                .iter()
                .find(|e| e.is_h3() && e.host.is_none() && e.port == origin.port)
            {
                session.pool.capabilities().note_alt_svc_h3(
                    &origin,
                    std::time::Duration::from_secs(entry.max_age),
                );
            }
        }
    }
}
