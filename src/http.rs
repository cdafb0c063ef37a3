//! HTTP access to the news portal.
//!
//! The scrapers talk to the network through the [`PageClient`] trait so the
//! listing and fetch logic can be exercised against canned responses. The
//! production implementation, [`HttpClient`], wraps a shared `reqwest::Client`
//! with a per-request timeout and browser-like headers.
//!
//! # Request headers
//!
//! Every request carries `Accept`, `Accept-Language` and `Referer` headers and
//! a `User-Agent` picked at random from [`USER_AGENTS`].

use rand::seq::IndexedRandom;
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::HttpError;

/// Browser user agents rotated across requests.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.51",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Minimal HTTP surface the scrapers need.
pub trait PageClient {
    /// GET `url` and return the body bytes. Non-2xx responses are errors.
    async fn get(&self, url: &str) -> Result<Vec<u8>, HttpError>;

    /// POST `form` as `application/x-www-form-urlencoded` and return the body text.
    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<String, HttpError>;
}

/// Settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Upper bound for a whole request, connect to last byte.
    pub timeout: Duration,
    /// Sent as the `Referer` header.
    pub referer: String,
}

/// `reqwest`-backed [`PageClient`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    /// Build a client with the portal's default headers and a request timeout.
    pub fn new(settings: &HttpSettings) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        match HeaderValue::from_str(&settings.referer) {
            Ok(referer) => {
                headers.insert(header::REFERER, referer);
            }
            Err(e) => warn!(referer = %settings.referer, error = %e, "Ignoring invalid referer"),
        }

        let inner = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { inner })
    }
}

/// Pick a user agent for the next request.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS.choose(&mut rand::rng()).copied().unwrap_or(USER_AGENTS[0])
}

fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        debug!(%url, status = status.as_u16(), "HTTP ok");
        Ok(response)
    } else {
        Err(HttpError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn transport(url: &str) -> impl FnOnce(reqwest::Error) -> HttpError + '_ {
    move |source| HttpError::Transport {
        url: url.to_string(),
        source,
    }
}

impl PageClient for HttpClient {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let response = self
            .inner
            .get(url)
            .header(header::USER_AGENT, random_user_agent())
            .send()
            .await
            .map_err(transport(url))?;
        let body = check_status(url, response)?
            .bytes()
            .await
            .map_err(transport(url))?;
        Ok(body.to_vec())
    }

    #[instrument(level = "debug", skip(self, form))]
    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<String, HttpError> {
        let response = self
            .inner
            .post(url)
            .header(header::USER_AGENT, random_user_agent())
            .form(form)
            .send()
            .await
            .map_err(transport(url))?;
        check_status(url, response)?
            .text()
            .await
            .map_err(transport(url))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`PageClient`] for scraper tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned responses and records every request it receives.
    #[derive(Default)]
    pub struct StubClient {
        pages: HashMap<String, Result<Vec<u8>, u16>>,
        listing: Vec<Result<String, u16>>,
        pub gets: Mutex<Vec<String>>,
        pub posts: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl StubClient {
        pub fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(body.as_bytes().to_vec()));
            self
        }

        pub fn with_status(mut self, url: &str, status: u16) -> Self {
            self.pages.insert(url.to_string(), Err(status));
            self
        }

        /// Listing responses served in order, one per POST. Past the end an
        /// empty page is returned.
        pub fn with_listing(mut self, pages: Vec<Result<String, u16>>) -> Self {
            self.listing = pages;
            self
        }

        pub fn get_count(&self, url: &str) -> usize {
            self.gets.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    impl PageClient for StubClient {
        async fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
            self.gets.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(HttpError::Status {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(HttpError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }

        async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<String, HttpError> {
            let index = {
                let mut posts = self.posts.lock().unwrap();
                posts.push(
                    form.iter()
                        .map(|(k, v)| (k.to_string(), v.clone()))
                        .collect(),
                );
                posts.len() - 1
            };
            match self.listing.get(index) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(HttpError::Status {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Ok("<html><body></body></html>".to_string()),
            }
        }
    }
}
