use actix_web::HttpRequest;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ApiError;

/// `?page=N&limit=M` as sent by the client, before resolution.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageQuery {
    /// A page size that is missing, unparsable or not positive falls back
    /// to `default_size`. A page number that is not a positive integer, or
    /// one whose row range does not fit in an `i64`, is an error.
    pub fn resolve(&self, default_size: i64) -> Result<PageRequest, ApiError> {
        let per_page = self
            .limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(default_size);
        let page = match self.page.as_deref() {
            None => 1,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ApiError::InvalidPage),
            },
        };
        // the end of the page must be addressable as a row offset
        if page.checked_mul(per_page).is_none() {
            return Err(ApiError::InvalidPage);
        }
        Ok(PageRequest { page, per_page })
    }
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// Checks the page against the total; page 1 is always valid.
    pub fn check(&self, count: i64) -> Result<(), ApiError> {
        if self.page == 1 || self.offset() < count {
            Ok(())
        } else {
            Err(ApiError::InvalidPage)
        }
    }

    pub fn has_next(&self, count: i64) -> bool {
        self.page.saturating_mul(self.per_page) < count
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(req: &HttpRequest, page: PageRequest, count: i64, results: Vec<T>) -> Self {
        let current = request_url(req);
        Self::with_url(current.as_ref(), page, count, results)
    }

    fn with_url(current: Option<&Url>, page: PageRequest, count: i64, results: Vec<T>) -> Self {
        let next = if page.has_next(count) {
            current.map(|url| page_link(url, Some(page.page + 1)))
        } else {
            None
        };
        let previous = match page.page {
            1 => None,
            2 => current.map(|url| page_link(url, None)),
            n => current.map(|url| page_link(url, Some(n - 1))),
        };
        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

/// Absolute URL of the request as the client addressed it.
pub(crate) fn request_url(req: &HttpRequest) -> Option<Url> {
    let info = req.connection_info();
    Url::parse(&format!("{}://{}{}", info.scheme(), info.host(), req.uri())).ok()
}

/// `url` with the `page` parameter replaced, or dropped for `None`.
fn page_link(url: &Url, page: Option<i64>) -> String {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let mut link = url.clone();
    link.set_query(None);
    if !kept.is_empty() || page.is_some() {
        let mut pairs = link.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        if let Some(page) = page {
            pairs.append_pair("page", &page.to_string());
        }
    }
    link.into()
}
