//! Cursor paginator for JSON:API list endpoints
//!
//! Parses `page[size]`, `page[offset]`, `page[forcedNext]`, `include` and
//! `fields[<type>]` from a raw query string, hands the repository a
//! [`Cursor`] that over-fetches by one row, and turns the over-fetched result
//! into `self`/`next`/`previous` links. Never fails: malformed values fall
//! back to defaults and oversized ones are clamped.

use super::document::Links;
use std::collections::HashMap;
use url::form_urlencoded;

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const MAX_PAGE_SIZE: usize = 1000;
/// Keeps `offset + take` within an i64 so SKIP/LIMIT stay Bolt integers
pub const MAX_OFFSET: usize = i64::MAX as usize - MAX_PAGE_SIZE - 1;

/// Position handed to the query layer.
///
/// `take` is always the requested page size plus one; the extra row tells
/// [`JsonApiPaginator::generate_links`] whether a next page exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub offset: usize,
    pub take: usize,
    pub forced_next: Option<String>,
}

/// Pagination outcome for the current request, filled by `generate_links`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    pub size: usize,
    pub offset: usize,
    /// `page[offset]` of the next page; set only when a full page came back
    pub offset_next: Option<String>,
    /// `page[offset]` of the previous page; set only when `offset > 0`
    pub offset_previous: Option<usize>,
    pub forced_next: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JsonApiPaginator {
    size: usize,
    offset: usize,
    forced_next: Option<String>,
    include: Option<Vec<String>>,
    fields: HashMap<String, Vec<String>>,
    /// Decoded non-`page[...]` parameters, in request order
    params: Vec<(String, String)>,
    /// The same parameters as they appeared on the wire
    raw_params: Vec<String>,
    state: PaginationState,
}

impl Default for JsonApiPaginator {
    fn default() -> Self {
        Self::from_query(None)
    }
}

impl JsonApiPaginator {
    /// Build from the raw query string (without the leading `?`)
    pub fn from_query(raw: Option<&str>) -> Self {
        let mut paginator = Self {
            size: DEFAULT_PAGE_SIZE,
            offset: 0,
            forced_next: None,
            include: None,
            fields: HashMap::new(),
            params: Vec::new(),
            raw_params: Vec::new(),
            state: PaginationState::default(),
        };

        for segment in raw.unwrap_or_default().split('&') {
            if segment.is_empty() {
                continue;
            }
            let Some((key, value)) = form_urlencoded::parse(segment.as_bytes())
                .next()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
            else {
                continue;
            };

            match key.as_str() {
                "page[size]" => {
                    paginator.size = value
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .filter(|s| *s > 0)
                        .map(|s| s.min(MAX_PAGE_SIZE))
                        .unwrap_or(DEFAULT_PAGE_SIZE);
                }
                "page[offset]" => {
                    paginator.offset = value
                        .trim()
                        .parse::<usize>()
                        .map(|o| o.min(MAX_OFFSET))
                        .unwrap_or(0);
                }
                "page[forcedNext]" => {
                    paginator.forced_next = Some(value).filter(|v| !v.is_empty());
                }
                k if k.starts_with("page[") => {}
                _ => {
                    if key == "include" {
                        paginator.include = Some(split_list(&value));
                    } else if let Some(resource_type) = key
                        .strip_prefix("fields[")
                        .and_then(|rest| rest.strip_suffix(']'))
                    {
                        paginator
                            .fields
                            .insert(resource_type.to_string(), split_list(&value));
                    }
                    paginator.params.push((key, value));
                    paginator.raw_params.push(segment.to_string());
                }
            }
        }

        paginator.state = PaginationState {
            size: paginator.size,
            offset: paginator.offset,
            forced_next: paginator.forced_next.clone(),
            ..Default::default()
        };
        paginator
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Relationship names listed in `include`; `None` when the parameter
    /// is absent
    pub fn include(&self) -> Option<&[String]> {
        self.include.as_deref()
    }

    /// Sparse fieldset requested for a resource type
    pub fn fields_for(&self, resource_type: &str) -> Option<&[String]> {
        self.fields.get(resource_type).map(Vec::as_slice)
    }

    /// First value of a preserved (non-pagination) parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    pub fn generate_cursor(&self) -> Cursor {
        Cursor {
            offset: self.offset,
            take: self.size.saturating_add(1),
            forced_next: self.forced_next.clone(),
        }
    }

    /// Compute pagination links for `data`, trimming the over-fetched row.
    ///
    /// `data` is expected to hold at most `size + 1` rows; when it holds more
    /// than `size` it is truncated to `size` in place and a `next` link is
    /// produced.
    pub fn generate_links<T>(&mut self, data: &mut Vec<T>, url: &str) -> Links {
        if data.len() > self.size {
            self.state.offset_next = Some(
                self.forced_next
                    .clone()
                    .unwrap_or_else(|| self.offset.saturating_add(self.size).to_string()),
            );
            data.truncate(self.size);
        }
        if self.offset > 0 {
            self.state.offset_previous = Some(self.offset.saturating_sub(self.size));
        }

        let base = url.split('?').next().unwrap_or(url);
        Links {
            self_link: self.link(base, &self.offset.to_string()),
            next: self
                .state
                .offset_next
                .as_ref()
                .map(|offset| self.link(base, offset)),
            previous: self
                .state
                .offset_previous
                .map(|offset| self.link(base, &offset.to_string())),
        }
    }

    /// Link for an unpaginated (fetch-all) response
    pub fn self_link(&self, url: &str) -> Links {
        let base = url.split('?').next().unwrap_or(url);
        let mut link = base.to_string();
        if !self.raw_params.is_empty() {
            link.push('?');
            link.push_str(&self.raw_params.join("&"));
        }
        Links {
            self_link: literal_brackets(&link),
            next: None,
            previous: None,
        }
    }

    fn link(&self, base: &str, offset: &str) -> String {
        let mut link = format!(
            "{}?page[size]={}&page[offset]={}",
            base,
            self.size,
            urlencoding::encode(offset)
        );
        for raw in &self.raw_params {
            link.push('&');
            link.push_str(raw);
        }
        literal_brackets(&link)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// JSON:API clients expect `page[size]`, not `page%5Bsize%5D`
fn literal_brackets(link: &str) -> String {
    link.replace("%5B", "[")
        .replace("%5b", "[")
        .replace("%5D", "]")
        .replace("%5d", "]")
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://api.example.com/api/employees";

    fn query_of(link: &str) -> Option<&str> {
        link.split_once('?').map(|(_, q)| q)
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn test_defaults() {
        let p = JsonApiPaginator::from_query(None);
        assert_eq!(p.size(), DEFAULT_PAGE_SIZE);
        assert_eq!(p.offset(), 0);
        assert!(p.include().is_none());
        assert_eq!(
            p.generate_cursor(),
            Cursor {
                offset: 0,
                take: 26,
                forced_next: None
            }
        );
    }

    #[test]
    fn test_parses_jsonapi_parameters() {
        let p = JsonApiPaginator::from_query(Some(
            "page%5Bsize%5D=10&page[offset]=20&include=company,role&fields[employees]=name,%20email&search=foo",
        ));
        assert_eq!(p.size(), 10);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.include().unwrap(), ["company", "role"]);
        assert_eq!(
            p.fields_for("employees").unwrap(),
            ["name".to_string(), "email".to_string()]
        );
        assert_eq!(p.param("search"), Some("foo"));
        assert_eq!(p.generate_cursor().take, 11);
    }

    #[test]
    fn test_malformed_numbers_fall_back_to_defaults() {
        let p = JsonApiPaginator::from_query(Some("page[size]=abc&page[offset]=-4"));
        assert_eq!(p.size(), DEFAULT_PAGE_SIZE);
        assert_eq!(p.offset(), 0);

        let p = JsonApiPaginator::from_query(Some("page[size]=0"));
        assert_eq!(p.size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_oversized_numbers_are_clamped() {
        let mut p = JsonApiPaginator::from_query(Some(
            "page[size]=18446744073709551615&page[offset]=18446744073709551615",
        ));
        assert_eq!(p.size(), MAX_PAGE_SIZE);
        assert_eq!(p.offset(), MAX_OFFSET);

        let cursor = p.generate_cursor();
        assert_eq!(cursor.take, MAX_PAGE_SIZE + 1);
        assert!(i64::try_from(cursor.offset + cursor.take).is_ok());

        let mut data: Vec<u32> = (0..=MAX_PAGE_SIZE as u32).collect();
        let links = p.generate_links(&mut data, URL);
        assert_eq!(data.len(), MAX_PAGE_SIZE);
        let next_offset = (MAX_OFFSET + MAX_PAGE_SIZE).to_string();
        assert!(links.next.unwrap().ends_with(&format!("page[offset]={}", next_offset)));
    }

    #[test]
    fn test_offset_overflow_with_small_page_does_not_wrap() {
        let mut p = JsonApiPaginator::from_query(Some(
            "page[size]=1&page[offset]=18446744073709551615",
        ));
        let mut data = vec![1, 2];
        let links = p.generate_links(&mut data, URL);
        assert_eq!(data, vec![1]);
        assert_eq!(
            p.state().offset_next,
            Some((MAX_OFFSET + 1).to_string())
        );
        assert!(links.previous.is_some());
    }

    #[test]
    fn test_plus_decodes_to_space() {
        let p = JsonApiPaginator::from_query(Some("search=drill+press"));
        assert_eq!(p.param("search"), Some("drill press"));
    }

    // =========================================================================
    // N+1 trimming
    // =========================================================================

    #[test]
    fn test_full_page_is_trimmed_and_links_next() {
        let mut p = JsonApiPaginator::from_query(Some("page[size]=3"));
        let mut data = vec![1, 2, 3, 4];
        let links = p.generate_links(&mut data, URL);

        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(
            links.next.as_deref(),
            Some("https://api.example.com/api/employees?page[size]=3&page[offset]=3")
        );
        assert!(links.previous.is_none());
        assert_eq!(p.state().offset_next.as_deref(), Some("3"));
    }

    #[test]
    fn test_short_page_is_untouched_without_next() {
        let mut p = JsonApiPaginator::from_query(Some("page[size]=3"));
        let mut data = vec![1, 2, 3];
        let links = p.generate_links(&mut data, URL);
        assert_eq!(data, vec![1, 2, 3]);
        assert!(links.next.is_none());

        let mut data = vec![1];
        let links = p.generate_links(&mut data, URL);
        assert_eq!(data, vec![1]);
        assert!(links.next.is_none());
    }

    #[test]
    fn test_previous_only_when_offset_positive() {
        let mut p = JsonApiPaginator::from_query(Some("page[size]=10&page[offset]=4"));
        let mut data: Vec<u8> = Vec::new();
        let links = p.generate_links(&mut data, URL);
        assert_eq!(
            links.previous.as_deref(),
            Some("https://api.example.com/api/employees?page[size]=10&page[offset]=0")
        );
        assert_eq!(p.state().offset_previous, Some(0));
    }

    #[test]
    fn test_forced_next_is_used_verbatim() {
        let mut p = JsonApiPaginator::from_query(Some("page[size]=2&page[forcedNext]=77"));
        let mut data = vec!['a', 'b', 'c'];
        let links = p.generate_links(&mut data, URL);
        assert_eq!(data.len(), 2);
        assert!(links.next.unwrap().ends_with("page[offset]=77"));
    }

    // =========================================================================
    // Link fidelity
    // =========================================================================

    #[test]
    fn test_links_preserve_additional_params_with_literal_brackets() {
        let mut p = JsonApiPaginator::from_query(Some(
            "search=foo&page%5Bsize%5D=10&page[offset]=10&fields%5Bemployees%5D=name",
        ));
        let mut data: Vec<u32> = (0..11).collect();
        let links = p.generate_links(&mut data, &format!("{}?search=foo", URL));

        for link in [
            links.self_link.as_str(),
            links.next.as_deref().unwrap(),
            links.previous.as_deref().unwrap(),
        ] {
            assert!(link.contains("search=foo"), "{link}");
            assert!(link.contains("page[size]=10"), "{link}");
            assert!(link.contains("fields[employees]=name"), "{link}");
            assert!(!link.contains("%5B") && !link.contains("%5D"), "{link}");
        }
        assert!(links.self_link.contains("page[offset]=10"));
        assert!(links.next.unwrap().contains("page[offset]=20"));
        assert!(links.previous.unwrap().contains("page[offset]=0"));
    }

    #[test]
    fn test_fetch_all_self_link_keeps_params() {
        let p = JsonApiPaginator::from_query(Some("fetchAll=true&search=x"));
        let links = p.self_link(URL);
        assert_eq!(
            links.self_link,
            "https://api.example.com/api/employees?fetchAll=true&search=x"
        );
        assert!(links.next.is_none());
    }

    // =========================================================================
    // Round trip
    // =========================================================================

    fn fetch(rows: &[u32], cursor: &Cursor) -> Vec<u32> {
        rows.iter()
            .skip(cursor.offset)
            .take(cursor.take)
            .copied()
            .collect()
    }

    #[test]
    fn test_following_next_links_visits_every_row_once() {
        for m in [0usize, 1, 4, 5, 6, 17] {
            for n in [1usize, 2, 5, 25] {
                let rows: Vec<u32> = (0..m as u32).collect();
                let mut seen = Vec::new();
                let mut query = format!("page[size]={}&search=foo", n);
                let mut pages = 0;

                loop {
                    let mut p = JsonApiPaginator::from_query(Some(&query));
                    let mut data = fetch(&rows, &p.generate_cursor());
                    let links = p.generate_links(&mut data, URL);
                    assert!(data.len() <= n);
                    seen.extend(data);
                    pages += 1;
                    assert!(pages <= m + 1, "pagination did not terminate");

                    match links.next {
                        Some(next) => query = query_of(&next).unwrap().to_string(),
                        None => break,
                    }
                }

                assert_eq!(seen, rows, "m={m} n={n}");
            }
        }
    }
}
