//! URL utilities for consistent URL handling
//!
//! Request URLs for the remote catalog carry the client identifier as a query
//! parameter, so anything that ends up in logs or status events passes through
//! [`UrlUtils::obfuscate_credentials`] first.

use url::Url;

/// Base for human-facing photo and profile pages
const UNSPLASH_WEB_BASE: &str = "https://unsplash.com";

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// Build the batch request URL for the random photo endpoint
    ///
    /// Collections are comma-joined into a single `collections` parameter and
    /// omitted entirely when `None`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use unsplash_cache::utils::url::UrlUtils;
    ///
    /// let url = UrlUtils::build_batch_url("https://api.unsplash.com/photos/random", "abc", 3, None).unwrap();
    /// assert_eq!(url.as_str(), "https://api.unsplash.com/photos/random?client_id=abc&count=3");
    /// ```
    pub fn build_batch_url(
        endpoint: &str,
        client_id: &str,
        count: usize,
        collections: Option<&[String]>,
    ) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", client_id);
            query.append_pair("count", &count.to_string());
            if let Some(collections) = collections {
                query.append_pair("collections", &collections.join(","));
            }
        }
        Ok(url)
    }

    /// Public page for a photo id
    pub fn photo_page_url(id: &str) -> Option<Url> {
        if id.is_empty() {
            return None;
        }
        let mut url = Url::parse(UNSPLASH_WEB_BASE).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push("photos")
            .push(id);
        Some(url)
    }

    /// Public profile page for a username
    pub fn profile_url(username: &str) -> Option<Url> {
        if username.is_empty() {
            return None;
        }
        let mut url = Url::parse(UNSPLASH_WEB_BASE).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push(&format!("@{username}"));
        Some(url)
    }

    /// Obfuscate sensitive information in URLs for safe logging
    ///
    /// Masks `client_id`, `access_token` and URL userinfo.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use unsplash_cache::utils::url::UrlUtils;
    ///
    /// let url = "https://api.unsplash.com/photos/random?client_id=secret&count=3";
    /// assert_eq!(
    ///     UrlUtils::obfuscate_credentials(url),
    ///     "https://api.unsplash.com/photos/random?client_id=****&count=3"
    /// );
    /// ```
    pub fn obfuscate_credentials(url: &str) -> String {
        use regex::Regex;

        let mut obfuscated = url.to_string();

        if let Ok(parsed) = Url::parse(url)
            && (!parsed.username().is_empty() || parsed.password().is_some())
        {
            let mut new_url = parsed.clone();
            let _ = new_url.set_username("****");
            let _ = new_url.set_password(Some("****"));
            obfuscated = new_url.to_string();
        }

        let sensitive_params = ["client_id", "access_token", "password"];

        for param in &sensitive_params {
            let pattern = format!(r"(?i)([?&]{}=)[^&]*", regex::escape(param));
            if let Ok(re) = Regex::new(&pattern) {
                obfuscated = re.replace_all(&obfuscated, "${1}****").to_string();
            }
        }

        obfuscated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_batch_url_with_collections() {
        let collections = vec!["317099".to_string(), "3330448".to_string()];
        let url = UrlUtils::build_batch_url(
            "https://api.unsplash.com/photos/random",
            "abc",
            5,
            Some(&collections),
        )
        .unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "abc".to_string()),
                ("count".to_string(), "5".to_string()),
                ("collections".to_string(), "317099,3330448".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_batch_url_rejects_garbage() {
        assert!(UrlUtils::build_batch_url("not a url", "abc", 1, None).is_err());
    }

    #[test]
    fn test_human_urls() {
        assert_eq!(
            UrlUtils::photo_page_url("Dwu85P9SOIk").unwrap().as_str(),
            "https://unsplash.com/photos/Dwu85P9SOIk"
        );
        assert_eq!(
            UrlUtils::profile_url("jane").unwrap().as_str(),
            "https://unsplash.com/@jane"
        );
        assert!(UrlUtils::photo_page_url("").is_none());
        assert!(UrlUtils::profile_url("").is_none());
    }

    #[test]
    fn test_obfuscate_credentials() {
        assert_eq!(
            UrlUtils::obfuscate_credentials(
                "https://api.unsplash.com/photos/random?client_id=secret&count=3&collections=1,2"
            ),
            "https://api.unsplash.com/photos/random?client_id=****&count=3&collections=1,2"
        );
        assert_eq!(
            UrlUtils::obfuscate_credentials("https://example.com/?CLIENT_ID=abc"),
            "https://example.com/?CLIENT_ID=****"
        );
        assert_eq!(
            UrlUtils::obfuscate_credentials("https://images.unsplash.com/photo-1?ixid=abc"),
            "https://images.unsplash.com/photo-1?ixid=abc"
        );
    }
}
