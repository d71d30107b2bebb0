//! API endpoint URL builders
//!
//! Every endpoint authenticates with the `api_key` query parameter.

use crate::classify::EntityKind;

fn base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// Build upload URL
pub fn upload_url(base_url: &str, kind: EntityKind, api_key: &str, use_async: bool) -> String {
    let mut url = format!(
        "{}/v1/{}?api_key={}",
        base(base_url),
        kind,
        urlencoding::encode(api_key)
    );

    if use_async {
        url.push_str("&async=1");
    }

    url
}

/// Build id listing URL
pub fn ids_url(base_url: &str, kind: EntityKind, api_key: &str) -> String {
    format!(
        "{}/v1/{}/_ids?api_key={}",
        base(base_url),
        kind,
        urlencoding::encode(api_key)
    )
}

/// Build delete URL
pub fn delete_url(base_url: &str, kind: EntityKind, api_key: &str) -> String {
    format!(
        "{}/v1/{}/_delete?api_key={}",
        base(base_url),
        kind,
        urlencoding::encode(api_key)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_url() {
        let url = upload_url("https://api.askmiso.com", EntityKind::Product, "k", false);
        assert_eq!(url, "https://api.askmiso.com/v1/products?api_key=k");
    }

    #[test]
    fn test_upload_url_async() {
        let url = upload_url("http://localhost:9000/", EntityKind::Interaction, "k", true);
        assert_eq!(url, "http://localhost:9000/v1/interactions?api_key=k&async=1");
    }

    #[test]
    fn test_ids_url() {
        let url = ids_url("http://localhost:9000", EntityKind::User, "k");
        assert_eq!(url, "http://localhost:9000/v1/users/_ids?api_key=k");
    }

    #[test]
    fn test_delete_url() {
        let url = delete_url("http://localhost:9000", EntityKind::Product, "k");
        assert_eq!(url, "http://localhost:9000/v1/products/_delete?api_key=k");
    }

    #[test]
    fn test_api_key_is_encoded() {
        let url = ids_url("http://localhost:9000", EntityKind::Product, "a b&c");
        assert_eq!(url, "http://localhost:9000/v1/products/_ids?api_key=a%20b%26c");
    }
}
