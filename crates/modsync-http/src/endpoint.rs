//! Mapping of catalog requests onto REST endpoints.

use reqwest::Method;
use url::Url;

use modsync_core::{ApiCall, ApiRequest, CreateModFileParams};

/// Method and URL of one catalog call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: Method,
    pub url: Url,
}

impl Endpoint {
    /// Whether responses to this endpoint may be cached.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }

    /// Cache key: the URL without the API key.
    pub fn cache_key(&self, user_scoped: Option<&str>) -> String {
        let mut url = self.url.clone();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| name != "api_key")
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut().clear().extend_pairs(kept);
        match user_scoped {
            Some(token) => format!("{token}@{url}"),
            None => url.to_string(),
        }
    }
}

/// Build the endpoint for `call` under `base`.
///
/// The API key is only sent when there is no user token.
pub fn build(base: &str, api_key: &str, call: &ApiCall) -> Result<Endpoint, url::ParseError> {
    let game = call.game_id;
    let (method, path) = match &call.request {
        ApiRequest::GetMod { mod_id } => (Method::GET, format!("games/{game}/mods/{mod_id}")),
        ApiRequest::SubscribeToMod { mod_id } => (
            Method::POST,
            format!("games/{game}/mods/{mod_id}/subscribe"),
        ),
        ApiRequest::UnsubscribeFromMod { mod_id } => (
            Method::DELETE,
            format!("games/{game}/mods/{mod_id}/subscribe"),
        ),
        ApiRequest::ListUserSubscriptions { .. } => (Method::GET, "me/subscribed".to_string()),
        ApiRequest::SubmitModfile { mod_id, .. } => {
            (Method::POST, format!("games/{game}/mods/{mod_id}/files"))
        }
    };

    let mut url = Url::parse(&format!("{}/{path}", base.trim_end_matches('/')))?;
    {
        let mut query = url.query_pairs_mut();
        if let ApiRequest::ListUserSubscriptions { offset, limit } = &call.request {
            query
                .append_pair("game_id", &game.to_string())
                .append_pair("_offset", &offset.to_string())
                .append_pair("_limit", &limit.to_string());
        }
        if call.access_token.is_none() {
            query.append_pair("api_key", api_key);
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(Endpoint { method, url })
}

/// Text fields of a modfile submission, in form order.
pub fn modfile_fields(params: &CreateModFileParams) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if let Some(version) = &params.version {
        fields.push(("version", version.clone()));
    }
    if let Some(changelog) = &params.changelog {
        fields.push(("changelog", changelog.clone()));
    }
    fields.push(("active", params.set_as_active.to_string()));
    if let Some(blob) = &params.metadata_blob {
        fields.push(("metadata_blob", blob.clone()));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use modsync_core::{GameId, ModId};

    const BASE: &str = "https://api.example.test/v1/";

    #[test]
    fn test_get_mod_with_api_key() {
        let call = ApiCall::new(GameId::new(5), ApiRequest::GetMod { mod_id: ModId::new(9) });
        let endpoint = build(BASE, "k", &call).unwrap();
        assert_eq!(endpoint.method, Method::GET);
        assert_eq!(
            endpoint.url.as_str(),
            "https://api.example.test/v1/games/5/mods/9?api_key=k"
        );
        assert!(endpoint.is_cacheable());
    }

    #[test]
    fn test_user_calls_drop_api_key() {
        let call = ApiCall::new(
            GameId::new(5),
            ApiRequest::UnsubscribeFromMod { mod_id: ModId::new(9) },
        )
        .with_token(Some("t".into()));
        let endpoint = build(BASE, "k", &call).unwrap();
        assert_eq!(endpoint.method, Method::DELETE);
        assert_eq!(
            endpoint.url.as_str(),
            "https://api.example.test/v1/games/5/mods/9/subscribe"
        );
    }

    #[test]
    fn test_subscription_page_query() {
        let call = ApiCall::new(
            GameId::new(5),
            ApiRequest::ListUserSubscriptions { offset: 100, limit: 100 },
        )
        .with_token(Some("t".into()));
        let endpoint = build(BASE, "k", &call).unwrap();
        assert_eq!(
            endpoint.url.query(),
            Some("game_id=5&_offset=100&_limit=100")
        );
    }

    #[test]
    fn test_cache_key_ignores_api_key_and_scopes_user() {
        let call = ApiCall::new(GameId::new(5), ApiRequest::GetMod { mod_id: ModId::new(9) });
        let endpoint = build(BASE, "secret", &call).unwrap();
        assert!(!endpoint.cache_key(None).contains("secret"));
        assert_ne!(endpoint.cache_key(None), endpoint.cache_key(Some("user")));
    }

    #[test]
    fn test_modfile_fields() {
        let params = CreateModFileParams::new("/src")
            .with_version("1.2")
            .with_set_as_active(false);
        assert_eq!(
            modfile_fields(&params),
            vec![("version", "1.2".to_string()), ("active", "false".to_string())]
        );
    }
}
