//! Bearer-token admin authentication and the admin directory backed by the same roster.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::domain::AdminId;
use super::repository::{AdminDirectory, AdminProfile, RepositoryError};
use crate::config::AdminAccount;

/// Resolves a presented bearer token to the admin it belongs to.
pub trait AdminAuthenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<AdminId>;
}

/// Static set of administrators loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct AdminRoster {
    tokens: HashMap<String, AdminId>,
    profiles: HashMap<AdminId, AdminProfile>,
}

impl AdminRoster {
    pub fn new(accounts: &[AdminAccount]) -> Self {
        let mut roster = Self::default();
        for account in accounts {
            let id = AdminId::new(account.id.clone());
            roster.tokens.insert(account.token.clone(), id.clone());
            roster.profiles.insert(
                id.clone(),
                AdminProfile {
                    id,
                    username: account.username.clone(),
                },
            );
        }
        roster
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl AdminAuthenticator for AdminRoster {
    fn authenticate(&self, token: &str) -> Option<AdminId> {
        self.tokens.get(token).cloned()
    }
}

#[async_trait]
impl AdminDirectory for AdminRoster {
    async fn profiles(
        &self,
        ids: &[AdminId],
    ) -> Result<HashMap<AdminId, AdminProfile>, RepositoryError> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.profiles
                    .get(id)
                    .map(|profile| (id.clone(), profile.clone()))
            })
            .collect())
    }
}

/// The administrator performing the current request, authenticated from the
/// `Authorization: Bearer` header. Rejects with `401` when the token is missing or unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingAdmin(pub AdminId);

impl<S> FromRequestParts<S> for ActingAdmin
where
    S: Send + Sync,
    Arc<dyn AdminAuthenticator>: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = Arc::<dyn AdminAuthenticator>::from_ref(state);
        bearer_token(&parts.headers)
            .and_then(|token| authenticator.authenticate(token))
            .map(ActingAdmin)
            .ok_or_else(unauthorized)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn unauthorized() -> Response {
    let payload = json!({ "error": "admin authentication required" });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}
