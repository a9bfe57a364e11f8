use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;

use crate::error::DomainError;

/// Админская авторизация для HTTP-операций (подтверждение оплаты,
/// удаление брони): Basic auth, пароль сверяется с общим секретом из
/// конфигурации. Имя пользователя не проверяется.
#[derive(Debug, Clone)]
pub struct AdminAuth;

impl FromRequestParts<Arc<crate::AppState>> for AdminAuth {
    type Rejection = DomainError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(DomainError::Unauthorized)?;

        let encoded = auth_header
            .strip_prefix("Basic ")
            .ok_or(DomainError::Unauthorized)?;

        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| DomainError::Unauthorized)?;
        let credentials =
            String::from_utf8(decoded).map_err(|_| DomainError::Unauthorized)?;

        // Разделяем user:password
        let password = credentials
            .splitn(2, ':')
            .nth(1)
            .ok_or(DomainError::Unauthorized)?;

        if password != state.config.admin.password {
            return Err(DomainError::Unauthorized);
        }

        Ok(AdminAuth)
    }
}
